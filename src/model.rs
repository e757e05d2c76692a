//! Data models shared by the handlers.
//!
//! Inbound requests arrive as an [`ApiEvent`] (the JSON shape of an
//! API-Gateway-v2 proxy event) and every handler answers with an
//! [`ApiResponse`] envelope. The payload types in between are per handler and
//! live only for the duration of one invocation.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, FixedOffset, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::HandlerError;

/// Sentinel used for every text field we could not resolve.
pub const UNKNOWN: &str = "Unknown";

/// Body returned with every 500 response.
pub const GENERIC_ERROR_MESSAGE: &str = "Internal Server Error";

// ============================================================================
// Inbound event
// ============================================================================

/// One inbound request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEvent {
    #[serde(default)]
    pub request_context: RequestContext,

    /// Request headers. Lookups through [`ApiEvent::header`] ignore case.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Raw request body, if any.
    #[serde(default)]
    pub body: Option<String>,

    /// Whether `body` is base64 encoded by the front door.
    #[serde(default)]
    pub is_base64_encoded: bool,
}

/// Metadata supplied by the front door.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    #[serde(default)]
    pub request_id: String,

    #[serde(default)]
    pub http: Option<HttpContext>,
}

/// HTTP details of the request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpContext {
    #[serde(default)]
    pub method: String,

    #[serde(default)]
    pub source_ip: Option<String>,

    #[serde(default)]
    pub user_agent: Option<String>,
}

impl ApiEvent {
    pub fn request_id(&self) -> &str {
        &self.request_context.request_id
    }

    /// Caller network address, or [`UNKNOWN`].
    pub fn source_ip(&self) -> &str {
        self.request_context
            .http
            .as_ref()
            .and_then(|http| http.source_ip.as_deref())
            .filter(|ip| !ip.trim().is_empty())
            .unwrap_or(UNKNOWN)
    }

    /// Caller user agent from the request context, then the `User-Agent`
    /// header, then [`UNKNOWN`].
    pub fn user_agent(&self) -> &str {
        self.request_context
            .http
            .as_ref()
            .and_then(|http| http.user_agent.as_deref())
            .or_else(|| self.header("user-agent"))
            .filter(|ua| !ua.trim().is_empty())
            .unwrap_or(UNKNOWN)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Parse the request body as a JSON object.
    ///
    /// An absent or blank body is [`HandlerError::MissingBody`]; any other
    /// top-level value (array, string, number) is [`HandlerError::NotAnObject`];
    /// anything serde rejects is [`HandlerError::MalformedBody`].
    pub fn json_body<T: DeserializeOwned>(&self) -> Result<T, HandlerError> {
        let raw = self
            .body
            .as_deref()
            .filter(|body| !body.trim().is_empty())
            .ok_or(HandlerError::MissingBody)?;

        let value: serde_json::Value = if self.is_base64_encoded {
            let bytes = STANDARD
                .decode(raw.trim())
                .map_err(HandlerError::BodyEncoding)?;
            serde_json::from_slice(&bytes)?
        } else {
            serde_json::from_str(raw)?
        };

        // Serde would otherwise fill a struct from a sequence.
        if !value.is_object() {
            return Err(HandlerError::NotAnObject);
        }

        Ok(serde_json::from_value(value)?)
    }
}

// ============================================================================
// Response envelope
// ============================================================================

/// The response envelope every handler returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    /// JSON document serialized to a string.
    pub body: String,
}

/// `{"error": "..."}` body of a failed invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    /// The only error body clients ever see.
    pub fn generic() -> Self {
        Self {
            error: GENERIC_ERROR_MESSAGE.to_string(),
        }
    }

    fn to_json(&self) -> String {
        // A single string field always serializes.
        serde_json::to_string(self)
            .unwrap_or_else(|_| format!(r#"{{"error":"{GENERIC_ERROR_MESSAGE}"}}"#))
    }
}

impl ApiResponse {
    /// 200 response carrying `payload` as JSON.
    pub fn ok<T: Serialize>(allowed_methods: &str, payload: &T) -> Self {
        match serde_json::to_string(payload) {
            Ok(body) => Self {
                status_code: 200,
                headers: cors_headers(allowed_methods),
                body,
            },
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize response payload");
                Self::internal_error(allowed_methods)
            }
        }
    }

    /// Generic 500 response. Never carries internal error text.
    pub fn internal_error(allowed_methods: &str) -> Self {
        let body = ErrorBody::generic().to_json();
        Self {
            status_code: 500,
            headers: cors_headers(allowed_methods),
            body,
        }
    }

    /// Answer to a CORS preflight request.
    pub fn preflight(allowed_methods: &str) -> Self {
        Self {
            status_code: 200,
            headers: cors_headers(allowed_methods),
            body: String::new(),
        }
    }

    /// Parse the body back into a JSON value.
    pub fn body_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_str(&self.body)
    }
}

fn cors_headers(allowed_methods: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("Content-Type".to_string(), "application/json".to_string()),
        ("Access-Control-Allow-Origin".to_string(), "*".to_string()),
        (
            "Access-Control-Allow-Methods".to_string(),
            allowed_methods.to_string(),
        ),
    ])
}

// ============================================================================
// Geo probe
// ============================================================================

/// Raw answer from the geolocation service. Every field may be missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeoLookup {
    /// `"success"` or `"fail"`.
    #[serde(default)]
    pub status: Option<String>,

    /// Failure reason when `status` is `"fail"` (e.g. "private range").
    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub city: Option<String>,

    #[serde(default)]
    pub country: Option<String>,

    #[serde(default)]
    pub isp: Option<String>,

    #[serde(default)]
    pub lat: Option<f64>,

    #[serde(default)]
    pub lon: Option<f64>,
}

impl GeoLookup {
    /// The service reports failures in-band with a 200 status.
    pub fn is_failure(&self) -> bool {
        self.status.as_deref() == Some("fail")
    }
}

/// Caller IP merged with best-effort geolocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub ip: String,
    pub city: String,
    pub country: String,
    pub isp: String,
    pub lat: f64,
    pub lon: f64,
}

impl ProbeResult {
    /// The single place where lookup gaps are filled with defaults.
    pub fn from_lookup(ip: &str, lookup: Option<GeoLookup>) -> Self {
        let lookup = lookup.unwrap_or_default();
        let text = |field: Option<String>| field.unwrap_or_else(|| UNKNOWN.to_string());

        Self {
            ip: ip.to_string(),
            city: text(lookup.city),
            country: text(lookup.country),
            isp: text(lookup.isp),
            lat: lookup.lat.unwrap_or(0.0),
            lon: lookup.lon.unwrap_or(0.0),
        }
    }
}

// ============================================================================
// Telemetry
// ============================================================================

/// Outcome stored with each telemetry record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordStatus {
    Success,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Success => "SUCCESS",
        }
    }
}

/// Access log entry written once per telemetry probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub record_id: Uuid,

    /// Local wall-clock time at the configured UTC offset, `%Y-%m-%d %H:%M:%S`.
    pub timestamp: String,

    pub ip_address: String,
    pub city: String,
    pub country: String,
    pub isp: String,
    pub lat: f64,
    pub lon: f64,
    pub user_agent: String,
    pub status: RecordStatus,
}

impl TelemetryRecord {
    pub fn new(
        probe: &ProbeResult,
        user_agent: &str,
        now: DateTime<Utc>,
        offset: FixedOffset,
    ) -> Self {
        Self {
            record_id: Uuid::new_v4(),
            timestamp: now
                .with_timezone(&offset)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
            ip_address: probe.ip.clone(),
            city: probe.city.clone(),
            country: probe.country.clone(),
            isp: probe.isp.clone(),
            lat: probe.lat,
            lon: probe.lon,
            user_agent: user_agent.to_string(),
            status: RecordStatus::Success,
        }
    }
}

// ============================================================================
// SOS alert
// ============================================================================

/// Message used when the caller sent none.
pub const DEFAULT_ALERT_MESSAGE: &str = "NO_MESSAGE";

/// Request body of the SOS endpoint.
///
/// Both fields are kept as raw JSON: an alert is sent whatever shape they
/// arrive in, so a wrong type must never fail deserialization.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlertPayload {
    #[serde(default)]
    pub message: Option<serde_json::Value>,

    /// Expected as `{"lat": .., "long": ..}`. Coordinates are accepted as
    /// JSON numbers or strings and echoed as sent.
    #[serde(default)]
    pub location: Option<serde_json::Value>,
}

impl AlertPayload {
    /// Message text. Strings are used as sent, other values in their JSON
    /// form, and a missing or null message becomes [`DEFAULT_ALERT_MESSAGE`].
    pub fn message(&self) -> String {
        match &self.message {
            None | Some(serde_json::Value::Null) => DEFAULT_ALERT_MESSAGE.to_string(),
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }

    /// Both coordinates rendered as text, or `None` if `location` is not an
    /// object or either coordinate is missing.
    pub fn coordinates(&self) -> Option<(String, String)> {
        let location = self.location.as_ref()?.as_object()?;
        let lat = coordinate_text(location.get("lat")?)?;
        let long = coordinate_text(location.get("long")?)?;
        Some((lat, long))
    }
}

fn coordinate_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DispatchStatus {
    Dispatched,
}

/// Response body of a successful SOS dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertReceipt {
    pub status: DispatchStatus,
    /// Message identifier assigned by the broadcast service.
    pub broadcast_id: String,
    /// Dispatch time, RFC 3339 UTC.
    pub timestamp: String,
}

// ============================================================================
// Face comparison
// ============================================================================

/// Request body of the face comparison endpoint. Each image is plain base64
/// or a data URI.
#[derive(Debug, Clone, Deserialize)]
pub struct ComparePayload {
    #[serde(default)]
    pub source: String,

    #[serde(default)]
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub matched: bool,
    /// 0 to 100, rounded to two decimals.
    pub similarity: f64,
    pub analysis_en: String,
    pub analysis_vn: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_event_from_gateway_v2_json() {
        let event: ApiEvent = serde_json::from_value(serde_json::json!({
            "requestContext": {
                "requestId": "abc-123",
                "http": { "method": "GET", "sourceIp": "203.0.113.7", "userAgent": "curl/8.0" }
            },
            "headers": { "X-Custom": "1" },
            "isBase64Encoded": false
        }))
        .unwrap();

        assert_eq!(event.request_id(), "abc-123");
        assert_eq!(event.source_ip(), "203.0.113.7");
        assert_eq!(event.user_agent(), "curl/8.0");
        assert_eq!(event.header("x-custom"), Some("1"));
        assert!(event.body.is_none());
    }

    #[test]
    fn test_event_defaults_to_unknown() {
        let event = ApiEvent::default();
        assert_eq!(event.source_ip(), UNKNOWN);
        assert_eq!(event.user_agent(), UNKNOWN);
    }

    #[test]
    fn test_user_agent_falls_back_to_header() {
        let mut event = ApiEvent::default();
        event
            .headers
            .insert("User-Agent".to_string(), "Mozilla/5.0".to_string());
        assert_eq!(event.user_agent(), "Mozilla/5.0");
    }

    #[test]
    fn test_json_body_missing_and_malformed() {
        let mut event = ApiEvent::default();
        let err = event.json_body::<serde_json::Value>().unwrap_err();
        assert!(matches!(err, HandlerError::MissingBody));

        event.body = Some("   ".to_string());
        let err = event.json_body::<serde_json::Value>().unwrap_err();
        assert!(matches!(err, HandlerError::MissingBody));

        event.body = Some("{not json".to_string());
        let err = event.json_body::<serde_json::Value>().unwrap_err();
        assert!(matches!(err, HandlerError::MalformedBody(_)));
    }

    #[test]
    fn test_json_body_requires_object() {
        for body in ["[]", r#"["hi"]"#, r#""hi""#, "42", "null"] {
            let event = ApiEvent {
                body: Some(body.to_string()),
                ..Default::default()
            };
            let err = event.json_body::<AlertPayload>().unwrap_err();
            assert!(matches!(err, HandlerError::NotAnObject), "body: {body}");
        }
    }

    #[test]
    fn test_json_body_base64_encoded() {
        let event = ApiEvent {
            body: Some(STANDARD.encode(r#"{"message":"hi"}"#)),
            is_base64_encoded: true,
            ..Default::default()
        };
        let payload: AlertPayload = event.json_body().unwrap();
        assert_eq!(payload.message(), "hi");
    }

    #[test]
    fn test_probe_result_defaults() {
        let probe = ProbeResult::from_lookup("1.2.3.4", None);
        assert_eq!(probe.city, UNKNOWN);
        assert_eq!(probe.country, UNKNOWN);
        assert_eq!(probe.isp, UNKNOWN);
        assert_eq!(probe.lat, 0.0);
        assert_eq!(probe.lon, 0.0);
    }

    #[test]
    fn test_probe_result_partial_lookup() {
        let lookup = GeoLookup {
            city: Some("Hanoi".to_string()),
            lat: Some(21.03),
            ..Default::default()
        };
        let probe = ProbeResult::from_lookup("1.2.3.4", Some(lookup));
        assert_eq!(probe.city, "Hanoi");
        assert_eq!(probe.country, UNKNOWN);
        assert_eq!(probe.lat, 21.03);
        assert_eq!(probe.lon, 0.0);
    }

    #[test]
    fn test_telemetry_timestamp_uses_offset() {
        let probe = ProbeResult::from_lookup("1.2.3.4", None);
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 20, 30, 0).unwrap();
        let offset = FixedOffset::east_opt(7 * 3600).unwrap();

        let record = TelemetryRecord::new(&probe, "curl/8.0", now, offset);
        assert_eq!(record.timestamp, "2024-01-16 03:30:00");
        assert_eq!(record.status, RecordStatus::Success);
        assert_eq!(record.ip_address, "1.2.3.4");
    }

    fn alert(body: serde_json::Value) -> AlertPayload {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_location_requires_both_coordinates() {
        let full = alert(serde_json::json!({ "location": { "lat": 10, "long": 20.5 } }));
        assert_eq!(
            full.coordinates(),
            Some(("10".to_string(), "20.5".to_string()))
        );

        let partial = alert(serde_json::json!({ "location": { "lat": 10 } }));
        assert!(partial.coordinates().is_none());

        let null = alert(serde_json::json!({ "location": { "lat": null, "long": 3 } }));
        assert!(null.coordinates().is_none());

        let text = alert(serde_json::json!({ "location": { "lat": " 10.5 ", "long": "20" } }));
        assert_eq!(
            text.coordinates(),
            Some(("10.5".to_string(), "20".to_string()))
        );
    }

    #[test]
    fn test_location_of_any_shape_is_accepted() {
        for location in [
            serde_json::json!("unavailable"),
            serde_json::json!([10, 20]),
            serde_json::json!(42),
            serde_json::json!(null),
        ] {
            let payload = alert(serde_json::json!({ "message": "help", "location": location }));
            assert!(payload.coordinates().is_none());
            assert_eq!(payload.message(), "help");
        }
    }

    #[test]
    fn test_alert_payload_default_message() {
        let payload = alert(serde_json::json!({}));
        assert_eq!(payload.message(), DEFAULT_ALERT_MESSAGE);
        assert!(payload.location.is_none());

        let null = alert(serde_json::json!({ "message": null }));
        assert_eq!(null.message(), DEFAULT_ALERT_MESSAGE);
    }

    #[test]
    fn test_alert_message_of_other_types() {
        assert_eq!(alert(serde_json::json!({ "message": 911 })).message(), "911");
        assert_eq!(alert(serde_json::json!({ "message": true })).message(), "true");
        assert_eq!(
            alert(serde_json::json!({ "message": ["a", "b"] })).message(),
            r#"["a","b"]"#
        );
    }

    #[test]
    fn test_error_response_is_generic() {
        let response = ApiResponse::internal_error("GET");
        assert_eq!(response.status_code, 500);
        assert_eq!(
            response.body_json().unwrap(),
            serde_json::json!({ "error": "Internal Server Error" })
        );
        assert_eq!(response.headers["Access-Control-Allow-Origin"], "*");

        let body: ErrorBody = serde_json::from_str(&response.body).unwrap();
        assert_eq!(body, ErrorBody::generic());
    }
}
