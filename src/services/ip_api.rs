//! ip-api.com geolocation client.
//!
//! The free JSON endpoint answers `GET /json/{ip}` with city, country, ISP and
//! coordinates. Lookups that the service cannot resolve (private ranges,
//! reserved addresses, garbage input) still come back as HTTP 200 with
//! `"status": "fail"`, so those are turned into errors here.
//!
//! # API Reference
//!
//! See: <https://ip-api.com/docs/api:json>

use std::time::Duration;

use reqwest::header::USER_AGENT;

use super::GeoLocator;
use crate::config::{DEFAULT_GEO_API_URL, DEFAULT_GEO_TIMEOUT_MS};
use crate::error::ServiceError;
use crate::model::GeoLookup;

/// Some WAFs in front of the free tier reject requests without a user agent.
const CLIENT_USER_AGENT: &str = "Portfolio-Edge-Probe";

/// Client for the ip-api.com JSON endpoint.
#[derive(Clone)]
pub struct IpApiClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl Default for IpApiClient {
    fn default() -> Self {
        Self::new()
    }
}

impl IpApiClient {
    /// Create a client for the public endpoint with the default timeout.
    pub fn new() -> Self {
        Self::with_base_url(
            DEFAULT_GEO_API_URL,
            Duration::from_millis(DEFAULT_GEO_TIMEOUT_MS),
        )
    }

    /// Create a client with a custom base URL and per-request timeout.
    pub fn with_base_url(base_url: &str, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }
}

impl GeoLocator for IpApiClient {
    async fn locate(&self, ip: &str) -> Result<GeoLookup, ServiceError> {
        let url = format!("{}/json/{}", self.base_url, urlencoding::encode(ip));

        let response = self
            .client
            .get(&url)
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .timeout(self.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ServiceError::Status(response.status().as_u16()));
        }

        let lookup = response
            .json::<GeoLookup>()
            .await
            .map_err(|e| ServiceError::Malformed(e.to_string()))?;

        if lookup.is_failure() {
            let reason = lookup.message.as_deref().unwrap_or("unspecified");
            return Err(ServiceError::Malformed(format!("lookup failed: {reason}")));
        }

        Ok(lookup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, extract::Path, http::StatusCode, routing::get};
    use serde_json::json;

    use crate::services::test_support::spawn;

    #[tokio::test]
    async fn test_locate_success() {
        let app = Router::new().route(
            "/json/:ip",
            get(|Path(ip): Path<String>| async move {
                Json(json!({
                    "status": "success",
                    "query": ip,
                    "city": "Ho Chi Minh City",
                    "country": "Vietnam",
                    "isp": "Viettel Group",
                    "lat": 10.8231,
                    "lon": 106.6297
                }))
            }),
        );
        let client = IpApiClient::with_base_url(&spawn(app).await, Duration::from_secs(2));

        let lookup = client.locate("203.0.113.7").await.unwrap();
        assert_eq!(lookup.city.as_deref(), Some("Ho Chi Minh City"));
        assert_eq!(lookup.isp.as_deref(), Some("Viettel Group"));
        assert_eq!(lookup.lon, Some(106.6297));
    }

    #[tokio::test]
    async fn test_in_band_failure_is_error() {
        let app = Router::new().route(
            "/json/:ip",
            get(|| async {
                Json(json!({ "status": "fail", "message": "private range" }))
            }),
        );
        let client = IpApiClient::with_base_url(&spawn(app).await, Duration::from_secs(2));

        let err = client.locate("10.0.0.1").await.unwrap_err();
        assert_eq!(err.kind(), "malformed");
        assert!(err.to_string().contains("private range"));
    }

    #[tokio::test]
    async fn test_non_success_status_is_error() {
        let app = Router::new().route("/json/:ip", get(|| async { StatusCode::TOO_MANY_REQUESTS }));
        let client = IpApiClient::with_base_url(&spawn(app).await, Duration::from_secs(2));

        let err = client.locate("203.0.113.7").await.unwrap_err();
        assert!(matches!(err, ServiceError::Status(429)));
    }

    #[tokio::test]
    async fn test_slow_service_times_out() {
        let app = Router::new().route(
            "/json/:ip",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                Json(json!({ "status": "success" }))
            }),
        );
        let client = IpApiClient::with_base_url(&spawn(app).await, Duration::from_millis(100));

        let err = client.locate("203.0.113.7").await.unwrap_err();
        assert_eq!(err.kind(), "timeout");
    }
}
