//! AlertDispatcher: broadcast an SOS message to every subscriber of a topic.
//!
//! The alert always goes out. Missing coordinates only change the text from a
//! map link to a "signal lost" notice.

use chrono::{SecondsFormat, Utc};
use tracing::{info, instrument, warn};

use super::{Handler, respond};
use crate::error::HandlerError;
use crate::model::{AlertPayload, AlertReceipt, ApiEvent, ApiResponse, DispatchStatus};
use crate::services::Broadcaster;

pub const ALERT_SUBJECT: &str = "🚨 SOS SIGNAL DETECTED";

const GPS_SIGNAL_LOST: &str = "GPS SIGNAL LOST";
const MAP_UNAVAILABLE: &str = "Location Data Unavailable";
const RULE: &str = "--------------------------------------------------";

pub struct AlertDispatcher<P> {
    publisher: P,
    /// `None` fails every invocation with a configuration error.
    topic: Option<String>,
    /// Stamped in the alert footer.
    region: String,
}

impl<P: Broadcaster> AlertDispatcher<P> {
    pub fn new(publisher: P, topic: Option<String>, region: impl Into<String>) -> Self {
        Self {
            publisher,
            topic,
            region: region.into(),
        }
    }

    async fn dispatch(&self, event: &ApiEvent) -> Result<AlertReceipt, HandlerError> {
        let topic = self.topic.as_deref().ok_or_else(|| {
            warn!("ALERT_TOPIC is not configured");
            HandlerError::MissingConfig("ALERT_TOPIC")
        })?;

        let payload: AlertPayload = event.json_body()?;
        let text = format_alert(event.request_id(), &payload, &self.region);

        let broadcast_id = self
            .publisher
            .publish(topic, ALERT_SUBJECT, &text)
            .await
            .map_err(HandlerError::Broadcast)?;

        info!(
            broadcast_id = %broadcast_id,
            has_location = payload.coordinates().is_some(),
            "SOS alert dispatched"
        );

        Ok(AlertReceipt {
            status: DispatchStatus::Dispatched,
            broadcast_id,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        })
    }
}

impl<P: Broadcaster + 'static> Handler for AlertDispatcher<P> {
    const ALLOWED_METHODS: &'static str = "OPTIONS,POST";

    #[instrument(skip_all, fields(request_id = %event.request_id()))]
    async fn handle(&self, event: ApiEvent) -> ApiResponse {
        let outcome = self.dispatch(&event).await;
        respond(Self::ALLOWED_METHODS, event.request_id(), outcome)
    }
}

/// Google Maps search link centred on the given coordinates.
pub fn map_link(lat: &str, long: &str) -> String {
    format!("https://www.google.com/maps/search/?api=1&query={lat},{long}")
}

/// Render the alert body sent to subscribers.
pub fn format_alert(request_id: &str, payload: &AlertPayload, region: &str) -> String {
    let (gps_info, map) = match payload.coordinates() {
        Some((lat, long)) => (format!("LAT: {lat}\nLONG: {long}"), map_link(&lat, &long)),
        None => (GPS_SIGNAL_LOST.to_string(), MAP_UNAVAILABLE.to_string()),
    };

    format!(
        "🚨 [EMERGENCY ALERT] - PRIORITY: HIGH\n\
         ID: {request_id}\n\
         MESSAGE: {message}\n\
         {RULE}\n\
         📍 TELEMETRY DATA:\n{gps_info}\n\n\
         🔗 TACTICAL MAP:\n{map}\n\
         {RULE}\n\
         SYSTEM: Portfolio Edge / {region}",
        message = payload.message(),
    )
}
