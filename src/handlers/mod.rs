//! Request handlers.
//!
//! Each handler turns one [`ApiEvent`] into one [`ApiResponse`] and is
//! independent of the others. Handlers never return errors: fatal failures
//! are logged and rendered as a generic 500, enrichment failures are logged
//! and replaced with sentinel values.
//!
//! - [`GeoProbe`]: caller IP plus geolocation
//! - [`TelemetryProbe`]: geo probe plus a best-effort access log write
//! - [`AlertDispatcher`]: SOS alert broadcast
//! - [`BiometricCompare`]: face similarity with an optional AI description

use std::future::Future;

use serde::Serialize;
use tracing::error;

use crate::error::HandlerError;
use crate::model::{ApiEvent, ApiResponse};

pub mod alert;
pub mod biometric;
pub mod geo_probe;
pub mod telemetry;

pub use alert::AlertDispatcher;
pub use biometric::BiometricCompare;
pub use geo_probe::GeoProbe;
pub use telemetry::TelemetryProbe;

/// A single-request, single-response function.
pub trait Handler: Send + Sync + 'static {
    /// Value of `Access-Control-Allow-Methods` on every response.
    const ALLOWED_METHODS: &'static str;

    fn handle(&self, event: ApiEvent) -> impl Future<Output = ApiResponse> + Send;
}

/// Render a handler outcome, logging fatal failures without exposing them.
pub(crate) fn respond<T: Serialize>(
    allowed_methods: &str,
    request_id: &str,
    outcome: Result<T, HandlerError>,
) -> ApiResponse {
    match outcome {
        Ok(payload) => ApiResponse::ok(allowed_methods, &payload),
        Err(e) => {
            error!(request_id = %request_id, error = %e, "Invocation failed");
            ApiResponse::internal_error(allowed_methods)
        }
    }
}
