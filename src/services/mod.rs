//! Third-party services the handlers call.
//!
//! Each service sits behind a small trait so a handler can be built with the
//! real HTTP client in production and with an in-memory fake in tests.
//! Clients are constructed once at startup and hold their own connection pool.
//!
//! # Services
//!
//! - [`ip_api`]: geolocation by IP (ip-api.com JSON API)
//! - [`ntfy`]: fan-out broadcast for SOS alerts (ntfy publish API)
//! - [`face_compare`]: face similarity scoring
//! - [`anthropic`]: vision-language model for the bilingual description
//!
//! The record store is implemented by [`crate::storage::Storage`].

use std::future::Future;

use crate::error::ServiceError;
use crate::model::{GeoLookup, TelemetryRecord};

pub mod anthropic;
pub mod face_compare;
pub mod ip_api;
pub mod ntfy;

#[cfg(test)]
mod test_support;

pub use anthropic::AnthropicClient;
pub use face_compare::FaceCompareClient;
pub use ip_api::IpApiClient;
pub use ntfy::NtfyPublisher;

/// Resolves an IP address to an approximate location.
pub trait GeoLocator: Send + Sync {
    fn locate(&self, ip: &str) -> impl Future<Output = Result<GeoLookup, ServiceError>> + Send;
}

/// Append-only store for telemetry records.
pub trait RecordStore: Send + Sync {
    fn put_record(
        &self,
        record: &TelemetryRecord,
    ) -> impl Future<Output = Result<(), ServiceError>> + Send;
}

/// Publish-once, deliver-to-many messaging.
pub trait Broadcaster: Send + Sync {
    /// Publish `body` under `subject` to `topic`, returning the message id
    /// assigned by the service.
    fn publish(
        &self,
        topic: &str,
        subject: &str,
        body: &str,
    ) -> impl Future<Output = Result<String, ServiceError>> + Send;
}

/// Scores how similar the faces in two images are.
pub trait FaceComparer: Send + Sync {
    /// Similarity of the best face match in `[0, 100]`, or `0` when no face
    /// in `target` matches `source`.
    fn compare(
        &self,
        source: &[u8],
        target: &[u8],
    ) -> impl Future<Output = Result<f64, ServiceError>> + Send;
}

/// Generates text about an image.
pub trait VisionModel: Send + Sync {
    fn describe(
        &self,
        image: &InlineImage,
        prompt: &str,
    ) -> impl Future<Output = Result<String, ServiceError>> + Send;
}

/// A base64 image as received from the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    /// MIME type such as `image/jpeg`.
    pub media_type: String,
    /// Base64 payload without any data-URI prefix.
    pub data: String,
}
