//! Error types for outbound service calls and handler invocations.
//!
//! Failures fall into two tiers:
//!
//! - **Enrichment failures** ([`ServiceError`] from geolocation, persistence or
//!   the vision model) are logged and replaced with sentinel values. They never
//!   change the status code a caller sees.
//! - **Fatal failures** ([`HandlerError`]) abort the invocation. Every variant
//!   is rendered as the same generic 500 envelope so internal error text never
//!   reaches the client.

use thiserror::Error;

/// Failure of a single call to a third-party service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Connection, timeout or body-read failure.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("unexpected status {0}")]
    Status(u16),

    /// The service answered but the payload was not what we expected.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The call needs a credential that is not configured; nothing was sent.
    #[error("no credentials configured for {0}")]
    MissingCredentials(&'static str),

    /// Record store failure.
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl ServiceError {
    /// Short label for the failure kind, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Transport(e) if e.is_timeout() => "timeout",
            ServiceError::Transport(_) => "transport",
            ServiceError::Status(_) => "status",
            ServiceError::Malformed(_) => "malformed",
            ServiceError::MissingCredentials(_) => "credentials",
            ServiceError::Storage(_) => "storage",
        }
    }
}

/// A failure that is fatal to one handler invocation.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("request body is empty")]
    MissingBody,

    #[error("request body is not valid JSON: {0}")]
    MalformedBody(#[from] serde_json::Error),

    #[error("request body is not a JSON object")]
    NotAnObject,

    #[error("request body is not valid base64: {0}")]
    BodyEncoding(#[source] base64::DecodeError),

    /// A required configuration value is unset for this invocation.
    #[error("missing configuration: {0}")]
    MissingConfig(&'static str),

    #[error("missing source or target image data")]
    MissingImage,

    #[error("image is not valid base64: {0}")]
    ImageDecode(#[from] base64::DecodeError),

    #[error("face comparison failed: {0}")]
    Comparison(#[source] ServiceError),

    #[error("broadcast failed: {0}")]
    Broadcast(#[source] ServiceError),
}

/// Failure of the optional generative analysis step.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("vision model call failed: {0}")]
    Model(#[from] ServiceError),
}
