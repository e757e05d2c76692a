//! ntfy broadcast publisher.
//!
//! ntfy is a topic-based pub/sub notification service: one publish fans out to
//! every subscriber of the topic (phone push, email forwarding, web). Messages
//! are published as JSON to the server root so titles may contain non-ASCII
//! text, and the server answers with the stored message including its id.
//!
//! # API Reference
//!
//! See: <https://docs.ntfy.sh/publish/#publish-as-json>

use serde::{Deserialize, Serialize};

use super::Broadcaster;
use crate::config::DEFAULT_BROADCAST_URL;
use crate::error::ServiceError;

/// Alerts are delivered with the highest ntfy priority.
const URGENT_PRIORITY: u8 = 5;

/// Client for publishing to an ntfy server.
#[derive(Clone)]
pub struct NtfyPublisher {
    client: reqwest::Client,
    base_url: String,
}

impl Default for NtfyPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl NtfyPublisher {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BROADCAST_URL)
    }

    /// Create a publisher for a self-hosted server (or a test server).
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct PublishRequest<'a> {
    topic: &'a str,
    title: &'a str,
    message: &'a str,
    priority: u8,
    tags: [&'a str; 1],
}

/// The subset of the stored message we care about.
#[derive(Debug, Deserialize)]
struct PublishResponse {
    #[serde(default)]
    id: String,
}

impl Broadcaster for NtfyPublisher {
    async fn publish(
        &self,
        topic: &str,
        subject: &str,
        body: &str,
    ) -> Result<String, ServiceError> {
        let request = PublishRequest {
            topic,
            title: subject,
            message: body,
            priority: URGENT_PRIORITY,
            tags: ["rotating_light"],
        };

        let response = self
            .client
            .post(&self.base_url)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ServiceError::Status(response.status().as_u16()));
        }

        let published = response
            .json::<PublishResponse>()
            .await
            .map_err(|e| ServiceError::Malformed(e.to_string()))?;

        if published.id.is_empty() {
            return Err(ServiceError::Malformed(
                "publish response has no message id".to_string(),
            ));
        }

        Ok(published.id)
    }
}
