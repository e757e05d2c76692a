//! Face similarity client.
//!
//! Talks to a CompareFaces-style JSON endpoint: both images go up as base64
//! bytes with `SimilarityThreshold` pinned to 0 so that even weak matches
//! come back with a score, and the answer lists face matches ordered by
//! similarity.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use super::FaceComparer;
use crate::config::DEFAULT_FACE_COMPARE_URL;
use crate::error::ServiceError;

/// Client for the face comparison service.
#[derive(Clone)]
pub struct FaceCompareClient {
    client: reqwest::Client,
    base_url: String,
}

impl Default for FaceCompareClient {
    fn default() -> Self {
        Self::new()
    }
}

impl FaceCompareClient {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_FACE_COMPARE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct CompareFacesRequest {
    source_image: ImageBytes,
    target_image: ImageBytes,
    similarity_threshold: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ImageBytes {
    bytes: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CompareFacesResponse {
    #[serde(default)]
    face_matches: Vec<FaceMatch>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FaceMatch {
    similarity: f64,
}

impl FaceComparer for FaceCompareClient {
    async fn compare(&self, source: &[u8], target: &[u8]) -> Result<f64, ServiceError> {
        let request = CompareFacesRequest {
            source_image: ImageBytes {
                bytes: STANDARD.encode(source),
            },
            target_image: ImageBytes {
                bytes: STANDARD.encode(target),
            },
            similarity_threshold: 0.0,
        };

        let response = self
            .client
            .post(format!("{}/compare-faces", self.base_url))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ServiceError::Status(response.status().as_u16()));
        }

        let data = response
            .json::<CompareFacesResponse>()
            .await
            .map_err(|e| ServiceError::Malformed(e.to_string()))?;

        let similarity = data.face_matches.first().map_or(0.0, |m| m.similarity);
        if !similarity.is_finite() || !(0.0..=100.0).contains(&similarity) {
            return Err(ServiceError::Malformed(format!(
                "similarity {similarity} outside [0, 100]"
            )));
        }

        Ok(similarity)
    }
}
