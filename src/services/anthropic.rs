//! Anthropic Messages API client used for image descriptions.
//!
//! Sends one user turn holding an inline image block followed by a text
//! prompt and returns the text of the first content block.
//!
//! # API Reference
//!
//! See: <https://docs.anthropic.com/en/api/messages>

use serde::{Deserialize, Serialize};

use super::{InlineImage, VisionModel};
use crate::config::{DEFAULT_VISION_API_URL, DEFAULT_VISION_MODEL};
use crate::error::ServiceError;

const API_VERSION: &str = "2023-06-01";

/// Upper bound on generated tokens; the prompt asks for one sentence per language.
const MAX_TOKENS: u32 = 300;

/// Client for the Messages API.
#[derive(Clone)]
pub struct AnthropicClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl AnthropicClient {
    /// Create a client for the public API.
    ///
    /// # Arguments
    ///
    /// * `api_key` - API key. Without one every call fails locally with
    ///   [`ServiceError::MissingCredentials`] and no request is sent.
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_base_url(DEFAULT_VISION_API_URL, api_key, DEFAULT_VISION_MODEL)
    }

    pub fn with_base_url(base_url: &str, api_key: Option<String>, model: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
        }
    }

    /// Build an authenticated request.
    fn build_request(&self, url: &str, api_key: &str) -> reqwest::RequestBuilder {
        self.client
            .post(url)
            .header("anthropic-version", API_VERSION)
            .header("x-api-key", api_key)
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [Message<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: [ContentBlock<'a>; 2],
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ContentBlock<'a> {
    Image { source: ImageSource<'a> },
    Text { text: &'a str },
}

#[derive(Debug, Serialize)]
struct ImageSource<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: &'a str,
    data: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
}

#[derive(Debug, Deserialize)]
struct ResponseBlock {
    #[serde(default)]
    text: Option<String>,
}

impl VisionModel for AnthropicClient {
    async fn describe(&self, image: &InlineImage, prompt: &str) -> Result<String, ServiceError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ServiceError::MissingCredentials("VISION_API_KEY"))?;

        let request = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            messages: [Message {
                role: "user",
                content: [
                    ContentBlock::Image {
                        source: ImageSource {
                            kind: "base64",
                            media_type: &image.media_type,
                            data: &image.data,
                        },
                    },
                    ContentBlock::Text { text: prompt },
                ],
            }],
        };

        let url = format!("{}/v1/messages", self.base_url);
        let response = self.build_request(&url, api_key).json(&request).send().await?;

        if !response.status().is_success() {
            return Err(ServiceError::Status(response.status().as_u16()));
        }

        let data = response
            .json::<MessagesResponse>()
            .await
            .map_err(|e| ServiceError::Malformed(e.to_string()))?;

        data.content
            .into_iter()
            .next()
            .and_then(|block| block.text)
            .ok_or_else(|| ServiceError::Malformed("response has no text block".to_string()))
    }
}
