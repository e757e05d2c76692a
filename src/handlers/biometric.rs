//! BiometricCompare: face similarity with an optional bilingual description.
//!
//! An invocation moves through these stages:
//!
//! ```text
//! ValidatingInput -> Comparing -> AnalysisSkipped -> Responding
//!                              \-> Analyzing -------/
//! ```
//!
//! Failures while validating or comparing are fatal. The analysis stage is
//! best-effort: whatever goes wrong there, the similarity score and match
//! decision are still returned.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use super::{Handler, respond};
use crate::error::{AnalysisError, HandlerError};
use crate::model::{ApiEvent, ApiResponse, ComparePayload, ComparisonResult};
use crate::services::{FaceComparer, InlineImage, VisionModel};

/// Scores strictly above this are a match.
pub const MATCH_THRESHOLD: f64 = 80.0;

/// The vision model is only called for scores strictly above this.
pub const ANALYSIS_MIN_SIMILARITY: f64 = 10.0;

pub const SKIPPED_EN: &str = "Analysis skipped (Low similarity confidence).";
pub const SKIPPED_VN: &str = "Analysis skipped.";
pub const TRANSLATION_UNAVAILABLE: &str = "Translation unavailable";

const DEFAULT_MEDIA_TYPE: &str = "image/jpeg";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareStage {
    ValidatingInput,
    Comparing,
    AnalysisSkipped,
    Analyzing,
    Responding,
}

impl CompareStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareStage::ValidatingInput => "validating_input",
            CompareStage::Comparing => "comparing",
            CompareStage::AnalysisSkipped => "analysis_skipped",
            CompareStage::Analyzing => "analyzing",
            CompareStage::Responding => "responding",
        }
    }
}

/// English and Vietnamese description of the source face.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Analysis {
    pub en: String,
    pub vn: String,
}

impl Analysis {
    pub fn skipped() -> Self {
        Self {
            en: SKIPPED_EN.to_string(),
            vn: SKIPPED_VN.to_string(),
        }
    }
}

/// Both images after validation.
struct DecodedImages {
    /// The source image as sent, for the vision model.
    source: InlineImage,
    source_bytes: Vec<u8>,
    target_bytes: Vec<u8>,
}

pub struct BiometricCompare<F, M> {
    comparer: F,
    model: M,
}

impl<F: FaceComparer, M: VisionModel> BiometricCompare<F, M> {
    pub fn new(comparer: F, model: M) -> Self {
        Self { comparer, model }
    }

    async fn compare(&self, event: &ApiEvent) -> Result<ComparisonResult, HandlerError> {
        enter(CompareStage::ValidatingInput);
        let payload: ComparePayload = event.json_body()?;
        let images = decode_images(&payload)?;

        enter(CompareStage::Comparing);
        let similarity = self
            .comparer
            .compare(&images.source_bytes, &images.target_bytes)
            .await
            .map_err(HandlerError::Comparison)?;
        let matched = similarity > MATCH_THRESHOLD;

        let analysis = if similarity > ANALYSIS_MIN_SIMILARITY {
            enter(CompareStage::Analyzing);
            match self.analyze(&images.source, similarity).await {
                Ok(analysis) => analysis,
                Err(e) => {
                    warn!(error = %e, "Analysis failed, returning comparison only");
                    Analysis::skipped()
                }
            }
        } else {
            enter(CompareStage::AnalysisSkipped);
            Analysis::skipped()
        };

        enter(CompareStage::Responding);
        info!(similarity, matched, "Face comparison complete");

        Ok(ComparisonResult {
            matched,
            similarity: round_to_hundredths(similarity),
            analysis_en: analysis.en,
            analysis_vn: analysis.vn,
        })
    }

    async fn analyze(
        &self,
        image: &InlineImage,
        similarity: f64,
    ) -> Result<Analysis, AnalysisError> {
        let text = self
            .model
            .describe(image, &analysis_prompt(similarity))
            .await?;
        Ok(parse_analysis(&text))
    }
}

impl<F, M> Handler for BiometricCompare<F, M>
where
    F: FaceComparer + 'static,
    M: VisionModel + 'static,
{
    const ALLOWED_METHODS: &'static str = "OPTIONS,POST";

    #[instrument(skip_all, fields(request_id = %event.request_id()))]
    async fn handle(&self, event: ApiEvent) -> ApiResponse {
        let outcome = self.compare(&event).await;
        respond(Self::ALLOWED_METHODS, event.request_id(), outcome)
    }
}

fn enter(stage: CompareStage) {
    debug!(stage = stage.as_str(), "Entering stage");
}

fn decode_images(payload: &ComparePayload) -> Result<DecodedImages, HandlerError> {
    let source = inline_image(&payload.source)?;
    let target = inline_image(&payload.target)?;

    let source_bytes = STANDARD.decode(&source.data)?;
    let target_bytes = STANDARD.decode(&target.data)?;

    Ok(DecodedImages {
        source,
        source_bytes,
        target_bytes,
    })
}

/// Split an optional data-URI prefix off a base64 image.
///
/// Everything up to the last `,` is treated as the prefix. The media type is
/// taken from a `data:image/...;base64` prefix and defaults to JPEG.
pub fn inline_image(raw: &str) -> Result<InlineImage, HandlerError> {
    let (prefix, data) = match raw.rsplit_once(',') {
        Some((prefix, data)) => (Some(prefix), data),
        None => (None, raw),
    };

    let data: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if data.is_empty() {
        return Err(HandlerError::MissingImage);
    }

    let media_type = prefix
        .and_then(|p| p.trim().strip_prefix("data:"))
        .and_then(|p| p.split(';').next())
        .filter(|m| m.starts_with("image/"))
        .unwrap_or(DEFAULT_MEDIA_TYPE)
        .to_string();

    Ok(InlineImage { media_type, data })
}

/// Prompt asking for a one-sentence description in English and Vietnamese.
pub fn analysis_prompt(similarity: f64) -> String {
    format!(
        "Role: Biometric Security Expert.\n\
         Task: Analyze the person in the first image. Briefly describe the facial features \
         (eyes, nose, skin) and the expression.\n\
         Context: The face comparison returned a similarity score of {similarity:.1}%.\n\
         \n\
         OUTPUT FORMAT (strict JSON only, no markdown):\n\
         {{\n  \"en\": \"One sentence summary in English.\",\n  \
         \"vn\": \"Vietnamese translation of the summary.\"\n}}"
    )
}

/// Read the model's bilingual answer, tolerating text around the JSON object.
///
/// Each field falls back on its own: `en` to the raw text, `vn` to
/// [`TRANSLATION_UNAVAILABLE`].
pub fn parse_analysis(text: &str) -> Analysis {
    let object = json_object(text).and_then(|s| serde_json::from_str::<Map<String, Value>>(s).ok());

    match object {
        Some(object) => Analysis {
            en: string_field(&object, "en").unwrap_or_else(|| text.to_string()),
            vn: string_field(&object, "vn").unwrap_or_else(|| TRANSLATION_UNAVAILABLE.to_string()),
        },
        None => {
            warn!("Model output has no parseable JSON object, using raw text");
            Analysis {
                en: text.to_string(),
                vn: TRANSLATION_UNAVAILABLE.to_string(),
            }
        }
    }
}

/// Substring from the first `{` to the last `}` inclusive.
fn json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

fn string_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    object.get(key).and_then(Value::as_str).map(str::to_string)
}

fn round_to_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
