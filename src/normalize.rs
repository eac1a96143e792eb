//! Recognition response normalization.
//!
//! The recognition endpoint answers in one of three shapes. [`classify`] turns
//! the raw payload into a [`ResponseShape`] and [`normalize`] maps that into
//! one ordered list of [`RecognizedItem`]s. Nothing downstream inspects the
//! raw payload.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Deserialize;
use std::io::Cursor;
use tracing::{debug, warn};

use crate::config::RenderConfig;
use crate::error::ViewerError;
use crate::schema::{BoundingBox, RecognitionResult, RecognizedItem};

/// Response body of the recognition endpoint (private wire shape).
#[derive(Debug, Default, Deserialize)]
pub struct RawPayload {
    #[serde(default)]
    pub error: Option<serde_json::Value>,
    #[serde(default)]
    pub text: Option<RawText>,
    #[serde(default, rename = "textResults", deserialize_with = "null_as_empty")]
    pub text_results: Vec<RawTextResult>,
    #[serde(default)]
    pub image: String,
    #[serde(default, rename = "imageWidth")]
    pub image_width: Option<f64>,
    #[serde(default, rename = "imageHeight")]
    pub image_height: Option<f64>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<RawTextResult>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<RawTextResult>>::deserialize(deserializer)?.unwrap_or_default())
}

/// The `text` field: either the plain string or the engine's own response.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RawText {
    Plain(String),
    Engine(EngineResponse),
    Other(serde::de::IgnoredAny),
}

#[derive(Debug, Default, Deserialize)]
pub struct EngineResponse {
    #[serde(default)]
    pub errcode: Option<i64>,
    #[serde(default)]
    pub ocr_response: Vec<EngineEntry>,
    #[serde(default)]
    pub width: Option<f64>,
    #[serde(default)]
    pub height: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EngineEntry {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub rate: Option<f64>,
    pub left: Option<f64>,
    pub top: Option<f64>,
    pub right: Option<f64>,
    pub bottom: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawTextResult {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default, rename = "box")]
    pub bounding_box: Option<RawBox>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawBox {
    pub left: Option<f64>,
    pub top: Option<f64>,
    pub right: Option<f64>,
    pub bottom: Option<f64>,
}

/// Which of the supported shapes a payload carries, in priority order.
#[derive(Debug)]
pub enum ResponseShape<'a> {
    Structured(&'a [RawTextResult]),
    PlainText(&'a str),
    Engine(&'a [EngineEntry]),
    Empty,
}

impl RawPayload {
    fn engine(&self) -> Option<&EngineResponse> {
        match &self.text {
            Some(RawText::Engine(engine)) => Some(engine),
            _ => None,
        }
    }

    /// Message of a present, truthy `error` field.
    fn service_error(&self) -> Option<String> {
        match self.error.as_ref()? {
            serde_json::Value::Null | serde_json::Value::Bool(false) => None,
            serde_json::Value::Number(n) if n.as_f64() == Some(0.0) => None,
            serde_json::Value::String(s) if s.is_empty() => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// Pick the response shape with the highest priority that has content.
pub fn classify(payload: &RawPayload) -> ResponseShape<'_> {
    if !payload.text_results.is_empty() {
        return ResponseShape::Structured(&payload.text_results);
    }
    match &payload.text {
        Some(RawText::Plain(s)) if !s.trim().is_empty() => ResponseShape::PlainText(s),
        Some(RawText::Engine(engine)) if !engine.ocr_response.is_empty() => {
            ResponseShape::Engine(&engine.ocr_response)
        }
        _ => ResponseShape::Empty,
    }
}

/// Convert a raw payload into the result owned by one recognition cycle.
pub fn normalize(payload: RawPayload, render: &RenderConfig) -> Result<RecognitionResult, ViewerError> {
    if let Some(message) = payload.service_error() {
        return Err(ViewerError::Service(message));
    }
    if let Some(code) = payload.engine().and_then(|e| e.errcode).filter(|c| *c != 0) {
        return Err(ViewerError::Engine(code));
    }

    let items = match classify(&payload) {
        ResponseShape::Structured(results) => results
            .iter()
            .map(|r| {
                let confidence = r.confidence.unwrap_or(render.unscored_confidence);
                let bounding_box = r
                    .bounding_box
                    .as_ref()
                    .and_then(|b| checked_box(&r.text, b.left, b.top, b.right, b.bottom));
                RecognizedItem::new(r.text.clone(), confidence, bounding_box)
            })
            .collect(),
        ResponseShape::PlainText(text) => {
            vec![RecognizedItem::new(text, render.unscored_confidence, None)]
        }
        ResponseShape::Engine(entries) => entries
            .iter()
            .map(|e| {
                let confidence = e.rate.unwrap_or(render.unscored_confidence);
                let bounding_box = checked_box(&e.text, e.left, e.top, e.right, e.bottom);
                RecognizedItem::new(e.text.clone(), confidence, bounding_box)
            })
            .collect(),
        ResponseShape::Empty => Vec::new(),
    };

    let (width, height) = intrinsic_size(&payload);
    debug!(
        "Normalized {} items ({} boxed), intrinsic size {:?}x{:?}",
        items.len(),
        items.iter().filter(|i: &&RecognizedItem| i.has_box()).count(),
        width,
        height
    );

    Ok(RecognitionResult::new(items, payload.image, width, height))
}

fn checked_box(
    text: &str,
    left: Option<f64>,
    top: Option<f64>,
    right: Option<f64>,
    bottom: Option<f64>,
) -> Option<BoundingBox> {
    let (left, top, right, bottom) = (left?, top?, right?, bottom?);
    let b = BoundingBox::new(left, top, right, bottom);
    if b.is_none() {
        warn!(
            "Dropping invalid box for '{}': [{}, {}, {}, {}]",
            text, left, top, right, bottom
        );
    }
    b
}

fn positive(v: Option<f64>) -> Option<f64> {
    v.filter(|v| v.is_finite() && *v > 0.0)
}

/// Intrinsic image size: explicit fields, then the engine's, then the image header.
fn intrinsic_size(payload: &RawPayload) -> (Option<f64>, Option<f64>) {
    let engine = payload.engine();
    let mut width = positive(payload.image_width).or_else(|| positive(engine?.width));
    let mut height = positive(payload.image_height).or_else(|| positive(engine?.height));

    if width.is_none() || height.is_none() {
        if let Some((w, h)) = probe_dimensions(&payload.image) {
            width = width.or(Some(w as f64));
            height = height.or(Some(h as f64));
        }
    }
    (width, height)
}

/// Read the natural size from the encoded image header.
pub fn probe_dimensions(image_base64: &str) -> Option<(u32, u32)> {
    if image_base64.is_empty() {
        return None;
    }
    let bytes = BASE64.decode(image_base64.trim()).ok()?;
    image::io::Reader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}
