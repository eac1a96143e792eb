//! Recognition data model shared by every view.
//!
//! Items are immutable once normalized; their order is the display order of
//! every surface derived from them.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Axis-aligned box in source-image pixel units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl BoundingBox {
    /// Build a box, rejecting non-finite coordinates and inverted edges.
    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Option<Self> {
        let finite = [left, top, right, bottom].iter().all(|v| v.is_finite());
        if !finite || right < left || bottom < top {
            return None;
        }
        Some(Self {
            left,
            top,
            right,
            bottom,
        })
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }
}

/// One recognized text fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedItem {
    pub text: String,
    /// Always within `[0, 1]` after normalization.
    pub confidence: f64,
    #[serde(rename = "box", skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
}

impl RecognizedItem {
    pub fn new(text: impl Into<String>, confidence: f64, bounding_box: Option<BoundingBox>) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            text: text.into(),
            confidence,
            bounding_box,
        }
    }

    pub fn has_box(&self) -> bool {
        self.bounding_box.is_some()
    }

    /// Percentage label used by tooltips, e.g. `97.25%`.
    pub fn confidence_label(&self) -> String {
        format!("{:.2}%", self.confidence * 100.0)
    }
}

/// Output of one recognition cycle. Replaced wholesale, never patched.
#[derive(Debug, Clone, Serialize)]
pub struct RecognitionResult {
    pub id: String,
    pub items: Vec<RecognizedItem>,
    #[serde(skip_serializing)]
    pub image_base64: String,
    /// Intrinsic width in pixels; `None` when no source reported it.
    pub image_width: Option<f64>,
    pub image_height: Option<f64>,
}

impl RecognitionResult {
    pub fn new(
        items: Vec<RecognizedItem>,
        image_base64: String,
        image_width: Option<f64>,
        image_height: Option<f64>,
    ) -> Self {
        Self {
            id: format!("rec_{}", Uuid::new_v4().simple()),
            items,
            image_base64,
            image_width,
            image_height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn boxed_count(&self) -> usize {
        self.items.iter().filter(|i| i.has_box()).count()
    }

    /// `data:` URL for embedding the returned JPEG.
    pub fn image_data_url(&self) -> String {
        format!("data:image/jpeg;base64,{}", self.image_base64)
    }
}

/// The two mutually exclusive result views.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveView {
    #[default]
    List,
    Layout,
}

/// Transient per-result UI state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ViewState {
    pub active_view: ActiveView,
    /// Inclusive confidence cutoff in `[0, 1]`.
    pub threshold: f64,
}
