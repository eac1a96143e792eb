//! Confidence threshold filtering across all synchronized surfaces.

use serde::Serialize;

use crate::config::ThresholdPreset;
use crate::schema::RecognizedItem;
use crate::view::RenderedViews;

/// Inclusive pass test.
pub fn passes(confidence: f64, threshold: f64) -> bool {
    confidence >= threshold
}

/// Slider percent (clamped to `0..=100`) as a threshold in `[0, 1]`.
pub fn from_percent(percent: i64) -> f64 {
    percent.clamp(0, 100) as f64 / 100.0
}

pub fn to_percent(threshold: f64) -> u8 {
    (threshold.clamp(0.0, 1.0) * 100.0).round() as u8
}

/// Text of the items passing `threshold`, one per line.
pub fn derived_text(items: &[RecognizedItem], threshold: f64) -> String {
    items
        .iter()
        .filter(|i| passes(i.confidence, threshold))
        .map(|i| i.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Set visibility on list rows, layout blocks and annotation boxes, and
/// rebuild the derived text, from one visibility mask.
pub fn apply_threshold(views: &mut RenderedViews, items: &[RecognizedItem], threshold: f64) {
    let threshold = threshold.clamp(0.0, 1.0);
    let mask: Vec<bool> = items.iter().map(|i| passes(i.confidence, threshold)).collect();
    debug_assert_eq!(views.list.rows.len(), mask.len());
    debug_assert_eq!(views.layout.blocks.len(), mask.len());
    debug_assert_eq!(views.inline.boxes.len(), mask.len());

    for (row, visible) in views.list.rows.iter_mut().zip(&mask) {
        row.visible = *visible;
    }
    for (block, visible) in views.layout.blocks.iter_mut().zip(&mask) {
        block.visible = *visible;
    }
    for (b, visible) in views.inline.boxes.iter_mut().zip(&mask) {
        b.visible = *visible;
    }

    views.threshold = threshold;
    views.text = derived_text(items, threshold);
}

/// Slider marker with its highlight state.
#[derive(Debug, Clone, Serialize)]
pub struct Marker {
    pub percent: u8,
    pub label: String,
    pub active: bool,
}

/// Preset markers, highlighting the one equal to the current slider value.
pub fn markers(presets: &[ThresholdPreset], threshold: f64) -> Vec<Marker> {
    let current = to_percent(threshold);
    presets
        .iter()
        .map(|p| Marker {
            percent: p.percent,
            label: p.label.clone(),
            active: p.percent == current,
        })
        .collect()
}
