//! Declarative view rendering.
//!
//! [`render`] derives every surface (list rows, layout blocks, inline
//! annotation boxes, derived text) from one [`RecognitionResult`] and its
//! [`ViewState`]. Each surface holds exactly one entry per item, in item
//! order; spatial entries of box-less items exist but carry no placement.

use serde::Serialize;

use crate::config::RenderConfig;
use crate::geometry::{self, PercentRect, PixelRect, Size};
use crate::schema::{ActiveView, RecognitionResult, RecognizedItem, ViewState};
use crate::threshold;

pub const EMPTY_MESSAGE: &str = "No text was recognized in this image";
pub const EMPTY_HINT: &str = "Try another image, or make sure the text in it is clear";
pub const NO_BOXES_MESSAGE: &str = "Original layout unavailable: the result carries no position data";

/// Visual tier of a confidence bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    High,
    Medium,
    Low,
}

impl Tier {
    pub fn of(confidence: f64, render: &RenderConfig) -> Self {
        if confidence >= render.high_confidence {
            Self::High
        } else if confidence >= render.medium_confidence {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ListRow {
    pub index: usize,
    pub text: String,
    /// Bar fill, integer percent.
    pub fill_percent: u32,
    pub tier: Tier,
    pub visible: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListView {
    pub rows: Vec<ListRow>,
    pub compact: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct LayoutBlock {
    pub index: usize,
    pub text: String,
    pub placement: Option<PercentRect>,
    pub visible: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct LayoutView {
    /// False when no block could be placed; the toggle is disabled then.
    pub enabled: bool,
    pub aspect_padding: f64,
    pub blocks: Vec<LayoutBlock>,
    pub placeholder: Option<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnnotationBox {
    pub index: usize,
    pub tooltip: String,
    pub placement: Option<PixelRect>,
    pub visible: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct InlineOverlay {
    /// Size of the inline image the boxes were mapped against.
    pub display: Size,
    pub boxes: Vec<AnnotationBox>,
    pub zoom_available: bool,
}

/// All surfaces of a non-empty result.
#[derive(Debug, Clone, Serialize)]
pub struct RenderedViews {
    pub active_view: ActiveView,
    pub threshold: f64,
    pub list: ListView,
    pub layout: LayoutView,
    pub inline: InlineOverlay,
    /// Text of the visible items, one per line. Feeds copy and download.
    pub text: String,
}

impl RenderedViews {
    /// Visible entry counts of list, layout and inline surfaces.
    pub fn visible_counts(&self) -> (usize, usize, usize) {
        (
            self.list.rows.iter().filter(|r| r.visible).count(),
            self.layout.blocks.iter().filter(|b| b.visible).count(),
            self.inline.boxes.iter().filter(|b| b.visible).count(),
        )
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Rendered {
    Empty { message: &'static str, hint: &'static str },
    Views(RenderedViews),
}

impl Rendered {
    pub fn views(&self) -> Option<&RenderedViews> {
        match self {
            Self::Views(v) => Some(v),
            Self::Empty { .. } => None,
        }
    }

    pub fn views_mut(&mut self) -> Option<&mut RenderedViews> {
        match self {
            Self::Views(v) => Some(v),
            Self::Empty { .. } => None,
        }
    }
}

/// Outcome of a view toggle request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Changed,
    Unchanged,
    /// Layout requested while the layout view is disabled.
    Refused,
}

/// Apply a toggle to the view state machine.
pub fn transition(state: &mut ViewState, requested: ActiveView, layout_enabled: bool) -> Transition {
    if state.active_view == requested {
        return Transition::Unchanged;
    }
    if requested == ActiveView::Layout && !layout_enabled {
        return Transition::Refused;
    }
    state.active_view = requested;
    Transition::Changed
}

/// Intrinsic size of the result image (`0` for unknown axes).
pub fn source_size(result: &RecognitionResult) -> Size {
    Size::from_optional(result.image_width, result.image_height)
}

/// Derive every surface from the result, the view state and the inline image size.
///
/// `inline_display` is the rendered inline image size reported by the client;
/// the intrinsic size stands in until one is reported.
pub fn render(
    result: &RecognitionResult,
    state: &ViewState,
    inline_display: Option<Size>,
    render: &RenderConfig,
) -> Rendered {
    if result.is_empty() {
        return Rendered::Empty {
            message: EMPTY_MESSAGE,
            hint: EMPTY_HINT,
        };
    }

    let source = source_size(result);
    let display = inline_display.unwrap_or(source);

    let list = ListView {
        rows: result
            .items
            .iter()
            .enumerate()
            .map(|(index, item)| ListRow {
                index,
                text: item.text.clone(),
                fill_percent: (item.confidence * 100.0).round() as u32,
                tier: Tier::of(item.confidence, render),
                visible: true,
            })
            .collect(),
        compact: result.items.len() > render.compact_after,
    };

    let blocks: Vec<LayoutBlock> = result
        .items
        .iter()
        .enumerate()
        .map(|(index, item)| LayoutBlock {
            index,
            text: item.text.clone(),
            placement: layout_placement(item, source),
            visible: true,
        })
        .collect();
    let layout_enabled = blocks.iter().any(|b| b.placement.is_some());
    let layout = LayoutView {
        enabled: layout_enabled,
        aspect_padding: geometry::aspect_padding(source),
        blocks,
        placeholder: (!layout_enabled).then_some(NO_BOXES_MESSAGE),
    };

    let inline = InlineOverlay {
        display,
        boxes: result
            .items
            .iter()
            .enumerate()
            .map(|(index, item)| AnnotationBox {
                index,
                tooltip: tooltip(item),
                placement: inline_placement(item, source, display),
                visible: true,
            })
            .collect(),
        zoom_available: result.boxed_count() >= render.zoom_min_boxes,
    };

    // A stale layout selection cannot survive a result without boxes.
    let active_view = if layout_enabled {
        state.active_view
    } else {
        ActiveView::List
    };

    let mut views = RenderedViews {
        active_view,
        threshold: state.threshold,
        list,
        layout,
        inline,
        text: String::new(),
    };
    threshold::apply_threshold(&mut views, &result.items, state.threshold);
    Rendered::Views(views)
}

/// Hover text of an annotation box.
pub fn tooltip(item: &RecognizedItem) -> String {
    format!("{} ({})", item.text, item.confidence_label())
}

fn layout_placement(item: &RecognizedItem, source: Size) -> Option<PercentRect> {
    let mapped = geometry::map_box(item.bounding_box.as_ref()?, source);
    mapped.renderable.then_some(mapped.rect)
}

fn inline_placement(item: &RecognizedItem, source: Size, display: Size) -> Option<PixelRect> {
    let mapped = geometry::map_box_to_pixels(item.bounding_box.as_ref()?, source, display);
    mapped.renderable.then_some(mapped.rect)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::BoundingBox;

    fn item(text: &str, confidence: f64, b: Option<[f64; 4]>) -> RecognizedItem {
        RecognizedItem::new(
            text,
            confidence,
            b.and_then(|[l, t, r, bo]| BoundingBox::new(l, t, r, bo)),
        )
    }

    fn result(items: Vec<RecognizedItem>, w: f64, h: f64) -> RecognitionResult {
        RecognitionResult::new(items, String::new(), Some(w), Some(h))
    }

    #[test]
    fn test_empty_result_renders_message_only() {
        let r = RecognitionResult::new(Vec::new(), String::new(), None, None);
        let rendered = render(&r, &ViewState::default(), None, &RenderConfig::default());
        assert!(matches!(rendered, Rendered::Empty { message, .. } if message == EMPTY_MESSAGE));
        assert!(rendered.views().is_none());
    }

    #[test]
    fn test_inline_box_matches_displayed_size() {
        let r = result(vec![item("A", 0.95, Some([0.0, 0.0, 10.0, 10.0]))], 100.0, 100.0);
        let rendered = render(
            &r,
            &ViewState::default(),
            Some(Size::new(200.0, 200.0)),
            &RenderConfig::default(),
        );
        let views = rendered.views().unwrap();
        assert_eq!(
            views.inline.boxes[0].placement,
            Some(PixelRect {
                left: 0.0,
                top: 0.0,
                width: 20.0,
                height: 20.0
            })
        );
        assert_eq!(views.inline.boxes[0].tooltip, "A (95.00%)");
    }

    #[test]
    fn test_list_rows_tiers_and_fill() {
        let r = result(
            vec![
                item("hi", 0.9, None),
                item("mid", 0.7, None),
                item("lo", 0.6949, None),
            ],
            10.0,
            10.0,
        );
        let rendered = render(&r, &ViewState::default(), None, &RenderConfig::default());
        let rows = &rendered.views().unwrap().list.rows;
        assert_eq!(rows[0].tier, Tier::High);
        assert_eq!(rows[1].tier, Tier::Medium);
        assert_eq!(rows[2].tier, Tier::Low);
        assert_eq!(rows[2].fill_percent, 69);
        assert!(!rendered.views().unwrap().list.compact);
    }

    #[test]
    fn test_compact_above_five_rows() {
        let five: Vec<_> = (0..5).map(|i| item(&i.to_string(), 0.5, None)).collect();
        let six: Vec<_> = (0..6).map(|i| item(&i.to_string(), 0.5, None)).collect();
        let config = RenderConfig::default();
        let r5 = render(&result(five, 1.0, 1.0), &ViewState::default(), None, &config);
        let r6 = render(&result(six, 1.0, 1.0), &ViewState::default(), None, &config);
        assert!(!r5.views().unwrap().list.compact);
        assert!(r6.views().unwrap().list.compact);
    }

    #[test]
    fn test_no_boxes_disables_layout() {
        let r = result(vec![item("a", 0.9, None), item("b", 0.8, None)], 100.0, 100.0);
        let state = ViewState {
            active_view: ActiveView::Layout,
            threshold: 0.0,
        };
        let rendered = render(&r, &state, None, &RenderConfig::default());
        let views = rendered.views().unwrap();
        assert!(!views.layout.enabled);
        assert_eq!(views.layout.placeholder, Some(NO_BOXES_MESSAGE));
        assert_eq!(views.active_view, ActiveView::List);
        assert_eq!(views.layout.blocks.len(), 2);
        assert!(views.layout.blocks.iter().all(|b| b.placement.is_none()));

        let mut state = ViewState::default();
        assert_eq!(
            transition(&mut state, ActiveView::Layout, views.layout.enabled),
            Transition::Refused
        );
        assert_eq!(state.active_view, ActiveView::List);
    }

    #[test]
    fn test_layout_blocks_use_percentages() {
        let r = result(
            vec![item("a", 0.9, None), item("b", 0.9, Some([50.0, 25.0, 150.0, 75.0]))],
            200.0,
            100.0,
        );
        let rendered = render(&r, &ViewState::default(), None, &RenderConfig::default());
        let layout = &rendered.views().unwrap().layout;
        assert!(layout.enabled);
        assert_eq!(layout.aspect_padding, 50.0);
        assert!(layout.blocks[0].placement.is_none());
        let p = layout.blocks[1].placement.unwrap();
        assert_eq!((p.left, p.top, p.width, p.height), (25.0, 25.0, 50.0, 50.0));
    }

    #[test]
    fn test_surfaces_share_length_and_order() {
        let r = result(
            vec![
                item("a", 0.9, Some([0.0, 0.0, 1.0, 1.0])),
                item("b", 0.5, None),
                item("c", 0.7, Some([2.0, 2.0, 3.0, 3.0])),
            ],
            10.0,
            10.0,
        );
        let rendered = render(&r, &ViewState::default(), None, &RenderConfig::default());
        let v = rendered.views().unwrap();
        assert_eq!(v.list.rows.len(), 3);
        assert_eq!(v.layout.blocks.len(), 3);
        assert_eq!(v.inline.boxes.len(), 3);
        for i in 0..3 {
            assert_eq!(v.list.rows[i].index, i);
            assert_eq!(v.layout.blocks[i].index, i);
            assert_eq!(v.inline.boxes[i].index, i);
            assert_eq!(v.list.rows[i].text, v.layout.blocks[i].text);
        }
    }

    #[test]
    fn test_zoom_trigger_needs_five_boxes() {
        let boxed = |n: usize| -> Vec<RecognizedItem> {
            (0..n)
                .map(|i| item("t", 0.9, Some([i as f64, 0.0, i as f64 + 1.0, 1.0])))
                .collect()
        };
        let config = RenderConfig::default();
        let four = render(&result(boxed(4), 10.0, 10.0), &ViewState::default(), None, &config);
        let five = render(&result(boxed(5), 10.0, 10.0), &ViewState::default(), None, &config);
        assert!(!four.views().unwrap().inline.zoom_available);
        assert!(five.views().unwrap().inline.zoom_available);
    }

    #[test]
    fn test_unknown_source_size_places_nothing() {
        let r = RecognitionResult::new(
            vec![item("a", 0.9, Some([0.0, 0.0, 5.0, 5.0]))],
            String::new(),
            None,
            None,
        );
        let rendered = render(&r, &ViewState::default(), Some(Size::new(300.0, 200.0)), &RenderConfig::default());
        let v = rendered.views().unwrap();
        assert!(v.inline.boxes[0].placement.is_none());
        assert!(!v.layout.enabled);
    }

    #[test]
    fn test_transition_between_views() {
        let mut state = ViewState::default();
        assert_eq!(transition(&mut state, ActiveView::List, true), Transition::Unchanged);
        assert_eq!(transition(&mut state, ActiveView::Layout, true), Transition::Changed);
        assert_eq!(state.active_view, ActiveView::Layout);
        assert_eq!(transition(&mut state, ActiveView::List, true), Transition::Changed);
        assert_eq!(state.active_view, ActiveView::List);
    }
}
