//! Zoom modal: annotations re-mapped against the modal's own rendered size.
//!
//! Opening a modal creates a render-readiness channel. The client reports the
//! modal image's rendered size once it is on screen; [`SurfaceReadiness::wait`]
//! resolves immediately when that already happened and otherwise waits for it.
//! The overlay is owned by the [`ZoomModal`], so closing (dropping) the modal
//! discards every cloned annotation.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use crate::config::RenderConfig;
use crate::error::ViewerError;
use crate::geometry::{self, PixelRect, Size};
use crate::schema::RecognitionResult;
use crate::view::{self, RenderedViews};

/// Which trigger opened the modal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoomSource {
    /// Zoom button on the inline image; shows hover boxes with tooltips.
    Inline,
    /// Zoom button of the layout view; shows the text blocks.
    Layout,
}

/// Check that the trigger for `source` is offered by the current views.
pub fn check_trigger(source: ZoomSource, views: &RenderedViews) -> Result<(), ViewerError> {
    match source {
        ZoomSource::Inline if !views.inline.zoom_available => Err(ViewerError::Zoom(
            "inline zoom needs more annotated regions".to_string(),
        )),
        ZoomSource::Layout if !views.layout.enabled => Err(ViewerError::Zoom(
            "layout view is disabled for this result".to_string(),
        )),
        _ => Ok(()),
    }
}

/// Waits for a modal surface's rendered size.
#[derive(Debug, Clone)]
pub struct SurfaceReadiness {
    rx: watch::Receiver<Option<Size>>,
}

impl SurfaceReadiness {
    /// Size if the surface has already rendered.
    pub fn current(&self) -> Option<Size> {
        *self.rx.borrow()
    }

    pub async fn wait(mut self, timeout: Duration) -> Result<Size, ViewerError> {
        if let Some(size) = self.current() {
            return Ok(size);
        }

        let waited = tokio::time::timeout(timeout, self.rx.wait_for(|s| s.is_some())).await;
        match waited {
            Ok(Ok(size)) => (*size).ok_or(ViewerError::ZoomTimeout),
            Ok(Err(_)) => Err(ViewerError::Zoom("zoom view was closed".to_string())),
            Err(_) => Err(ViewerError::ZoomTimeout),
        }
    }
}

/// Data the client needs to draw the empty modal before measuring it.
#[derive(Debug, Clone, Serialize)]
pub struct ModalShell {
    pub id: String,
    pub source: ZoomSource,
    /// Forced modal image width for implausibly small sources.
    pub image_width: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationStyle {
    TextBlock,
    HoverBox,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModalAnnotation {
    pub index: usize,
    pub label: String,
    pub rect: PixelRect,
    pub visible: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModalOverlay {
    pub modal_id: String,
    pub source: ZoomSource,
    pub style: AnnotationStyle,
    pub modal_size: Size,
    pub image_width: Option<f64>,
    pub annotations: Vec<ModalAnnotation>,
}

/// An open zoom modal.
#[derive(Debug)]
pub struct ZoomModal {
    pub id: String,
    pub source: ZoomSource,
    image_width: Option<f64>,
    rendered: watch::Sender<Option<Size>>,
    overlay: Option<ModalOverlay>,
}

impl ZoomModal {
    /// Open a modal that clones the current image.
    pub fn open(source: ZoomSource, result: &RecognitionResult, render: &RenderConfig) -> Self {
        let source_size = view::source_size(result);
        let image_width = geometry::modal_scale(
            source_size,
            source_size,
            render.small_image_px,
            render.min_magnification,
        )
        .image_width;
        let (rendered, _) = watch::channel(None);
        Self {
            id: format!("zoom_{}", Uuid::new_v4().simple()),
            source,
            image_width,
            rendered,
            overlay: None,
        }
    }

    pub fn shell(&self) -> ModalShell {
        ModalShell {
            id: self.id.clone(),
            source: self.source,
            image_width: self.image_width,
        }
    }

    /// Render-complete signal from the client.
    pub fn mark_rendered(&self, size: Size) {
        self.rendered.send_replace(Some(size));
    }

    pub fn readiness(&self) -> SurfaceReadiness {
        SurfaceReadiness {
            rx: self.rendered.subscribe(),
        }
    }

    pub fn overlay(&self) -> Option<&ModalOverlay> {
        self.overlay.as_ref()
    }

    /// Rebuild the annotation clones against `modal_size`, replacing any previous ones.
    pub fn populate(
        &mut self,
        result: &RecognitionResult,
        views: &RenderedViews,
        modal_size: Size,
        render: &RenderConfig,
    ) -> &ModalOverlay {
        let overlay = build_overlay(self, result, views, modal_size, render);
        self.overlay.insert(overlay)
    }
}

fn build_overlay(
    modal: &ZoomModal,
    result: &RecognitionResult,
    views: &RenderedViews,
    modal_size: Size,
    render: &RenderConfig,
) -> ModalOverlay {
    let source = view::source_size(result);
    let scale = geometry::modal_scale(
        source,
        modal_size,
        render.small_image_px,
        render.min_magnification,
    );
    let style = match modal.source {
        ZoomSource::Inline => AnnotationStyle::HoverBox,
        ZoomSource::Layout => AnnotationStyle::TextBlock,
    };

    let annotations: Vec<ModalAnnotation> = if source.is_known() {
        result
            .items
            .iter()
            .enumerate()
            .filter_map(|(index, item)| {
                let b = item.bounding_box.as_ref()?;
                let label = match style {
                    AnnotationStyle::HoverBox => view::tooltip(item),
                    AnnotationStyle::TextBlock => item.text.clone(),
                };
                Some(ModalAnnotation {
                    index,
                    label,
                    rect: scale.scale.apply(b),
                    visible: views.list.rows.get(index).map(|r| r.visible).unwrap_or(false),
                })
            })
            .collect()
    } else {
        Vec::new()
    };

    debug!(
        "Zoom overlay {}: {} annotations, modal {}x{}, scale {:.3}x{:.3}",
        modal.id,
        annotations.len(),
        modal_size.width,
        modal_size.height,
        scale.scale.x,
        scale.scale.y
    );

    ModalOverlay {
        modal_id: modal.id.clone(),
        source: modal.source,
        style,
        modal_size,
        image_width: scale.image_width,
        annotations,
    }
}
