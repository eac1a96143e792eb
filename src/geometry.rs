//! Source-pixel → display-surface coordinate mapping.
//!
//! Pure functions. A source dimension that is zero, negative, non-finite or
//! unknown is replaced by `1` so no NaN or infinity leaks into styles, and the
//! mapped box is flagged as not renderable.

use serde::Serialize;

use crate::schema::BoundingBox;

/// Width/height pair in pixels. `0` means unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn from_optional(width: Option<f64>, height: Option<f64>) -> Self {
        Self {
            width: width.unwrap_or(0.0),
            height: height.unwrap_or(0.0),
        }
    }

    pub fn is_known(&self) -> bool {
        usable(self.width) && usable(self.height)
    }
}

fn usable(v: f64) -> bool {
    v.is_finite() && v > 0.0
}

fn guarded(v: f64) -> f64 {
    if usable(v) {
        v
    } else {
        1.0
    }
}

/// Rectangle in percent of a container.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PercentRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// Rectangle in absolute pixels of a rendered surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PixelRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Mapped<R> {
    pub rect: R,
    pub renderable: bool,
}

/// Map a box to container-relative percentages.
pub fn map_box(b: &BoundingBox, source: Size) -> Mapped<PercentRect> {
    let w = guarded(source.width);
    let h = guarded(source.height);
    Mapped {
        rect: PercentRect {
            left: b.left / w * 100.0,
            top: b.top / h * 100.0,
            width: b.width() / w * 100.0,
            height: b.height() / h * 100.0,
        },
        renderable: source.is_known(),
    }
}

/// Per-axis pixel scale factors from source pixels to a surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Scale {
    pub x: f64,
    pub y: f64,
}

impl Scale {
    pub fn between(source: Size, target: Size) -> Self {
        Self {
            x: target.width / guarded(source.width),
            y: target.height / guarded(source.height),
        }
    }

    pub fn apply(&self, b: &BoundingBox) -> PixelRect {
        PixelRect {
            left: b.left * self.x,
            top: b.top * self.y,
            width: b.width() * self.x,
            height: b.height() * self.y,
        }
    }
}

/// Map a box to absolute pixels of a surface rendered at `target`.
pub fn map_box_to_pixels(b: &BoundingBox, source: Size, target: Size) -> Mapped<PixelRect> {
    Mapped {
        rect: Scale::between(source, target).apply(b),
        renderable: source.is_known() && target.is_known(),
    }
}

/// `padding-bottom` percentage that locks a container to the source aspect ratio.
pub fn aspect_padding(source: Size) -> f64 {
    guarded(source.height) / guarded(source.width) * 100.0
}

/// Scale used by the zoom modal, plus the forced modal image width for tiny sources.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModalScale {
    pub scale: Scale,
    /// Set when the source is implausibly small and the modal image is widened.
    pub image_width: Option<f64>,
}

/// Compute modal geometry against the modal image's rendered size.
///
/// Sources narrower or shorter than `small_px` get a magnification floor of
/// `min_magnification` so their annotations stay legible.
pub fn modal_scale(
    source: Size,
    displayed: Size,
    small_px: f64,
    min_magnification: f64,
) -> ModalScale {
    let base = Scale::between(source, displayed);
    let small = source.is_known() && (source.width < small_px || source.height < small_px);
    if !small {
        return ModalScale {
            scale: base,
            image_width: None,
        };
    }

    ModalScale {
        scale: Scale {
            x: base.x.max(min_magnification),
            y: base.y.max(min_magnification),
        },
        image_width: Some(source.width * min_magnification),
    }
}
