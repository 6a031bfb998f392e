use crate::shared::bounding_box::BoundingBox;
use crate::shared::constants::LABEL_OFFSET_PX;
use crate::shared::detection::Detection;

use super::overlay_surface::DisplaySize;

/// Rectangle in display pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScreenRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Caption text and where it is drawn.
#[derive(Clone, Debug, PartialEq)]
pub struct LabelPlacement {
    pub text: String,
    pub x: f64,
    pub y: f64,
    /// Wrap width; never negative.
    pub max_width: f64,
}

/// Per-axis ratio between the displayed live view and the native frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DisplayScale {
    pub x: f64,
    pub y: f64,
}

impl DisplayScale {
    /// `None` when either size is degenerate (zero, negative or not finite),
    /// in which case nothing can be placed meaningfully.
    pub fn between(native_width: u32, native_height: u32, displayed: DisplaySize) -> Option<Self> {
        let usable = |v: f64| v.is_finite() && v > 0.0;
        if native_width == 0
            || native_height == 0
            || !usable(displayed.width)
            || !usable(displayed.height)
        {
            return None;
        }
        Some(Self {
            x: displayed.width / native_width as f64,
            y: displayed.height / native_height as f64,
        })
    }

    pub fn apply(&self, bbox: &BoundingBox) -> ScreenRect {
        ScreenRect {
            x: bbox.x * self.x,
            y: bbox.y * self.y,
            width: bbox.width * self.x,
            height: bbox.height * self.y,
        }
    }
}

/// Highlight box plus caption for one detection, in display pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct OverlayAnnotation {
    pub highlight: ScreenRect,
    pub label: LabelPlacement,
}

impl OverlayAnnotation {
    pub fn from_detection(detection: &Detection, scale: DisplayScale) -> Self {
        let highlight = scale.apply(&detection.bbox);
        let label = LabelPlacement {
            text: label_text(detection),
            x: highlight.x - LABEL_OFFSET_PX,
            y: highlight.y - LABEL_OFFSET_PX,
            max_width: (highlight.width - LABEL_OFFSET_PX).max(0.0),
        };
        Self { highlight, label }
    }
}

/// `"<class> - with <pct>% confidence."`
pub fn label_text(detection: &Detection) -> String {
    format!(
        "{} - with {}% confidence.",
        detection.class,
        detection.confidence_percent()
    )
}
