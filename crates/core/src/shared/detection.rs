use super::bounding_box::BoundingBox;

/// One classified object reported by the detection model for one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub class: String,
    /// Model score in `[0, 1]`.
    pub confidence: f64,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(class: impl Into<String>, confidence: f64, bbox: BoundingBox) -> Self {
        Self {
            class: class.into(),
            confidence,
            bbox,
        }
    }

    /// Strictly-greater comparison: a score equal to the threshold is rejected.
    pub fn exceeds(&self, threshold: f64) -> bool {
        self.confidence > threshold
    }

    /// Confidence as a whole percentage, rounding halves up.
    pub fn confidence_percent(&self) -> i64 {
        (self.confidence * 100.0).round() as i64
    }
}
