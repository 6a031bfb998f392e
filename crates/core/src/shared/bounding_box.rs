/// Axis-aligned box in the source frame's native pixel space.
///
/// `(x, y)` is the top-left corner, matching the `[x, y, width, height]`
/// layout detection models report.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Builds a box from normalized `[ymin, xmin, ymax, xmax]` corners,
    /// the TensorFlow object-detection output layout.
    pub fn from_normalized_corners(corners: [f32; 4], frame_width: u32, frame_height: u32) -> Self {
        let [ymin, xmin, ymax, xmax] = corners.map(|v| (v as f64).clamp(0.0, 1.0));
        let fw = frame_width as f64;
        let fh = frame_height as f64;
        Self {
            x: xmin * fw,
            y: ymin * fh,
            width: (xmax - xmin).max(0.0) * fw,
            height: (ymax - ymin).max(0.0) * fh,
        }
    }
}
