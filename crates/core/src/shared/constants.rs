/// Detections must score strictly above this to be drawn.
pub const CONFIDENCE_THRESHOLD: f64 = 0.66;

/// Requested ("ideal") capture resolution.
pub const IDEAL_WIDTH: u32 = 640;
pub const IDEAL_HEIGHT: u32 = 480;

/// Labels sit this many pixels up and left of their highlight box.
pub const LABEL_OFFSET_PX: f64 = 10.0;

/// Display refresh rate the detection loop re-arms against.
pub const DEFAULT_REFRESH_HZ: f64 = 60.0;
pub const MIN_REFRESH_HZ: f64 = 0.1;
pub const MAX_REFRESH_HZ: f64 = 1000.0;

pub const SSD_MODEL_NAME: &str = "ssd_mobilenet_v1_12.onnx";
pub const SSD_MODEL_URL: &str = "https://github.com/onnx/models/raw/main/validated/vision/object_detection_segmentation/ssd-mobilenetv1/model/ssd_mobilenet_v1_12.onnx";

/// Oracle-side limits: at most this many boxes per frame, each scoring at least `MIN_SCORE`.
pub const MAX_DETECTIONS: usize = 20;
pub const MIN_SCORE: f64 = 0.5;
