/// COCO SSD-MobileNet object detector using ONNX Runtime via `ort`.
///
/// Expects the TensorFlow object-detection export layout: a uint8 NHWC
/// `image_tensor` input and `detection_boxes` / `detection_classes` /
/// `detection_scores` / `num_detections` outputs, with boxes as normalized
/// `[ymin, xmin, ymax, xmax]`.
use std::path::Path;

use crate::detection::domain::object_detector::{DetectError, ObjectDetector};
use crate::shared::bounding_box::BoundingBox;
use crate::shared::constants::{MAX_DETECTIONS, MIN_SCORE};
use crate::shared::detection::Detection;
use crate::shared::frame::Frame;

use super::coco_labels::label_for;

/// Label used when the model reports a class id outside the COCO table.
const UNKNOWN_LABEL: &str = "unknown";

/// Positions of the named tensors in the session's output list.
#[derive(Clone, Copy, Debug)]
struct OutputLayout {
    boxes: usize,
    classes: usize,
    scores: usize,
    count: Option<usize>,
}

pub struct OnnxSsdDetector {
    session: ort::session::Session,
    layout: OutputLayout,
    /// Fixed `(width, height)` when the model does not accept arbitrary sizes.
    input_size: Option<(u32, u32)>,
    max_detections: usize,
    min_score: f64,
}

impl OnnxSsdDetector {
    /// Loads the model and inspects its input and output signature.
    pub fn new(model_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let intra_threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let session = ort::session::Session::builder()?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
            .with_intra_threads(intra_threads)?
            .with_execution_providers(preferred_execution_providers())?
            .commit_from_file(model_path)?;

        // NHWC: [1, H, W, 3]; dynamic dimensions are reported as <= 0.
        let input_size = session.inputs().first().and_then(|input| {
            if let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() {
                if shape.len() == 4 && shape[1] > 0 && shape[2] > 0 {
                    return Some((shape[2] as u32, shape[1] as u32));
                }
            }
            None
        });

        let names: Vec<String> = session
            .outputs()
            .iter()
            .map(|o| o.name().to_string())
            .collect();
        let layout = resolve_layout(&names)?;
        log::debug!("SSD outputs {names:?}, fixed input {input_size:?}");

        Ok(Self {
            session,
            layout,
            input_size,
            max_detections: MAX_DETECTIONS,
            min_score: MIN_SCORE,
        })
    }

    fn input_tensor(&self, frame: &Frame) -> Result<ndarray::Array4<u8>, DetectError> {
        let (pixels, w, h) = match self.input_size {
            Some((w, h)) if (w, h) != (frame.width(), frame.height()) => {
                let img = frame
                    .to_rgb_image()
                    .ok_or_else(|| DetectError::Frame("pixel buffer does not match size".into()))?;
                let resized =
                    image::imageops::resize(&img, w, h, image::imageops::FilterType::Triangle);
                (resized.into_raw(), w, h)
            }
            _ => (frame.data().to_vec(), frame.width(), frame.height()),
        };
        ndarray::Array4::from_shape_vec((1, h as usize, w as usize, Frame::CHANNELS), pixels)
            .map_err(|e| DetectError::Frame(e.to_string()))
    }
}

impl ObjectDetector for OnnxSsdDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(DetectError::Frame("empty frame".into()));
        }
        let tensor = self.input_tensor(frame)?;
        let input = ort::value::Tensor::from_array(tensor).map_err(inference_err)?;
        let outputs = self
            .session
            .run(ort::inputs![input])
            .map_err(inference_err)?;

        let layout = self.layout;
        let boxes = outputs[layout.boxes]
            .try_extract_array::<f32>()
            .map_err(inference_err)?;
        let classes = outputs[layout.classes]
            .try_extract_array::<f32>()
            .map_err(inference_err)?;
        let scores = outputs[layout.scores]
            .try_extract_array::<f32>()
            .map_err(inference_err)?;

        let boxes = boxes
            .as_slice()
            .ok_or_else(|| DetectError::Output("boxes are not contiguous".into()))?;
        let classes = classes
            .as_slice()
            .ok_or_else(|| DetectError::Output("classes are not contiguous".into()))?;
        let scores = scores
            .as_slice()
            .ok_or_else(|| DetectError::Output("scores are not contiguous".into()))?;

        let count = match layout.count {
            Some(idx) => {
                let n = outputs[idx]
                    .try_extract_array::<f32>()
                    .map_err(inference_err)?;
                n.iter().next().map(|v| *v as usize).unwrap_or(0)
            }
            None => scores.len(),
        };

        decode_detections(
            &RawOutputs {
                boxes,
                classes,
                scores,
                count,
            },
            frame.width(),
            frame.height(),
            self.min_score,
            self.max_detections,
        )
    }
}

/// Borrowed, flattened model outputs for a single image.
struct RawOutputs<'a> {
    boxes: &'a [f32],
    classes: &'a [f32],
    scores: &'a [f32],
    count: usize,
}

/// Turns raw SSD tensors into detections in frame pixel space.
///
/// Keeps at most `max` entries scoring at least `min_score`, in the
/// model's own (score-descending) order.
fn decode_detections(
    raw: &RawOutputs<'_>,
    frame_width: u32,
    frame_height: u32,
    min_score: f64,
    max: usize,
) -> Result<Vec<Detection>, DetectError> {
    let available = raw.scores.len().min(raw.classes.len()).min(raw.boxes.len() / 4);
    if raw.count > available {
        return Err(DetectError::Output(format!(
            "model reported {} detections but returned {available}",
            raw.count
        )));
    }

    let detections = (0..raw.count)
        .filter(|&i| raw.scores[i] as f64 >= min_score)
        .take(max)
        .map(|i| {
            let corners = [
                raw.boxes[i * 4],
                raw.boxes[i * 4 + 1],
                raw.boxes[i * 4 + 2],
                raw.boxes[i * 4 + 3],
            ];
            let class_id = raw.classes[i].round().max(0.0) as u32;
            Detection::new(
                label_for(class_id).unwrap_or(UNKNOWN_LABEL),
                raw.scores[i] as f64,
                BoundingBox::from_normalized_corners(corners, frame_width, frame_height),
            )
        })
        .collect();
    Ok(detections)
}

fn resolve_layout(names: &[String]) -> Result<OutputLayout, DetectError> {
    let find = |key: &str| names.iter().position(|n| n.contains(key));
    Ok(OutputLayout {
        boxes: find("boxes").ok_or_else(|| missing_output("boxes"))?,
        classes: find("classes").ok_or_else(|| missing_output("classes"))?,
        scores: find("scores").ok_or_else(|| missing_output("scores"))?,
        count: find("num_detections"),
    })
}

fn missing_output(name: &str) -> DetectError {
    DetectError::Output(format!("model has no {name} output"))
}

fn inference_err(e: impl std::fmt::Display) -> DetectError {
    DetectError::Inference(e.to_string())
}

/// Hardware execution providers worth trying on this platform; ONNX Runtime
/// falls back to the CPU provider when none of them registers.
fn preferred_execution_providers() -> Vec<ort::execution_providers::ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    let providers = vec![ort::execution_providers::CoreMLExecutionProvider::default().build()];
    #[cfg(target_os = "windows")]
    let providers = vec![ort::execution_providers::DirectMLExecutionProvider::default().build()];
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    let providers = Vec::new();
    providers
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_resolve_layout_tensorflow_names() {
        let layout = resolve_layout(&names(&[
            "detection_boxes:0",
            "detection_classes:0",
            "detection_scores:0",
            "num_detections:0",
        ]))
        .unwrap();
        assert_eq!(
            (layout.boxes, layout.classes, layout.scores, layout.count),
            (0, 1, 2, Some(3))
        );
    }

    #[test]
    fn test_resolve_layout_without_count() {
        let layout = resolve_layout(&names(&["scores", "boxes", "classes"])).unwrap();
        assert_eq!((layout.boxes, layout.classes, layout.scores), (1, 2, 0));
        assert!(layout.count.is_none());
    }

    #[test]
    fn test_resolve_layout_missing_boxes_errors() {
        let err = resolve_layout(&names(&["scores", "classes"])).unwrap_err();
        assert!(err.to_string().contains("boxes"));
    }

    #[test]
    fn test_decode_maps_boxes_and_labels() {
        let boxes = [0.1, 0.2, 0.5, 0.6, 0.0, 0.0, 1.0, 1.0];
        let classes = [1.0, 18.0];
        let scores = [0.9, 0.7];
        let raw = RawOutputs {
            boxes: &boxes,
            classes: &classes,
            scores: &scores,
            count: 2,
        };
        let dets = decode_detections(&raw, 1000, 500, 0.5, 20).unwrap();

        assert_eq!(dets.len(), 2);
        assert_eq!(dets[0].class, "person");
        assert_eq!(dets[1].class, "dog");
        assert_relative_eq!(dets[0].bbox.x, 200.0, epsilon = 1e-3);
        assert_relative_eq!(dets[0].bbox.y, 50.0, epsilon = 1e-3);
        assert_relative_eq!(dets[0].bbox.width, 400.0, epsilon = 1e-3);
        assert_relative_eq!(dets[0].bbox.height, 200.0, epsilon = 1e-3);
        assert_relative_eq!(dets[0].confidence, 0.9, epsilon = 1e-6);
    }

    #[test]
    fn test_decode_respects_count_min_score_and_max() {
        let boxes = [0.0f32; 4 * 5];
        let classes = [3.0f32; 5];
        let scores = [0.95f32, 0.8, 0.4, 0.75, 0.99];
        let raw = RawOutputs {
            boxes: &boxes,
            classes: &classes,
            scores: &scores,
            count: 4,
        };
        let dets = decode_detections(&raw, 10, 10, 0.5, 2).unwrap();
        assert_eq!(dets.len(), 2);
        assert_relative_eq!(dets[0].confidence, 0.95, epsilon = 1e-6);
        assert_relative_eq!(dets[1].confidence, 0.8, epsilon = 1e-6);
    }

    #[test]
    fn test_decode_unknown_class_id() {
        let boxes = [0.0f32; 4];
        let raw = RawOutputs {
            boxes: &boxes,
            classes: &[12.0],
            scores: &[0.9],
            count: 1,
        };
        let dets = decode_detections(&raw, 10, 10, 0.5, 20).unwrap();
        assert_eq!(dets[0].class, UNKNOWN_LABEL);
    }

    #[test]
    fn test_decode_count_larger_than_tensors_errors() {
        let boxes = [0.0f32; 4];
        let raw = RawOutputs {
            boxes: &boxes,
            classes: &[1.0],
            scores: &[0.9],
            count: 3,
        };
        assert!(matches!(
            decode_detections(&raw, 10, 10, 0.5, 20),
            Err(DetectError::Output(_))
        ));
    }

    #[test]
    fn test_decode_empty() {
        let raw = RawOutputs {
            boxes: &[],
            classes: &[],
            scores: &[],
            count: 0,
        };
        assert!(decode_detections(&raw, 10, 10, 0.5, 20).unwrap().is_empty());
    }
}
