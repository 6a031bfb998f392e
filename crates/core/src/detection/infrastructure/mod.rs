pub mod coco_labels;
pub mod detection_worker;
pub mod model_resolver;
pub mod onnx_ssd_detector;
