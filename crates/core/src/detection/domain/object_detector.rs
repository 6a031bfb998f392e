use thiserror::Error;

use crate::shared::detection::Detection;
use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum DetectError {
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("unexpected model output: {0}")]
    Output(String),
    #[error("frame cannot be used for detection: {0}")]
    Frame(String),
    #[error("detection worker is gone")]
    WorkerGone,
}

/// Domain interface for the pretrained detection model.
///
/// The loop treats it as an oracle: one frame in, a list of labelled boxes
/// in frame pixel coordinates out. Result order carries no meaning.
pub trait ObjectDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectError>;
}
