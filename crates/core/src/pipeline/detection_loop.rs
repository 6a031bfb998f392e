use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detection::domain::object_detector::{DetectError, ObjectDetector};
use crate::overlay::domain::annotation::{DisplayScale, OverlayAnnotation};
use crate::overlay::domain::overlay_surface::{NodeId, OverlayNode, OverlaySurface};
use crate::shared::constants::CONFIDENCE_THRESHOLD;
use crate::shared::detection::Detection;
use crate::shared::frame::{Frame, FrameInfo};

use super::loop_logger::{LoopLogger, NullLoopLogger};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    /// No frame has arrived from the current session yet.
    Idle,
    /// Armed: the next refresh may submit a frame.
    Detecting,
    /// Reconciling the overlay against a detection result.
    Rendering,
    Stopped,
}

/// What to do when the detector fails on a frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Keep the previous overlay and try again on the next refresh.
    #[default]
    Retry,
    /// Clear the overlay and stop the loop.
    Halt,
}

/// Result of one detection cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The overlay now shows `annotations` highlight/label pairs.
    Rendered { annotations: usize },
    /// The overlay was cleared but the view has no usable size.
    Skipped,
    /// The result belongs to an earlier session and was dropped.
    Stale,
    /// The detector failed; the previous overlay is kept.
    Retrying,
    /// The loop is idle or stopped and did not run.
    NotArmed,
}

#[derive(Error, Debug)]
pub enum DetectionLoopError {
    #[error("detection halted: {0}")]
    Halted(#[source] DetectError),
}

/// Turns detector output into overlay annotations, one cycle per refresh.
///
/// Every cycle first removes all nodes drawn by the previous one, so the
/// surface never holds more than one frame's annotations. Results are
/// matched against the generation of the session the loop is armed for and
/// dropped when they come from an older one.
pub struct DetectionLoop<S: OverlaySurface> {
    surface: S,
    state: LoopState,
    generation: Option<u64>,
    live_nodes: Vec<NodeId>,
    policy: FailurePolicy,
    logger: Box<dyn LoopLogger>,
}

impl<S: OverlaySurface> DetectionLoop<S> {
    pub fn new(surface: S) -> Self {
        Self {
            surface,
            state: LoopState::Idle,
            generation: None,
            live_nodes: Vec::new(),
            policy: FailurePolicy::default(),
            logger: Box::new(NullLoopLogger),
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_logger(mut self, logger: Box<dyn LoopLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Generation of the session the loop is armed for.
    pub fn generation(&self) -> Option<u64> {
        self.generation
    }

    /// True when the next refresh should submit a frame.
    pub fn is_armed(&self) -> bool {
        self.state == LoopState::Detecting
    }

    pub fn live_node_count(&self) -> usize {
        self.live_nodes.len()
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn logger(&self) -> &dyn LoopLogger {
        self.logger.as_ref()
    }

    pub fn logger_mut(&mut self) -> &mut dyn LoopLogger {
        self.logger.as_mut()
    }

    /// The session with `generation` produced its first frame.
    ///
    /// Arms the loop for that session and returns true. Repeated edges for
    /// the generation already armed are ignored, including after the loop
    /// halted on it. Overlay left from an earlier session is cleared.
    pub fn on_frame_ready(&mut self, generation: u64) -> bool {
        if self.generation == Some(generation) {
            return false;
        }
        self.clear_overlay();
        self.generation = Some(generation);
        self.state = LoopState::Detecting;
        log::debug!("Detection loop armed for session {generation}");
        true
    }

    /// Runs the detector on `frame` and reconciles the overlay with the result.
    pub fn run_detection_cycle(
        &mut self,
        frame: &Frame,
        detector: &mut dyn ObjectDetector,
    ) -> Result<CycleOutcome, DetectionLoopError> {
        let info = frame.info();
        if let Some(outcome) = self.reject(&info) {
            return Ok(outcome);
        }
        let started = Instant::now();
        let result = detector.detect(frame);
        self.logger
            .timing("detect", started.elapsed().as_secs_f64() * 1000.0);
        self.complete_cycle(info, result)
    }

    /// Second half of a cycle: applies a detection result computed for the
    /// frame described by `info`, possibly on another thread.
    pub fn complete_cycle(
        &mut self,
        info: FrameInfo,
        result: Result<Vec<Detection>, DetectError>,
    ) -> Result<CycleOutcome, DetectionLoopError> {
        if let Some(outcome) = self.reject(&info) {
            return Ok(outcome);
        }

        let detections = match result {
            Ok(detections) => detections,
            Err(e) => return self.fail(e),
        };

        self.state = LoopState::Rendering;
        let started = Instant::now();
        self.clear_overlay();

        let outcome = match DisplayScale::between(
            info.width,
            info.height,
            self.surface.displayed_size(),
        ) {
            Some(scale) => {
                let annotations = self.render(&detections, scale);
                self.logger.metric("detections", detections.len() as f64);
                self.logger.metric("annotations", annotations as f64);
                CycleOutcome::Rendered { annotations }
            }
            None => {
                log::debug!(
                    "Skipping render for {}x{} frame on {:?} view",
                    info.width,
                    info.height,
                    self.surface.displayed_size()
                );
                CycleOutcome::Skipped
            }
        };

        self.logger
            .timing("render", started.elapsed().as_secs_f64() * 1000.0);
        self.logger.cycle();
        self.state = LoopState::Detecting;
        Ok(outcome)
    }

    /// Clears the overlay and stops processing results until a new session
    /// becomes ready.
    pub fn stop(&mut self) {
        self.clear_overlay();
        if self.state != LoopState::Stopped {
            self.state = LoopState::Stopped;
            self.logger.info("Detection loop stopped");
        }
    }

    fn reject(&self, info: &FrameInfo) -> Option<CycleOutcome> {
        if self.state == LoopState::Idle {
            return Some(CycleOutcome::NotArmed);
        }
        if self.generation != Some(info.generation) {
            log::debug!(
                "Dropping result for session {} (armed for {:?})",
                info.generation,
                self.generation
            );
            return Some(CycleOutcome::Stale);
        }
        if self.state != LoopState::Detecting {
            return Some(CycleOutcome::NotArmed);
        }
        None
    }

    fn fail(&mut self, error: DetectError) -> Result<CycleOutcome, DetectionLoopError> {
        self.logger.metric("detect_failures", 1.0);
        match self.policy {
            FailurePolicy::Retry => {
                log::warn!("Detection failed, retrying on next refresh: {error}");
                Ok(CycleOutcome::Retrying)
            }
            FailurePolicy::Halt => {
                log::error!("Detection failed, halting: {error}");
                self.stop();
                Err(DetectionLoopError::Halted(error))
            }
        }
    }

    fn render(&mut self, detections: &[Detection], scale: DisplayScale) -> usize {
        let mut annotations = 0;
        for detection in detections
            .iter()
            .filter(|d| d.exceeds(CONFIDENCE_THRESHOLD))
        {
            let annotation = OverlayAnnotation::from_detection(detection, scale);
            let highlight = self
                .surface
                .append(OverlayNode::Highlight(annotation.highlight));
            let label = self.surface.append(OverlayNode::Label(annotation.label));
            self.live_nodes.push(highlight);
            self.live_nodes.push(label);
            annotations += 1;
        }
        annotations
    }

    fn clear_overlay(&mut self) {
        for id in self.live_nodes.drain(..) {
            self.surface.remove(id);
        }
    }
}
