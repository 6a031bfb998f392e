use std::fmt;

use crate::capture::capture_controller::CaptureController;
use crate::capture::domain::facing_mode::FacingMode;
use crate::detection::domain::object_detector::ObjectDetector;
use crate::detection::infrastructure::detection_worker::DetectionWorker;
use crate::overlay::domain::overlay_surface::{DisplaySize, OverlaySurface};
use crate::shared::frame::FrameInfo;

use super::detection_loop::{CycleOutcome, DetectionLoop, DetectionLoopError};

const ENABLE_CAPTION: &str = "Enable Webcam";
const UNSUPPORTED_CAPTION: &str = "Webcam not supported";
const SWITCH_CAPTION: &str = "Switch Camera";

/// Visibility, availability and caption of one user control.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControlState {
    pub visible: bool,
    pub enabled: bool,
    pub caption: String,
}

impl ControlState {
    fn hidden(caption: &str, enabled: bool) -> Self {
        Self {
            visible: false,
            enabled,
            caption: caption.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Controls {
    pub activation: ControlState,
    pub switch: ControlState,
}

/// Something the user must be told about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    CaptureUnsupported,
    CaptureFailed(String),
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::CaptureUnsupported => write!(f, "{UNSUPPORTED_CAPTION}"),
            Notice::CaptureFailed(message) => write!(f, "Error accessing camera: {message}"),
        }
    }
}

/// What one refresh did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Frame pulled from the camera, if any.
    pub frame: Option<FrameInfo>,
    /// Cycle completed during this refresh.
    pub cycle: Option<CycleOutcome>,
    /// A frame was handed to the background worker.
    pub submitted: bool,
}

enum DetectorRunner {
    Inline(Box<dyn ObjectDetector>),
    Worker(DetectionWorker),
}

/// The live view: camera controls, the model-ready gate and the per-refresh
/// drive of the detection loop.
pub struct LiveView<S: OverlaySurface> {
    capture: CaptureController,
    detection: DetectionLoop<S>,
    detector: Option<DetectorRunner>,
    use_worker: bool,
    follow_frame_size: bool,
    controls: Controls,
    notices: Vec<Notice>,
}

impl<S: OverlaySurface> LiveView<S> {
    pub fn new(capture: CaptureController, detection: DetectionLoop<S>) -> Self {
        let mut notices = Vec::new();
        let activation = if capture.is_supported() {
            ControlState::hidden(ENABLE_CAPTION, true)
        } else {
            log::warn!("Camera capture is not supported on this host");
            notices.push(Notice::CaptureUnsupported);
            ControlState::hidden(UNSUPPORTED_CAPTION, false)
        };
        Self {
            capture,
            detection,
            detector: None,
            use_worker: false,
            follow_frame_size: false,
            controls: Controls {
                activation,
                switch: ControlState::hidden(SWITCH_CAPTION, false),
            },
            notices,
        }
    }

    /// Run the detector on a background thread once the model is attached.
    pub fn with_worker(mut self, use_worker: bool) -> Self {
        self.use_worker = use_worker;
        self
    }

    /// Lay the view out at each frame's native size before it is rendered,
    /// instead of keeping the surface's own size.
    pub fn with_frame_size_follow(mut self, follow: bool) -> Self {
        self.follow_frame_size = follow;
        self
    }

    /// The model finished loading: controls become visible.
    pub fn attach_model(&mut self, detector: Box<dyn ObjectDetector>) {
        self.detector = Some(if self.use_worker {
            DetectorRunner::Worker(DetectionWorker::spawn(detector))
        } else {
            DetectorRunner::Inline(detector)
        });
        self.controls.activation.visible = true;
        self.controls.switch.visible = true;
        log::info!("Model ready");
    }

    pub fn model_ready(&self) -> bool {
        self.detector.is_some()
    }

    /// Activation control pressed: starts the user-facing camera.
    ///
    /// Returns whether a session is now running. Does nothing before the
    /// model is ready or when capture is unsupported.
    pub fn enable(&mut self) -> bool {
        if !self.model_ready() || !self.controls.activation.enabled {
            return false;
        }
        self.controls.activation.visible = false;
        if self.capture.has_multiple_inputs() {
            self.controls.switch.enabled = true;
        }
        self.start(FacingMode::User)
    }

    /// Switch control pressed. No-op without an active session.
    pub fn switch_camera(&mut self) -> bool {
        if !self.capture.is_active() {
            return false;
        }
        match self.capture.switch_facing() {
            Ok(session) => session.is_some(),
            Err(e) => {
                self.capture_failed(e.to_string());
                false
            }
        }
    }

    /// Stops capture and detection; the activation control comes back.
    pub fn stop(&mut self) {
        self.capture.stop_capture();
        self.detection.stop();
        if self.model_ready() {
            self.controls.activation.visible = true;
        }
    }

    /// One display refresh.
    pub fn tick(&mut self) -> Result<TickReport, DetectionLoopError> {
        let mut report = TickReport::default();

        if let Some(DetectorRunner::Worker(worker)) = &mut self.detector {
            if let Some(reply) = worker.try_reply() {
                self.detection
                    .logger_mut()
                    .timing("detect", reply.elapsed_ms);
                report.cycle = Some(self.detection.complete_cycle(reply.frame, reply.result)?);
            }
        }

        let frame = match self.capture.next_frame() {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => {
                log::warn!("Dropping frame: {e}");
                return Ok(report);
            }
            None => return Ok(report),
        };
        report.frame = Some(frame.info());
        if self.follow_frame_size {
            self.detection
                .surface_mut()
                .set_displayed_size(DisplaySize::new(
                    frame.width() as f64,
                    frame.height() as f64,
                ));
        }
        self.detection.on_frame_ready(frame.generation());
        if !self.detection.is_armed() {
            return Ok(report);
        }

        match &mut self.detector {
            Some(DetectorRunner::Inline(detector)) => {
                report.cycle = Some(
                    self.detection
                        .run_detection_cycle(&frame, detector.as_mut())?,
                );
            }
            Some(DetectorRunner::Worker(worker)) if !worker.is_busy() => {
                let info = frame.info();
                match worker.submit(frame) {
                    Ok(()) => report.submitted = true,
                    Err(e) => report.cycle = Some(self.detection.complete_cycle(info, Err(e))?),
                }
            }
            _ => {}
        }
        Ok(report)
    }

    /// Notices raised since the last call, oldest first.
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    pub fn controls(&self) -> &Controls {
        &self.controls
    }

    pub fn capture(&self) -> &CaptureController {
        &self.capture
    }

    pub fn detection_loop(&self) -> &DetectionLoop<S> {
        &self.detection
    }

    fn start(&mut self, facing_mode: FacingMode) -> bool {
        match self.capture.start_camera(facing_mode) {
            Ok(_) => true,
            Err(e) => {
                self.capture_failed(e.to_string());
                false
            }
        }
    }

    /// No session is left running; the activation control comes back so the
    /// user can retry.
    fn capture_failed(&mut self, message: String) {
        self.detection.stop();
        self.controls.activation.visible = true;
        self.notices.push(Notice::CaptureFailed(message));
    }
}
