use crate::shared::constants::{IDEAL_HEIGHT, IDEAL_WIDTH};
use crate::shared::frame::Frame;

use super::domain::capture_error::CaptureError;
use super::domain::facing_mode::FacingMode;
use super::domain::media_devices::{MediaConstraints, MediaDevices, MediaStream, VideoInputDevice};

/// The one camera stream currently open.
pub struct ActiveSession {
    stream: Box<dyn MediaStream>,
    facing_mode: FacingMode,
    generation: u64,
    frames_read: usize,
}

impl ActiveSession {
    pub fn facing_mode(&self) -> FacingMode {
        self.facing_mode
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn frames_read(&self) -> usize {
        self.frames_read
    }

    pub fn live_tracks(&self) -> usize {
        self.stream.live_tracks()
    }
}

/// Owns camera access and the lifecycle of the single active stream.
///
/// At most one hardware stream is open at any time: every start releases
/// the previous session before asking the host for a new one. Each session
/// gets a fresh generation number, and releasing a session bumps it too, so
/// anything computed from an older session's frames can be recognized as
/// stale downstream.
pub struct CaptureController {
    devices: Box<dyn MediaDevices>,
    session: Option<ActiveSession>,
    facing_mode: FacingMode,
    generation: u64,
    ideal_width: u32,
    ideal_height: u32,
}

impl CaptureController {
    pub fn new(devices: Box<dyn MediaDevices>) -> Self {
        Self {
            devices,
            session: None,
            facing_mode: FacingMode::default(),
            generation: 0,
            ideal_width: IDEAL_WIDTH,
            ideal_height: IDEAL_HEIGHT,
        }
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.ideal_width = width;
        self.ideal_height = height;
        self
    }

    pub fn is_supported(&self) -> bool {
        self.devices.is_supported()
    }

    /// Queries the host for cameras. Never fails: enumeration errors are
    /// logged and reported as an empty inventory.
    pub fn list_video_inputs(&self) -> Vec<VideoInputDevice> {
        match self.devices.enumerate_video_inputs() {
            Ok(devices) => devices,
            Err(e) => {
                log::error!("Error enumerating devices: {e}");
                Vec::new()
            }
        }
    }

    pub fn has_multiple_inputs(&self) -> bool {
        self.list_video_inputs().len() > 1
    }

    /// Releases any open session, then opens a stream for `facing_mode`.
    ///
    /// On failure no session is left active; reporting the error to the
    /// user is the caller's job.
    pub fn start_camera(&mut self, facing_mode: FacingMode) -> Result<&ActiveSession, CaptureError> {
        self.release();

        let constraints = MediaConstraints::new(facing_mode)
            .with_resolution(self.ideal_width, self.ideal_height);
        let stream = match self.devices.get_user_media(&constraints) {
            Ok(stream) => stream,
            Err(e) => {
                log::error!("Error accessing camera: {e}");
                return Err(e);
            }
        };

        self.generation += 1;
        self.facing_mode = facing_mode;
        log::info!(
            "Started {facing_mode} camera (session {})",
            self.generation
        );
        Ok(self.session.insert(ActiveSession {
            stream,
            facing_mode,
            generation: self.generation,
            frames_read: 0,
        }))
    }

    /// Restarts capture with the other facing mode.
    ///
    /// Does nothing and returns `Ok(None)` when no session is active.
    pub fn switch_facing(&mut self) -> Result<Option<&ActiveSession>, CaptureError> {
        if self.session.is_none() {
            return Ok(None);
        }
        let next = self.facing_mode.toggled();
        self.start_camera(next).map(Some)
    }

    /// Stops the active session, if any.
    pub fn stop_capture(&mut self) {
        if self.release() {
            log::info!("Capture stopped");
        }
    }

    /// Reads the next frame from the active stream, stamped with its
    /// session generation. `None` when no session is active or the stream
    /// has ended.
    pub fn next_frame(&mut self) -> Option<Result<Frame, CaptureError>> {
        let session = self.session.as_mut()?;
        match session.stream.read_frame() {
            Ok(Some(frame)) => {
                let frame = frame
                    .with_generation(session.generation)
                    .with_index(session.frames_read);
                session.frames_read += 1;
                Some(Ok(frame))
            }
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }

    pub fn active_session(&self) -> Option<&ActiveSession> {
        self.session.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// Facing mode of the most recent successful start.
    pub fn facing_mode(&self) -> FacingMode {
        self.facing_mode
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn release(&mut self) -> bool {
        let Some(mut session) = self.session.take() else {
            return false;
        };
        session.stream.stop();
        self.generation += 1;
        log::debug!(
            "Released {} camera after {} frames",
            session.facing_mode,
            session.frames_read
        );
        true
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Counts open streams across the fake host so tests can observe
    /// how many were ever live at the same time.
    #[derive(Clone, Default)]
    pub(crate) struct StreamLedger {
        open: Arc<AtomicUsize>,
        max_open: Arc<AtomicUsize>,
        requests: Arc<Mutex<Vec<MediaConstraints>>>,
    }

    impl StreamLedger {
        pub(crate) fn open(&self) -> usize {
            self.open.load(Ordering::SeqCst)
        }

        pub(crate) fn max_open(&self) -> usize {
            self.max_open.load(Ordering::SeqCst)
        }

        pub(crate) fn requests(&self) -> Vec<MediaConstraints> {
            self.requests.lock().unwrap().clone()
        }
    }

    pub(crate) struct FakeStream {
        ledger: StreamLedger,
        live: bool,
        width: u32,
        height: u32,
    }

    impl MediaStream for FakeStream {
        fn live_tracks(&self) -> usize {
            usize::from(self.live)
        }

        fn stop(&mut self) {
            if self.live {
                self.live = false;
                self.ledger.open.fetch_sub(1, Ordering::SeqCst);
            }
        }

        fn read_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
            if !self.live {
                return Ok(None);
            }
            let len = (self.width * self.height * 3) as usize;
            Ok(Some(Frame::new(vec![0u8; len], self.width, self.height, 0)))
        }
    }

    pub(crate) struct FakeMediaDevices {
        pub(crate) supported: bool,
        pub(crate) devices: Result<Vec<VideoInputDevice>, String>,
        pub(crate) deny: bool,
        /// Requests past this many are denied.
        pub(crate) grant_limit: Option<usize>,
        pub(crate) ledger: StreamLedger,
    }

    impl FakeMediaDevices {
        pub(crate) fn with_cameras(count: usize) -> Self {
            Self {
                supported: true,
                devices: Ok((0..count)
                    .map(|i| VideoInputDevice::new(format!("cam{i}"), format!("Camera {i}")))
                    .collect()),
                deny: false,
                grant_limit: None,
                ledger: StreamLedger::default(),
            }
        }
    }

    impl MediaDevices for FakeMediaDevices {
        fn is_supported(&self) -> bool {
            self.supported
        }

        fn enumerate_video_inputs(&self) -> Result<Vec<VideoInputDevice>, CaptureError> {
            self.devices.clone().map_err(CaptureError::Enumeration)
        }

        fn get_user_media(
            &mut self,
            constraints: &MediaConstraints,
        ) -> Result<Box<dyn MediaStream>, CaptureError> {
            let requested = {
                let mut requests = self.ledger.requests.lock().unwrap();
                requests.push(*constraints);
                requests.len()
            };
            if self.deny || self.grant_limit.is_some_and(|limit| requested > limit) {
                return Err(CaptureError::PermissionDenied {
                    device: "cam0".into(),
                });
            }
            let open = self.ledger.open.fetch_add(1, Ordering::SeqCst) + 1;
            self.ledger.max_open.fetch_max(open, Ordering::SeqCst);
            Ok(Box::new(FakeStream {
                ledger: self.ledger.clone(),
                live: true,
                width: constraints.ideal_width,
                height: constraints.ideal_height,
            }))
        }
    }

    fn controller(devices: FakeMediaDevices) -> (CaptureController, StreamLedger) {
        let ledger = devices.ledger.clone();
        (CaptureController::new(Box::new(devices)), ledger)
    }

    #[test]
    fn test_start_camera_requests_vga_with_facing_mode() {
        let (mut ctl, ledger) = controller(FakeMediaDevices::with_cameras(1));
        let session = ctl.start_camera(FacingMode::User).unwrap();
        assert_eq!(session.facing_mode(), FacingMode::User);
        assert_eq!(session.live_tracks(), 1);

        let requests = ledger.requests();
        assert_eq!(requests, vec![MediaConstraints::new(FacingMode::User)]);
        assert_eq!(ledger.open(), 1);
    }

    #[test]
    fn test_start_camera_stops_previous_stream_first() {
        let (mut ctl, ledger) = controller(FakeMediaDevices::with_cameras(2));
        ctl.start_camera(FacingMode::User).unwrap();
        ctl.start_camera(FacingMode::Environment).unwrap();
        assert_eq!(ledger.open(), 1);
        assert_eq!(ledger.max_open(), 1);
    }

    #[test]
    fn test_switch_twice_never_opens_two_streams() {
        let (mut ctl, ledger) = controller(FakeMediaDevices::with_cameras(2));
        ctl.start_camera(FacingMode::User).unwrap();

        let first = ctl.switch_facing().unwrap().unwrap().facing_mode();
        assert_eq!(first, FacingMode::Environment);
        let second = ctl.switch_facing().unwrap().unwrap().facing_mode();
        assert_eq!(second, FacingMode::User);

        assert_eq!(ledger.open(), 1);
        assert_eq!(ledger.max_open(), 1);
        assert_eq!(ledger.requests().len(), 3);
    }

    #[test]
    fn test_switch_without_session_is_noop() {
        let (mut ctl, ledger) = controller(FakeMediaDevices::with_cameras(2));
        assert!(ctl.switch_facing().unwrap().is_none());
        assert!(ledger.requests().is_empty());
        assert_eq!(ctl.generation(), 0);
    }

    #[test]
    fn test_failed_start_leaves_no_session() {
        let mut devices = FakeMediaDevices::with_cameras(1);
        devices.deny = true;
        let (mut ctl, ledger) = controller(devices);

        let err = ctl.start_camera(FacingMode::User).err().unwrap();
        assert!(matches!(err, CaptureError::PermissionDenied { .. }));
        assert!(!ctl.is_active());
        assert_eq!(ledger.open(), 0);
    }

    #[test]
    fn test_failed_restart_still_releases_old_stream() {
        let (mut ctl, ledger) = controller(FakeMediaDevices::with_cameras(2));
        ctl.start_camera(FacingMode::User).unwrap();
        let before = ctl.generation();

        ctl.devices = Box::new(FakeMediaDevices {
            deny: true,
            ledger: ledger.clone(),
            ..FakeMediaDevices::with_cameras(2)
        });
        assert!(ctl.switch_facing().is_err());
        assert!(!ctl.is_active());
        assert_eq!(ledger.open(), 0);
        assert!(ctl.generation() > before);
    }

    #[test]
    fn test_list_video_inputs_fails_soft() {
        let mut devices = FakeMediaDevices::with_cameras(0);
        devices.devices = Err("bus error".into());
        let (ctl, _) = controller(devices);
        assert!(ctl.list_video_inputs().is_empty());
        assert!(!ctl.has_multiple_inputs());
    }

    #[test]
    fn test_has_multiple_inputs() {
        let (one, _) = controller(FakeMediaDevices::with_cameras(1));
        let (two, _) = controller(FakeMediaDevices::with_cameras(2));
        assert!(!one.has_multiple_inputs());
        assert!(two.has_multiple_inputs());
    }

    #[test]
    fn test_generation_advances_per_session_and_stop() {
        let (mut ctl, _) = controller(FakeMediaDevices::with_cameras(2));
        let g1 = ctl.start_camera(FacingMode::User).unwrap().generation();
        let g2 = ctl.switch_facing().unwrap().unwrap().generation();
        assert!(g2 > g1);

        ctl.stop_capture();
        assert!(ctl.generation() > g2);
        assert!(!ctl.is_active());
    }

    #[test]
    fn test_next_frame_stamps_generation_and_index() {
        let (mut ctl, _) = controller(FakeMediaDevices::with_cameras(1));
        assert!(ctl.next_frame().is_none());

        let generation = ctl.start_camera(FacingMode::User).unwrap().generation();
        let f0 = ctl.next_frame().unwrap().unwrap();
        let f1 = ctl.next_frame().unwrap().unwrap();
        assert_eq!(f0.generation(), generation);
        assert_eq!((f0.index(), f1.index()), (0, 1));
        assert_eq!((f0.width(), f0.height()), (640, 480));
        assert_eq!(ctl.active_session().unwrap().frames_read(), 2);
    }

    #[test]
    fn test_custom_resolution_is_requested() {
        let devices = FakeMediaDevices::with_cameras(1);
        let ledger = devices.ledger.clone();
        let mut ctl = CaptureController::new(Box::new(devices)).with_resolution(1280, 720);
        ctl.start_camera(FacingMode::Environment).unwrap();
        let req = ledger.requests()[0];
        assert_eq!((req.ideal_width, req.ideal_height), (1280, 720));
        assert_eq!(req.facing_mode, FacingMode::Environment);
    }
}
