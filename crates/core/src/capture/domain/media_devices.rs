use crate::shared::constants::{IDEAL_HEIGHT, IDEAL_WIDTH};
use crate::shared::frame::Frame;

use super::capture_error::CaptureError;
use super::facing_mode::FacingMode;

/// Descriptor of one camera as reported by device enumeration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoInputDevice {
    /// Backend-specific identifier used to open the device.
    pub id: String,
    /// Human-readable name; may be empty.
    pub label: String,
}

impl VideoInputDevice {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// What a stream request asks for. Resolution is a preference, not a
/// requirement: backends fall back to the device default when it cannot be met.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MediaConstraints {
    pub facing_mode: FacingMode,
    pub ideal_width: u32,
    pub ideal_height: u32,
}

impl MediaConstraints {
    pub fn new(facing_mode: FacingMode) -> Self {
        Self {
            facing_mode,
            ideal_width: IDEAL_WIDTH,
            ideal_height: IDEAL_HEIGHT,
        }
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.ideal_width = width;
        self.ideal_height = height;
        self
    }
}

/// A live camera stream.
pub trait MediaStream: Send {
    /// Number of tracks still producing data. Zero once stopped.
    fn live_tracks(&self) -> usize;

    /// Stops every track and releases the device.
    fn stop(&mut self);

    /// Blocks until the next frame is decoded.
    ///
    /// Returns `Ok(None)` once the stream has ended or been stopped.
    fn read_frame(&mut self) -> Result<Option<Frame>, CaptureError>;
}

/// Host media-capture capability: device discovery and stream acquisition.
pub trait MediaDevices: Send {
    fn is_supported(&self) -> bool;

    fn enumerate_video_inputs(&self) -> Result<Vec<VideoInputDevice>, CaptureError>;

    fn get_user_media(
        &mut self,
        constraints: &MediaConstraints,
    ) -> Result<Box<dyn MediaStream>, CaptureError>;
}

/// Picks the device that best matches a facing mode.
///
/// A label naming the side ("front"/"back", "rear", ...) wins; otherwise
/// the front camera is the first device and the back camera the last.
pub fn select_device(
    devices: &[VideoInputDevice],
    facing_mode: FacingMode,
) -> Option<&VideoInputDevice> {
    let keywords: &[&str] = match facing_mode {
        FacingMode::User => &["front", "user", "facetime"],
        FacingMode::Environment => &["back", "rear", "environment"],
    };
    let by_label = devices.iter().find(|d| {
        let label = d.label.to_lowercase();
        keywords.iter().any(|k| label.contains(k))
    });
    by_label.or(match facing_mode {
        FacingMode::User => devices.first(),
        FacingMode::Environment => devices.last(),
    })
}
