use thiserror::Error;

use super::facing_mode::FacingMode;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("media capture is not supported on this host")]
    Unsupported,
    #[error("failed to enumerate devices: {0}")]
    Enumeration(String),
    #[error("no video input available for {facing_mode} facing mode")]
    NoDevice { facing_mode: FacingMode },
    #[error("permission denied opening {device}")]
    PermissionDenied { device: String },
    #[error("constraints cannot be satisfied by {device}: {reason}")]
    Overconstrained { device: String, reason: String },
    #[error("failed to open {device}: {source}")]
    Open {
        device: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("failed to read frame: {0}")]
    Read(String),
}
