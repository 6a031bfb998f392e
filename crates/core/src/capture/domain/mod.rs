pub mod capture_error;
pub mod facing_mode;
pub mod media_devices;
