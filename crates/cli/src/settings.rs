use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use live_detect_core::pipeline::detection_loop::FailurePolicy;
use live_detect_core::shared::constants::{
    DEFAULT_REFRESH_HZ, IDEAL_HEIGHT, IDEAL_WIDTH, MAX_REFRESH_HZ, MIN_REFRESH_HZ,
};

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to read settings {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Persisted live-view preferences. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveViewSettings {
    pub refresh_hz: f64,
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub failure_policy: FailurePolicy,
    pub detect_on_worker: bool,
    /// Rendered live-view size; the native frame size when unset.
    pub display_width: Option<f64>,
    pub display_height: Option<f64>,
    pub model_path: Option<PathBuf>,
}

impl Default for LiveViewSettings {
    fn default() -> Self {
        Self {
            refresh_hz: DEFAULT_REFRESH_HZ,
            ideal_width: IDEAL_WIDTH,
            ideal_height: IDEAL_HEIGHT,
            failure_policy: FailurePolicy::default(),
            detect_on_worker: false,
            display_width: None,
            display_height: None,
            model_path: None,
        }
    }
}

impl LiveViewSettings {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("LiveDetect").join("settings.json"))
    }

    /// Loads settings from `path`. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let json = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Self = serde_json::from_str(&json).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(MIN_REFRESH_HZ..=MAX_REFRESH_HZ).contains(&self.refresh_hz) {
            return Err(invalid(
                "refresh_hz",
                format!(
                    "must be between {MIN_REFRESH_HZ} and {MAX_REFRESH_HZ}, got {}",
                    self.refresh_hz
                ),
            ));
        }
        if self.ideal_width == 0 || self.ideal_height == 0 {
            return Err(invalid(
                "ideal resolution",
                format!("must be non-zero, got {}x{}", self.ideal_width, self.ideal_height),
            ));
        }
        for (field, value) in [
            ("display_width", self.display_width),
            ("display_height", self.display_height),
        ] {
            if let Some(v) = value {
                if !(v.is_finite() && v >= 0.0) {
                    return Err(invalid(field, format!("must be non-negative, got {v}")));
                }
            }
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: String) -> SettingsError {
    SettingsError::Invalid { field, reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let tmp = TempDir::new().unwrap();
        let settings = LiveViewSettings::load_from(&tmp.path().join("none.json")).unwrap();
        assert_eq!(settings, LiveViewSettings::default());
        assert_eq!(settings.refresh_hz, 60.0);
        assert_eq!((settings.ideal_width, settings.ideal_height), (640, 480));
    }

    #[test]
    fn test_load_preserves_written_values() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("settings.json");
        let settings = LiveViewSettings {
            refresh_hz: 30.0,
            failure_policy: FailurePolicy::Halt,
            display_width: Some(320.0),
            display_height: Some(240.0),
            ..LiveViewSettings::default()
        };
        fs::write(&path, serde_json::to_string_pretty(&settings).unwrap()).unwrap();
        assert_eq!(LiveViewSettings::load_from(&path).unwrap(), settings);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("settings.json");
        fs::write(&path, r#"{ "failure_policy": "halt" }"#).unwrap();

        let settings = LiveViewSettings::load_from(&path).unwrap();
        assert_eq!(settings.failure_policy, FailurePolicy::Halt);
        assert!(!settings.detect_on_worker);
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("settings.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            LiveViewSettings::load_from(&path),
            Err(SettingsError::Parse { .. })
        ));
    }

    #[rstest]
    #[case::zero_refresh(r#"{ "refresh_hz": 0.0 }"#)]
    #[case::tiny_refresh(r#"{ "refresh_hz": 1e-30 }"#)]
    #[case::huge_refresh(r#"{ "refresh_hz": 1e9 }"#)]
    #[case::zero_width(r#"{ "ideal_width": 0 }"#)]
    #[case::negative_display(r#"{ "display_width": -1.0 }"#)]
    fn test_invalid_values_are_rejected(#[case] json: &str) {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("settings.json");
        fs::write(&path, json).unwrap();
        assert!(matches!(
            LiveViewSettings::load_from(&path),
            Err(SettingsError::Invalid { .. })
        ));
    }

    #[test]
    fn test_default_path_is_app_scoped() {
        if let Some(path) = LiveViewSettings::default_path() {
            assert!(path.ends_with("LiveDetect/settings.json"));
        }
    }
}
