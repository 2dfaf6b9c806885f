use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::constants::{
    DEFAULT_MAX_LINE_BYTES, DEFAULT_SCRIPT_NAME, SETTINGS_DIR_NAME, SETTINGS_FILE_NAME,
};
use crate::worker::domain::detection_config::{ConfigError, DetectionConfig};

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to read settings from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write settings to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not determine config directory")]
    NoConfigDir,
    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

/// Where and how to launch the worker script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub script: PathBuf,
    /// Overrides virtual environment / system interpreter lookup.
    pub interpreter: Option<PathBuf>,
    pub working_dir: Option<PathBuf>,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            script: PathBuf::from(DEFAULT_SCRIPT_NAME),
            interpreter: None,
            working_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub detection: DetectionConfig,
    pub worker: WorkerSettings,
    /// Upper bound on a request when no timeout is configured. Zero disables it.
    pub max_detection_secs: f64,
    /// Longest partial stdout line kept while waiting for a newline. Zero
    /// disables the cap.
    pub max_line_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            detection: DetectionConfig::default(),
            worker: WorkerSettings::default(),
            max_detection_secs: 0.0,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

impl Settings {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(SETTINGS_DIR_NAME).join(SETTINGS_FILE_NAME))
    }

    /// Loads the user settings file, falling back to defaults when there is none.
    pub fn load() -> Result<Self, SettingsError> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let json = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Settings =
            serde_json::from_str(&json).map_err(|source| SettingsError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        settings.detection.validate()?;
        Ok(settings)
    }

    pub fn save(&self) -> Result<(), SettingsError> {
        let path = Self::config_path().ok_or(SettingsError::NoConfigDir)?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        let write_err = |source: std::io::Error| SettingsError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| write_err(e.into()))?;
        fs::write(path, json).map_err(write_err)
    }

    pub fn hard_ceiling(&self) -> Option<Duration> {
        if self.max_detection_secs.is_finite() && self.max_detection_secs > 0.0 {
            Some(Duration::from_secs_f64(self.max_detection_secs))
        } else {
            None
        }
    }

    pub fn max_line_len(&self) -> Option<usize> {
        (self.max_line_bytes > 0).then_some(self.max_line_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::domain::detection_config::DetectionMethod;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.worker.script, PathBuf::from("detect_human.py"));
        assert!(settings.worker.interpreter.is_none());
        assert!(settings.hard_ceiling().is_none());
        assert_eq!(settings.max_line_len(), Some(DEFAULT_MAX_LINE_BYTES));
    }

    #[test]
    fn test_zero_max_line_bytes_disables_cap() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("settings.json");
        fs::write(&path, r#"{"max_line_bytes":0}"#).unwrap();

        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(loaded.max_line_len(), None);
    }

    #[test]
    fn test_save_and_load_preserves_values() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("settings.json");
        let mut settings = Settings::default();
        settings.detection.method = DetectionMethod::Hog;
        settings.detection.timeout_secs = 7.5;
        settings.worker.interpreter = Some(PathBuf::from("/usr/bin/python3"));
        settings.max_detection_secs = 120.0;

        settings.save_to(&path).unwrap();
        let loaded = Settings::load_from(&path).unwrap();

        assert_eq!(loaded, settings);
        assert_eq!(loaded.hard_ceiling(), Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("settings.json");
        fs::write(&path, r#"{"detection":{"camera":"rtsp://cam/1"}}"#).unwrap();

        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(loaded.detection.camera, "rtsp://cam/1");
        assert_eq!(loaded.detection.method, DetectionMethod::Mobilenet);
        assert_eq!(loaded.worker, WorkerSettings::default());
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("settings.json");
        fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            Settings::load_from(&path),
            Err(SettingsError::Parse { .. })
        ));
    }

    #[test]
    fn test_out_of_range_confidence_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("settings.json");
        fs::write(&path, r#"{"detection":{"confidence":50}}"#).unwrap();

        assert!(matches!(
            Settings::load_from(&path),
            Err(SettingsError::Invalid(ConfigError::Confidence(_)))
        ));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            Settings::load_from(&tmp.path().join("absent.json")),
            Err(SettingsError::Read { .. })
        ));
    }
}
