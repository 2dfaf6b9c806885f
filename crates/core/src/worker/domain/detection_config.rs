use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::constants::{DEFAULT_CAMERA, DEFAULT_CONFIDENCE};

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("confidence must be between 0.0 and 1.0, got {0}")]
    Confidence(f64),
    #[error("camera source must not be empty")]
    EmptyCamera,
    #[error("emotion interval must be at least 1")]
    EmotionInterval,
    #[error("timeout must be a finite number of seconds, got {0}")]
    Timeout(f64),
    #[error("unknown detection method '{0}', expected hog, mobilenet or yolo")]
    UnknownMethod(String),
}

/// Person detector the worker should load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMethod {
    Hog,
    #[default]
    Mobilenet,
    Yolo,
}

impl DetectionMethod {
    pub const ALL: &'static [DetectionMethod] = &[
        DetectionMethod::Hog,
        DetectionMethod::Mobilenet,
        DetectionMethod::Yolo,
    ];

    pub fn as_arg(&self) -> &'static str {
        match self {
            DetectionMethod::Hog => "hog",
            DetectionMethod::Mobilenet => "mobilenet",
            DetectionMethod::Yolo => "yolo",
        }
    }
}

impl std::fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_arg())
    }
}

impl std::str::FromStr for DetectionMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DetectionMethod::ALL
            .iter()
            .copied()
            .find(|m| m.as_arg().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigError::UnknownMethod(s.to_string()))
    }
}

/// Per-request detection settings. A copy is taken when a trigger arrives,
/// so later configuration changes never affect a running worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub method: DetectionMethod,
    /// Minimum person confidence as a 0-1 fraction.
    pub confidence: f64,
    /// Camera index or device/stream path.
    pub camera: String,
    /// Show the worker's preview window.
    pub display: bool,
    pub emotion: bool,
    /// Analyse emotion on every Nth detection.
    pub emotion_interval: u32,
    /// Seconds to wait for a detection. Zero or negative waits forever.
    pub timeout_secs: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            method: DetectionMethod::default(),
            confidence: DEFAULT_CONFIDENCE,
            camera: DEFAULT_CAMERA.to_string(),
            display: false,
            emotion: false,
            emotion_interval: 1,
            timeout_secs: 0.0,
        }
    }
}

impl DetectionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(ConfigError::Confidence(self.confidence));
        }
        if self.camera.trim().is_empty() {
            return Err(ConfigError::EmptyCamera);
        }
        if self.emotion_interval == 0 {
            return Err(ConfigError::EmotionInterval);
        }
        if !self.timeout_secs.is_finite() {
            return Err(ConfigError::Timeout(self.timeout_secs));
        }
        Ok(())
    }

    /// The user timeout, or `None` when it is disabled.
    pub fn timeout(&self) -> Option<Duration> {
        if self.timeout_secs.is_finite() && self.timeout_secs > 0.0 {
            Some(Duration::from_secs_f64(self.timeout_secs))
        } else {
            None
        }
    }

    /// Worker arguments after the script path, in the order the worker
    /// expects them.
    pub fn worker_args(&self) -> Vec<String> {
        let mut args = vec![
            "--method".to_string(),
            self.method.as_arg().to_string(),
            "--confidence".to_string(),
            self.confidence.to_string(),
            "--camera".to_string(),
            self.camera.clone(),
        ];
        if !self.display {
            args.push("--no-display".to_string());
        }
        if self.emotion {
            args.push("--emotion".to_string());
            if self.emotion_interval > 1 {
                args.push("--emotion-interval".to_string());
                args.push(self.emotion_interval.to_string());
            }
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_default_args() {
        let args = DetectionConfig::default().worker_args();
        assert_eq!(
            args,
            vec![
                "--method",
                "mobilenet",
                "--confidence",
                "0.5",
                "--camera",
                "0",
                "--no-display"
            ]
        );
    }

    #[test]
    fn test_display_and_emotion_flags() {
        let config = DetectionConfig {
            method: DetectionMethod::Yolo,
            confidence: 0.75,
            camera: "/dev/video2".to_string(),
            display: true,
            emotion: true,
            ..Default::default()
        };
        assert_eq!(
            config.worker_args(),
            vec![
                "--method",
                "yolo",
                "--confidence",
                "0.75",
                "--camera",
                "/dev/video2",
                "--emotion"
            ]
        );
    }

    #[test]
    fn test_emotion_interval_only_forwarded_with_emotion() {
        let mut config = DetectionConfig {
            emotion_interval: 3,
            ..Default::default()
        };
        assert!(!config.worker_args().contains(&"--emotion-interval".to_string()));

        config.emotion = true;
        let args = config.worker_args();
        assert_eq!(&args[args.len() - 3..], ["--emotion", "--emotion-interval", "3"]);
    }

    #[rstest]
    #[case::zero(0.0, None)]
    #[case::negative(-5.0, None)]
    #[case::nan(f64::NAN, None)]
    #[case::two_seconds(2.0, Some(Duration::from_secs(2)))]
    #[case::fractional(0.25, Some(Duration::from_millis(250)))]
    fn test_timeout(#[case] secs: f64, #[case] expected: Option<Duration>) {
        let config = DetectionConfig {
            timeout_secs: secs,
            ..Default::default()
        };
        assert_eq!(config.timeout(), expected);
    }

    #[rstest]
    #[case::confidence_too_high(DetectionConfig { confidence: 1.5, ..Default::default() }, ConfigError::Confidence(1.5))]
    #[case::confidence_negative(DetectionConfig { confidence: -0.1, ..Default::default() }, ConfigError::Confidence(-0.1))]
    #[case::empty_camera(DetectionConfig { camera: " ".to_string(), ..Default::default() }, ConfigError::EmptyCamera)]
    #[case::zero_interval(DetectionConfig { emotion_interval: 0, ..Default::default() }, ConfigError::EmotionInterval)]
    #[case::infinite_timeout(DetectionConfig { timeout_secs: f64::INFINITY, ..Default::default() }, ConfigError::Timeout(f64::INFINITY))]
    fn test_validate_rejects(#[case] config: DetectionConfig, #[case] expected: ConfigError) {
        assert_eq!(config.validate(), Err(expected));
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(DetectionConfig::default().validate().is_ok());
    }

    #[rstest]
    #[case("hog", DetectionMethod::Hog)]
    #[case("MobileNet", DetectionMethod::Mobilenet)]
    #[case(" yolo ", DetectionMethod::Yolo)]
    fn test_method_from_str(#[case] input: &str, #[case] expected: DetectionMethod) {
        assert_eq!(input.parse::<DetectionMethod>().unwrap(), expected);
    }

    #[test]
    fn test_unknown_method_is_rejected() {
        assert_eq!(
            "ssd".parse::<DetectionMethod>(),
            Err(ConfigError::UnknownMethod("ssd".to_string()))
        );
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: DetectionConfig =
            serde_json::from_str(r#"{"method":"hog","timeout_secs":5}"#).unwrap();
        assert_eq!(config.method, DetectionMethod::Hog);
        assert_eq!(config.camera, "0");
        assert_eq!(config.timeout(), Some(Duration::from_secs(5)));
    }
}
