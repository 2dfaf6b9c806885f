use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::worker::domain::worker_launcher::StartError;

/// Why a request ended without a detection.
#[derive(Error, Debug)]
pub enum WorkerFailure {
    #[error("failed to start detection worker: {0}")]
    Start(#[from] StartError),
    /// Reason string from an `{"error": ...}` message.
    #[error("{0}")]
    Reported(String),
    #[error("detection worker exited with code {0}")]
    Exited(i32),
    #[error("detection worker produced no result within {}s", .0.as_secs_f64())]
    Unresponsive(Duration),
}

/// Terminal resolution of one request.
#[derive(Debug)]
pub enum Outcome {
    Success {
        /// Number of humans as reported by the worker.
        count: u32,
        detections: Vec<Value>,
        timestamp: String,
    },
    Timeout,
    Failure(WorkerFailure),
}

impl Outcome {
    pub fn kind(&self) -> &'static str {
        match self {
            Outcome::Success { .. } => "success",
            Outcome::Timeout => "timeout",
            Outcome::Failure(_) => "failure",
        }
    }
}
