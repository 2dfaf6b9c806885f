use std::time::Duration;

pub const DEFAULT_SCRIPT_NAME: &str = "detect_human.py";

/// Interpreter inside a virtual environment next to the worker script.
#[cfg(not(target_os = "windows"))]
pub const VENV_INTERPRETER: &str = "venv/bin/python3";
#[cfg(target_os = "windows")]
pub const VENV_INTERPRETER: &str = "venv\\Scripts\\python.exe";

#[cfg(not(target_os = "windows"))]
pub const FALLBACK_INTERPRETER: &str = "python3";
#[cfg(target_os = "windows")]
pub const FALLBACK_INTERPRETER: &str = "python";

pub const TIMEOUT_MESSAGE: &str = "No human detected within timeout period";

pub const DEFAULT_CONFIDENCE: f64 = 0.5;
pub const DEFAULT_CAMERA: &str = "0";

/// Size of each raw read from the worker's stdout.
pub const READ_CHUNK_SIZE: usize = 4096;

/// Default cap on a partial worker stdout line.
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// Control channel capacity. Worker readers block once it is full.
pub const EVENT_QUEUE_CAPACITY: usize = 64;

/// How often the exit watcher polls the child process.
pub const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

pub const SETTINGS_DIR_NAME: &str = "humanwatch";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
