use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;
use std::thread;

use clap::Parser;
use crossbeam_channel::Receiver;
use serde_json::{json, Value};

use humanwatch_core::shared::settings::Settings;
use humanwatch_core::supervisor::detection_supervisor::{DetectionSupervisor, SupervisorHandle};
use humanwatch_core::supervisor::domain::status::Status;
use humanwatch_core::supervisor::infrastructure::channel_sink::{
    ChannelSupervisorSink, SinkMessage,
};
use humanwatch_core::worker::infrastructure::process_launcher::ProcessLauncher;

/// On-demand human detection driven by JSON lines on stdin.
///
/// Every JSON object read from stdin starts a detection; `{"reset": true}`
/// cancels the one in flight. Results are written to stdout as JSON lines.
#[derive(Parser)]
#[command(name = "humanwatch")]
struct Cli {
    /// Settings file (defaults to the user config directory).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Detection worker script.
    #[arg(long)]
    script: Option<PathBuf>,

    /// Interpreter for the worker script (skips the venv lookup).
    #[arg(long)]
    interpreter: Option<PathBuf>,

    /// Directory the worker runs in.
    #[arg(long)]
    working_dir: Option<PathBuf>,

    /// Detection method: hog, mobilenet or yolo.
    #[arg(long)]
    method: Option<String>,

    /// Person detection confidence threshold (0.0-1.0).
    #[arg(long)]
    confidence: Option<f64>,

    /// Camera index or device path.
    #[arg(long)]
    camera: Option<String>,

    /// Show the worker's preview window.
    #[arg(long, conflicts_with = "no_display")]
    display: bool,

    /// Hide the preview window even if the settings file enables it.
    #[arg(long)]
    no_display: bool,

    /// Analyse facial emotion for each detected person.
    #[arg(long, conflicts_with = "no_emotion")]
    emotion: bool,

    /// Skip emotion analysis even if the settings file enables it.
    #[arg(long)]
    no_emotion: bool,

    /// Analyse emotion on every Nth detection.
    #[arg(long)]
    emotion_interval: Option<u32>,

    /// Seconds to wait for a detection (0 = wait forever).
    #[arg(long)]
    timeout: Option<f64>,

    /// Fail a request after this many seconds when no timeout is set (0 = off).
    #[arg(long)]
    max_detection_time: Option<f64>,

    /// Longest partial worker output line to buffer, in bytes (0 = no limit).
    #[arg(long)]
    max_line_bytes: Option<usize>,

    /// Run a single detection and exit: 0 detected, 2 timed out, 1 failed.
    #[arg(long)]
    once: bool,

    /// Write the effective settings to the user config file and exit.
    #[arg(long)]
    save_settings: bool,
}

/// One parsed line of host input.
#[derive(Debug, PartialEq)]
enum HostInput {
    Trigger(Value),
    Reset,
}

fn main() {
    env_logger::init();

    match run() {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}

fn run() -> Result<i32, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;

    let settings = load_settings(&cli)?;
    if cli.save_settings {
        settings.save()?;
        if let Some(path) = Settings::config_path() {
            log::info!("Settings written to {}", path.display());
        }
        return Ok(0);
    }

    let launcher = ProcessLauncher::from_settings(&settings.worker);
    let (sink_tx, sink_rx) = crossbeam_channel::unbounded();
    let handle = DetectionSupervisor::new(
        settings.detection.clone(),
        Box::new(launcher),
        Box::new(ChannelSupervisorSink::new(sink_tx)),
    )
    .with_hard_ceiling(settings.hard_ceiling())
    .with_max_line_len(settings.max_line_len())
    .spawn();

    let code = if cli.once {
        run_once(&handle, &sink_rx)?
    } else {
        run_stream(&handle, &sink_rx)?;
        0
    };

    handle.shutdown();
    Ok(code)
}

fn run_once(
    handle: &SupervisorHandle,
    sink_rx: &Receiver<SinkMessage>,
) -> Result<i32, Box<dyn std::error::Error>> {
    handle.trigger(json!({}));

    for message in sink_rx.iter() {
        let code = match &message {
            SinkMessage::Detected(_) => Some(0),
            SinkMessage::TimedOut(_) => Some(2),
            SinkMessage::Failed(_) => Some(1),
            _ => None,
        };
        report(message)?;
        if let Some(code) = code {
            return Ok(code);
        }
    }
    Err("detection supervisor stopped unexpectedly".into())
}

/// Forwards stdin to the supervisor until stdin closes and the last
/// request has finished. Triggers and resets go through the same handle so
/// they reach the supervisor in input order.
fn run_stream(
    handle: &SupervisorHandle,
    sink_rx: &Receiver<SinkMessage>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut input = spawn_input_reader();
    let mut input_closed = false;
    // Triggers sent but not yet acknowledged with a `detecting` status.
    let mut unacknowledged = 0usize;
    let mut idle = true;

    loop {
        crossbeam_channel::select! {
            recv(input) -> line => match line {
                Ok(line) => match parse_input(&line) {
                    Ok(Some(HostInput::Trigger(context))) => {
                        if handle.trigger(context) {
                            unacknowledged += 1;
                        }
                    }
                    Ok(Some(HostInput::Reset)) => {
                        handle.reset();
                    }
                    Ok(None) => {}
                    Err(reason) => log::warn!("Ignoring input line: {reason}"),
                },
                Err(_) => {
                    log::debug!("Input closed");
                    input_closed = true;
                    input = crossbeam_channel::never();
                }
            },
            recv(sink_rx) -> message => {
                let message = message.map_err(|_| "detection supervisor stopped unexpectedly")?;
                match &message {
                    SinkMessage::Status(Status::Detecting) => {
                        unacknowledged = unacknowledged.saturating_sub(1);
                        idle = false;
                    }
                    SinkMessage::Status(Status::Idle) => idle = true,
                    _ => {}
                }
                report(message)?;
            },
        }

        if input_closed && unacknowledged == 0 && idle {
            return Ok(());
        }
    }
}

fn spawn_input_reader() -> Receiver<String> {
    let (tx, rx) = crossbeam_channel::unbounded();
    thread::spawn(move || {
        for line in io::stdin().lock().lines().map_while(Result::ok) {
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Parses one stdin line. Blank lines yield `None`.
fn parse_input(line: &str) -> Result<Option<HostInput>, String> {
    if line.trim().is_empty() {
        return Ok(None);
    }
    let value: Value = serde_json::from_str(line).map_err(|e| format!("invalid JSON: {e}"))?;
    let is_reset = value.get("reset") == Some(&Value::Bool(true));
    match value {
        Value::Object(_) if is_reset => Ok(Some(HostInput::Reset)),
        Value::Object(_) => Ok(Some(HostInput::Trigger(value))),
        other => Err(format!("expected a JSON object, got {other}")),
    }
}

fn report(message: SinkMessage) -> io::Result<()> {
    match message {
        SinkMessage::Detected(msg) => emit("detected", msg),
        SinkMessage::TimedOut(msg) => emit("timeout", msg),
        // Already logged by the supervisor.
        SinkMessage::Failed(_) => Ok(()),
        SinkMessage::Status(status) => {
            log::info!("Status: {status}");
            Ok(())
        }
        SinkMessage::Diagnostic(line) => {
            log::info!("worker: {line}");
            Ok(())
        }
        SinkMessage::Warning(line) => {
            log::warn!("worker: {line}");
            Ok(())
        }
    }
}

fn emit(output: &str, msg: Value) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{}", json!({ "output": output, "msg": msg }))?;
    stdout.flush()
}

fn load_settings(cli: &Cli) -> Result<Settings, Box<dyn std::error::Error>> {
    let mut settings = match &cli.settings {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };

    if let Some(script) = &cli.script {
        settings.worker.script = script.clone();
    }
    if cli.interpreter.is_some() {
        settings.worker.interpreter = cli.interpreter.clone();
    }
    if cli.working_dir.is_some() {
        settings.worker.working_dir = cli.working_dir.clone();
    }

    let detection = &mut settings.detection;
    if let Some(method) = &cli.method {
        detection.method = method.parse()?;
    }
    if let Some(confidence) = cli.confidence {
        detection.confidence = confidence;
    }
    if let Some(camera) = &cli.camera {
        detection.camera = camera.clone();
    }
    if cli.display {
        detection.display = true;
    } else if cli.no_display {
        detection.display = false;
    }
    if cli.emotion {
        detection.emotion = true;
    } else if cli.no_emotion {
        detection.emotion = false;
    }
    if let Some(interval) = cli.emotion_interval {
        detection.emotion_interval = interval;
    }
    if let Some(timeout) = cli.timeout {
        detection.timeout_secs = timeout;
    }
    if let Some(max) = cli.max_detection_time {
        settings.max_detection_secs = max;
    }
    if let Some(max) = cli.max_line_bytes {
        settings.max_line_bytes = max;
    }

    settings.detection.validate()?;
    Ok(settings)
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(path) = &cli.settings {
        if !path.exists() {
            return Err(format!("Settings file not found: {}", path.display()).into());
        }
    }
    if let Some(confidence) = cli.confidence {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(format!(
                "Confidence must be between 0.0 and 1.0, got {confidence}"
            )
            .into());
        }
    }
    if cli.emotion_interval == Some(0) {
        return Err("Emotion interval must be at least 1".into());
    }
    if let Some(timeout) = cli.timeout {
        if !timeout.is_finite() || timeout < 0.0 {
            return Err(format!("Timeout must be a non-negative number, got {timeout}").into());
        }
    }
    if let Some(max) = cli.max_detection_time {
        if !max.is_finite() || max < 0.0 {
            return Err(format!(
                "Max detection time must be a non-negative number, got {max}"
            )
            .into());
        }
    }
    if cli.once && cli.save_settings {
        return Err("--once and --save-settings are mutually exclusive".into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn settings_file(dir: &TempDir, json: &str) -> String {
        let path = dir.path().join("settings.json");
        fs::write(&path, json).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_object_is_trigger_with_whole_context() {
        assert_eq!(
            parse_input(r#"{"topic":"door","payload":1}"#),
            Ok(Some(HostInput::Trigger(json!({"topic": "door", "payload": 1}))))
        );
    }

    #[test]
    fn test_reset_flag_is_reset() {
        assert_eq!(parse_input(r#"{"reset":true}"#), Ok(Some(HostInput::Reset)));
    }

    #[test]
    fn test_reset_false_is_trigger() {
        assert!(matches!(
            parse_input(r#"{"reset":false}"#),
            Ok(Some(HostInput::Trigger(_)))
        ));
    }

    #[test]
    fn test_blank_line_is_skipped() {
        assert_eq!(parse_input("   "), Ok(None));
    }

    #[test]
    fn test_non_object_is_rejected() {
        assert!(parse_input("[1,2]").is_err());
        assert!(parse_input("42").is_err());
        assert!(parse_input("not json").is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_flags() {
        let cli = Cli::parse_from([
            "humanwatch",
            "--settings",
            "/nonexistent/settings.json",
            "--method",
            "yolo",
            "--timeout",
            "3",
        ]);
        assert!(validate(&cli).is_err());

        let cli = Cli::parse_from(["humanwatch", "--confidence", "1.5"]);
        assert!(validate(&cli).is_err());

        let cli = Cli::parse_from(["humanwatch", "--emotion", "--emotion-interval", "3"]);
        assert!(validate(&cli).is_ok());
        assert!(cli.emotion);
        assert_eq!(cli.emotion_interval, Some(3));
    }

    #[test]
    fn test_negative_flags_override_settings_file() {
        let dir = TempDir::new().unwrap();
        let path = settings_file(&dir, r#"{"detection":{"display":true,"emotion":true}}"#);

        let cli = Cli::parse_from(["humanwatch", "--settings", &path, "--no-emotion", "--no-display"]);
        let settings = load_settings(&cli).unwrap();
        assert!(!settings.detection.emotion);
        assert!(!settings.detection.display);

        let cli = Cli::parse_from(["humanwatch", "--settings", &path]);
        let settings = load_settings(&cli).unwrap();
        assert!(settings.detection.emotion);
        assert!(settings.detection.display);
    }

    #[test]
    fn test_positive_and_negative_flags_conflict() {
        assert!(Cli::try_parse_from(["humanwatch", "--emotion", "--no-emotion"]).is_err());
        assert!(Cli::try_parse_from(["humanwatch", "--display", "--no-display"]).is_err());
    }

    #[test]
    fn test_max_line_bytes_flag_overrides_settings() {
        let dir = TempDir::new().unwrap();
        let path = settings_file(&dir, r#"{"max_line_bytes":4096}"#);

        let cli = Cli::parse_from(["humanwatch", "--settings", &path, "--max-line-bytes", "0"]);
        assert_eq!(load_settings(&cli).unwrap().max_line_len(), None);
    }
}
