use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::path::PathBuf;
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crate::shared::constants::{EXIT_POLL_INTERVAL, READ_CHUNK_SIZE};
use crate::shared::settings::WorkerSettings;
use crate::supervisor::domain::supervisor_event::WorkerEvent;
use crate::worker::domain::detection_config::DetectionConfig;
use crate::worker::domain::worker_launcher::{
    StartError, WorkerEventSender, WorkerHandle, WorkerLauncher,
};
use crate::worker::infrastructure::interpreter_resolver;

/// Launches the detection script as a child process.
///
/// Layout per worker: `stdout reader → control loop`, `stderr reader →
/// control loop`, and an exit watcher that reports the exit code once the
/// stdout reader has drained, so no output is lost behind the exit event.
pub struct ProcessLauncher {
    script: PathBuf,
    interpreter: Option<PathBuf>,
    working_dir: Option<PathBuf>,
}

impl ProcessLauncher {
    pub fn new(script: impl Into<PathBuf>) -> Self {
        Self {
            script: script.into(),
            interpreter: None,
            working_dir: None,
        }
    }

    pub fn from_settings(settings: &WorkerSettings) -> Self {
        Self::new(&settings.script)
            .with_interpreter(settings.interpreter.clone())
            .with_working_dir(settings.working_dir.clone())
    }

    pub fn with_interpreter(mut self, interpreter: Option<PathBuf>) -> Self {
        self.interpreter = interpreter;
        self
    }

    pub fn with_working_dir(mut self, working_dir: Option<PathBuf>) -> Self {
        self.working_dir = working_dir;
        self
    }

    /// Interpreter and full argument list for `config`.
    pub fn command_line(&self, config: &DetectionConfig) -> (PathBuf, Vec<String>) {
        let interpreter = interpreter_resolver::resolve(self.interpreter.as_deref(), &self.base_dir());
        let mut args = vec![self.script.to_string_lossy().into_owned()];
        args.extend(config.worker_args());
        (interpreter, args)
    }

    /// Where the script lives relative to the launcher's own directory.
    fn script_on_disk(&self) -> PathBuf {
        match &self.working_dir {
            Some(dir) if self.script.is_relative() => dir.join(&self.script),
            _ => self.script.clone(),
        }
    }

    fn base_dir(&self) -> PathBuf {
        if let Some(dir) = &self.working_dir {
            return dir.clone();
        }
        match self.script.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

impl WorkerLauncher for ProcessLauncher {
    fn start(
        &mut self,
        config: &DetectionConfig,
        events: WorkerEventSender,
    ) -> Result<Box<dyn WorkerHandle>, StartError> {
        let script = self.script_on_disk();
        if !script.is_file() {
            return Err(StartError::ScriptNotFound(script));
        }

        let (interpreter, args) = self.command_line(config);
        let mut command = Command::new(&interpreter);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        log::debug!("Launching {} {}", interpreter.display(), args.join(" "));
        let mut child = command.spawn().map_err(|source| StartError::Spawn {
            program: interpreter.clone(),
            source,
        })?;
        let pid = child.id();

        let (stdout, stderr) = match take_pipes(&mut child) {
            Ok(pipes) => pipes,
            Err(e) => {
                let _ = child.kill();
                return Err(e);
            }
        };

        log::info!(
            "Started worker pid {pid} for request {}",
            events.generation()
        );

        let child = Arc::new(Mutex::new(child));
        let stdout_reader = spawn_stdout_reader(stdout, events.clone());
        spawn_stderr_reader(stderr, events.clone());
        spawn_exit_watcher(child.clone(), stdout_reader, events);

        Ok(Box::new(ProcessHandle {
            child,
            pid,
            stopped: false,
        }))
    }
}

/// Owning handle to one worker process. Dropping it kills the process.
pub struct ProcessHandle {
    child: Arc<Mutex<Child>>,
    pid: u32,
    stopped: bool,
}

impl WorkerHandle for ProcessHandle {
    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        let mut child = lock_child(&self.child);
        match child.try_wait() {
            Ok(Some(_)) => log::debug!("Worker pid {} already exited", self.pid),
            _ => match child.kill() {
                Ok(()) => log::debug!("Killed worker pid {}", self.pid),
                Err(e) => log::debug!("Could not kill worker pid {}: {e}", self.pid),
            },
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn take_pipes(child: &mut Child) -> Result<(ChildStdout, ChildStderr), StartError> {
    let stdout = child.stdout.take().ok_or(StartError::MissingPipe("stdout"))?;
    let stderr = child.stderr.take().ok_or(StartError::MissingPipe("stderr"))?;
    Ok((stdout, stderr))
}

fn lock_child(child: &Mutex<Child>) -> MutexGuard<'_, Child> {
    child.lock().unwrap_or_else(PoisonError::into_inner)
}

fn spawn_stdout_reader(mut stdout: ChildStdout, events: WorkerEventSender) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut buf = [0u8; READ_CHUNK_SIZE];
        loop {
            match stdout.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if !events.send(WorkerEvent::Stdout(buf[..n].to_vec())) {
                        break;
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::debug!("Worker stdout closed: {e}");
                    break;
                }
            }
        }
    })
}

fn spawn_stderr_reader(stderr: ChildStderr, events: WorkerEventSender) {
    thread::spawn(move || {
        let reader = BufReader::new(stderr);
        for line in reader.split(b'\n') {
            let Ok(line) = line else { break };
            let text = String::from_utf8_lossy(&line).trim_end().to_string();
            if text.is_empty() {
                continue;
            }
            if !events.send(WorkerEvent::Stderr(text)) {
                break;
            }
        }
    });
}

fn spawn_exit_watcher(
    child: Arc<Mutex<Child>>,
    stdout_reader: JoinHandle<()>,
    events: WorkerEventSender,
) {
    thread::spawn(move || {
        let code = loop {
            let polled = lock_child(&child).try_wait();
            match polled {
                Ok(Some(status)) => break status.code(),
                Ok(None) => thread::sleep(EXIT_POLL_INTERVAL),
                Err(e) => {
                    log::warn!("Failed to poll worker process: {e}");
                    break None;
                }
            }
        };

        if stdout_reader.join().is_err() {
            log::warn!("Worker stdout reader panicked");
        }
        events.send(WorkerEvent::Exited(code));
    });
}
