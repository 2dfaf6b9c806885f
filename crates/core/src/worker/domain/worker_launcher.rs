use std::path::PathBuf;

use thiserror::Error;

use crate::supervisor::domain::supervisor_event::{EventSender, Generation, SupervisorEvent, WorkerEvent};
use crate::worker::domain::detection_config::DetectionConfig;

#[derive(Error, Debug)]
pub enum StartError {
    #[error("worker script not found: {0}")]
    ScriptNotFound(PathBuf),
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("worker {0} pipe was not captured")]
    MissingPipe(&'static str),
}

/// Delivers one worker's output to the control loop, tagged with the
/// generation of the request it belongs to.
#[derive(Clone, Debug)]
pub struct WorkerEventSender {
    generation: Generation,
    events: EventSender,
}

impl WorkerEventSender {
    pub fn new(generation: Generation, events: impl Into<EventSender>) -> Self {
        Self {
            generation,
            events: events.into(),
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Blocks while the control channel is full, so a chatty worker is
    /// throttled to the pace of the control loop. Returns `false` once the
    /// control loop has gone away.
    pub fn send(&self, event: WorkerEvent) -> bool {
        self.events.send(SupervisorEvent::Worker {
            generation: self.generation,
            event,
        })
    }
}

/// A running worker owned by exactly one request.
pub trait WorkerHandle: Send {
    /// Force-terminates the worker without waiting for it.
    ///
    /// Must be idempotent and safe to call after the worker has exited.
    fn stop(&mut self);
}

/// Domain interface for starting detection workers.
pub trait WorkerLauncher: Send {
    fn start(
        &mut self,
        config: &DetectionConfig,
        events: WorkerEventSender,
    ) -> Result<Box<dyn WorkerHandle>, StartError>;
}
