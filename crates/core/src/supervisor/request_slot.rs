use serde_json::Value;

use crate::protocol::domain::line_demuxer::LineDemuxer;
use crate::supervisor::domain::supervisor_event::Generation;
use crate::worker::domain::detection_config::DetectionConfig;
use crate::worker::domain::worker_launcher::WorkerHandle;

/// The one in-flight request and everything it owns.
pub struct ActiveRequest {
    pub generation: Generation,
    /// Caller context, echoed back on success.
    pub context: Value,
    pub config: DetectionConfig,
    pub worker: Option<Box<dyn WorkerHandle>>,
    pub demuxer: LineDemuxer,
}

impl ActiveRequest {
    /// Stops the worker, if one was started. Safe to call repeatedly.
    pub fn stop_worker(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
        }
        let pending = self.demuxer.pending_len();
        if pending > 0 {
            log::debug!(
                "Request {} dropped {pending} bytes of partial output",
                self.generation
            );
        }
        self.demuxer.reset();
    }
}

impl Drop for ActiveRequest {
    fn drop(&mut self) {
        self.stop_worker();
    }
}

/// Holds at most one live request.
///
/// Resolving a request means taking it out of the slot, so a second
/// resolution attempt for the same generation finds nothing to resolve.
#[derive(Default)]
pub struct RequestSlot {
    next_generation: Generation,
    active: Option<ActiveRequest>,
    max_line_len: Option<usize>,
}

impl RequestSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps the partial stdout line each request may buffer.
    pub fn with_max_line_len(mut self, max: Option<usize>) -> Self {
        self.max_line_len = max;
        self
    }

    /// Installs a new request and returns its generation.
    ///
    /// Any request still in the slot is handed back to the caller, who must
    /// tear it down.
    pub fn begin(
        &mut self,
        context: Value,
        config: DetectionConfig,
    ) -> (Generation, Option<ActiveRequest>) {
        self.next_generation += 1;
        let generation = self.next_generation;
        let demuxer = match self.max_line_len {
            Some(max) => LineDemuxer::new().with_max_line_len(max),
            None => LineDemuxer::new(),
        };
        let previous = self.active.replace(ActiveRequest {
            generation,
            context,
            config,
            worker: None,
            demuxer,
        });
        (generation, previous)
    }

    pub fn is_current(&self, generation: Generation) -> bool {
        self.active
            .as_ref()
            .is_some_and(|request| request.generation == generation)
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_none()
    }

    pub fn current_mut(&mut self, generation: Generation) -> Option<&mut ActiveRequest> {
        self.active
            .as_mut()
            .filter(|request| request.generation == generation)
    }

    /// Removes the request if `generation` is still live.
    pub fn take(&mut self, generation: Generation) -> Option<ActiveRequest> {
        if self.is_current(generation) {
            self.active.take()
        } else {
            None
        }
    }

    pub fn take_any(&mut self) -> Option<ActiveRequest> {
        self.active.take()
    }
}
