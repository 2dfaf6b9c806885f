use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use serde_json::Value;

use crate::protocol::domain::protocol_message::{decode, Decoded, ProtocolMessage};
use crate::shared::constants::EVENT_QUEUE_CAPACITY;
use crate::supervisor::domain::outcome::{Outcome, WorkerFailure};
use crate::supervisor::domain::reset_source::ResetSource;
use crate::supervisor::domain::status::Status;
use crate::supervisor::domain::supervisor_event::{
    EventSender, Generation, QueuedEvent, SupervisorEvent, WorkerEvent,
};
use crate::supervisor::domain::supervisor_sink::SupervisorSink;
use crate::supervisor::outcome_router;
use crate::supervisor::request_slot::{ActiveRequest, RequestSlot};
use crate::supervisor::timeout_race::{TimeoutRace, TimerKind};
use crate::worker::domain::detection_config::DetectionConfig;
use crate::worker::domain::worker_launcher::{WorkerEventSender, WorkerLauncher};

/// State machine that runs one detection worker per request.
///
/// Every input arrives through a single bounded event channel and is handled
/// on one thread, so worker output, worker exit, timer expiry and new
/// triggers can never interleave. Each request resolves at most once:
/// resolution takes the request out of the slot, and anything arriving for
/// it afterwards is dropped as stale.
pub struct DetectionSupervisor {
    config: DetectionConfig,
    hard_ceiling: Option<Duration>,
    launcher: Box<dyn WorkerLauncher>,
    sink: Box<dyn SupervisorSink>,
    slot: RequestSlot,
    timer: TimeoutRace,
    status: Status,
    events_tx: EventSender,
    events_rx: Receiver<QueuedEvent>,
}

impl DetectionSupervisor {
    pub fn new(
        config: DetectionConfig,
        launcher: Box<dyn WorkerLauncher>,
        sink: Box<dyn SupervisorSink>,
    ) -> Self {
        let (events_tx, events_rx) = crossbeam_channel::bounded(EVENT_QUEUE_CAPACITY);
        Self {
            config,
            hard_ceiling: None,
            launcher,
            sink,
            slot: RequestSlot::new(),
            timer: TimeoutRace::new(),
            status: Status::Idle,
            events_tx: EventSender::new(events_tx),
            events_rx,
        }
    }

    /// Upper bound on a request when no timeout is configured.
    pub fn with_hard_ceiling(mut self, ceiling: Option<Duration>) -> Self {
        self.hard_ceiling = ceiling.filter(|ceiling| !ceiling.is_zero());
        self
    }

    /// Caps the partial stdout line buffered per request. `None` keeps
    /// everything until a newline arrives.
    pub fn with_max_line_len(mut self, max: Option<usize>) -> Self {
        self.slot = std::mem::take(&mut self.slot).with_max_line_len(max);
        self
    }

    pub fn with_reset_source(self, source: &mut dyn ResetSource) -> Self {
        let events = self.events_tx.clone();
        source.subscribe(Box::new(move || {
            events.send(SupervisorEvent::Reset);
        }));
        self
    }

    /// Handles one event. Returns `false` once the supervisor has shut down.
    pub fn handle(&mut self, event: SupervisorEvent) -> bool {
        match event {
            SupervisorEvent::Trigger(context) => self.trigger(context),
            SupervisorEvent::Worker { generation, event } => self.on_worker_event(generation, event),
            SupervisorEvent::Reset => self.reset(),
            SupervisorEvent::Shutdown => {
                self.shutdown();
                return false;
            }
        }
        true
    }

    /// Handles every event already queued, without waiting.
    pub fn dispatch_pending(&mut self) -> bool {
        while let Ok(queued) = self.events_rx.try_recv() {
            if !self.process(queued) {
                return false;
            }
        }
        true
    }

    /// Starts a request for `context`, superseding any request in flight.
    pub fn trigger(&mut self, context: Value) {
        let (generation, previous) = self.slot.begin(context, self.config.clone());
        if let Some(previous) = previous {
            log::info!("Request {} superseded by {generation}", previous.generation);
            self.teardown(previous);
        }
        // Announced once per trigger, even when already detecting.
        self.status = Status::Detecting;
        self.sink.status(&self.status);

        let events = WorkerEventSender::new(generation, self.events_tx.clone());
        match self.launcher.start(&self.config, events) {
            Ok(worker) => {
                if let Some(request) = self.slot.current_mut(generation) {
                    request.worker = Some(worker);
                }
            }
            Err(e) => {
                self.resolve(generation, Outcome::Failure(e.into()));
                return;
            }
        }

        let now = Instant::now();
        if let Some(timeout) = self.config.timeout() {
            self.timer
                .arm(generation, timeout, TimerKind::UserTimeout, now);
        } else if let Some(ceiling) = self.hard_ceiling {
            self.timer
                .arm(generation, ceiling, TimerKind::HardCeiling, now);
        }
        log::info!("Request {generation} detecting");
    }

    /// Resolves the live request if its timer has expired at `now`.
    pub fn expire_timers(&mut self, now: Instant) {
        let Some(timer) = self.timer.fire(now) else {
            return;
        };
        let outcome = match timer.kind {
            TimerKind::UserTimeout => Outcome::Timeout,
            TimerKind::HardCeiling => {
                Outcome::Failure(WorkerFailure::Unresponsive(timer.duration))
            }
        };
        self.resolve(timer.generation, outcome);
    }

    /// Cancels the request in flight without producing an outcome.
    pub fn reset(&mut self) {
        if let Some(request) = self.slot.take_any() {
            log::info!("Request {} cancelled by reset", request.generation);
            self.teardown(request);
        }
        self.set_status(Status::Idle);
    }

    pub fn shutdown(&mut self) {
        if let Some(request) = self.slot.take_any() {
            log::info!("Request {} cancelled by shutdown", request.generation);
            self.teardown(request);
        }
        self.set_status(Status::Idle);
    }

    /// Waits for the next event or the timer, whichever comes first, and
    /// handles it. Returns `false` once the supervisor has shut down.
    pub fn step(&mut self) -> bool {
        let received = match self.timer.deadline() {
            Some(deadline) => match self.events_rx.recv_deadline(deadline) {
                Ok(queued) => Some(queued),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => return false,
            },
            None => match self.events_rx.recv() {
                Ok(queued) => Some(queued),
                Err(_) => return false,
            },
        };

        match received {
            Some(queued) => self.process(queued),
            None => {
                self.expire_timers(Instant::now());
                true
            }
        }
    }

    /// Handles one dequeued event. The timer wins over any event queued at
    /// or after its deadline, so a worker that keeps the queue full cannot
    /// hold a request open past its timeout.
    fn process(&mut self, queued: QueuedEvent) -> bool {
        if self
            .timer
            .deadline()
            .is_some_and(|deadline| queued.queued_at >= deadline)
        {
            self.expire_timers(queued.queued_at);
        }
        self.handle(queued.event)
    }

    /// Runs the control loop until a shutdown event arrives.
    pub fn run(mut self) {
        while self.step() {}
        self.shutdown();
        log::debug!("Detection supervisor stopped");
    }

    /// Runs the control loop on its own thread.
    pub fn spawn(self) -> SupervisorHandle {
        let tx = self.events_tx.clone();
        let join = thread::spawn(move || self.run());
        SupervisorHandle {
            tx,
            join: Some(join),
        }
    }

    fn on_worker_event(&mut self, generation: Generation, event: WorkerEvent) {
        if !self.slot.is_current(generation) {
            log::debug!("Dropping {} from stale request {generation}", event_kind(&event));
            return;
        }
        match event {
            WorkerEvent::Stdout(chunk) => self.on_stdout(generation, &chunk),
            WorkerEvent::Stderr(line) => self.sink.warning(&line),
            WorkerEvent::Exited(code) => self.on_exit(generation, code),
        }
    }

    fn on_stdout(&mut self, generation: Generation, chunk: &[u8]) {
        let lines = match self.slot.current_mut(generation) {
            Some(request) => request.demuxer.feed(chunk),
            None => return,
        };

        for line in lines {
            if line.trim().is_empty() {
                continue;
            }
            match decode(&line) {
                Decoded::Diagnostic(text) => self.sink.diagnostic(&text),
                Decoded::Message(message) => {
                    if let Some(outcome) = self.on_message(message) {
                        self.resolve(generation, outcome);
                        return;
                    }
                }
            }
        }
    }

    fn on_message(&mut self, message: ProtocolMessage) -> Option<Outcome> {
        match message {
            ProtocolMessage::Ready { method } => {
                log::info!(
                    "Worker ready using {}",
                    method.as_deref().unwrap_or("default method")
                );
                self.set_status(Status::Ready);
                None
            }
            ProtocolMessage::Detected(report) if report.count == 0 => {
                self.set_status(Status::Ready);
                None
            }
            ProtocolMessage::Detected(report) => Some(Outcome::Success {
                count: report.count,
                detections: report.humans,
                timestamp: report.timestamp.unwrap_or_default(),
            }),
            ProtocolMessage::Error(reason) => {
                Some(Outcome::Failure(WorkerFailure::Reported(reason)))
            }
            ProtocolMessage::Notice(status) => {
                log::debug!("Worker status: {status}");
                None
            }
        }
    }

    fn on_exit(&mut self, generation: Generation, code: Option<i32>) {
        match code {
            Some(code) if code != 0 => {
                self.resolve(generation, Outcome::Failure(WorkerFailure::Exited(code)))
            }
            Some(_) => log::warn!("Detection worker exited without a result"),
            None => log::warn!("Detection worker was terminated without a result"),
        }
    }

    fn resolve(&mut self, generation: Generation, outcome: Outcome) {
        let Some(mut request) = self.slot.take(generation) else {
            log::debug!(
                "Request {generation} already resolved, dropping {}",
                outcome.kind()
            );
            return;
        };
        log::debug!("Request {generation} resolved: {}", outcome.kind());

        self.timer.disarm();
        request.stop_worker();
        let context = std::mem::take(&mut request.context);
        let shown = outcome_router::route(context, &request.config, outcome, self.sink.as_mut());
        if let Some(status) = shown {
            self.set_status(status);
        }
        self.set_status(Status::Idle);
    }

    fn teardown(&mut self, mut request: ActiveRequest) {
        self.timer.disarm();
        request.stop_worker();
        log::debug!("Request {} torn down", request.generation);
    }

    fn set_status(&mut self, status: Status) {
        if self.status != status {
            self.sink.status(&status);
            self.status = status;
        }
    }
}

fn event_kind(event: &WorkerEvent) -> &'static str {
    match event {
        WorkerEvent::Stdout(_) => "stdout",
        WorkerEvent::Stderr(_) => "stderr",
        WorkerEvent::Exited(_) => "exit",
    }
}

/// Control handle for a supervisor running on its own thread.
///
/// Triggers and resets share one queue, so they are handled in the order
/// they were sent. Dropping the handle shuts the supervisor down.
pub struct SupervisorHandle {
    tx: EventSender,
    join: Option<JoinHandle<()>>,
}

impl SupervisorHandle {
    /// Returns `false` if the supervisor has already stopped.
    pub fn trigger(&self, context: Value) -> bool {
        self.tx.send(SupervisorEvent::Trigger(context))
    }

    /// Cancels the request in flight. Returns `false` if the supervisor has
    /// already stopped.
    pub fn reset(&self) -> bool {
        self.tx.send(SupervisorEvent::Reset)
    }

    /// Cancels any request in flight and waits for the control thread.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(join) = self.join.take() else {
            return;
        };
        self.tx.send(SupervisorEvent::Shutdown);
        if join.join().is_err() {
            log::error!("Detection supervisor thread panicked");
        }
    }
}

impl Drop for SupervisorHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
