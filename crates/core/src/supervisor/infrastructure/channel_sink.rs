use crossbeam_channel::Sender;
use serde_json::Value;

use crate::supervisor::domain::outcome::WorkerFailure;
use crate::supervisor::domain::status::Status;
use crate::supervisor::domain::supervisor_sink::SupervisorSink;

/// Sink callbacks as values, in the order they happened.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkMessage {
    Detected(Value),
    TimedOut(Value),
    Failed(String),
    Status(Status),
    Diagnostic(String),
    Warning(String),
}

impl SinkMessage {
    /// Whether this message ends a request.
    pub fn is_outcome(&self) -> bool {
        matches!(
            self,
            SinkMessage::Detected(_) | SinkMessage::TimedOut(_) | SinkMessage::Failed(_)
        )
    }
}

/// Forwards sink callbacks over a channel to another thread.
///
/// Sends to a dropped receiver are ignored: the supervisor keeps running
/// even if nobody is listening.
pub struct ChannelSupervisorSink {
    tx: Sender<SinkMessage>,
}

impl ChannelSupervisorSink {
    pub fn new(tx: Sender<SinkMessage>) -> Self {
        Self { tx }
    }

    fn send(&self, message: SinkMessage) {
        let _ = self.tx.send(message);
    }
}

impl SupervisorSink for ChannelSupervisorSink {
    fn detected(&mut self, message: Value) {
        self.send(SinkMessage::Detected(message));
    }

    fn timed_out(&mut self, message: Value) {
        self.send(SinkMessage::TimedOut(message));
    }

    fn failed(&mut self, failure: &WorkerFailure) {
        self.send(SinkMessage::Failed(failure.to_string()));
    }

    fn status(&mut self, status: &Status) {
        self.send(SinkMessage::Status(status.clone()));
    }

    fn diagnostic(&mut self, line: &str) {
        self.send(SinkMessage::Diagnostic(line.to_string()));
    }

    fn warning(&mut self, line: &str) {
        self.send(SinkMessage::Warning(line.to_string()));
    }
}
