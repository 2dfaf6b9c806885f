use serde_json::Value;

use crate::supervisor::domain::outcome::WorkerFailure;
use crate::supervisor::domain::status::Status;

/// Everything the supervisor reports to its host.
///
/// `detected` and `timed_out` are the two output channels; at most one of
/// them fires per request, and neither fires for a failed request.
pub trait SupervisorSink: Send {
    /// Channel 1: caller context with the detection payload.
    fn detected(&mut self, message: Value);

    /// Channel 2: fixed timeout notification.
    fn timed_out(&mut self, message: Value);

    /// Error reporting for failed requests.
    fn failed(&mut self, failure: &WorkerFailure);

    fn status(&mut self, status: &Status);

    /// Worker stdout that is not a protocol message. Default: log it.
    fn diagnostic(&mut self, line: &str) {
        log::info!("worker: {line}");
    }

    /// Worker stderr. Default: log it.
    fn warning(&mut self, line: &str) {
        log::warn!("worker: {line}");
    }
}
