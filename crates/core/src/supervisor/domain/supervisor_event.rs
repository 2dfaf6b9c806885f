use std::time::Instant;

use crossbeam_channel::Sender;
use serde_json::Value;

/// Identifies one request. Every worker event carries the generation of the
/// request that started the worker, so output from a superseded worker can
/// be recognized and dropped.
pub type Generation = u64;

/// Raw feed from a running worker process.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    Stdout(Vec<u8>),
    /// One line of stderr output.
    Stderr(String),
    /// The process ended. `None` when it was killed by a signal.
    Exited(Option<i32>),
}

/// Everything the control loop reacts to, serialized through one channel.
#[derive(Debug, Clone, PartialEq)]
pub enum SupervisorEvent {
    /// New input carrying the caller's context.
    Trigger(Value),
    Worker {
        generation: Generation,
        event: WorkerEvent,
    },
    Reset,
    Shutdown,
}

/// An event stamped with the moment it entered the control channel.
///
/// The stamp decides the race against the timer: an event queued after the
/// deadline loses, however long it waited in the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedEvent {
    pub event: SupervisorEvent,
    pub queued_at: Instant,
}

/// Sending side of the control channel.
#[derive(Clone, Debug)]
pub struct EventSender {
    tx: Sender<QueuedEvent>,
}

impl EventSender {
    pub fn new(tx: Sender<QueuedEvent>) -> Self {
        Self { tx }
    }

    /// Blocks while the channel is full. Returns `false` once the control
    /// loop has gone away.
    pub fn send(&self, event: SupervisorEvent) -> bool {
        self.tx
            .send(QueuedEvent {
                event,
                queued_at: Instant::now(),
            })
            .is_ok()
    }
}

impl From<Sender<QueuedEvent>> for EventSender {
    fn from(tx: Sender<QueuedEvent>) -> Self {
        Self::new(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_stamps_event() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let before = Instant::now();

        assert!(EventSender::new(tx).send(SupervisorEvent::Reset));

        let queued = rx.try_recv().unwrap();
        assert_eq!(queued.event, SupervisorEvent::Reset);
        assert!(queued.queued_at >= before);
    }

    #[test]
    fn test_send_after_receiver_dropped_fails() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        drop(rx);
        assert!(!EventSender::new(tx).send(SupervisorEvent::Shutdown));
    }
}
