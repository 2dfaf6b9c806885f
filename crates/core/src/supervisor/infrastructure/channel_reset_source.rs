use std::thread;

use crossbeam_channel::Receiver;

use crate::supervisor::domain::reset_source::{ResetCallback, ResetSource};

/// Reset source fed by a channel: every `()` received triggers a reset.
///
/// Subscribing spawns a forwarding thread that lives until the sending side
/// is dropped. Only the first subscription is honoured. Resets relayed this
/// way are not ordered with triggers sent straight to the supervisor; a host
/// that needs that ordering should call `SupervisorHandle::reset`.
pub struct ChannelResetSource {
    rx: Option<Receiver<()>>,
}

impl ChannelResetSource {
    pub fn new(rx: Receiver<()>) -> Self {
        Self { rx: Some(rx) }
    }
}

impl ResetSource for ChannelResetSource {
    fn subscribe(&mut self, on_reset: ResetCallback) {
        let Some(rx) = self.rx.take() else {
            log::warn!("Reset source already has a subscriber");
            return;
        };
        thread::spawn(move || {
            for () in rx {
                on_reset();
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_each_message_invokes_callback() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let (done_tx, done_rx) = crossbeam_channel::unbounded();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();

        let mut source = ChannelResetSource::new(rx);
        source.subscribe(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            let _ = done_tx.send(());
        }));

        tx.send(()).unwrap();
        tx.send(()).unwrap();
        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_second_subscription_is_ignored() {
        let (_tx, rx) = crossbeam_channel::unbounded();
        let mut source = ChannelResetSource::new(rx);
        source.subscribe(Box::new(|| {}));
        source.subscribe(Box::new(|| panic!("second subscriber must not run")));
        assert!(source.rx.is_none());
    }
}
