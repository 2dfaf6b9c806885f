/// Invoked by a [`ResetSource`] whenever the host asks for a reset.
pub type ResetCallback = Box<dyn Fn() + Send + Sync>;

/// Optional capability that lets the host cancel in-flight detection,
/// e.g. from a middleware event bus.
pub trait ResetSource: Send {
    fn subscribe(&mut self, on_reset: ResetCallback);
}

/// Host without reset notifications. Subscribing does nothing.
pub struct NoResetSource;

impl ResetSource for NoResetSource {
    fn subscribe(&mut self, _on_reset: ResetCallback) {}
}
