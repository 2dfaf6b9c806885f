/// Status indicator shown to the hosting environment.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Idle,
    /// Worker launched, not yet initialized.
    Detecting,
    /// Worker initialized and searching.
    Ready,
    Detected(u32),
    Error,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Idle => write!(f, "idle"),
            Status::Detecting => write!(f, "detecting"),
            Status::Ready => write!(f, "ready"),
            Status::Detected(count) => write!(f, "detected: {count}"),
            Status::Error => write!(f, "error"),
        }
    }
}
