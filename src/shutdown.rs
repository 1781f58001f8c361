use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative stop flag shared by the coordinator and its workers.
#[derive(Debug, Default)]
pub struct StopSignal {
    triggered: AtomicBool,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop. Returns `true` only for the first call.
    pub fn trigger(&self) -> bool {
        !self.triggered.swap(true, Ordering::SeqCst)
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }
}
