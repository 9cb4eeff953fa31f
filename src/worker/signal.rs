//! Once-only termination signal shared by a pipeline's workers

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::TerminationReason;
use crate::worker::FaultHandler;

/// Delivers at most one [`TerminationReason`] per pipeline, however many
/// of its workers fault
pub struct Termination {
    name: &'static str,
    fired: AtomicBool,
    callback: Box<dyn Fn(TerminationReason) + Send + Sync>,
}

impl Termination {
    pub fn new(
        name: &'static str,
        callback: impl Fn(TerminationReason) + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            name,
            fired: AtomicBool::new(false),
            callback: Box::new(callback),
        })
    }

    /// Report `reason` unless a reason was already reported
    pub fn fire(&self, reason: TerminationReason) {
        if self.fired.swap(true, Ordering::SeqCst) {
            tracing::debug!("{} already terminated, ignoring: {}", self.name, reason);
            return;
        }
        tracing::error!("{} terminated: {}", self.name, reason);
        (self.callback)(reason);
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Fault handler for one worker of this pipeline
    pub fn handler(self: &Arc<Self>) -> FaultHandler {
        let this = self.clone();
        Box::new(move |reason| this.fire(reason))
    }
}
