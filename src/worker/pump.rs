//! Pause/resume/stop state machine around an OS thread
//!
//! ```text
//! Created --start--> Paused <--pause/resume--> Active
//!                       \                        /
//!                        `-------stop-----------'--> Terminated
//! ```
//!
//! The loop body polls [`PumpControl::in_pump`] at each iteration boundary.
//! While paused the call blocks on a condition variable, so an idle pump
//! costs nothing. After `stop` it returns `false` and the body unwinds.

use parking_lot::{Condvar, Mutex};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::error::{TerminationReason, WorkerError};

/// Lifecycle state of a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpState {
    /// Constructed, thread not spawned
    Created,
    /// Thread alive, loop body not executing
    Paused,
    /// Thread alive, loop body executing
    Active,
    /// Stopped or finished; cannot be resumed
    Terminated,
}

/// Callback invoked once when a worker body ends with a fatal condition
pub type FaultHandler = Box<dyn FnOnce(TerminationReason) + Send + 'static>;

struct Shared {
    state: Mutex<PumpState>,
    wake: Condvar,
}

impl Shared {
    fn transition(&self, from: &[PumpState], to: PumpState) -> bool {
        let mut state = self.state.lock();
        if from.contains(&state) {
            *state = to;
            self.wake.notify_all();
            true
        } else {
            false
        }
    }
}

/// Handle given to the loop body for observing and steering its own worker
#[derive(Clone)]
pub struct PumpControl {
    shared: Arc<Shared>,
}

impl PumpControl {
    /// Iteration guard
    ///
    /// Returns `true` when the body should run one iteration, blocks while
    /// the worker is paused, and returns `false` once the worker is stopped.
    pub fn in_pump(&self) -> bool {
        let mut state = self.shared.state.lock();
        loop {
            match *state {
                PumpState::Active => return true,
                PumpState::Terminated => return false,
                PumpState::Created | PumpState::Paused => self.shared.wake.wait(&mut state),
            }
        }
    }

    /// Pause the worker from inside its own body
    pub fn pause(&self) {
        self.shared.transition(&[PumpState::Active], PumpState::Paused);
    }

    /// Check whether `stop` has been requested
    pub fn is_stopped(&self) -> bool {
        *self.shared.state.lock() == PumpState::Terminated
    }
}

/// A named, controllable OS thread
pub struct Worker {
    name: String,
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Worker {
    /// Create a worker in the `Created` state
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shared: Arc::new(Shared {
                state: Mutex::new(PumpState::Created),
                wake: Condvar::new(),
            }),
            handle: Mutex::new(None),
        }
    }

    /// Spawn the thread in the paused state
    ///
    /// `body` receives a [`PumpControl`] and is expected to loop on
    /// `in_pump()`. If it returns an error (or panics) before `stop` was
    /// requested, `on_fault` is called once with the reason.
    pub fn start<F>(&self, body: F, on_fault: Option<FaultHandler>) -> Result<(), WorkerError>
    where
        F: FnOnce(&PumpControl) -> crate::Result<()> + Send + 'static,
    {
        if !self.shared.transition(&[PumpState::Created], PumpState::Paused) {
            return Err(WorkerError::AlreadyStarted);
        }

        let control = PumpControl {
            shared: self.shared.clone(),
        };
        let name = self.name.clone();

        let spawned = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(&control)));
                let stopped = control.is_stopped();

                {
                    let mut state = control.shared.state.lock();
                    *state = PumpState::Terminated;
                    control.shared.wake.notify_all();
                }

                let reason = match outcome {
                    Ok(Ok(())) => None,
                    Ok(Err(e)) => Some(TerminationReason::from(&e)),
                    Err(payload) => Some(TerminationReason::Worker(panic_message(&payload))),
                };

                match reason {
                    Some(reason) if !stopped => {
                        tracing::error!("Worker '{}' terminated: {}", name, reason);
                        if let Some(on_fault) = on_fault {
                            on_fault(reason);
                        }
                    }
                    Some(reason) => {
                        tracing::debug!("Worker '{}' ended during shutdown: {}", name, reason);
                    }
                    None => tracing::debug!("Worker '{}' finished", name),
                }
            });

        match spawned {
            Ok(handle) => {
                *self.handle.lock() = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.shared.transition(&[PumpState::Paused], PumpState::Terminated);
                Err(WorkerError::SpawnFailed(e.to_string()))
            }
        }
    }

    /// Allow the loop body to run
    pub fn resume(&self) {
        self.shared.transition(&[PumpState::Paused], PumpState::Active);
    }

    /// Suspend the loop body after its current iteration
    pub fn pause(&self) {
        self.shared.transition(&[PumpState::Active], PumpState::Paused);
    }

    /// Terminate permanently; the body observes this at its next guard
    pub fn stop(&self) {
        self.shared.transition(
            &[PumpState::Created, PumpState::Paused, PumpState::Active],
            PumpState::Terminated,
        );
    }

    /// Current lifecycle state
    pub fn state(&self) -> PumpState {
        *self.shared.state.lock()
    }

    /// Worker name (also the OS thread name)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for the thread to exit
    ///
    /// A no-op when called from the worker's own thread or when the thread
    /// was never spawned.
    pub fn join(&self) -> Result<(), WorkerError> {
        let handle = {
            let mut guard = self.handle.lock();
            match guard.as_ref() {
                Some(h) if h.thread().id() == thread::current().id() => return Ok(()),
                Some(_) => guard.take(),
                None => None,
            }
        };

        match handle {
            Some(handle) => handle
                .join()
                .map_err(|payload| WorkerError::Panicked(panic_message(&payload))),
            None => Ok(()),
        }
    }

    /// `stop` followed by `join`
    pub fn shutdown(&self) {
        self.stop();
        if let Err(e) = self.join() {
            tracing::warn!("Worker '{}' join failed: {}", self.name, e);
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
