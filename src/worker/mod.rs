//! Controllable worker threads
//!
//! Every pump in the call (audio capture, audio playback, network receive,
//! network send) runs on a [`Worker`]. A worker is started paused, driven
//! with `resume`/`pause`, and stopped permanently with `stop`.

pub mod pump;
pub mod signal;

pub use pump::{FaultHandler, PumpControl, PumpState, Worker};
pub use signal::Termination;
