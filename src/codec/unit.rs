//! One codec instance and its lifecycle
//!
//! Wraps a [`CodecDevice`] with the `Unconfigured → Configured → Running →
//! Released` state machine and the single-call push/pull helpers the audio
//! and video codec pipelines are built on.

use std::time::Duration;

use crate::codec::device::{BufferInfo, CodecDevice, InputStatus, OutputStatus};
use crate::error::CodecError;

/// Lifecycle state of a codec unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecState {
    Unconfigured,
    Configured,
    Running,
    Released,
}

pub struct CodecUnit {
    name: &'static str,
    device: Option<Box<dyn CodecDevice>>,
    state: CodecState,
    timeout: Duration,
}

impl CodecUnit {
    pub fn unconfigured(name: &'static str, timeout: Duration) -> Self {
        Self {
            name,
            device: None,
            state: CodecState::Unconfigured,
            timeout,
        }
    }

    pub fn configure(&mut self, device: Box<dyn CodecDevice>) {
        self.device = Some(device);
        self.state = CodecState::Configured;
    }

    pub fn start(&mut self) -> Result<(), CodecError> {
        let device = match (self.state, self.device.as_mut()) {
            (CodecState::Configured, Some(device)) => device,
            (state, _) => {
                return Err(CodecError::IllegalState(format!(
                    "{} cannot start from {:?}",
                    self.name, state
                )))
            }
        };
        device.start()?;
        self.state = CodecState::Running;
        tracing::debug!("{} running", self.name);
        Ok(())
    }

    pub fn state(&self) -> CodecState {
        self.state
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn running_device(&mut self) -> Result<&mut Box<dyn CodecDevice>, CodecError> {
        match (self.state, self.device.as_mut()) {
            (CodecState::Running, Some(device)) => Ok(device),
            (state, _) => Err(CodecError::IllegalState(format!(
                "{} is {:?}",
                self.name, state
            ))),
        }
    }

    /// Acquire an input slot, let `fill` write `len` bytes into it, queue it
    ///
    /// Returns `Ok(false)` when no slot was free within the timeout.
    pub fn push_input<F>(&mut self, len: usize, fill: F) -> Result<bool, CodecError>
    where
        F: FnOnce(&mut [u8]),
    {
        let timeout = self.timeout;
        let device = self.running_device()?;

        let slot = match device.dequeue_input(timeout)? {
            InputStatus::Filled(slot) => slot,
            InputStatus::NoBufferAvailable => return Ok(false),
        };

        let buffer = device.input_buffer(slot)?;
        if len > buffer.len() {
            // hand the slot back empty
            device.queue_input(slot, 0)?;
            return Err(CodecError::InvalidFrameSize(len));
        }
        fill(&mut buffer[..len]);
        device.queue_input(slot, len)?;
        Ok(true)
    }

    /// Drain at most one ready output slot through `read`
    ///
    /// `render` is forwarded to the device on release. Format and buffer
    /// changes are logged and count as "no output".
    pub fn pull_output<R, F>(&mut self, render: bool, read: F) -> Result<Option<R>, CodecError>
    where
        F: FnOnce(&[u8], &BufferInfo) -> R,
    {
        let timeout = self.timeout;
        let name = self.name;
        let device = self.running_device()?;

        match device.dequeue_output(timeout)? {
            OutputStatus::Filled { slot, info } => {
                let result = {
                    let buffer = device.output_buffer(slot)?;
                    let size = info.size.min(buffer.len());
                    read(&buffer[..size], &info)
                };
                device.release_output(slot, render)?;
                Ok(Some(result))
            }
            OutputStatus::NoBufferAvailable => Ok(None),
            OutputStatus::BuffersChanged => {
                tracing::debug!("{} output buffers changed", name);
                Ok(None)
            }
            OutputStatus::FormatChanged(format) => {
                tracing::info!("{} format changed: {:?}", name, format);
                Ok(None)
            }
        }
    }

    /// Stop and free the device; safe to call repeatedly
    pub fn release(&mut self) {
        if self.state == CodecState::Released {
            return;
        }
        if let Some(mut device) = self.device.take() {
            if let Err(e) = device.stop() {
                tracing::debug!("{} stop during release: {}", self.name, e);
            }
            device.release();
        }
        self.state = CodecState::Released;
        tracing::debug!("{} released", self.name);
    }
}

impl Drop for CodecUnit {
    fn drop(&mut self) {
        self.release();
    }
}

/// Log a buffer-queue failure and collapse it to "nothing this call"
pub(crate) fn absorb<T>(name: &str, op: &str, result: Result<Option<T>, CodecError>) -> Option<T> {
    match result {
        Ok(value) => value,
        Err(CodecError::IllegalState(msg)) => {
            tracing::debug!("{} {} during teardown: {}", name, op, msg);
            None
        }
        Err(e) => {
            tracing::warn!("{} {} failed: {}", name, op, e);
            None
        }
    }
}
