//! Software implementation of the buffer-queue protocol
//!
//! [`QueuedCodec`] owns a fixed pool of input and output slots and runs a
//! [`FrameProcessor`] synchronously whenever an input slot is queued. Outputs
//! that find no free output slot wait in an overflow queue until one is
//! released, the same back-pressure a hardware codec applies.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crate::codec::device::{
    BufferFlags, BufferInfo, CodecDevice, InputStatus, OutputStatus, RenderSurface, SlotIndex,
};
use crate::error::CodecError;

/// One unit of processed output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedUnit {
    pub data: Vec<u8>,
    pub flags: BufferFlags,
}

impl ProcessedUnit {
    pub fn frame(data: Vec<u8>) -> Self {
        Self {
            data,
            flags: BufferFlags::default(),
        }
    }

    pub fn config(data: Vec<u8>) -> Self {
        Self {
            data,
            flags: BufferFlags {
                codec_config: true,
                key_frame: false,
            },
        }
    }
}

/// The codec algorithm behind a [`QueuedCodec`]
pub trait FrameProcessor: Send {
    /// Output emitted once when the device starts (e.g. codec config data)
    fn on_start(&mut self) -> Vec<ProcessedUnit> {
        Vec::new()
    }

    /// Turn one input buffer into zero or more output units
    fn process(&mut self, input: &[u8]) -> Result<Vec<ProcessedUnit>, CodecError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeviceState {
    Configured,
    Started,
    Stopped,
    Released,
}

/// Software codec device with hardware-style slot queues
pub struct QueuedCodec<P: FrameProcessor> {
    name: String,
    processor: P,
    state: DeviceState,
    inputs: Vec<Vec<u8>>,
    free_inputs: VecDeque<SlotIndex>,
    outputs: Vec<Option<ProcessedUnit>>,
    free_outputs: VecDeque<SlotIndex>,
    ready_outputs: VecDeque<SlotIndex>,
    overflow: VecDeque<ProcessedUnit>,
    surface: Option<Arc<dyn RenderSurface>>,
}

impl<P: FrameProcessor> QueuedCodec<P> {
    /// Create a device with `slots` input and output slots of
    /// `input_size` bytes each
    pub fn new(name: impl Into<String>, processor: P, slots: usize, input_size: usize) -> Self {
        Self {
            name: name.into(),
            processor,
            state: DeviceState::Configured,
            inputs: vec![vec![0u8; input_size]; slots],
            free_inputs: (0..slots).collect(),
            outputs: vec![None; slots],
            free_outputs: (0..slots).collect(),
            ready_outputs: VecDeque::new(),
            overflow: VecDeque::new(),
            surface: None,
        }
    }

    /// Render released output buffers to `surface` when asked to
    pub fn with_surface(mut self, surface: Arc<dyn RenderSurface>) -> Self {
        self.surface = Some(surface);
        self
    }

    fn ensure_started(&self) -> Result<(), CodecError> {
        if self.state == DeviceState::Started {
            Ok(())
        } else {
            Err(CodecError::IllegalState(format!(
                "{} is {:?}",
                self.name, self.state
            )))
        }
    }

    fn emit(&mut self, unit: ProcessedUnit) {
        match self.free_outputs.pop_front() {
            Some(slot) => {
                self.outputs[slot] = Some(unit);
                self.ready_outputs.push_back(slot);
            }
            None => self.overflow.push_back(unit),
        }
    }
}

impl<P: FrameProcessor> CodecDevice for QueuedCodec<P> {
    fn start(&mut self) -> Result<(), CodecError> {
        if self.state != DeviceState::Configured {
            return Err(CodecError::IllegalState(format!(
                "{} cannot start from {:?}",
                self.name, self.state
            )));
        }
        self.state = DeviceState::Started;
        for unit in self.processor.on_start() {
            self.emit(unit);
        }
        Ok(())
    }

    /// Never waits: processing is synchronous, so a slot is either free now
    /// or held by the caller.
    fn dequeue_input(&mut self, _timeout: Duration) -> Result<InputStatus, CodecError> {
        self.ensure_started()?;
        Ok(match self.free_inputs.pop_front() {
            Some(slot) => InputStatus::Filled(slot),
            None => InputStatus::NoBufferAvailable,
        })
    }

    fn input_buffer(&mut self, slot: SlotIndex) -> Result<&mut [u8], CodecError> {
        self.ensure_started()?;
        self.inputs
            .get_mut(slot)
            .map(|b| b.as_mut_slice())
            .ok_or(CodecError::InvalidSlot(slot))
    }

    fn queue_input(&mut self, slot: SlotIndex, len: usize) -> Result<(), CodecError> {
        self.ensure_started()?;
        let capacity = self
            .inputs
            .get(slot)
            .map(|b| b.len())
            .ok_or(CodecError::InvalidSlot(slot))?;
        if len > capacity {
            return Err(CodecError::InvalidFrameSize(len));
        }
        if len == 0 {
            self.free_inputs.push_back(slot);
            return Ok(());
        }

        let result = self.processor.process(&self.inputs[slot][..len]);
        self.free_inputs.push_back(slot);

        for unit in result? {
            self.emit(unit);
        }
        Ok(())
    }

    fn dequeue_output(&mut self, _timeout: Duration) -> Result<OutputStatus, CodecError> {
        self.ensure_started()?;
        let slot = match self.ready_outputs.pop_front() {
            Some(slot) => slot,
            None => return Ok(OutputStatus::NoBufferAvailable),
        };
        let info = self.outputs[slot]
            .as_ref()
            .map(|unit| BufferInfo {
                size: unit.data.len(),
                flags: unit.flags,
            })
            .ok_or(CodecError::InvalidSlot(slot))?;
        Ok(OutputStatus::Filled { slot, info })
    }

    fn output_buffer(&self, slot: SlotIndex) -> Result<&[u8], CodecError> {
        self.ensure_started()?;
        self.outputs
            .get(slot)
            .and_then(|o| o.as_ref())
            .map(|unit| unit.data.as_slice())
            .ok_or(CodecError::InvalidSlot(slot))
    }

    fn release_output(&mut self, slot: SlotIndex, render: bool) -> Result<(), CodecError> {
        self.ensure_started()?;
        let unit = self
            .outputs
            .get_mut(slot)
            .and_then(|o| o.take())
            .ok_or(CodecError::InvalidSlot(slot))?;

        if render {
            if let Some(surface) = &self.surface {
                surface.present(&unit.data);
            }
        }

        self.free_outputs.push_back(slot);
        if let Some(pending) = self.overflow.pop_front() {
            self.emit(pending);
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CodecError> {
        match self.state {
            DeviceState::Started | DeviceState::Configured => {
                self.state = DeviceState::Stopped;
                Ok(())
            }
            state => Err(CodecError::IllegalState(format!(
                "{} cannot stop from {:?}",
                self.name, state
            ))),
        }
    }

    fn release(&mut self) {
        self.state = DeviceState::Released;
        self.inputs.clear();
        self.outputs.clear();
        self.free_inputs.clear();
        self.free_outputs.clear();
        self.ready_outputs.clear();
        self.overflow.clear();
        self.surface = None;
    }
}
