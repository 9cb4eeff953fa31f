//! Video call pipeline
//!
//! Capture is driven by the camera's delivery thread, not a pump. Each
//! delivered YV12 frame is rotated into I420, encoded, and sent if the
//! session is ready; the buffer then goes back to the camera. Inbound
//! packets are pushed straight into the decoder, which renders to the
//! platform surface.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use crate::codec::video::VideoCodecStats;
use crate::codec::{CodecFactory, RenderSurface, VideoCodecs};
use crate::config::CallConfig;
use crate::constants::CAPTURE_BUFFERS;
use crate::error::{Result, TerminationReason, VideoError};
use crate::network::{PacketHandler, PacketSink, PacketType};
use crate::video::convert::{
    display_rotation, i420_size, rotate_yv12_to_i420, yv12_buffer_size, CameraFacing,
};
use crate::worker::Termination;

/// Fixed properties of the opened camera
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraInfo {
    /// Preview image width
    pub width: u32,
    /// Preview image height
    pub height: u32,
    pub facing: CameraFacing,
    /// Sensor mounting angle in degrees
    pub sensor_orientation: u32,
}

struct DecodeSink {
    codecs: Arc<VideoCodecs>,
}

impl PacketHandler for DecodeSink {
    fn handle_packet(&self, payload: &[u8]) {
        self.codecs.decode_frame(payload);
    }
}

/// Running video pipeline for one call
pub struct VideoStream {
    camera: CameraInfo,
    codecs: Arc<VideoCodecs>,
    sink: Arc<dyn PacketSink>,
    termination: Arc<Termination>,
    scratch: Mutex<Vec<u8>>,
    rotation: AtomicU32,
    released: AtomicBool,
    frames_captured: AtomicU64,
}

impl VideoStream {
    /// Configure the codecs for `camera`, rendering decoded video to
    /// `surface`
    pub fn new(
        factory: &dyn CodecFactory,
        config: &CallConfig,
        camera: CameraInfo,
        surface: Arc<dyn RenderSurface>,
        sink: Arc<dyn PacketSink>,
        termination: Arc<Termination>,
    ) -> Result<Self> {
        if camera.width % 2 != 0 || camera.height % 2 != 0 {
            return Err(VideoError::UnsupportedSize {
                width: camera.width,
                height: camera.height,
            }
            .into());
        }
        tracing::info!(
            "Camera image size {}x{}, {:?} facing, sensor at {} degrees",
            camera.width,
            camera.height,
            camera.facing,
            camera.sensor_orientation
        );

        let codecs = VideoCodecs::configure(
            factory,
            config.video.params(camera.width, camera.height),
            surface,
            config.codec.buffer_timeout(),
        )?;

        Ok(Self {
            camera,
            codecs: Arc::new(codecs),
            sink,
            termination,
            scratch: Mutex::new(vec![0; i420_size(camera.width, camera.height)]),
            rotation: AtomicU32::new(0),
            released: AtomicBool::new(false),
            frames_captured: AtomicU64::new(0),
        })
    }

    /// Buffers to preload into the camera
    pub fn capture_buffers(&self) -> Vec<Vec<u8>> {
        let size = yv12_buffer_size(self.camera.width, self.camera.height);
        (0..CAPTURE_BUFFERS).map(|_| vec![0u8; size]).collect()
    }

    /// Handle one delivered camera frame
    ///
    /// Runs on the camera's delivery thread. Returns the buffer so the
    /// caller can hand it back to the camera.
    pub fn on_preview_frame(&self, frame: Vec<u8>, display_degrees: u32) -> Vec<u8> {
        let rotation = display_rotation(
            self.camera.facing,
            self.camera.sensor_orientation,
            display_degrees,
        );
        self.rotation.store(rotation, Ordering::Relaxed);

        if self.released.load(Ordering::SeqCst) || !self.sink.is_ready() {
            return frame;
        }
        self.frames_captured.fetch_add(1, Ordering::Relaxed);

        let mut scratch = self.scratch.lock();
        if let Err(e) = rotate_yv12_to_i420(
            &frame,
            &mut scratch,
            self.camera.width,
            self.camera.height,
            rotation,
        ) {
            self.termination.fire(TerminationReason::VideoDevice(e.to_string()));
            return frame;
        }

        if let Some(packet) = self.codecs.encode_frame(&scratch) {
            self.sink.send(PacketType::Video, &packet);
        }
        frame
    }

    /// Handler to register with the session for inbound video
    pub fn packet_handler(&self) -> Arc<dyn PacketHandler> {
        Arc::new(DecodeSink {
            codecs: self.codecs.clone(),
        })
    }

    /// Rotation applied to the most recent frame; the camera preview
    /// display should use the same angle
    pub fn rotation(&self) -> u32 {
        self.rotation.load(Ordering::Relaxed)
    }

    pub fn camera(&self) -> &CameraInfo {
        &self.camera
    }

    pub fn codecs(&self) -> &VideoCodecs {
        &self.codecs
    }

    pub fn frames_captured(&self) -> u64 {
        self.frames_captured.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> VideoCodecStats {
        self.codecs.stats()
    }

    /// Release the codecs; later frames are handed straight back
    pub fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            tracing::info!("Video pipeline released");
        }
        self.codecs.release();
    }
}

impl Drop for VideoStream {
    fn drop(&mut self) {
        self.release();
    }
}
