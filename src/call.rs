//! Call handle
//!
//! Owns one session and the media pipelines attached to it. A supervisor
//! worker watches the session and pipeline events: `Ready` starts the audio
//! pumps, and the first fatal event tears the whole call down (disconnect,
//! stop the pumps, release the codecs) before being forwarded to the
//! application.

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::audio::{AudioBackend, AudioStream};
use crate::codec::{CodecFactory, RenderSurface};
use crate::config::CallConfig;
use crate::error::{Result, TerminationReason};
use crate::network::{DatagramChannel, PacketSink, PacketType, Role, Session, SessionStats};
use crate::video::{CameraInfo, VideoStream};
use crate::worker::{Termination, Worker};

/// Events delivered to the application
pub use crate::network::SessionEvent as CallEvent;

const SUPERVISOR_POLL: Duration = Duration::from_millis(100);

struct Shared {
    config: CallConfig,
    session: Arc<Session>,
    audio: Mutex<Option<AudioStream>>,
    video: Mutex<Option<Arc<VideoStream>>>,
    terminated: AtomicBool,
}

impl Shared {
    fn on_ready(&self) {
        if let Some(audio) = self.audio.lock().as_ref() {
            audio.resume();
        }
    }

    fn teardown(&self) {
        self.session.disconnect();
        self.session.clear_handler(PacketType::Audio);
        self.session.clear_handler(PacketType::Video);
        let audio = self.audio.lock().take();
        if let Some(audio) = audio {
            audio.stop();
        }
        let video = self.video.lock().take();
        if let Some(video) = video {
            video.release();
        }
    }
}

/// One peer-to-peer call
pub struct Call {
    shared: Arc<Shared>,
    supervisor: Worker,
    internal: Sender<CallEvent>,
    events: Receiver<CallEvent>,
    closed: AtomicBool,
}

impl Call {
    /// Bind a UDP session per `config.network`
    pub fn new(config: CallConfig) -> Result<Self> {
        let (internal, inbox) = unbounded();
        let session = Session::bind(config.network.clone(), internal.clone())?;
        Self::assemble(config, session, internal, inbox)
    }

    /// Run the call over an existing channel
    pub fn with_channel(config: CallConfig, channel: Arc<dyn DatagramChannel>) -> Result<Self> {
        let (internal, inbox) = unbounded();
        let session = Session::new(channel, config.network.clone(), internal.clone())?;
        Self::assemble(config, session, internal, inbox)
    }

    fn assemble(
        config: CallConfig,
        session: Session,
        internal: Sender<CallEvent>,
        inbox: Receiver<CallEvent>,
    ) -> Result<Self> {
        let (outbox, events) = unbounded();
        let shared = Arc::new(Shared {
            config,
            session: Arc::new(session),
            audio: Mutex::new(None),
            video: Mutex::new(None),
            terminated: AtomicBool::new(false),
        });

        let call = Self {
            shared,
            supervisor: Worker::new("call-supervisor"),
            internal,
            events,
            closed: AtomicBool::new(false),
        };

        let shared = call.shared.clone();
        call.supervisor.start(
            move |control| {
                while control.in_pump() {
                    let event = match inbox.recv_timeout(SUPERVISOR_POLL) {
                        Ok(event) => event,
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    };
                    match &event {
                        CallEvent::Ready => shared.on_ready(),
                        CallEvent::Terminated(reason) => {
                            if shared.terminated.swap(true, Ordering::SeqCst) {
                                tracing::debug!("Ignoring further termination: {}", reason);
                                continue;
                            }
                            tracing::warn!("Tearing down call: {}", reason);
                            shared.teardown();
                        }
                    }
                    let _ = outbox.send(event);
                }
                Ok(())
            },
            None,
        )?;
        call.supervisor.resume();

        Ok(call)
    }

    /// Start the session; see [`Session::connect`]
    pub fn connect(&self, peer_host: Option<&str>, role: Role) -> Result<()> {
        self.shared.session.connect(peer_host, role)?;
        Ok(())
    }

    /// Attach the audio pipeline
    ///
    /// The pumps run once the session is ready.
    pub fn start_audio(
        &self,
        backend: Arc<dyn AudioBackend>,
        factory: &dyn CodecFactory,
    ) -> Result<()> {
        let termination = self.termination("audio pipeline");
        let sink: Arc<dyn PacketSink> = self.shared.session.clone();
        let stream = AudioStream::start(
            backend,
            factory,
            &self.shared.config,
            sink,
            termination.clone(),
        )
        .map_err(|e| {
            termination.fire(TerminationReason::from(&e));
            e
        })?;

        let mut slot = self.shared.audio.lock();
        if self.shared.terminated.load(Ordering::SeqCst) {
            drop(slot);
            stream.stop();
            return Ok(());
        }
        self.shared
            .session
            .set_handler(PacketType::Audio, stream.packet_handler());
        if self.shared.session.is_ready() {
            stream.resume();
        }
        *slot = Some(stream);
        Ok(())
    }

    /// Attach the video pipeline
    ///
    /// Feed camera frames to the returned stream's `on_preview_frame`.
    pub fn start_video(
        &self,
        factory: &dyn CodecFactory,
        camera: CameraInfo,
        surface: Arc<dyn RenderSurface>,
    ) -> Result<Arc<VideoStream>> {
        let termination = self.termination("video pipeline");
        let sink: Arc<dyn PacketSink> = self.shared.session.clone();
        let stream = VideoStream::new(
            factory,
            &self.shared.config,
            camera,
            surface,
            sink,
            termination.clone(),
        )
        .map_err(|e| {
            termination.fire(TerminationReason::from(&e));
            e
        })?;

        let stream = Arc::new(stream);
        let mut slot = self.shared.video.lock();
        if self.shared.terminated.load(Ordering::SeqCst) {
            stream.release();
            return Ok(stream);
        }
        self.shared
            .session
            .set_handler(PacketType::Video, stream.packet_handler());
        *slot = Some(stream.clone());
        Ok(stream)
    }

    fn termination(&self, name: &'static str) -> Arc<Termination> {
        let internal = self.internal.clone();
        Termination::new(name, move |reason| {
            let _ = internal.send(CallEvent::Terminated(reason));
        })
    }

    /// Stop exchanging media; the channel stays open
    pub fn disconnect(&self) {
        self.shared.session.disconnect();
        if let Some(audio) = self.shared.audio.lock().as_ref() {
            audio.pause();
        }
    }

    /// Tear everything down and release the channel; safe to call
    /// repeatedly
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.supervisor.shutdown();
        self.shared.teardown();
        self.shared.session.close();
        tracing::info!("Call closed");
    }

    /// Application event stream
    pub fn events(&self) -> Receiver<CallEvent> {
        self.events.clone()
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.shared.session
    }

    pub fn is_ready(&self) -> bool {
        self.shared.session.is_ready()
    }

    pub fn stats(&self) -> SessionStats {
        self.shared.session.stats()
    }

    /// Audio pipeline counters, if audio is running
    pub fn audio_stats(&self) -> Option<crate::codec::audio::AudioCodecStats> {
        self.shared.audio.lock().as_ref().map(|a| a.codecs().stats())
    }
}

impl Drop for Call {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::device::mock::MockBackend;
    use crate::codec::video::fakes::{FakeFactory, Screen};
    use crate::codec::OpusCodecFactory;
    use crate::network::UdpChannel;
    use crate::video::CameraFacing;
    use std::net::{IpAddr, Ipv4Addr};

    fn loopback_config() -> CallConfig {
        let mut config = CallConfig::default();
        config.network.bind_address = IpAddr::V4(Ipv4Addr::LOCALHOST);
        config.network.port = 0;
        config.network.recv_timeout_ms = 20;
        config
    }

    fn call() -> Call {
        let config = loopback_config();
        let channel = UdpChannel::bind(&config.network).unwrap();
        Call::with_channel(config, Arc::new(channel)).unwrap()
    }

    fn camera() -> CameraInfo {
        CameraInfo {
            width: 8,
            height: 8,
            facing: CameraFacing::Front,
            sensor_orientation: 270,
        }
    }

    #[test]
    fn test_ready_event_forwarded() {
        let call = call();
        call.connect(None, Role::Responder).unwrap();
        assert_eq!(
            call.events().recv_timeout(Duration::from_secs(2)).unwrap(),
            CallEvent::Ready
        );
        assert!(call.is_ready());
    }

    #[test]
    fn test_device_failure_tears_down_call() {
        let call = call();
        call.connect(None, Role::Responder).unwrap();
        let events = call.events();
        assert_eq!(
            events.recv_timeout(Duration::from_secs(2)).unwrap(),
            CallEvent::Ready
        );

        let mut backend = MockBackend::new(vec![0; 160]);
        backend.fail_input = true;
        call.start_audio(Arc::new(backend), &OpusCodecFactory).unwrap();
        call.start_video(&FakeFactory { silent: false }, camera(), Arc::new(Screen::default()))
            .unwrap();

        assert!(matches!(
            events.recv_timeout(Duration::from_secs(2)).unwrap(),
            CallEvent::Terminated(TerminationReason::AudioDevice(_))
        ));
        assert!(!call.is_ready());
        assert!(call.audio_stats().is_none());
        // exactly one termination reaches the application
        assert!(events.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn test_close_twice() {
        let call = call();
        call.connect(None, Role::Responder).unwrap();
        call.start_audio(Arc::new(MockBackend::new(vec![0; 160])), &OpusCodecFactory)
            .unwrap();
        call.close();
        call.close();
        assert!(!call.is_ready());
        assert!(call.audio_stats().is_none());
    }
}
