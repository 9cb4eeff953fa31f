//! Handshake-free duplex session
//!
//! ```text
//! Idle --connect--> Bound(role, peer?) --> Ready --close--> Closed
//!                                            |
//!                                        disconnect (not ready, channel kept)
//! ```
//!
//! The initiator fixes the peer address at connect time. The responder
//! learns it from the first datagram that arrives while ready, and never
//! re-learns it.
//!
//! Sending never queues: a submitted packet replaces whatever the send pump
//! has not transmitted yet, so the newest frame always wins. Packets are
//! built before the handoff, so concurrent audio and video submissions can
//! replace each other but never mix inside one datagram.

use bytes::Bytes;
use crossbeam_channel::Sender;
use parking_lot::{Mutex, RwLock};
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::NetworkConfig;
use crate::error::{NetworkError, TerminationReason};
use crate::network::channel::{is_timeout, DatagramChannel, UdpChannel};
use crate::network::packet::{frame_packet, parse_packet, PacketType};
use crate::worker::{PumpControl, Worker};

/// Which side of the call this session is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Knows the peer address at connect time
    Initiator,
    /// Learns the peer address from the first inbound datagram
    Responder,
}

impl Role {
    pub fn from_initiator(is_initiator: bool) -> Self {
        if is_initiator {
            Role::Initiator
        } else {
            Role::Responder
        }
    }
}

/// Observable session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Bound,
    Ready,
    Closed,
}

/// Upward notifications from the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Ready,
    Terminated(TerminationReason),
}

/// Consumer of inbound payloads for one medium
///
/// Called on the receive pump thread with the tag already stripped.
pub trait PacketHandler: Send + Sync {
    fn handle_packet(&self, payload: &[u8]);
}

impl<F> PacketHandler for F
where
    F: Fn(&[u8]) + Send + Sync,
{
    fn handle_packet(&self, payload: &[u8]) {
        self(payload)
    }
}

/// Outbound side of a session as seen by the media pipelines
pub trait PacketSink: Send + Sync {
    fn is_ready(&self) -> bool;
    fn send(&self, kind: PacketType, payload: &[u8]);
}

/// Session statistics
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub packets_received: u64,
    pub bytes_received: u64,
    /// Sends rejected because the session was not ready or had no peer
    pub dropped_not_ready: u64,
    /// Sends rejected for exceeding the payload cap
    pub dropped_oversize: u64,
    /// Packets replaced in the send slot before transmission
    pub overwritten: u64,
    /// Inbound datagrams discarded (not ready, empty, unknown tag)
    pub discarded: u64,
}

#[derive(Default)]
struct Counters {
    packets_sent: AtomicU64,
    bytes_sent: AtomicU64,
    packets_received: AtomicU64,
    bytes_received: AtomicU64,
    dropped_not_ready: AtomicU64,
    dropped_oversize: AtomicU64,
    overwritten: AtomicU64,
    discarded: AtomicU64,
}

struct Inner {
    channel: Arc<dyn DatagramChannel>,
    config: NetworkConfig,
    role: Mutex<Option<Role>>,
    peer: Mutex<Option<SocketAddr>>,
    ready: AtomicBool,
    closed: AtomicBool,
    terminated: AtomicBool,
    outbound: Mutex<Option<Bytes>>,
    audio_handler: RwLock<Option<Arc<dyn PacketHandler>>>,
    video_handler: RwLock<Option<Arc<dyn PacketHandler>>>,
    events: Sender<SessionEvent>,
    counters: Counters,
}

impl Inner {
    fn terminate(&self, reason: TerminationReason) {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return;
        }
        self.ready.store(false, Ordering::SeqCst);
        tracing::error!("Session terminated: {}", reason);
        let _ = self.events.send(SessionEvent::Terminated(reason));
    }

    fn in_teardown(&self) -> bool {
        !self.ready.load(Ordering::SeqCst) || self.closed.load(Ordering::SeqCst)
    }

    fn handle_datagram(&self, datagram: &[u8], from: SocketAddr) {
        if !self.ready.load(Ordering::SeqCst) {
            self.counters.discarded.fetch_add(1, Ordering::Relaxed);
            return;
        }

        {
            let mut peer = self.peer.lock();
            if peer.is_none() {
                tracing::info!("Learned peer address {}", from);
                *peer = Some(from);
            }
        }

        self.counters.packets_received.fetch_add(1, Ordering::Relaxed);
        self.counters
            .bytes_received
            .fetch_add(datagram.len() as u64, Ordering::Relaxed);

        let (kind, payload) = match parse_packet(datagram) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::debug!("Dropping datagram from {}: {}", from, e);
                self.counters.discarded.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        let handler = match kind {
            PacketType::Audio => self.audio_handler.read().clone(),
            PacketType::Video => self.video_handler.read().clone(),
        };
        match handler {
            Some(handler) => handler.handle_packet(payload),
            None => {
                tracing::trace!("No {} handler, dropping {} bytes", kind, payload.len());
                self.counters.discarded.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn receive_loop(&self, control: &PumpControl) -> crate::Result<()> {
        let mut buf = vec![0u8; self.config.buffer_size];
        while control.in_pump() {
            match self.channel.recv_from(&mut buf) {
                Ok((len, from)) => self.handle_datagram(&buf[..len], from),
                Err(e) if is_timeout(&e) => continue,
                Err(e) => {
                    if self.channel.is_closed() {
                        break;
                    }
                    if self.in_teardown() {
                        tracing::debug!("Receive error during teardown: {}", e);
                    } else {
                        tracing::warn!("Receive error: {}", e);
                    }
                }
            }
        }
        Ok(())
    }

    fn send_loop(&self, control: &PumpControl) -> crate::Result<()> {
        while control.in_pump() {
            // pause before taking the slot so a submit racing with this
            // iteration re-wakes the pump instead of being lost
            control.pause();

            let Some(packet) = self.outbound.lock().take() else {
                continue;
            };
            if !self.ready.load(Ordering::SeqCst) {
                continue;
            }
            let Some(peer) = *self.peer.lock() else {
                continue;
            };

            match self.channel.send_to(&packet, peer) {
                Ok(_) => {
                    self.counters.packets_sent.fetch_add(1, Ordering::Relaxed);
                    self.counters
                        .bytes_sent
                        .fetch_add(packet.len() as u64, Ordering::Relaxed);
                }
                Err(e) if self.in_teardown() => {
                    tracing::debug!("Send error during teardown: {}", e);
                }
                Err(e) => tracing::warn!("Send to {} failed: {}", peer, e),
            }
        }
        Ok(())
    }
}

/// One call's transport session
pub struct Session {
    inner: Arc<Inner>,
    reader: Worker,
    writer: Worker,
}

impl Session {
    /// Bind a UDP channel per `config` and start the pumps
    ///
    /// A bind failure is reported through `events` as well as returned.
    pub fn bind(config: NetworkConfig, events: Sender<SessionEvent>) -> Result<Self, NetworkError> {
        match UdpChannel::bind(&config) {
            Ok(channel) => Self::new(Arc::new(channel), config, events),
            Err(e) => {
                tracing::error!("Session terminated: {}", e);
                let _ = events.send(SessionEvent::Terminated(TerminationReason::Channel(
                    e.to_string(),
                )));
                Err(e)
            }
        }
    }

    /// Start a session over an existing channel
    pub fn new(
        channel: Arc<dyn DatagramChannel>,
        config: NetworkConfig,
        events: Sender<SessionEvent>,
    ) -> Result<Self, NetworkError> {
        let inner = Arc::new(Inner {
            channel,
            config,
            role: Mutex::new(None),
            peer: Mutex::new(None),
            ready: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
            outbound: Mutex::new(None),
            audio_handler: RwLock::new(None),
            video_handler: RwLock::new(None),
            events,
            counters: Counters::default(),
        });

        let session = Self {
            inner,
            reader: Worker::new("net-receive"),
            writer: Worker::new("net-send"),
        };

        let inner = session.inner.clone();
        let on_fault = session.fault_handler();
        session
            .reader
            .start(move |control| inner.receive_loop(control), Some(on_fault))
            .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

        let inner = session.inner.clone();
        let on_fault = session.fault_handler();
        session
            .writer
            .start(move |control| inner.send_loop(control), Some(on_fault))
            .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

        session.reader.resume();
        Ok(session)
    }

    fn fault_handler(&self) -> crate::worker::FaultHandler {
        let inner = self.inner.clone();
        Box::new(move |reason| inner.terminate(reason))
    }

    /// Enter the ready state
    ///
    /// The initiator resolves `peer_host` now (a bare host uses the
    /// configured peer port). The responder ignores it and waits for the
    /// first inbound datagram.
    pub fn connect(&self, peer_host: Option<&str>, role: Role) -> Result<(), NetworkError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(NetworkError::Closed);
        }

        let peer = match role {
            Role::Initiator => {
                let host = peer_host.ok_or_else(|| {
                    NetworkError::ResolveFailed("initiator requires a peer host".into())
                })?;
                match resolve_peer(host, self.inner.config.peer_port) {
                    Ok(addr) => Some(addr),
                    Err(e) => {
                        self.inner.terminate(TerminationReason::Resolve(e.to_string()));
                        return Err(e);
                    }
                }
            }
            Role::Responder => None,
        };

        *self.inner.role.lock() = Some(role);
        *self.inner.peer.lock() = peer;
        self.inner.ready.store(true, Ordering::SeqCst);

        match peer {
            Some(addr) => tracing::info!("Session ready as {:?}, peer {}", role, addr),
            None => tracing::info!("Session ready as {:?}, awaiting peer", role),
        }
        let _ = self.inner.events.send(SessionEvent::Ready);
        Ok(())
    }

    /// Submit one payload
    ///
    /// Silently dropped when not ready, when no peer is known, or when the
    /// payload exceeds the cap. Replaces any packet not yet transmitted.
    pub fn send(&self, kind: PacketType, payload: &[u8]) {
        let inner = &self.inner;
        if !inner.ready.load(Ordering::SeqCst) || inner.peer.lock().is_none() {
            inner.counters.dropped_not_ready.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let packet = match frame_packet(kind, payload, inner.config.max_payload()) {
            Ok(packet) => packet,
            Err(e) => {
                tracing::debug!("Dropping {} payload: {}", kind, e);
                inner.counters.dropped_oversize.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        if inner.outbound.lock().replace(packet).is_some() {
            inner.counters.overwritten.fetch_add(1, Ordering::Relaxed);
        }
        self.writer.resume();
    }

    /// Register the consumer for one medium's inbound payloads
    pub fn set_handler(&self, kind: PacketType, handler: Arc<dyn PacketHandler>) {
        let slot = match kind {
            PacketType::Audio => &self.inner.audio_handler,
            PacketType::Video => &self.inner.video_handler,
        };
        *slot.write() = Some(handler);
    }

    pub fn clear_handler(&self, kind: PacketType) {
        let slot = match kind {
            PacketType::Audio => &self.inner.audio_handler,
            PacketType::Video => &self.inner.video_handler,
        };
        *slot.write() = None;
    }

    /// Stop sending and receiving meaningfully; the channel stays open
    pub fn disconnect(&self) {
        if self.inner.ready.swap(false, Ordering::SeqCst) {
            tracing::info!("Session disconnected");
        }
        self.inner.outbound.lock().take();
    }

    /// Stop both pumps and release the channel; safe to call repeatedly
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.ready.store(false, Ordering::SeqCst);
        self.writer.shutdown();
        self.reader.shutdown();
        self.inner.channel.close();
        tracing::info!("Session closed");
    }

    pub fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::SeqCst)
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        *self.inner.peer.lock()
    }

    pub fn role(&self) -> Option<Role> {
        *self.inner.role.lock()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.channel.local_addr().ok()
    }

    pub fn state(&self) -> SessionState {
        if self.inner.closed.load(Ordering::SeqCst) {
            SessionState::Closed
        } else if self.is_ready() {
            SessionState::Ready
        } else if self.role().is_some() {
            SessionState::Bound
        } else {
            SessionState::Idle
        }
    }

    pub fn stats(&self) -> SessionStats {
        let c = &self.inner.counters;
        SessionStats {
            packets_sent: c.packets_sent.load(Ordering::Relaxed),
            bytes_sent: c.bytes_sent.load(Ordering::Relaxed),
            packets_received: c.packets_received.load(Ordering::Relaxed),
            bytes_received: c.bytes_received.load(Ordering::Relaxed),
            dropped_not_ready: c.dropped_not_ready.load(Ordering::Relaxed),
            dropped_oversize: c.dropped_oversize.load(Ordering::Relaxed),
            overwritten: c.overwritten.load(Ordering::Relaxed),
            discarded: c.discarded.load(Ordering::Relaxed),
        }
    }
}

impl PacketSink for Session {
    fn is_ready(&self) -> bool {
        Session::is_ready(self)
    }

    fn send(&self, kind: PacketType, payload: &[u8]) {
        Session::send(self, kind, payload)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

/// Resolve `host` (optionally `host:port`) to a socket address
pub fn resolve_peer(host: &str, default_port: u16) -> Result<SocketAddr, NetworkError> {
    if let Ok(addr) = host.parse::<SocketAddr>() {
        return Ok(addr);
    }
    (host, default_port)
        .to_socket_addrs()
        .map_err(|e| NetworkError::ResolveFailed(format!("{}: {}", host, e)))?
        .next()
        .ok_or_else(|| NetworkError::ResolveFailed(format!("{}: no addresses", host)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{unbounded, Receiver};
    use std::io;
    use std::time::{Duration, Instant};

    /// In-memory channel: records writes, replays injected datagrams
    struct MockChannel {
        sent: Mutex<Vec<(Vec<u8>, SocketAddr)>>,
        inbound_tx: Sender<(Vec<u8>, SocketAddr)>,
        inbound_rx: Receiver<(Vec<u8>, SocketAddr)>,
        closed: AtomicBool,
        /// Time each write stays on the wire
        send_delay: Duration,
    }

    impl MockChannel {
        fn new() -> Arc<Self> {
            Self::with_send_delay(Duration::ZERO)
        }

        fn with_send_delay(send_delay: Duration) -> Arc<Self> {
            let (inbound_tx, inbound_rx) = unbounded();
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                inbound_tx,
                inbound_rx,
                closed: AtomicBool::new(false),
                send_delay,
            })
        }

        fn inject(&self, datagram: &[u8], from: SocketAddr) {
            self.inbound_tx.send((datagram.to_vec(), from)).unwrap();
        }

        fn sent(&self) -> Vec<(Vec<u8>, SocketAddr)> {
            self.sent.lock().clone()
        }
    }

    impl DatagramChannel for MockChannel {
        fn send_to(&self, datagram: &[u8], addr: SocketAddr) -> io::Result<usize> {
            self.sent.lock().push((datagram.to_vec(), addr));
            std::thread::sleep(self.send_delay);
            Ok(datagram.len())
        }

        fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
            match self.inbound_rx.recv_timeout(Duration::from_millis(10)) {
                Ok((data, from)) => {
                    buf[..data.len()].copy_from_slice(&data);
                    Ok((data.len(), from))
                }
                Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "timeout")),
            }
        }

        fn local_addr(&self) -> io::Result<SocketAddr> {
            Ok(SocketAddr::from(([127, 0, 0, 1], 54321)))
        }

        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        cond()
    }

    fn session(channel: &Arc<MockChannel>) -> (Session, Receiver<SessionEvent>) {
        let (tx, rx) = unbounded();
        let session = Session::new(channel.clone(), NetworkConfig::default(), tx).unwrap();
        (session, rx)
    }

    fn addr(last: u8, port: u16) -> SocketAddr {
        SocketAddr::from(([10, 0, 0, last], port))
    }

    #[test]
    fn test_not_ready_never_writes() {
        let channel = MockChannel::new();
        let (session, _events) = session(&channel);

        assert_eq!(session.state(), SessionState::Idle);
        session.send(PacketType::Audio, &[1, 2, 3]);
        std::thread::sleep(Duration::from_millis(30));

        assert!(channel.sent().is_empty());
        assert_eq!(session.stats().dropped_not_ready, 1);
    }

    #[test]
    fn test_initiator_sends_to_fixed_peer() {
        let channel = MockChannel::new();
        let (session, events) = session(&channel);

        session.connect(Some("10.0.0.5"), Role::Initiator).unwrap();
        assert_eq!(events.recv_timeout(Duration::from_secs(1)).unwrap(), SessionEvent::Ready);
        assert_eq!(session.peer_addr(), Some(addr(5, 54321)));

        session.send(PacketType::Audio, &[0xAB; 80]);
        assert!(wait_until(|| channel.sent().len() == 1));

        let (datagram, to) = &channel.sent()[0];
        assert_eq!(*to, addr(5, 54321));
        assert_eq!(datagram[0], 1);
        assert_eq!(&datagram[1..], &[0xAB; 80][..]);
    }

    #[test]
    fn test_newest_packet_wins_while_writer_busy() {
        let channel = MockChannel::with_send_delay(Duration::from_millis(100));
        let (session, events) = session(&channel);
        session.connect(Some("10.0.0.5"), Role::Initiator).unwrap();
        assert_eq!(events.recv_timeout(Duration::from_secs(1)).unwrap(), SessionEvent::Ready);

        session.send(PacketType::Audio, &[1]);
        assert!(wait_until(|| channel.sent().len() == 1));

        // the writer is stuck on the first packet; the second never leaves
        session.send(PacketType::Audio, &[2]);
        session.send(PacketType::Audio, &[3]);
        assert!(wait_until(|| channel.sent().len() == 2));
        std::thread::sleep(Duration::from_millis(250));

        let payloads: Vec<Vec<u8>> = channel.sent().into_iter().map(|(d, _)| d).collect();
        assert_eq!(payloads, vec![vec![1, 1], vec![1, 3]]);
        assert_eq!(session.stats().overwritten, 1);
    }

    #[test]
    fn test_responder_learns_peer_once() {
        let channel = MockChannel::new();
        let (session, _events) = session(&channel);
        session.connect(None, Role::Responder).unwrap();
        assert_eq!(session.peer_addr(), None);

        // no peer yet, nothing goes out
        session.send(PacketType::Video, &[1]);

        channel.inject(&[1, 9, 9], addr(7, 4000));
        assert!(wait_until(|| session.peer_addr().is_some()));
        channel.inject(&[1, 9, 9], addr(8, 4001));
        assert!(wait_until(|| session.stats().packets_received == 2));
        assert_eq!(session.peer_addr(), Some(addr(7, 4000)));

        session.send(PacketType::Video, &[5; 40]);
        assert!(wait_until(|| channel.sent().len() == 1));
        assert_eq!(channel.sent()[0].1, addr(7, 4000));
    }

    #[test]
    fn test_datagrams_before_ready_discarded() {
        let channel = MockChannel::new();
        let (session, _events) = session(&channel);

        channel.inject(&[1, 1], addr(7, 4000));
        assert!(wait_until(|| session.stats().discarded == 1));
        assert_eq!(session.peer_addr(), None);
    }

    #[test]
    fn test_dispatch_by_tag() {
        let channel = MockChannel::new();
        let (session, _events) = session(&channel);
        let audio = Arc::new(Mutex::new(Vec::new()));
        let video = Arc::new(Mutex::new(Vec::new()));

        let sink = audio.clone();
        session.set_handler(
            PacketType::Audio,
            Arc::new(move |p: &[u8]| sink.lock().push(p.to_vec())),
        );
        let sink = video.clone();
        session.set_handler(
            PacketType::Video,
            Arc::new(move |p: &[u8]| sink.lock().push(p.to_vec())),
        );
        session.connect(None, Role::Responder).unwrap();

        channel.inject(&[1, 10, 11], addr(7, 4000));
        channel.inject(&[0, 20], addr(7, 4000));
        channel.inject(&[9, 30], addr(7, 4000));
        channel.inject(&[], addr(7, 4000));

        assert!(wait_until(|| session.stats().packets_received == 4));
        assert_eq!(audio.lock().as_slice(), &[vec![10, 11]]);
        assert_eq!(video.lock().as_slice(), &[vec![20]]);
        assert_eq!(session.stats().discarded, 2);
    }

    #[test]
    fn test_oversize_dropped() {
        let channel = MockChannel::new();
        let (session, _events) = session(&channel);
        session.connect(Some("10.0.0.5:9000"), Role::Initiator).unwrap();

        session.send(PacketType::Video, &vec![0u8; 65_000]);
        std::thread::sleep(Duration::from_millis(30));
        assert!(channel.sent().is_empty());
        assert_eq!(session.stats().dropped_oversize, 1);

        session.send(PacketType::Video, &vec![0u8; 64_999]);
        assert!(wait_until(|| channel.sent().len() == 1));
        assert_eq!(channel.sent()[0].0.len(), 65_000);
    }

    #[test]
    fn test_packets_never_mix() {
        let channel = MockChannel::new();
        let (session, _events) = session(&channel);
        session.connect(Some("10.0.0.5"), Role::Initiator).unwrap();
        let session = Arc::new(session);

        let audio = {
            let session = session.clone();
            std::thread::spawn(move || {
                for _ in 0..500 {
                    session.send(PacketType::Audio, &[0xAA; 64]);
                }
            })
        };
        for _ in 0..500 {
            session.send(PacketType::Video, &[0x55; 32]);
        }
        audio.join().unwrap();

        assert!(wait_until(|| !channel.sent().is_empty()));
        for (datagram, _) in channel.sent() {
            match datagram[0] {
                1 => assert!(datagram.len() == 65 && datagram[1..].iter().all(|b| *b == 0xAA)),
                0 => assert!(datagram.len() == 33 && datagram[1..].iter().all(|b| *b == 0x55)),
                other => panic!("unexpected tag {}", other),
            }
        }
    }

    #[test]
    fn test_disconnect_keeps_channel() {
        let channel = MockChannel::new();
        let (session, _events) = session(&channel);
        session.connect(Some("10.0.0.5"), Role::Initiator).unwrap();

        session.disconnect();
        assert_eq!(session.state(), SessionState::Bound);
        assert!(!channel.is_closed());

        session.send(PacketType::Audio, &[1]);
        std::thread::sleep(Duration::from_millis(20));
        assert!(channel.sent().is_empty());
    }

    #[test]
    fn test_close_twice() {
        let channel = MockChannel::new();
        let (session, _events) = session(&channel);
        session.connect(None, Role::Responder).unwrap();

        session.close();
        session.close();
        assert_eq!(session.state(), SessionState::Closed);
        assert!(channel.is_closed());
        assert!(matches!(
            session.connect(None, Role::Responder),
            Err(NetworkError::Closed)
        ));
    }

    #[test]
    fn test_unresolvable_host_terminates() {
        let channel = MockChannel::new();
        let (session, events) = session(&channel);

        let result = session.connect(Some("no such host.invalid"), Role::Initiator);
        assert!(matches!(result, Err(NetworkError::ResolveFailed(_))));
        assert!(matches!(
            events.recv_timeout(Duration::from_secs(1)).unwrap(),
            SessionEvent::Terminated(TerminationReason::Resolve(_))
        ));
        assert!(!session.is_ready());
    }
}
