//! Datagram channel
//!
//! The session talks to the network through [`DatagramChannel`] so tests
//! can substitute an in-memory channel for a real socket.

use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;

use crate::config::NetworkConfig;
use crate::error::NetworkError;

/// Unreliable, unordered datagram transport
pub trait DatagramChannel: Send + Sync {
    /// Send one datagram to `addr`
    fn send_to(&self, datagram: &[u8], addr: SocketAddr) -> io::Result<usize>;

    /// Receive one datagram
    ///
    /// May return `WouldBlock`/`TimedOut` after the channel's read timeout
    /// so callers can re-check their stop flag.
    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;

    fn local_addr(&self) -> io::Result<SocketAddr>;

    /// Release the underlying resource; safe to call repeatedly
    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Whether a receive error is just the read timeout expiring
pub fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

/// UDP channel configured through socket2
pub struct UdpChannel {
    socket: Mutex<Option<Arc<UdpSocket>>>,
    local_addr: SocketAddr,
}

impl UdpChannel {
    /// Bind to the configured address and port
    pub fn bind(config: &NetworkConfig) -> Result<Self, NetworkError> {
        let addr = SocketAddr::new(config.bind_address, config.port);
        let socket = Self::create_socket(addr, config)
            .map_err(|e| NetworkError::BindFailed(format!("{}: {}", addr, e)))?;
        let local_addr = socket
            .local_addr()
            .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

        tracing::info!("UDP channel bound to {}", local_addr);

        Ok(Self {
            socket: Mutex::new(Some(Arc::new(socket))),
            local_addr,
        })
    }

    fn create_socket(addr: SocketAddr, config: &NetworkConfig) -> io::Result<UdpSocket> {
        let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.set_recv_buffer_size(config.buffer_size)?;
        socket.set_send_buffer_size(config.buffer_size)?;
        socket.bind(&addr.into())?;
        socket.set_read_timeout(Some(config.recv_timeout()))?;
        Ok(socket.into())
    }

    fn socket(&self) -> io::Result<Arc<UdpSocket>> {
        self.socket
            .lock()
            .clone()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "channel closed"))
    }
}

impl DatagramChannel for UdpChannel {
    fn send_to(&self, datagram: &[u8], addr: SocketAddr) -> io::Result<usize> {
        self.socket()?.send_to(datagram, addr)
    }

    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        // the lock is not held across the blocking call
        self.socket()?.recv_from(buf)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.local_addr)
    }

    fn close(&self) {
        if self.socket.lock().take().is_some() {
            tracing::debug!("UDP channel {} closed", self.local_addr);
        }
    }

    fn is_closed(&self) -> bool {
        self.socket.lock().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn loopback_config() -> NetworkConfig {
        NetworkConfig {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            recv_timeout_ms: 20,
            ..NetworkConfig::default()
        }
    }

    #[test]
    fn test_bind_ephemeral() {
        let channel = UdpChannel::bind(&loopback_config()).unwrap();
        assert_ne!(channel.local_addr().unwrap().port(), 0);
        assert!(!channel.is_closed());
    }

    #[test]
    fn test_send_and_receive() {
        let a = UdpChannel::bind(&loopback_config()).unwrap();
        let b = UdpChannel::bind(&loopback_config()).unwrap();

        a.send_to(&[1, 2, 3], b.local_addr().unwrap()).unwrap();

        let mut buf = [0u8; 16];
        let (len, from) = b.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], &[1, 2, 3]);
        assert_eq!(from, a.local_addr().unwrap());
    }

    #[test]
    fn test_receive_times_out() {
        let channel = UdpChannel::bind(&loopback_config()).unwrap();
        let mut buf = [0u8; 16];
        let err = channel.recv_from(&mut buf).unwrap_err();
        assert!(is_timeout(&err));
    }

    #[test]
    fn test_close_is_idempotent() {
        let channel = UdpChannel::bind(&loopback_config()).unwrap();
        channel.close();
        channel.close();
        assert!(channel.is_closed());

        let err = channel
            .send_to(&[0], SocketAddr::from(([127, 0, 0, 1], 9)))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }
}
