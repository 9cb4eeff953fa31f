//! Network subsystem: datagram framing, channel, and call session

pub mod channel;
pub mod packet;
pub mod session;

pub use channel::{DatagramChannel, UdpChannel};
pub use packet::{frame_packet, parse_packet, PacketType};
pub use session::{
    resolve_peer, PacketHandler, PacketSink, Role, Session, SessionEvent, SessionState,
    SessionStats,
};
