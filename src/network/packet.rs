//! Datagram framing
//!
//! ```text
//! ┌────────┬──────────────────────────┐
//! │ tag:u8 │ payload (0..=MTU-1 bytes)│
//! └────────┴──────────────────────────┘
//! ```
//!
//! Tag 0 is video, tag 1 is audio. There is no length field; the payload
//! length is the datagram length minus one.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::NetworkError;

/// Media kind carried by a datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    Video = 0,
    Audio = 1,
}

impl PacketType {
    pub fn tag(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for PacketType {
    type Error = NetworkError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(PacketType::Video),
            1 => Ok(PacketType::Audio),
            other => Err(NetworkError::UnknownPacketType(other)),
        }
    }
}

impl std::fmt::Display for PacketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PacketType::Video => write!(f, "video"),
            PacketType::Audio => write!(f, "audio"),
        }
    }
}

/// Prefix `payload` with its tag
///
/// Rejects payloads longer than `max_payload`.
pub fn frame_packet(
    kind: PacketType,
    payload: &[u8],
    max_payload: usize,
) -> Result<Bytes, NetworkError> {
    if payload.len() > max_payload {
        return Err(NetworkError::PacketTooLarge(payload.len()));
    }
    let mut buf = BytesMut::with_capacity(payload.len() + 1);
    buf.put_u8(kind.tag());
    buf.extend_from_slice(payload);
    Ok(buf.freeze())
}

/// Split a datagram into its tag and payload
pub fn parse_packet(datagram: &[u8]) -> Result<(PacketType, &[u8]), NetworkError> {
    let (&tag, payload) = datagram
        .split_first()
        .ok_or(NetworkError::InvalidPacket)?;
    Ok((PacketType::try_from(tag)?, payload))
}
