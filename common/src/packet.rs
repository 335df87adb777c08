use core::fmt;
use core::ops::Deref;

use crc::{Crc, CRC_32_ISCSI};
use serde::{Deserialize, Serialize};

/// Bumped whenever the layout of [`Message`] changes
pub const PROTOCOL_VERSION: u8 = 1;

/// ESP-NOW will not carry more than 250 bytes in a single datagram
pub const MAX_FRAME_SIZE: usize = 250;

static CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

/// Motion state reported by the sensor node to its peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OutboundEvent {
    pub motion_detected: bool,
}

/// Instruction from the peer to move this node onto another radio channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundControl {
    pub wifi_channel: i32,
}

/// Everything that travels over the link. The variant index doubles as the
/// type tag on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    Motion(OutboundEvent),
    SetChannel(InboundControl),
}

/// Versioned envelope, serialized with postcard and followed by a CRC-32
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    pub version: u8,
    pub message: Message,
}

impl Packet {
    pub fn new(message: Message) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            message,
        }
    }
}

/// An encoded packet, ready to hand to the radio
#[derive(Clone)]
pub struct Frame {
    buf: [u8; MAX_FRAME_SIZE],
    len: usize,
}

impl Frame {
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl Deref for Frame {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Frame").field(&self.as_bytes()).finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    /// The packet does not fit in a single datagram
    Overflow,
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::Overflow => write!(f, "packet exceeds {MAX_FRAME_SIZE} bytes"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Datagram longer than anything the radio can produce
    TooLong(usize),
    /// Checksum does not match the contents
    BadChecksum,
    /// Truncated, unknown message tag, or otherwise not a packet
    Malformed,
    /// Well-formed packet from an incompatible protocol revision
    UnsupportedVersion(u8),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::TooLong(len) => {
                write!(f, "datagram of {len} bytes exceeds {MAX_FRAME_SIZE}")
            }
            DecodeError::BadChecksum => f.write_str("checksum mismatch"),
            DecodeError::Malformed => f.write_str("malformed packet"),
            DecodeError::UnsupportedVersion(version) => {
                write!(f, "unsupported protocol version {version}")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for EncodeError {}

#[cfg(feature = "std")]
impl std::error::Error for DecodeError {}

/// Serialize a message into a checksummed frame
pub fn encode(message: &Message) -> Result<Frame, EncodeError> {
    let packet = Packet::new(*message);
    let mut buf = [0u8; MAX_FRAME_SIZE];
    let len = postcard::to_slice_crc32(&packet, &mut buf, CRC.digest())
        .map_err(|_| EncodeError::Overflow)?
        .len();

    Ok(Frame { buf, len })
}

/// Validate and deserialize a received datagram
pub fn decode(data: &[u8]) -> Result<Message, DecodeError> {
    if data.len() > MAX_FRAME_SIZE {
        return Err(DecodeError::TooLong(data.len()));
    }

    let packet: Packet =
        postcard::from_bytes_crc32(data, CRC.digest()).map_err(|e| match e {
            postcard::Error::DeserializeBadCrc => DecodeError::BadChecksum,
            _ => DecodeError::Malformed,
        })?;

    if packet.version != PROTOCOL_VERSION {
        return Err(DecodeError::UnsupportedVersion(packet.version));
    }

    Ok(packet.message)
}
