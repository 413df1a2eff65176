use serde::{Deserialize, Serialize};

use crate::checksum;
use crate::error::MessageError;

/// Size of every payload and application message, in bytes.
pub const PAYLOAD_SIZE: usize = 20;

/// Wire image of an unused header field (`-1` as a two's-complement integer).
pub const NOT_IN_USE: u32 = u32::MAX;

/// Fixed-size application data unit. Opaque to the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Message(pub [u8; PAYLOAD_SIZE]);

impl Message {
    /// Build a message from at most [`PAYLOAD_SIZE`] bytes, zero-padding the tail.
    pub fn from_slice(data: &[u8]) -> Result<Self, MessageError> {
        if data.len() > PAYLOAD_SIZE {
            return Err(MessageError::TooLong { len: data.len() });
        }
        let mut bytes = [0u8; PAYLOAD_SIZE];
        bytes[..data.len()].copy_from_slice(data);
        Ok(Self(bytes))
    }

    /// A message filled with a single repeated byte, as the traffic generator produces.
    pub fn filled(byte: u8) -> Self {
        Self([byte; PAYLOAD_SIZE])
    }

    pub fn as_bytes(&self) -> &[u8; PAYLOAD_SIZE] {
        &self.0
    }
}

impl TryFrom<&[u8]> for Message {
    type Error = MessageError;

    fn try_from(data: &[u8]) -> Result<Self, Self::Error> {
        Self::from_slice(data)
    }
}

/// What a packet is used for. Derived from the header, never stored on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketRole {
    Data,
    Ack,
}

/// Wire packet. Data and acknowledgment packets share the same layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    /// Sequence number of a data packet, or the receiver's alternating bit on an ACK.
    pub seqnum: u32,
    /// Acknowledged sequence number. `None` on data packets.
    pub acknum: Option<u32>,
    pub checksum: u32,
    pub payload: [u8; PAYLOAD_SIZE],
}

impl Packet {
    /// Create a sealed data packet carrying `message`.
    pub fn data(seqnum: u32, message: &Message) -> Self {
        let mut packet = Self {
            seqnum,
            acknum: None,
            checksum: 0,
            payload: message.0,
        };
        packet.seal();
        packet
    }

    /// Create a sealed acknowledgment with a zero-filled payload.
    pub fn ack(seqnum: u32, acknum: u32) -> Self {
        let mut packet = Self {
            seqnum,
            acknum: Some(acknum),
            checksum: 0,
            payload: [0; PAYLOAD_SIZE],
        };
        packet.seal();
        packet
    }

    pub fn role(&self) -> PacketRole {
        match self.acknum {
            Some(_) => PacketRole::Ack,
            None => PacketRole::Data,
        }
    }

    pub fn is_ack(&self) -> bool {
        self.role() == PacketRole::Ack
    }

    /// The acknum field as it appears on the wire.
    pub fn wire_acknum(&self) -> u32 {
        self.acknum.unwrap_or(NOT_IN_USE)
    }

    /// Store the checksum of the current header and payload.
    pub fn seal(&mut self) {
        self.checksum = checksum::compute_checksum(self);
    }

    pub fn is_corrupted(&self) -> bool {
        checksum::is_corrupted(self)
    }
}
