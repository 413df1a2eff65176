//! Integrity check shared by both endpoints.
//!
//! The checksum is the wrapping sum of `seqnum`, the wire image of `acknum`
//! and every payload byte. Any single altered field or byte changes the sum.

use crate::packet::Packet;

pub fn compute_checksum(packet: &Packet) -> u32 {
    packet.payload.iter().fold(
        packet.seqnum.wrapping_add(packet.wire_acknum()),
        |sum, &byte| sum.wrapping_add(byte as u32),
    )
}

/// True iff the stored checksum differs from the recomputed one.
pub fn is_corrupted(packet: &Packet) -> bool {
    packet.checksum != compute_checksum(packet)
}
