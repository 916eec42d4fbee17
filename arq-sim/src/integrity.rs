//! Packet integrity value.
//!
//! The integrity value is the wrapping 32-bit sum of the sequence number, the
//! acknowledgment number and every payload byte.  It detects the link noise
//! the emulators inject (a rewritten header field, an altered payload byte);
//! it is not meant to resist deliberate tampering.

use crate::packet::Packet;

/// Compute the integrity value over `packet`'s current `seq`, `ack` and
/// `payload`.  The stored `checksum` field is not part of the sum.
pub fn compute_integrity(packet: &Packet) -> u32 {
    packet
        .payload
        .iter()
        .fold(packet.seq.wrapping_add(packet.ack), |sum, &b| {
            sum.wrapping_add(u32::from(b))
        })
}

/// `true` when the stored integrity value disagrees with the value recomputed
/// over the packet's current fields.
pub fn is_corrupted(packet: &Packet) -> bool {
    packet.checksum != compute_integrity(packet)
}
