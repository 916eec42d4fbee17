//! Packet and message definitions shared by both endpoints.
//!
//! Every unit exchanged between the sender and the receiver is a [`Packet`].
//! A packet carries exactly one application [`Message`] worth of payload; pure
//! acknowledgments carry a zero-filled payload and the [`NOT_IN_USE`] sentinel
//! in their sequence-number field.
//!
//! The engines work on the in-memory representation.  [`Packet::encode`] and
//! [`Packet::decode`] exist for runtimes that move packets as raw datagrams
//! (see [`crate::session`]).
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Sequence Number                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                    Acknowledgment Number                      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                       Integrity Value                         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                     Payload (20 bytes) ...                    |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Total encoded size: [`ENCODED_LEN`] = 32 bytes.

use std::fmt;

use thiserror::Error;

use crate::integrity::compute_integrity;

/// Length in bytes of one application message (and of every payload).
pub const PAYLOAD_LEN: usize = 20;

/// Sentinel stored in header fields that carry no meaning for this packet.
///
/// Data packets carry no acknowledgment; acknowledgments carry no sequence
/// number.
pub const NOT_IN_USE: u32 = u32::MAX;

/// Byte length of an encoded packet.
pub const ENCODED_LEN: usize = 12 + PAYLOAD_LEN;

const OFF_SEQ: usize = 0;
const OFF_ACK: usize = 4;
const OFF_CHECKSUM: usize = 8;
const OFF_PAYLOAD: usize = 12;

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A fixed-length application payload.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Message(pub [u8; PAYLOAD_LEN]);

impl Message {
    /// A message made of `PAYLOAD_LEN` copies of `byte`.
    pub fn filled(byte: u8) -> Self {
        Self([byte; PAYLOAD_LEN])
    }

    /// Build a message from an arbitrary byte string, truncating or
    /// zero-padding to `PAYLOAD_LEN`.
    pub fn from_slice(data: &[u8]) -> Self {
        let mut buf = [0u8; PAYLOAD_LEN];
        let n = data.len().min(PAYLOAD_LEN);
        buf[..n].copy_from_slice(&data[..n]);
        Self(buf)
    }

    pub fn as_bytes(&self) -> &[u8; PAYLOAD_LEN] {
        &self.0
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Message({:?})", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

// ---------------------------------------------------------------------------
// Packet
// ---------------------------------------------------------------------------

/// One protocol datagram.
///
/// `checksum` is the integrity value computed when the packet was built.  A
/// lossy link may alter any other field afterwards; the receiving endpoint
/// detects that with [`crate::integrity::is_corrupted`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Sequence number, or [`NOT_IN_USE`] for a pure acknowledgment.
    pub seq: u32,
    /// Acknowledged sequence number, or [`NOT_IN_USE`] for a data packet.
    pub ack: u32,
    /// Integrity value over `seq`, `ack` and `payload`.
    pub checksum: u32,
    pub payload: [u8; PAYLOAD_LEN],
}

impl Packet {
    /// Build a data packet carrying `message` at sequence number `seq`.
    pub fn data(seq: u32, message: &Message) -> Self {
        Self::sealed(seq, NOT_IN_USE, message.0)
    }

    /// Build a pure acknowledgment for sequence number `ack`.
    ///
    /// The payload is zero-filled.
    pub fn ack(ack: u32) -> Self {
        Self::sealed(NOT_IN_USE, ack, [0u8; PAYLOAD_LEN])
    }

    fn sealed(seq: u32, ack: u32, payload: [u8; PAYLOAD_LEN]) -> Self {
        let mut packet = Self {
            seq,
            ack,
            checksum: 0,
            payload,
        };
        packet.checksum = compute_integrity(&packet);
        packet
    }

    /// The payload viewed as an application message.
    pub fn message(&self) -> Message {
        Message(self.payload)
    }

    /// `true` when this packet carries an acknowledgment number.
    pub fn is_ack(&self) -> bool {
        self.ack != NOT_IN_USE
    }

    /// Serialise this packet into a newly allocated byte vector.
    ///
    /// The stored checksum is written as-is; it is not recomputed.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; ENCODED_LEN];
        buf[OFF_SEQ..OFF_SEQ + 4].copy_from_slice(&self.seq.to_be_bytes());
        buf[OFF_ACK..OFF_ACK + 4].copy_from_slice(&self.ack.to_be_bytes());
        buf[OFF_CHECKSUM..OFF_CHECKSUM + 4].copy_from_slice(&self.checksum.to_be_bytes());
        buf[OFF_PAYLOAD..].copy_from_slice(&self.payload);
        buf
    }

    /// Parse a [`Packet`] from a raw byte slice.
    ///
    /// Only the length is validated.  A datagram whose bytes were altered in
    /// transit still decodes; the integrity check belongs to the endpoints.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() != ENCODED_LEN {
            return Err(PacketError::LengthMismatch {
                expected: ENCODED_LEN,
                actual: buf.len(),
            });
        }

        let mut payload = [0u8; PAYLOAD_LEN];
        payload.copy_from_slice(&buf[OFF_PAYLOAD..]);

        Ok(Self {
            seq: read_u32(buf, OFF_SEQ),
            ack: read_u32(buf, OFF_ACK),
            checksum: read_u32(buf, OFF_CHECKSUM),
            payload,
        })
    }
}

fn read_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_be_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

/// Errors that can arise when parsing a raw datagram.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("datagram is {actual} bytes, expected {expected}")]
    LengthMismatch { expected: usize, actual: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrity::is_corrupted;

    #[test]
    fn data_packet_has_no_ack() {
        let pkt = Packet::data(3, &Message::filled(b'c'));
        assert_eq!(pkt.seq, 3);
        assert_eq!(pkt.ack, NOT_IN_USE);
        assert!(!pkt.is_ack());
        assert_eq!(pkt.message(), Message::filled(b'c'));
        assert!(!is_corrupted(&pkt));
    }

    #[test]
    fn ack_packet_is_zero_filled() {
        let pkt = Packet::ack(7);
        assert_eq!(pkt.seq, NOT_IN_USE);
        assert_eq!(pkt.ack, 7);
        assert!(pkt.is_ack());
        assert_eq!(pkt.payload, [0u8; PAYLOAD_LEN]);
        assert!(!is_corrupted(&pkt));
    }

    #[test]
    fn encode_decode_preserves_fields() {
        let pkt = Packet::data(11, &Message::from_slice(b"hello"));
        let decoded = Packet::decode(&pkt.encode()).unwrap();
        assert_eq!(decoded, pkt);
    }

    #[test]
    fn encoded_length_is_fixed() {
        assert_eq!(Packet::ack(0).encode().len(), ENCODED_LEN);
        assert_eq!(ENCODED_LEN, 32);
    }

    #[test]
    fn seq_ack_big_endian_on_wire() {
        let mut pkt = Packet::ack(0x0506_0708);
        pkt.seq = 0x0102_0304;
        let bytes = pkt.encode();
        assert_eq!(&bytes[OFF_SEQ..OFF_SEQ + 4], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&bytes[OFF_ACK..OFF_ACK + 4], &[0x05, 0x06, 0x07, 0x08]);
    }

    #[test]
    fn decode_wrong_length_returns_error() {
        let mut bytes = Packet::ack(1).encode();
        bytes.pop();
        assert_eq!(
            Packet::decode(&bytes),
            Err(PacketError::LengthMismatch {
                expected: ENCODED_LEN,
                actual: ENCODED_LEN - 1
            })
        );
        assert!(Packet::decode(&[]).is_err());
    }

    #[test]
    fn flipped_byte_still_decodes_but_is_corrupted() {
        let mut bytes = Packet::data(2, &Message::filled(b'b')).encode();
        bytes[OFF_PAYLOAD + 4] ^= 0x40;
        let decoded = Packet::decode(&bytes).unwrap();
        assert!(is_corrupted(&decoded));
    }

    #[test]
    fn from_slice_pads_and_truncates() {
        let short = Message::from_slice(b"ab");
        assert_eq!(&short.0[..3], b"ab\0");
        let long = Message::from_slice(&[b'x'; 40]);
        assert_eq!(long, Message::filled(b'x'));
    }
}
