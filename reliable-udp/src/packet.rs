//! Wire-format definitions for protocol packets.
//!
//! Every datagram exchanged between peers is a [`Packet`].  This module is
//! responsible for:
//! - Defining the on-wire binary layout (kind tag, fragment id, payload).
//! - Serialising a [`Packet`] into a byte buffer ready for transmission.
//! - Deserialising a raw byte slice back into a [`Packet`], rejecting
//!   truncated headers and unknown kinds.
//!
//! No I/O happens here — this is pure data transformation.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     Kind      |                                               |
//! +-+-+-+-+-+-+-+-+                                               +
//! |                       Fragment Id (64 bit)                    |
//! +               +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |               |            Payload ... (DATA only)            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Total header size: [`HEADER_LEN`] = 9 bytes.
//! kind(1) + id(8)
//!
//! There is no length field: a datagram boundary is a packet boundary, so
//! every byte after the header is payload.

use thiserror::Error;

/// Byte length of the fixed-size header on the wire.
pub const HEADER_LEN: usize = 9;

/// Reserved fragment id meaning "no id".  Senders start numbering at 1.
pub const NO_ID: u64 = 0;

// Byte offsets of each field within the serialised header.
const OFF_KIND: usize = 0;
const OFF_ID: usize = 1;

// ---------------------------------------------------------------------------
// PacketKind
// ---------------------------------------------------------------------------

/// The kind tag carried in the first header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketKind {
    /// Acknowledges the DATA packet with the same id.
    Ack = 1,
    /// Carries one fragment of an application buffer.
    Data = 2,
}

impl From<PacketKind> for u8 {
    fn from(kind: PacketKind) -> Self {
        kind as u8
    }
}

impl TryFrom<u8> for PacketKind {
    type Error = PacketError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            1 => Ok(Self::Ack),
            2 => Ok(Self::Data),
            other => Err(PacketError::UnknownKind(other)),
        }
    }
}

impl std::fmt::Display for PacketKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ack => f.write_str("ACK"),
            Self::Data => f.write_str("DATA"),
        }
    }
}

// ---------------------------------------------------------------------------
// Packet
// ---------------------------------------------------------------------------

/// A complete protocol datagram: header + optional payload.
///
/// An ACK never carries a payload and its `id` is the id of the DATA packet
/// it acknowledges.  Build packets with [`Packet::data`] and [`Packet::ack`]
/// so that invariant holds by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub kind: PacketKind,
    pub id: u64,
    /// `None` for ACKs and for DATA packets with an empty fragment.
    pub payload: Option<Vec<u8>>,
}

impl Packet {
    /// A DATA packet carrying `payload` as fragment `id`.
    ///
    /// An empty payload is stored as `None`, which is what [`Packet::decode`]
    /// yields for a header with no trailing bytes.
    pub fn data(id: u64, payload: Vec<u8>) -> Self {
        Self {
            kind: PacketKind::Data,
            id,
            payload: (!payload.is_empty()).then_some(payload),
        }
    }

    /// An ACK for fragment `id`.
    pub fn ack(id: u64) -> Self {
        Self {
            kind: PacketKind::Ack,
            id,
            payload: None,
        }
    }

    /// Payload bytes, empty when absent.
    pub fn payload_bytes(&self) -> &[u8] {
        self.payload.as_deref().unwrap_or_default()
    }

    /// Serialise this packet into a newly allocated byte vector.
    pub fn encode(&self) -> Vec<u8> {
        let payload = self.payload_bytes();
        let mut buf = vec![0u8; HEADER_LEN + payload.len()];

        buf[OFF_KIND] = self.kind.into();
        buf[OFF_ID..OFF_ID + 8].copy_from_slice(&self.id.to_be_bytes());
        buf[HEADER_LEN..].copy_from_slice(payload);

        buf
    }

    /// Parse a [`Packet`] from a raw byte slice.
    ///
    /// Returns [`Err`] if:
    /// - `buf` is shorter than [`HEADER_LEN`], or
    /// - the kind tag is neither ACK (1) nor DATA (2).
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < HEADER_LEN {
            return Err(PacketError::TooShort { len: buf.len() });
        }

        let kind = PacketKind::try_from(buf[OFF_KIND])?;
        let mut id = [0u8; 8];
        id.copy_from_slice(&buf[OFF_ID..OFF_ID + 8]);
        let body = &buf[HEADER_LEN..];

        Ok(Packet {
            kind,
            id: u64::from_be_bytes(id),
            payload: (!body.is_empty()).then(|| body.to_vec()),
        })
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can arise when parsing a raw datagram.
///
/// Every variant means the header is malformed; the channel discards such
/// datagrams and keeps going.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// Buffer shorter than the fixed header size.
    #[error("datagram of {len} bytes is shorter than the {HEADER_LEN}-byte header")]
    TooShort { len: usize },
    /// Kind tag is not a known [`PacketKind`].
    #[error("unknown packet kind tag {0:#04x}")]
    UnknownKind(u8),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_encode_decode_roundtrip() {
        let pkt = Packet::data(42, b"hello".to_vec());
        let decoded = Packet::decode(&pkt.encode()).unwrap();
        assert_eq!(decoded, pkt);
        assert_eq!(decoded.payload_bytes(), b"hello");
    }

    #[test]
    fn ack_has_no_payload_on_the_wire() {
        let bytes = Packet::ack(7).encode();
        assert_eq!(bytes.len(), HEADER_LEN);
        let decoded = Packet::decode(&bytes).unwrap();
        assert_eq!(decoded.kind, PacketKind::Ack);
        assert_eq!(decoded.id, 7);
        assert_eq!(decoded.payload, None);
    }

    #[test]
    fn empty_data_payload_decodes_as_none() {
        let pkt = Packet::data(1, Vec::new());
        assert_eq!(pkt.payload, None);
        let decoded = Packet::decode(&pkt.encode()).unwrap();
        assert_eq!(decoded.kind, PacketKind::Data);
        assert_eq!(decoded.payload, None);
    }

    #[test]
    fn decode_empty_buffer_returns_error() {
        assert_eq!(Packet::decode(&[]), Err(PacketError::TooShort { len: 0 }));
    }

    #[test]
    fn decode_short_header_returns_error() {
        let err = Packet::decode(&[2u8; HEADER_LEN - 1]).unwrap_err();
        assert_eq!(err, PacketError::TooShort { len: HEADER_LEN - 1 });
    }

    #[test]
    fn decode_unknown_kind_returns_error() {
        let mut bytes = Packet::ack(3).encode();
        bytes[OFF_KIND] = 4;
        assert_eq!(Packet::decode(&bytes), Err(PacketError::UnknownKind(4)));

        bytes[OFF_KIND] = 0;
        assert_eq!(Packet::decode(&bytes), Err(PacketError::UnknownKind(0)));
    }

    #[test]
    fn kind_tags_match_wire_values() {
        assert_eq!(Packet::ack(0).encode()[OFF_KIND], 1);
        assert_eq!(Packet::data(0, vec![9]).encode()[OFF_KIND], 2);
        assert_eq!(PacketKind::try_from(1u8), Ok(PacketKind::Ack));
        assert_eq!(PacketKind::try_from(2u8), Ok(PacketKind::Data));
    }

    #[test]
    fn id_big_endian_on_wire() {
        let bytes = Packet::ack(0x0102_0304_0506_0708).encode();
        assert_eq!(
            &bytes[OFF_ID..OFF_ID + 8],
            &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]
        );
    }

    #[test]
    fn trailing_bytes_become_payload() {
        let mut bytes = vec![2u8];
        bytes.extend_from_slice(&5u64.to_be_bytes());
        bytes.extend_from_slice(b"xyz");
        let pkt = Packet::decode(&bytes).unwrap();
        assert_eq!(pkt.id, 5);
        assert_eq!(pkt.payload.as_deref(), Some(&b"xyz"[..]));
    }

    #[test]
    fn encoded_length_equals_header_plus_payload() {
        let payload = b"exactly twelve!";
        let pkt = Packet::data(1, payload.to_vec());
        assert_eq!(pkt.encode().len(), HEADER_LEN + payload.len());
    }

    #[test]
    fn header_len_constant_is_correct() {
        // kind(1) + id(8) = 9
        assert_eq!(HEADER_LEN, 9);
    }
}
