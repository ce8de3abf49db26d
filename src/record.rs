//! DTLS record framing (`Record`, 13-byte header).
//!
//! Grounded on `pkg/crypto/src/tls/record.rs`'s `Record`/`ContentType`, but
//! the header gains the 16-bit epoch and 48-bit sequence number DTLS adds
//! over TLS, and the outer length field covers one fragment rather than an
//! entire plaintext record (handshake fragmentation happens above this
//! layer — handshake messages exceeding the payload budget are fragmented
//! at the handshake layer, never at the record layer).

use bytes::{Bytes, BytesMut};

use crate::error::{Error, ErrorKind, Result};
use crate::wire::*;

/// DTLS 1.2 ≡ {254, 253}; DTLS 1.0 ≡ {254, 255}.
pub type ProtocolVersion = (u8, u8);
pub const DTLS_1_0: ProtocolVersion = (254, 255);
pub const DTLS_1_2: ProtocolVersion = (254, 253);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentType {
    ChangeCipherSpec,
    Alert,
    Handshake,
    ApplicationData,
    Unknown(u8),
}

impl ContentType {
    pub fn to_u8(self) -> u8 {
        match self {
            ContentType::ChangeCipherSpec => 20,
            ContentType::Alert => 21,
            ContentType::Handshake => 22,
            ContentType::ApplicationData => 23,
            ContentType::Unknown(v) => v,
        }
    }

    pub fn from_u8(v: u8) -> Self {
        match v {
            20 => ContentType::ChangeCipherSpec,
            21 => ContentType::Alert,
            22 => ContentType::Handshake,
            23 => ContentType::ApplicationData,
            other => ContentType::Unknown(other),
        }
    }
}

/// The 13-byte DTLS record header plus its fragment.
#[derive(Debug, Clone)]
pub struct Record {
    pub content_type: ContentType,
    pub version: ProtocolVersion,
    pub epoch: u16,
    /// 48-bit sequence number (top 16 bits always zero).
    pub sequence_number: u64,
    pub fragment: Bytes,
}

pub const RECORD_HEADER_LEN: usize = 13;

impl Record {
    /// The combined 64-bit nonce input `(epoch << 48) | sequence_number`
    /// used by AEAD/CBC ciphers.
    pub fn nonce_seq(epoch: u16, sequence_number: u64) -> u64 {
        ((epoch as u64) << 48) | (sequence_number & 0x0000_ffff_ffff_ffff)
    }

    /// Parses one record from the front of `buf`, returning the record and
    /// whatever bytes of `buf` remain unconsumed. Rejects a record whose
    /// declared fragment length exceeds the remaining datagram.
    pub fn parse(mut buf: Bytes) -> Result<(Record, Bytes)> {
        need(&buf, RECORD_HEADER_LEN)?;
        let content_type = ContentType::from_u8(read_u8(&mut buf)?);
        let version = (read_u8(&mut buf)?, read_u8(&mut buf)?);
        let epoch = read_u16(&mut buf)?;
        let sequence_number = read_u48(&mut buf)?;
        let frag_len = read_u16(&mut buf)? as usize;
        if frag_len > buf.len() {
            return Err(Error::with_message(
                ErrorKind::Malformed,
                "fragment length exceeds remaining datagram",
            ));
        }
        let fragment = read_bytes(&mut buf, frag_len)?;
        Ok((Record { content_type, version, epoch, sequence_number, fragment }, buf))
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        write_u8(out, self.content_type.to_u8());
        write_u8(out, self.version.0);
        write_u8(out, self.version.1);
        write_u16(out, self.epoch);
        write_u48(out, self.sequence_number);
        debug_assert!(self.fragment.len() <= U16_LIMIT);
        write_u16(out, self.fragment.len() as u16);
        out.extend_from_slice(&self.fragment);
    }
}

/// Splits a received datagram into the zero or more records it may contain
/// (DTLS allows coalescing several records into one UDP payload).
pub fn parse_datagram(mut buf: Bytes) -> Result<Vec<Record>> {
    let mut records = vec![];
    while !buf.is_empty() {
        let (record, rest) = Record::parse(buf)?;
        records.push(record);
        buf = rest;
    }
    Ok(records)
}

pub fn serialize_records(records: &[Record]) -> BytesMut {
    let mut out = Vec::new();
    for record in records {
        record.serialize(&mut out);
    }
    BytesMut::from(&out[..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_header() {
        let record = Record {
            content_type: ContentType::Handshake,
            version: DTLS_1_2,
            epoch: 1,
            sequence_number: 0x0000_0001_0203,
            fragment: Bytes::from_static(b"hello"),
        };
        let mut buf = vec![];
        record.serialize(&mut buf);
        assert_eq!(buf.len(), RECORD_HEADER_LEN + 5);

        let (parsed, rest) = Record::parse(Bytes::from(buf)).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed.epoch, 1);
        assert_eq!(parsed.sequence_number, 0x0000_0001_0203);
        assert_eq!(&parsed.fragment[..], b"hello");
    }

    #[test]
    fn rejects_truncated_fragment() {
        let mut buf = vec![22, 254, 253, 0, 0, 0, 0, 0, 0, 0, 0, 0, 10];
        buf.extend_from_slice(b"short");
        let err = Record::parse(Bytes::from(buf)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Malformed);
    }

    #[test]
    fn nonce_seq_packs_epoch_and_sequence() {
        assert_eq!(Record::nonce_seq(1, 0), 1u64 << 48);
        assert_eq!(Record::nonce_seq(0, 5), 5);
    }
}
