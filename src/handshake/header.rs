//! The 12-byte DTLS handshake header (`HandshakeHeader`) and the
//! fragment-offset/length bookkeeping that rides on top of a plain TLS
//! handshake framing (`pkg/crypto/src/tls/handshake.rs`'s
//! `Handshake::parse`/`serialize` only deal with `{msg_type, length}`; DTLS
//! adds `message_seq`, `fragment_offset`, `fragment_length`, RFC 6347 §4.2).

use bytes::Bytes;

use crate::error::Result;
use crate::wire::*;

pub const HANDSHAKE_HEADER_LEN: usize = 12;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandshakeType {
    HelloRequest,
    ClientHello,
    ServerHello,
    HelloVerifyRequest,
    NewSessionTicket,
    Certificate,
    ServerKeyExchange,
    CertificateRequest,
    ServerHelloDone,
    CertificateVerify,
    ClientKeyExchange,
    Finished,
    Unknown(u8),
}

impl HandshakeType {
    pub fn to_u8(self) -> u8 {
        match self {
            HandshakeType::HelloRequest => 0,
            HandshakeType::ClientHello => 1,
            HandshakeType::ServerHello => 2,
            HandshakeType::HelloVerifyRequest => 3,
            HandshakeType::NewSessionTicket => 4,
            HandshakeType::Certificate => 11,
            HandshakeType::ServerKeyExchange => 12,
            HandshakeType::CertificateRequest => 13,
            HandshakeType::ServerHelloDone => 14,
            HandshakeType::CertificateVerify => 15,
            HandshakeType::ClientKeyExchange => 16,
            HandshakeType::Finished => 20,
            HandshakeType::Unknown(v) => v,
        }
    }

    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => HandshakeType::HelloRequest,
            1 => HandshakeType::ClientHello,
            2 => HandshakeType::ServerHello,
            3 => HandshakeType::HelloVerifyRequest,
            4 => HandshakeType::NewSessionTicket,
            11 => HandshakeType::Certificate,
            12 => HandshakeType::ServerKeyExchange,
            13 => HandshakeType::CertificateRequest,
            14 => HandshakeType::ServerHelloDone,
            15 => HandshakeType::CertificateVerify,
            16 => HandshakeType::ClientKeyExchange,
            20 => HandshakeType::Finished,
            other => HandshakeType::Unknown(other),
        }
    }
}

#[derive(Clone, Debug)]
pub struct HandshakeHeader {
    pub msg_type: HandshakeType,
    pub length: u32,
    pub message_seq: u16,
    pub fragment_offset: u32,
    pub fragment_length: u32,
}

impl HandshakeHeader {
    pub fn parse(mut buf: Bytes) -> Result<(HandshakeHeader, Bytes)> {
        need(&buf, HANDSHAKE_HEADER_LEN)?;
        let msg_type = HandshakeType::from_u8(read_u8(&mut buf)?);
        let length = read_u24(&mut buf)?;
        let message_seq = read_u16(&mut buf)?;
        let fragment_offset = read_u24(&mut buf)?;
        let fragment_length = read_u24(&mut buf)?;
        Ok((
            HandshakeHeader { msg_type, length, message_seq, fragment_offset, fragment_length },
            buf,
        ))
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        write_u8(out, self.msg_type.to_u8());
        write_u24(out, self.length);
        write_u16(out, self.message_seq);
        write_u24(out, self.fragment_offset);
        write_u24(out, self.fragment_length);
    }

    /// True when this header describes a complete, unfragmented message
    /// (offset 0, fragment length equal to the total length).
    pub fn is_complete_single_fragment(&self) -> bool {
        self.fragment_offset == 0 && self.fragment_length == self.length
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let header = HandshakeHeader {
            msg_type: HandshakeType::ClientHello,
            length: 300,
            message_seq: 2,
            fragment_offset: 100,
            fragment_length: 50,
        };
        let mut buf = vec![];
        header.serialize(&mut buf);
        assert_eq!(buf.len(), HANDSHAKE_HEADER_LEN);

        let (parsed, rest) = HandshakeHeader::parse(Bytes::from(buf)).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed.length, 300);
        assert_eq!(parsed.message_seq, 2);
        assert_eq!(parsed.fragment_offset, 100);
        assert_eq!(parsed.fragment_length, 50);
        assert!(!parsed.is_complete_single_fragment());
    }
}
