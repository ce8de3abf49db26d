//! Handshake message bodies.
//!
//! Grounded on `pkg/crypto/src/tls/handshake.rs`'s `Handshake` enum and its
//! per-message structs (`ClientHello`, `ServerHello`, `Certificate`,
//! `CertificateVerify`, `Finished`, `ServerKeyExchange`,
//! `ClientKeyExchange`), narrowed to TLS 1.2-shaped wire formats (no TLS
//! 1.3 `EncryptedExtensions`/`KeyUpdate`) and extended with DTLS's
//! `HelloVerifyRequest` (RFC 6347 §4.2.1), which a TLS-only
//! module has no counterpart for.

use bytes::Bytes;

use crate::cipher_suite::CipherSuite;
use crate::error::{Error, ErrorKind, Result};
use crate::handshake::extensions::{parse_extensions, Extension};
use crate::handshake::header::HandshakeType;
use crate::record::{ProtocolVersion, DTLS_1_0};
use crate::wire::*;

#[derive(Clone, Debug)]
pub struct ClientHello {
    pub client_version: ProtocolVersion,
    pub random: [u8; 32],
    pub session_id: Bytes,
    pub cookie: Bytes,
    pub cipher_suites: Vec<u16>,
    pub compression_methods: Bytes,
    pub extensions: Vec<Extension>,
}

impl ClientHello {
    pub fn parse(mut buf: Bytes) -> Result<Self> {
        need(&buf, 2 + 32)?;
        let client_version = (read_u8(&mut buf)?, read_u8(&mut buf)?);
        let random_bytes = read_bytes(&mut buf, 32)?;
        let mut random = [0u8; 32];
        random.copy_from_slice(&random_bytes);
        let session_id = read_varlen(&mut buf, 0, 32)?;
        let cookie = read_varlen(&mut buf, 0, 255)?;
        let cipher_suites_raw = read_varlen(&mut buf, 2, U16_LIMIT - 2)?;
        let mut cipher_suites = vec![];
        {
            let mut data = cipher_suites_raw;
            while !data.is_empty() {
                cipher_suites.push(read_u16(&mut data)?);
            }
        }
        let compression_methods = read_varlen(&mut buf, 1, U8_LIMIT)?;
        let extensions = if buf.is_empty() {
            vec![]
        } else {
            let ext_data = read_varlen(&mut buf, 0, U16_LIMIT)?;
            parse_extensions(ext_data)?
        };
        Ok(ClientHello {
            client_version,
            random,
            session_id,
            cookie,
            cipher_suites,
            compression_methods,
            extensions,
        })
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        write_u8(out, self.client_version.0);
        write_u8(out, self.client_version.1);
        out.extend_from_slice(&self.random);
        write_varlen(out, 0, 32, |out| out.extend_from_slice(&self.session_id));
        write_varlen(out, 0, 255, |out| out.extend_from_slice(&self.cookie));
        write_varlen(out, 2, U16_LIMIT - 2, |out| {
            for suite in &self.cipher_suites {
                write_u16(out, *suite);
            }
        });
        write_varlen(out, 1, U8_LIMIT, |out| out.extend_from_slice(&self.compression_methods));
        write_varlen(out, 0, U16_LIMIT, |out| {
            for ext in &self.extensions {
                ext.serialize(out);
            }
        });
    }
}

#[derive(Clone, Debug)]
pub struct HelloVerifyRequest {
    pub server_version: ProtocolVersion,
    pub cookie: Bytes,
}

impl HelloVerifyRequest {
    pub fn parse(mut buf: Bytes) -> Result<Self> {
        need(&buf, 2)?;
        let server_version = (read_u8(&mut buf)?, read_u8(&mut buf)?);
        let cookie = read_varlen(&mut buf, 0, 255)?;
        Ok(HelloVerifyRequest { server_version, cookie })
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        write_u8(out, self.server_version.0);
        write_u8(out, self.server_version.1);
        write_varlen(out, 0, 255, |out| out.extend_from_slice(&self.cookie));
    }
}

#[derive(Clone, Debug)]
pub struct ServerHello {
    pub server_version: ProtocolVersion,
    pub random: [u8; 32],
    pub session_id: Bytes,
    pub cipher_suite: u16,
    pub compression_method: u8,
    pub extensions: Vec<Extension>,
}

impl ServerHello {
    pub fn parse(mut buf: Bytes) -> Result<Self> {
        need(&buf, 2 + 32)?;
        let server_version = (read_u8(&mut buf)?, read_u8(&mut buf)?);
        let random_bytes = read_bytes(&mut buf, 32)?;
        let mut random = [0u8; 32];
        random.copy_from_slice(&random_bytes);
        let session_id = read_varlen(&mut buf, 0, 32)?;
        let cipher_suite = read_u16(&mut buf)?;
        let compression_method = read_u8(&mut buf)?;
        let extensions = if buf.is_empty() {
            vec![]
        } else {
            let ext_data = read_varlen(&mut buf, 0, U16_LIMIT)?;
            parse_extensions(ext_data)?
        };
        Ok(ServerHello {
            server_version,
            random,
            session_id,
            cipher_suite,
            compression_method,
            extensions,
        })
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        write_u8(out, self.server_version.0);
        write_u8(out, self.server_version.1);
        out.extend_from_slice(&self.random);
        write_varlen(out, 0, 32, |out| out.extend_from_slice(&self.session_id));
        write_u16(out, self.cipher_suite);
        write_u8(out, self.compression_method);
        write_varlen(out, 0, U16_LIMIT, |out| {
            for ext in &self.extensions {
                ext.serialize(out);
            }
        });
    }

    pub fn negotiated_suite(&self) -> Result<CipherSuite> {
        CipherSuite::from_u16(self.cipher_suite).ok_or_else(|| Error::new(ErrorKind::HandshakeFailure))
    }
}

/// TLS 1.2-shaped certificate list: a vector of DER certificates, no
/// TLS 1.3 per-entry extensions (a `Certificate::parse` that branches
/// on protocol version for exactly this difference).
#[derive(Clone, Debug)]
pub struct Certificate {
    pub certificate_list: Vec<Bytes>,
}

impl Certificate {
    pub fn parse(mut buf: Bytes) -> Result<Self> {
        let list_data = read_varlen(&mut buf, 0, U24_LIMIT)?;
        let mut data = list_data;
        let mut certificate_list = vec![];
        while !data.is_empty() {
            certificate_list.push(read_varlen(&mut data, 1, U24_LIMIT)?);
        }
        Ok(Certificate { certificate_list })
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        write_varlen(out, 0, U24_LIMIT, |out| {
            for cert in &self.certificate_list {
                write_varlen(out, 1, U24_LIMIT, |out| out.extend_from_slice(cert));
            }
        });
    }
}

#[derive(Clone, Debug)]
pub struct CertificateRequest {
    pub certificate_types: Bytes,
    pub supported_signature_algorithms: Bytes,
    pub certificate_authorities: Bytes,
}

impl CertificateRequest {
    pub fn parse(mut buf: Bytes) -> Result<Self> {
        let certificate_types = read_varlen(&mut buf, 1, U8_LIMIT)?;
        let supported_signature_algorithms = read_varlen(&mut buf, 2, U16_LIMIT)?;
        let certificate_authorities = read_varlen(&mut buf, 0, U16_LIMIT)?;
        Ok(CertificateRequest {
            certificate_types,
            supported_signature_algorithms,
            certificate_authorities,
        })
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        write_varlen(out, 1, U8_LIMIT, |out| out.extend_from_slice(&self.certificate_types));
        write_varlen(out, 2, U16_LIMIT, |out| {
            out.extend_from_slice(&self.supported_signature_algorithms)
        });
        write_varlen(out, 0, U16_LIMIT, |out| {
            out.extend_from_slice(&self.certificate_authorities)
        });
    }
}

/// `ServerKeyExchange` content varies by key-exchange kind; this
/// crate keeps the raw body and defers interpretation to the engine, which
/// knows the negotiated suite — mirroring a
/// `ServerKeyExchange { data: Bytes }` plus its `ec_diffie_hellman`
/// accessor.
#[derive(Clone, Debug)]
pub struct ServerKeyExchange {
    pub raw: Bytes,
}

impl ServerKeyExchange {
    pub fn parse(buf: Bytes) -> Result<Self> {
        Ok(ServerKeyExchange { raw: buf })
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.raw);
    }

    /// PSK suites: `opaque psk_identity_hint<0..2^16-1>`.
    pub fn psk_identity_hint(&self) -> Result<Bytes> {
        let mut data = self.raw.clone();
        read_varlen(&mut data, 0, U16_LIMIT)
    }

    /// ECDHE suites: `ECParameters curve_params; ECPoint public;` followed
    /// by a `CertificateVerify`-style signature for ECDSA suites.
    pub fn ecdhe_params(&self) -> Result<(u16, Bytes)> {
        let mut data = self.raw.clone();
        need(&data, 4)?;
        let curve_type = read_u8(&mut data)?;
        if curve_type != 3 {
            return Err(Error::new(ErrorKind::HandshakeFailure));
        }
        let named_curve = read_u16(&mut data)?;
        let public = read_varlen(&mut data, 1, U8_LIMIT)?;
        Ok((named_curve, public))
    }

    /// The signature trailing ECDHE-ECDSA's curve params, if present. The
    /// algorithm id pair is `None` for DTLS 1.0/1.1, which never put one on
    /// the wire; the caller infers the legacy scheme from the suite itself.
    pub fn ecdhe_signature(&self, version: ProtocolVersion) -> Result<(Option<(u8, u8)>, Bytes)> {
        let mut data = self.raw.clone();
        need(&data, 4)?;
        let _curve_type = read_u8(&mut data)?;
        let _named_curve = read_u16(&mut data)?;
        let _public = read_varlen(&mut data, 1, U8_LIMIT)?;
        let algorithm = if version == DTLS_1_0 {
            None
        } else {
            need(&data, 2)?;
            let hash = read_u8(&mut data)?;
            let signature = read_u8(&mut data)?;
            Some((hash, signature))
        };
        let sig = read_varlen(&mut data, 0, U16_LIMIT)?;
        Ok((algorithm, sig))
    }
}

#[derive(Clone, Debug)]
pub struct ClientKeyExchange {
    pub raw: Bytes,
}

impl ClientKeyExchange {
    pub fn parse(buf: Bytes) -> Result<Self> {
        Ok(ClientKeyExchange { raw: buf })
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.raw);
    }

    pub fn psk(identity: &[u8]) -> Self {
        let mut raw = vec![];
        write_varlen(&mut raw, 0, U16_LIMIT, |out| out.extend_from_slice(identity));
        ClientKeyExchange { raw: raw.into() }
    }

    pub fn ecdhe_psk(identity: &[u8], public_key: &[u8]) -> Self {
        let mut raw = vec![];
        write_varlen(&mut raw, 0, U16_LIMIT, |out| out.extend_from_slice(identity));
        write_varlen(&mut raw, 1, U8_LIMIT, |out| out.extend_from_slice(public_key));
        ClientKeyExchange { raw: raw.into() }
    }

    pub fn ecdhe(public_key: &[u8]) -> Self {
        let mut raw = vec![];
        write_varlen(&mut raw, 1, U8_LIMIT, |out| out.extend_from_slice(public_key));
        ClientKeyExchange { raw: raw.into() }
    }

    pub fn rsa(encrypted_pre_master: &[u8]) -> Self {
        let mut raw = vec![];
        write_varlen(&mut raw, 0, U16_LIMIT, |out| out.extend_from_slice(encrypted_pre_master));
        ClientKeyExchange { raw: raw.into() }
    }

    pub fn psk_identity(&self) -> Result<Bytes> {
        let mut data = self.raw.clone();
        read_varlen(&mut data, 0, U16_LIMIT)
    }

    pub fn ecdhe_public_key(&self) -> Result<Bytes> {
        let mut data = self.raw.clone();
        read_varlen(&mut data, 1, U8_LIMIT)
    }

    pub fn rsa_encrypted_pre_master(&self) -> Result<Bytes> {
        let mut data = self.raw.clone();
        read_varlen(&mut data, 0, U16_LIMIT)
    }
}

/// `algorithm` is the `(hash, signature)` id pair DTLS 1.2 prepends to the
/// signature; DTLS 1.0/1.1's legacy "ECDSA-raw"/implicit-RSA format carries
/// none, so it parses as `None` and the scheme is instead whatever the
/// negotiated cipher suite's key type implies.
#[derive(Clone, Debug)]
pub struct CertificateVerify {
    pub algorithm: Option<(u8, u8)>,
    pub signature: Bytes,
}

impl CertificateVerify {
    pub fn parse(mut buf: Bytes, version: ProtocolVersion) -> Result<Self> {
        let algorithm = if version == DTLS_1_0 {
            None
        } else {
            need(&buf, 2)?;
            let hash_algorithm = read_u8(&mut buf)?;
            let signature_algorithm = read_u8(&mut buf)?;
            Some((hash_algorithm, signature_algorithm))
        };
        let signature = read_varlen(&mut buf, 0, U16_LIMIT)?;
        Ok(CertificateVerify { algorithm, signature })
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        if let Some((hash_algorithm, signature_algorithm)) = self.algorithm {
            write_u8(out, hash_algorithm);
            write_u8(out, signature_algorithm);
        }
        write_varlen(out, 0, U16_LIMIT, |out| out.extend_from_slice(&self.signature));
    }
}

#[derive(Clone, Debug)]
pub struct Finished {
    pub verify_data: Bytes,
}

impl Finished {
    pub fn parse(buf: Bytes) -> Result<Self> {
        Ok(Finished { verify_data: buf })
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.verify_data);
    }
}

#[derive(Clone, Debug)]
pub struct NewSessionTicket {
    pub ticket_lifetime_hint: u32,
    pub ticket: Bytes,
}

impl NewSessionTicket {
    pub fn parse(mut buf: Bytes) -> Result<Self> {
        need(&buf, 4)?;
        let ticket_lifetime_hint = read_u32(&mut buf)?;
        let ticket = read_varlen(&mut buf, 0, U16_LIMIT)?;
        Ok(NewSessionTicket { ticket_lifetime_hint, ticket })
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        write_u32(out, self.ticket_lifetime_hint);
        write_varlen(out, 0, U16_LIMIT, |out| out.extend_from_slice(&self.ticket));
    }
}

/// The parsed body of one handshake message, dispatched by
/// [`HandshakeType`] — mirrors a `Handshake` enum, narrowed to
/// the DTLS 1.2 message set and with `HelloVerifyRequest` added.
#[derive(Clone, Debug)]
pub enum HandshakeBody {
    ClientHello(ClientHello),
    HelloVerifyRequest(HelloVerifyRequest),
    ServerHello(ServerHello),
    Certificate(Certificate),
    ServerKeyExchange(ServerKeyExchange),
    CertificateRequest(CertificateRequest),
    ServerHelloDone,
    ClientKeyExchange(ClientKeyExchange),
    CertificateVerify(CertificateVerify),
    Finished(Finished),
    NewSessionTicket(NewSessionTicket),
}

impl HandshakeBody {
    pub fn msg_type(&self) -> HandshakeType {
        match self {
            HandshakeBody::ClientHello(_) => HandshakeType::ClientHello,
            HandshakeBody::HelloVerifyRequest(_) => HandshakeType::HelloVerifyRequest,
            HandshakeBody::ServerHello(_) => HandshakeType::ServerHello,
            HandshakeBody::Certificate(_) => HandshakeType::Certificate,
            HandshakeBody::ServerKeyExchange(_) => HandshakeType::ServerKeyExchange,
            HandshakeBody::CertificateRequest(_) => HandshakeType::CertificateRequest,
            HandshakeBody::ServerHelloDone => HandshakeType::ServerHelloDone,
            HandshakeBody::ClientKeyExchange(_) => HandshakeType::ClientKeyExchange,
            HandshakeBody::CertificateVerify(_) => HandshakeType::CertificateVerify,
            HandshakeBody::Finished(_) => HandshakeType::Finished,
            HandshakeBody::NewSessionTicket(_) => HandshakeType::NewSessionTicket,
        }
    }

    pub fn parse(msg_type: HandshakeType, body: Bytes, version: ProtocolVersion) -> Result<Self> {
        Ok(match msg_type {
            HandshakeType::ClientHello => HandshakeBody::ClientHello(ClientHello::parse(body)?),
            HandshakeType::HelloVerifyRequest => {
                HandshakeBody::HelloVerifyRequest(HelloVerifyRequest::parse(body)?)
            }
            HandshakeType::ServerHello => HandshakeBody::ServerHello(ServerHello::parse(body)?),
            HandshakeType::Certificate => HandshakeBody::Certificate(Certificate::parse(body)?),
            HandshakeType::ServerKeyExchange => {
                HandshakeBody::ServerKeyExchange(ServerKeyExchange::parse(body)?)
            }
            HandshakeType::CertificateRequest => {
                HandshakeBody::CertificateRequest(CertificateRequest::parse(body)?)
            }
            HandshakeType::ServerHelloDone => {
                if !body.is_empty() {
                    return Err(Error::new(ErrorKind::Malformed));
                }
                HandshakeBody::ServerHelloDone
            }
            HandshakeType::ClientKeyExchange => {
                HandshakeBody::ClientKeyExchange(ClientKeyExchange::parse(body)?)
            }
            HandshakeType::CertificateVerify => {
                HandshakeBody::CertificateVerify(CertificateVerify::parse(body, version)?)
            }
            HandshakeType::Finished => HandshakeBody::Finished(Finished::parse(body)?),
            HandshakeType::NewSessionTicket => {
                HandshakeBody::NewSessionTicket(NewSessionTicket::parse(body)?)
            }
            HandshakeType::HelloRequest | HandshakeType::Unknown(_) => {
                return Err(Error::new(ErrorKind::UnexpectedMessage))
            }
        })
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        match self {
            HandshakeBody::ClientHello(v) => v.serialize(out),
            HandshakeBody::HelloVerifyRequest(v) => v.serialize(out),
            HandshakeBody::ServerHello(v) => v.serialize(out),
            HandshakeBody::Certificate(v) => v.serialize(out),
            HandshakeBody::ServerKeyExchange(v) => v.serialize(out),
            HandshakeBody::CertificateRequest(v) => v.serialize(out),
            HandshakeBody::ServerHelloDone => {}
            HandshakeBody::ClientKeyExchange(v) => v.serialize(out),
            HandshakeBody::CertificateVerify(v) => v.serialize(out),
            HandshakeBody::Finished(v) => v.serialize(out),
            HandshakeBody::NewSessionTicket(v) => v.serialize(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_client_hello() {
        let hello = ClientHello {
            client_version: (254, 253),
            random: [7u8; 32],
            session_id: Bytes::new(),
            cookie: Bytes::new(),
            cipher_suites: vec![CipherSuite::PskWithAes128Ccm8.to_u16()],
            compression_methods: Bytes::from_static(&[0]),
            extensions: vec![Extension::ExtendedMasterSecret],
        };
        let mut out = vec![];
        hello.serialize(&mut out);

        let parsed = ClientHello::parse(Bytes::from(out)).unwrap();
        assert_eq!(parsed.client_version, (254, 253));
        assert_eq!(parsed.random, [7u8; 32]);
        assert_eq!(parsed.cipher_suites, vec![CipherSuite::PskWithAes128Ccm8.to_u16()]);
    }

    #[test]
    fn round_trips_hello_verify_request() {
        let hvr = HelloVerifyRequest {
            server_version: (254, 253),
            cookie: Bytes::from_static(b"0123456789abcdef"),
        };
        let mut out = vec![];
        hvr.serialize(&mut out);

        let parsed = HelloVerifyRequest::parse(Bytes::from(out)).unwrap();
        assert_eq!(&parsed.cookie[..], b"0123456789abcdef");
    }

    #[test]
    fn round_trips_client_key_exchange_psk() {
        let cke = ClientKeyExchange::psk(b"Client_identity");
        let mut out = vec![];
        cke.serialize(&mut out);

        let parsed = ClientKeyExchange::parse(Bytes::from(out)).unwrap();
        assert_eq!(&parsed.psk_identity().unwrap()[..], b"Client_identity");
    }
}
