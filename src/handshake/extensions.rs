//! Hello extension codec.
//!
//! Grounded on `pkg/crypto/src/tls/extensions.rs` (not itself retrieved in
//! the pack, but referenced throughout `handshake.rs` as
//! `Extension::parse`/`serialize`); the extension set here is narrowed to
//! the ones actually negotiated: `EllipticCurves`, `EllipticCurvePointFormats`,
//! `SignatureAlgorithms`, `ExtendedMasterSecret`, `EncryptThenMac`,
//! `SessionTicketTls`, `ClientCertificateType`, `ServerCertificateType`,
//! `ServerName`.

use bytes::Bytes;

use crate::crypto::facade::SignatureKeyType;
use crate::error::Result;
use crate::record::{ProtocolVersion, DTLS_1_0};
use crate::wire::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NamedCurve {
    Secp256r1,
    Secp384r1,
    X25519,
    Unknown(u16),
}

impl NamedCurve {
    pub fn to_u16(self) -> u16 {
        match self {
            NamedCurve::Secp256r1 => 23,
            NamedCurve::Secp384r1 => 24,
            NamedCurve::X25519 => 29,
            NamedCurve::Unknown(v) => v,
        }
    }

    fn from_u16(v: u16) -> Self {
        match v {
            23 => NamedCurve::Secp256r1,
            24 => NamedCurve::Secp384r1,
            29 => NamedCurve::X25519,
            other => NamedCurve::Unknown(other),
        }
    }

    /// All curves this crate advertises.
    pub fn supported() -> Vec<NamedCurve> {
        vec![NamedCurve::Secp256r1, NamedCurve::Secp384r1, NamedCurve::X25519]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SignatureAndHashAlgorithm {
    pub hash: u8,
    pub signature: u8,
}

impl SignatureAndHashAlgorithm {
    pub const ECDSA_SECP256R1_SHA256: SignatureAndHashAlgorithm =
        SignatureAndHashAlgorithm { hash: 4, signature: 3 };
    pub const RSA_PKCS1_SHA256: SignatureAndHashAlgorithm =
        SignatureAndHashAlgorithm { hash: 4, signature: 1 };
    pub const RSA_PKCS1_SHA1: SignatureAndHashAlgorithm =
        SignatureAndHashAlgorithm { hash: 2, signature: 1 };
    /// RFC 4492's pre-TLS-1.2 "ECDSA-raw" scheme: a raw ECDSA signature
    /// over a SHA-1 digest, with no algorithm id on the wire.
    pub const ECDSA_SHA1_LEGACY: SignatureAndHashAlgorithm =
        SignatureAndHashAlgorithm { hash: 2, signature: 3 };

    /// Picks the scheme a signature over `key_type` should use for the
    /// negotiated `version`: the TLS-1.2-style explicit pair carried in
    /// `CertificateVerify`/`ServerKeyExchange` for DTLS 1.2, or the fixed
    /// SHA-1-based legacy scheme DTLS 1.0/1.1 never names explicitly.
    pub fn for_key(version: ProtocolVersion, key_type: SignatureKeyType) -> SignatureAndHashAlgorithm {
        if version == DTLS_1_0 {
            match key_type {
                SignatureKeyType::Ecdsa => Self::ECDSA_SHA1_LEGACY,
                SignatureKeyType::Rsa => Self::RSA_PKCS1_SHA1,
            }
        } else {
            match key_type {
                SignatureKeyType::Ecdsa => Self::ECDSA_SECP256R1_SHA256,
                SignatureKeyType::Rsa => Self::RSA_PKCS1_SHA256,
            }
        }
    }
}

#[derive(Clone, Debug)]
pub enum Extension {
    EllipticCurves(Vec<NamedCurve>),
    EllipticCurvePointFormats,
    SignatureAlgorithms(Vec<SignatureAndHashAlgorithm>),
    ExtendedMasterSecret,
    EncryptThenMac,
    SessionTicketTls(Bytes),
    ClientCertificateType(Vec<u8>),
    ServerCertificateType(Vec<u8>),
    ServerName(String),
    Unknown { ext_type: u16, data: Bytes },
}

const EXT_SERVER_NAME: u16 = 0;
const EXT_ELLIPTIC_CURVES: u16 = 10;
const EXT_EC_POINT_FORMATS: u16 = 11;
const EXT_SIGNATURE_ALGORITHMS: u16 = 13;
const EXT_CLIENT_CERTIFICATE_TYPE: u16 = 19;
const EXT_SERVER_CERTIFICATE_TYPE: u16 = 20;
const EXT_ENCRYPT_THEN_MAC: u16 = 22;
const EXT_EXTENDED_MASTER_SECRET: u16 = 23;
const EXT_SESSION_TICKET: u16 = 35;

impl Extension {
    pub fn ext_type(&self) -> u16 {
        match self {
            Extension::ServerName(_) => EXT_SERVER_NAME,
            Extension::EllipticCurves(_) => EXT_ELLIPTIC_CURVES,
            Extension::EllipticCurvePointFormats => EXT_EC_POINT_FORMATS,
            Extension::SignatureAlgorithms(_) => EXT_SIGNATURE_ALGORITHMS,
            Extension::ClientCertificateType(_) => EXT_CLIENT_CERTIFICATE_TYPE,
            Extension::ServerCertificateType(_) => EXT_SERVER_CERTIFICATE_TYPE,
            Extension::SessionTicketTls(_) => EXT_SESSION_TICKET,
            Extension::ExtendedMasterSecret => EXT_EXTENDED_MASTER_SECRET,
            Extension::EncryptThenMac => EXT_ENCRYPT_THEN_MAC,
            Extension::Unknown { ext_type, .. } => *ext_type,
        }
    }

    pub fn parse(mut buf: Bytes) -> Result<(Extension, Bytes)> {
        let ext_type = read_u16(&mut buf)?;
        let body = read_varlen(&mut buf, 0, U16_LIMIT)?;
        let ext = match ext_type {
            EXT_SERVER_NAME => {
                let mut list = body;
                need(&list, 2)?;
                let _list_len = read_u16(&mut list)?;
                need(&list, 3)?;
                let _name_type = read_u8(&mut list)?;
                let name = read_varlen(&mut list, 0, U16_LIMIT)?;
                Extension::ServerName(String::from_utf8_lossy(&name).into_owned())
            }
            EXT_ELLIPTIC_CURVES => {
                let mut list = read_varlen(&mut body.clone(), 2, U16_LIMIT)?;
                let mut curves = vec![];
                while !list.is_empty() {
                    curves.push(NamedCurve::from_u16(read_u16(&mut list)?));
                }
                Extension::EllipticCurves(curves)
            }
            EXT_EC_POINT_FORMATS => Extension::EllipticCurvePointFormats,
            EXT_SIGNATURE_ALGORITHMS => {
                let mut list = read_varlen(&mut body.clone(), 2, U16_LIMIT)?;
                let mut algos = vec![];
                while !list.is_empty() {
                    let hash = read_u8(&mut list)?;
                    let signature = read_u8(&mut list)?;
                    algos.push(SignatureAndHashAlgorithm { hash, signature });
                }
                Extension::SignatureAlgorithms(algos)
            }
            EXT_EXTENDED_MASTER_SECRET => Extension::ExtendedMasterSecret,
            EXT_ENCRYPT_THEN_MAC => Extension::EncryptThenMac,
            EXT_SESSION_TICKET => Extension::SessionTicketTls(body),
            EXT_CLIENT_CERTIFICATE_TYPE => Extension::ClientCertificateType(body.to_vec()),
            EXT_SERVER_CERTIFICATE_TYPE => Extension::ServerCertificateType(body.to_vec()),
            other => Extension::Unknown { ext_type: other, data: body },
        };
        Ok((ext, buf))
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        write_u16(out, self.ext_type());
        write_varlen(out, 0, U16_LIMIT, |out| match self {
            Extension::ServerName(name) => {
                write_varlen(out, 0, U16_LIMIT, |out| {
                    write_u8(out, 0);
                    write_varlen(out, 0, U16_LIMIT, |out| out.extend_from_slice(name.as_bytes()));
                });
            }
            Extension::EllipticCurves(curves) => {
                write_varlen(out, 2, U16_LIMIT, |out| {
                    for c in curves {
                        write_u16(out, c.to_u16());
                    }
                });
            }
            Extension::EllipticCurvePointFormats => {
                write_varlen(out, 1, U8_LIMIT, |out| write_u8(out, 0));
            }
            Extension::SignatureAlgorithms(algos) => {
                write_varlen(out, 2, U16_LIMIT, |out| {
                    for a in algos {
                        write_u8(out, a.hash);
                        write_u8(out, a.signature);
                    }
                });
            }
            Extension::ExtendedMasterSecret | Extension::EncryptThenMac => {}
            Extension::SessionTicketTls(data) => out.extend_from_slice(data),
            Extension::ClientCertificateType(v) | Extension::ServerCertificateType(v) => {
                out.extend_from_slice(v)
            }
            Extension::Unknown { data, .. } => out.extend_from_slice(data),
        });
    }
}

pub fn parse_extensions(mut buf: Bytes) -> Result<Vec<Extension>> {
    let mut extensions = vec![];
    while !buf.is_empty() {
        let (ext, rest) = Extension::parse(buf)?;
        extensions.push(ext);
        buf = rest;
    }
    Ok(extensions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_elliptic_curves() {
        let ext = Extension::EllipticCurves(NamedCurve::supported());
        let mut out = vec![];
        ext.serialize(&mut out);

        let (parsed, rest) = Extension::parse(Bytes::from(out)).unwrap();
        assert!(rest.is_empty());
        match parsed {
            Extension::EllipticCurves(curves) => assert_eq!(curves.len(), 3),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn round_trips_extended_master_secret() {
        let ext = Extension::ExtendedMasterSecret;
        let mut out = vec![];
        ext.serialize(&mut out);

        let (parsed, _) = Extension::parse(Bytes::from(out)).unwrap();
        assert!(matches!(parsed, Extension::ExtendedMasterSecret));
    }
}
