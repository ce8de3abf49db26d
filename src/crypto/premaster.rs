//! Suite-specific pre-master secret assembly: PSK's length-prefixed
//! concatenation and RSA's version-prefixed random block.
//!
//! Grounded on RFC 4279 (PSK premaster) and RFC 5246 §7.4.7.1 (RSA
//! premaster) — there is no PSK or RSA key-exchange path in a plain
//! `tls` module to ground on directly (its `ClientHandshakeExecutor` only
//! drives TLS 1.3's ECDHE-only key schedule), so this is hand-rolled at the
//! same level of abstraction as the rest of [`crate::crypto`], consuming
//! only the façade's `SecureRandom`/`Signer` primitives rather than any
//! concrete crypto implementation.

use crate::record::ProtocolVersion;

/// `len(other_secret):u16 || other_secret || len(psk):u16 || psk`.
/// For pure PSK, pass `other_secret = None` and this zero-fills a buffer the
/// length of `psk` per RFC 4279; for ECDHE-PSK, pass the ECDH shared
/// secret.
pub fn psk_pre_master(psk: &[u8], other_secret: Option<&[u8]>) -> Vec<u8> {
    let zero_fill;
    let other: &[u8] = match other_secret {
        Some(s) => s,
        None => {
            zero_fill = vec![0u8; psk.len()];
            &zero_fill
        }
    };

    let mut out = Vec::with_capacity(4 + other.len() + psk.len());
    out.extend_from_slice(&(other.len() as u16).to_be_bytes());
    out.extend_from_slice(other);
    out.extend_from_slice(&(psk.len() as u16).to_be_bytes());
    out.extend_from_slice(psk);
    out
}

/// Builds the 48-byte RSA pre-master plaintext: the client's advertised
/// version followed by 46 bytes of CSPRNG output. The caller then
/// PKCS#1-v1.5-encrypts this under the server's RSA public key via the
/// façade (out of scope here).
pub fn rsa_pre_master(client_version: ProtocolVersion, random_46_bytes: &[u8; 46]) -> [u8; 48] {
    let mut out = [0u8; 48];
    out[0] = client_version.0;
    out[1] = client_version.1;
    out[2..].copy_from_slice(random_46_bytes);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn psk_pre_master_zero_fills_when_no_other_secret() {
        let pm = psk_pre_master(b"key123", None);
        assert_eq!(&pm[0..2], &6u16.to_be_bytes());
        assert_eq!(&pm[2..8], &[0u8; 6]);
        assert_eq!(&pm[8..10], &6u16.to_be_bytes());
        assert_eq!(&pm[10..], b"key123");
    }

    #[test]
    fn psk_pre_master_uses_ecdhe_shared_secret() {
        let pm = psk_pre_master(b"psk", Some(b"shared"));
        assert_eq!(&pm[0..2], &6u16.to_be_bytes());
        assert_eq!(&pm[2..8], b"shared");
        assert_eq!(&pm[8..10], &3u16.to_be_bytes());
        assert_eq!(&pm[10..], b"psk");
    }

    #[test]
    fn rsa_pre_master_stamps_client_version() {
        let pm = rsa_pre_master((254, 253), &[7u8; 46]);
        assert_eq!(pm[0], 254);
        assert_eq!(pm[1], 253);
        assert_eq!(&pm[2..], &[7u8; 46]);
    }
}
