//! Per-direction cipher state installed once a handshake completes
//! (encrypt/decrypt and MAC rules).
//!
//! Grounded on `pkg/crypto/src/tls/cipher_tls12.rs`'s
//! `CipherEndpointSpecTLS12::encrypt`/`decrypt`, adapted for DTLS: the
//! sequence number used in AAD/MAC input is the record's own
//! `(epoch, sequence_number)` rather than an implicit running counter (DTLS
//! records carry their sequence number explicitly, so there is no
//! "explicit nonce" field the way TLS 1.2 AEAD records add one), and a CBC
//! variant is added for the MAC-then-encrypt suites alongside the AEAD
//! ones a TLS record layer covers.

use std::sync::Arc;

use bytes::Bytes;

use crate::crypto::facade::{Aead, CbcCipher, Hmac, NonceGenerator};
use crate::error::{Error, ErrorKind, Result};
use crate::record::{ContentType, ProtocolVersion, Record};

/// One direction's (read or write) installed keys and algorithms. The
/// cipher/MAC handles are `Arc`-owned since [`crate::cipher_suite::SuiteMaterial`]
/// already holds them that way and both directions of a negotiated suite
/// share the same underlying primitive.
pub enum CipherEndpointSpec {
    Aead {
        key: Bytes,
        implicit_iv: Bytes,
        aead: Arc<dyn Aead>,
        nonce_gen: Box<dyn NonceGenerator>,
    },
    Cbc {
        mac_key: Bytes,
        enc_key: Bytes,
        cipher: Arc<dyn CbcCipher>,
        hmac: Arc<dyn Hmac>,
    },
}

fn aad(
    epoch: u16,
    sequence_number: u64,
    content_type: ContentType,
    version: ProtocolVersion,
    len: u16,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(13);
    out.extend_from_slice(&epoch.to_be_bytes());
    out.extend_from_slice(&Record::nonce_seq(0, sequence_number).to_be_bytes()[2..]);
    out.push(content_type.to_u8());
    out.push(version.0);
    out.push(version.1);
    out.extend_from_slice(&len.to_be_bytes());
    out
}

impl CipherEndpointSpec {
    /// The CBC variant needs a fresh random explicit IV per record;
    /// callers draw it from their `SecureRandom` before calling `encrypt`.
    /// AEAD ciphers ignore it.
    pub fn explicit_iv_len(&self) -> usize {
        match self {
            CipherEndpointSpec::Aead { .. } => 0,
            CipherEndpointSpec::Cbc { cipher, .. } => cipher.block_size(),
        }
    }

    /// Encrypts one plaintext record fragment under `epoch`/`sequence_number`,
    /// returning the ciphertext that becomes the outgoing record's fragment.
    /// `explicit_iv` must be `explicit_iv_len` fresh random bytes for CBC
    /// suites and is ignored otherwise.
    pub fn encrypt(
        &self,
        epoch: u16,
        sequence_number: u64,
        content_type: ContentType,
        version: ProtocolVersion,
        plaintext: &[u8],
        explicit_iv: &[u8],
    ) -> Vec<u8> {
        match self {
            CipherEndpointSpec::Aead { key, implicit_iv, aead, nonce_gen } => {
                let nonce = nonce_gen.generate(implicit_iv, epoch, sequence_number);
                let ad = aad(epoch, sequence_number, content_type, version, plaintext.len() as u16);
                aead.encrypt(key, &nonce, plaintext, &ad)
            }
            CipherEndpointSpec::Cbc { mac_key, enc_key, cipher, hmac } => {
                let ad = aad(epoch, sequence_number, content_type, version, plaintext.len() as u16);
                let mut mac_input = ad;
                mac_input.extend_from_slice(plaintext);
                let mac = hmac.finish(mac_key, &mac_input);

                let mut padded = plaintext.to_vec();
                padded.extend_from_slice(&mac);
                pad_pkcs7(&mut padded, cipher.block_size());

                let body = cipher.encrypt(enc_key, explicit_iv, &padded);
                let mut out = explicit_iv.to_vec();
                out.extend_from_slice(&body);
                out
            }
        }
    }

    /// Decrypts one received ciphertext fragment, verifying its
    /// authentication tag (AEAD) or MAC (CBC) in the process.
    pub fn decrypt(
        &self,
        epoch: u16,
        sequence_number: u64,
        content_type: ContentType,
        version: ProtocolVersion,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>> {
        match self {
            CipherEndpointSpec::Aead { key, implicit_iv, aead, nonce_gen } => {
                let nonce = nonce_gen.generate(implicit_iv, epoch, sequence_number);
                let plaintext_len = ciphertext.len().saturating_sub(aead.tag_size());
                let ad =
                    aad(epoch, sequence_number, content_type, version, plaintext_len as u16);
                aead.decrypt(key, &nonce, ciphertext, &ad)
            }
            CipherEndpointSpec::Cbc { mac_key, enc_key, cipher, hmac } => {
                let block_size = cipher.block_size();
                if ciphertext.len() < block_size {
                    return Err(Error::new(ErrorKind::Malformed));
                }
                let (iv, body) = ciphertext.split_at(block_size);
                let padded = cipher.decrypt(enc_key, iv, body)?;
                let unpadded = strip_pkcs7(&padded, block_size)?;

                let hash_len = hmac.hasher_factory().hash_len();
                if unpadded.len() < hash_len {
                    return Err(Error::new(ErrorKind::BadRecordMac));
                }
                let (plaintext, mac) = unpadded.split_at(unpadded.len() - hash_len);

                let ad = aad(epoch, sequence_number, content_type, version, plaintext.len() as u16);
                let mut mac_input = ad;
                mac_input.extend_from_slice(plaintext);
                let expected = hmac.finish(mac_key, &mac_input);
                if !constant_time_eq(&expected, mac) {
                    return Err(Error::new(ErrorKind::BadRecordMac));
                }
                Ok(plaintext.to_vec())
            }
        }
    }
}

fn pad_pkcs7(data: &mut Vec<u8>, block_size: usize) {
    let pad_len = block_size - (data.len() % block_size);
    let pad_len = if pad_len == 0 { block_size } else { pad_len };
    data.extend(std::iter::repeat((pad_len - 1) as u8).take(pad_len));
}

fn strip_pkcs7(data: &[u8], block_size: usize) -> Result<Vec<u8>> {
    if data.is_empty() || data.len() % block_size != 0 {
        return Err(Error::new(ErrorKind::BadRecordMac));
    }
    let pad_len = *data.last().unwrap() as usize + 1;
    if pad_len > data.len() {
        return Err(Error::new(ErrorKind::BadRecordMac));
    }
    Ok(data[..data.len() - pad_len].to_vec())
}

/// Constant-time comparison, required since this gates `BadRecordMac`
/// (MAC failures must not be distinguishable by timing from any other
/// decrypt failure).
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pkcs7_round_trips() {
        let mut data = b"hello world".to_vec();
        pad_pkcs7(&mut data, 16);
        assert_eq!(data.len() % 16, 0);

        let stripped = strip_pkcs7(&data, 16).unwrap();
        assert_eq!(&stripped, b"hello world");
    }

    #[test]
    fn constant_time_eq_rejects_mismatched_len() {
        assert!(!constant_time_eq(b"abc", b"ab"));
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
    }
}
