//! Master secret / key block derivation.
//!
//! Grounded on `pkg/crypto/src/tls/key_schedule_tls12.rs`'s `prf`/`p_hash`/
//! `key_block`/`master_secret`, generalized two ways: the HMAC primitive is
//! taken as a `&dyn Hmac` façade argument rather than a concrete
//! `HMAC::new(hasher_factory, secret)` construction, and a legacy DTLS 1.0
//! PRF (`P_MD5 XOR P_SHA-1` over two independent label halves) is added
//! alongside the DTLS 1.2 single-hash PRF, since DTLS 1.0 is a supported
//! negotiated version here.

use bytes::Bytes;

use crate::crypto::facade::Hmac;
use crate::handshake::messages::{ClientHello, ServerHello};

/// `P_hash(secret, seed)` — the repeated-HMAC expansion both PRF variants
/// are built from.
pub fn p_hash(hmac: &dyn Hmac, secret: &[u8], seed: &[u8], output_size: usize) -> Vec<u8> {
    let mut a = seed.to_vec();
    let mut out = vec![];
    while out.len() < output_size {
        a = hmac.finish(secret, &a);
        let mut data = a.clone();
        data.extend_from_slice(seed);
        out.extend_from_slice(&hmac.finish(secret, &data));
    }
    out.truncate(output_size);
    out
}

/// The DTLS 1.2 PRF: `PRF(secret, label, seed) = P_<hash>(secret, label ++ seed)`.
pub fn prf_tls12(hmac: &dyn Hmac, secret: &[u8], label: &[u8], seed: &[u8], output_size: usize) -> Vec<u8> {
    let mut data = label.to_vec();
    data.extend_from_slice(seed);
    p_hash(hmac, secret, &data, output_size)
}

/// The legacy DTLS 1.0 PRF (RFC 2246): the secret is split into two halves
/// (overlapping by one byte if the length is odd), each half keys an
/// independent `P_hash` (MD5, then SHA-1) over the same label+seed, and the
/// two outputs are XORed together.
pub fn prf_dtls10(
    md5: &dyn Hmac,
    sha1: &dyn Hmac,
    secret: &[u8],
    label: &[u8],
    seed: &[u8],
    output_size: usize,
) -> Vec<u8> {
    let half_len = (secret.len() + 1) / 2;
    let s1 = &secret[..half_len];
    let s2 = &secret[secret.len() - half_len..];
    let mut data = label.to_vec();
    data.extend_from_slice(seed);
    let md5_out = p_hash(md5, s1, &data, output_size);
    let sha1_out = p_hash(sha1, s2, &data, output_size);
    md5_out.iter().zip(sha1_out.iter()).map(|(a, b)| a ^ b).collect()
}

/// One PRF invocation, dispatching to the legacy split form for DTLS 1.0 or
/// the single-hash form for DTLS 1.2.
pub enum Prf<'a> {
    Dtls12 { hmac: &'a dyn Hmac },
    Dtls10 { md5: &'a dyn Hmac, sha1: &'a dyn Hmac },
}

impl<'a> Prf<'a> {
    pub fn apply(&self, secret: &[u8], label: &[u8], seed: &[u8], output_size: usize) -> Vec<u8> {
        match self {
            Prf::Dtls12 { hmac } => prf_tls12(*hmac, secret, label, seed, output_size),
            Prf::Dtls10 { md5, sha1 } => prf_dtls10(*md5, *sha1, secret, label, seed, output_size),
        }
    }
}

pub const VERIFY_DATA_LENGTH: usize = 12;

/// `master_secret = PRF(pre_master_secret, "master secret", client_random ++ server_random)[0..47]`.
pub fn master_secret(
    prf: &Prf,
    pre_master_secret: &[u8],
    client_hello: &ClientHello,
    server_hello: &ServerHello,
) -> Vec<u8> {
    let mut seed = client_hello.random.to_vec();
    seed.extend_from_slice(&server_hello.random);
    prf.apply(pre_master_secret, b"master secret", &seed, 48)
}

#[derive(Debug)]
pub struct KeyBlock {
    pub client_write_mac_key: Bytes,
    pub server_write_mac_key: Bytes,
    pub client_write_key: Bytes,
    pub server_write_key: Bytes,
    pub client_write_iv: Bytes,
    pub server_write_iv: Bytes,
}

/// `key_block = PRF(master_secret, "key expansion", server_random ++ client_random)` —
/// note the reversed random order relative to `master_secret`, per RFC 5246.
pub fn key_block(
    prf: &Prf,
    master_secret: &[u8],
    client_hello: &ClientHello,
    server_hello: &ServerHello,
    mac_key_length: usize,
    enc_key_length: usize,
    fixed_iv_length: usize,
) -> KeyBlock {
    let block_size = 2 * (mac_key_length + enc_key_length + fixed_iv_length);
    let mut seed = server_hello.random.to_vec();
    seed.extend_from_slice(&client_hello.random);
    let mut block = Bytes::from(prf.apply(master_secret, b"key expansion", &seed, block_size));

    let client_write_mac_key = block.split_to(mac_key_length);
    let server_write_mac_key = block.split_to(mac_key_length);
    let client_write_key = block.split_to(enc_key_length);
    let server_write_key = block.split_to(enc_key_length);
    let client_write_iv = block.split_to(fixed_iv_length);
    let server_write_iv = block.split_to(fixed_iv_length);

    KeyBlock {
        client_write_mac_key,
        server_write_mac_key,
        client_write_key,
        server_write_key,
        client_write_iv,
        server_write_iv,
    }
}

/// `verify_data = PRF(master_secret, label, Hash(handshake_messages))[0..11]`.
pub fn verify_data(prf: &Prf, master_secret: &[u8], label: &'static [u8], transcript_hash: &[u8]) -> Vec<u8> {
    prf.apply(master_secret, label, transcript_hash, VERIFY_DATA_LENGTH)
}

pub const CLIENT_FINISHED_LABEL: &[u8] = b"client finished";
pub const SERVER_FINISHED_LABEL: &[u8] = b"server finished";

/// Extended master secret seed: `PRF(pre_master_secret, "extended master secret", session_hash)[0..47]`,
/// used instead of `master_secret` when both peers negotiated the extension.
pub fn extended_master_secret(prf: &Prf, pre_master_secret: &[u8], session_hash: &[u8]) -> Vec<u8> {
    prf.apply(pre_master_secret, b"extended master secret", session_hash, 48)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubHmac {
        salt: u8,
        factory: crate::crypto::facade::HasherFactory,
    }

    impl StubHmac {
        fn new(salt: u8) -> Self {
            Self {
                salt,
                factory: crate::crypto::facade::HasherFactory::new(std::sync::Arc::new(
                    crate::crypto::facade::Sha256HasherFactory,
                )),
            }
        }
    }

    impl Hmac for StubHmac {
        fn finish(&self, _secret: &[u8], data: &[u8]) -> Vec<u8> {
            vec![self.salt ^ data.iter().fold(0u8, |acc, b| acc.wrapping_add(*b)); 4]
        }

        fn hasher_factory(&self) -> &crate::crypto::facade::HasherFactory {
            &self.factory
        }
    }

    #[test]
    fn p_hash_expands_to_requested_length() {
        let hmac = StubHmac::new(0);
        let out = p_hash(&hmac, b"secret", b"seed", 17);
        assert_eq!(out.len(), 17);
    }

    #[test]
    fn dtls10_prf_xors_two_independent_hashes() {
        let md5 = StubHmac::new(1);
        let sha1 = StubHmac::new(2);
        let out = prf_dtls10(&md5, &sha1, b"0123456789", b"label", b"seed", 8);
        assert_eq!(out.len(), 8);
    }
}
