//! Narrow crypto façade: the primitives this crate consumes but never
//! implements (AES, HMAC, the SHA family, EC point arithmetic, RSA and
//! the CSPRNG are all explicitly out of scope, supplied by the caller).
//!
//! Grounded on `pkg/crypto/src/tls/cipher_suite.rs`'s `HasherFactory` /
//! `Box<dyn AuthEncAD>` pattern and `pkg/crypto/src/tls/cipher_tls12.rs`'s
//! `NonceGenerator` trait. The AEAD trait here is a DTLS-flavored rename of
//! `AuthEncAD` (its own home is `pkg/crypto/src/aead.rs`, not part of the
//! retrieved `tls` module, so it is redeclared rather than copied).

use std::sync::Arc;

use crate::error::{Error, ErrorKind, Result};

/// A running hash computation.
pub trait Hasher: Send {
    fn update(&mut self, data: &[u8]);
    fn finish(self: Box<Self>) -> Vec<u8>;
}

/// Produces fresh [`Hasher`] instances and describes the hash's fixed sizes,
/// mirroring a `HasherFactory` shape.
#[derive(Clone)]
pub struct HasherFactory {
    inner: Arc<dyn HasherFactoryImpl>,
}

pub trait HasherFactoryImpl: Send + Sync {
    fn create(&self) -> Box<dyn Hasher>;
    fn hash_len(&self) -> usize;
    fn block_size(&self) -> usize;
    fn name(&self) -> &'static str;
}

impl HasherFactory {
    pub fn new(inner: Arc<dyn HasherFactoryImpl>) -> Self {
        Self { inner }
    }

    pub fn create(&self) -> Box<dyn Hasher> {
        self.inner.create()
    }

    pub fn hash_len(&self) -> usize {
        self.inner.hash_len()
    }

    pub fn block_size(&self) -> usize {
        self.inner.block_size()
    }

    pub fn name(&self) -> &'static str {
        self.inner.name()
    }
}

/// HMAC over whatever hash a [`HasherFactory`] produces.
pub trait Hmac: Send + Sync {
    fn hasher_factory(&self) -> &HasherFactory;
    fn finish(&self, key: &[u8], data: &[u8]) -> Vec<u8>;
}

/// An authenticated encryption cipher: `AEAD(AES-CCM-8)` under the
/// mandatory suite, or a test double for others. Mirrors `AuthEncAD`.
pub trait Aead: Send + Sync {
    /// Bytes of ciphertext expansion (the authentication tag) this AEAD
    /// adds beyond the plaintext length.
    fn tag_size(&self) -> usize;
    fn encrypt(&self, key: &[u8], nonce: &[u8], plaintext: &[u8], aad: &[u8]) -> Vec<u8>;
    fn decrypt(&self, key: &[u8], nonce: &[u8], ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>>;
}

/// A block cipher run in CBC mode, used by the MAC-then-encrypt suites.
/// Unlike `Aead` this has no built-in authentication: the record
/// layer computes and checks the MAC itself.
pub trait CbcCipher: Send + Sync {
    fn block_size(&self) -> usize;
    fn key_len(&self) -> usize;
    fn encrypt(&self, key: &[u8], iv: &[u8], plaintext: &[u8]) -> Vec<u8>;
    fn decrypt(&self, key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>>;
}

/// Produces the nonce an AEAD cipher uses for a given record, mirroring a
/// `NonceGenerator` shape — DTLS fixes the "explicit" half to the
/// 8-byte `(epoch, sequence_number)` pair already present in the record
/// header, so no extra bytes travel on the wire the way TLS 1.2's
/// GCM records carry one.
pub trait NonceGenerator: Send + Sync {
    fn implicit_size(&self) -> usize;
    fn generate(&self, implicit_iv: &[u8], epoch: u16, sequence_number: u64) -> Vec<u8>;
}

/// AEAD nonce = 4-byte salt (implicit IV) concatenated with the 8-byte
/// `(epoch << 48 | sequence_number)` value, per RFC 6347's CCM
/// construction (reused here for any AEAD suite this crate is given).
pub struct AeadNonceGenerator;

impl NonceGenerator for AeadNonceGenerator {
    fn implicit_size(&self) -> usize {
        4
    }

    fn generate(&self, implicit_iv: &[u8], epoch: u16, sequence_number: u64) -> Vec<u8> {
        let mut out = implicit_iv.to_vec();
        out.extend_from_slice(&((epoch as u64) << 48 | sequence_number).to_be_bytes());
        out
    }
}

/// Which key family a [`Signer`] wraps, so call sites can pick a
/// `SignatureAndHashAlgorithm` compatible with the actual key instead of
/// assuming ECDSA.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignatureKeyType {
    Rsa,
    Ecdsa,
}

/// Verifies/produces a `CertificateVerify`/`ServerKeyExchange` signature.
/// Out of scope: X.509 parsing and EC point math themselves — this trait
/// only wraps "sign"/"verify" over raw bytes.
pub trait Signer: Send + Sync {
    /// RSA or ECDSA — the caller uses this to select `hash_algorithm`/
    /// `signature_algorithm` before calling `sign`/`verify`.
    fn key_type(&self) -> SignatureKeyType;

    /// Signs `message` under the given TLS `SignatureAndHashAlgorithm` id
    /// pair (`hash_algorithm`, `signature_algorithm`). For DTLS 1.0/1.1,
    /// where no such pair travels on the wire, the caller still passes the
    /// pair implied by the cipher suite (SHA-1 with this key's algorithm)
    /// so the signer knows which digest to run.
    fn sign(&self, hash_algorithm: u8, signature_algorithm: u8, message: &[u8]) -> Result<Vec<u8>>;
    fn verify(
        &self,
        hash_algorithm: u8,
        signature_algorithm: u8,
        message: &[u8],
        signature: &[u8],
    ) -> Result<bool>;

    /// RSA private-key decryption, needed only by the responder side of
    /// `TLS_RSA_*` key exchange (`ClientKeyExchange` handling).
    /// ECDSA signers never implement this since that key-exchange kind
    /// never selects them.
    fn decrypt(&self, _ciphertext: &[u8]) -> Result<Vec<u8>> {
        Err(Error::new(ErrorKind::InternalError))
    }
}

/// An ECDHE key-exchange participant: generates an ephemeral key pair and
/// computes the shared secret from a peer's public point. EC point
/// arithmetic is out of scope; implementations delegate to whatever
/// curve library the caller wires in.
pub trait KeyExchange: Send + Sync {
    fn public_key(&self) -> Vec<u8>;
    fn compute_shared_secret(&self, peer_public_key: &[u8]) -> Result<Vec<u8>>;
}

struct Sha256Hasher {
    state: Vec<u8>,
}

/// A minimal, dependency-free stand-in used only by this crate's own tests
/// to exercise [`Transcript`]/[`Hmac`] plumbing without requiring a real
/// SHA-256 implementation to be wired in. Production callers supply a real
/// `HasherFactory` backed by whatever hash crate they already depend on.
pub struct Sha256HasherFactory;

impl Hasher for Sha256Hasher {
    fn update(&mut self, data: &[u8]) {
        self.state.extend_from_slice(data);
    }

    fn finish(self: Box<Self>) -> Vec<u8> {
        // Deliberately not a real hash: a length-prefixed echo is enough to
        // validate that `Transcript`/`Hmac` concatenate and call through
        // correctly without this crate depending on a hash implementation.
        let mut out = (self.state.len() as u64).to_be_bytes().to_vec();
        out.extend_from_slice(&self.state);
        out
    }
}

impl HasherFactoryImpl for Sha256HasherFactory {
    fn create(&self) -> Box<dyn Hasher> {
        Box::new(Sha256Hasher { state: vec![] })
    }

    fn hash_len(&self) -> usize {
        32
    }

    fn block_size(&self) -> usize {
        64
    }

    fn name(&self) -> &'static str {
        "test-sha256-stub"
    }
}
