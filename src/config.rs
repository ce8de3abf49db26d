//! The collaborators this crate consumes at its interface rather than
//! implementing itself: certificate/key material, the PSK store, and the
//! crypto primitives behind the façade. Also the immutable per-endpoint
//! configuration that replaces the source's global mutable max-packet-size.
//!
//! Grounded on `pkg/crypto/src/tls/options.rs`'s `ClientOptions`/
//! `ServerOptions` (plain structs built once, passed by reference — no
//! global mutable config), generalized with the PSK table, cookie secret
//! and MTU hint this crate's endpoint surface needs.

use std::sync::Arc;

use bytes::Bytes;

use crate::cipher_suite::CipherSuite;
use crate::crypto::facade::{Hmac, KeyExchange, Signer};
use crate::random::SecureRandom;

/// Default MTU hints per address family: outbound records never
/// exceed this. Immutable per endpoint, set at construction time — never a
/// process-wide global.
pub const DEFAULT_MTU_IPV4: usize = 508;
pub const DEFAULT_MTU_IPV6: usize = 1212;

/// `lookup(identity_hint) -> key | none`, `pick_any() -> (identity, key)`,
/// consumed by the client to resolve a server-advertised PSK identity
/// hint or to pick a default identity when none is advertised.
pub trait PskStore: Send + Sync {
    fn lookup(&self, identity_hint: &[u8]) -> Option<Bytes>;
    fn pick_any(&self) -> Option<(Bytes, Bytes)>;
}

/// `validate_psk(identity) -> key | reject`, consumed by the server to
/// accept or refuse a client's advertised PSK identity.
pub trait PskValidator: Send + Sync {
    fn validate_psk(&self, identity: &[u8]) -> Option<Bytes>;
}

/// A single fixed identity/key pair, useful for the common single-PSK
/// deployment (`"Client_identity"` / fixed key).
pub struct StaticPsk {
    pub identity: Bytes,
    pub key: Bytes,
}

impl PskStore for StaticPsk {
    fn lookup(&self, identity_hint: &[u8]) -> Option<Bytes> {
        if identity_hint.is_empty() || identity_hint == &self.identity[..] {
            Some(self.key.clone())
        } else {
            None
        }
    }

    fn pick_any(&self) -> Option<(Bytes, Bytes)> {
        Some((self.identity.clone(), self.key.clone()))
    }
}

impl PskValidator for StaticPsk {
    fn validate_psk(&self, identity: &[u8]) -> Option<Bytes> {
        if identity == &self.identity[..] {
            Some(self.key.clone())
        } else {
            None
        }
    }
}

/// A parsed certificate chain plus a handle to its private key (PEM/X.509
/// parsing is out of scope — the core consumes the already-parsed result).
pub struct CertificateAndKey {
    /// Leaf-first ordered DER certificates.
    pub chain: Vec<Bytes>,
    pub private_key: Arc<dyn Signer>,
}

/// The crypto primitives a suite needs, supplied once per endpoint and
/// looked up by negotiated [`CipherSuite`] (consumed through
/// [`crate::cipher_suite::SuiteMaterial`]).
pub trait CryptoProvider: Send + Sync {
    fn suite_material(
        &self,
        suite: CipherSuite,
    ) -> crate::error::Result<crate::cipher_suite::SuiteMaterial>;

    /// The HMAC used both for PRF expansion and the running transcript
    /// hash: SHA-256-backed for every DTLS 1.2 suite named above.
    fn prf_hmac_sha256(&self) -> Arc<dyn Hmac>;

    /// Legacy DTLS 1.0 PRF halves (the legacy MD5/SHA-1 split PRF),
    /// used only when a peer negotiates DTLS 1.0.
    fn prf_hmac_md5(&self) -> Arc<dyn Hmac>;
    fn prf_hmac_sha1(&self) -> Arc<dyn Hmac>;

    /// A fresh ephemeral ECDHE keypair for one handshake.
    fn new_key_exchange(&self) -> Box<dyn KeyExchange>;

    /// Encrypts a 48-byte RSA premaster under the peer's RSA public key.
    /// Returns `None` when no RSA collaborator is configured.
    fn rsa_encrypt_pre_master(
        &self,
        server_public_key_der: &[u8],
        pre_master: &[u8],
    ) -> crate::error::Result<Vec<u8>>;

    /// Verifies an ECDHE-ECDSA `ServerKeyExchange`'s trailing signature
    /// against the leaf certificate's embedded public key. X.509 parsing
    /// stays out of scope by folding "extract the public key, then
    /// verify" into one call rather than exposing a parsed key type.
    fn verify_peer_signature(
        &self,
        leaf_certificate_der: &[u8],
        message: &[u8],
        hash_algorithm: u8,
        signature_algorithm: u8,
        signature: &[u8],
    ) -> crate::error::Result<bool>;
}

/// Configuration shared by client and server endpoints (replaces the
/// source's global mutable max-packet-size with per-endpoint immutable
/// state set at construction).
pub struct EndpointConfig {
    pub cipher_suites: Vec<CipherSuite>,
    pub mtu: usize,
    pub random: Arc<dyn SecureRandom>,
    pub crypto: Arc<dyn CryptoProvider>,
}

/// Client-only configuration: the identity this side presents and how it
/// resolves the collaborators named above.
pub struct ClientConfig {
    pub endpoint: EndpointConfig,
    pub psk: Option<Arc<dyn PskStore>>,
    pub certificate: Option<CertificateAndKey>,
}

/// Server-only configuration: adds the cookie secret and the PSK
/// validation callback.
pub struct ServerConfig {
    pub endpoint: EndpointConfig,
    pub psk: Option<Arc<dyn PskValidator>>,
    pub certificate: Option<CertificateAndKey>,
    /// Rotated by the caller at whatever cadence it likes; this crate never
    /// rotates it itself (key management is out of scope).
    pub cookie_secret: Vec<u8>,
}
