//! Stateless cookie mint/verify used by the responder's `HelloVerifyRequest`
//! round trip (`cookie = HMAC(server_secret, peer_address || client_random)`).
//!
//! Grounded on RFC 6347 §4.2.1's stateless-cookie recipe (the mechanism is a
//! DTLS addition with no TLS counterpart, so this is hand-rolled directly
//! over the `Hmac` façade already used by [`crate::crypto::prf`]) and on
//! `webrtc-rs-webrtc/dtls/src/flight/flight1.rs`, which confirms the
//! server-optional / cookie-carrying `ClientHello` shape this mints for.

use crate::crypto::facade::Hmac;
use crate::io::PeerAddress;

/// Cookies minted by this crate are fixed-length HMAC outputs, well under
/// the 255-byte wire maximum (`opaque cookie<0..2^8-1>`).
pub const COOKIE_LENGTH_HINT: usize = 32;

/// Mints/verifies cookies from a single server-side secret, rotated by the
/// caller at whatever cadence it likes (this crate does no rotation itself —
/// key management is out of scope).
pub struct CookieMinter<'a> {
    hmac: &'a dyn Hmac,
    server_secret: Vec<u8>,
}

impl<'a> CookieMinter<'a> {
    pub fn new(hmac: &'a dyn Hmac, server_secret: Vec<u8>) -> Self {
        Self { hmac, server_secret }
    }

    /// `HMAC(server_secret, peer_address || client_random)`.
    pub fn mint<A: PeerAddress>(&self, peer: &A, client_random: &[u8; 32]) -> Vec<u8> {
        let mut data = peer.cookie_key_material();
        data.extend_from_slice(client_random);
        self.hmac.finish(&self.server_secret, &data)
    }

    /// Recomputes the expected cookie and compares it against `candidate` in
    /// constant time, the same discipline `Finished` verification requires
    /// (a timing leak here would let an attacker probe for valid cookies
    /// without ever proving address ownership).
    pub fn verify<A: PeerAddress>(
        &self,
        peer: &A,
        client_random: &[u8; 32],
        candidate: &[u8],
    ) -> bool {
        let expected = self.mint(peer, client_random);
        constant_time_eq(&expected, candidate)
    }
}

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
    use std::sync::Arc;

    use super::*;
    use crate::crypto::facade::{HasherFactory, Sha256HasherFactory};

    struct TestHmac(HasherFactory);

    impl Hmac for TestHmac {
        fn hasher_factory(&self) -> &HasherFactory {
            &self.0
        }

        fn finish(&self, key: &[u8], data: &[u8]) -> Vec<u8> {
            let mut hasher = self.0.create();
            hasher.update(key);
            hasher.update(data);
            hasher.finish()
        }
    }

    fn hmac() -> TestHmac {
        TestHmac(HasherFactory::new(Arc::new(Sha256HasherFactory)))
    }

    #[test]
    fn mints_deterministic_cookie() {
        let hmac = hmac();
        let minter = CookieMinter::new(&hmac, b"secret".to_vec());
        let random = [7u8; 32];

        let cookie_a = minter.mint(&"127.0.0.1:1234".to_string(), &random);
        let cookie_b = minter.mint(&"127.0.0.1:1234".to_string(), &random);
        assert_eq!(cookie_a, cookie_b);
    }

    #[test]
    fn verify_rejects_wrong_peer() {
        let hmac = hmac();
        let minter = CookieMinter::new(&hmac, b"secret".to_vec());
        let random = [7u8; 32];

        let cookie = minter.mint(&"127.0.0.1:1234".to_string(), &random);
        assert!(minter.verify(&"127.0.0.1:1234".to_string(), &random, &cookie));
        assert!(!minter.verify(&"127.0.0.1:9999".to_string(), &random, &cookie));
    }

    #[test]
    fn verify_rejects_tampered_cookie() {
        let hmac = hmac();
        let minter = CookieMinter::new(&hmac, b"secret".to_vec());
        let random = [7u8; 32];

        let mut cookie = minter.mint(&"peer".to_string(), &random);
        cookie[0] ^= 0xff;
        assert!(!minter.verify(&"peer".to_string(), &random, &cookie));
    }
}
