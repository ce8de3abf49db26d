//! Handshake message transcript, used for `Finished` verify-data and
//! (when requested) the extended master secret.
//!
//! Grounded directly on `pkg/crypto/src/tls/transcript.rs`'s
//! `Transcript { messages: Vec<Bytes> }`.

use bytes::Bytes;

use crate::crypto::facade::HasherFactory;

#[derive(Default)]
pub struct Transcript {
    messages: Vec<Bytes>,
}

impl Transcript {
    pub fn new() -> Self {
        Self { messages: vec![] }
    }

    /// Appends one handshake message body, in the wire encoding used for its
    /// `HandshakeHeader` plus payload, to the running transcript. DTLS
    /// retransmissions of a message already seen at the same `message_seq`
    /// must not be pushed again.
    pub fn push(&mut self, message: Bytes) {
        self.messages.push(message);
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn hash(&self, hasher_factory: &HasherFactory) -> Vec<u8> {
        let mut hasher = hasher_factory.create();
        for message in &self.messages {
            hasher.update(message);
        }
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::crypto::facade::{HasherFactory, Sha256HasherFactory};

    #[test]
    fn hashes_concatenated_messages() {
        let mut transcript = Transcript::new();
        transcript.push(Bytes::from_static(b"hello "));
        transcript.push(Bytes::from_static(b"world"));

        let factory = HasherFactory::new(Arc::new(Sha256HasherFactory));
        let mut direct = factory.create();
        direct.update(b"hello world");

        assert_eq!(transcript.hash(&factory), direct.finish());
    }
}
