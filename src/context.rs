//! Per-peer handshake state (`HandshakeInfo`): randoms, the
//! running transcript, the negotiated suite/version, the master secret once
//! derived, and the handshake-layer message-sequence counters the engine
//! drives.
//!
//! Grounded on `pkg/crypto/src/tls/handshake_executor.rs`'s
//! `HandshakeExecutor { reader, writer, handshake_transcript }`, split here
//! into data (this module) the engine mutates versus the I/O the record
//! layer and fragment reassembler own separately — DTLS's
//! per-peer fan-out needs the data half to be independently
//! constructible per session before any I/O exists.

use bytes::Bytes;

use crate::cipher_suite::CipherSuite;
use crate::handshake::messages::{ClientHello, ServerHello};
use crate::record::ProtocolVersion;
use crate::transcript::Transcript;

/// Extension flags negotiated during the Hello exchange that later steps
/// (master-secret derivation, MAC-then-encrypt vs. encrypt-then-MAC) need to
/// remember.
#[derive(Clone, Copy, Debug, Default)]
pub struct NegotiatedExtensions {
    pub extended_master_secret: bool,
    pub encrypt_then_mac: bool,
}

/// Per-peer handshake state, created when the first Hello for a peer is
/// observed and destroyed on fatal alert or teardown.
pub struct HandshakeContext {
    pub version: ProtocolVersion,
    pub client_hello: Option<ClientHello>,
    pub server_hello: Option<ServerHello>,
    pub cipher_suite: Option<CipherSuite>,
    pub extensions: NegotiatedExtensions,
    /// The running hash over every plaintext handshake message sent/received
    /// so far, excluding `HelloVerifyRequest` and the cookieless initial
    /// `ClientHello`.
    pub transcript: Transcript,
    pub master_secret: Option<Bytes>,
    /// The peer's certificate chain, if the negotiated suite carries one.
    pub peer_certificate_chain: Option<Vec<Bytes>>,
    /// This side's PSK identity, if the negotiated suite is PSK-flavored.
    pub psk_identity: Option<Bytes>,
    /// Message-sequence counters for the handshake layer's `HandshakeHeader`:
    /// the next value this side will stamp on an outbound message, and the
    /// next one expected from the peer.
    pub next_send_message_seq: u16,
    pub next_expected_message_seq: u16,
    /// The cookie exchanged during the responder's stateless round trip;
    /// empty until a `HelloVerifyRequest` has been processed.
    pub cookie: Bytes,
}

impl HandshakeContext {
    pub fn new(initial_version: ProtocolVersion) -> Self {
        Self {
            version: initial_version,
            client_hello: None,
            server_hello: None,
            cipher_suite: None,
            extensions: NegotiatedExtensions::default(),
            transcript: Transcript::new(),
            master_secret: None,
            peer_certificate_chain: None,
            psk_identity: None,
            next_send_message_seq: 0,
            next_expected_message_seq: 0,
            cookie: Bytes::new(),
        }
    }

    /// Allocates and advances the next outbound `message_seq`.
    pub fn take_next_send_seq(&mut self) -> u16 {
        let seq = self.next_send_message_seq;
        self.next_send_message_seq += 1;
        seq
    }
}
