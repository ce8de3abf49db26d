//! The responder side of the handshake engine.
//!
//! Grounded on `pkg/crypto/src/tls/server.rs`'s `ServerHandshakeExecutor`,
//! generalized the same way [`super::client`] generalizes the initiator:
//! from a blocking `run` loop to an `advance` driven one message at a
//! time. Unlike a stream-oriented TLS server, entry to this state machine is
//! a dedicated [`ServerHandshake::receive_client_hello`] call rather than the
//! first step of `advance` itself, since the stateless `HelloVerifyRequest`
//! cookie round trip happens one layer up in [`crate::session`]
//! *before* a `Session` — and therefore this `ServerHandshake` — exists at
//! all. By the time one is constructed, the `ClientHello` it is about to
//! receive already carries a cookie this side has verified.

use std::sync::Arc;

use bytes::Bytes;

use crate::alert::{Alert, AlertDescription};
use crate::cipher_suite::{CipherSuite, KeyExchangeKind};
use crate::config::ServerConfig;
use crate::context::HandshakeContext;
use crate::crypto::facade::{HasherFactory, KeyExchange};
use crate::crypto::premaster::psk_pre_master;
use crate::crypto::prf::{
    extended_master_secret, key_block, master_secret, verify_data, Prf, CLIENT_FINISHED_LABEL,
    SERVER_FINISHED_LABEL,
};
use crate::engine::pump::{HandshakePump, Ingested};
use crate::engine::HandshakeStep;
use crate::error::{Error, ErrorKind, Result};
use crate::handshake::extensions::{Extension, NamedCurve, SignatureAndHashAlgorithm};
use crate::handshake::header::HandshakeHeader;
use crate::handshake::messages::{
    Certificate, ClientHello, ClientKeyExchange, Finished, HandshakeBody, ServerHello,
    ServerKeyExchange,
};
use crate::record::{ProtocolVersion, DTLS_1_0, DTLS_1_2};
use crate::wire::{write_varlen, U16_LIMIT, U8_LIMIT};

enum Phase {
    /// No `ClientHello` processed yet. Entered only via
    /// [`ServerHandshake::receive_client_hello`], never via `advance`.
    AwaitClientHello,
    AwaitClientKeyExchange,
    AwaitChangeCipherSpec,
    AwaitFinished,
    Established,
}

/// Drives one server-side handshake to completion.
pub struct ServerHandshake {
    config: Arc<ServerConfig>,
    phase: Phase,
    /// This side's ephemeral ECDH keypair, generated once while building the
    /// `ServerKeyExchange` and reused when the matching `ClientKeyExchange`
    /// arrives — regenerating it would desynchronize the two, the same
    /// invariant [`super::client::ClientHandshake`] observes.
    key_exchange: Option<Box<dyn KeyExchange>>,
}

impl ServerHandshake {
    pub fn new(config: Arc<ServerConfig>) -> Self {
        Self { config, phase: Phase::AwaitClientHello, key_exchange: None }
    }

    /// Processes the cookie-verified `ClientHello` that brought this session
    /// into being: negotiates version/suite/extensions and emits the full
    /// `ServerHello` .. `ServerHelloDone` flight.
    pub async fn receive_client_hello(
        &mut self,
        ctx: &mut HandshakeContext,
        pump: &mut HandshakePump,
        header: HandshakeHeader,
        body: Bytes,
    ) -> Result<HandshakeStep> {
        if !matches!(self.phase, Phase::AwaitClientHello) {
            return Ok(self.unexpected(ctx, pump));
        }

        let client_hello = ClientHello::parse(body.clone())?;
        // The cookie-bearing ClientHello participates in the transcript —
        // only the cookieless first attempt and the `HelloVerifyRequest`
        // itself are excluded, and neither ever reaches this handshake
        // object.
        HandshakePump::note_received(ctx, &header, &body);

        let suite = self.negotiate_suite(&client_hello)?;
        ctx.version = if client_hello.client_version == DTLS_1_0 { DTLS_1_0 } else { DTLS_1_2 };
        ctx.cipher_suite = Some(suite);

        let offers_ems =
            client_hello.extensions.iter().any(|e| matches!(e, Extension::ExtendedMasterSecret));
        let offers_etm =
            client_hello.extensions.iter().any(|e| matches!(e, Extension::EncryptThenMac));
        ctx.extensions.extended_master_secret = offers_ems;
        ctx.extensions.encrypt_then_mac = offers_etm && !suite.is_aead();

        let curve = self.negotiate_curve(&client_hello);
        ctx.client_hello = Some(client_hello);

        let random = crate::random::random_struct(self.config.endpoint.random.as_ref()).await?;
        let mut extensions = vec![];
        if ctx.extensions.extended_master_secret {
            extensions.push(Extension::ExtendedMasterSecret);
        }
        if ctx.extensions.encrypt_then_mac {
            extensions.push(Extension::EncryptThenMac);
        }

        let server_hello = ServerHello {
            server_version: ctx.version,
            random,
            session_id: Bytes::new(),
            cipher_suite: suite.to_u16(),
            compression_method: 0,
            extensions,
        };

        let mut outbound = vec![];
        let sh_body = HandshakeBody::ServerHello(server_hello.clone());
        let (sh_header, sh_encoded, sh_records) =
            pump.send_handshake(ctx, ctx.version, &sh_body, self.config.endpoint.mtu);
        HandshakePump::note_sent(ctx, &sh_header, &sh_encoded);
        outbound.extend(sh_records);
        ctx.server_hello = Some(server_hello);

        if matches!(suite.key_exchange_kind(), KeyExchangeKind::EcdheEcdsa | KeyExchangeKind::Rsa) {
            let cert = self
                .config
                .certificate
                .as_ref()
                .ok_or_else(|| Error::new(ErrorKind::HandshakeFailure))?;
            let body = HandshakeBody::Certificate(Certificate { certificate_list: cert.chain.clone() });
            let (h, encoded, records) =
                pump.send_handshake(ctx, ctx.version, &body, self.config.endpoint.mtu);
            HandshakePump::note_sent(ctx, &h, &encoded);
            outbound.extend(records);
        }

        if suite.key_exchange_kind() != KeyExchangeKind::Rsa {
            let ske = self.build_server_key_exchange(ctx, suite, curve)?;
            let body = HandshakeBody::ServerKeyExchange(ske);
            let (h, encoded, records) =
                pump.send_handshake(ctx, ctx.version, &body, self.config.endpoint.mtu);
            HandshakePump::note_sent(ctx, &h, &encoded);
            outbound.extend(records);
        }

        let done_body = HandshakeBody::ServerHelloDone;
        let (h, encoded, records) =
            pump.send_handshake(ctx, ctx.version, &done_body, self.config.endpoint.mtu);
        HandshakePump::note_sent(ctx, &h, &encoded);
        outbound.extend(records);

        self.phase = Phase::AwaitClientKeyExchange;
        Ok(HandshakeStep::just(outbound))
    }

    /// Advances the state machine by one reassembled/decrypted event.
    pub async fn advance(
        &mut self,
        ctx: &mut HandshakeContext,
        pump: &mut HandshakePump,
        event: Ingested,
    ) -> Result<HandshakeStep> {
        match event {
            Ingested::Nothing | Ingested::FutureEpoch => Ok(HandshakeStep::default()),
            Ingested::ApplicationData(_) => Ok(self.unexpected(ctx, pump)),
            Ingested::Alert(alert) => Ok(HandshakeStep::fatal(vec![], alert)),
            Ingested::ChangeCipherSpec => Ok(self.on_change_cipher_spec()),
            Ingested::Handshake { header, body } => self.on_handshake(ctx, pump, header, body).await,
        }
    }

    fn on_change_cipher_spec(&mut self) -> HandshakeStep {
        match self.phase {
            Phase::AwaitChangeCipherSpec => {
                self.phase = Phase::AwaitFinished;
                HandshakeStep::default()
            }
            _ => HandshakeStep::fatal(vec![], Alert::fatal(AlertDescription::UnexpectedMessage)),
        }
    }

    async fn on_handshake(
        &mut self,
        ctx: &mut HandshakeContext,
        pump: &mut HandshakePump,
        header: HandshakeHeader,
        body: Bytes,
    ) -> Result<HandshakeStep> {
        let parsed = HandshakeBody::parse(header.msg_type, body.clone(), ctx.version)?;
        match (&self.phase, &parsed) {
            (Phase::AwaitClientKeyExchange, HandshakeBody::ClientKeyExchange(_)) => {
                HandshakePump::note_received(ctx, &header, &body);
                let cke = match parsed {
                    HandshakeBody::ClientKeyExchange(c) => c,
                    _ => unreachable!(),
                };
                self.on_client_key_exchange(ctx, pump, cke)
            }
            (Phase::AwaitFinished, HandshakeBody::Finished(_)) => {
                let verify_data_received = match parsed {
                    HandshakeBody::Finished(f) => f.verify_data,
                    _ => unreachable!(),
                };
                self.on_client_finished(ctx, pump, header, body, verify_data_received)
            }
            _ => Ok(self.unexpected(ctx, pump)),
        }
    }

    fn negotiate_suite(&self, client_hello: &ClientHello) -> Result<CipherSuite> {
        self.config
            .endpoint
            .cipher_suites
            .iter()
            .copied()
            .find(|s| client_hello.cipher_suites.contains(&s.to_u16()))
            .ok_or_else(|| Error::new(ErrorKind::HandshakeFailure))
    }

    fn negotiate_curve(&self, client_hello: &ClientHello) -> NamedCurve {
        let offered: Vec<NamedCurve> = client_hello
            .extensions
            .iter()
            .find_map(|e| match e {
                Extension::EllipticCurves(curves) => Some(curves.clone()),
                _ => None,
            })
            .unwrap_or_default();
        NamedCurve::supported()
            .into_iter()
            .find(|c| offered.contains(c))
            .unwrap_or(NamedCurve::Secp256r1)
    }

    /// Builds the `ServerKeyExchange` for every kind but `Rsa` (which carries
    /// none), generating this side's ephemeral ECDH keypair for the ECDHE
    /// kinds and signing over the RFC 4492 message for `EcdheEcdsa` — the
    /// mirror image of
    /// [`super::client::ClientHandshake::verify_server_signature`].
    fn build_server_key_exchange(
        &mut self,
        ctx: &HandshakeContext,
        suite: CipherSuite,
        curve: NamedCurve,
    ) -> Result<ServerKeyExchange> {
        let mut raw = vec![];
        match suite.key_exchange_kind() {
            KeyExchangeKind::Psk => {
                write_varlen(&mut raw, 0, U16_LIMIT, |_| {});
            }
            KeyExchangeKind::EcdhePsk => {
                write_varlen(&mut raw, 0, U16_LIMIT, |_| {});
                self.key_exchange = Some(self.config.endpoint.crypto.new_key_exchange());
                let public_key = self.key_exchange.as_ref().unwrap().public_key();
                write_ecdhe_params(&mut raw, curve.to_u16(), &public_key);
            }
            KeyExchangeKind::EcdheEcdsa => {
                self.key_exchange = Some(self.config.endpoint.crypto.new_key_exchange());
                let public_key = self.key_exchange.as_ref().unwrap().public_key();
                write_ecdhe_params(&mut raw, curve.to_u16(), &public_key);

                let cert = self
                    .config
                    .certificate
                    .as_ref()
                    .ok_or_else(|| Error::new(ErrorKind::HandshakeFailure))?;
                let client_hello =
                    ctx.client_hello.as_ref().ok_or_else(|| Error::new(ErrorKind::InternalError))?;
                let server_hello =
                    ctx.server_hello.as_ref().ok_or_else(|| Error::new(ErrorKind::InternalError))?;

                let mut message = vec![];
                message.extend_from_slice(&client_hello.random);
                message.extend_from_slice(&server_hello.random);
                message.push(3);
                message.extend_from_slice(&curve.to_u16().to_be_bytes());
                write_varlen(&mut message, 1, U8_LIMIT, |out| out.extend_from_slice(&public_key));

                let scheme = SignatureAndHashAlgorithm::for_key(ctx.version, cert.private_key.key_type());
                let signature = cert.private_key.sign(scheme.hash, scheme.signature, &message)?;
                if ctx.version != DTLS_1_0 {
                    raw.push(scheme.hash);
                    raw.push(scheme.signature);
                }
                write_varlen(&mut raw, 0, U16_LIMIT, |out| out.extend_from_slice(&signature));
            }
            KeyExchangeKind::Rsa => unreachable!("RSA sends no ServerKeyExchange"),
        }
        Ok(ServerKeyExchange { raw: raw.into() })
    }

    /// Mirror of the initiator's `on_server_hello_done`: derives the
    /// pre-master from the client's key material, stages both directions'
    /// ciphers (ready to activate once the respective `ChangeCipherSpec`
    /// arrives/is sent), and waits for the client's own `ChangeCipherSpec`.
    fn on_client_key_exchange(
        &mut self,
        ctx: &mut HandshakeContext,
        pump: &mut HandshakePump,
        cke: ClientKeyExchange,
    ) -> Result<HandshakeStep> {
        let suite = ctx.cipher_suite.ok_or_else(|| Error::new(ErrorKind::InternalError))?;
        let pre_master = match suite.key_exchange_kind() {
            KeyExchangeKind::Psk => {
                let identity = cke.psk_identity()?;
                let key = self.resolve_client_psk(&identity)?;
                ctx.psk_identity = Some(identity);
                psk_pre_master(&key, None)
            }
            KeyExchangeKind::EcdhePsk => {
                let identity = cke.psk_identity()?;
                let key = self.resolve_client_psk(&identity)?;
                ctx.psk_identity = Some(identity);
                let client_public = cke.ecdhe_public_key()?;
                let kex =
                    self.key_exchange.as_ref().ok_or_else(|| Error::new(ErrorKind::InternalError))?;
                let shared = kex.compute_shared_secret(&client_public)?;
                psk_pre_master(&key, Some(&shared))
            }
            KeyExchangeKind::EcdheEcdsa => {
                let client_public = cke.ecdhe_public_key()?;
                let kex =
                    self.key_exchange.as_ref().ok_or_else(|| Error::new(ErrorKind::InternalError))?;
                kex.compute_shared_secret(&client_public)?
            }
            KeyExchangeKind::Rsa => {
                let cert = self
                    .config
                    .certificate
                    .as_ref()
                    .ok_or_else(|| Error::new(ErrorKind::HandshakeFailure))?;
                let ciphertext = cke.rsa_encrypted_pre_master()?;
                cert.private_key.decrypt(&ciphertext)?
            }
        };

        self.derive_and_stage(ctx, pump, suite, &pre_master)?;
        self.phase = Phase::AwaitChangeCipherSpec;
        Ok(HandshakeStep::default())
    }

    fn resolve_client_psk(&self, identity: &[u8]) -> Result<Bytes> {
        let validator =
            self.config.psk.as_ref().ok_or_else(|| Error::new(ErrorKind::HandshakeFailure))?;
        validator.validate_psk(identity).ok_or_else(|| Error::new(ErrorKind::HandshakeFailure))
    }

    /// Opposite key assignment from the initiator's `derive_and_stage`: this
    /// side writes with `server_write_*` and reads with `client_write_*`.
    fn derive_and_stage(
        &self,
        ctx: &mut HandshakeContext,
        pump: &mut HandshakePump,
        suite: CipherSuite,
        pre_master: &[u8],
    ) -> Result<()> {
        let client_hello =
            ctx.client_hello.clone().ok_or_else(|| Error::new(ErrorKind::InternalError))?;
        let server_hello =
            ctx.server_hello.clone().ok_or_else(|| Error::new(ErrorKind::InternalError))?;

        let ms = if ctx.extensions.extended_master_secret {
            let session_hash = ctx.transcript.hash(&self.transcript_hasher());
            self.with_prf(ctx.version, |prf| extended_master_secret(prf, pre_master, &session_hash))
        } else {
            self.with_prf(ctx.version, |prf| master_secret(prf, pre_master, &client_hello, &server_hello))
        };

        let material = self.config.endpoint.crypto.suite_material(suite)?;
        let block = self.with_prf(ctx.version, |prf| {
            key_block(
                prf,
                &ms,
                &client_hello,
                &server_hello,
                suite.mac_key_len(),
                suite.enc_key_len(),
                suite.fixed_iv_len(),
            )
        });

        let write_cipher = material.build_cipher_spec(
            suite,
            &block.server_write_mac_key,
            &block.server_write_key,
            &block.server_write_iv,
        )?;
        let read_cipher = material.build_cipher_spec(
            suite,
            &block.client_write_mac_key,
            &block.client_write_key,
            &block.client_write_iv,
        )?;
        pump.record_layer.stage_write_cipher(write_cipher);
        pump.record_layer.stage_read_cipher(read_cipher);
        ctx.master_secret = Some(ms.into());
        Ok(())
    }

    /// Verifies the client's `Finished`, then emits this side's own
    /// `ChangeCipherSpec` + `Finished` under the newly-activated write
    /// epoch.
    fn on_client_finished(
        &mut self,
        ctx: &mut HandshakeContext,
        pump: &mut HandshakePump,
        header: HandshakeHeader,
        body: Bytes,
        verify_data_received: Bytes,
    ) -> Result<HandshakeStep> {
        // Computed against the transcript as it stood before the client's
        // own Finished — the same state the client used to build this
        // value.
        let transcript_hash = ctx.transcript.hash(&self.transcript_hasher());
        let master_secret =
            ctx.master_secret.clone().ok_or_else(|| Error::new(ErrorKind::InternalError))?;
        let expected = self.with_prf(ctx.version, |prf| {
            verify_data(prf, &master_secret, CLIENT_FINISHED_LABEL, &transcript_hash)
        });

        if !constant_time_eq(&expected, &verify_data_received) {
            let alert = Alert::fatal(AlertDescription::DecryptError);
            let record = pump.send_alert(ctx.version, alert);
            return Ok(HandshakeStep::fatal(vec![record], alert));
        }

        // Only now does the client's Finished join the transcript: this
        // side's own verify_data must cover it, but the comparison above
        // must not.
        HandshakePump::note_received(ctx, &header, &body);

        let mut outbound = vec![pump.send_change_cipher_spec(ctx.version)];
        let transcript_hash = ctx.transcript.hash(&self.transcript_hasher());
        let verify = self.with_prf(ctx.version, |prf| {
            verify_data(prf, &master_secret, SERVER_FINISHED_LABEL, &transcript_hash)
        });
        let finished_body = HandshakeBody::Finished(Finished { verify_data: verify.into() });
        let (header, encoded, records) =
            pump.send_handshake(ctx, ctx.version, &finished_body, self.config.endpoint.mtu);
        HandshakePump::note_sent(ctx, &header, &encoded);
        outbound.extend(records);

        self.phase = Phase::Established;
        Ok(HandshakeStep::established(outbound))
    }

    fn transcript_hasher(&self) -> HasherFactory {
        self.config.endpoint.crypto.prf_hmac_sha256().hasher_factory().clone()
    }

    fn with_prf<R>(&self, version: ProtocolVersion, f: impl FnOnce(&Prf) -> R) -> R {
        if version == DTLS_1_0 {
            let md5 = self.config.endpoint.crypto.prf_hmac_md5();
            let sha1 = self.config.endpoint.crypto.prf_hmac_sha1();
            f(&Prf::Dtls10 { md5: md5.as_ref(), sha1: sha1.as_ref() })
        } else {
            let hmac = self.config.endpoint.crypto.prf_hmac_sha256();
            f(&Prf::Dtls12 { hmac: hmac.as_ref() })
        }
    }

    fn unexpected(&mut self, ctx: &mut HandshakeContext, pump: &mut HandshakePump) -> HandshakeStep {
        let alert = Alert::fatal(AlertDescription::UnexpectedMessage);
        let record = pump.send_alert(ctx.version, alert);
        HandshakeStep::fatal(vec![record], alert)
    }
}

/// `ECParameters curve_params; ECPoint public;` (RFC 4492), shared by
/// the `EcdhePsk` and `EcdheEcdsa` `ServerKeyExchange` encodings.
fn write_ecdhe_params(out: &mut Vec<u8>, curve: u16, public_key: &[u8]) {
    out.push(3); // ECParameters curve_type: named_curve
    out.extend_from_slice(&curve.to_be_bytes());
    write_varlen(out, 1, U8_LIMIT, |out| out.extend_from_slice(public_key));
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
    use super::*;
    use crate::cipher_suite::CipherSuite;

    #[test]
    fn constant_time_eq_rejects_length_mismatch() {
        assert!(!constant_time_eq(b"abc", b"ab"));
    }

    #[test]
    fn negotiate_suite_picks_first_server_preference_client_offers() {
        let offered = vec![
            CipherSuite::RsaWithAes256CbcSha.to_u16(),
            CipherSuite::PskWithAes128Ccm8.to_u16(),
        ];
        let preferred = [CipherSuite::PskWithAes128Ccm8, CipherSuite::RsaWithAes256CbcSha];
        let picked = preferred.iter().copied().find(|s| offered.contains(&s.to_u16()));
        assert_eq!(picked, Some(CipherSuite::PskWithAes128Ccm8));
    }
}
