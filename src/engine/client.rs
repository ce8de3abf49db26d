//! The initiator side of the handshake engine.
//!
//! Grounded on `pkg/crypto/src/tls/client.rs`'s `ClientHandshakeExecutor`,
//! generalized from a blocking `run` loop that owns its reader/writer to
//! an event-driven state machine whose `advance` is fed one
//! [`Ingested`](super::pump::Ingested) at a time by [`crate::session`] —
//! DTLS's cookie round trip and per-session dispatch mean the initiator's
//! receive loop can no longer be its own private `while`-loop the way a
//! TLS client owns a dedicated stream.

use std::sync::Arc;

use bytes::Bytes;

use crate::alert::{Alert, AlertDescription};
use crate::cipher_suite::{CipherSuite, KeyExchangeKind};
use crate::config::ClientConfig;
use crate::context::HandshakeContext;
use crate::crypto::facade::{HasherFactory, KeyExchange, SignatureKeyType};
use crate::crypto::premaster::{psk_pre_master, rsa_pre_master};
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
    Certificate, CertificateVerify, ClientHello, ClientKeyExchange, Finished, HandshakeBody,
    HelloVerifyRequest, ServerKeyExchange,
};
use crate::record::{ProtocolVersion, DTLS_1_0, DTLS_1_2};
use crate::wire::{read_varlen, U16_LIMIT};

/// What's been collected of the server's reply flight so far, between
/// `ServerHello` and `ServerHelloDone`.
#[derive(Default)]
struct ServerFlight {
    certificate: Vec<Bytes>,
    psk_identity_hint: Option<Bytes>,
    ecdhe_public: Option<Bytes>,
    ecdhe_curve: Option<u16>,
    ecdhe_signature: Option<(Option<(u8, u8)>, Bytes)>,
    cert_request_received: bool,
}

enum Phase {
    /// Waiting for either `HelloVerifyRequest` (cookie round trip) or a
    /// `ServerHello` sent directly without one — some responders skip the
    /// cookie exchange entirely.
    AwaitHelloVerifyOrServerHello,
    AwaitServerFlight(ServerFlight),
    AwaitChangeCipherSpec,
    AwaitFinished,
    Established,
}

/// Drives one client-side handshake to completion.
pub struct ClientHandshake {
    config: Arc<ClientConfig>,
    phase: Phase,
    /// The ephemeral ECDH keypair for this handshake attempt, generated once
    /// `ServerKeyExchange` reveals an ECDHE suite is in play and reused for
    /// both the shared-secret computation and the `ClientKeyExchange`'s
    /// public value — regenerating it would desynchronize the two.
    key_exchange: Option<Box<dyn KeyExchange>>,
}

impl ClientHandshake {
    pub fn new(config: Arc<ClientConfig>) -> Self {
        Self { config, phase: Phase::AwaitHelloVerifyOrServerHello, key_exchange: None }
    }

    /// Builds and records the initial, cookieless `ClientHello`. Not added
    /// to the transcript.
    pub async fn start(&mut self, ctx: &mut HandshakeContext, pump: &mut HandshakePump) -> Result<HandshakeStep> {
        let random = crate::random::random_struct(self.config.endpoint.random.as_ref()).await?;
        let client_hello = ClientHello {
            client_version: ctx.version,
            random,
            session_id: Bytes::new(),
            cookie: Bytes::new(),
            cipher_suites: self.config.endpoint.cipher_suites.iter().map(|s| s.to_u16()).collect(),
            compression_methods: Bytes::from_static(&[0]),
            extensions: initial_extensions(),
        };
        ctx.client_hello = Some(client_hello.clone());
        let body = HandshakeBody::ClientHello(client_hello);
        let (_header, _encoded, records) =
            pump.send_handshake(ctx, ctx.version, &body, self.config.endpoint.mtu);
        // Deliberately not pushed to the transcript.
        Ok(HandshakeStep::just(records))
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
            // Application data can't arrive before the handshake finishes.
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
            (Phase::AwaitHelloVerifyOrServerHello, HandshakeBody::HelloVerifyRequest(_)) => {
                let hvr = match parsed {
                    HandshakeBody::HelloVerifyRequest(hvr) => hvr,
                    _ => unreachable!(),
                };
                // Not added to the transcript.
                self.resend_with_cookie(ctx, pump, hvr)
            }
            (Phase::AwaitHelloVerifyOrServerHello, HandshakeBody::ServerHello(_)) => {
                HandshakePump::note_received(ctx, &header, &body);
                self.on_server_hello(ctx, parsed)
            }
            (Phase::AwaitServerFlight(_), _) => {
                HandshakePump::note_received(ctx, &header, &body);
                self.on_server_flight_message(ctx, pump, parsed).await
            }
            (Phase::AwaitFinished, HandshakeBody::Finished(_)) => {
                let verify_data_received = match parsed {
                    HandshakeBody::Finished(f) => f.verify_data,
                    _ => unreachable!(),
                };
                self.on_server_finished(ctx, pump, verify_data_received)
            }
            _ => Ok(self.unexpected(ctx, pump)),
        }
    }

    fn resend_with_cookie(
        &mut self,
        ctx: &mut HandshakeContext,
        pump: &mut HandshakePump,
        hvr: HelloVerifyRequest,
    ) -> Result<HandshakeStep> {
        ctx.version = hvr.server_version;
        ctx.cookie = hvr.cookie.clone();
        let mut client_hello =
            ctx.client_hello.clone().ok_or_else(|| Error::new(ErrorKind::InternalError))?;
        client_hello.client_version = hvr.server_version;
        client_hello.cookie = hvr.cookie;
        ctx.client_hello = Some(client_hello.clone());
        let body = HandshakeBody::ClientHello(client_hello);
        let (_header, _encoded, records) =
            pump.send_handshake(ctx, ctx.version, &body, self.config.endpoint.mtu);
        Ok(HandshakeStep::just(records))
    }

    fn on_server_hello(&mut self, ctx: &mut HandshakeContext, body: HandshakeBody) -> Result<HandshakeStep> {
        let sh = match body {
            HandshakeBody::ServerHello(sh) => sh,
            _ => unreachable!(),
        };
        let suite = sh.negotiated_suite()?;
        if !self.config.endpoint.cipher_suites.contains(&suite) {
            return Err(Error::new(ErrorKind::HandshakeFailure));
        }
        // Downgrade version to min(server_version, 1.2) — DTLS 1.0 only has
        // room to appear here since it's the one other version this crate
        // negotiates at all.
        ctx.version = if sh.server_version == DTLS_1_0 { DTLS_1_0 } else { DTLS_1_2 };
        ctx.extensions.extended_master_secret =
            sh.extensions.iter().any(|e| matches!(e, Extension::ExtendedMasterSecret));
        ctx.extensions.encrypt_then_mac =
            sh.extensions.iter().any(|e| matches!(e, Extension::EncryptThenMac));
        ctx.cipher_suite = Some(suite);
        ctx.server_hello = Some(sh);
        self.phase = Phase::AwaitServerFlight(ServerFlight::default());
        Ok(HandshakeStep::default())
    }

    async fn on_server_flight_message(
        &mut self,
        ctx: &mut HandshakeContext,
        pump: &mut HandshakePump,
        body: HandshakeBody,
    ) -> Result<HandshakeStep> {
        match body {
            HandshakeBody::Certificate(cert) => {
                if let Phase::AwaitServerFlight(flight) = &mut self.phase {
                    flight.certificate = cert.certificate_list;
                }
                Ok(HandshakeStep::default())
            }
            HandshakeBody::ServerKeyExchange(ske) => self.on_server_key_exchange(ctx, ske),
            HandshakeBody::CertificateRequest(_) => {
                if let Phase::AwaitServerFlight(flight) = &mut self.phase {
                    flight.cert_request_received = true;
                }
                Ok(HandshakeStep::default())
            }
            HandshakeBody::ServerHelloDone => self.on_server_hello_done(ctx, pump).await,
            _ => Ok(self.unexpected(ctx, pump)),
        }
    }

    /// Extracts whatever the negotiated suite's `ServerKeyExchange` carries
    /// (a PSK identity hint, ECDHE curve params, or both) and, for ECDHE
    /// suites, generates this side's ephemeral keypair immediately so its
    /// public value is ready by `ServerHelloDone`.
    fn on_server_key_exchange(
        &mut self,
        ctx: &mut HandshakeContext,
        ske: ServerKeyExchange,
    ) -> Result<HandshakeStep> {
        let suite = ctx.cipher_suite.ok_or_else(|| Error::new(ErrorKind::InternalError))?;
        let flight = match &mut self.phase {
            Phase::AwaitServerFlight(f) => f,
            _ => return Ok(self.unexpected_default()),
        };
        match suite.key_exchange_kind() {
            KeyExchangeKind::Psk => {
                flight.psk_identity_hint = Some(ske.psk_identity_hint()?);
            }
            KeyExchangeKind::EcdhePsk => {
                let mut data = ske.raw.clone();
                let hint = read_varlen(&mut data, 0, U16_LIMIT)?;
                let remainder = ServerKeyExchange { raw: data };
                let (curve, public) = remainder.ecdhe_params()?;
                flight.psk_identity_hint = Some(hint);
                flight.ecdhe_curve = Some(curve);
                flight.ecdhe_public = Some(public);
                self.key_exchange = Some(self.config.endpoint.crypto.new_key_exchange());
            }
            KeyExchangeKind::EcdheEcdsa => {
                let (curve, public) = ske.ecdhe_params()?;
                let signature = ske.ecdhe_signature(ctx.version)?;
                flight.ecdhe_curve = Some(curve);
                flight.ecdhe_public = Some(public);
                flight.ecdhe_signature = Some(signature);
                self.key_exchange = Some(self.config.endpoint.crypto.new_key_exchange());
            }
            KeyExchangeKind::Rsa => {
                // RSA suites carry no ServerKeyExchange; receiving one here
                // is a protocol violation.
                return Err(Error::new(ErrorKind::UnexpectedMessage));
            }
        }
        Ok(HandshakeStep::default())
    }

    /// Derives the pre-master secret, verifies the server's signature for
    /// ECDHE-ECDSA, then emits (in order): Certificate?, ClientKeyExchange,
    /// CertificateVerify?, ChangeCipherSpec, Finished.
    async fn on_server_hello_done(
        &mut self,
        ctx: &mut HandshakeContext,
        pump: &mut HandshakePump,
    ) -> Result<HandshakeStep> {
        let flight = match std::mem::replace(&mut self.phase, Phase::AwaitChangeCipherSpec) {
            Phase::AwaitServerFlight(f) => f,
            other => {
                self.phase = other;
                return Ok(self.unexpected(ctx, pump));
            }
        };

        if !flight.certificate.is_empty() {
            ctx.peer_certificate_chain = Some(flight.certificate.clone());
        }

        let suite = ctx.cipher_suite.ok_or_else(|| Error::new(ErrorKind::InternalError))?;
        let mut outbound = vec![];

        if suite.key_exchange_kind() == KeyExchangeKind::EcdheEcdsa {
            if let Err(alert_step) = self.verify_server_signature(ctx, pump, &flight) {
                return alert_step;
            }
        }

        // Client certificate, if the server asked and we have one.
        let send_certificate = flight.cert_request_received && self.config.certificate.is_some();
        if send_certificate {
            let cert = self.config.certificate.as_ref().unwrap();
            let body = HandshakeBody::Certificate(Certificate { certificate_list: cert.chain.clone() });
            let (header, encoded, records) =
                pump.send_handshake(ctx, ctx.version, &body, self.config.endpoint.mtu);
            HandshakePump::note_sent(ctx, &header, &encoded);
            outbound.extend(records);
        }

        let (pre_master, rsa_ciphertext) = self.compute_pre_master(ctx, suite, &flight).await?;
        let client_key_exchange = self.build_client_key_exchange(suite, &flight, rsa_ciphertext)?;
        let ckx_body = HandshakeBody::ClientKeyExchange(client_key_exchange);
        let (header, encoded, records) =
            pump.send_handshake(ctx, ctx.version, &ckx_body, self.config.endpoint.mtu);
        HandshakePump::note_sent(ctx, &header, &encoded);
        outbound.extend(records);

        if send_certificate {
            let cert = self.config.certificate.as_ref().unwrap();
            let transcript_hash = ctx.transcript.hash(&self.transcript_hasher());
            let scheme = SignatureAndHashAlgorithm::for_key(ctx.version, cert.private_key.key_type());
            let signature = cert.private_key.sign(scheme.hash, scheme.signature, &transcript_hash)?;
            let cv = CertificateVerify {
                algorithm: if ctx.version == DTLS_1_0 { None } else { Some((scheme.hash, scheme.signature)) },
                signature: signature.into(),
            };
            let body = HandshakeBody::CertificateVerify(cv);
            let (header, encoded, records) =
                pump.send_handshake(ctx, ctx.version, &body, self.config.endpoint.mtu);
            HandshakePump::note_sent(ctx, &header, &encoded);
            outbound.extend(records);
        }

        self.derive_and_stage(ctx, pump, suite, &pre_master)?;
        outbound.push(pump.send_change_cipher_spec(ctx.version));

        let transcript_hash = ctx.transcript.hash(&self.transcript_hasher());
        let verify = self.with_prf(ctx.version, |prf| {
            verify_data(prf, ctx.master_secret.as_ref().unwrap(), CLIENT_FINISHED_LABEL, &transcript_hash)
        });
        let finished_body = HandshakeBody::Finished(Finished { verify_data: verify.into() });
        let (header, encoded, records) =
            pump.send_handshake(ctx, ctx.version, &finished_body, self.config.endpoint.mtu);
        HandshakePump::note_sent(ctx, &header, &encoded);
        outbound.extend(records);

        Ok(HandshakeStep::just(outbound))
    }

    /// Reconstructs the exact bytes the server signed (`client_random ||
    /// server_random || ECParameters || ECPoint`, RFC 4492) and checks them
    /// against the leaf certificate's embedded public key.
    fn verify_server_signature(
        &self,
        ctx: &HandshakeContext,
        pump: &mut HandshakePump,
        flight: &ServerFlight,
    ) -> std::result::Result<(), Result<HandshakeStep>> {
        let run = || -> Result<bool> {
            let leaf = ctx
                .peer_certificate_chain
                .as_ref()
                .and_then(|chain| chain.first())
                .ok_or_else(|| Error::new(ErrorKind::HandshakeFailure))?;
            let (algorithm, signature) =
                flight.ecdhe_signature.clone().ok_or_else(|| Error::new(ErrorKind::HandshakeFailure))?;
            // DTLS 1.0/1.1 carry no algorithm id; the suite already tells us
            // this is ECDSA, so the legacy SHA-1 scheme is implied.
            let (hash_alg, sig_alg) = algorithm
                .unwrap_or_else(|| {
                    let scheme = SignatureAndHashAlgorithm::for_key(ctx.version, SignatureKeyType::Ecdsa);
                    (scheme.hash, scheme.signature)
                });
            let curve = flight.ecdhe_curve.ok_or_else(|| Error::new(ErrorKind::HandshakeFailure))?;
            let ecdhe_public =
                flight.ecdhe_public.clone().ok_or_else(|| Error::new(ErrorKind::HandshakeFailure))?;
            let client_hello = ctx.client_hello.as_ref().ok_or_else(|| Error::new(ErrorKind::InternalError))?;
            let server_hello = ctx.server_hello.as_ref().ok_or_else(|| Error::new(ErrorKind::InternalError))?;

            let mut message = vec![];
            message.extend_from_slice(&client_hello.random);
            message.extend_from_slice(&server_hello.random);
            message.push(3); // ECParameters curve_type: named_curve
            message.extend_from_slice(&curve.to_be_bytes());
            message.push(ecdhe_public.len() as u8);
            message.extend_from_slice(&ecdhe_public);

            self.config.endpoint.crypto.verify_peer_signature(leaf, &message, hash_alg, sig_alg, &signature)
        };

        match run() {
            Ok(true) => Ok(()),
            Ok(false) | Err(_) => {
                let alert = Alert::fatal(AlertDescription::HandshakeFailure);
                let record = pump.send_alert(ctx.version, alert);
                Err(Ok(HandshakeStep::fatal(vec![record], alert)))
            }
        }
    }

    async fn compute_pre_master(
        &self,
        ctx: &mut HandshakeContext,
        suite: CipherSuite,
        flight: &ServerFlight,
    ) -> Result<(Vec<u8>, Option<Vec<u8>>)> {
        match suite.key_exchange_kind() {
            KeyExchangeKind::Psk => {
                let hint = flight.psk_identity_hint.clone().unwrap_or_default();
                let (identity, key) = self.resolve_psk(&hint)?;
                ctx.psk_identity = Some(identity);
                Ok((psk_pre_master(&key, None), None))
            }
            KeyExchangeKind::EcdhePsk => {
                let hint = flight.psk_identity_hint.clone().unwrap_or_default();
                let (identity, key) = self.resolve_psk(&hint)?;
                ctx.psk_identity = Some(identity);
                let server_public =
                    flight.ecdhe_public.clone().ok_or_else(|| Error::new(ErrorKind::HandshakeFailure))?;
                let kex = self.key_exchange.as_ref().ok_or_else(|| Error::new(ErrorKind::InternalError))?;
                let shared = kex.compute_shared_secret(&server_public)?;
                Ok((psk_pre_master(&key, Some(&shared)), None))
            }
            KeyExchangeKind::EcdheEcdsa => {
                let server_public =
                    flight.ecdhe_public.clone().ok_or_else(|| Error::new(ErrorKind::HandshakeFailure))?;
                let kex = self.key_exchange.as_ref().ok_or_else(|| Error::new(ErrorKind::InternalError))?;
                Ok((kex.compute_shared_secret(&server_public)?, None))
            }
            KeyExchangeKind::Rsa => {
                let mut random_bytes = [0u8; 46];
                self.config.endpoint.random.fill(&mut random_bytes).await?;
                let client_version = ctx
                    .client_hello
                    .as_ref()
                    .ok_or_else(|| Error::new(ErrorKind::InternalError))?
                    .client_version;
                let plaintext = rsa_pre_master(client_version, &random_bytes);
                let leaf = ctx
                    .peer_certificate_chain
                    .as_ref()
                    .and_then(|chain| chain.first())
                    .ok_or_else(|| Error::new(ErrorKind::HandshakeFailure))?;
                let ciphertext = self.config.endpoint.crypto.rsa_encrypt_pre_master(leaf, &plaintext)?;
                Ok((plaintext.to_vec(), Some(ciphertext)))
            }
        }
    }

    fn resolve_psk(&self, hint: &[u8]) -> Result<(Bytes, Bytes)> {
        let store = self.config.psk.as_ref().ok_or_else(|| Error::new(ErrorKind::HandshakeFailure))?;
        if !hint.is_empty() {
            if let Some(key) = store.lookup(hint) {
                return Ok((Bytes::copy_from_slice(hint), key));
            }
        }
        store.pick_any().ok_or_else(|| Error::new(ErrorKind::HandshakeFailure))
    }

    fn build_client_key_exchange(
        &self,
        suite: CipherSuite,
        flight: &ServerFlight,
        rsa_ciphertext: Option<Vec<u8>>,
    ) -> Result<ClientKeyExchange> {
        Ok(match suite.key_exchange_kind() {
            KeyExchangeKind::Psk => {
                let identity = flight.psk_identity_hint.clone().unwrap_or_default();
                ClientKeyExchange::psk(&identity)
            }
            KeyExchangeKind::EcdhePsk => {
                let identity = flight.psk_identity_hint.clone().unwrap_or_default();
                let kex = self.key_exchange.as_ref().ok_or_else(|| Error::new(ErrorKind::InternalError))?;
                ClientKeyExchange::ecdhe_psk(&identity, &kex.public_key())
            }
            KeyExchangeKind::EcdheEcdsa => {
                let kex = self.key_exchange.as_ref().ok_or_else(|| Error::new(ErrorKind::InternalError))?;
                ClientKeyExchange::ecdhe(&kex.public_key())
            }
            KeyExchangeKind::Rsa => {
                let ciphertext = rsa_ciphertext.ok_or_else(|| Error::new(ErrorKind::InternalError))?;
                ClientKeyExchange::rsa(&ciphertext)
            }
        })
    }

    fn derive_and_stage(
        &self,
        ctx: &mut HandshakeContext,
        pump: &mut HandshakePump,
        suite: CipherSuite,
        pre_master: &[u8],
    ) -> Result<()> {
        let client_hello = ctx.client_hello.clone().ok_or_else(|| Error::new(ErrorKind::InternalError))?;
        let server_hello = ctx.server_hello.clone().ok_or_else(|| Error::new(ErrorKind::InternalError))?;

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
            &block.client_write_mac_key,
            &block.client_write_key,
            &block.client_write_iv,
        )?;
        let read_cipher = material.build_cipher_spec(
            suite,
            &block.server_write_mac_key,
            &block.server_write_key,
            &block.server_write_iv,
        )?;
        pump.record_layer.stage_write_cipher(write_cipher);
        pump.record_layer.stage_read_cipher(read_cipher);
        ctx.master_secret = Some(ms.into());
        Ok(())
    }

    fn on_server_finished(
        &mut self,
        ctx: &mut HandshakeContext,
        pump: &mut HandshakePump,
        verify_data_received: Bytes,
    ) -> Result<HandshakeStep> {
        let transcript_hash = ctx.transcript.hash(&self.transcript_hasher());
        let master_secret = ctx.master_secret.clone().ok_or_else(|| Error::new(ErrorKind::InternalError))?;
        let expected = self.with_prf(ctx.version, |prf| {
            verify_data(prf, &master_secret, SERVER_FINISHED_LABEL, &transcript_hash)
        });

        if !constant_time_eq(&expected, &verify_data_received) {
            let alert = Alert::fatal(AlertDescription::DecryptError);
            let record = pump.send_alert(ctx.version, alert);
            return Ok(HandshakeStep::fatal(vec![record], alert));
        }

        self.phase = Phase::Established;
        Ok(HandshakeStep::established(vec![]))
    }

    /// The hash used for the running transcript digest — always
    /// SHA-256-shaped regardless of negotiated PRF flavor, since
    /// `verify_data` takes an already-computed digest rather than the raw
    /// message log.
    fn transcript_hasher(&self) -> HasherFactory {
        self.config.endpoint.crypto.prf_hmac_sha256().hasher_factory().clone()
    }

    /// Builds the version-appropriate [`Prf`] for one call and passes it to
    /// `f`, keeping the `Arc<dyn Hmac>` backing it alive for exactly that
    /// call — `Prf` borrows rather than owns its HMACs.
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

    fn unexpected_default(&mut self) -> HandshakeStep {
        HandshakeStep::fatal(vec![], Alert::fatal(AlertDescription::UnexpectedMessage))
    }
}

fn initial_extensions() -> Vec<Extension> {
    vec![
        Extension::EllipticCurves(NamedCurve::supported()),
        Extension::EllipticCurvePointFormats,
        // Advertises the broader signature-algorithm set rather than a
        // SHA1+RSA-only one, since a narrower set constrains ECDSA interop.
        Extension::SignatureAlgorithms(vec![
            SignatureAndHashAlgorithm::ECDSA_SECP256R1_SHA256,
            SignatureAndHashAlgorithm::RSA_PKCS1_SHA256,
            SignatureAndHashAlgorithm::RSA_PKCS1_SHA1,
        ]),
        Extension::ExtendedMasterSecret,
    ]
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

    #[test]
    fn constant_time_eq_rejects_length_mismatch() {
        assert!(!constant_time_eq(b"abc", b"ab"));
    }

    #[test]
    fn constant_time_eq_accepts_equal_slices() {
        assert!(constant_time_eq(b"abcdef", b"abcdef"));
    }
}
