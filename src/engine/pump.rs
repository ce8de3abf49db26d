//! The record-layer/fragment-reassembler/transcript glue shared by both the
//! initiator and responder flight drivers.
//!
//! Grounded on `pkg/crypto/src/tls/handshake_executor.rs`'s
//! `HandshakeExecutor::send_handshake_message`/`receive_handshake_message`,
//! which thread a `Transcript` through `RecordWriter`/`RecordReader` the
//! same way; split out here as its own type (rather than folded into the
//! client/server drivers) because the server needs one `HandshakePump` per
//! `Session` while the client needs exactly one for its single peer.

use bytes::Bytes;

use crate::alert::Alert;
use crate::context::HandshakeContext;
use crate::error::{Error, ErrorKind, Result};
use crate::fragment::FragmentReassembler;
use crate::handshake::header::{HandshakeHeader, HandshakeType, HANDSHAKE_HEADER_LEN};
use crate::handshake::messages::HandshakeBody;
use crate::record::{ContentType, ProtocolVersion, Record, RECORD_HEADER_LEN};
use crate::record_layer::{OpenOutcome, RecordLayer};

/// Outcome of feeding one inbound [`Record`] through the pump.
pub enum Ingested {
    /// A complete handshake message was reassembled; the caller decides
    /// whether it belongs in the transcript (`HelloVerifyRequest` and the
    /// cookieless initial `ClientHello` never do) by calling
    /// [`HandshakePump::note_received`] itself before acting on it.
    Handshake { header: HandshakeHeader, body: Bytes },
    Alert(Alert),
    /// The record layer already rolled its read epoch/cipher over on this
    /// record; surfaced so the driving state machine can transition.
    ChangeCipherSpec,
    ApplicationData(Bytes),
    /// Consumed but nothing actionable came out of it (a non-final
    /// handshake fragment, a duplicate, or a strictly older epoch).
    Nothing,
    /// Belongs to a newer epoch than is currently active; the caller should
    /// hold onto the raw record until its own epoch catches up.
    FutureEpoch,
}

/// Bundles the per-peer record layer and fragment reassembler behind one
/// `ingest`/`send_*` surface.
pub struct HandshakePump {
    pub record_layer: RecordLayer,
    reassembler: FragmentReassembler,
    /// Raw records that arrived under an epoch this side hasn't reached
    /// yet, retried every time a `ChangeCipherSpec` advances the read
    /// epoch.
    future_epoch_buffer: Vec<Record>,
}

impl HandshakePump {
    pub fn new() -> Self {
        Self {
            record_layer: RecordLayer::new(),
            reassembler: FragmentReassembler::new(),
            future_epoch_buffer: vec![],
        }
    }

    /// Reconstructs the canonical (single-fragment) wire encoding of a
    /// handshake message for the transcript, independent of how many record
    /// fragments it actually traveled in.
    fn canonical_encoding(header: &HandshakeHeader, body: &Bytes) -> Bytes {
        let mut out = Vec::with_capacity(HANDSHAKE_HEADER_LEN + body.len());
        let canonical = HandshakeHeader {
            msg_type: header.msg_type,
            length: header.length,
            message_seq: header.message_seq,
            fragment_offset: 0,
            fragment_length: header.length,
        };
        canonical.serialize(&mut out);
        out.extend_from_slice(body);
        Bytes::from(out)
    }

    /// Appends a sent message's canonical encoding to the transcript.
    pub fn note_sent(ctx: &mut HandshakeContext, header: &HandshakeHeader, body: &Bytes) {
        ctx.transcript.push(Self::canonical_encoding(header, body));
    }

    /// Appends a received message's canonical encoding to the transcript.
    pub fn note_received(ctx: &mut HandshakeContext, header: &HandshakeHeader, body: &Bytes) {
        ctx.transcript.push(Self::canonical_encoding(header, body));
    }

    /// Fragments and frames one outbound handshake message under `mtu`,
    /// consuming the next `message_seq` from `ctx`. Does not touch the
    /// transcript — callers push via [`Self::note_sent`] after deciding
    /// whether this message type participates.
    pub fn send_handshake(
        &mut self,
        ctx: &mut HandshakeContext,
        version: ProtocolVersion,
        body: &HandshakeBody,
        mtu: usize,
    ) -> (HandshakeHeader, Bytes, Vec<Record>) {
        let mut encoded = vec![];
        body.serialize(&mut encoded);
        let encoded = Bytes::from(encoded);

        let message_seq = ctx.take_next_send_seq();
        let total_len = encoded.len() as u32;
        let budget = mtu.saturating_sub(RECORD_HEADER_LEN + HANDSHAKE_HEADER_LEN).max(1);

        let mut records = vec![];
        let mut offset = 0u32;
        loop {
            let remaining = total_len - offset;
            let chunk_len = remaining.min(budget as u32);
            let header = HandshakeHeader {
                msg_type: body.msg_type(),
                length: total_len,
                message_seq,
                fragment_offset: offset,
                fragment_length: chunk_len,
            };
            let mut fragment = vec![];
            header.serialize(&mut fragment);
            fragment.extend_from_slice(&encoded[offset as usize..(offset + chunk_len) as usize]);
            records.push(self.record_layer.seal(ContentType::Handshake, version, &fragment, &[]));
            offset += chunk_len;
            if offset >= total_len {
                break;
            }
        }

        let full_header = HandshakeHeader {
            msg_type: body.msg_type(),
            length: total_len,
            message_seq,
            fragment_offset: 0,
            fragment_length: total_len,
        };
        (full_header, encoded, records)
    }

    pub fn send_change_cipher_spec(&mut self, version: ProtocolVersion) -> Record {
        self.record_layer.seal(ContentType::ChangeCipherSpec, version, &[1], &[])
    }

    pub fn send_alert(&mut self, version: ProtocolVersion, alert: Alert) -> Record {
        let mut body = vec![];
        alert.serialize(&mut body);
        self.record_layer.seal(ContentType::Alert, version, &body, &[])
    }

    pub fn send_application_data(&mut self, version: ProtocolVersion, data: &[u8], explicit_iv: &[u8]) -> Record {
        self.record_layer.seal(ContentType::ApplicationData, version, data, explicit_iv)
    }

    /// Feeds every record of one inbound datagram through decryption/epoch
    /// handling and fragment reassembly, returning every event worth acting
    /// on (anything that isn't a dropped duplicate or a still-partial
    /// fragment). A `ChangeCipherSpec` anywhere in the batch retries
    /// whatever this peer had buffered under the newly-active epoch, so a
    /// CCS and the first encrypted record after it can arrive in either
    /// order.
    pub fn ingest_datagram(&mut self, records: Vec<Record>) -> Result<Vec<Ingested>> {
        let mut out = vec![];
        for record in records {
            self.ingest_one(record, &mut out)?;
        }
        Ok(out)
    }

    fn ingest_one(&mut self, record: Record, out: &mut Vec<Ingested>) -> Result<()> {
        let content_type = record.content_type;
        match self.record_layer.open(&record)? {
            OpenOutcome::Dropped => {}
            OpenOutcome::FutureEpoch => self.future_epoch_buffer.push(record),
            OpenOutcome::Accepted(plaintext) => {
                let event = match content_type {
                    ContentType::ChangeCipherSpec => Ingested::ChangeCipherSpec,
                    ContentType::Alert => Ingested::Alert(Alert::parse(Bytes::from(plaintext))?),
                    ContentType::ApplicationData => Ingested::ApplicationData(Bytes::from(plaintext)),
                    ContentType::Handshake => {
                        let buf = Bytes::from(plaintext);
                        let (header, rest) = HandshakeHeader::parse(buf)?;
                        if (rest.len() as u32) < header.fragment_length {
                            return Err(Error::new(ErrorKind::Malformed));
                        }
                        let fragment = rest.slice(0..header.fragment_length as usize);
                        match self.reassembler.insert(&header, fragment)? {
                            Some((msg_type, body)) => {
                                let full_header = HandshakeHeader {
                                    msg_type,
                                    length: header.length,
                                    message_seq: header.message_seq,
                                    fragment_offset: 0,
                                    fragment_length: header.length,
                                };
                                Ingested::Handshake { header: full_header, body }
                            }
                            None => return Ok(()),
                        }
                    }
                    ContentType::Unknown(_) => return Ok(()),
                };

                let was_ccs = matches!(event, Ingested::ChangeCipherSpec);
                out.push(event);

                if was_ccs && !self.future_epoch_buffer.is_empty() {
                    let buffered = std::mem::take(&mut self.future_epoch_buffer);
                    for r in buffered {
                        self.ingest_one(r, out)?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// True for the messages that participate in the handshake transcript.
/// `is_cookieless_client_hello` must be computed by the caller, since it
/// depends on whether *this* `ClientHello` carried a non-empty cookie, not
/// just its type.
pub fn participates_in_transcript(msg_type: HandshakeType, is_cookieless_client_hello: bool) -> bool {
    !matches!(msg_type, HandshakeType::HelloVerifyRequest) && !is_cookieless_client_hello
}
