//! Handshake fragment reassembler.
//!
//! DTLS fragments a single logical handshake message across multiple
//! record-layer fragments identified by a shared `message_seq`; this module
//! reconstructs the original message byte-for-byte regardless of the
//! fragments' arrival order or duplication. There is no TLS counterpart in
//! a TLS stack (TLS has no handshake-layer fragmentation), so this is
//! grounded on RFC 6347 §4.2.3's reassembly description plus
//! `webrtc-rs-webrtc/dtls/src/flight/flight1.rs`, whose `HandshakeCache`
//! the surrounding flight code pulls completed messages from by
//! `(message_seq, type)`.

use std::collections::HashMap;

use bytes::Bytes;

use crate::error::{Error, ErrorKind, Result};
use crate::handshake::header::{HandshakeHeader, HandshakeType};

/// Cap on bytes held per peer across all in-flight reassemblies before the
/// reassembler gives up and reports overflow.
pub const MAX_PENDING_BYTES: usize = 64 * 1024;

struct PendingMessage {
    msg_type: HandshakeType,
    total_length: u32,
    buffer: Vec<u8>,
    /// Merged, sorted, non-overlapping `[start, end)` ranges of `buffer`
    /// that have been written so far.
    covered: Vec<(u32, u32)>,
}

impl PendingMessage {
    fn is_complete(&self) -> bool {
        self.covered.len() == 1 && self.covered[0] == (0, self.total_length)
    }

    /// Inserts `fragment` at `[offset, offset + fragment.len())`, merging it
    /// into `covered`. Overlapping duplicate bytes are simply overwritten
    /// with the same value, making re-insertion idempotent.
    fn insert(&mut self, offset: u32, fragment: &[u8]) {
        let start = offset;
        let end = offset + fragment.len() as u32;
        self.buffer[start as usize..end as usize].copy_from_slice(fragment);

        let mut ranges = self.covered.clone();
        ranges.push((start, end));
        ranges.sort_unstable();

        let mut merged: Vec<(u32, u32)> = vec![];
        for (s, e) in ranges {
            if let Some(last) = merged.last_mut() {
                if s <= last.1 {
                    last.1 = last.1.max(e);
                    continue;
                }
            }
            merged.push((s, e));
        }
        self.covered = merged;
    }
}

/// One reassembler per peer (per direction), keyed internally by
/// `message_seq` since a peer may have more than one message partially
/// buffered if records arrive out of order across message boundaries. If a
/// later record from the next message arrives before completion, the stale
/// state is retained.
#[derive(Default)]
pub struct FragmentReassembler {
    pending: HashMap<u16, PendingMessage>,
}

impl FragmentReassembler {
    pub fn new() -> Self {
        Self { pending: HashMap::new() }
    }

    fn total_pending_bytes(&self) -> usize {
        self.pending.values().map(|m| m.buffer.len()).sum()
    }

    /// Feeds one fragment (the record's handshake header plus its body) in.
    /// Returns the reassembled `(type, message_bytes)` once every byte of
    /// `[0, total_length)` has arrived, or `None` while still partial.
    ///
    /// On overflow past [`MAX_PENDING_BYTES`], the partial set for this
    /// `message_seq` is dropped and `DecodeError` is returned so the caller
    /// can raise the alert it calls for.
    pub fn insert(
        &mut self,
        header: &HandshakeHeader,
        fragment: Bytes,
    ) -> Result<Option<(HandshakeType, Bytes)>> {
        if header.fragment_offset + header.fragment_length > header.length {
            return Err(Error::with_message(
                ErrorKind::DecodeError,
                "fragment range exceeds declared message length",
            ));
        }
        if fragment.len() as u32 != header.fragment_length {
            return Err(Error::new(ErrorKind::Malformed));
        }

        // A message with offset 0 and fragment_length == length is already
        // complete in one shot; short-circuit without touching the map.
        if header.is_complete_single_fragment() {
            self.pending.remove(&header.message_seq);
            return Ok(Some((header.msg_type, fragment)));
        }

        let entry = self.pending.entry(header.message_seq).or_insert_with(|| PendingMessage {
            msg_type: header.msg_type,
            total_length: header.length,
            buffer: vec![0u8; header.length as usize],
            covered: vec![],
        });

        if entry.total_length != header.length || entry.msg_type != header.msg_type {
            self.pending.remove(&header.message_seq);
            return Err(Error::with_message(
                ErrorKind::DecodeError,
                "conflicting total length or type for message_seq",
            ));
        }

        entry.insert(header.fragment_offset, &fragment);

        if self.total_pending_bytes() > MAX_PENDING_BYTES {
            self.pending.remove(&header.message_seq);
            return Err(Error::with_message(
                ErrorKind::DecodeError,
                "fragment reassembly buffer exceeded the per-peer cap",
            ));
        }

        let complete = self.pending.get(&header.message_seq).map(|m| m.is_complete()).unwrap_or(false);
        if complete {
            let msg = self.pending.remove(&header.message_seq).unwrap();
            Ok(Some((msg.msg_type, Bytes::from(msg.buffer))))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(seq: u16, offset: u32, len: u32, total: u32) -> HandshakeHeader {
        HandshakeHeader {
            msg_type: HandshakeType::Certificate,
            length: total,
            message_seq: seq,
            fragment_offset: offset,
            fragment_length: len,
        }
    }

    #[test]
    fn reassembles_in_order_fragments() {
        let mut r = FragmentReassembler::new();
        let full = b"the quick brown fox jumps".to_vec();

        assert!(r
            .insert(&header(0, 0, 10, full.len() as u32), Bytes::copy_from_slice(&full[0..10]))
            .unwrap()
            .is_none());
        assert!(r
            .insert(&header(0, 10, 10, full.len() as u32), Bytes::copy_from_slice(&full[10..20]))
            .unwrap()
            .is_none());
        let (ty, msg) = r
            .insert(
                &header(0, 20, (full.len() - 20) as u32, full.len() as u32),
                Bytes::copy_from_slice(&full[20..]),
            )
            .unwrap()
            .unwrap();
        assert_eq!(ty, HandshakeType::Certificate);
        assert_eq!(&msg[..], &full[..]);
    }

    #[test]
    fn reassembles_out_of_order_with_duplicate() {
        let mut r = FragmentReassembler::new();
        let full = b"0123456789abcdefghij".to_vec();
        let total = full.len() as u32;

        assert!(r
            .insert(&header(1, 10, 5, total), Bytes::copy_from_slice(&full[10..15]))
            .unwrap()
            .is_none());
        // duplicate of the fragment above, re-delivered
        assert!(r
            .insert(&header(1, 10, 5, total), Bytes::copy_from_slice(&full[10..15]))
            .unwrap()
            .is_none());
        assert!(r
            .insert(&header(1, 0, 10, total), Bytes::copy_from_slice(&full[0..10]))
            .unwrap()
            .is_none());
        let (_, msg) = r
            .insert(&header(1, 15, 5, total), Bytes::copy_from_slice(&full[15..20]))
            .unwrap()
            .unwrap();
        assert_eq!(&msg[..], &full[..]);
    }

    #[test]
    fn rejects_conflicting_total_length() {
        let mut r = FragmentReassembler::new();
        r.insert(&header(2, 0, 5, 20), Bytes::from_static(b"hello")).unwrap();
        let err = r.insert(&header(2, 5, 5, 30), Bytes::from_static(b"world")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DecodeError);
    }

    #[test]
    fn single_fragment_short_circuits() {
        let mut r = FragmentReassembler::new();
        let (ty, msg) =
            r.insert(&header(3, 0, 4, 4), Bytes::from_static(b"ping")).unwrap().unwrap();
        assert_eq!(ty, HandshakeType::Certificate);
        assert_eq!(&msg[..], b"ping");
    }
}
