//! The handshake flight-engine: the initiator and responder state machines
//! that drive a [`HandshakePump`](pump::HandshakePump) through transitions,
//! plus the shared event/outcome types both sides advance through.
//!
//! Grounded on `pkg/crypto/src/tls/client.rs`/`server.rs`'s
//! `ClientHandshakeExecutor`/`ServerHandshakeExecutor` split, generalized
//! from "each side owns its reader/writer and blocks on the next message"
//! to "each side is advanced one [`pump::Ingested`] event at a time" so a
//! single session dispatcher ([`crate::session`]) can drive either role
//! through the same record-ordering discipline.

pub mod client;
pub mod pump;
pub mod server;

use bytes::Bytes;

use crate::alert::Alert;
use crate::record::Record;

/// What one role-specific `advance` call produced: zero or more records to
/// actually put on the wire, whether the handshake just completed, and
/// whether it just failed fatally (in which case `outbound` carries the
/// alert to send before the session is torn down).
#[derive(Default)]
pub struct HandshakeStep {
    pub outbound: Vec<Record>,
    pub established: bool,
    pub fatal_alert: Option<Alert>,
}

impl HandshakeStep {
    pub fn just(outbound: Vec<Record>) -> Self {
        Self { outbound, established: false, fatal_alert: None }
    }

    pub fn established(outbound: Vec<Record>) -> Self {
        Self { outbound, established: true, fatal_alert: None }
    }

    pub fn fatal(outbound: Vec<Record>, alert: Alert) -> Self {
        Self { outbound, established: false, fatal_alert: Some(alert) }
    }
}

/// Decrypted application data handed to the user callback once a session is
/// established.
pub struct DeliveredData(pub Bytes);
