//! Alert protocol messages (`Alert`, content type 21).
//!
//! Grounded on `pkg/crypto/src/tls/alert.rs`'s `tls_struct!(Alert => {...})`
//! and `tls_enum_u8!(AlertLevel/AlertDescription => {...})`, hand-rolled here
//! per the `wire.rs` rationale. Only the descriptions DTLS actually raises
//! are named explicitly; anything else round-trips as `Unknown`.

use bytes::Bytes;

use crate::error::{ErrorKind, Result};
use crate::wire::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlertLevel {
    Warning,
    Fatal,
    Unknown(u8),
}

impl AlertLevel {
    fn to_u8(self) -> u8 {
        match self {
            AlertLevel::Warning => 1,
            AlertLevel::Fatal => 2,
            AlertLevel::Unknown(v) => v,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => AlertLevel::Warning,
            2 => AlertLevel::Fatal,
            other => AlertLevel::Unknown(other),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlertDescription {
    CloseNotify,
    UnexpectedMessage,
    BadRecordMac,
    HandshakeFailure,
    DecodeError,
    DecryptError,
    ProtocolVersion,
    InsufficientSecurity,
    InternalError,
    Unknown(u8),
}

impl AlertDescription {
    pub fn to_u8(self) -> u8 {
        match self {
            AlertDescription::CloseNotify => 0,
            AlertDescription::UnexpectedMessage => 10,
            AlertDescription::BadRecordMac => 20,
            AlertDescription::HandshakeFailure => 40,
            AlertDescription::DecodeError => 50,
            AlertDescription::DecryptError => 51,
            AlertDescription::ProtocolVersion => 70,
            AlertDescription::InsufficientSecurity => 71,
            AlertDescription::InternalError => 80,
            AlertDescription::Unknown(v) => v,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => AlertDescription::CloseNotify,
            10 => AlertDescription::UnexpectedMessage,
            20 => AlertDescription::BadRecordMac,
            40 => AlertDescription::HandshakeFailure,
            50 => AlertDescription::DecodeError,
            51 => AlertDescription::DecryptError,
            70 => AlertDescription::ProtocolVersion,
            71 => AlertDescription::InsufficientSecurity,
            80 => AlertDescription::InternalError,
            other => AlertDescription::Unknown(other),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Alert {
    pub level: AlertLevel,
    pub description: AlertDescription,
}

impl Alert {
    pub fn fatal(description: AlertDescription) -> Self {
        Alert { level: AlertLevel::Fatal, description }
    }

    pub fn warning(description: AlertDescription) -> Self {
        Alert { level: AlertLevel::Warning, description }
    }

    pub fn parse(mut buf: Bytes) -> Result<Alert> {
        need(&buf, 2)?;
        let level = AlertLevel::from_u8(read_u8(&mut buf)?);
        let description = AlertDescription::from_u8(read_u8(&mut buf)?);
        Ok(Alert { level, description })
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        write_u8(out, self.level.to_u8());
        write_u8(out, self.description.to_u8());
    }
}

/// Maps an [`ErrorKind`] onto the fatal alert a peer should be notified
/// with before the session that produced it is torn down. Used when a
/// record-layer or handshake error surfaces outside the engine's own
/// `advance` (which already builds its own alerts inline) — chiefly record
/// decryption/MAC failures and fragment-reassembly errors raised while
/// ingesting a datagram.
pub fn fatal_alert_for(kind: ErrorKind) -> Alert {
    let description = match kind {
        ErrorKind::BadRecordMac => AlertDescription::BadRecordMac,
        ErrorKind::Malformed | ErrorKind::DecodeError => AlertDescription::DecodeError,
        ErrorKind::UnexpectedMessage => AlertDescription::UnexpectedMessage,
        ErrorKind::HandshakeFailure => AlertDescription::HandshakeFailure,
        ErrorKind::DecryptError => AlertDescription::DecryptError,
        ErrorKind::UnsupportedVersion => AlertDescription::ProtocolVersion,
        ErrorKind::Timeout | ErrorKind::InternalError => AlertDescription::InternalError,
    };
    Alert::fatal(description)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let alert = Alert::fatal(AlertDescription::HandshakeFailure);
        let mut buf = vec![];
        alert.serialize(&mut buf);

        let parsed = Alert::parse(Bytes::from(buf)).unwrap();
        assert_eq!(parsed.level, AlertLevel::Fatal);
        assert_eq!(parsed.description, AlertDescription::HandshakeFailure);
    }
}
