//! Error kinds produced by the DTLS state machine.
//!
//! Grounded on `pkg/common/src/bits.rs`'s `#[derive(Fail)] enum BitIoError`
//! and `pkg/executor/src/sync/async_mutex.rs`'s `PoisonError` pattern: a
//! small `Fail` enum wrapped by the crate-wide `failure::Error`.

use std::fmt;

pub use failure::{err_msg, format_err, Error as FailureError, Fail};

pub type Result<T> = std::result::Result<T, Error>;

/// The fixed set of error kinds the state machine can produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Fail)]
pub enum ErrorKind {
    #[fail(display = "operation timed out")]
    Timeout,
    #[fail(display = "malformed record or handshake message")]
    Malformed,
    #[fail(display = "unexpected message for the current handshake state")]
    UnexpectedMessage,
    #[fail(display = "bad record MAC")]
    BadRecordMac,
    #[fail(display = "fragment reassembly or length error")]
    DecodeError,
    #[fail(display = "no common suite, curve or signature algorithm")]
    HandshakeFailure,
    #[fail(display = "unsupported protocol version")]
    UnsupportedVersion,
    #[fail(display = "Finished verification failed")]
    DecryptError,
    #[fail(display = "internal error")]
    InternalError,
}

/// Crate error type: an [`ErrorKind`] plus an optional chained cause.
///
/// This mirrors `common::errors::Error` (a thin wrapper over
/// `failure::Error`) but keeps the kind queryable so callers can map errors
/// onto alert descriptions without downcasting strings.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    inner: FailureError,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        let inner = FailureError::from(kind);
        Self { kind, inner }
    }

    pub fn with_message(kind: ErrorKind, message: impl fmt::Display) -> Self {
        Self { kind, inner: err_msg(format!("{}: {}", kind, message)) }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl std::error::Error for Error {}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error::new(kind)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::with_message(ErrorKind::InternalError, e)
    }
}

/// Shorthand for constructing a `Result::Err` with a formatted message under
/// a given [`ErrorKind`], in the spirit of `failure::err_msg`.
#[macro_export]
macro_rules! dtls_err {
    ($kind:expr, $($arg:tt)*) => {
        Err($crate::error::Error::with_message($kind, format!($($arg)*)))
    };
}
