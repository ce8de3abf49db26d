//! A DTLS 1.0/1.2 endpoint library: record framing and epoch discipline,
//! handshake fragmentation/reassembly, the initiator and responder state
//! machines, per-peer session multiplexing and the endpoint glue that
//! drives both over a caller-supplied datagram transport.
//!
//! Certificate/key parsing, the bulk cryptographic primitives (AES, HMAC,
//! the SHA family, EC point arithmetic, RSA, the CSPRNG) and UDP socket
//! setup are all consumed through narrow collaborator traits rather than
//! implemented here — see [`config`] and [`crypto::facade`].

pub mod alert;
pub mod cipher_suite;
pub mod config;
pub mod context;
pub mod cookie;
pub mod crypto;
pub mod endpoint;
pub mod engine;
pub mod error;
pub mod fragment;
pub mod handshake;
pub mod io;
pub mod random;
pub mod record;
pub mod record_layer;
pub mod session;
pub mod sync;
pub mod transcript;
pub mod wire;

pub use endpoint::{ClientEndpoint, ServerEndpoint};
pub use error::{Error, ErrorKind, Result};
