//! The `Datagram` port: the sole transport collaborator this crate consumes.
//!
//! Grounded on `pkg/common/src/io.rs`'s `Readable`/`Writeable` async traits
//! (`async fn read(&mut self, buf: &mut [u8]) -> Result<usize>` etc.), but
//! reshaped from a byte-stream interface to the datagram `send(peer, bytes)`
//! / `recv() -> (peer, bytes)` shape this crate needs — UDP socket setup and
//! OS socket options are explicitly out of scope.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// A socket address in the form the core needs it: opaque, comparable,
/// hashable and cheap to clone, so it can key the server's session registry.
/// A real binding implements this over `std::net::SocketAddr`.
pub trait PeerAddress: Clone + Eq + std::hash::Hash + Send + Sync + std::fmt::Debug + 'static {
    /// Bytes identifying this address for the responder's stateless cookie
    /// (`cookie = HMAC(server_secret, peer_address || client_random)`).
    /// Defaults to the `Debug` rendering, which is enough to bind a cookie to
    /// the address that requested it without this crate depending on
    /// `std::net::SocketAddr` directly; callers with a cheaper canonical
    /// encoding (e.g. raw IP + port bytes) can override it.
    fn cookie_key_material(&self) -> Vec<u8> {
        format!("{:?}", self).into_bytes()
    }
}

impl<T: Clone + Eq + std::hash::Hash + Send + Sync + std::fmt::Debug + 'static> PeerAddress for T {}

/// The transport port consumed by the endpoint glue. Implemented
/// by callers over whatever UDP socket type they have; this crate never
/// touches a socket directly.
#[async_trait]
pub trait Datagram<A: PeerAddress>: Send + Sync + 'static {
    /// Sends one UDP datagram to `peer`. Must not fragment: the caller is
    /// responsible for keeping `bytes.len()` within the configured MTU;
    /// the record layer never emits a record larger than that.
    async fn send(&self, peer: &A, bytes: &[u8]) -> Result<()>;

    /// Waits for and returns the next datagram along with its source
    /// address. Returns `Err(Timeout)` if no datagram arrives before an
    /// implementation-defined deadline elapses so the receive loop can
    /// periodically check for shutdown.
    async fn recv(&self) -> Result<(A, Bytes)>;
}
