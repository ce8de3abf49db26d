//! Secure random number generation, consumed through a narrow façade.
//!
//! Low-level random generation is explicitly out of scope: the source
//! implementation this is rewritten from gets its own ChaCha20-based
//! reseeding generator in `pkg/crypto/src/random.rs` behind a
//! `SharedRng`/`secure_random_bytes` façade. This crate keeps only the
//! façade and a thin `rand`-backed default, since generating the bytes
//! "securely" is the primitive's job, not the handshake engine's.

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait SecureRandom: Send + Sync + 'static {
    async fn fill(&self, buf: &mut [u8]) -> Result<()>;
}

/// Default façade implementation backed by the OS CSPRNG.
pub struct OsRandom;

#[async_trait]
impl SecureRandom for OsRandom {
    async fn fill(&self, buf: &mut [u8]) -> Result<()> {
        use rand::RngCore;
        rand::rngs::OsRng.fill_bytes(buf);
        Ok(())
    }
}

/// Fills a 32-byte DTLS `Random` structure: a 4-byte gmt-unix-time prefix
/// followed by 28 bytes of CSPRNG output.
pub async fn random_struct(rng: &dyn SecureRandom) -> Result<[u8; 32]> {
    let mut out = [0u8; 32];
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as u32;
    out[0..4].copy_from_slice(&now.to_be_bytes());
    rng.fill(&mut out[4..]).await?;
    Ok(out)
}
