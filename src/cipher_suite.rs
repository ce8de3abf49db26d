//! The negotiable cipher suites and what each one needs from the
//! crypto façade to build a [`CipherEndpointSpec`] pair.
//!
//! Grounded on `pkg/crypto/src/tls/cipher_suite.rs`'s `CipherSuite` enum and
//! its `decode -> CipherSuiteParts` dispatch, narrowed to the six suites
//! named (IoT-style PSK/ECDHE deployments) instead of a full
//! TLS 1.2/1.3 catalogue.

use std::sync::Arc;

use crate::crypto::cipher::CipherEndpointSpec;
use crate::crypto::facade::{Aead, AeadNonceGenerator, CbcCipher, Hmac};
use crate::error::{Error, ErrorKind, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CipherSuite {
    PskWithAes128CbcSha256,
    PskWithAes128Ccm8,
    EcdhePskWithAes128CbcSha256,
    EcdheEcdsaWithAes128CbcSha256,
    EcdheEcdsaWithAes128Ccm8,
    RsaWithAes256CbcSha,
}

impl CipherSuite {
    pub fn to_u16(self) -> u16 {
        match self {
            CipherSuite::PskWithAes128CbcSha256 => 0x00ae,
            CipherSuite::PskWithAes128Ccm8 => 0xc0a8,
            CipherSuite::EcdhePskWithAes128CbcSha256 => 0xc037,
            CipherSuite::EcdheEcdsaWithAes128CbcSha256 => 0xc023,
            CipherSuite::EcdheEcdsaWithAes128Ccm8 => 0xc0ae,
            CipherSuite::RsaWithAes256CbcSha => 0x0035,
        }
    }

    pub fn from_u16(v: u16) -> Option<Self> {
        Some(match v {
            0x00ae => CipherSuite::PskWithAes128CbcSha256,
            0xc0a8 => CipherSuite::PskWithAes128Ccm8,
            0xc037 => CipherSuite::EcdhePskWithAes128CbcSha256,
            0xc023 => CipherSuite::EcdheEcdsaWithAes128CbcSha256,
            0xc0ae => CipherSuite::EcdheEcdsaWithAes128Ccm8,
            0x0035 => CipherSuite::RsaWithAes256CbcSha,
            _ => return None,
        })
    }

    /// The key-exchange shape this suite negotiates (a "tagged selector"
    /// in place of dynamic dispatch over signer/cipher variants).
    pub fn key_exchange_kind(self) -> KeyExchangeKind {
        match self {
            CipherSuite::PskWithAes128CbcSha256 | CipherSuite::PskWithAes128Ccm8 => {
                KeyExchangeKind::Psk
            }
            CipherSuite::EcdhePskWithAes128CbcSha256 => KeyExchangeKind::EcdhePsk,
            CipherSuite::EcdheEcdsaWithAes128CbcSha256
            | CipherSuite::EcdheEcdsaWithAes128Ccm8 => KeyExchangeKind::EcdheEcdsa,
            CipherSuite::RsaWithAes256CbcSha => KeyExchangeKind::Rsa,
        }
    }

    pub fn is_aead(self) -> bool {
        matches!(self, CipherSuite::PskWithAes128Ccm8 | CipherSuite::EcdheEcdsaWithAes128Ccm8)
    }

    pub fn enc_key_len(self) -> usize {
        match self {
            CipherSuite::RsaWithAes256CbcSha => 32,
            _ => 16,
        }
    }

    pub fn mac_key_len(self) -> usize {
        if self.is_aead() {
            0
        } else {
            32
        }
    }

    pub fn fixed_iv_len(self) -> usize {
        if self.is_aead() {
            4
        } else {
            0
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyExchangeKind {
    Psk,
    EcdhePsk,
    EcdheEcdsa,
    Rsa,
}

/// The concrete primitives a negotiated suite needs, supplied by the
/// caller (AES/HMAC implementations are out of scope). Analogous to
/// a `CipherSuiteTLS12 { aead, nonce_gen, hasher_factory }` shape.
pub struct SuiteMaterial {
    pub aead: Option<Arc<dyn Aead>>,
    pub cbc: Option<Arc<dyn CbcCipher>>,
    pub hmac: Arc<dyn Hmac>,
}

impl SuiteMaterial {
    pub fn build_cipher_spec(
        &self,
        suite: CipherSuite,
        mac_key: &[u8],
        enc_key: &[u8],
        fixed_iv: &[u8],
    ) -> Result<CipherEndpointSpec> {
        if suite.is_aead() {
            let aead = self.aead.clone().ok_or_else(|| Error::new(ErrorKind::InternalError))?;
            Ok(CipherEndpointSpec::Aead {
                key: enc_key.to_vec().into(),
                implicit_iv: fixed_iv.to_vec().into(),
                aead,
                nonce_gen: Box::new(AeadNonceGenerator),
            })
        } else {
            let cbc = self.cbc.clone().ok_or_else(|| Error::new(ErrorKind::InternalError))?;
            Ok(CipherEndpointSpec::Cbc {
                mac_key: mac_key.to_vec().into(),
                enc_key: enc_key.to_vec().into(),
                cipher: cbc,
                hmac: self.hmac.clone(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_suite_ids() {
        let suites = [
            CipherSuite::PskWithAes128CbcSha256,
            CipherSuite::PskWithAes128Ccm8,
            CipherSuite::EcdhePskWithAes128CbcSha256,
            CipherSuite::EcdheEcdsaWithAes128CbcSha256,
            CipherSuite::EcdheEcdsaWithAes128Ccm8,
            CipherSuite::RsaWithAes256CbcSha,
        ];
        for suite in suites {
            assert_eq!(CipherSuite::from_u16(suite.to_u16()), Some(suite));
        }
    }

    #[test]
    fn only_ccm8_suites_are_aead() {
        assert!(CipherSuite::PskWithAes128Ccm8.is_aead());
        assert!(CipherSuite::EcdheEcdsaWithAes128Ccm8.is_aead());
        assert!(!CipherSuite::PskWithAes128CbcSha256.is_aead());
    }
}
