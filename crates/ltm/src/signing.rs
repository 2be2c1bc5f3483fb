//! Signing seam
//!
//! The engine signs `original_content` when a memory is written and verifies
//! it when memories are loaded. A failed check flags the memory as untrusted;
//! it is still returned.

use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;

use crate::error::{LtmError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Produces and checks opaque signatures over memory content
pub trait Signer {
    fn sign(&self, content: &str) -> Result<String>;

    fn verify(&self, content: &str, signature: &str) -> bool;
}

/// HMAC-SHA256 signer with hex-encoded output
pub struct HmacSigner {
    key: Vec<u8>,
}

impl HmacSigner {
    pub fn new(key: impl Into<Vec<u8>>) -> Result<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(LtmError::Config("signing key is empty".to_string()));
        }
        Ok(Self { key })
    }

    /// Read the key from an environment variable; `None` when unset or empty
    pub fn from_env(var: &str) -> Option<Self> {
        std::env::var(var)
            .ok()
            .filter(|key| !key.is_empty())
            .and_then(|key| Self::new(key.into_bytes()).ok())
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(&self.key).map_err(|e| LtmError::Config(e.to_string()))
    }
}

impl Signer for HmacSigner {
    fn sign(&self, content: &str) -> Result<String> {
        let mut mac = self.mac()?;
        mac.update(content.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn verify(&self, content: &str, signature: &str) -> bool {
        let Ok(expected) = hex::decode(signature) else {
            return false;
        };
        let Ok(mut mac) = self.mac() else {
            return false;
        };
        mac.update(content.as_bytes());
        mac.verify_slice(&expected).is_ok()
    }
}

/// Trust state of a loaded memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Trust {
    /// Signature present and valid
    Verified,
    /// No signature, or no signer to check it with
    Unchecked,
    /// Signature present but does not match
    Untrusted,
}

/// Check a memory's signature; missing signatures or signers are not failures
pub fn check(signer: Option<&dyn Signer>, content: &str, signature: Option<&str>) -> Trust {
    match (signer, signature) {
        (Some(signer), Some(signature)) => {
            if signer.verify(content, signature) {
                Trust::Verified
            } else {
                Trust::Untrusted
            }
        }
        _ => Trust::Unchecked,
    }
}
