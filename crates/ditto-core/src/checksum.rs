//! Checksums and fingerprints.
//!
//! - `crc32`: the CRC-32 (IEEE) stored in every entry header.
//! - `Fingerprint`: SHA-256 over a whole archive buffer, used by the
//!   verifier. Never CRC-32, so the verifier's own check cannot collide with
//!   the per-entry checksums it is validating.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// CRC-32 (IEEE 802.3 polynomial) of `bytes`.
pub fn crc32(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes)
}

/// SHA-256 content fingerprint of an archive buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(bytes: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(bytes)))
    }

    /// Lowercase hex digest.
    pub fn hex(&self) -> &str {
        &self.0
    }

    /// `sha256:<hex>`, the form used in reports and pinned configs.
    pub fn prefixed(&self) -> String {
        format!("sha256:{}", self.0)
    }

    /// Compare against a pinned value given either bare or `sha256:`-prefixed.
    pub fn matches(&self, pinned: &str) -> bool {
        let pinned = pinned.trim();
        pinned
            .strip_prefix("sha256:")
            .unwrap_or(pinned)
            .eq_ignore_ascii_case(&self.0)
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
