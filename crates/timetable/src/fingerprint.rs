//! Content fingerprint of a downloaded spreadsheet.

use sha2::{Digest, Sha256};

/// Returns the lowercase hex SHA-256 digest of `bytes`.
///
/// Identical bytes always produce the same fingerprint, which is what the
/// sync pipeline compares against the active snapshot to skip re-parsing.
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(&hasher.finalize())
}

mod hex {
    pub fn encode(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }
}
