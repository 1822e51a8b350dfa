//! Content digest used as the deduplication key

use sha2::{Digest, Sha256};

/// Length of a hex-encoded SHA-256 digest
pub const DIGEST_HEX_LEN: usize = 64;

/// Calculate the SHA-256 digest of `data` as lowercase hex
pub fn digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
