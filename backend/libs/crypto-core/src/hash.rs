use sha2::{Digest, Sha256};

/// Compute SHA256 hash of input bytes
pub fn sha256(input: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(input);
    hasher.finalize().into()
}

/// Hex-encoded SHA-256 of a raw token.
///
/// Revocation entries are keyed by this value so the bearer secret itself is
/// never written to a store.
pub fn fingerprint(token: &str) -> String {
    hex::encode(sha256(token.as_bytes()))
}
