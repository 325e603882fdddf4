use sha2::{Digest, Sha256};

/// Salted SHA-256 of a client address, so throttling never needs the raw IP.
pub fn hash_ip(ip: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ip.as_bytes());
    hasher.update(salt.as_bytes());
    format!("{:x}", hasher.finalize())
}
