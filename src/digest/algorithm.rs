use std::fmt;
use std::str::FromStr;

use md5::Md5;
use serde::Serialize;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};

use super::DigestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Algorithm {
    Md5,
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

/// Descriptive metadata shown next to each hash in the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AlgorithmInfo {
    pub bits: u32,
    pub security: &'static str,
    pub color: &'static str,
}

impl Algorithm {
    pub const ALL: [Algorithm; 5] = [
        Algorithm::Md5,
        Algorithm::Sha1,
        Algorithm::Sha256,
        Algorithm::Sha384,
        Algorithm::Sha512,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Algorithm::Md5 => "md5",
            Algorithm::Sha1 => "sha1",
            Algorithm::Sha256 => "sha256",
            Algorithm::Sha384 => "sha384",
            Algorithm::Sha512 => "sha512",
        }
    }

    pub fn info(self) -> AlgorithmInfo {
        let (bits, security, color) = match self {
            Algorithm::Md5 => (128, "Low", "danger"),
            Algorithm::Sha1 => (160, "Deprecated", "warning"),
            Algorithm::Sha256 => (256, "High", "success"),
            Algorithm::Sha384 => (384, "Very High", "info"),
            Algorithm::Sha512 => (512, "Maximum", "primary"),
        };
        AlgorithmInfo { bits, security, color }
    }

    /// Length of a digest once hex-encoded.
    pub fn hex_len(self) -> usize {
        self.info().bits as usize / 4
    }

    pub fn hex_digest(self, data: &[u8]) -> String {
        match self {
            Algorithm::Md5 => hex_digest::<Md5>(data),
            Algorithm::Sha1 => hex_digest::<Sha1>(data),
            Algorithm::Sha256 => hex_digest::<Sha256>(data),
            Algorithm::Sha384 => hex_digest::<Sha384>(data),
            Algorithm::Sha512 => hex_digest::<Sha512>(data),
        }
    }
}

fn hex_digest<D: Digest>(data: &[u8]) -> String {
    let mut hasher = D::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

impl FromStr for Algorithm {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Algorithm::ALL
            .into_iter()
            .find(|alg| alg.name() == wanted)
            .ok_or_else(|| DigestError::InvalidAlgorithm(s.to_string()))
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
