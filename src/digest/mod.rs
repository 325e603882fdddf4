//! Salted, iterated hashing over the standard digest families.
//!
//! Every hash is built in three steps:
//!
//! 1. the input is wrapped as `salt + text + reverse(salt)` when a salt is in play,
//! 2. optionally a millisecond timestamp and a random hex suffix are appended,
//! 3. the result is hashed `iterations` times; between rounds the previous hex
//!    digest receives a three character entropy suffix.
//!
//! With timestamps off the entropy suffix is the zero padded round index, so a
//! fixed salt always reproduces the same digest. With timestamps on it mixes in
//! the wall clock and the output is intentionally unique per call.

mod algorithm;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{Local, NaiveDateTime};
use rand::RngCore;
use serde::Serialize;
use thiserror::Error;

use crate::utils::text::reverse;

pub use algorithm::{Algorithm, AlgorithmInfo};

pub const MIN_ITERATIONS: u32 = 1;
pub const MAX_ITERATIONS: u32 = 10;
pub const DEFAULT_ITERATIONS: u32 = 5;

pub const MIN_SALT_BYTES: usize = 8;
pub const MAX_SALT_BYTES: usize = 128;
pub const DEFAULT_SALT_BYTES: usize = 32;

/// Upper bound for caller supplied salts, in characters.
pub const MAX_EXPLICIT_SALT_CHARS: usize = 256;

const RANDOM_SUFFIX_BYTES: usize = 8;
const ENTROPY_CHARS: usize = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DigestError {
    #[error("Unsupported algorithm '{0}'")]
    InvalidAlgorithm(String),
    #[error("{0}")]
    InvalidInput(String),
}

#[derive(Debug, Clone)]
pub struct HashOptions {
    pub salt: Option<String>,
    pub iterations: u32,
    pub include_timestamp: bool,
    pub auto_salt: bool,
}

impl Default for HashOptions {
    fn default() -> Self {
        Self {
            salt: None,
            iterations: DEFAULT_ITERATIONS,
            include_timestamp: true,
            auto_salt: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HashResult {
    pub hash: String,
    pub algorithm: String,
    pub salt: Option<String>,
    pub iterations: u32,
    pub original_length: usize,
    pub hash_length: usize,
    pub timestamp: NaiveDateTime,
    pub algorithm_info: AlgorithmInfo,
}

#[derive(Debug, Default)]
pub struct DigestEngine {
    hashes_generated: AtomicU64,
}

impl DigestEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Random salt of `bytes` bytes, hex encoded.
    pub fn generate_salt(&self, bytes: usize) -> Result<String, DigestError> {
        if !(MIN_SALT_BYTES..=MAX_SALT_BYTES).contains(&bytes) {
            return Err(DigestError::InvalidInput(format!(
                "Salt length must be between {MIN_SALT_BYTES} and {MAX_SALT_BYTES}"
            )));
        }
        Ok(random_hex(bytes))
    }

    pub fn compute_hash(
        &self,
        text: &str,
        algorithm: &str,
        options: &HashOptions,
    ) -> Result<HashResult, DigestError> {
        let algorithm: Algorithm = algorithm.parse()?;
        validate_options(options)?;
        let salt = self.resolve_salt(options);
        Ok(self.hash_with(text, algorithm, salt, options))
    }

    /// Hashes `text` with every supported algorithm. A generated salt is shared
    /// across all of them so the outputs stay comparable.
    pub fn compute_all_hashes(
        &self,
        text: &str,
        options: &HashOptions,
    ) -> Result<BTreeMap<&'static str, HashResult>, DigestError> {
        validate_options(options)?;
        let salt = self.resolve_salt(options);

        Ok(Algorithm::ALL
            .into_iter()
            .map(|alg| (alg.name(), self.hash_with(text, alg, salt.clone(), options)))
            .collect())
    }

    pub fn hashes_generated(&self) -> u64 {
        self.hashes_generated.load(Ordering::Relaxed)
    }

    fn resolve_salt(&self, options: &HashOptions) -> Option<String> {
        match options.salt.as_deref() {
            Some(salt) if !salt.is_empty() => Some(salt.to_string()),
            _ if options.auto_salt => Some(random_hex(DEFAULT_SALT_BYTES)),
            _ => None,
        }
    }

    fn hash_with(
        &self,
        text: &str,
        algorithm: Algorithm,
        salt: Option<String>,
        options: &HashOptions,
    ) -> HashResult {
        let composite = composite_input(text, salt.as_deref(), options.include_timestamp);
        let hash = iterate(algorithm, composite, options.iterations, options.include_timestamp);
        self.hashes_generated.fetch_add(1, Ordering::Relaxed);

        HashResult {
            hash_length: hash.len(),
            hash,
            algorithm: algorithm.name().to_ascii_uppercase(),
            salt,
            iterations: options.iterations,
            original_length: text.chars().count(),
            timestamp: Local::now().naive_local(),
            algorithm_info: algorithm.info(),
        }
    }
}

fn validate_options(options: &HashOptions) -> Result<(), DigestError> {
    if !(MIN_ITERATIONS..=MAX_ITERATIONS).contains(&options.iterations) {
        return Err(DigestError::InvalidInput(format!(
            "Iterations must be between {MIN_ITERATIONS} and {MAX_ITERATIONS}"
        )));
    }
    if let Some(salt) = &options.salt {
        if salt.chars().count() > MAX_EXPLICIT_SALT_CHARS {
            return Err(DigestError::InvalidInput(format!(
                "Salt must be at most {MAX_EXPLICIT_SALT_CHARS} characters"
            )));
        }
    }
    Ok(())
}

fn composite_input(text: &str, salt: Option<&str>, include_timestamp: bool) -> String {
    let mut input = match salt {
        Some(salt) => format!("{salt}{text}{}", reverse(salt)),
        None => text.to_string(),
    };

    if include_timestamp {
        input.push_str(&unix_millis().to_string());
        input.push_str(&random_hex(RANDOM_SUFFIX_BYTES));
    }

    input
}

fn iterate(algorithm: Algorithm, input: String, iterations: u32, timestamped: bool) -> String {
    let mut current = input.into_bytes();
    let mut digest = String::new();

    for round in 0..iterations {
        digest = algorithm.hex_digest(&current);
        if round + 1 < iterations {
            current = format!("{digest}{}", round_entropy(round, timestamped)).into_bytes();
        }
    }

    digest
}

fn round_entropy(round: u32, timestamped: bool) -> String {
    let raw = if timestamped {
        format!("{round}{}", unix_millis() / 1000)
    } else {
        format!("{round:03}")
    };
    let skip = raw.len().saturating_sub(ENTROPY_CHARS);
    raw[skip..].to_string()
}

fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}
