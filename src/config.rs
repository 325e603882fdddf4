use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::{info, warn};

/// Which backend keeps the reviews.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewBackend {
    Json,
    Sqlite,
}

impl FromStr for ReviewBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ReviewBackend::Json),
            "sqlite" => Ok(ReviewBackend::Sqlite),
            other => Err(format!("unknown review backend '{other}'")),
        }
    }
}

/// What to do when a review was accepted but could not be written to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistencePolicy {
    /// Report the failure to the client as a 500.
    Strict,
    /// Log it and answer as if the write had succeeded.
    Lenient,
}

impl FromStr for PersistencePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(PersistencePolicy::Strict),
            "lenient" => Ok(PersistencePolicy::Lenient),
            other => Err(format!("unknown persistence policy '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub max_connections: usize,
    pub rate_limit_per_sec: usize,
    pub read_timeout: Duration,
    pub max_body_bytes: usize,
    pub trust_forwarded_for: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".into(),
            max_connections: 64,
            rate_limit_per_sec: 200,
            read_timeout: Duration::from_secs(10),
            max_body_bytes: 64 * 1024,
            trust_forwarded_for: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReviewConfig {
    pub backend: ReviewBackend,
    pub json_path: PathBuf,
    pub sqlite_path: PathBuf,
    /// Zero disables the per-IP throttle.
    pub throttle_hours: u32,
    pub persistence: PersistencePolicy,
    pub ip_hash_salt: String,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            backend: ReviewBackend::Json,
            json_path: PathBuf::from("reviews.json"),
            sqlite_path: PathBuf::from("reviews.db"),
            throttle_hours: 1,
            persistence: PersistencePolicy::Strict,
            ip_hash_salt: "hash-review-server".into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub reviews: ReviewConfig,
    pub hash_workers: usize,
}

impl AppConfig {
    /// Reads the process environment (after `.env` has been loaded) and
    /// falls back to defaults for anything missing or malformed.
    pub fn from_env() -> Self {
        let server_defaults = ServerConfig::default();
        let review_defaults = ReviewConfig::default();

        let bind_addr = match (env::var("BIND_ADDRESS"), env::var("PORT")) {
            (Ok(addr), _) => addr,
            (Err(_), Ok(port)) => format!("0.0.0.0:{}", port.trim()),
            _ => server_defaults.bind_addr.clone(),
        };

        let server = ServerConfig {
            bind_addr,
            max_connections: try_load("MAX_CONNECTIONS", server_defaults.max_connections),
            rate_limit_per_sec: try_load("RATE_LIMIT_PER_SEC", server_defaults.rate_limit_per_sec),
            read_timeout: Duration::from_secs(try_load(
                "REQUEST_TIMEOUT_SECS",
                server_defaults.read_timeout.as_secs(),
            )),
            max_body_bytes: try_load("MAX_BODY_BYTES", server_defaults.max_body_bytes),
            trust_forwarded_for: try_load(
                "TRUST_FORWARDED_FOR",
                server_defaults.trust_forwarded_for,
            ),
        };

        let reviews = ReviewConfig {
            backend: try_load("REVIEW_BACKEND", review_defaults.backend),
            json_path: env::var("REVIEWS_FILE")
                .map(PathBuf::from)
                .unwrap_or(review_defaults.json_path),
            sqlite_path: env::var("REVIEWS_DB")
                .map(PathBuf::from)
                .unwrap_or(review_defaults.sqlite_path),
            throttle_hours: try_load("REVIEW_THROTTLE_HOURS", review_defaults.throttle_hours),
            persistence: try_load("REVIEW_PERSISTENCE", review_defaults.persistence),
            ip_hash_salt: env::var("IP_HASH_SALT").unwrap_or_else(|_| {
                warn!("IP_HASH_SALT not set, using the built-in salt");
                review_defaults.ip_hash_salt
            }),
        };

        let hash_workers = try_load::<usize>("HASH_WORKERS", 4).max(1);

        Self { server, reviews, hash_workers }
    }
}

fn try_load<T>(key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|e| {
            warn!("Invalid {key} value '{raw}': {e}, using default {default:?}");
            default
        }),
        Err(_) => {
            info!("{key} not set, using default {default:?}");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_backend_names() {
        assert_eq!("JSON".parse::<ReviewBackend>(), Ok(ReviewBackend::Json));
        assert_eq!(" sqlite ".parse::<ReviewBackend>(), Ok(ReviewBackend::Sqlite));
        assert!("postgres".parse::<ReviewBackend>().is_err());
    }

    #[test]
    fn parses_persistence_policy() {
        assert_eq!("lenient".parse::<PersistencePolicy>(), Ok(PersistencePolicy::Lenient));
        assert_eq!("Strict".parse::<PersistencePolicy>(), Ok(PersistencePolicy::Strict));
        assert!("maybe".parse::<PersistencePolicy>().is_err());
    }

    #[test]
    fn malformed_values_fall_back_to_default() {
        env::set_var("HRS_TEST_MALFORMED_NUMBER", "many");
        assert_eq!(try_load("HRS_TEST_MALFORMED_NUMBER", 7usize), 7);
        env::set_var("HRS_TEST_GOOD_NUMBER", " 12 ");
        assert_eq!(try_load("HRS_TEST_GOOD_NUMBER", 7usize), 12);
        assert_eq!(try_load("HRS_TEST_MISSING_NUMBER", 3u32), 3);
    }
}
