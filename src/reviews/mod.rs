//! Visitor reviews: the record types, the `ReviewStore` seam with its JSON file
//! and SQLite backends, and the `ReviewService` that the HTTP layer talks to.

pub mod json_store;
pub mod service;
pub mod sqlite_store;

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{ReviewBackend, ReviewConfig};
use crate::utils::time::{display_timestamp, local_naive, local_to_utc};

pub use json_store::JsonFileStore;
pub use service::{ReviewError, ReviewService, ReviewSubmission};
pub use sqlite_store::SqliteStore;

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;
pub const MAX_NAME_CHARS: usize = 50;
pub const MAX_COMMENT_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: i64,
    pub name: String,
    pub rating: u8,
    pub comment: String,
    pub date: NaiveDateTime,
    #[serde(rename = "timestamp")]
    pub display_timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_hash: Option<String>,
    /// Absolute submission instant. Older files only carry the local `date`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// A validated review that has not been given an id yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReview {
    pub name: String,
    pub rating: u8,
    pub comment: String,
    pub ip_hash: Option<String>,
}

impl NewReview {
    pub fn into_review(self, id: i64, created_at: DateTime<Utc>) -> Review {
        let date = local_naive(&created_at);
        Review {
            id,
            name: self.name,
            rating: self.rating,
            comment: self.comment,
            display_timestamp: display_timestamp(&date),
            date,
            ip_hash: self.ip_hash,
            created_at: Some(created_at),
        }
    }
}

/// The client-facing shape of a review; the ip hash never leaves the server.
#[derive(Debug, Serialize)]
pub struct PublicReview<'a> {
    pub id: i64,
    pub name: &'a str,
    pub rating: u8,
    pub comment: &'a str,
    pub date: &'a NaiveDateTime,
    pub timestamp: &'a str,
}

impl Review {
    /// Instant used for ordering and throttling.
    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.created_at.unwrap_or_else(|| local_to_utc(&self.date))
    }

    pub fn public(&self) -> PublicReview<'_> {
        PublicReview {
            id: self.id,
            name: &self.name,
            rating: self.rating,
            comment: &self.comment,
            date: &self.date,
            timestamp: &self.display_timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewStats {
    pub total: usize,
    pub average_rating: f64,
    pub distribution: BTreeMap<u8, usize>,
}

impl ReviewStats {
    pub fn from_ratings(ratings: impl IntoIterator<Item = u8>) -> Self {
        Self::from_counts(ratings.into_iter().map(|r| (r, 1)))
    }

    /// Builds stats from `(rating, count)` pairs; ratings outside 1..=5 are ignored.
    pub fn from_counts(counts: impl IntoIterator<Item = (u8, usize)>) -> Self {
        let mut distribution: BTreeMap<u8, usize> =
            (MIN_RATING..=MAX_RATING).map(|r| (r, 0)).collect();
        for (rating, count) in counts {
            if let Some(slot) = distribution.get_mut(&rating) {
                *slot += count;
            }
        }

        let total: usize = distribution.values().sum();
        let sum: usize = distribution.iter().map(|(r, c)| usize::from(*r) * c).sum();
        let average_rating = if total == 0 {
            0.0
        } else {
            (sum as f64 / total as f64 * 10.0).round() / 10.0
        };

        Self { total, average_rating, distribution }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed review data: {0}")]
    Json(#[from] serde_json::Error),
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("review {} could not be written: {source}", .review.id)]
    Unpersisted {
        review: Box<Review>,
        #[source]
        source: io::Error,
    },
    #[error("review store lock poisoned")]
    Poisoned,
}

pub trait ReviewStore: Send + Sync {
    /// Assigns the next id and a timestamp, then persists the review.
    fn add_review(&self, review: NewReview) -> Result<Review, StoreError>;

    /// Newest first, at most `limit` entries.
    fn list_reviews(&self, limit: usize) -> Result<Vec<Review>, StoreError>;

    fn stats(&self) -> Result<ReviewStats, StoreError>;

    fn has_recent_submission(
        &self,
        ip_hash: &str,
        window: chrono::Duration,
    ) -> Result<bool, StoreError>;

    /// Takes back a review whose write failed so it is served from memory.
    /// Only stores that can return `StoreError::Unpersisted` need this.
    fn keep_unpersisted(&self, _review: Review) -> Result<(), StoreError> {
        Ok(())
    }

    fn backend(&self) -> &'static str;
}

pub fn open_store(config: &ReviewConfig) -> Result<Arc<dyn ReviewStore>, StoreError> {
    Ok(match config.backend {
        ReviewBackend::Json => Arc::new(JsonFileStore::open(&config.json_path)?),
        ReviewBackend::Sqlite => Arc::new(SqliteStore::open(&config.sqlite_path)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_over_one_of_each_rating() {
        let stats = ReviewStats::from_ratings([1, 2, 3, 4, 5]);
        assert_eq!(stats.total, 5);
        assert_eq!(stats.average_rating, 3.0);
        assert!(stats.distribution.values().all(|c| *c == 1));
    }

    #[test]
    fn stats_round_to_one_decimal() {
        let stats = ReviewStats::from_ratings([5, 4, 4]);
        assert_eq!(stats.average_rating, 4.3);
        assert_eq!(stats.distribution[&4], 2);
        assert_eq!(stats.distribution[&1], 0);
    }

    #[test]
    fn empty_stats_have_full_zeroed_histogram() {
        let stats = ReviewStats::from_ratings([]);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.average_rating, 0.0);
        assert_eq!(stats.distribution.len(), 5);
    }

    #[test]
    fn distribution_serializes_with_string_keys() {
        let json = serde_json::to_value(ReviewStats::from_ratings([2])).unwrap();
        assert_eq!(json["distribution"]["2"], 1);
        assert_eq!(json["distribution"]["5"], 0);
    }

    #[test]
    fn public_view_hides_ip_hash() {
        let review = NewReview {
            name: "Ada".into(),
            rating: 4,
            comment: "Handy".into(),
            ip_hash: Some("abc".into()),
        }
        .into_review(1, Utc::now());

        let json = serde_json::to_value(review.public()).unwrap();
        assert!(json.get("ip_hash").is_none());
        assert_eq!(json["timestamp"], review.display_timestamp.as_str());
    }

    #[test]
    fn reads_records_without_ip_hash() {
        let raw = r#"[{"id":1,"name":"Bo","rating":5,"comment":"ok","date":"2024-05-01T10:00:00.123456","timestamp":"01/05/2024 at 10:00"}]"#;
        let reviews: Vec<Review> = serde_json::from_str(raw).unwrap();
        assert_eq!(reviews[0].ip_hash, None);
        assert_eq!(reviews[0].display_timestamp, "01/05/2024 at 10:00");
        assert_eq!(reviews[0].created_at, None);
        assert_eq!(reviews[0].submitted_at(), local_to_utc(&reviews[0].date));
    }
}
