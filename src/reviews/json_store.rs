use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use tracing::{info, warn};

use super::{NewReview, Review, ReviewStats, ReviewStore, StoreError};

/// Reviews kept as one pretty-printed JSON array, rewritten on every add.
pub struct JsonFileStore {
    path: PathBuf,
    reviews: Mutex<Vec<Review>>,
}

impl JsonFileStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let reviews: Vec<Review> = match fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => Vec::new(),
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        info!("Loaded {} reviews from {}", reviews.len(), path.display());
        Ok(Self { path, reviews: Mutex::new(reviews) })
    }

    fn write_all(&self, reviews: &[Review]) -> io::Result<()> {
        let body = serde_json::to_vec_pretty(reviews)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &self.path)
    }
}

fn next_id(reviews: &[Review]) -> i64 {
    reviews.iter().map(|r| r.id).max().unwrap_or(0) + 1
}

impl ReviewStore for JsonFileStore {
    fn add_review(&self, review: NewReview) -> Result<Review, StoreError> {
        let mut reviews = self.reviews.lock().map_err(|_| StoreError::Poisoned)?;

        let id = next_id(&reviews);
        let review = review.into_review(id, Utc::now());
        reviews.push(review.clone());

        if let Err(source) = self.write_all(&reviews) {
            // Nothing is visible unless it reached the file.
            reviews.pop();
            warn!("Could not write {}: {source}", self.path.display());
            return Err(StoreError::Unpersisted { review: Box::new(review), source });
        }

        Ok(review)
    }

    fn keep_unpersisted(&self, review: Review) -> Result<(), StoreError> {
        let mut reviews = self.reviews.lock().map_err(|_| StoreError::Poisoned)?;
        if reviews.iter().any(|r| r.id == review.id) {
            return Ok(());
        }
        reviews.push(review);
        Ok(())
    }

    fn list_reviews(&self, limit: usize) -> Result<Vec<Review>, StoreError> {
        let reviews = self.reviews.lock().map_err(|_| StoreError::Poisoned)?;

        let mut newest: Vec<Review> = reviews.clone();
        newest.sort_by(|a, b| {
            b.submitted_at()
                .cmp(&a.submitted_at())
                .then(b.id.cmp(&a.id))
        });
        newest.truncate(limit);
        Ok(newest)
    }

    fn stats(&self) -> Result<ReviewStats, StoreError> {
        let reviews = self.reviews.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(ReviewStats::from_ratings(reviews.iter().map(|r| r.rating)))
    }

    fn has_recent_submission(
        &self,
        ip_hash: &str,
        window: chrono::Duration,
    ) -> Result<bool, StoreError> {
        let reviews = self.reviews.lock().map_err(|_| StoreError::Poisoned)?;
        let cutoff = Utc::now() - window;

        Ok(reviews
            .iter()
            .any(|r| r.ip_hash.as_deref() == Some(ip_hash) && r.submitted_at() >= cutoff))
    }

    fn backend(&self) -> &'static str {
        "json"
    }
}
