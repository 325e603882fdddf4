use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{error, info, warn};

use super::{
    NewReview, Review, ReviewStats, ReviewStore, StoreError, MAX_COMMENT_CHARS, MAX_NAME_CHARS,
    MAX_RATING, MIN_RATING,
};
use crate::config::{PersistencePolicy, ReviewConfig};
use crate::utils::hash::hash_ip;

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("{0}")]
    Invalid(String),
    #[error("You already left a review recently, please try again later")]
    RateLimited,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Raw submission as received from a client, before trimming and validation.
#[derive(Debug, Clone)]
pub struct ReviewSubmission {
    pub name: String,
    pub rating: i64,
    pub comment: String,
    pub client_ip: Option<String>,
}

pub struct ReviewService {
    store: Arc<dyn ReviewStore>,
    throttle_window: Option<chrono::Duration>,
    persistence: PersistencePolicy,
    ip_hash_salt: String,
    // Held across the throttle check and the insert.
    submit_lock: Mutex<()>,
}

impl ReviewService {
    pub fn new(store: Arc<dyn ReviewStore>, config: &ReviewConfig) -> Self {
        let throttle_window = (config.throttle_hours > 0)
            .then(|| chrono::Duration::hours(i64::from(config.throttle_hours)));

        Self {
            store,
            throttle_window,
            persistence: config.persistence,
            ip_hash_salt: config.ip_hash_salt.clone(),
            submit_lock: Mutex::new(()),
        }
    }

    pub fn submit(&self, submission: ReviewSubmission) -> Result<Review, ReviewError> {
        let ip_hash = submission
            .client_ip
            .as_deref()
            .map(|ip| hash_ip(ip, &self.ip_hash_salt));
        let review = validate(submission, ip_hash)?;

        let _guard = self
            .submit_lock
            .lock()
            .map_err(|_| ReviewError::Store(StoreError::Poisoned))?;

        if let (Some(window), Some(ip_hash)) = (self.throttle_window, review.ip_hash.as_deref()) {
            if self.store.has_recent_submission(ip_hash, window)? {
                info!("Throttled repeat review from {}", &ip_hash[..12.min(ip_hash.len())]);
                return Err(ReviewError::RateLimited);
            }
        }

        match self.store.add_review(review) {
            Ok(saved) => {
                info!("Stored review {} ({} stars)", saved.id, saved.rating);
                Ok(saved)
            }
            Err(StoreError::Unpersisted { review, source })
                if self.persistence == PersistencePolicy::Lenient =>
            {
                warn!("Review {} accepted but not persisted: {source}", review.id);
                self.store.keep_unpersisted((*review).clone())?;
                Ok(*review)
            }
            Err(e) => {
                error!("Failed to store review: {e}");
                Err(e.into())
            }
        }
    }

    pub fn list(&self, limit: usize) -> Result<Vec<Review>, ReviewError> {
        Ok(self.store.list_reviews(limit)?)
    }

    pub fn stats(&self) -> Result<ReviewStats, ReviewError> {
        Ok(self.store.stats()?)
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }
}

fn validate(
    submission: ReviewSubmission,
    ip_hash: Option<String>,
) -> Result<NewReview, ReviewError> {
    let name = submission.name.trim();
    let comment = submission.comment.trim();

    let rating = u8::try_from(submission.rating)
        .ok()
        .filter(|r| (MIN_RATING..=MAX_RATING).contains(r));

    let Some(rating) = rating.filter(|_| !name.is_empty() && !comment.is_empty()) else {
        return Err(ReviewError::Invalid("Invalid review data".into()));
    };

    if name.chars().count() > MAX_NAME_CHARS {
        return Err(ReviewError::Invalid(format!(
            "Name too long (max {MAX_NAME_CHARS} characters)"
        )));
    }
    if comment.chars().count() > MAX_COMMENT_CHARS {
        return Err(ReviewError::Invalid(format!(
            "Comment too long (max {MAX_COMMENT_CHARS} characters)"
        )));
    }

    Ok(NewReview {
        name: name.to_string(),
        rating,
        comment: comment.to_string(),
        ip_hash,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    use crate::reviews::{JsonFileStore, SqliteStore};

    fn service(config: ReviewConfig) -> ReviewService {
        ReviewService::new(Arc::new(SqliteStore::open_in_memory().unwrap()), &config)
    }

    fn submission(rating: i64, ip: Option<&str>) -> ReviewSubmission {
        ReviewSubmission {
            name: "  Grace  ".into(),
            rating,
            comment: " Great tool ".into(),
            client_ip: ip.map(str::to_string),
        }
    }

    #[test]
    fn rejects_out_of_range_rating() {
        let svc = service(ReviewConfig::default());
        for rating in [0, 6, -1, 300] {
            assert!(matches!(svc.submit(submission(rating, None)), Err(ReviewError::Invalid(_))));
        }
    }

    #[test]
    fn accepted_review_is_trimmed_and_listed_first() {
        let svc = service(ReviewConfig::default());
        svc.submit(submission(5, None)).unwrap();
        let saved = svc.submit(submission(3, None)).unwrap();
        assert_eq!(saved.name, "Grace");
        assert_eq!(saved.comment, "Great tool");

        let listed = svc.list(50).unwrap();
        assert_eq!(listed[0].id, saved.id);
        assert_eq!(listed[0].rating, 3);
    }

    #[test]
    fn rejects_blank_and_oversized_fields() {
        let svc = service(ReviewConfig::default());

        let mut blank = submission(4, None);
        blank.name = "   ".into();
        assert!(matches!(svc.submit(blank), Err(ReviewError::Invalid(_))));

        let mut long_name = submission(4, None);
        long_name.name = "n".repeat(MAX_NAME_CHARS + 1);
        assert!(matches!(svc.submit(long_name), Err(ReviewError::Invalid(m)) if m.contains("Name")));

        let mut long_comment = submission(4, None);
        long_comment.comment = "c".repeat(MAX_COMMENT_CHARS + 1);
        assert!(matches!(svc.submit(long_comment), Err(ReviewError::Invalid(m)) if m.contains("Comment")));

        let mut exact = submission(4, None);
        exact.name = "n".repeat(MAX_NAME_CHARS);
        exact.comment = "é".repeat(MAX_COMMENT_CHARS);
        assert!(svc.submit(exact).is_ok());
    }

    #[test]
    fn second_review_from_same_ip_is_throttled() {
        let svc = service(ReviewConfig::default());
        svc.submit(submission(4, Some("192.0.2.7"))).unwrap();
        assert!(matches!(
            svc.submit(submission(5, Some("192.0.2.7"))),
            Err(ReviewError::RateLimited)
        ));
        assert!(svc.submit(submission(5, Some("192.0.2.8"))).is_ok());
    }

    #[test]
    fn zero_hours_disables_throttle() {
        let svc = service(ReviewConfig { throttle_hours: 0, ..ReviewConfig::default() });
        svc.submit(submission(4, Some("192.0.2.7"))).unwrap();
        assert!(svc.submit(submission(4, Some("192.0.2.7"))).is_ok());
    }

    #[test]
    fn stored_ip_is_hashed() {
        let svc = service(ReviewConfig::default());
        let saved = svc.submit(submission(4, Some("192.0.2.7"))).unwrap();
        let hash = saved.ip_hash.unwrap();
        assert!(!hash.contains("192.0.2.7"));
        assert_eq!(hash, hash_ip("192.0.2.7", &ReviewConfig::default().ip_hash_salt));
    }

    #[test]
    fn stats_after_each_rating_once() {
        let svc = service(ReviewConfig::default());
        for rating in 1..=5 {
            svc.submit(submission(rating, None)).unwrap();
        }
        let stats = svc.stats().unwrap();
        assert_eq!(stats.total, 5);
        assert_eq!(stats.average_rating, 3.0);
        assert_eq!(stats.distribution.values().copied().collect::<Vec<_>>(), vec![1, 1, 1, 1, 1]);
    }

    fn unwritable_json_service(policy: PersistencePolicy) -> (tempfile::TempDir, ReviewService) {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("gone");
        let store = JsonFileStore::open(sub.join("reviews.json")).unwrap();
        std::fs::remove_dir_all(&sub).unwrap();
        let config = ReviewConfig { persistence: policy, ..ReviewConfig::default() };
        (dir, ReviewService::new(Arc::new(store), &config))
    }

    #[test]
    fn strict_failure_is_all_or_nothing() {
        let (_dir, svc) = unwritable_json_service(PersistencePolicy::Strict);
        assert!(matches!(
            svc.submit(submission(4, Some("192.0.2.7"))),
            Err(ReviewError::Store(StoreError::Unpersisted { .. }))
        ));
        assert!(svc.list(50).unwrap().is_empty());
        assert_eq!(svc.stats().unwrap().total, 0);

        // The retry is not throttled by the failed attempt.
        assert!(matches!(
            svc.submit(submission(4, Some("192.0.2.7"))),
            Err(ReviewError::Store(StoreError::Unpersisted { .. }))
        ));
    }

    #[test]
    fn lenient_policy_reports_success_and_serves_from_memory() {
        let (_dir, svc) = unwritable_json_service(PersistencePolicy::Lenient);
        let saved = svc.submit(submission(4, Some("192.0.2.7"))).unwrap();
        assert_eq!(saved.id, 1);
        assert_eq!(svc.list(50).unwrap()[0].id, 1);
        assert!(matches!(
            svc.submit(submission(4, Some("192.0.2.7"))),
            Err(ReviewError::RateLimited)
        ));

        let second = svc.submit(submission(2, Some("192.0.2.8"))).unwrap();
        assert_eq!(second.id, 2);
        assert_eq!(svc.stats().unwrap().total, 2);
    }

    fn concurrent_distinct_ips(svc: Arc<ReviewService>) {
        const CLIENTS: u8 = 12;
        let handles: Vec<_> = (1..=CLIENTS)
            .map(|i| {
                let svc = Arc::clone(&svc);
                thread::spawn(move || {
                    let ip = format!("198.51.100.{i}");
                    svc.submit(submission(i64::from(i % 5 + 1), Some(ip.as_str()))).unwrap().id
                })
            })
            .collect();
        let mut ids: Vec<i64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        ids.sort();
        ids.dedup();

        assert_eq!(ids.len(), usize::from(CLIENTS));
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(svc.stats().unwrap().total, usize::from(CLIENTS));
    }

    #[test]
    fn concurrent_submissions_serialize_on_sqlite() {
        concurrent_distinct_ips(Arc::new(service(ReviewConfig::default())));
    }

    #[test]
    fn concurrent_submissions_serialize_on_json() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("reviews.json")).unwrap();
        let svc = ReviewService::new(Arc::new(store), &ReviewConfig::default());
        concurrent_distinct_ips(Arc::new(svc));
    }
}
