use std::sync::Arc;
use std::time::Instant;

use crate::config::AppConfig;
use crate::digest::DigestEngine;
use crate::reviews::{self, ReviewService, StoreError};
use crate::worker_pool::ThreadPool;

/// Services shared by every request handler.
pub struct AppState {
    pub digest: Arc<DigestEngine>,
    pub reviews: Arc<ReviewService>,
    pub hash_pool: ThreadPool,
    pub trust_forwarded_for: bool,
    pub started_at: Instant,
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("review store: {0}")]
    Store(#[from] StoreError),
    #[error("worker pool: {0}")]
    Pool(#[from] std::io::Error),
}

impl AppState {
    pub fn new(
        digest: DigestEngine,
        reviews: ReviewService,
        hash_pool: ThreadPool,
        trust_forwarded_for: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            digest: Arc::new(digest),
            reviews: Arc::new(reviews),
            hash_pool,
            trust_forwarded_for,
            started_at: Instant::now(),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Arc<Self>, StartupError> {
        let store = reviews::open_store(&config.reviews)?;
        let review_service = ReviewService::new(store, &config.reviews);
        let hash_pool = ThreadPool::new("hash", config.hash_workers)?;

        Ok(Self::new(
            DigestEngine::new(),
            review_service,
            hash_pool,
            config.server.trust_forwarded_for,
        ))
    }
}
