use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use tracing::info;

use super::{NewReview, Review, ReviewStats, ReviewStore, StoreError};
use crate::utils::time::{display_timestamp, local_naive};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS reviews (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    name       TEXT    NOT NULL,
    rating     INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
    comment    TEXT    NOT NULL,
    date       TEXT    NOT NULL,
    timestamp  TEXT    NOT NULL,
    created_at INTEGER NOT NULL,
    ip_hash    TEXT
);
CREATE INDEX IF NOT EXISTS idx_reviews_ip_created ON reviews (ip_hash, created_at);
";

/// Reviews in a single SQLite table. The connection mutex serializes writers,
/// and AUTOINCREMENT keeps ids monotonic even after deletes.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())?;
        info!("Opened review database {}", path.as_ref().display());
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

fn review_from_row(row: &Row<'_>) -> rusqlite::Result<Review> {
    Ok(Review {
        id: row.get(0)?,
        name: row.get(1)?,
        rating: row.get(2)?,
        comment: row.get(3)?,
        date: row.get(4)?,
        display_timestamp: row.get(5)?,
        ip_hash: row.get(6)?,
        created_at: DateTime::<Utc>::from_timestamp(row.get(7)?, 0),
    })
}

impl ReviewStore for SqliteStore {
    fn add_review(&self, review: NewReview) -> Result<Review, StoreError> {
        let conn = self.conn()?;
        let created_at = Utc::now();
        let date = local_naive(&created_at);

        conn.execute(
            "INSERT INTO reviews (name, rating, comment, date, timestamp, created_at, ip_hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                review.name,
                review.rating,
                review.comment,
                date,
                display_timestamp(&date),
                created_at.timestamp(),
                review.ip_hash,
            ],
        )?;

        Ok(review.into_review(conn.last_insert_rowid(), created_at))
    }

    fn list_reviews(&self, limit: usize) -> Result<Vec<Review>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, rating, comment, date, timestamp, ip_hash, created_at
             FROM reviews ORDER BY created_at DESC, id DESC LIMIT ?1",
        )?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![limit], review_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn stats(&self) -> Result<ReviewStats, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT rating, COUNT(*) FROM reviews GROUP BY rating")?;

        let counts = stmt
            .query_map([], |row| Ok((row.get::<_, u8>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(ReviewStats::from_counts(
            counts
                .into_iter()
                .map(|(rating, count)| (rating, usize::try_from(count).unwrap_or(0))),
        ))
    }

    fn has_recent_submission(
        &self,
        ip_hash: &str,
        window: chrono::Duration,
    ) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let cutoff = (Utc::now() - window).timestamp();

        let found = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM reviews WHERE ip_hash = ?1 AND created_at >= ?2)",
            params![ip_hash, cutoff],
            |row| row.get::<_, bool>(0),
        )?;
        Ok(found)
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn new_review(rating: u8, ip_hash: Option<&str>) -> NewReview {
        NewReview {
            name: "tester".into(),
            rating,
            comment: "works".into(),
            ip_hash: ip_hash.map(str::to_string),
        }
    }

    #[test]
    fn insert_assigns_increasing_ids() {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = store.add_review(new_review(5, None)).unwrap();
        let b = store.add_review(new_review(4, None)).unwrap();
        assert!(b.id > a.id);
    }

    #[test]
    fn lists_newest_first_with_limit() {
        let store = SqliteStore::open_in_memory().unwrap();
        for rating in [1, 2, 3] {
            store.add_review(new_review(rating, None)).unwrap();
        }

        let listed = store.list_reviews(2).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].rating, 3);
        assert_eq!(listed[1].rating, 2);
        assert_eq!(listed[0].name, "tester");
    }

    #[test]
    fn stats_cover_whole_table() {
        let store = SqliteStore::open_in_memory().unwrap();
        for rating in [1, 2, 3, 4, 5] {
            store.add_review(new_review(rating, None)).unwrap();
        }

        let stats = store.stats().unwrap();
        assert_eq!(stats.total, 5);
        assert_eq!(stats.average_rating, 3.0);
        assert!(stats.distribution.values().all(|c| *c == 1));
    }

    #[test]
    fn rating_out_of_range_violates_check() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(matches!(
            store.add_review(new_review(6, None)),
            Err(StoreError::Sqlite(_))
        ));
    }

    #[test]
    fn recent_submission_lookup() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.add_review(new_review(3, Some("hash-1"))).unwrap();

        let window = chrono::Duration::hours(24);
        assert!(store.has_recent_submission("hash-1", window).unwrap());
        assert!(!store.has_recent_submission("hash-2", window).unwrap());
    }

    #[test]
    fn concurrent_inserts_get_unique_increasing_ids() {
        const WRITERS: usize = 16;
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ReviewStore> =
            Arc::new(SqliteStore::open(dir.path().join("reviews.db")).unwrap());

        let handles: Vec<_> = (0..WRITERS)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    store.add_review(new_review((i % 5 + 1) as u8, None)).unwrap().id
                })
            })
            .collect();
        let mut ids: Vec<i64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        ids.sort();

        assert_eq!(ids, (1..=WRITERS as i64).collect::<Vec<_>>());
        assert_eq!(store.stats().unwrap().total, WRITERS);
    }

    #[test]
    fn listed_rows_carry_their_instant() {
        let store = SqliteStore::open_in_memory().unwrap();
        let saved = store.add_review(new_review(4, None)).unwrap();
        let listed = store.list_reviews(1).unwrap();
        assert_eq!(
            listed[0].created_at.map(|t| t.timestamp()),
            saved.created_at.map(|t| t.timestamp())
        );
    }

    #[test]
    fn file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reviews.db");

        SqliteStore::open(&path).unwrap().add_review(new_review(4, None)).unwrap();
        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.stats().unwrap().total, 1);
        assert_eq!(reopened.list_reviews(1).unwrap()[0].rating, 4);
    }
}
