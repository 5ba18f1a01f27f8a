use std::sync::Mutex;

use crate::db::Database;
use crate::error::FeedError;
use crate::filters::JobQuery;
use crate::models::JobPosting;

/// A paginated, filterable collection of job postings.
///
/// Implementations return at most `limit` rows starting at `offset` under the
/// query's fixed ordering. No total count is available.
pub trait JobSource: Send + Sync {
    fn fetch_page(
        &self,
        query: &JobQuery,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<JobPosting>, FeedError>;

    fn name(&self) -> &str;
}

/// Local SQLite store as a job source.
pub struct SqliteSource {
    db: Mutex<Database>,
}

impl SqliteSource {
    pub fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }
}

impl JobSource for SqliteSource {
    fn fetch_page(
        &self,
        query: &JobQuery,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<JobPosting>, FeedError> {
        let db = self
            .db
            .lock()
            .map_err(|_| FeedError::Backend("database lock poisoned".to_string()))?;
        db.fetch_page(query, offset, limit)
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory source that applies queries the same way the backends do.
    pub(crate) struct MemorySource {
        jobs: Vec<JobPosting>,
        pub(crate) calls: AtomicUsize,
        pub(crate) fail_at: Mutex<Option<usize>>,
    }

    impl MemorySource {
        pub(crate) fn new(mut jobs: Vec<JobPosting>) -> Self {
            jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
            Self {
                jobs,
                calls: AtomicUsize::new(0),
                fail_at: Mutex::new(None),
            }
        }

        fn matches(query: &JobQuery, job: &JobPosting) -> bool {
            let contains = |hay: &str, needle: &str| hay.to_lowercase().contains(&needle.to_lowercase());
            if let Some(s) = &query.search {
                if !contains(&job.title, s) && !contains(&job.company_name, s) {
                    return false;
                }
            }
            if let Some(l) = &query.location {
                if !job.location.as_deref().is_some_and(|loc| contains(loc, l)) {
                    return false;
                }
            }
            if !query.job_types.is_empty() && !query.job_types.contains(&job.job_type) {
                return false;
            }
            if !query.location_types.is_empty() && !query.location_types.contains(&job.location_type) {
                return false;
            }
            true
        }
    }

    impl JobSource for MemorySource {
        fn fetch_page(
            &self,
            query: &JobQuery,
            offset: usize,
            limit: usize,
        ) -> Result<Vec<JobPosting>, FeedError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut fail_at = self.fail_at.lock().unwrap();
            if *fail_at == Some(offset) {
                *fail_at = None;
                return Err(FeedError::Backend("injected failure".to_string()));
            }
            Ok(self
                .jobs
                .iter()
                .filter(|job| Self::matches(query, job))
                .skip(offset)
                .take(limit)
                .cloned()
                .collect())
        }

        fn name(&self) -> &str {
            "memory"
        }
    }
}
