//! Executes page requests against a `JobSource` and feeds the results back
//! into a `FeedController` on the caller's event loop.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::{AbortHandle, JoinError, JoinSet};
use tracing::{debug, error};

use crate::error::FeedError;
use crate::feed::{Delivery, FeedController, PageRequest};
use crate::models::JobPosting;
use crate::source::JobSource;

type PageResult = (PageRequest, Result<Vec<JobPosting>, FeedError>);

pub struct FeedDriver {
    source: Arc<dyn JobSource>,
    tasks: JoinSet<PageResult>,
    handles: Vec<(u64, AbortHandle)>,
}

impl FeedDriver {
    pub fn new(source: Arc<dyn JobSource>) -> Self {
        Self {
            source,
            tasks: JoinSet::new(),
            handles: Vec::new(),
        }
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Run `request` on the blocking pool. Tasks issued under an older
    /// generation are aborted; their results would be discarded anyway.
    ///
    /// Must be called from within a tokio runtime.
    pub fn dispatch(&mut self, request: Option<PageRequest>) {
        let Some(request) = request else { return };

        self.handles.retain(|(generation, handle)| {
            if *generation < request.generation {
                handle.abort();
                false
            } else {
                !handle.is_finished()
            }
        });

        let source = Arc::clone(&self.source);
        let generation = request.generation;
        let handle = self.tasks.spawn_blocking(move || {
            let query = request.query();
            let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
                source.fetch_page(&query, request.offset, request.limit)
            }))
            .unwrap_or_else(|_| Err(FeedError::Backend("job source panicked".to_string())));
            (request, result)
        });
        self.handles.push((generation, handle));
    }

    /// Wait for the next fetch to finish and apply it. Returns `None` once
    /// nothing is in flight.
    pub async fn next_delivery(&mut self, feed: &mut FeedController) -> Option<Delivery> {
        loop {
            let joined = self.tasks.join_next().await?;
            if let Some(delivery) = Self::deliver(joined, feed) {
                return Some(delivery);
            }
        }
    }

    /// Apply every fetch that has already finished, without waiting.
    pub fn drain_ready(&mut self, feed: &mut FeedController) -> usize {
        let mut applied = 0;
        while let Some(joined) = self.tasks.try_join_next() {
            if Self::deliver(joined, feed) == Some(Delivery::Applied) {
                applied += 1;
            }
        }
        applied
    }

    /// Wait until every in-flight fetch has been delivered or discarded.
    pub async fn settle(&mut self, feed: &mut FeedController) {
        while self.next_delivery(feed).await.is_some() {}
    }

    fn deliver(joined: Result<PageResult, JoinError>, feed: &mut FeedController) -> Option<Delivery> {
        match joined {
            Ok((request, Ok(items))) => Some(feed.on_page_arrived(&request, items)),
            Ok((request, Err(err))) => Some(feed.on_page_failed(&request, err)),
            Err(err) if err.is_cancelled() => {
                debug!("superseded fetch cancelled");
                None
            }
            Err(err) => {
                error!(error = %err, "fetch task failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::tests::posting;
    use crate::feed::FeedStatus;
    use crate::filters::{FilterCriteria, JobQuery};
    use crate::models::LocationType;
    use crate::source::testing::MemorySource;
    use std::sync::atomic::Ordering;
    use std::sync::{mpsc, Mutex};

    fn jobs(n: i64) -> Vec<JobPosting> {
        (1..=n)
            .map(|id| {
                let mut job = posting(id);
                job.created_at += chrono::Duration::minutes(id);
                if id % 2 == 0 {
                    job.location_type = LocationType::Remote;
                }
                job
            })
            .collect()
    }

    #[tokio::test]
    async fn test_pages_through_source() {
        let source = Arc::new(MemorySource::new(jobs(5)));
        let mut driver = FeedDriver::new(source.clone());
        let mut feed = FeedController::new(FilterCriteria::default(), 2).unwrap();

        driver.dispatch(feed.mount());
        driver.settle(&mut feed).await;
        while feed.has_more() {
            driver.dispatch(feed.load_more());
            driver.settle(&mut feed).await;
        }

        let ids: Vec<i64> = feed.items().iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![5, 4, 3, 2, 1]);
        assert_eq!(feed.status(), FeedStatus::Exhausted);
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_failure_then_retry_resumes_offset() {
        let source = Arc::new(MemorySource::new(jobs(5)));
        *source.fail_at.lock().unwrap() = Some(2);
        let mut driver = FeedDriver::new(source.clone());
        let mut feed = FeedController::new(FilterCriteria::default(), 2).unwrap();

        driver.dispatch(feed.mount());
        driver.settle(&mut feed).await;
        driver.dispatch(feed.load_more());
        driver.settle(&mut feed).await;
        assert_eq!(feed.status(), FeedStatus::Failed);
        assert_eq!(feed.offset(), 2);

        driver.dispatch(feed.load_more());
        driver.settle(&mut feed).await;
        let ids: Vec<i64> = feed.items().iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![5, 4, 3, 2]);
    }

    /// Holds unconstrained queries until released.
    struct GatedSource {
        inner: MemorySource,
        gate: Mutex<Option<mpsc::Receiver<()>>>,
    }

    impl JobSource for GatedSource {
        fn fetch_page(&self, query: &JobQuery, offset: usize, limit: usize) -> Result<Vec<JobPosting>, FeedError> {
            if query.is_unconstrained() {
                let gate = self.gate.lock().unwrap().take();
                if let Some(rx) = gate {
                    let _ = rx.recv();
                }
            }
            self.inner.fetch_page(query, offset, limit)
        }

        fn name(&self) -> &str {
            "gated"
        }
    }

    // The page for the old filters finishes after the one for the new filters
    #[tokio::test]
    async fn test_late_response_for_old_filters_is_dropped() {
        let (release, gate) = mpsc::channel();
        let source = Arc::new(GatedSource {
            inner: MemorySource::new(jobs(6)),
            gate: Mutex::new(Some(gate)),
        });
        let mut driver = FeedDriver::new(source);
        let mut feed = FeedController::new(FilterCriteria::default(), 10).unwrap();

        driver.dispatch(feed.mount());
        driver.dispatch(feed.set_filters(FilterCriteria::default().with_remote(true)));

        assert_eq!(driver.next_delivery(&mut feed).await, Some(Delivery::Applied));
        let ids: Vec<i64> = feed.items().iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![6, 4, 2]);

        release.send(()).unwrap();
        driver.settle(&mut feed).await;
        let ids: Vec<i64> = feed.items().iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![6, 4, 2]);
        assert_eq!(driver.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_drain_ready_without_completions() {
        let source = Arc::new(MemorySource::new(jobs(1)));
        let mut driver = FeedDriver::new(source);
        let mut feed = FeedController::new(FilterCriteria::default(), 2).unwrap();
        assert_eq!(driver.drain_ready(&mut feed), 0);
        assert_eq!(driver.next_delivery(&mut feed).await, None);
    }
}
