use tracing::trace;

use crate::feed::{FeedController, PageRequest};
use crate::models::JobPosting;

/// The rendered last row: its position in the list and the posting it shows.
///
/// Paging does not deduplicate, so the same posting can end two different
/// pages. The row index tells those renders apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sentinel {
    pub row: usize,
    pub id: i64,
}

/// Bridges "last item became visible" to `FeedController::load_more`.
///
/// Watches a single element, the row rendered last. Signals from any other
/// element are ignored, so a sentinel left behind by an earlier render cannot
/// trigger a load.
#[derive(Debug, Default)]
pub struct SentinelObserver {
    watched: Option<Sentinel>,
}

impl SentinelObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sentinel(&self) -> Option<Sentinel> {
        self.watched
    }

    /// Re-attach to the current last row. Returns true when the sentinel moved.
    pub fn retarget(&mut self, items: &[JobPosting]) -> bool {
        let next = items.last().map(|job| Sentinel {
            row: items.len() - 1,
            id: job.id,
        });
        if next == self.watched {
            return false;
        }
        if let Some(s) = next {
            trace!(row = s.row, id = s.id, "sentinel moved");
        } else {
            trace!("sentinel cleared");
        }
        self.watched = next;
        true
    }

    pub fn detach(&mut self) {
        self.watched = None;
    }

    pub fn intersect(&self, element: Sentinel, feed: &mut FeedController) -> Option<PageRequest> {
        if self.watched != Some(element) {
            return None;
        }
        feed.load_more()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::tests::posting;
    use crate::filters::FilterCriteria;

    fn at(row: usize, id: i64) -> Sentinel {
        Sentinel { row, id }
    }

    fn loaded_feed(ids: std::ops::RangeInclusive<i64>) -> FeedController {
        let mut feed = FeedController::new(FilterCriteria::default(), 2).unwrap();
        let req = feed.mount().unwrap();
        feed.on_page_arrived(&req, ids.map(posting).collect());
        feed
    }

    #[test]
    fn test_retarget_follows_last_item() {
        let mut observer = SentinelObserver::new();
        assert!(!observer.retarget(&[]));
        assert_eq!(observer.sentinel(), None);

        assert!(observer.retarget(&[posting(1), posting(2)]));
        assert_eq!(observer.sentinel(), Some(at(1, 2)));
        assert!(!observer.retarget(&[posting(1), posting(2)]));

        assert!(observer.retarget(&[posting(1), posting(2), posting(3)]));
        assert_eq!(observer.sentinel(), Some(at(2, 3)));

        observer.retarget(&[]);
        assert_eq!(observer.sentinel(), None);
    }

    #[test]
    fn test_repeated_intersections_issue_one_request() {
        let mut feed = loaded_feed(1..=2);
        let mut observer = SentinelObserver::new();
        observer.retarget(feed.items());

        let first = observer.intersect(at(1, 2), &mut feed);
        assert_eq!(first.map(|r| r.offset), Some(2));
        for _ in 0..5 {
            assert!(observer.intersect(at(1, 2), &mut feed).is_none());
        }
    }

    #[test]
    fn test_stale_sentinel_is_ignored() {
        let mut feed = loaded_feed(1..=2);
        let mut observer = SentinelObserver::new();
        observer.retarget(feed.items());

        let req = observer.intersect(at(1, 2), &mut feed).unwrap();
        feed.on_page_arrived(&req, vec![posting(3), posting(4)]);
        observer.retarget(feed.items());

        // Old last item scrolls back into view
        assert!(observer.intersect(at(1, 2), &mut feed).is_none());
        assert!(!feed.loading());
        assert!(observer.intersect(at(3, 4), &mut feed).is_some());
    }

    #[test]
    fn test_page_ending_with_same_posting_moves_sentinel() {
        // Postings inserted at the head shift the window, so page two repeats page one
        let mut feed = loaded_feed(1..=2);
        let mut observer = SentinelObserver::new();
        observer.retarget(feed.items());

        let req = observer.intersect(at(1, 2), &mut feed).unwrap();
        feed.on_page_arrived(&req, vec![posting(1), posting(2)]);
        assert!(feed.has_more());

        assert!(observer.retarget(feed.items()));
        assert_eq!(observer.sentinel(), Some(at(3, 2)));
        assert!(observer.intersect(at(1, 2), &mut feed).is_none());
        assert_eq!(observer.intersect(at(3, 2), &mut feed).map(|r| r.offset), Some(4));
    }

    #[test]
    fn test_exhausted_feed_ignores_sentinel() {
        let mut feed = FeedController::new(FilterCriteria::default(), 2).unwrap();
        let req = feed.mount().unwrap();
        feed.on_page_arrived(&req, vec![posting(1)]);
        let mut observer = SentinelObserver::new();
        observer.retarget(feed.items());
        assert!(observer.intersect(at(0, 1), &mut feed).is_none());
    }

    #[test]
    fn test_detach() {
        let mut feed = loaded_feed(1..=2);
        let mut observer = SentinelObserver::new();
        observer.retarget(feed.items());
        observer.detach();
        assert_eq!(observer.sentinel(), None);
        assert!(observer.intersect(at(1, 2), &mut feed).is_none());
    }
}
