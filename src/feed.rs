//! Incremental job feed.
//!
//! `FeedController` is a synchronous state machine. Commands (`set_filters`,
//! `load_more`) hand back a `PageRequest` for the caller to execute; results
//! come back through `on_page_arrived` / `on_page_failed`. Every request
//! carries the token it was issued under, and a result is applied only if that
//! token is still the controller's current one.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{FeedError, ValidationError};
use crate::filters::{FilterCriteria, JobQuery};
use crate::models::JobPosting;

pub const DEFAULT_PAGE_SIZE: usize = 20;

/// A page fetch issued by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub generation: u64,
    pub criteria: Arc<FilterCriteria>,
    pub offset: usize,
    pub limit: usize,
}

impl PageRequest {
    pub fn query(&self) -> JobQuery {
        self.criteria.to_query()
    }
}

/// What happened to a delivered result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Applied,
    Stale,
}

/// The five states the presentation layer renders differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus {
    Loading,
    Failed,
    /// Nothing matched and nothing more to fetch.
    Empty,
    /// Items shown, source exhausted.
    Exhausted,
    /// Items shown, more may follow.
    Ready,
}

#[derive(Debug)]
pub struct FeedController {
    criteria: Arc<FilterCriteria>,
    generation: u64,
    page_size: usize,
    items: Vec<JobPosting>,
    offset: usize,
    has_more: bool,
    loading: bool,
    error: Option<FeedError>,
}

impl FeedController {
    pub fn new(criteria: FilterCriteria, page_size: usize) -> Result<Self, ValidationError> {
        if page_size == 0 {
            return Err(ValidationError::PageSize);
        }
        Ok(Self {
            criteria: Arc::new(criteria),
            generation: 0,
            page_size,
            items: Vec::new(),
            offset: 0,
            has_more: true,
            loading: false,
            error: None,
        })
    }

    pub fn items(&self) -> &[JobPosting] {
        &self.items
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&FeedError> {
        self.error.as_ref()
    }

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn status(&self) -> FeedStatus {
        if self.loading {
            FeedStatus::Loading
        } else if self.error.is_some() {
            FeedStatus::Failed
        } else if self.has_more {
            FeedStatus::Ready
        } else if self.items.is_empty() {
            FeedStatus::Empty
        } else {
            FeedStatus::Exhausted
        }
    }

    /// Issue the first page for the initial criteria.
    pub fn mount(&mut self) -> Option<PageRequest> {
        self.load_more()
    }

    /// Replace the criteria. A structurally equal value is a no-op; anything
    /// else resets the feed and issues page 0, superseding any request still
    /// in flight.
    pub fn set_filters(&mut self, next: FilterCriteria) -> Option<PageRequest> {
        if *self.criteria == next {
            debug!("criteria unchanged, keeping feed");
            return None;
        }

        self.generation += 1;
        self.criteria = Arc::new(next);
        self.items.clear();
        self.offset = 0;
        self.has_more = true;
        self.error = None;
        self.loading = false;
        info!(
            generation = self.generation,
            criteria = %self.criteria.describe(),
            "filters changed, feed reset"
        );

        self.load_more()
    }

    /// Request the next page. Returns `None` while a fetch is in flight or
    /// once the source is exhausted.
    pub fn load_more(&mut self) -> Option<PageRequest> {
        if self.loading || !self.has_more {
            return None;
        }

        self.loading = true;
        let request = PageRequest {
            generation: self.generation,
            criteria: Arc::clone(&self.criteria),
            offset: self.offset,
            limit: self.page_size,
        };
        debug!(
            generation = request.generation,
            offset = request.offset,
            limit = request.limit,
            "page requested"
        );
        Some(request)
    }

    /// Whether a result for `request` would be applied now.
    pub fn is_current(&self, request: &PageRequest) -> bool {
        self.loading
            && request.generation == self.generation
            && request.offset == self.offset
            && *request.criteria == *self.criteria
    }

    pub fn on_page_arrived(&mut self, request: &PageRequest, items: Vec<JobPosting>) -> Delivery {
        if !self.is_current(request) {
            debug!(
                generation = request.generation,
                offset = request.offset,
                "discarding stale page"
            );
            return Delivery::Stale;
        }

        let received = items.len();
        self.items.extend(items);
        self.offset += received;
        // No total count from the backend: a short page means the end
        self.has_more = received >= self.page_size;
        self.loading = false;
        self.error = None;
        info!(
            offset = self.offset,
            received,
            has_more = self.has_more,
            "page arrived"
        );
        Delivery::Applied
    }

    pub fn on_page_failed(&mut self, request: &PageRequest, error: FeedError) -> Delivery {
        if !self.is_current(request) {
            debug!(
                generation = request.generation,
                offset = request.offset,
                "discarding stale failure"
            );
            return Delivery::Stale;
        }

        warn!(offset = request.offset, error = %error, "page fetch failed");
        self.loading = false;
        self.error = Some(error);
        Delivery::Applied
    }
}
