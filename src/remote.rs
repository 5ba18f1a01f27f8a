use reqwest::blocking::{Client, RequestBuilder};
use std::time::Duration;
use tracing::debug;

use crate::config::RestConfig;
use crate::error::FeedError;
use crate::filters::JobQuery;
use crate::models::JobPosting;
use crate::source::JobSource;

/// Jobs collection on a PostgREST-compatible backend (`/rest/v1/jobs`).
#[derive(Debug)]
pub struct RestSource {
    base_url: String,
    api_key: String,
    client: Client,
}

impl RestSource {
    pub fn new(config: &RestConfig) -> Result<Self, FeedError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            client,
        })
    }

    fn jobs_url(&self) -> String {
        format!("{}/rest/v1/jobs", self.base_url)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Accept", "application/json")
    }

    fn page_request(&self, query: &JobQuery, offset: usize, limit: usize) -> RequestBuilder {
        self.authorized(self.client.get(self.jobs_url()))
            .query(&query.to_rest_params(offset, limit))
    }

    fn send(&self, builder: RequestBuilder) -> Result<Vec<JobPosting>, FeedError> {
        let response = builder.send()?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(FeedError::Backend(format!(
                "request failed with status {}: {}",
                status, body
            )));
        }
        response
            .json()
            .map_err(|e| FeedError::Backend(format!("failed to parse jobs response: {}", e)))
    }

    pub fn get_job(&self, id: i64) -> Result<Option<JobPosting>, FeedError> {
        let builder = self
            .authorized(self.client.get(self.jobs_url()))
            .query(&[("select", "*".to_string()), ("id", format!("eq.{}", id))]);
        Ok(self.send(builder)?.into_iter().next())
    }
}

impl JobSource for RestSource {
    fn fetch_page(
        &self,
        query: &JobQuery,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<JobPosting>, FeedError> {
        debug!(offset, limit, url = %self.jobs_url(), "fetching page from REST backend");
        self.send(self.page_request(query, offset, limit))
    }

    fn name(&self) -> &str {
        "rest"
    }
}
