//! The fetcher seam: each source exposes `fetch() -> Vec<RawJob>` and
//! nothing else. Fetchers must tolerate re-invocation; the worker pool
//! retries them freely.

use crate::model::RawJob;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use std::fmt;

#[async_trait]
pub trait JobFetcher: Send + Sync {
    /// Return the current raw postings for the source, or fail.
    async fn fetch(&self) -> Result<Vec<RawJob>>;
}

/// Fetcher for sources that publish a JSON feed of raw postings.
#[derive(Clone)]
pub struct FeedFetcher {
    http: Client,
    feed_url: Url,
}

impl fmt::Debug for FeedFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedFetcher")
            .field("feed_url", &self.feed_url)
            .finish_non_exhaustive()
    }
}

impl FeedFetcher {
    pub fn new(feed_url: &str) -> Result<Self> {
        let feed_url = Url::parse(feed_url)
            .with_context(|| format!("invalid feed url: {feed_url}"))?;
        let http = Client::builder()
            .user_agent("jobwatch/0.1")
            .build()
            .context("reqwest client")?;
        Ok(Self { http, feed_url })
    }
}

#[async_trait]
impl JobFetcher for FeedFetcher {
    async fn fetch(&self) -> Result<Vec<RawJob>> {
        let res = self
            .http
            .get(self.feed_url.clone())
            .send()
            .await
            .context("failed to reach feed")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("feed error {}: {}", status, body));
        }
        res.json::<Vec<RawJob>>()
            .await
            .context("invalid feed JSON")
    }
}
