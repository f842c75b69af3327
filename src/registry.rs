//! Typed source registry. Sources are declared in the config file and
//! resolved once at startup; lookups go through this registry rather than
//! any name-keyed dynamic dispatch.

use crate::config::Config;
use crate::fetch::{FeedFetcher, JobFetcher};
use anyhow::{Context, Result};
use std::sync::Arc;

/// One registered source: stable name, company identity and its fetcher.
#[derive(Clone)]
pub struct Source {
    pub name: String,
    pub display_name: String,
    pub fetcher: Arc<dyn JobFetcher>,
}

pub struct SourceRegistry {
    sources: Vec<Source>,
}

impl SourceRegistry {
    /// Build the registry from config, wiring a feed fetcher per source.
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let sources = cfg
            .sources
            .iter()
            .map(|sc| {
                let fetcher = FeedFetcher::new(&sc.feed_url)
                    .with_context(|| format!("source {}", sc.name))?;
                Ok(Source {
                    name: sc.name.clone(),
                    display_name: sc.display_name.clone(),
                    fetcher: Arc::new(fetcher) as Arc<dyn JobFetcher>,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { sources })
    }

    pub fn with_sources(sources: Vec<Source>) -> Self {
        Self { sources }
    }

    pub fn all(&self) -> &[Source] {
        &self.sources
    }

    pub fn get(&self, name: &str) -> Option<&Source> {
        self.sources.iter().find(|s| s.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name.as_str()).collect()
    }
}
