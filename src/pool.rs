//! Bounded worker pool draining the source list.
//!
//! A fixed number of workers share one atomic cursor; each source is
//! claimed by exactly one worker per cycle. Fetches run under a timeout
//! and a bounded sequential retry loop, and a failing source never aborts
//! its siblings.

use crate::config::Crawl;
use crate::fetch::JobFetcher;
use crate::health::HealthGate;
use crate::model::{FetchResult, RawJob};
use crate::registry::Source;
use anyhow::{anyhow, Result};
use futures::future::join_all;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Fetch with a timeout race and a bounded retry loop. A timed-out
/// attempt is dropped on the spot; the retry is always a fresh call, so
/// a late completion can never be observed or retried twice.
async fn fetch_with_retry(
    source: &str,
    fetcher: &dyn JobFetcher,
    crawl: &Crawl,
) -> Result<Vec<RawJob>> {
    let timeout = crawl.fetch_timeout();
    let delay = crawl.retry_delay();
    let mut last_err = anyhow!("fetch never attempted");

    for attempt in 0..=crawl.retry_count {
        match tokio::time::timeout(timeout, fetcher.fetch()).await {
            Ok(Ok(jobs)) => return Ok(jobs),
            Ok(Err(err)) => {
                warn!(source, attempt, ?err, "fetch attempt failed");
                last_err = err;
            }
            Err(_) => {
                warn!(source, attempt, timeout_ms = crawl.timeout_ms, "fetch attempt timed out");
                last_err = anyhow!("fetch timed out after {}ms", crawl.timeout_ms);
            }
        }
        if attempt < crawl.retry_count {
            tokio::time::sleep(delay).await;
        }
    }
    Err(last_err)
}

/// Run every source through the pool, returning one result per source.
/// Result order follows completion, not submission.
pub async fn run_pool(sources: Arc<Vec<Source>>, gate: HealthGate, crawl: &Crawl) -> Vec<FetchResult> {
    let cursor = Arc::new(AtomicUsize::new(0));
    let workers = crawl.concurrency.max(1);

    let handles: Vec<_> = (0..workers)
        .map(|worker| {
            let sources = Arc::clone(&sources);
            let cursor = Arc::clone(&cursor);
            let gate = gate.clone();
            let crawl = crawl.clone();
            tokio::spawn(async move {
                let mut results = Vec::new();
                loop {
                    // Single atomic claim per source; no source is ever
                    // processed by two workers.
                    let idx = cursor.fetch_add(1, Ordering::SeqCst);
                    let Some(source) = sources.get(idx) else { break };

                    match gate.check(&source.name).await {
                        Ok(decision) if decision.skip => {
                            let reason = decision.reason.unwrap_or_default();
                            info!(worker, source = %source.name, reason, "source skipped by health gate");
                            results.push(FetchResult {
                                source: source.name.clone(),
                                skipped_reason: Some(reason),
                                ..Default::default()
                            });
                            continue;
                        }
                        Ok(_) => {}
                        Err(err) => {
                            // A broken gate must not block crawling.
                            warn!(worker, source = %source.name, ?err, "health gate check failed; allowing run");
                        }
                    }

                    match fetch_with_retry(&source.name, source.fetcher.as_ref(), &crawl).await {
                        Ok(jobs) => {
                            info!(worker, source = %source.name, count = jobs.len(), "fetch succeeded");
                            results.push(FetchResult {
                                source: source.name.clone(),
                                jobs,
                                ..Default::default()
                            });
                        }
                        Err(err) => {
                            warn!(worker, source = %source.name, ?err, "fetch failed after retries");
                            results.push(FetchResult {
                                source: source.name.clone(),
                                error: Some(err.to_string()),
                                ..Default::default()
                            });
                        }
                    }
                }
                results
            })
        })
        .collect();

    let mut all = Vec::new();
    for joined in join_all(handles).await {
        match joined {
            Ok(results) => all.extend(results),
            Err(err) => error!(?err, "worker task panicked"),
        }
    }
    all
}
