//! Diff-based synchronization of one source's validated postings against
//! the store: insert new URLs, refresh retained ones, deactivate the rest.
//! Every pass is scoped to a single source/company and audited in the
//! crawl run log.

use crate::db::{self, Pool};
use crate::model::{ReconcileSummary, RunStatus, SanitizedJob};
use anyhow::Result;
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};

/// Reconcile a source's valid set against the store. Opens a crawl run
/// carrying the batch's valid ratio, closes it `success`/`warning`/
/// `failed`, and returns the counts.
///
/// An empty valid set closes as `warning` and touches nothing: an empty
/// fetch is treated as a fetch failure, not as "no postings exist", so a
/// broken fetcher can never mass-deactivate a source.
#[instrument(skip_all, fields(source))]
pub async fn reconcile_source(
    pool: &Pool,
    source: &str,
    display_name: &str,
    valid: &[SanitizedJob],
    valid_ratio: f64,
) -> Result<ReconcileSummary> {
    let run_id = db::open_run(pool, source, valid.len() as i64, Some(valid_ratio)).await?;

    match apply(pool, source, display_name, valid).await {
        Ok(Outcome::EmptyFetch) => {
            db::close_run(pool, run_id, RunStatus::Warning, "empty fetch; deactivation skipped")
                .await?;
            Ok(ReconcileSummary::default())
        }
        Ok(Outcome::Done(summary)) => {
            let message = format!(
                "saved={} updated={} deactivated={}",
                summary.saved, summary.updated, summary.deactivated
            );
            info!(source, %message, "reconciliation complete");
            db::close_run(pool, run_id, RunStatus::Success, &message).await?;
            Ok(summary)
        }
        Err(err) => {
            if let Err(close_err) =
                db::close_run(pool, run_id, RunStatus::Failed, &err.to_string()).await
            {
                warn!(source, ?close_err, "failed to close crawl run");
            }
            Err(err)
        }
    }
}

enum Outcome {
    EmptyFetch,
    Done(ReconcileSummary),
}

async fn apply(
    pool: &Pool,
    source: &str,
    display_name: &str,
    valid: &[SanitizedJob],
) -> Result<Outcome> {
    let company_id = db::upsert_company(pool, source, display_name).await?;

    if valid.is_empty() {
        warn!(source, "empty valid set; skipping deactivation");
        return Ok(Outcome::EmptyFetch);
    }

    // Fetchers may repeat URLs within one batch; last write wins.
    let mut by_url: HashMap<&str, &SanitizedJob> = HashMap::new();
    let mut urls: Vec<String> = Vec::new();
    for job in valid {
        if by_url.insert(job.url.as_str(), job).is_none() {
            urls.push(job.url.clone());
        }
    }

    let mut summary = ReconcileSummary {
        deactivated: db::deactivate_stale(pool, source, company_id, &urls).await?,
        ..Default::default()
    };

    let existing = db::find_existing_by_urls(pool, source, &urls).await?;
    for url in &urls {
        let job = by_url[url.as_str()];
        match existing.get(url) {
            Some(&id) => {
                // Row failures are independent; partial success is fine.
                match db::update_job(pool, id, job).await {
                    Ok(()) => summary.updated += 1,
                    Err(err) => warn!(source, url, ?err, "row update failed"),
                }
            }
            None => {
                if db::insert_job(pool, source, company_id, job).await? {
                    summary.saved += 1;
                } else {
                    // Another run won the race for this URL.
                    debug!(source, url, "insert skipped; row already exists");
                }
            }
        }
    }

    Ok(Outcome::Done(summary))
}
