//! Top-level wiring: worker pool output feeds the reconciler per source,
//! totals are aggregated across sources, and run-status events go out
//! through the (detached) notifier. Partial success is the normal case.

use crate::config::Config;
use crate::db::{self, Pool};
use crate::health::HealthGate;
use crate::model::{FetchResult, RunStatus, RunTotals};
use crate::notify::{notify_detached, Notifier, RunEvent, RunScope};
use crate::pool::run_pool;
use crate::reconcile::reconcile_source;
use crate::registry::{Source, SourceRegistry};
use crate::validate;
use anyhow::{anyhow, Result};
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

/// Crawl and reconcile every registered source.
pub async fn run_all(
    pool: &Pool,
    cfg: &Config,
    registry: &SourceRegistry,
    notifier: Arc<dyn Notifier>,
) -> Result<RunTotals> {
    run_sources(pool, cfg, registry, registry.all().to_vec(), RunScope::All, notifier).await
}

/// Crawl and reconcile a single source by name.
pub async fn run_single(
    pool: &Pool,
    cfg: &Config,
    registry: &SourceRegistry,
    name: &str,
    notifier: Arc<dyn Notifier>,
) -> Result<RunTotals> {
    let Some(source) = registry.get(name).cloned() else {
        let err = anyhow!("unknown source: {name}");
        // Awaited, not detached: the caller exits right after this.
        if let Err(notify_err) = notifier
            .notify(RunEvent::Failed {
                scope: RunScope::Single,
                error: err.to_string(),
            })
            .await
        {
            warn!(?notify_err, "notifier failed; ignoring");
        }
        return Err(err);
    };
    run_sources(pool, cfg, registry, vec![source], RunScope::Single, notifier).await
}

async fn run_sources(
    pool: &Pool,
    cfg: &Config,
    registry: &SourceRegistry,
    sources: Vec<Source>,
    scope: RunScope,
    notifier: Arc<dyn Notifier>,
) -> Result<RunTotals> {
    notify_detached(Arc::clone(&notifier), RunEvent::Running { scope });

    let gate = HealthGate::new(pool.clone(), cfg.breaker.clone());
    let results = run_pool(Arc::new(sources), gate, &cfg.crawl).await;

    let mut totals = RunTotals::default();
    for result in results {
        process_result(pool, cfg, registry, result, &mut totals).await;
    }

    notify_detached(
        notifier,
        RunEvent::Completed {
            scope,
            saved: totals.saved,
            updated: totals.updated,
            deactivated: totals.deactivated,
        },
    );
    log_summary(&totals);
    Ok(totals)
}

/// Validate and reconcile one source's fetch outcome. Failures land in
/// `totals.failed_sources` and never propagate; sibling sources are
/// unaffected by design.
async fn process_result(
    pool: &Pool,
    cfg: &Config,
    registry: &SourceRegistry,
    result: FetchResult,
    totals: &mut RunTotals,
) {
    let source = result.source;

    if let Some(reason) = result.skipped_reason {
        info!(source, reason, "source skipped this cycle");
        totals.skipped_sources.push(source);
        return;
    }

    if let Some(fetch_err) = result.error {
        if let Err(err) = record_fetch_failure(pool, &source, &fetch_err).await {
            warn!(source, ?err, "failed to record fetch failure");
        }
        totals.failed_sources.push((source, fetch_err));
        return;
    }

    let thresholds = cfg.thresholds_for(&source);
    let report = validate::validate_batch(&result.jobs, &thresholds);
    validate::log_quality_report(&source, &report, &thresholds);

    let display_name = registry
        .get(&source)
        .map(|s| s.display_name.clone())
        .unwrap_or_else(|| source.clone());

    match reconcile_source(pool, &source, &display_name, &report.valid, report.valid_ratio).await
    {
        Ok(summary) => totals.absorb(summary),
        Err(err) => totals.failed_sources.push((source, err.to_string())),
    }
}

/// A fetch that exhausted its retries still leaves an audit trail; the
/// health gate counts these entries.
async fn record_fetch_failure(pool: &Pool, source: &str, fetch_err: &str) -> Result<()> {
    let run_id = db::open_run(pool, source, 0, None).await?;
    db::close_run(pool, run_id, RunStatus::Failed, fetch_err).await?;
    Ok(())
}

fn log_summary(totals: &RunTotals) {
    info!(
        saved = totals.saved,
        updated = totals.updated,
        deactivated = totals.deactivated,
        skipped = totals.skipped_sources.len(),
        failed = totals.failed_sources.len(),
        "crawl cycle finished"
    );
    for (source, message) in &totals.failed_sources {
        warn!(source, message, "source failed this cycle");
    }
}

/// `schedule` mode: invoke the all-sources path on the configured cron
/// expression and park until the process is terminated.
pub async fn run_schedule(
    pool: Pool,
    cfg: Config,
    registry: Arc<SourceRegistry>,
    notifier: Arc<dyn Notifier>,
) -> Result<()> {
    let scheduler = JobScheduler::new().await?;
    let cron = cfg.app.cron.clone();

    let job = Job::new_async(cron.as_str(), move |_uuid, _lock| {
        let pool = pool.clone();
        let cfg = cfg.clone();
        let registry = Arc::clone(&registry);
        let notifier = Arc::clone(&notifier);
        Box::pin(async move {
            if let Err(err) = run_all(&pool, &cfg, &registry, Arc::clone(&notifier)).await {
                error!(?err, "scheduled crawl cycle failed");
                notify_detached(
                    notifier,
                    RunEvent::Failed {
                        scope: RunScope::All,
                        error: err.to_string(),
                    },
                );
            }
        })
    })?;
    scheduler.add(job).await?;
    scheduler.start().await?;
    info!(cron, "crawl scheduler started");

    loop {
        tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
    }
}
