//! Circuit breaker over the crawl run log: a source that keeps failing is
//! skipped until its cooldown elapses, then allowed a half-open retry.

use crate::config::Breaker;
use crate::db::{self, Pool};
use anyhow::Result;
use chrono::{Duration, Utc};
use tracing::{debug, instrument};

/// Whether a source should be skipped this cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkipDecision {
    pub skip: bool,
    pub reason: Option<String>,
}

impl SkipDecision {
    fn allow() -> Self {
        Self::default()
    }

    fn skip(reason: String) -> Self {
        Self {
            skip: true,
            reason: Some(reason),
        }
    }
}

#[derive(Clone)]
pub struct HealthGate {
    pool: Pool,
    breaker: Breaker,
}

impl HealthGate {
    pub fn new(pool: Pool, breaker: Breaker) -> Self {
        Self { pool, breaker }
    }

    /// Skip when the flagged-run count within the trailing window has hit
    /// the threshold AND the latest flagged run is still inside the
    /// cooldown. Once the cooldown elapses the source is allowed through
    /// again regardless of its history.
    #[instrument(skip_all, fields(source))]
    pub async fn check(&self, source: &str) -> Result<SkipDecision> {
        if !self.breaker.enabled {
            return Ok(SkipDecision::allow());
        }

        let flagged =
            db::count_recent_flagged(&self.pool, source, self.breaker.fail_window_hours).await?;
        if flagged < self.breaker.fail_threshold {
            return Ok(SkipDecision::allow());
        }

        let Some(last) = db::last_flagged_at(&self.pool, source).await? else {
            return Ok(SkipDecision::allow());
        };
        let cooldown = Duration::hours(self.breaker.cooldown_hours);
        if Utc::now() - last < cooldown {
            return Ok(SkipDecision::skip(format!(
                "{flagged} failed/warning runs in the last {}h; cooling down for {}h",
                self.breaker.fail_window_hours, self.breaker.cooldown_hours
            )));
        }

        debug!(source, "cooldown elapsed; allowing half-open retry");
        Ok(SkipDecision::allow())
    }
}
