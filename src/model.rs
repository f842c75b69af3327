use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One posting exactly as a fetcher produced it. Nothing is guaranteed:
/// fields may be absent, blank, malformed or repeated across the batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawJob {
    pub title: Option<String>,
    pub url: Option<String>,
    pub company_ref: Option<String>,
    pub posted_at: Option<String>,
    pub deadline: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub department: Option<String>,
    pub job_type: Option<String>,
    pub experience: Option<String>,
    pub salary: Option<String>,
}

/// A posting after trimming, truncation and normalization. Produced fresh
/// by the validator and never mutated afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SanitizedJob {
    pub title: String,
    pub url: String,
    pub company_ref: String,
    pub posted_at: Option<DateTime<Utc>>,
    pub deadline: Option<DateTime<Utc>>,
    /// Flipped to `false` when a past deadline is detected. Advisory:
    /// persistence stores every sighted row active and leaves expiry to
    /// the deactivation pass.
    pub is_active: bool,
    pub description: Option<String>,
    pub location: Option<String>,
    pub department: Option<String>,
    pub job_type: Option<String>,
    pub experience: Option<String>,
    pub salary: Option<String>,
}

/// Result of validating a single raw posting. The substring of each error
/// before the first `:` is its type, used for aggregation in reports.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub sanitized: SanitizedJob,
}

/// A rejected posting kept alongside its errors for reporting.
#[derive(Debug, Clone)]
pub struct InvalidJob {
    pub original: RawJob,
    pub errors: Vec<String>,
    pub sanitized: SanitizedJob,
}

/// Aggregate validity statistics for one fetch. Recomputed per run and
/// only ever summarized into the crawl run log, never persisted as-is.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub valid: Vec<SanitizedJob>,
    pub invalid: Vec<InvalidJob>,
    pub total: usize,
    pub valid_count: usize,
    pub invalid_count: usize,
    pub valid_ratio: f64,
    pub quality_score: f64,
    pub errors_by_type: HashMap<String, usize>,
    /// Valid records whose description is missing or under the configured
    /// minimum. Reported, never rejected.
    pub short_descriptions: usize,
    /// Advisory only; reconciliation is never gated on it.
    pub meets_threshold: bool,
}

/// Per-source validation thresholds, resolved as override > global.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityThresholds {
    pub min_valid_ratio: f64,
    pub min_description_length: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Success,
    Warning,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Warning => "warning",
            RunStatus::Failed => "failed",
        }
    }
}

/// Outcome of one source's trip through the worker pool.
#[derive(Debug, Clone, Default)]
pub struct FetchResult {
    pub source: String,
    pub jobs: Vec<RawJob>,
    pub error: Option<String>,
    pub skipped_reason: Option<String>,
}

/// Insert/update/deactivate counts for one source's reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub saved: u64,
    pub updated: u64,
    pub deactivated: u64,
}

/// Aggregate outcome of a whole orchestration cycle.
#[derive(Debug, Clone, Default)]
pub struct RunTotals {
    pub saved: u64,
    pub updated: u64,
    pub deactivated: u64,
    pub skipped_sources: Vec<String>,
    /// `(source, error message)` for every source that failed.
    pub failed_sources: Vec<(String, String)>,
}

impl RunTotals {
    pub fn absorb(&mut self, summary: ReconcileSummary) {
        self.saved += summary.saved;
        self.updated += summary.updated;
        self.deactivated += summary.deactivated;
    }
}
