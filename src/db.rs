use crate::model::{RunStatus, SanitizedJob};
use anyhow::Result;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{QueryBuilder, Row, SqlitePool};
use std::collections::HashMap;
use tracing::instrument;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the
/// parent directory exists. Leaves in-memory URLs and other schemes untouched.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = url["sqlite:".len()..].trim_start_matches("//");
    let (path_part, query_part) = match rest.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (rest, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match path_part.strip_prefix("~/") {
        Some(tail) => match std::env::var("HOME") {
            Ok(home) => format!("{}/{}", home.trim_end_matches('/'), tail),
            Err(_) => path_part.to_string(),
        },
        None => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    match query_part {
        Some(q) => format!("sqlite://{expanded_path}?{q}"),
        None => format!("sqlite://{expanded_path}"),
    }
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Create the company row for a source if absent, returning its id.
/// Safe to call on every run.
#[instrument(skip_all)]
pub async fn upsert_company(pool: &Pool, name: &str, display_name: &str) -> Result<i64> {
    let rec = sqlx::query(
        "INSERT INTO companies (name, display_name) VALUES (?, ?)
         ON CONFLICT(name) DO UPDATE SET display_name = excluded.display_name
         RETURNING id",
    )
    .bind(name)
    .bind(display_name)
    .fetch_one(pool)
    .await?;
    Ok(rec.get::<i64, _>("id"))
}

/// Mark every active job for this source/company whose URL is not in `urls`
/// as inactive, in a single statement. Returns the number of rows flipped.
#[instrument(skip_all)]
pub async fn deactivate_stale(
    pool: &Pool,
    source: &str,
    company_id: i64,
    urls: &[String],
) -> Result<u64> {
    let mut qb = QueryBuilder::new(
        "UPDATE jobs SET is_active = 0, updated_at = CURRENT_TIMESTAMP WHERE source = ",
    );
    qb.push_bind(source);
    qb.push(" AND company_id = ").push_bind(company_id);
    qb.push(" AND is_active = 1");
    if !urls.is_empty() {
        qb.push(" AND original_url NOT IN (");
        let mut sep = qb.separated(", ");
        for url in urls {
            sep.push_bind(url);
        }
        sep.push_unseparated(")");
    }
    let result = qb.build().execute(pool).await?;
    Ok(result.rows_affected())
}

/// Map the given URLs to ids of already-persisted jobs for this source.
#[instrument(skip_all)]
pub async fn find_existing_by_urls(
    pool: &Pool,
    source: &str,
    urls: &[String],
) -> Result<HashMap<String, i64>> {
    if urls.is_empty() {
        return Ok(HashMap::new());
    }
    let mut qb = QueryBuilder::new("SELECT id, original_url FROM jobs WHERE source = ");
    qb.push_bind(source);
    qb.push(" AND original_url IN (");
    let mut sep = qb.separated(", ");
    for url in urls {
        sep.push_bind(url);
    }
    sep.push_unseparated(")");

    let rows = qb.build().fetch_all(pool).await?;
    Ok(rows
        .into_iter()
        .map(|row| (row.get::<String, _>("original_url"), row.get::<i64, _>("id")))
        .collect())
}

/// Insert one job, skipping silently if another run already persisted the
/// same `(source, original_url)`. Returns whether a row was written.
/// A sighted row is always stored active; expiry belongs to the
/// deactivation pass, not to insert/update.
#[instrument(skip_all)]
pub async fn insert_job(
    pool: &Pool,
    source: &str,
    company_id: i64,
    job: &SanitizedJob,
) -> Result<bool> {
    let result = sqlx::query(
        "INSERT INTO jobs (company_id, source, title, original_url, description, location,
                           department, job_type, experience, salary, posted_at, deadline, is_active)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1)
         ON CONFLICT(source, original_url) DO NOTHING",
    )
    .bind(company_id)
    .bind(source)
    .bind(&job.title)
    .bind(&job.url)
    .bind(&job.description)
    .bind(&job.location)
    .bind(&job.department)
    .bind(&job.job_type)
    .bind(&job.experience)
    .bind(&job.salary)
    .bind(job.posted_at.unwrap_or_else(Utc::now))
    .bind(job.deadline)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Refresh the mutable fields of an existing job on a fresh sighting.
/// Re-sighted rows are reactivated unconditionally.
#[instrument(skip_all)]
pub async fn update_job(pool: &Pool, id: i64, job: &SanitizedJob) -> Result<()> {
    sqlx::query(
        "UPDATE jobs SET title = ?, description = ?, location = ?, department = ?,
                         job_type = ?, experience = ?, salary = ?, deadline = ?,
                         is_active = 1, updated_at = CURRENT_TIMESTAMP
         WHERE id = ?",
    )
    .bind(&job.title)
    .bind(&job.description)
    .bind(&job.location)
    .bind(&job.department)
    .bind(&job.job_type)
    .bind(&job.experience)
    .bind(&job.salary)
    .bind(job.deadline)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn count_active_jobs(pool: &Pool, source: &str) -> Result<i64> {
    let count =
        sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE source = ? AND is_active = 1")
            .bind(source)
            .fetch_one(pool)
            .await?;
    Ok(count)
}

/// Open a crawl run audit entry in the `running` state. `valid_ratio` is
/// the batch quality ratio, absent for runs that never produced a batch.
#[instrument(skip_all)]
pub async fn open_run(
    pool: &Pool,
    source: &str,
    job_count: i64,
    valid_ratio: Option<f64>,
) -> Result<i64> {
    let rec = sqlx::query(
        "INSERT INTO crawl_runs (source, status, job_count, valid_ratio)
         VALUES (?, ?, ?, ?) RETURNING id",
    )
    .bind(source)
    .bind(RunStatus::Running.as_str())
    .bind(job_count)
    .bind(valid_ratio)
    .fetch_one(pool)
    .await?;
    Ok(rec.get::<i64, _>("id"))
}

/// Close a crawl run with a terminal status. Terminal entries are never
/// reopened by the same run.
#[instrument(skip_all)]
pub async fn close_run(pool: &Pool, id: i64, status: RunStatus, message: &str) -> Result<()> {
    sqlx::query(
        "UPDATE crawl_runs SET status = ?, finished_at = CURRENT_TIMESTAMP, message = ?
         WHERE id = ?",
    )
    .bind(status.as_str())
    .bind(message)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Count failed/warning runs for a source within the trailing window.
#[instrument(skip_all)]
pub async fn count_recent_flagged(pool: &Pool, source: &str, window_hours: i64) -> Result<i64> {
    let count = sqlx::query_scalar(
        "SELECT COUNT(*) FROM crawl_runs
         WHERE source = ? AND status IN ('failed', 'warning')
           AND started_at >= datetime('now', ? || ' hours')",
    )
    .bind(source)
    .bind(-window_hours)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Timestamp of the most recent failed/warning run for a source.
#[instrument(skip_all)]
pub async fn last_flagged_at(pool: &Pool, source: &str) -> Result<Option<DateTime<Utc>>> {
    let row: Option<NaiveDateTime> = sqlx::query_scalar(
        "SELECT started_at FROM crawl_runs
         WHERE source = ? AND status IN ('failed', 'warning')
         ORDER BY started_at DESC, id DESC LIMIT 1",
    )
    .bind(source)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|naive| naive.and_utc()))
}

/// Close any `running` entries left behind by an abnormal termination.
/// Invoked as a startup sweep so the health gate never sees stuck runs.
#[instrument(skip_all)]
pub async fn close_orphan_runs(pool: &Pool) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE crawl_runs SET status = 'failed', finished_at = CURRENT_TIMESTAMP,
                               message = 'orphaned running entry'
         WHERE status = 'running'",
    )
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_pool() -> Pool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    fn job(url: &str) -> SanitizedJob {
        SanitizedJob {
            title: "Engineer".into(),
            url: url.into(),
            company_ref: "naver".into(),
            posted_at: Some(Utc::now()),
            is_active: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn upsert_company_is_idempotent() {
        let pool = setup_pool().await;
        let a = upsert_company(&pool, "naver", "NAVER").await.unwrap();
        let b = upsert_company(&pool, "naver", "NAVER").await.unwrap();
        assert_eq!(a, b);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM companies")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn insert_job_skips_duplicates() {
        let pool = setup_pool().await;
        let company = upsert_company(&pool, "naver", "NAVER").await.unwrap();
        assert!(insert_job(&pool, "naver", company, &job("https://x/1"))
            .await
            .unwrap());
        assert!(!insert_job(&pool, "naver", company, &job("https://x/1"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn deactivate_stale_spares_listed_urls() {
        let pool = setup_pool().await;
        let company = upsert_company(&pool, "naver", "NAVER").await.unwrap();
        for url in ["https://x/1", "https://x/2", "https://x/3"] {
            insert_job(&pool, "naver", company, &job(url)).await.unwrap();
        }

        let flipped = deactivate_stale(
            &pool,
            "naver",
            company,
            &["https://x/1".to_string(), "https://x/2".to_string()],
        )
        .await
        .unwrap();
        assert_eq!(flipped, 1);
        assert_eq!(count_active_jobs(&pool, "naver").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn run_log_counts_flagged_entries() {
        let pool = setup_pool().await;
        let id = open_run(&pool, "naver", 5, Some(0.8)).await.unwrap();
        close_run(&pool, id, RunStatus::Failed, "boom").await.unwrap();
        let id = open_run(&pool, "naver", 0, None).await.unwrap();
        close_run(&pool, id, RunStatus::Warning, "empty fetch")
            .await
            .unwrap();
        let id = open_run(&pool, "naver", 9, Some(1.0)).await.unwrap();
        close_run(&pool, id, RunStatus::Success, "ok").await.unwrap();

        assert_eq!(count_recent_flagged(&pool, "naver", 24).await.unwrap(), 2);
        assert_eq!(count_recent_flagged(&pool, "kakao", 24).await.unwrap(), 0);
        assert!(last_flagged_at(&pool, "naver").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn orphan_sweep_closes_running_entries() {
        let pool = setup_pool().await;
        let _ = open_run(&pool, "naver", 3, Some(1.0)).await.unwrap();
        let swept = close_orphan_runs(&pool).await.unwrap();
        assert_eq!(swept, 1);

        let status: String = sqlx::query_scalar("SELECT status FROM crawl_runs LIMIT 1")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(status, "failed");
    }

    #[test]
    fn prepare_sqlite_url_passthrough() {
        assert_eq!(prepare_sqlite_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(
            prepare_sqlite_url("postgres://host/db"),
            "postgres://host/db"
        );
    }
}
