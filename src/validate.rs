//! Sanitation and quality scoring for crawled job postings.
//!
//! Every rule is independent: all violations for a record are collected
//! rather than short-circuited, and a sanitized copy is produced even for
//! records that fail validation so reports can show what would have been
//! stored.

use crate::model::{BatchReport, InvalidJob, QualityThresholds, RawJob, SanitizedJob, ValidationOutcome};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, warn};
use url::Url;

const MAX_TITLE_CHARS: usize = 200;
const MAX_DESCRIPTION_CHARS: usize = 10_000;
const MAX_LOCATION_CHARS: usize = 100;
const MAX_DEPARTMENT_CHARS: usize = 100;
const MAX_EXPERIENCE_CHARS: usize = 100;
const MAX_SALARY_CHARS: usize = 100;
const MAX_JOB_TYPE_CHARS: usize = 50;

/// Placeholder titles that carry no information.
static MEANINGLESS_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:[\s\-_\.]+|untitled|no title|제목없음)$").unwrap());

/// Region synonyms, first containment match wins. Longer variants come
/// before their prefixes so "서울특별시" resolves before "서울".
const LOCATION_SYNONYMS: &[(&str, &str)] = &[
    ("서울특별시", "Seoul"),
    ("서울시", "Seoul"),
    ("서울", "Seoul"),
    ("Seoul", "Seoul"),
    ("경기도", "Gyeonggi"),
    ("경기", "Gyeonggi"),
    ("판교", "Gyeonggi"),
    ("성남", "Gyeonggi"),
    ("분당", "Gyeonggi"),
    ("Pangyo", "Gyeonggi"),
    ("부산광역시", "Busan"),
    ("부산시", "Busan"),
    ("부산", "Busan"),
    ("대구", "Daegu"),
    ("인천", "Incheon"),
    ("광주", "Gwangju"),
    ("대전", "Daejeon"),
    ("울산", "Ulsan"),
    ("세종", "Sejong"),
    ("제주", "Jeju"),
];

static REMOTE_LOCATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)원격|재택|리모트|remote").unwrap());

/// Department category buckets, first containment match wins.
const DEPARTMENT_BUCKETS: &[(&str, &[&str])] = &[
    ("Engineering", &["개발", "엔지니어", "Development", "Engineer", "Software"]),
    ("Product", &["기획", "Planning", "Product"]),
    ("Design", &["디자인", "Design", "UX", "UI"]),
    ("Marketing", &["마케팅", "Marketing"]),
    ("Sales", &["영업", "Sales"]),
    ("HR", &["인사", "HR", "Human Resources"]),
    ("Finance", &["재무", "Finance"]),
    ("Management", &["경영", "Management"]),
    ("Other", &["기타", "Others", "ETC"]),
];

static ENTRY_LEVEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)신입|신규|new|entry|junior|0\s*년|0\s*year").unwrap());
static EXPERIENCED: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)경력|experienced|senior").unwrap());
static EXPERIENCE_YEARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d+)\s*(?:년|years?)").unwrap());
static NO_PREFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)무관|상관없음|any|all").unwrap());

/// Parse a posting date: RFC 3339, or a bare `YYYY-MM-DD` taken as
/// midnight UTC.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| ndt.and_utc())
}

/// Character-boundary-safe truncation; byte slicing would split Hangul.
fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn clean_text(field: &str, value: &str, max: usize) -> String {
    let trimmed = value.trim();
    if trimmed.chars().count() > max {
        warn!(field, len = trimmed.chars().count(), max, "text field truncated");
        truncate_chars(trimmed, max)
    } else {
        trimmed.to_string()
    }
}

/// Collapse a free-text location to a canonical short region name, or
/// `Remote` for any remote-work phrasing. Unknown locations pass through.
pub fn normalize_location(location: &str) -> String {
    let trimmed = location.trim();
    for (synonym, canonical) in LOCATION_SYNONYMS {
        if trimmed.contains(synonym) {
            return (*canonical).to_string();
        }
    }
    if REMOTE_LOCATION.is_match(trimmed) {
        return "Remote".to_string();
    }
    trimmed.to_string()
}

/// Map a department string into one of the category buckets. Unknown
/// departments pass through.
pub fn normalize_department(department: &str) -> String {
    let trimmed = department.trim();
    for (bucket, synonyms) in DEPARTMENT_BUCKETS {
        if synonyms.iter().any(|s| trimmed.contains(s)) {
            return (*bucket).to_string();
        }
    }
    trimmed.to_string()
}

/// Classify experience requirements as entry-level, experienced (with a
/// year count when one is present) or no-preference. Unmatched strings
/// pass through.
pub fn normalize_experience(experience: &str) -> String {
    let trimmed = experience.trim();
    if ENTRY_LEVEL.is_match(trimmed) {
        return "entry-level".to_string();
    }
    if EXPERIENCED.is_match(trimmed) {
        if let Some(caps) = EXPERIENCE_YEARS.captures(trimmed) {
            return format!("experienced {}yr+", &caps[1]);
        }
        return "experienced".to_string();
    }
    if NO_PREFERENCE.is_match(trimmed) {
        return "no-preference".to_string();
    }
    trimmed.to_string()
}

/// Validate one raw posting, producing the error list and the sanitized
/// copy. `is_valid` is true exactly when no errors were collected;
/// warnings (http scheme, odd dates, truncation) are logged, never fatal.
pub fn validate_job(raw: &RawJob) -> ValidationOutcome {
    let mut errors = Vec::new();
    let mut sanitized = SanitizedJob {
        is_active: true,
        ..Default::default()
    };
    let now = Utc::now();

    let required: [(&str, Option<&String>); 4] = [
        ("title", raw.title.as_ref()),
        ("url", raw.url.as_ref()),
        ("company_ref", raw.company_ref.as_ref()),
        ("posted_at", raw.posted_at.as_ref()),
    ];
    for (name, value) in required {
        if value.map_or(true, |v| v.trim().is_empty()) {
            errors.push(format!("missing required field: {name}"));
        }
    }

    if let Some(title) = &raw.title {
        let mut title = title.trim().to_string();
        if title.is_empty() {
            errors.push("title is empty".to_string());
        } else if title.chars().count() > MAX_TITLE_CHARS {
            errors.push(format!(
                "title too long: {} chars (max {MAX_TITLE_CHARS})",
                title.chars().count()
            ));
            title = truncate_chars(&title, MAX_TITLE_CHARS);
        }
        if !title.is_empty() && MEANINGLESS_TITLE.is_match(&title) {
            errors.push("invalid title format".to_string());
        }
        sanitized.title = title;
    }

    if let Some(url) = &raw.url {
        let url = url.trim().to_string();
        match Url::parse(&url) {
            Ok(parsed) => {
                if parsed.scheme() == "http" {
                    warn!(%url, "plain http URL");
                }
            }
            Err(_) => errors.push(format!("invalid url: {url}")),
        }
        sanitized.url = url;
    }

    if let Some(company_ref) = &raw.company_ref {
        sanitized.company_ref = company_ref.trim().to_string();
    }

    if let Some(posted_at) = raw.posted_at.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        match parse_date(posted_at) {
            Some(posted) => {
                if posted > now {
                    warn!(%posted, "posting dated in the future");
                }
                if posted < now - Duration::days(365 * 2) {
                    warn!(%posted, "posting older than two years");
                }
                sanitized.posted_at = Some(posted);
            }
            None => errors.push(format!("invalid posted date: {posted_at}")),
        }
    }

    if let Some(deadline) = raw.deadline.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        match parse_date(deadline) {
            Some(parsed) => {
                if parsed < now {
                    // Expected end-of-posting signal, not an error.
                    warn!(%parsed, "deadline passed; marking inactive");
                    sanitized.is_active = false;
                }
                sanitized.deadline = Some(parsed);
            }
            None => errors.push(format!("invalid deadline: {deadline}")),
        }
    }

    sanitized.description = raw
        .description
        .as_deref()
        .map(|v| clean_text("description", v, MAX_DESCRIPTION_CHARS));
    sanitized.location = raw
        .location
        .as_deref()
        .map(|v| normalize_location(&clean_text("location", v, MAX_LOCATION_CHARS)));
    sanitized.department = raw
        .department
        .as_deref()
        .map(|v| normalize_department(&clean_text("department", v, MAX_DEPARTMENT_CHARS)));
    sanitized.experience = raw
        .experience
        .as_deref()
        .map(|v| normalize_experience(&clean_text("experience", v, MAX_EXPERIENCE_CHARS)));
    sanitized.job_type = raw
        .job_type
        .as_deref()
        .map(|v| clean_text("job_type", v, MAX_JOB_TYPE_CHARS));
    sanitized.salary = raw
        .salary
        .as_deref()
        .map(|v| clean_text("salary", v, MAX_SALARY_CHARS));

    ValidationOutcome {
        is_valid: errors.is_empty(),
        errors,
        sanitized,
    }
}

/// Run the validator over a whole fetch, partitioning records and
/// aggregating error types (the substring before the first `:`).
pub fn validate_batch(jobs: &[RawJob], thresholds: &QualityThresholds) -> BatchReport {
    let mut report = BatchReport {
        total: jobs.len(),
        ..Default::default()
    };

    for job in jobs {
        let outcome = validate_job(job);
        if outcome.is_valid {
            let description_chars = outcome
                .sanitized
                .description
                .as_deref()
                .map(|d| d.chars().count())
                .unwrap_or(0);
            if description_chars < thresholds.min_description_length {
                report.short_descriptions += 1;
            }
            report.valid.push(outcome.sanitized);
            report.valid_count += 1;
        } else {
            for error in &outcome.errors {
                let error_type = error.split(':').next().unwrap_or(error).to_string();
                *report.errors_by_type.entry(error_type).or_insert(0) += 1;
            }
            report.invalid.push(InvalidJob {
                original: job.clone(),
                errors: outcome.errors,
                sanitized: outcome.sanitized,
            });
            report.invalid_count += 1;
        }
    }

    report.valid_ratio = if report.total > 0 {
        report.valid_count as f64 / report.total as f64
    } else {
        0.0
    };
    report.quality_score = report.valid_ratio * 100.0;
    report.meets_threshold = report.valid_ratio >= thresholds.min_valid_ratio && report.total > 0;
    report
}

/// Emit a human-readable quality summary for one source's batch.
/// Purely informational; never fails and never gates reconciliation.
pub fn log_quality_report(source: &str, report: &BatchReport, thresholds: &QualityThresholds) {
    info!(
        source,
        total = report.total,
        valid = report.valid_count,
        invalid = report.invalid_count,
        quality_score = format!("{:.1}", report.quality_score),
        meets_threshold = report.meets_threshold,
        min_valid_ratio = thresholds.min_valid_ratio,
        "batch quality report"
    );
    if report.short_descriptions > 0 {
        warn!(
            source,
            count = report.short_descriptions,
            min_chars = thresholds.min_description_length,
            "valid records with short or missing descriptions"
        );
    }
    if report.invalid_count == 0 {
        return;
    }
    for (error_type, count) in &report.errors_by_type {
        info!(source, error_type, count, "validation errors by type");
    }
    for (i, item) in report.invalid.iter().take(5).enumerate() {
        info!(
            source,
            sample = i + 1,
            title = item.original.title.as_deref().unwrap_or("(none)"),
            errors = item.errors.join(", "),
            "invalid record sample"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_job() -> RawJob {
        RawJob {
            title: Some("Software Engineer".into()),
            url: Some("https://example.com/job/1".into()),
            company_ref: Some("company-1".into()),
            posted_at: Some(Utc::now().to_rfc3339()),
            ..Default::default()
        }
    }

    fn thresholds() -> QualityThresholds {
        QualityThresholds {
            min_valid_ratio: 0.7,
            min_description_length: 50,
        }
    }

    #[test]
    fn valid_job_passes() {
        let outcome = validate_job(&base_job());
        assert!(outcome.is_valid, "errors: {:?}", outcome.errors);
        assert!(outcome.errors.is_empty());
        assert!(outcome.sanitized.is_active);
    }

    #[test]
    fn missing_title_fails_with_typed_error() {
        let job = RawJob {
            title: None,
            ..base_job()
        };
        let outcome = validate_job(&job);
        assert!(!outcome.is_valid);
        assert!(outcome
            .errors
            .iter()
            .any(|e| e == "missing required field: title"));
        assert_eq!(
            outcome.errors[0].split(':').next().unwrap(),
            "missing required field"
        );
    }

    #[test]
    fn blank_title_reports_both_errors() {
        let job = RawJob {
            title: Some("   ".into()),
            ..base_job()
        };
        let outcome = validate_job(&job);
        assert!(outcome.errors.contains(&"missing required field: title".to_string()));
        assert!(outcome.errors.contains(&"title is empty".to_string()));
    }

    #[test]
    fn title_is_trimmed() {
        let job = RawJob {
            title: Some("  Software Engineer  ".into()),
            ..base_job()
        };
        let outcome = validate_job(&job);
        assert_eq!(outcome.sanitized.title, "Software Engineer");
    }

    #[test]
    fn title_boundary_at_200_chars() {
        let job = RawJob {
            title: Some("a".repeat(200)),
            ..base_job()
        };
        let outcome = validate_job(&job);
        assert!(outcome.is_valid);
        assert_eq!(outcome.sanitized.title.chars().count(), 200);

        let job = RawJob {
            title: Some("a".repeat(201)),
            ..base_job()
        };
        let outcome = validate_job(&job);
        assert!(!outcome.is_valid);
        assert!(outcome.errors[0].starts_with("title too long"));
        assert_eq!(outcome.sanitized.title.chars().count(), 200);
    }

    #[test]
    fn long_hangul_title_truncates_on_char_boundary() {
        let job = RawJob {
            title: Some("개".repeat(250)),
            ..base_job()
        };
        let outcome = validate_job(&job);
        assert!(!outcome.is_valid);
        assert_eq!(outcome.sanitized.title.chars().count(), 200);
    }

    #[test]
    fn meaningless_titles_rejected() {
        for title in ["---___...", "untitled", "UNTITLED", "no title", "제목없음"] {
            let job = RawJob {
                title: Some(title.into()),
                ..base_job()
            };
            let outcome = validate_job(&job);
            assert!(
                outcome.errors.contains(&"invalid title format".to_string()),
                "expected rejection for {title:?}"
            );
        }
    }

    #[test]
    fn invalid_url_fails() {
        let job = RawJob {
            url: Some("not-a-valid-url".into()),
            ..base_job()
        };
        let outcome = validate_job(&job);
        assert!(!outcome.is_valid);
        assert!(outcome.errors.iter().any(|e| e.starts_with("invalid url")));
    }

    #[test]
    fn http_url_is_valid_with_warning_only() {
        let job = RawJob {
            url: Some("http://example.com/job/1".into()),
            ..base_job()
        };
        let outcome = validate_job(&job);
        assert!(outcome.is_valid);
    }

    #[test]
    fn url_is_trimmed() {
        let job = RawJob {
            url: Some("  https://example.com/job/1  ".into()),
            ..base_job()
        };
        let outcome = validate_job(&job);
        assert_eq!(outcome.sanitized.url, "https://example.com/job/1");
    }

    #[test]
    fn invalid_posted_date_fails() {
        let job = RawJob {
            posted_at: Some("not-a-date".into()),
            ..base_job()
        };
        let outcome = validate_job(&job);
        assert!(!outcome.is_valid);
        assert!(outcome
            .errors
            .iter()
            .any(|e| e.starts_with("invalid posted date")));
    }

    #[test]
    fn future_posted_date_is_warning_only() {
        let job = RawJob {
            posted_at: Some((Utc::now() + Duration::days(365)).to_rfc3339()),
            ..base_job()
        };
        let outcome = validate_job(&job);
        assert!(outcome.is_valid);
    }

    #[test]
    fn date_only_posted_at_parses() {
        let job = RawJob {
            posted_at: Some("2025-06-01".into()),
            ..base_job()
        };
        let outcome = validate_job(&job);
        assert!(outcome.sanitized.posted_at.is_some());
    }

    #[test]
    fn invalid_deadline_fails() {
        let job = RawJob {
            deadline: Some("invalid-date".into()),
            ..base_job()
        };
        let outcome = validate_job(&job);
        assert!(!outcome.is_valid);
        assert!(outcome.errors.iter().any(|e| e.starts_with("invalid deadline")));
    }

    #[test]
    fn past_deadline_is_valid_but_inactive() {
        let job = RawJob {
            deadline: Some((Utc::now() - Duration::days(1)).to_rfc3339()),
            ..base_job()
        };
        let outcome = validate_job(&job);
        assert!(outcome.is_valid);
        assert!(!outcome.sanitized.is_active);
    }

    #[test]
    fn description_truncated_to_limit() {
        let job = RawJob {
            description: Some("a".repeat(10_001)),
            ..base_job()
        };
        let outcome = validate_job(&job);
        assert!(outcome.is_valid);
        assert_eq!(
            outcome.sanitized.description.as_ref().unwrap().chars().count(),
            10_000
        );
    }

    #[test]
    fn location_normalized_through_synonyms() {
        assert_eq!(normalize_location("서울시"), "Seoul");
        assert_eq!(normalize_location("서울특별시"), "Seoul");
        assert_eq!(normalize_location("판교"), "Gyeonggi");
        assert_eq!(normalize_location("분당"), "Gyeonggi");
        assert_eq!(normalize_location("부산광역시"), "Busan");
        assert_eq!(normalize_location("재택근무"), "Remote");
        assert_eq!(normalize_location("Remote Work"), "Remote");
        assert_eq!(normalize_location("  서울  "), "Seoul");
        assert_eq!(normalize_location("Somewhere Else"), "Somewhere Else");
    }

    #[test]
    fn department_normalized_through_buckets() {
        assert_eq!(normalize_department("Software Engineer"), "Engineering");
        assert_eq!(normalize_department("개발"), "Engineering");
        assert_eq!(normalize_department("UX Designer"), "Design");
        assert_eq!(normalize_department("Product Manager"), "Product");
        assert_eq!(normalize_department("Digital Marketing"), "Marketing");
        assert_eq!(normalize_department("HR Manager"), "HR");
        assert_eq!(normalize_department("Unknown Dept"), "Unknown Dept");
    }

    #[test]
    fn experience_normalized_to_levels() {
        assert_eq!(normalize_experience("신입"), "entry-level");
        assert_eq!(normalize_experience("Junior Developer"), "entry-level");
        assert_eq!(normalize_experience("0년"), "entry-level");
        assert_eq!(normalize_experience("경력자"), "experienced");
        assert_eq!(normalize_experience("Senior Engineer"), "experienced");
        assert_eq!(normalize_experience("경력 5년 이상"), "experienced 5yr+");
        assert_eq!(normalize_experience("3 years experienced"), "experienced 3yr+");
        assert_eq!(normalize_experience("무관"), "no-preference");
        assert_eq!(normalize_experience("Unknown"), "Unknown");
    }

    #[test]
    fn batch_partitions_and_counts() {
        let jobs = vec![
            RawJob {
                url: Some("https://x/1".into()),
                ..base_job()
            },
            RawJob {
                title: Some("".into()),
                url: Some("https://x/2".into()),
                ..base_job()
            },
            RawJob {
                title: Some("PM".into()),
                url: Some("https://x/3".into()),
                ..base_job()
            },
        ];
        let report = validate_batch(&jobs, &thresholds());
        assert_eq!(report.valid.len(), 2);
        assert_eq!(report.invalid.len(), 1);
        assert_eq!(report.total, 3);
        assert_eq!(report.valid_count + report.invalid_count, report.total);
        assert!((report.valid_ratio - 2.0 / 3.0).abs() < 1e-9);
        assert!(!report.errors_by_type.is_empty());
        assert!(!report.meets_threshold); // 0.667 < 0.7
    }

    #[test]
    fn short_descriptions_are_counted_not_rejected() {
        let jobs = vec![
            RawJob {
                description: Some("too short".into()),
                ..base_job()
            },
            RawJob {
                description: Some("d".repeat(80)),
                url: Some("https://example.com/job/2".into()),
                ..base_job()
            },
            RawJob {
                description: None,
                url: Some("https://example.com/job/3".into()),
                ..base_job()
            },
        ];
        let report = validate_batch(&jobs, &thresholds());
        assert_eq!(report.valid_count, 3);
        assert_eq!(report.short_descriptions, 2);
    }

    #[test]
    fn empty_batch_has_zero_ratio_and_fails_threshold() {
        let report = validate_batch(&[], &thresholds());
        assert_eq!(report.total, 0);
        assert_eq!(report.valid_ratio, 0.0);
        assert_eq!(report.quality_score, 0.0);
        assert!(!report.meets_threshold);
    }

    #[test]
    fn batch_keeps_sanitized_copies_for_invalid_records() {
        let jobs = vec![RawJob {
            title: Some("".into()),
            location: Some("서울시".into()),
            ..base_job()
        }];
        let report = validate_batch(&jobs, &thresholds());
        assert_eq!(report.invalid.len(), 1);
        assert_eq!(report.invalid[0].original, jobs[0]);
        assert!(!report.invalid[0].errors.is_empty());
        assert_eq!(report.invalid[0].sanitized.location.as_deref(), Some("Seoul"));
    }
}
