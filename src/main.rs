use anyhow::Result;
use clap::Parser;
use jobwatch::notify::LogNotifier;
use jobwatch::registry::SourceRegistry;
use jobwatch::{config, db, orchestrate};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Source name to crawl, or "schedule" to run on the configured cron.
    /// Omit to crawl every source once.
    target: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/jobwatch.db", cfg.app.data_dir));

    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    // Entries left `running` by a crashed process would otherwise sit in
    // the log forever and skew the health gate.
    let orphans = db::close_orphan_runs(&pool).await?;
    if orphans > 0 {
        warn!(orphans, "closed orphaned crawl runs from a previous process");
    }

    let registry = SourceRegistry::from_config(&cfg)?;
    let notifier: Arc<dyn jobwatch::notify::Notifier> = Arc::new(LogNotifier);
    info!(sources = registry.all().len(), "jobwatch starting");

    match args.target.as_deref() {
        Some("schedule") => {
            orchestrate::run_schedule(pool, cfg, Arc::new(registry), notifier).await?;
        }
        Some(name) => {
            orchestrate::run_single(&pool, &cfg, &registry, name, notifier).await?;
        }
        None => {
            orchestrate::run_all(&pool, &cfg, &registry, notifier).await?;
        }
    }

    Ok(())
}
