use anyhow::Context;
use clap::{Parser, Subcommand};
use propensity_score::{
    config::AppConfig,
    database::{self, SqlxRecordSource, SqlxScoreSink},
    domain::{DateRange, LeaveRecord},
    logging,
    rules::RuleSet,
    scoring::{JobLookup, ScoringService},
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// SQLite database URL
    #[arg(long, global = true, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// JSON file with rule definitions
    #[arg(long, global = true, env = "RULES_PATH")]
    rules: Option<PathBuf>,

    /// Scores written per block
    #[arg(long, global = true)]
    block_size: Option<usize>,

    /// Maximum jobs running at once
    #[arg(long, global = true)]
    max_jobs: Option<usize>,

    /// Log filter directive, e.g. "propensity_score=debug"
    #[arg(long, global = true)]
    log_filter: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Score every record issued in a date range and wait for the job
    Run {
        /// First issue date, YYYY-MM-DD
        #[arg(long)]
        start: String,
        /// Last issue date, YYYY-MM-DD
        #[arg(long)]
        end: String,
        /// Progress polling interval
        #[arg(long, default_value_t = 500)]
        poll_interval_ms: u64,
    },
    /// Print persisted scores for a date range as JSON
    Details {
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
    },
    /// Print the registered rule models as JSON
    Rules,
    /// Load leave records from a JSON array file
    Import {
        #[arg(long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::from_env().context("Failed to load configuration")?;
    if let Some(url) = args.database_url {
        config.database_url = url;
    }
    if let Some(path) = args.rules {
        config.rules_path = Some(path);
    }
    if let Some(size) = args.block_size {
        config.batch.block_size = size;
    }
    if let Some(max) = args.max_jobs {
        config.worker_pool.max_concurrent_jobs = max;
    }
    config.validate()?;

    let (log_config, _guard) =
        logging::init_logging(config.log_dir.as_deref(), args.log_filter.as_deref())?;
    info!(filter = %log_config.get_filter(), "Logging initialized");
    if let Some(dir) = config.log_dir.as_deref() {
        if let Err(e) = logging::cleanup_old_logs(dir, logging::LOG_RETENTION_DAYS).await {
            warn!(error = %e, "Failed to clean up old log files");
        }
    }

    let rules = RuleSet::load_or_builtin(config.rules_path.as_deref())
        .context("Failed to load rule models")?;

    if let Commands::Rules = args.command {
        println!("{}", serde_json::to_string_pretty(&rules.describe())?);
        return Ok(());
    }

    let pool = database::init_pool(&config.database_url)
        .await
        .with_context(|| format!("Failed to open database {}", config.database_url))?;
    database::run_migrations(&pool).await?;

    match args.command {
        Commands::Run {
            start,
            end,
            poll_interval_ms,
        } => {
            let service = ScoringService::from_pool(pool, &config, rules);
            let initial = service.submit(&start, &end)?;
            info!(start = %start, end = %end, status = %initial.status, "Job submitted");

            let interval = Duration::from_millis(poll_interval_ms.max(10));
            let final_state = loop {
                match service.query(&start, &end)? {
                    JobLookup::Found(state) if state.is_terminal() => break state,
                    JobLookup::Found(state) => {
                        info!(
                            status = %state.status,
                            total = ?state.total,
                            progress = ?state.per_model_count,
                            "Job in progress"
                        );
                    }
                    JobLookup::NotFound(_) => anyhow::bail!("Submitted job disappeared"),
                }
                tokio::time::sleep(interval).await;
            };

            service.shutdown().await;
            println!("{}", serde_json::to_string_pretty(&final_state)?);
        }
        Commands::Details { start, end } => {
            let range = DateRange::parse(&start, &end)?;
            let details = SqlxScoreSink::new(pool).list_scores(range).await?;
            println!("{}", serde_json::to_string_pretty(&details)?);
        }
        Commands::Import { file } => {
            let raw = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let records: Vec<LeaveRecord> = serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse records in {}", file.display()))?;
            let count = SqlxRecordSource::new(pool).import(&records).await?;
            info!(count, file = %file.display(), "Imported leave records");
        }
        Commands::Rules => {}
    }

    Ok(())
}
