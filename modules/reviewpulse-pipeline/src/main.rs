use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use ai_client::OpenAi;
use review_api_client::ReviewApiClient;
use reviewpulse_common::{AnalysisWindow, Config, EntityRegistry};
use reviewpulse_pipeline::store::PgReviewStore;
use reviewpulse_pipeline::sweep::{self, SweepReport};
use reviewpulse_pipeline::{PipelineDeps, ReviewStore, SummaryEngine};

/// Default number of reviews for a count-based analysis.
const DEFAULT_ANALYSIS_COUNT: u32 = 30;

#[derive(Parser)]
#[command(name = "reviewpulse", version, about = "Incremental review ingestion and summary runs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch new reviews for the tracked entities
    Ingest {
        /// Only process the entity with this name
        #[arg(short, long)]
        entity: Option<String>,
    },
    /// Summarize unanalyzed reviews into one run per entity
    Analyze {
        /// Only process the entity with this name
        #[arg(short, long)]
        entity: Option<String>,
        /// Reviews entered within the last N days
        #[arg(short, long, conflicts_with = "count")]
        days: Option<u32>,
        /// The N newest unanalyzed reviews (default 30)
        #[arg(short, long)]
        count: Option<u32>,
    },
    /// Ingest everything; on the first of the month also run a 30-day analysis
    Daily {
        /// Only process the entity with this name
        #[arg(short, long)]
        entity: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(reviewpulse_pipeline::logging::env_filter())
        .init();

    let cli = Cli::parse();
    info!("ReviewPulse starting...");

    // Load config
    let config = Config::from_env()?;
    config.log_redacted();

    let registry = EntityRegistry::load(config.entities_path.as_deref())?;

    // Connect to Postgres and provision tables (idempotent)
    let store = PgReviewStore::connect(&config.database_url).await?;
    store.ensure_provisioned().await?;

    let source = ReviewApiClient::new(&config.review_api_base_url, &config.review_api_locale);
    let (fetch, summarize, analysis) = PipelineDeps::configs_from(&config);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current step");
            on_interrupt.cancel();
        }
    });

    let report = match cli.command {
        Command::Ingest { entity } => {
            let entities = registry.select(entity.as_deref())?;
            let deps = PipelineDeps::builder()
                .source(Arc::new(source))
                .store(Arc::new(store))
                .fetch(fetch)
                .summarize(summarize)
                .analysis(analysis)
                .build();
            sweep::ingest_all(&deps.ingestor(), &entities, &cancel).await
        }
        Command::Analyze {
            entity,
            days,
            count,
        } => {
            let entities = registry.select(entity.as_deref())?;
            let window = match days {
                Some(days) => AnalysisWindow::Days(days),
                None => AnalysisWindow::Count(count.unwrap_or(DEFAULT_ANALYSIS_COUNT)),
            };
            let deps = PipelineDeps::builder()
                .source(Arc::new(source))
                .store(Arc::new(store))
                .engine(summary_engine(&config)?)
                .fetch(fetch)
                .summarize(summarize)
                .analysis(analysis)
                .build();
            let coordinator = deps
                .coordinator()
                .ok_or_else(|| anyhow::anyhow!("summarization engine is not configured"))?;
            sweep::analyze_all(&coordinator, &entities, window, &cancel).await
        }
        Command::Daily { entity } => {
            let entities = registry.select(entity.as_deref())?;
            let today = Utc::now().date_naive();
            let builder = PipelineDeps::builder()
                .source(Arc::new(source))
                .store(Arc::new(store));
            let deps = if sweep::is_monthly_analysis_day(today) {
                builder
                    .engine(summary_engine(&config)?)
                    .fetch(fetch)
                    .summarize(summarize)
                    .analysis(analysis)
                    .build()
            } else {
                builder
                    .fetch(fetch)
                    .summarize(summarize)
                    .analysis(analysis)
                    .build()
            };
            let coordinator = deps.coordinator();
            sweep::daily(&deps.ingestor(), coordinator.as_ref(), &entities, today, &cancel).await
        }
    };

    finish(report)
}

fn summary_engine(config: &Config) -> Result<Arc<dyn SummaryEngine>> {
    let key = config.require_openai_key()?;
    info!(model = config.openai_model.as_str(), "Summarization engine configured");
    Ok(Arc::new(OpenAi::new(key, &config.openai_model)))
}

fn finish(report: SweepReport) -> Result<()> {
    info!(
        succeeded = report.succeeded(),
        failed = report.failed(),
        cancelled = report.cancelled,
        "Sweep complete"
    );
    println!("{report}");
    if report.cancelled {
        anyhow::bail!("interrupted");
    }
    Ok(())
}
