//! # Bojo CLI
//!
//! Command-line entry point for crawling announcement boards and reading
//! the results.
//!
//! - `regions`: import and list crawl targets
//! - `crawl`: run the pipeline once over every active region
//! - `reclassify`: retry announcements stored while the classifier failed
//! - `results` / `dashboard`: read side
//! - `expire`: close announcements whose application period has ended
//! - `serve`: HTTP surface for triggers and queries

mod telemetry;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bojo::classifier::{
    Classifier, ClassifierConfig, GeminiClassifier, KeywordClassifier, RetryingClassifier,
};
use bojo::extractor::{Extractor, ExtractorConfig};
use bojo::fetcher::{FetchMode, Fetcher, FetcherConfig};
use bojo::model::{Client, DEFAULT_MODEL, DEFAULT_REQUESTS_PER_MINUTE};
use bojo::models::{CrawlLogStatus, RegionSource};
use bojo::orchestrator::{Orchestrator, OrchestratorConfig, RegionProgress, RunOptions};
use bojo::query::{self, RunResultsQuery};
use bojo::server::{self, AppState};
use bojo::store::Database;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tracing::{instrument, warn};

#[derive(Parser)]
#[command(author, version, about = "Watches local-government boards for subsidy announcements", long_about = None)]
struct Cli {
    /// Database path
    #[arg(long, global = true, env = "BOJO_DATABASE", default_value = "bojo.db")]
    database: PathBuf,

    /// Also write logs to a daily file in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage the region catalog
    #[command(subcommand)]
    Regions(RegionsCommand),

    /// Crawl every active region once
    Crawl(CrawlArgs),

    /// Retry classification for flagged announcements
    Reclassify(ReclassifyArgs),

    /// Show announcements discovered by a run
    Results(ResultsArgs),

    /// Show dashboard counts
    Dashboard(FormatArgs),

    /// Mark announcements past their application deadline as expired
    Expire,

    /// Serve the HTTP API
    Serve(ServeArgs),
}

#[derive(Subcommand, Debug)]
enum RegionsCommand {
    /// Import regions from a JSON array
    Import {
        #[arg(required = true)]
        file: PathBuf,
    },

    /// List regions
    List {
        /// Include inactive regions
        #[arg(short, long)]
        all: bool,
    },
}

/// Settings shared by every command that builds a pipeline
#[derive(Args, Debug, Clone)]
struct PipelineArgs {
    /// LLM model used for classification
    #[arg(short, long, default_value = DEFAULT_MODEL)]
    model: String,

    /// Classification requests per minute
    #[arg(long, default_value_t = DEFAULT_REQUESTS_PER_MINUTE)]
    rpm: u32,

    /// Remote Chrome DevTools endpoint instead of launching a browser
    #[arg(long, env = "BROWSER_URL")]
    browser_url: Option<String>,

    /// Fetch pages over plain HTTP instead of a browser
    #[arg(long)]
    http: bool,

    /// Page load timeout in seconds
    #[arg(long, default_value = "15")]
    page_timeout: u64,

    /// Regions processed concurrently
    #[arg(short, long, default_value = "5")]
    batch_size: usize,
}

#[derive(Args, Debug)]
struct CrawlArgs {
    #[command(flatten)]
    pipeline: PipelineArgs,

    /// Reclassify even when page content is unchanged
    #[arg(short, long)]
    force: bool,

    /// Do not follow detail links on listing pages
    #[arg(long)]
    no_details: bool,

    /// Only crawl these region codes
    #[arg(short, long = "region")]
    regions: Vec<String>,
}

#[derive(Args, Debug)]
struct ReclassifyArgs {
    #[command(flatten)]
    pipeline: PipelineArgs,

    /// Maximum announcements to retry
    #[arg(short, long, default_value = "100")]
    limit: i64,

    /// Concurrent classification calls
    #[arg(short, long, default_value = "3")]
    concurrency: usize,
}

#[derive(Args, Debug)]
struct ResultsArgs {
    /// Run id
    #[arg(required = true)]
    run_id: String,

    #[arg(short, long, default_value = "1")]
    page: u32,

    #[arg(long, default_value = "20")]
    page_size: u32,

    /// Only relevant announcements
    #[arg(short, long)]
    relevant_only: bool,

    /// Only announcements scored 0.7 or higher
    #[arg(short, long)]
    ai_verified_only: bool,

    #[command(flatten)]
    format: FormatArgs,
}

#[derive(Args, Debug)]
struct FormatArgs {
    /// Output format (text|json)
    #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
    format: String,
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[command(flatten)]
    pipeline: PipelineArgs,

    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _otel = telemetry::init_tracing_subscriber(cli.log_dir.as_deref())?;

    let Some(command) = cli.command else {
        let _ = Cli::parse_from(["bojo", "--help"]);
        return Ok(());
    };

    let db_path = cli.database.to_string_lossy().to_string();
    let db = Database::new_from_path(&db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path))?;

    match command {
        Commands::Regions(RegionsCommand::Import { file }) => import_regions(&db, file).await?,
        Commands::Regions(RegionsCommand::List { all }) => list_regions(&db, all).await?,
        Commands::Crawl(args) => {
            settle_runs(&db).await?;
            crawl_command(db, args).await?
        }
        Commands::Reclassify(args) => reclassify_command(db, args).await?,
        Commands::Results(args) => results_command(&db, args).await?,
        Commands::Dashboard(args) => dashboard_command(&db, args).await?,
        Commands::Expire => {
            let expired = db.mark_expired(Utc::now().date_naive()).await?;
            println!("Marked {} announcements as expired", expired);
        }
        Commands::Serve(args) => {
            settle_runs(&db).await?;
            let orchestrator = build_orchestrator(db.clone(), &args.pipeline, true)?;
            server::serve(AppState { db, orchestrator }, args.bind).await?;
        }
    }

    Ok(())
}

/// Close runs a previous process left `pending` or `running`
async fn settle_runs(db: &Database) -> anyhow::Result<()> {
    for run in db.settle_interrupted_runs().await? {
        warn!("Closed interrupted run {} as {}", run.run_id, run.status);
    }
    Ok(())
}

/// Gemini with retries when a key is configured, keywords otherwise
fn build_classifier(args: &PipelineArgs) -> anyhow::Result<Arc<dyn Classifier>> {
    let config = ClassifierConfig::builder()
        .model(args.model.clone())
        .requests_per_minute(args.rpm)
        .build();

    if std::env::var("GEMINI_API_KEY").map_or(true, |key| key.trim().is_empty()) {
        warn!("GEMINI_API_KEY not set; using the keyword classifier");
        return Ok(Arc::new(KeywordClassifier::default()));
    }

    let client = Client::new_gemini_from_env(&args.model, args.rpm)?;
    let gemini: Arc<dyn Classifier> = Arc::new(GeminiClassifier::new(
        client.completion().clone(),
        config.clone(),
    ));
    Ok(Arc::new(RetryingClassifier::new(gemini, &config)))
}

fn build_orchestrator(
    db: Database,
    args: &PipelineArgs,
    follow_details: bool,
) -> anyhow::Result<Orchestrator> {
    let mode = if args.http {
        FetchMode::Http
    } else {
        FetchMode::Browser
    };
    let fetcher = Fetcher::new(
        FetcherConfig::builder()
            .page_timeout(Duration::from_secs(args.page_timeout))
            .remote_url(args.browser_url.clone())
            .build(),
    )?;
    let extractor = Extractor::new(&ExtractorConfig::default())?;
    let config = OrchestratorConfig::builder()
        .batch_size(args.batch_size)
        .fetch_mode(mode)
        .follow_details(follow_details)
        .build();

    Ok(Orchestrator::new(
        db.clone(),
        Arc::new(db),
        Arc::new(fetcher),
        Arc::new(extractor),
        build_classifier(args)?,
        config,
    ))
}

async fn import_regions(db: &Database, file: PathBuf) -> anyhow::Result<()> {
    let content = tokio::fs::read_to_string(&file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let regions: Vec<RegionSource> = serde_json::from_str(&content)?;
    for region in &regions {
        db.upsert_region(region).await?;
    }
    println!("Imported {} regions", regions.len());
    Ok(())
}

async fn list_regions(db: &Database, all: bool) -> anyhow::Result<()> {
    let regions = db.list_regions(!all).await?;
    println!("Regions: {}", regions.len());
    for region in regions {
        println!(
            "{} {} ({}){} - {}",
            region.region_code,
            region.region_name,
            region.region_type,
            if region.is_active { "" } else { " [inactive]" },
            region.url
        );
    }
    Ok(())
}

#[instrument(skip(db))]
async fn crawl_command(db: Database, args: CrawlArgs) -> anyhow::Result<()> {
    let orchestrator = build_orchestrator(db.clone(), &args.pipeline, !args.no_details)?;
    let total = if args.regions.is_empty() {
        db.list_regions(true).await?.len()
    } else {
        args.regions.len()
    };

    let (progress_sender, mut progress_receiver) = mpsc::channel::<RegionProgress>(100);

    let progress_bar = ProgressBar::new(total as u64);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({eta}) {msg}")?
            .progress_chars("##-"),
    );
    progress_bar.set_message("Crawling regions...");

    let progress_handle = tokio::spawn({
        let progress_bar = progress_bar.clone();
        async move {
            let mut failed = 0;
            while let Some(progress) = progress_receiver.recv().await {
                if progress.status == CrawlLogStatus::Failed {
                    failed += 1;
                }
                progress_bar.set_length(progress.total as u64);
                progress_bar.inc(1);
                progress_bar.set_message(format!(
                    "{} {} ({} found, {} relevant)",
                    progress.region_code,
                    progress.status,
                    progress.announcements_found,
                    progress.relevant_found
                ));
            }
            progress_bar.finish_with_message(format!("Crawl completed, {} regions failed", failed));
        }
    });

    let options = RunOptions {
        force: Some(args.force),
        follow_details: Some(!args.no_details),
        regions: (!args.regions.is_empty()).then_some(args.regions),
    };
    let run = orchestrator.run(options, Some(progress_sender)).await?;
    let _ = progress_handle.await;

    println!("Run {} finished as {}", run.run_id, run.status);
    println!(
        "Regions: {} succeeded, {} failed of {}",
        run.regions_succeeded, run.regions_failed, run.regions_total
    );
    println!("New announcements: {}", run.new_announcement_count);
    if let Some(ms) = run.duration_ms {
        println!("Duration: {:.1}s", ms as f64 / 1000.0);
    }

    for log in db.logs_for_run(&run.run_id).await? {
        if let Some(error) = log.error_message {
            println!(
                "  {} {}: {}",
                log.region_code.as_deref().unwrap_or("-"),
                log.status,
                error
            );
        }
    }

    Ok(())
}

#[instrument(skip(db))]
async fn reclassify_command(db: Database, args: ReclassifyArgs) -> anyhow::Result<()> {
    let orchestrator = build_orchestrator(db, &args.pipeline, true)?;
    let summary = orchestrator
        .reclassify_pending(args.limit, args.concurrency)
        .await?;
    println!(
        "Reclassified {}/{} announcements ({} still failing)",
        summary.succeeded, summary.attempted, summary.failed
    );
    Ok(())
}

async fn results_command(db: &Database, args: ResultsArgs) -> anyhow::Result<()> {
    let params = RunResultsQuery {
        page: args.page,
        page_size: args.page_size,
        relevant_only: args.relevant_only,
        ai_verified_only: args.ai_verified_only,
    };
    let page = query::run_announcements(db, &args.run_id, &params).await?;

    match args.format.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&page)?),
        _ => {
            println!(
                "Page {}/{} ({} announcements)",
                page.pagination.page, page.pagination.total_pages, page.pagination.total
            );
            for a in &page.announcements {
                let score = a
                    .relevance_score
                    .map(|s| format!("{:.2}", s))
                    .unwrap_or_else(|| "-".to_string());
                println!("[{}] {} {} ({})", score, a.region_name, a.title, a.status);
                println!("   URL: {}", a.source_url);
                if a.application_period_start.is_some() || a.application_period_end.is_some() {
                    println!(
                        "   Period: {} ~ {}",
                        a.application_period_start.as_deref().unwrap_or("?"),
                        a.application_period_end.as_deref().unwrap_or("?")
                    );
                }
                if let Some(amount) = &a.support_amount {
                    println!("   Support: {}", amount);
                }
                println!();
            }
        }
    }
    Ok(())
}

async fn dashboard_command(db: &Database, args: FormatArgs) -> anyhow::Result<()> {
    let stats = query::dashboard_stats(db, Utc::now().date_naive()).await?;

    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&stats)?),
        _ => {
            println!("Relevant announcements: {}", stats.total_relevant);
            println!("Unread: {}", stats.unread_relevant);
            println!("Expiring within a week: {}", stats.expiring_soon);
            println!("By status:");
            for (status, count) in &stats.by_status {
                println!("  {}: {}", status, count);
            }
            println!("By region type:");
            for (region_type, count) in &stats.by_region_type {
                println!("  {}: {}", region_type, count);
            }
            if let Some(run) = &stats.latest_run {
                println!(
                    "Latest run: {} ({}, started {})",
                    run.run_id, run.status, run.started_at
                );
                let failed = stats
                    .latest_logs
                    .iter()
                    .filter(|l| l.status == CrawlLogStatus::Failed)
                    .count();
                println!("  {} regions logged, {} failed", stats.latest_logs.len(), failed);
            }
        }
    }
    Ok(())
}
