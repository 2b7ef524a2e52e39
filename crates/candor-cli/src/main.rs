use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use candor_storage::{CandidateStore, MemoryCandidateStore, PgCandidateStore};
use candor_sync::{IngestPipeline, IngestSettings, RunReport};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "candor")]
#[command(about = "Candidate record ingestion and reconciliation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Ingest every profile file once and print the run report.
    Ingest(IngestArgs),
    /// Apply the candidates table migrations.
    Migrate {
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
}

#[derive(Debug, Args)]
struct IngestArgs {
    /// YAML settings file; flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, env = "CANDOR_PROFILE_DIR")]
    profile_dir: Option<PathBuf>,

    #[arg(long, env = "CANDOR_SUMMARY_DIR")]
    summary_dir: Option<PathBuf>,

    #[arg(long, env = "CANDOR_LINKEDIN_DIR")]
    linkedin_dir: Option<PathBuf>,

    #[arg(long, env = "CANDOR_GITHUB_DIR")]
    github_dir: Option<PathBuf>,

    #[arg(long, env = "CANDOR_CONCURRENCY")]
    concurrency: Option<usize>,

    #[arg(long, env = "CANDOR_MAX_RETRIES")]
    max_retries: Option<u32>,

    #[arg(long)]
    retry_delay_ms: Option<u64>,

    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Reconcile against an in-memory store instead of PostgreSQL.
    #[arg(long)]
    dry_run: bool,

    /// Also write the full report as JSON to this path.
    #[arg(long)]
    report_out: Option<PathBuf>,
}

impl IngestArgs {
    fn settings(&self) -> Result<IngestSettings> {
        let mut settings = match &self.config {
            Some(path) => IngestSettings::from_yaml_file(path)?,
            None => IngestSettings::default(),
        };
        if self.profile_dir.is_some() {
            settings.profile_dir = self.profile_dir.clone();
        }
        if self.summary_dir.is_some() {
            settings.summary_dir = self.summary_dir.clone();
        }
        if self.linkedin_dir.is_some() {
            settings.linkedin_dir = self.linkedin_dir.clone();
        }
        if self.github_dir.is_some() {
            settings.github_dir = self.github_dir.clone();
        }
        settings.concurrency = self.concurrency.or(settings.concurrency);
        settings.max_retries = self.max_retries.or(settings.max_retries);
        settings.retry_delay_ms = self.retry_delay_ms.or(settings.retry_delay_ms);
        if self.database_url.is_some() {
            settings.database_url = self.database_url.clone();
        }
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "candor=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Ingest(args) => ingest(args).await,
        Commands::Migrate { database_url } => {
            let store = PgCandidateStore::connect(&database_url, 1).await?;
            store.migrate().await?;
            store.close().await;
            println!("migrations applied");
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn ingest(args: IngestArgs) -> Result<ExitCode> {
    let settings = args.settings()?;
    let config = settings.to_config()?;

    let store: Arc<dyn CandidateStore> = if args.dry_run {
        info!("dry run: using in-memory candidate store");
        Arc::new(MemoryCandidateStore::new())
    } else {
        let Some(url) = settings.database_url.as_deref() else {
            bail!("DATABASE_URL (or --database-url) is required unless --dry-run is set");
        };
        let max_connections = u32::try_from(config.concurrency).unwrap_or(u32::MAX);
        Arc::new(PgCandidateStore::connect(url, max_connections).await?)
    };

    let report = IngestPipeline::new(config, store)
        .run()
        .await
        .context("ingest run aborted")?;

    print_report(&report);
    if let Some(path) = &args.report_out {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    }

    Ok(if report.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_report(report: &RunReport) {
    println!(
        "ingest complete: run_id={} total={} successful={} failed={}",
        report.run_id, report.total_files, report.successful, report.failed
    );
    for (kind, stats) in &report.correlation {
        println!(
            "  {kind}: files={} indexed={} rejected={} unmatched={} malformed={} duplicates={}",
            stats.files,
            stats.indexed,
            stats.rejected,
            stats.unmatched,
            stats.malformed,
            stats.duplicates
        );
    }
    for (file, error) in report.failures() {
        println!("  failed {file}: {error}");
    }
}
