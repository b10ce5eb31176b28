//! Harvester CLI
//!
//! Local execution entry point for discovery, harvest, merge and export.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::{Parser, Subcommand};
use harvester::{
    error::Result,
    models::{Category, Config},
    pipeline::{self, HarvestLoop, HarvestOutcome, RunStatus},
    services::{AgentSource, BackoffPolicy, Fetcher, HttpRender, OwnerSource, TargetSource},
    storage::{self, CheckpointStore, LocalCheckpointStore},
    utils::http,
};

/// Harvester - phone directory builder
#[derive(Parser, Debug)]
#[command(
    name = "harvester",
    version,
    about = "Collects deduplicated agent and owner phone directories"
)]
struct Cli {
    /// Path to storage directory containing config and checkpoints
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Harvest one category until its target is met or discovery is exhausted
    Harvest {
        /// Category to harvest: agents or owners
        category: Category,

        /// Checkpoint slot, for parallel runs on the same category
        #[arg(long)]
        slot: Option<String>,

        /// Override the configured target count
        #[arg(long)]
        target: Option<usize>,
    },

    /// Merge checkpoint/export files into one deduplicated CSV
    Merge {
        /// Input files (.json checkpoints or .csv exports)
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output CSV path
        #[arg(short, long, default_value = "merged.csv")]
        output: PathBuf,
    },

    /// Export a category's checkpoint as CSV
    Export {
        /// Category to export: agents or owners
        category: Category,

        /// Checkpoint slot to read
        #[arg(long)]
        slot: Option<String>,

        /// Output CSV path (default: {storage_dir}/{category}.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show checkpoint progress for both categories
    Status,

    /// Validate the configuration file
    Validate,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli.storage_dir.join("config.toml");
    let config = Config::load_or_default(&config_path);

    match cli.command {
        Command::Harvest {
            category,
            slot,
            target,
        } => {
            config.validate()?;
            let outcome = run_harvest(&cli.storage_dir, &config, category, slot, target).await?;
            report(category, &outcome);
        }

        Command::Merge { inputs, output } => {
            let mut sources = Vec::with_capacity(inputs.len());
            for input in &inputs {
                let source = pipeline::load_source(input)?;
                log::info!("{}: {} keys", source.name, source.keys.len());
                sources.push(source);
            }
            let merged = pipeline::merge_sources(&sources);
            storage::export::export_merged(&output, &merged.keys, &merged.provenance)?;
            log::info!(
                "Merged {} inputs into {} unique keys at {}",
                sources.len(),
                merged.count(),
                output.display()
            );
        }

        Command::Export {
            category,
            slot,
            output,
        } => {
            let store = checkpoint_store(&cli.storage_dir, slot);
            let state = store.load(category).await?;
            let output = output.unwrap_or_else(|| {
                cli.storage_dir.join(format!("{}.csv", category.as_str()))
            });
            storage::export::export_csv(&output, category, &state.phones)?;
            log::info!(
                "Exported {} {} keys to {}",
                state.count(),
                category,
                output.display()
            );
        }

        Command::Status => {
            for category in [Category::Agent, Category::Owner] {
                let store = checkpoint_store(&cli.storage_dir, None);
                let state = store.load(category).await?;
                if state.count() == 0 && state.cursors.is_empty() {
                    log::info!("{category}: no checkpoint yet");
                    continue;
                }
                log::info!(
                    "{category}: {}/{} unique, last persisted {}",
                    state.count(),
                    state.target_count,
                    state.updated_at
                );
                for (endpoint, page) in &state.cursors {
                    log::info!("  {endpoint} -> page {page}");
                }
            }
        }

        Command::Validate => {
            config.validate()?;
            log::info!("Config OK ({} owner endpoints)", config.owners.endpoints.len());
        }
    }

    Ok(())
}

fn checkpoint_store(storage_dir: &PathBuf, slot: Option<String>) -> LocalCheckpointStore {
    let store = LocalCheckpointStore::new(storage_dir);
    match slot {
        Some(slot) => store.with_slot(slot),
        None => store,
    }
}

async fn run_harvest(
    storage_dir: &PathBuf,
    config: &Config,
    category: Category,
    slot: Option<String>,
    target_override: Option<usize>,
) -> Result<HarvestOutcome> {
    let client = http::create_client(&config.http)?;
    let policy = BackoffPolicy::from_config(&config.backoff);
    let mut fetcher = Fetcher::new(client.clone(), &config.http.api_base, policy);
    if let Some(endpoint) = &config.render.endpoint {
        fetcher = fetcher.with_render(Arc::new(HttpRender::new(client, endpoint)));
    }
    let fetcher = Arc::new(fetcher);

    let store = Arc::new(checkpoint_store(storage_dir, slot.clone()));
    let state = store.load(category).await?;

    let mut source: Box<dyn TargetSource> = match category {
        Category::Agent => Box::new(AgentSource::new(
            Arc::clone(&fetcher),
            config.agents.clone(),
            &config.http.api_base,
            &state,
        )),
        Category::Owner => Box::new(OwnerSource::new(
            Arc::clone(&fetcher),
            config.owners.clone(),
            &config.http.api_base,
            &config.http.site_base,
            &state,
        )),
    };

    let target_count = target_override.unwrap_or(match category {
        Category::Agent => config.agents.target_count,
        Category::Owner => config.owners.target_count,
    });

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!("Interrupt received; checkpointing after the current page");
                stop.store(true, Ordering::SeqCst);
            }
        });
    }

    let harvest = HarvestLoop::new(category, fetcher, Arc::clone(&store) as Arc<dyn CheckpointStore>)
        .with_request_delay(Duration::from_millis(config.http.request_delay_ms))
        .with_concurrency(config.http.max_concurrent)
        .with_stop(stop);
    let outcome = harvest.run(source.as_mut(), target_count).await?;

    // Keep a CSV alongside the checkpoint so a run's result is usable as-is.
    let state = store.load(category).await?;
    let csv_name = match &slot {
        Some(slot) => format!("{}-{slot}.csv", category.as_str()),
        None => format!("{}.csv", category.as_str()),
    };
    let csv_path = storage_dir.join(csv_name);
    storage::export::export_csv(&csv_path, category, &state.phones)?;
    log::info!("Exported {} keys to {}", state.count(), csv_path.display());

    Ok(outcome)
}

fn report(category: Category, outcome: &HarvestOutcome) {
    match outcome.status {
        RunStatus::CompletedAtTarget => {
            log::info!(
                "{category}: target reached ({}/{})",
                outcome.unique_count,
                outcome.target_count
            );
        }
        RunStatus::CompletedWithShortfall(shortfall) => {
            log::warn!(
                "{category}: discovery exhausted at {}/{} (short {shortfall})",
                outcome.unique_count,
                outcome.target_count
            );
        }
        RunStatus::Stopped => {
            log::info!(
                "{category}: stopped at {}/{}; re-run to resume",
                outcome.unique_count,
                outcome.target_count
            );
        }
    }
    log::info!(
        "{category}: {} pages, {} novel, {} duplicate, {} rejected, {} failed targets",
        outcome.stats.pages,
        outcome.stats.novel,
        outcome.stats.duplicates,
        outcome.stats.rejected,
        outcome.stats.failed_targets
    );
}
