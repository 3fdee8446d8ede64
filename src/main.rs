// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! SmartParse: stability-aware file describer and organizer
//!
//! Waits for dropped files to finish writing, asks a local model what they
//! contain, and files them into category folders under descriptive names.

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use smartparse::config::AppConfig;
use smartparse::describer::{ResilientDescriber, RetryPolicy};
use smartparse::ollama::OllamaClient;
use smartparse::oplog::{OperationLog, Outcome};
use smartparse::pipeline::Pipeline;
use smartparse::scheduler::{RunSummary, Scheduler};
use smartparse::watcher::FileWatcher;

/// SmartParse CLI - describe, rename and sort dropped files
#[derive(Parser, Debug)]
#[command(name = "smartparse")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version)]
#[command(about = "Describe, rename and sort files dropped into a folder", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (JSON format)
    #[arg(short, long, default_value = "config.json", global = true)]
    config: PathBuf,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable trace logging (most verbose)
    #[arg(long, global = true)]
    trace: bool,

    /// Suppress non-essential output (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Directory to process (overrides config)
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// Root for the category folders (overrides config)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Describe and log without moving or marking files
    #[arg(long)]
    dry_run: bool,

    /// Skip the model server health check on startup
    #[arg(long)]
    skip_health_check: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Process every eligible file once, then exit
    Run(RunArgs),

    /// Process existing files, then keep watching for new ones
    Watch(RunArgs),

    /// Show recent operation log entries
    Log {
        /// Number of entries to show
        #[arg(short = 'n', long, default_value = "10")]
        count: usize,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Show model server status
    Status,

    /// Create a default configuration and watch folder
    Init {
        /// Directory to initialize (default: current)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Force overwrite existing configuration
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Generate default configuration file
    Generate {
        /// Output file path
        #[arg(short, long, default_value = "config.json")]
        output: PathBuf,
    },

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if !cli.quiet {
        info!("SmartParse v{}", env!("CARGO_PKG_VERSION"));
    }

    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("loading configuration from {:?}", cli.config))?;

    match cli.command {
        Some(Commands::Run(args)) => run(config, args, false).await,
        Some(Commands::Watch(args)) => run(config, args, true).await,
        Some(Commands::Log { count }) => show_log(&config, count),
        Some(Commands::Config { action }) => run_config_command(config, action, &cli.config),
        Some(Commands::Status) => run_status(config).await,
        Some(Commands::Init { dir, force }) => run_init(dir, force),
        None => run(config, RunArgs::default(), false).await,
    }
}

/// Single run, optionally followed by watch mode
async fn run(mut config: AppConfig, args: RunArgs, keep_watching: bool) -> anyhow::Result<()> {
    if let Some(dir) = args.dir {
        config.watch_path = dir.to_string_lossy().into_owned();
    }
    if let Some(output) = args.output {
        config.output_root = Some(output.to_string_lossy().into_owned());
    }

    info!("Watch directory: {:?}", config.watch_path);
    if args.dry_run {
        warn!("DRY RUN MODE - files will not be moved or marked");
    }

    let client = OllamaClient::from_config(&config).context("building model client")?;
    if args.skip_health_check {
        warn!("Skipping model server health check");
    } else {
        check_engine(&client, &config).await?;
    }

    let describer = ResilientDescriber::new(client, RetryPolicy::from_config(&config.ai_engine));
    let pipeline = Pipeline::new(config, Arc::new(describer))
        .context("starting pipeline")?
        .with_dry_run(args.dry_run);
    let pipeline = Arc::new(pipeline);
    let scheduler = Scheduler::new(pipeline.clone());

    let shutdown = shutdown_signal();

    let summary = if keep_watching {
        let config = pipeline.config();
        let (tx, rx) = mpsc::channel(config.scheduler.queue_capacity.max(1));
        let _watcher = FileWatcher::start(
            pipeline.watch_root(),
            pipeline.filter().clone(),
            Duration::from_millis(config.scheduler.debounce_ms),
            tx,
        )
        .context("starting file watcher")?;

        info!("Watcher active. Press Ctrl+C to stop.");
        scheduler.watch(rx, shutdown).await?
    } else {
        scheduler.run_once(&shutdown).await?
    };

    report(&summary);
    Ok(())
}

async fn check_engine(client: &OllamaClient, config: &AppConfig) -> anyhow::Result<()> {
    info!("Checking model server availability...");
    client
        .health_check()
        .await
        .with_context(|| format!("model server at {} is not reachable", config.ai_engine.url))?;

    let models = client.list_models().await?;
    for wanted in [&config.ai_engine.models.vision, &config.ai_engine.models.text] {
        if models.iter().any(|m| m.starts_with(wanted.as_str())) {
            info!("Model '{}' available", wanted);
        } else {
            warn!("Model '{}' not found. Available: {:?}", wanted, models);
        }
    }
    Ok(())
}

/// Flip the returned receiver on Ctrl+C or SIGTERM
fn shutdown_signal() -> watch::Receiver<bool> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    error!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, finishing current file..."),
            _ = terminate => info!("Received SIGTERM, finishing current file..."),
        }

        let _ = shutdown_tx.send(true);
    });

    shutdown_rx
}

fn report(summary: &RunSummary) {
    info!(
        "Done: {} renamed, {} failed, {} batch(es){}",
        summary.renamed,
        summary.failed,
        summary.batches.len(),
        if summary.cancelled { " (cancelled)" } else { "" }
    );
}

fn show_log(config: &AppConfig, count: usize) -> anyhow::Result<()> {
    let path = Path::new(&config.log_path);
    let entries = OperationLog::recent(path, count)
        .with_context(|| format!("reading operation log {:?}", path))?;

    println!("Recent operations ({} entries):", entries.len());
    for entry in entries {
        let time = entry.timestamp.format("%Y-%m-%d %H:%M");
        match entry.outcome {
            Outcome::Success => println!(
                "  {} OK     {} -> {}",
                time,
                entry.source.display(),
                entry.destination.as_deref().map(|d| d.display().to_string()).unwrap_or_default()
            ),
            Outcome::Failure => println!(
                "  {} FAILED {} ({})",
                time,
                entry.source.display(),
                entry.reason.as_deref().unwrap_or("unknown reason")
            ),
        }
    }
    Ok(())
}

fn run_config_command(config: AppConfig, action: ConfigCommands, config_path: &Path) -> anyhow::Result<()> {
    match action {
        ConfigCommands::Show => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigCommands::Generate { output } => {
            AppConfig::default().save(&output)?;
            println!("Generated config at {:?}", output);
        }
        ConfigCommands::Validate => {
            // load already validated it
            println!("Configuration at {:?} is valid", config_path);
            println!("  Watch path: {}", config.watch_path);
            println!("  Batch size: {}", config.scheduler.batch_size);
            println!("  Queue capacity: {}", config.scheduler.queue_capacity);
            println!("  Vision model: {}", config.ai_engine.models.vision);
            println!("  Text model: {}", config.ai_engine.models.text);
        }
    }
    Ok(())
}

async fn run_status(config: AppConfig) -> anyhow::Result<()> {
    let client = OllamaClient::from_config(&config)?;

    println!("SmartParse v{} Status", env!("CARGO_PKG_VERSION"));
    println!("=======================");

    match client.health_check().await {
        Ok(()) => println!("Model server: Running ({})", config.ai_engine.url),
        Err(e) => println!("Model server: Error - {}", e),
    }

    match client.list_models().await {
        Ok(models) => {
            println!("\nAvailable models:");
            for m in &models {
                let in_use = m.starts_with(config.ai_engine.models.vision.as_str())
                    || m.starts_with(config.ai_engine.models.text.as_str());
                println!("  {} {}", if in_use { "*" } else { " " }, m);
            }
        }
        Err(e) => println!("  Error listing models: {}", e),
    }

    println!("\nConfiguration:");
    println!("  Watch path: {}", config.watch_path);
    println!("  Output root: {:?}", config.output_root());
    println!("  Log: {}", config.log_path);
    println!("  Credential: {}", if config.api_key().is_some() { "set" } else { "none" });

    Ok(())
}

fn run_init(dir: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let target = dir.unwrap_or_else(|| PathBuf::from("."));
    let config_path = target.join("config.json");

    if config_path.exists() && !force {
        bail!("{:?} already exists. Use --force to overwrite", config_path);
    }

    let watch_dir = target.join("inbox");
    std::fs::create_dir_all(&watch_dir)
        .with_context(|| format!("creating {:?}", watch_dir))?;

    let config = AppConfig {
        watch_path: watch_dir.to_string_lossy().into_owned(),
        log_path: target.join("smartparse_log.jsonl").to_string_lossy().into_owned(),
        ..AppConfig::default()
    };
    config.save(&config_path)?;

    println!("SmartParse initialized in {:?}", target);
    println!("\nCreated:");
    println!("  - config.json");
    println!("  - inbox/");
    println!("\nNext: drop files into inbox/ and run `smartparse watch`");

    Ok(())
}
