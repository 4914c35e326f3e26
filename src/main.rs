// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use pihole_reconciler::{
    config::{load_desired, FleetConfig},
    entity::Kind,
    metrics,
    reconcilers::{differ, Reconciler},
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, error, info, warn};

/// Declarative reconciliation of Pi-hole groups, clients, lists and local DNS
#[derive(Parser)]
#[command(name = "pihole-reconciler", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SourceArgs {
    /// Fleet configuration file (instances, options and desired state)
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Additional desired-state document, applied after the configuration
    /// file (repeatable; later files win)
    #[arg(short = 'd', long = "desired", value_name = "FILE")]
    desired: Vec<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one reconciliation pass against the configured instances
    Apply {
        #[command(flatten)]
        source: SourceArgs,

        /// Only reconcile this instance (repeatable)
        #[arg(long = "instance", value_name = "NAME")]
        instances: Vec<String>,

        /// Report format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,

        /// Write Prometheus metrics to this file after the run
        #[arg(long, value_name = "PATH")]
        metrics_file: Option<PathBuf>,

        /// Exit successfully even if some results failed
        #[arg(long)]
        allow_failures: bool,

        /// Dry run: read and diff every instance, report what would change,
        /// change nothing
        #[arg(long)]
        check: bool,
    },
    /// Load and validate the configuration without contacting any instance
    Validate {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Print shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(
            shell,
            &mut Cli::command(),
            "pihole-reconciler",
            &mut std::io::stdout(),
        );
        return Ok(ExitCode::SUCCESS);
    }

    init_tracing();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("pihole-reconciler")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(cli.command))
}

/// Logging goes to stderr so that stdout carries only the report.
///
/// Respects `RUST_LOG` (default `info`) and `RUST_LOG_FORMAT=json`.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }

    debug!("Logging initialized with file and line number tracking");
}

async fn async_main(command: Commands) -> Result<ExitCode> {
    match command {
        Commands::Apply {
            source,
            instances,
            output,
            metrics_file,
            allow_failures,
            check,
        } => {
            let run = ApplyRun {
                instances: &instances,
                output,
                metrics_file: metrics_file.as_deref(),
                allow_failures,
                check,
            };
            run_apply(&source, &run).await
        }
        Commands::Validate { source } => run_validate(&source),
        Commands::Completions { .. } => Ok(ExitCode::SUCCESS),
    }
}

/// Flags of one `apply` invocation.
struct ApplyRun<'a> {
    instances: &'a [String],
    output: OutputFormat,
    metrics_file: Option<&'a Path>,
    allow_failures: bool,
    check: bool,
}

async fn run_apply(source: &SourceArgs, run: &ApplyRun<'_>) -> Result<ExitCode> {
    let config = load_config(source)?;
    config
        .validate()
        .with_context(|| format!("invalid configuration {}", source.config.display()))?;

    let clients = config
        .build_clients(run.instances)
        .context("failed to set up instance clients")?;
    let mut options = config.reconcile_options();
    options.dry_run = run.check;
    let reconciler = Reconciler::new(options);

    info!(
        instances = clients.len(),
        dry_run = run.check,
        "Starting pihole-reconciler"
    );
    let report = reconciler
        .reconcile(&clients, &config.desired_state())
        .await
        .context("reconciliation could not start")?;

    match run.output {
        OutputFormat::Text => println!("{report}"),
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&report).context("failed to serialize report")?
        ),
    }

    if let Some(path) = run.metrics_file {
        write_metrics(path).await?;
    }

    if report.has_failures() {
        if run.allow_failures {
            warn!(
                failed = report.summary.failed,
                "Reconciliation finished with failures (allowed)"
            );
        } else {
            error!(failed = report.summary.failed, "Reconciliation finished with failures");
            return Ok(ExitCode::FAILURE);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn run_validate(source: &SourceArgs) -> Result<ExitCode> {
    let config = load_config(source)?;
    config
        .validate()
        .with_context(|| format!("invalid configuration {}", source.config.display()))?;

    let desired = config.desired_state();
    println!("configuration OK: {} instance(s)", config.instances.len());
    for kind in Kind::PROCESSING_ORDER {
        let Some(records) = desired.get(&kind) else {
            continue;
        };
        let (unique, conflicts) = differ::dedupe(records);
        println!("  {kind}: {} record(s)", unique.len());
        for conflict in conflicts {
            println!("warning   {conflict}");
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn load_config(source: &SourceArgs) -> Result<FleetConfig> {
    let mut config = FleetConfig::load(&source.config)
        .with_context(|| format!("failed to load {}", source.config.display()))?;
    for path in &source.desired {
        let extra = load_desired(path)
            .with_context(|| format!("failed to load {}", path.display()))?;
        config.layer(extra);
    }
    Ok(config)
}

/// Write metrics in text format, replacing `path` atomically.
async fn write_metrics(path: &Path) -> Result<()> {
    let text = metrics::gather_metrics().context("failed to gather metrics")?;
    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    let staging = PathBuf::from(staging);

    tokio::fs::write(&staging, text)
        .await
        .with_context(|| format!("failed to write {}", staging.display()))?;
    tokio::fs::rename(&staging, path)
        .await
        .with_context(|| format!("failed to move metrics into {}", path.display()))?;
    debug!(path = %path.display(), "Wrote metrics");
    Ok(())
}
