use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dor_config::ConfigLoader;
use dor_core::{OracleContext, OracleRunner};
use dor_registry::create_registry;
use dor_sources::{create_sources, resolve_source};
use dor_storage::create_storage;
use dor_types::{CycleMode, CycleOutcome, CycleRecord, OracleConfig, SourceId};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};

mod logging;

#[derive(Parser)]
#[command(name = "dor-oracle")]
#[command(about = "Decentralized Offered Rate oracle", long_about = None)]
struct Cli {
	#[command(subcommand)]
	command: Option<Commands>,

	#[arg(short, long, value_name = "FILE", default_value = "config/oracle.toml")]
	config: PathBuf,

	/// Overrides the configured log level
	#[arg(long)]
	log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
	/// Collect, aggregate and push one cycle
	Run,
	/// Collect and aggregate, then project the push without submitting
	DryRun,
	/// Push on a fixed interval until interrupted
	Schedule {
		/// Overrides `oracle.schedule_interval_secs`
		#[arg(long, value_name = "SECONDS")]
		interval: Option<u64>,
	},
	/// Validate the configuration file
	Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	let config = ConfigLoader::new()
		.with_file(&cli.config)
		.load()
		.await
		.with_context(|| format!("Failed to load configuration from {:?}", cli.config))?;

	logging::init_tracing(&config.logging, cli.log_level.as_deref())?;

	match cli.command {
		Some(Commands::Run) | None => run_once(config, CycleMode::Run).await,
		Some(Commands::DryRun) => run_once(config, CycleMode::DryRun).await,
		Some(Commands::Schedule { interval }) => schedule(config, interval).await,
		Some(Commands::Validate) => validate_config(&config),
	}
}

fn build_runner(config: OracleConfig) -> Result<OracleRunner> {
	let registry = create_registry(&config.registry).context("Failed to create registry client")?;
	let sources = create_sources(&config.sources).context("Failed to build rate sources")?;
	let storage = config
		.storage
		.enabled
		.then(|| Arc::new(create_storage(&config.storage)));

	let runner = OracleRunner::new(OracleContext::new(config, registry), sources);
	Ok(match storage {
		Some(storage) => runner.with_storage(storage),
		None => runner,
	})
}

async fn run_once(config: OracleConfig, mode: CycleMode) -> Result<()> {
	info!(name = %config.oracle.name, ?mode, "Starting DOR oracle");
	let runner = build_runner(config)?;

	let record = runner.run_cycle(mode).await;
	print_record(&record)?;

	if let Some((stage, message)) = record.failure() {
		bail!("Cycle failed at {} stage: {}", stage, message);
	}
	Ok(())
}

fn print_record(record: &CycleRecord) -> Result<()> {
	let rendered = match &record.outcome {
		CycleOutcome::DryRun(report) => serde_json::to_string_pretty(report)?,
		_ => serde_json::to_string_pretty(record)?,
	};
	println!("{}", rendered);
	Ok(())
}

async fn schedule(config: OracleConfig, interval: Option<u64>) -> Result<()> {
	let interval = interval
		.map(Duration::from_secs)
		.unwrap_or_else(|| config.oracle.schedule_interval());
	if interval.is_zero() {
		bail!("Schedule interval must be greater than zero");
	}

	info!(name = %config.oracle.name, "Starting DOR oracle scheduler");
	let runner = build_runner(config)?;

	let cycles = runner.run_scheduled(interval, setup_shutdown_signal()).await;
	info!(cycles, "DOR oracle stopped");
	Ok(())
}

fn validate_config(config: &OracleConfig) -> Result<()> {
	info!("Configuration is valid");
	info!("Instance: {}", config.oracle.name);
	info!(
		"Registry: {} on chain {} via {}",
		config.registry.contract_address, config.registry.chain_id, config.registry.rpc_url
	);

	for source in SourceId::ALL {
		let resolved = resolve_source(&config.sources, source);
		info!(
			"  {} ({}): weight {} bps, {} endpoint(s), fallback {} bps",
			source,
			source.display_name(),
			source.weight_bps(),
			resolved.endpoints.len(),
			resolved.fallback_bps
		);
	}

	Ok(())
}

async fn setup_shutdown_signal() {
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
		_ = ctrl_c => {},
		_ = terminate => {},
	}
	info!("Shutdown signal received, finishing the current cycle");
}
