use anyhow::{anyhow, Result};
use dor_types::{LogFormat, LoggingConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global subscriber.
///
/// `RUST_LOG` wins over `level_override`, which wins over the configured level.
pub fn init_tracing(config: &LoggingConfig, level_override: Option<&str>) -> Result<()> {
	let level = level_override.unwrap_or(&config.level);
	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

	let registry = tracing_subscriber::registry().with(env_filter);
	let initialized = match config.format {
		LogFormat::Json => registry
			.with(
				tracing_subscriber::fmt::layer()
					.json()
					.with_current_span(false)
					.with_target(true),
			)
			.try_init(),
		LogFormat::Pretty => registry
			.with(tracing_subscriber::fmt::layer().with_target(false))
			.try_init(),
	};

	initialized.map_err(|e| anyhow!("Failed to initialize tracing: {}", e))
}
