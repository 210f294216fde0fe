//! Configuration loading for the DOR oracle.
//!
//! A loader reads one TOML file, expands `${NAME}` references from the
//! environment, lets `DOR_`-prefixed variables override the secrets and
//! endpoints, and refuses to hand out a config that fails validation.

use dor_types::{OracleConfig, RetryConfig, SourceId};
use regex::Regex;
use std::env;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;
use tracing::debug;

const DEFAULT_ENV_PREFIX: &str = "DOR_";

#[derive(Debug, Error)]
pub enum ConfigError {
	/// No path was given, or nothing exists at it.
	#[error("Configuration file not found: {0}")]
	Missing(String),

	#[error("Failed to read configuration: {0}")]
	Io(#[from] std::io::Error),

	#[error("Malformed TOML: {0}")]
	Toml(String),

	/// A `${NAME}` reference names a variable that is not set.
	#[error("Unset environment variable referenced: {0}")]
	UnsetVariable(String),

	#[error("Invalid configuration: {0}")]
	Invalid(String),
}

/// Builds an [`OracleConfig`] from a file and the process environment.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
	path: Option<PathBuf>,
	env_prefix: String,
}

impl Default for ConfigLoader {
	fn default() -> Self {
		Self {
			path: None,
			env_prefix: DEFAULT_ENV_PREFIX.to_string(),
		}
	}
}

impl ConfigLoader {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
		self.path = Some(path.as_ref().to_path_buf());
		self
	}

	/// Prefix of the override variables.
	pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.env_prefix = prefix.into();
		self
	}

	pub async fn load(&self) -> Result<OracleConfig, ConfigError> {
		let path = self
			.path
			.as_deref()
			.ok_or_else(|| ConfigError::Missing("no path given".to_string()))?;

		let content = match tokio::fs::read_to_string(path).await {
			Ok(content) => content,
			Err(e) if e.kind() == ErrorKind::NotFound => {
				return Err(ConfigError::Missing(path.display().to_string()))
			}
			Err(e) => return Err(e.into()),
		};
		self.load_from_str(&content)
	}

	/// Same pipeline as [`load`](Self::load) minus the file read.
	pub fn load_from_str(&self, content: &str) -> Result<OracleConfig, ConfigError> {
		let expanded = substitute_env_vars(content)?;
		let mut config: OracleConfig =
			toml::from_str(&expanded).map_err(|e| ConfigError::Toml(e.to_string()))?;

		self.apply_env_overrides(&mut config)?;
		validate_config(&config)?;
		Ok(config)
	}

	fn apply_env_overrides(&self, config: &mut OracleConfig) -> Result<(), ConfigError> {
		let var = |name: &str| env::var(format!("{}{}", self.env_prefix, name)).ok();
		let mut applied = Vec::new();

		if let Some(level) = var("LOG_LEVEL") {
			config.logging.level = level;
			applied.push("LOG_LEVEL");
		}
		if let Some(url) = var("RPC_URL") {
			config.registry.rpc_url = url;
			applied.push("RPC_URL");
		}
		if let Some(key) = var("PRIVATE_KEY") {
			config.registry.private_key = key;
			applied.push("PRIVATE_KEY");
		}
		if let Some(raw) = var("CHAIN_ID") {
			config.registry.chain_id = raw
				.parse()
				.map_err(|e| invalid(format!("{}CHAIN_ID: {}", self.env_prefix, e)))?;
			applied.push("CHAIN_ID");
		}

		if !applied.is_empty() {
			debug!(prefix = %self.env_prefix, ?applied, "Applied environment overrides");
		}
		Ok(())
	}
}

fn env_reference() -> &'static Regex {
	static PATTERN: OnceLock<Regex> = OnceLock::new();
	PATTERN.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("literal pattern compiles"))
}

/// Expands every `${NAME}` in a single left-to-right pass.
fn substitute_env_vars(content: &str) -> Result<String, ConfigError> {
	let mut expanded = String::with_capacity(content.len());
	let mut tail = 0;

	for caps in env_reference().captures_iter(content) {
		let (Some(reference), Some(name)) = (caps.get(0), caps.get(1)) else {
			continue;
		};
		let value = env::var(name.as_str())
			.map_err(|_| ConfigError::UnsetVariable(name.as_str().to_string()))?;

		expanded.push_str(&content[tail..reference.start()]);
		expanded.push_str(&value);
		tail = reference.end();
	}

	expanded.push_str(&content[tail..]);
	Ok(expanded)
}

fn validate_config(config: &OracleConfig) -> Result<(), ConfigError> {
	let registry = &config.registry;

	if !(registry.rpc_url.starts_with("http://") || registry.rpc_url.starts_with("https://")) {
		return Err(invalid("RPC URL must start with http:// or https://"));
	}

	if registry.chain_id == 0 {
		return Err(invalid("chain_id must be greater than zero"));
	}

	let key = registry
		.private_key
		.strip_prefix("0x")
		.unwrap_or(&registry.private_key);
	if key.len() != 64 || hex::decode(key).is_err() {
		return Err(invalid(
			"Private key must be 64 hex characters (32 bytes)",
		));
	}

	let address = registry
		.contract_address
		.strip_prefix("0x")
		.ok_or_else(|| invalid("Contract address must start with 0x"))?;
	if address.len() != 40 || hex::decode(address).is_err() {
		return Err(invalid("Contract address must be 20 hex-encoded bytes"));
	}

	validate_retry("sources.retry", &config.sources.retry)?;
	validate_retry("registry.retry", &registry.retry)?;

	if config.sources.request_timeout_secs == 0 {
		return Err(invalid("sources.request_timeout_secs must be greater than zero"));
	}

	for (name, source_override) in &config.sources.overrides {
		let source: SourceId = name
			.parse()
			.map_err(|e: dor_types::UnknownSource| invalid(e.to_string()))?;

		if let Some(fallback) = source_override.fallback_bps {
			if fallback < 0 {
				return Err(invalid(format!(
					"Fallback rate for {} must not be negative",
					source
				)));
			}
		}

		if let Some(endpoints) = &source_override.endpoints {
			for endpoint in endpoints {
				if !(endpoint.url.starts_with("http://") || endpoint.url.starts_with("https://"))
				{
					return Err(invalid(format!(
						"Endpoint URL for {} must be http(s): {}",
						source, endpoint.url
					)));
				}
			}
		}
	}

	if config.breaker.failure_threshold == 0 {
		return Err(invalid("breaker.failure_threshold must be at least 1"));
	}
	if config.breaker.half_open_max_attempts == 0 {
		return Err(invalid("breaker.half_open_max_attempts must be at least 1"));
	}

	if config.oracle.schedule_interval_secs == 0 {
		return Err(invalid("oracle.schedule_interval_secs must be greater than zero"));
	}

	Ok(())
}

fn validate_retry(section: &str, retry: &RetryConfig) -> Result<(), ConfigError> {
	if retry.max_attempts == 0 {
		return Err(invalid(format!("{}.max_attempts must be at least 1", section)));
	}
	if retry.multiplier < 1.0 || !retry.multiplier.is_finite() {
		return Err(invalid(format!("{}.multiplier must be >= 1.0", section)));
	}
	if retry.base_delay_ms > retry.max_delay_ms {
		return Err(invalid(format!(
			"{}.base_delay_ms must not exceed max_delay_ms",
			section
		)));
	}
	Ok(())
}

fn invalid(message: impl Into<String>) -> ConfigError {
	ConfigError::Invalid(message.into())
}
