//! # Configuration Types
//!
//! Configuration structures for every oracle component.
//!
//! All sections except `[registry]` have defaults, so a minimal file only
//! needs the chain connection settings. Defaults mirror the operational
//! constants of the pipeline: three retry attempts starting at one second,
//! a three-failure breaker with a five minute cooldown, and a six hour
//! schedule.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
	#[serde(default)]
	pub oracle: OracleSettings,
	#[serde(default)]
	pub logging: LoggingConfig,
	#[serde(default)]
	pub sources: SourcesConfig,
	pub registry: RegistryConfig,
	#[serde(default)]
	pub breaker: BreakerConfig,
	#[serde(default)]
	pub storage: StorageConfig,
}

/// Core oracle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleSettings {
	/// Instance name, used in logs
	pub name: String,
	/// Interval between cycles in schedule mode
	pub schedule_interval_secs: u64,
	/// Rate change against the on-chain value that triggers a warning
	pub large_change_bps: i64,
	/// Allowed difference between the read-back rate and the local rate
	pub mismatch_tolerance_bps: i64,
}

impl Default for OracleSettings {
	fn default() -> Self {
		Self {
			name: "dor-oracle".to_string(),
			schedule_interval_secs: 6 * 60 * 60,
			large_change_bps: 200,
			mismatch_tolerance_bps: 5,
		}
	}
}

impl OracleSettings {
	pub fn schedule_interval(&self) -> Duration {
		Duration::from_secs(self.schedule_interval_secs)
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
	#[default]
	Pretty,
	Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
	/// Default filter directive, overridden by `RUST_LOG`
	pub level: String,
	pub format: LogFormat,
}

impl Default for LoggingConfig {
	fn default() -> Self {
		Self {
			level: "info".to_string(),
			format: LogFormat::Pretty,
		}
	}
}

/// Exponential backoff parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
	pub max_attempts: u32,
	pub base_delay_ms: u64,
	pub max_delay_ms: u64,
	pub multiplier: f64,
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			max_attempts: 3,
			base_delay_ms: 1_000,
			max_delay_ms: 10_000,
			multiplier: 2.0,
		}
	}
}

/// Unit in which an endpoint reports its rate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateScale {
	/// 4.25 means 4.25%
	#[default]
	Percent,
	/// 0.0425 means 4.25%
	Fraction,
}

/// How to pull a rate out of an endpoint's JSON body.
///
/// Pointers use RFC 6901 syntax (`/data/0/apy`). Each variant tries its
/// pointers in order and takes the first finite number, so an endpoint can
/// tolerate field renames by listing several candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RateParser {
	/// Value at one of `pointers` in the document root.
	Field {
		pointers: Vec<String>,
		#[serde(default)]
		scale: RateScale,
	},
	/// Last element of the array at `array`, then one of `pointers` inside it.
	SeriesLatest {
		array: String,
		pointers: Vec<String>,
		#[serde(default)]
		scale: RateScale,
	},
	/// Element of the array at `array` whose fields match every entry of `filter`.
	PoolLookup {
		array: String,
		filter: BTreeMap<String, String>,
		pointers: Vec<String>,
		#[serde(default)]
		scale: RateScale,
	},
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
	pub url: String,
	pub parser: RateParser,
}

/// Per-source replacement of the built-in endpoint catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceOverride {
	/// Replaces the built-in endpoint list when present
	pub endpoints: Option<Vec<EndpointConfig>>,
	/// Replaces the built-in fallback rate when present
	pub fallback_bps: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
	/// Timeout applied to every upstream HTTP request
	pub request_timeout_secs: u64,
	pub retry: RetryConfig,
	/// Keyed by source name (`TESR`, `AAVE_USDT`, ...)
	pub overrides: BTreeMap<String, SourceOverride>,
}

impl Default for SourcesConfig {
	fn default() -> Self {
		Self {
			request_timeout_secs: 10,
			retry: RetryConfig::default(),
			overrides: BTreeMap::new(),
		}
	}
}

/// Chain connection and push policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
	pub rpc_url: String,
	pub chain_id: u64,
	/// Address of the rate registry contract
	pub contract_address: String,
	/// Hex private key of the updater account
	pub private_key: String,
	/// Maximum acceptable `gas * gas_price` for one update, in wei
	#[serde(default = "default_max_tx_cost_wei")]
	pub max_tx_cost_wei: u128,
	/// Gas limit used when estimation fails
	#[serde(default = "default_gas_limit")]
	pub default_gas_limit: u64,
	#[serde(default = "default_confirmation_timeout_secs")]
	pub confirmation_timeout_secs: u64,
	#[serde(default)]
	pub retry: RetryConfig,
}

fn default_max_tx_cost_wei() -> u128 {
	// 0.05 ETH
	50_000_000_000_000_000
}

fn default_gas_limit() -> u64 {
	500_000
}

fn default_confirmation_timeout_secs() -> u64 {
	180
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
	pub failure_threshold: u32,
	pub reset_timeout_secs: u64,
	pub half_open_max_attempts: u32,
}

impl Default for BreakerConfig {
	fn default() -> Self {
		Self {
			failure_threshold: 3,
			reset_timeout_secs: 300,
			half_open_max_attempts: 2,
		}
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
	#[default]
	File,
	Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
	pub enabled: bool,
	pub backend: StorageBackend,
	/// Base directory for the file backend
	pub path: PathBuf,
}

impl Default for StorageConfig {
	fn default() -> Self {
		Self {
			enabled: true,
			backend: StorageBackend::File,
			path: PathBuf::from("./data/cycles"),
		}
	}
}
