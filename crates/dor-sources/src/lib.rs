//! Rate source collection for the oracle.
//!
//! Each source has an ordered chain of HTTP endpoints. A collector walks the
//! chain with retries and degrades to a static fallback rate when every
//! endpoint fails, so collection itself never returns an error.

use async_trait::async_trait;
use dor_resilience::RetryPolicy;
use dor_types::{EndpointConfig, RateObservation, SourceId, SourcesConfig};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod catalog;
pub mod parsers;

/// Re-export implementations
pub mod implementations {
	pub mod http;
}

pub use implementations::http::HttpSourceCollector;

/// Errors from a single fetch-and-parse attempt.
///
/// These never leave a collector; they decide whether to retry, move to the
/// next endpoint, or fall back.
#[derive(Debug, Error)]
pub enum SourceError {
	#[error("HTTP error: {0}")]
	Http(#[from] reqwest::Error),
	#[error("Unexpected status {0}")]
	Status(u16),
	#[error("Parse error: {0}")]
	Parse(String),
	#[error("No numeric rate at any of: {0}")]
	MissingField(String),
	#[error("Rate is not finite: {0}")]
	NotFinite(f64),
	#[error("Invalid endpoint URL: {0}")]
	InvalidUrl(String),
	#[error("Configuration error: {0}")]
	Config(String),
}

/// A producer of one rate observation per cycle.
#[async_trait]
pub trait RateSourceInterface: Send + Sync {
	fn source_id(&self) -> SourceId;

	/// Returns a live reading or the source's fallback. Never fails.
	async fn collect(&self) -> RateObservation;
}

/// Endpoint chain and fallback for one source after overrides are applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSource {
	pub endpoints: Vec<EndpointConfig>,
	pub fallback_bps: i64,
}

/// Applies any configured override for `source` on top of the built-in catalog.
///
/// Override keys match case-insensitively, see [`SourceId::from_str`].
pub fn resolve_source(config: &SourcesConfig, source: SourceId) -> ResolvedSource {
	let overrides = config
		.overrides
		.iter()
		.find(|(key, _)| SourceId::from_str(key).ok() == Some(source))
		.map(|(_, o)| o);

	ResolvedSource {
		endpoints: overrides
			.and_then(|o| o.endpoints.clone())
			.unwrap_or_else(|| catalog::default_endpoints(source)),
		fallback_bps: overrides
			.and_then(|o| o.fallback_bps)
			.unwrap_or_else(|| source.fallback_bps()),
	}
}

/// Builds one collector per source from the built-in catalog and any
/// configured overrides.
pub fn create_sources(
	config: &SourcesConfig,
) -> Result<Vec<Arc<dyn RateSourceInterface>>, SourceError> {
	let client = reqwest::Client::builder()
		.timeout(Duration::from_secs(config.request_timeout_secs))
		.build()
		.map_err(|e| SourceError::Config(format!("Failed to build HTTP client: {}", e)))?;

	let retry = RetryPolicy::from_config(&config.retry);

	for key in config.overrides.keys() {
		SourceId::from_str(key).map_err(|e| SourceError::Config(e.to_string()))?;
	}

	SourceId::ALL
		.iter()
		.map(|source| {
			let resolved = resolve_source(config, *source);
			let collector = HttpSourceCollector::new(
				*source,
				&resolved.endpoints,
				resolved.fallback_bps,
				retry.clone(),
				client.clone(),
			)?;
			Ok(Arc::new(collector) as Arc<dyn RateSourceInterface>)
		})
		.collect()
}
