//! Oracle pipeline orchestration.
//!
//! [`OracleRunner`] drives a cycle end to end: concurrent collection,
//! validation, aggregation, then either a guarded on-chain push through
//! [`RatePusher`] or a dry-run projection. Shared collaborators travel in an
//! explicit [`OracleContext`].

use dor_registry::RegistryInterface;
use dor_resilience::{CircuitBreaker, CircuitBreakerConfig};
use dor_types::OracleConfig;
use std::sync::Arc;

pub mod error;
pub mod pusher;
pub mod runner;

pub use error::PushError;
pub use pusher::RatePusher;
pub use runner::OracleRunner;

/// Collaborators shared by the pusher and the runner for the process lifetime.
#[derive(Clone)]
pub struct OracleContext {
	pub registry: Arc<dyn RegistryInterface>,
	/// Guards registry pushes across cycles
	pub breaker: Arc<CircuitBreaker>,
	pub config: Arc<OracleConfig>,
}

impl OracleContext {
	pub fn new(config: OracleConfig, registry: Arc<dyn RegistryInterface>) -> Self {
		let breaker = CircuitBreaker::new(
			"registry-push",
			CircuitBreakerConfig::from(&config.breaker),
		);
		Self {
			registry,
			breaker: Arc::new(breaker),
			config: Arc::new(config),
		}
	}
}

#[cfg(test)]
pub(crate) mod testing {
	//! In-memory doubles shared by the pusher and runner tests.

	use async_trait::async_trait;
	use dor_registry::{RateUpdate, RegistryError, RegistryInterface, SourceInfo, UpdateReceipt};
	use dor_sources::RateSourceInterface;
	use dor_types::{OracleConfig, RateObservation, RegistryConfig, RetryConfig, SourceId};
	use std::io;
	use std::sync::atomic::{AtomicU32, Ordering};
	use std::sync::{Arc, Mutex};
	use std::time::Duration;

	pub fn config() -> OracleConfig {
		let quick = RetryConfig {
			max_attempts: 3,
			base_delay_ms: 1,
			max_delay_ms: 2,
			multiplier: 2.0,
		};
		OracleConfig {
			oracle: Default::default(),
			logging: Default::default(),
			sources: Default::default(),
			registry: RegistryConfig {
				rpc_url: "http://127.0.0.1:8545".to_string(),
				chain_id: 31337,
				contract_address: "0x5FbDB2315678afecb367f032d93F642f64180aa3".to_string(),
				private_key: "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
					.to_string(),
				max_tx_cost_wei: 50_000_000_000_000_000,
				default_gas_limit: 500_000,
				confirmation_timeout_secs: 180,
				retry: quick,
			},
			breaker: Default::default(),
			storage: Default::default(),
		}
	}

	/// Five live observations aggregating to 453 bps.
	pub fn observations() -> Vec<RateObservation> {
		[350, 450, 460, 550, 500]
			.iter()
			.zip(SourceId::ALL)
			.map(|(bps, source)| RateObservation {
				source_id: source,
				rate_bps: *bps,
				observed_at: chrono::Utc::now(),
				origin: "api.example.com".to_string(),
				is_live: true,
			})
			.collect()
	}

	pub struct MockRegistry {
		pub rate: Mutex<i64>,
		pub rate_after_push: i64,
		pub authorized: bool,
		pub gas: Option<u64>,
		pub gas_price: u128,
		pub failing_submits: AtomicU32,
		pub revert: bool,
		pub submits: AtomicU32,
		pub auth_checks: AtomicU32,
	}

	impl Default for MockRegistry {
		fn default() -> Self {
			Self {
				rate: Mutex::new(440),
				rate_after_push: 453,
				authorized: true,
				gas: Some(120_000),
				gas_price: 1_000_000_000,
				failing_submits: AtomicU32::new(0),
				revert: false,
				submits: AtomicU32::new(0),
				auth_checks: AtomicU32::new(0),
			}
		}
	}

	impl MockRegistry {
		pub fn submits(&self) -> u32 {
			self.submits.load(Ordering::SeqCst)
		}
	}

	#[async_trait]
	impl RegistryInterface for MockRegistry {
		async fn current_rate(&self) -> Result<i64, RegistryError> {
			Ok(*self.rate.lock().unwrap())
		}

		async fn source_info(&self, source: SourceId) -> Result<SourceInfo, RegistryError> {
			Ok(SourceInfo {
				source_id: source,
				weight_bps: source.weight_bps(),
				rate_bps: source.fallback_bps(),
				last_update: 1_700_000_000,
			})
		}

		async fn is_authorized(&self) -> Result<bool, RegistryError> {
			self.auth_checks.fetch_add(1, Ordering::SeqCst);
			Ok(self.authorized)
		}

		async fn estimate_update_gas(&self, _update: &RateUpdate) -> Result<u64, RegistryError> {
			self.gas
				.ok_or_else(|| RegistryError::Network("execution reverted".to_string()))
		}

		async fn gas_price(&self) -> Result<u128, RegistryError> {
			Ok(self.gas_price)
		}

		async fn submit_update(&self, _update: &RateUpdate) -> Result<String, RegistryError> {
			self.submits.fetch_add(1, Ordering::SeqCst);
			let remaining = self.failing_submits.load(Ordering::SeqCst);
			if remaining > 0 {
				self.failing_submits.store(remaining - 1, Ordering::SeqCst);
				return Err(RegistryError::Network("nonce too low".to_string()));
			}
			if !self.revert {
				*self.rate.lock().unwrap() = self.rate_after_push;
			}
			Ok("0xfeed".to_string())
		}

		async fn wait_for_confirmation(
			&self,
			tx_hash: &str,
			_timeout: Duration,
		) -> Result<UpdateReceipt, RegistryError> {
			Ok(UpdateReceipt {
				tx_hash: tx_hash.to_string(),
				block_number: 19_000_000,
				gas_used: 98_000,
				success: !self.revert,
			})
		}
	}

	pub enum FixedSource {
		Reading(RateObservation),
		Panics(SourceId),
	}

	#[async_trait]
	impl RateSourceInterface for FixedSource {
		fn source_id(&self) -> SourceId {
			match self {
				FixedSource::Reading(obs) => obs.source_id,
				FixedSource::Panics(source) => *source,
			}
		}

		async fn collect(&self) -> RateObservation {
			match self {
				FixedSource::Reading(obs) => obs.clone(),
				FixedSource::Panics(source) => panic!("collector for {} crashed", source),
			}
		}
	}

	/// Formatted log output captured on the current thread.
	#[derive(Clone, Default)]
	pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

	impl LogCapture {
		pub fn install(&self) -> tracing::subscriber::DefaultGuard {
			let writer = self.clone();
			let subscriber = tracing_subscriber::fmt()
				.with_writer(move || writer.clone())
				.with_ansi(false)
				.finish();
			tracing::subscriber::set_default(subscriber)
		}

		pub fn contents(&self) -> String {
			String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
		}
	}

	impl io::Write for LogCapture {
		fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
			self.0.lock().unwrap().extend_from_slice(buf);
			Ok(buf.len())
		}

		fn flush(&mut self) -> io::Result<()> {
			Ok(())
		}
	}
}
