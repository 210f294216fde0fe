//! On-chain rate registry access.
//!
//! The registry contract holds the per-source rates and the aggregated
//! reference rate. This crate exposes it through [`RegistryInterface`] so the
//! pusher can be driven by an in-memory double in tests.

use async_trait::async_trait;
use dor_types::{RateObservation, SourceId};
use std::time::Duration;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod evm {
		pub mod alloy;
	}
}

pub use implementations::evm::alloy::{create_registry, AlloyRegistry};

/// One row of the registry's source table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
	pub source_id: SourceId,
	pub weight_bps: i64,
	pub rate_bps: i64,
	/// Unix timestamp of the last update for this source
	pub last_update: u64,
}

#[derive(Debug, Error)]
pub enum RegistryError {
	/// RPC or transport failure.
	#[error("Network error: {0}")]
	Network(String),
	/// The contract returned something that could not be decoded.
	#[error("Decode error: {0}")]
	Decode(String),
	#[error("Timed out after {0:?} waiting for confirmation")]
	Timeout(Duration),
	#[error("Invalid registry configuration: {0}")]
	InvalidConfig(String),
}

/// Batched per-source rate update, in on-chain source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateUpdate {
	pub source_ids: Vec<u8>,
	pub rates: Vec<u64>,
}

impl RateUpdate {
	/// Builds the update from an observation set, one entry per source.
	///
	/// Later duplicates are ignored and negative rates are clamped to zero.
	pub fn from_observations(observations: &[RateObservation]) -> Self {
		let mut entries: Vec<(u8, u64)> = Vec::with_capacity(observations.len());
		for obs in observations {
			let index = obs.source_id.index();
			if entries.iter().any(|(i, _)| *i == index) {
				continue;
			}
			entries.push((index, obs.rate_bps.max(0) as u64));
		}
		entries.sort_by_key(|(index, _)| *index);

		let (source_ids, rates) = entries.into_iter().unzip();
		Self { source_ids, rates }
	}

	pub fn len(&self) -> usize {
		self.source_ids.len()
	}

	pub fn is_empty(&self) -> bool {
		self.source_ids.is_empty()
	}
}

/// Receipt of a confirmed update transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateReceipt {
	pub tx_hash: String,
	pub block_number: u64,
	pub gas_used: u64,
	pub success: bool,
}

#[async_trait]
pub trait RegistryInterface: Send + Sync {
	/// Current aggregated rate in basis points.
	async fn current_rate(&self) -> Result<i64, RegistryError>;

	async fn source_info(&self, source: SourceId) -> Result<SourceInfo, RegistryError>;

	/// All sources, in on-chain index order.
	async fn source_table(&self) -> Result<Vec<SourceInfo>, RegistryError> {
		let mut table = Vec::with_capacity(SourceId::ALL.len());
		for source in SourceId::ALL {
			table.push(self.source_info(source).await?);
		}
		Ok(table)
	}

	/// Whether the configured signer may submit updates.
	async fn is_authorized(&self) -> Result<bool, RegistryError>;

	async fn estimate_update_gas(&self, update: &RateUpdate) -> Result<u64, RegistryError>;

	/// Gas price in wei.
	async fn gas_price(&self) -> Result<u128, RegistryError>;

	/// Signs and broadcasts the update, returning the transaction hash.
	async fn submit_update(&self, update: &RateUpdate) -> Result<String, RegistryError>;

	async fn wait_for_confirmation(
		&self,
		tx_hash: &str,
		timeout: Duration,
	) -> Result<UpdateReceipt, RegistryError>;
}
