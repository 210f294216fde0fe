//! Storage module for the DOR oracle.
//!
//! Provides a key-value abstraction over pluggable backends and a typed
//! service on top of it. The oracle uses it to keep a history of cycle
//! records; keys take the form `namespace:id`.

use async_trait::async_trait;
use dor_types::{CycleRecord, StorageBackend, StorageConfig};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

pub use implementations::file::FileStorage;
pub use implementations::memory::MemoryStorage;

/// Namespace holding one entry per cycle plus the `latest` pointer.
pub const CYCLES_NAMESPACE: &str = "cycles";
const LATEST_ID: &str = "latest";

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	#[error("Not found")]
	NotFound,
	#[error("Serialization error: {0}")]
	Serialization(String),
	#[error("Backend error: {0}")]
	Backend(String),
}

/// Low-level interface implemented by every storage backend.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

	/// Deleting a missing key is not an error.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	/// Ids stored under `namespace`, in no particular order.
	async fn list(&self, namespace: &str) -> Result<Vec<String>, StorageError>;
}

fn key(namespace: &str, id: &str) -> String {
	format!("{}:{}", namespace, id)
}

/// Typed storage service with JSON serialization.
pub struct StorageService {
	backend: Box<dyn StorageInterface>,
}

impl StorageService {
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	pub async fn store<T: Serialize + Sync>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		let bytes =
			serde_json::to_vec_pretty(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend.set_bytes(&key(namespace, id), bytes).await
	}

	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<T, StorageError> {
		let bytes = self.backend.get_bytes(&key(namespace, id)).await?;
		serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	/// Persists a cycle record and moves the `latest` pointer to it.
	pub async fn record_cycle(&self, record: &CycleRecord) -> Result<(), StorageError> {
		let id = record.id.to_string();
		self.store(CYCLES_NAMESPACE, &id, record).await?;
		self.store(CYCLES_NAMESPACE, LATEST_ID, &id).await
	}

	pub async fn cycle(&self, id: Uuid) -> Result<CycleRecord, StorageError> {
		self.retrieve(CYCLES_NAMESPACE, &id.to_string()).await
	}

	/// The most recently recorded cycle, if any.
	pub async fn latest_cycle(&self) -> Result<Option<CycleRecord>, StorageError> {
		let id: String = match self.retrieve(CYCLES_NAMESPACE, LATEST_ID).await {
			Ok(id) => id,
			Err(StorageError::NotFound) => return Ok(None),
			Err(e) => return Err(e),
		};
		self.retrieve(CYCLES_NAMESPACE, &id).await.map(Some)
	}

	/// Ids of every recorded cycle.
	pub async fn cycle_ids(&self) -> Result<Vec<Uuid>, StorageError> {
		let ids = self.backend.list(CYCLES_NAMESPACE).await?;
		Ok(ids
			.iter()
			.filter_map(|id| Uuid::parse_str(id).ok())
			.collect())
	}
}

/// Builds the configured backend.
pub fn create_storage(config: &StorageConfig) -> StorageService {
	let backend: Box<dyn StorageInterface> = match config.backend {
		StorageBackend::File => Box::new(FileStorage::new(config.path.clone())),
		StorageBackend::Memory => Box::new(MemoryStorage::new()),
	};
	StorageService::new(backend)
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Utc;
	use dor_types::{
		CycleMode, CycleOutcome, DryRunReport, FailureStage, PushOutcome, RateObservation,
		SourceId, SourceProjection, ValidationReport,
	};

	fn record_with(mode: CycleMode, outcome: CycleOutcome) -> CycleRecord {
		let now = Utc::now();
		CycleRecord {
			id: Uuid::new_v4(),
			mode,
			started_at: now,
			finished_at: now,
			observations: vec![RateObservation::fallback(SourceId::Sofr, 430)],
			validation: ValidationReport::default(),
			dor_bps: Some(453),
			outcome,
		}
	}

	fn record(message: &str) -> CycleRecord {
		record_with(
			CycleMode::Run,
			CycleOutcome::Failed {
				stage: FailureStage::Validation,
				message: message.to_string(),
			},
		)
	}

	#[tokio::test]
	async fn test_latest_cycle_tracks_last_record() {
		let storage = StorageService::new(Box::new(MemoryStorage::new()));
		assert!(storage.latest_cycle().await.unwrap().is_none());

		let first = record("first");
		let second = record("second");
		storage.record_cycle(&first).await.unwrap();
		storage.record_cycle(&second).await.unwrap();

		assert_eq!(storage.latest_cycle().await.unwrap(), Some(second.clone()));
		assert_eq!(storage.cycle(first.id).await.unwrap(), first);

		let mut ids = storage.cycle_ids().await.unwrap();
		ids.sort();
		let mut expected = vec![first.id, second.id];
		expected.sort();
		assert_eq!(ids, expected);
	}

	#[tokio::test]
	async fn test_every_outcome_reads_back() {
		let storage = StorageService::new(Box::new(MemoryStorage::new()));

		let pushed = record_with(
			CycleMode::Run,
			CycleOutcome::Pushed(PushOutcome {
				tx_id: "0xfeed".to_string(),
				block_number: 19_000_000,
				gas_used: 98_000,
				prior_dor_bps: 440,
				new_dor_bps: 453,
				locally_computed_dor_bps: 453,
			}),
		);
		let dry_run = record_with(
			CycleMode::DryRun,
			CycleOutcome::DryRun(DryRunReport {
				prior_dor_bps: 440,
				projected_dor_bps: 453,
				delta_bps: 13,
				estimated_gas: 500_000,
				gas_estimated: false,
				gas_price_wei: 1_000_000_000,
				estimated_cost_wei: 500_000_000_000_000,
				authorized: true,
				sources: vec![SourceProjection {
					source_id: SourceId::Sofr,
					onchain_rate_bps: Some(430),
					new_rate_bps: 460,
					is_live: true,
				}],
			}),
		);
		let failed = record("rpc unreachable");

		for saved in [pushed, dry_run, failed] {
			storage.record_cycle(&saved).await.unwrap();
			assert_eq!(storage.cycle(saved.id).await.unwrap(), saved);
			assert_eq!(storage.latest_cycle().await.unwrap(), Some(saved));
		}
	}

	#[tokio::test]
	async fn test_missing_cycle_is_not_found() {
		let storage = StorageService::new(Box::new(MemoryStorage::new()));
		assert!(matches!(
			storage.cycle(Uuid::new_v4()).await,
			Err(StorageError::NotFound)
		));
	}

	#[tokio::test]
	async fn test_file_backend_persists_across_instances() {
		let dir = tempfile::tempdir().unwrap();
		let config = StorageConfig {
			enabled: true,
			backend: StorageBackend::File,
			path: dir.path().to_path_buf(),
		};

		let saved = record("persisted");
		create_storage(&config).record_cycle(&saved).await.unwrap();

		let reopened = create_storage(&config);
		assert_eq!(reopened.latest_cycle().await.unwrap(), Some(saved));
	}
}
