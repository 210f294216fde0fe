//! In-memory storage backend.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use dashmap::DashMap;

/// Process-local storage, used when persistence is not wanted and in tests.
#[derive(Default)]
pub struct MemoryStorage {
	data: DashMap<String, Vec<u8>>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		self.data
			.get(key)
			.map(|entry| entry.value().clone())
			.ok_or(StorageError::NotFound)
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		self.data.insert(key.to_string(), value);
		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		self.data.remove(key);
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		Ok(self.data.contains_key(key))
	}

	async fn list(&self, namespace: &str) -> Result<Vec<String>, StorageError> {
		let prefix = format!("{}:", namespace);
		Ok(self
			.data
			.iter()
			.filter_map(|entry| entry.key().strip_prefix(&prefix).map(str::to_string))
			.collect())
	}
}
