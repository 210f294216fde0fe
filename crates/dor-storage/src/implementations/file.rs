//! File-based storage backend.
//!
//! Each namespace is a directory under the base path and each id a JSON
//! file inside it, so records can be inspected with ordinary tools.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;

pub struct FileStorage {
	base_path: PathBuf,
}

impl FileStorage {
	pub fn new(base_path: PathBuf) -> Self {
		Self { base_path }
	}

	/// Maps `namespace:id` to `<base>/<namespace>/<id>.json`.
	///
	/// Path separators are replaced so a key can never escape its namespace.
	fn file_path(&self, key: &str) -> PathBuf {
		let (namespace, id) = key.split_once(':').unwrap_or(("default", key));
		self.namespace_dir(namespace)
			.join(format!("{}.json", sanitize(id)))
	}

	fn namespace_dir(&self, namespace: &str) -> PathBuf {
		self.base_path.join(sanitize(namespace))
	}
}

fn sanitize(part: &str) -> String {
	part.replace(['/', '\\', ':'], "_").replace("..", "_")
}

fn backend(e: std::io::Error) -> StorageError {
	StorageError::Backend(e.to_string())
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		match fs::read(self.file_path(key)).await {
			Ok(data) => Ok(data),
			Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound),
			Err(e) => Err(backend(e)),
		}
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		let path = self.file_path(key);

		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent).await.map_err(backend)?;
		}

		// Write to a sibling temp file then rename so readers never see a partial record
		let temp_path = path.with_extension("tmp");
		fs::write(&temp_path, value).await.map_err(backend)?;
		fs::rename(&temp_path, &path).await.map_err(backend)
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		match fs::remove_file(self.file_path(key)).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
			Err(e) => Err(backend(e)),
		}
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		fs::try_exists(self.file_path(key)).await.map_err(backend)
	}

	async fn list(&self, namespace: &str) -> Result<Vec<String>, StorageError> {
		let mut entries = match fs::read_dir(self.namespace_dir(namespace)).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
			Err(e) => return Err(backend(e)),
		};

		let mut ids = Vec::new();
		while let Some(entry) = entries.next_entry().await.map_err(backend)? {
			let name = entry.file_name();
			if let Some(id) = name.to_str().and_then(|n| n.strip_suffix(".json")) {
				ids.push(id.to_string());
			}
		}
		Ok(ids)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_set_get_delete() {
		let dir = tempfile::tempdir().unwrap();
		let storage = FileStorage::new(dir.path().to_path_buf());

		storage.set_bytes("cycles:abc", b"{}".to_vec()).await.unwrap();
		assert!(storage.exists("cycles:abc").await.unwrap());
		assert_eq!(storage.get_bytes("cycles:abc").await.unwrap(), b"{}".to_vec());
		assert!(dir.path().join("cycles").join("abc.json").exists());

		storage.delete("cycles:abc").await.unwrap();
		storage.delete("cycles:abc").await.unwrap();
		assert!(matches!(
			storage.get_bytes("cycles:abc").await,
			Err(StorageError::NotFound)
		));
	}

	#[tokio::test]
	async fn test_keys_cannot_escape_namespace() {
		let dir = tempfile::tempdir().unwrap();
		let storage = FileStorage::new(dir.path().to_path_buf());

		storage
			.set_bytes("cycles:../../etc/passwd", b"x".to_vec())
			.await
			.unwrap();
		let ids = storage.list("cycles").await.unwrap();
		assert_eq!(ids.len(), 1);
		assert!(!ids[0].contains('/'));
	}

	#[tokio::test]
	async fn test_list_skips_temp_files_and_missing_namespace() {
		let dir = tempfile::tempdir().unwrap();
		let storage = FileStorage::new(dir.path().to_path_buf());
		assert!(storage.list("cycles").await.unwrap().is_empty());

		storage.set_bytes("cycles:one", b"1".to_vec()).await.unwrap();
		std::fs::write(dir.path().join("cycles").join("two.tmp"), b"2").unwrap();
		assert_eq!(storage.list("cycles").await.unwrap(), vec!["one".to_string()]);
	}
}
