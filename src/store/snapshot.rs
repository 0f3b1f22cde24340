//! Durable keyed table persisted as an atomic JSON snapshot after each mutation.

// std
use std::{
	collections::HashMap,
	fs::{self, File},
	hash::Hash,
	io::Write,
	path::{Path, PathBuf},
};
// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{_prelude::*, store::StoreError};

/// Single-writer keyed table backed by a JSON snapshot file.
///
/// Mutations rewrite the snapshot through a temp-file-then-rename sequence so a crash
/// never leaves a partially written table behind. Readers run in parallel against the
/// in-memory view.
#[derive(Clone, Debug)]
pub(crate) struct SnapshotTable<K, V> {
	path: PathBuf,
	entries: Arc<RwLock<HashMap<K, V>>>,
}
impl<K, V> SnapshotTable<K, V>
where
	K: Clone + Eq + Hash + Serialize + DeserializeOwned,
	V: Clone + Serialize + DeserializeOwned,
{
	/// Opens (or creates) a table at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = if path.exists() { Self::load_snapshot(&path)? } else { HashMap::new() };

		Ok(Self { path, entries: Arc::new(RwLock::new(snapshot)) })
	}

	fn load_snapshot(path: &Path) -> Result<HashMap<K, V>, StoreError> {
		let metadata = path.metadata().map_err(|e| StoreError::Backend {
			message: format!("Failed to inspect {}: {e}", path.display()),
		})?;

		if metadata.len() == 0 {
			return Ok(HashMap::new());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;
		let entries: Vec<(K, V)> =
			serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
				message: format!("Failed to parse {}: {e}", path.display()),
			})?;

		Ok(entries.into_iter().collect())
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create table directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist_locked(&self, contents: &HashMap<K, V>) -> Result<(), StoreError> {
		Self::ensure_parent_exists(&self.path)?;

		let snapshot: Vec<_> = contents.iter().collect();
		let serialized = serde_json::to_vec(&snapshot).map_err(|e| StoreError::Serialization {
			message: format!("Failed to serialize table snapshot: {e}"),
		})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}

	/// Returns the value stored under `key`, if any.
	pub fn get(&self, key: &K) -> Option<V> {
		self.entries.read().get(key).cloned()
	}

	/// Returns every value matching the predicate.
	pub fn select(&self, predicate: impl Fn(&K, &V) -> bool) -> Vec<V> {
		self.entries
			.read()
			.iter()
			.filter(|(k, v)| predicate(k, v))
			.map(|(_, v)| v.clone())
			.collect()
	}

	/// Inserts `value` under `key` and persists the table.
	pub fn insert(&self, key: K, value: V) -> Result<(), StoreError> {
		let mut guard = self.entries.write();

		guard.insert(key, value);
		self.persist_locked(&guard)
			.map_err(|e| StoreError::Insert { reason: e.to_string() })
	}

	/// Replaces the value under `key` with the output of `apply`, persisting the table.
	pub fn upsert(&self, key: K, apply: impl FnOnce(Option<V>) -> V) -> Result<(), StoreError> {
		let mut guard = self.entries.write();
		let next = apply(guard.get(&key).cloned());

		guard.insert(key, next);
		self.persist_locked(&guard)
			.map_err(|e| StoreError::Insert { reason: e.to_string() })
	}

	/// Removes the value under `key`, persisting the table when something was removed.
	pub fn remove(&self, key: &K) -> Result<Option<V>, StoreError> {
		let mut guard = self.entries.write();
		let removed = guard.remove(key);

		if removed.is_some() {
			self.persist_locked(&guard)?;
		}

		Ok(removed)
	}

	/// Drops every entry failing the predicate, returning the number of evicted entries.
	pub fn retain(&self, predicate: impl Fn(&K, &V) -> bool) -> Result<usize, StoreError> {
		let mut guard = self.entries.write();
		let before = guard.len();

		guard.retain(|k, v| predicate(k, v));

		let evicted = before - guard.len();

		if evicted > 0 {
			self.persist_locked(&guard)?;
		}

		Ok(evicted)
	}

	/// Rewrites the snapshot from the current in-memory view.
	pub fn flush(&self) -> Result<(), StoreError> {
		self.persist_locked(&self.entries.read())
	}
}
