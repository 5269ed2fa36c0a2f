//! File-backed [`SessionStore`] for single-node deployments that must survive restarts.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	clock::{self, Clock},
	store::{
		BatchReply, CompareAndSwapOutcome, EntryMap, SessionStore, StoreBatch, StoreError,
		StoreFuture, StoreKey,
	},
};

/// Persists the entry map to a JSON file after each mutation.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<EntryMap>>,
	clock: Arc<dyn Clock>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = Self::load_snapshot(&path)?;

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)), clock: clock::system() })
	}

	/// Replaces the time source.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self
	}

	fn load_snapshot(path: &Path) -> Result<EntryMap, StoreError> {
		if !path.exists() {
			return Ok(EntryMap::default());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		if bytes.is_empty() {
			return Ok(EntryMap::default());
		}

		serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse {}: {e}", path.display()),
		})
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist_locked(&self, contents: &EntryMap) -> Result<(), StoreError> {
		let serialized = serde_json::to_vec(contents).map_err(|e| StoreError::Serialization {
			message: format!("Failed to serialize store snapshot: {e}"),
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

	/// Mutates the live map in place and restores the last snapshot on disk if persisting fails.
	fn mutate<T>(
		&self,
		f: impl FnOnce(&mut EntryMap, OffsetDateTime) -> Result<T, StoreError>,
	) -> Result<T, StoreError> {
		let now = self.clock.now();
		let mut guard = self.inner.write();

		guard.note_write(now);

		let out = f(&mut guard, now)?;

		if let Err(e) = self.persist_locked(&guard) {
			// The file still holds the last committed state.
			if let Ok(committed) = Self::load_snapshot(&self.path) {
				*guard = committed;
			}

			return Err(e);
		}

		Ok(out)
	}
}
impl SessionStore for FileStore {
	fn get<'a>(&'a self, key: &'a StoreKey) -> StoreFuture<'a, Option<String>> {
		Box::pin(async move { Ok(self.inner.read().get(key, self.clock.now())) })
	}

	fn set_if_absent<'a>(
		&'a self,
		key: &'a StoreKey,
		value: String,
		ttl: Duration,
	) -> StoreFuture<'a, bool> {
		Box::pin(async move { self.mutate(|map, now| Ok(map.set_if_absent(key, value, ttl, now))) })
	}

	fn compare_and_swap<'a>(
		&'a self,
		key: &'a StoreKey,
		expected: &'a str,
		replacement: String,
		ttl: Duration,
	) -> StoreFuture<'a, CompareAndSwapOutcome> {
		Box::pin(async move {
			self.mutate(|map, now| Ok(map.compare_and_swap(key, expected, replacement, ttl, now)))
		})
	}

	fn execute(&self, batch: StoreBatch) -> StoreFuture<'_, Vec<BatchReply>> {
		Box::pin(async move { self.mutate(|map, now| map.apply(batch, now)) })
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::{env, process};
	// self
	use super::*;
	use crate::{_preludet::*, auth::SubjectId};

	fn temp_path() -> PathBuf {
		let unique = format!(
			"session_broker_file_store_{}_{}.json",
			process::id(),
			OffsetDateTime::now_utc().unix_timestamp_nanos(),
		);

		env::temp_dir().join(unique)
	}

	fn marker() -> StoreKey {
		StoreKey::RefreshMarker {
			subject: SubjectId::new("alice").expect("Subject fixture should be valid."),
		}
	}

	#[tokio::test]
	async fn entries_survive_reopen_with_their_expiry() {
		let path = temp_path();
		let clock = test_clock();
		let store = FileStore::open(&path)
			.expect("Failed to open file store snapshot.")
			.with_clock(clock.clone());

		store
			.execute(StoreBatch::new().set(marker(), "jti-1", Duration::minutes(10)))
			.await
			.expect("Failed to write marker to file store.");
		drop(store);

		let reopened = FileStore::open(&path)
			.expect("Failed to reopen file store snapshot.")
			.with_clock(clock.clone());

		assert_eq!(
			reopened.get(&marker()).await.expect("Failed to read marker."),
			Some("jti-1".into())
		);

		clock.advance(Duration::minutes(10));

		assert_eq!(reopened.get(&marker()).await.expect("Failed to read marker."), None);

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary file store snapshot {}: {e}", path.display())
		});
	}

	#[tokio::test]
	async fn failed_persistence_rolls_back_to_the_committed_snapshot() {
		let path = temp_path();
		let store = FileStore::open(&path)
			.expect("Failed to open file store snapshot.")
			.with_clock(test_clock());
		let other = StoreKey::RefreshMarker {
			subject: SubjectId::new("bob").expect("Subject fixture should be valid."),
		};

		store
			.execute(StoreBatch::new().set(marker(), "jti-1", Duration::minutes(10)))
			.await
			.expect("Failed to write marker to file store.");

		let mut tmp_path = path.clone();

		tmp_path.set_extension("tmp");
		fs::create_dir(&tmp_path).expect("Failed to block the temporary snapshot path.");

		let err = store
			.execute(
				StoreBatch::new()
					.delete(marker())
					.set(other.clone(), "jti-2", Duration::minutes(10)),
			)
			.await
			.expect_err("Persisting over a directory should fail.");

		assert!(matches!(err, StoreError::Backend { .. }));
		assert_eq!(store.get(&other).await.expect("Failed to read marker."), None);
		assert_eq!(
			store.get(&marker()).await.expect("Failed to read marker."),
			Some("jti-1".into())
		);

		fs::remove_dir(&tmp_path).expect("Failed to remove the blocking directory.");
		fs::remove_file(&path).expect("Failed to remove temporary file store snapshot.");
	}
}
