//! Thread-safe in-memory [`SessionStore`] implementation for single-process deployments and tests.

// self
use crate::{
	_prelude::*,
	clock::{self, Clock},
	store::{
		BatchReply, CompareAndSwapOutcome, EntryMap, SessionStore, StoreBatch, StoreFuture,
		StoreKey,
	},
};

type StoreMap = Arc<RwLock<EntryMap>>;

/// Process-local store whose entries expire according to an injected clock.
///
/// Expired entries are invisible to reads and swept every [`PURGE_INTERVAL`] writes.
///
/// [`PURGE_INTERVAL`]: crate::store::PURGE_INTERVAL
#[derive(Clone, Debug)]
pub struct MemoryStore {
	map: StoreMap,
	clock: Arc<dyn Clock>,
}
impl MemoryStore {
	/// Creates an empty store reading time from `clock`.
	pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
		Self { map: Default::default(), clock }
	}

	/// Number of stored entries, including expired ones not yet purged.
	pub fn len(&self) -> usize {
		self.map.read().len()
	}

	/// Returns `true` when the store holds no entries.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn write_now<T>(&self, f: impl FnOnce(&mut EntryMap, OffsetDateTime) -> T) -> T {
		let now = self.clock.now();
		let mut guard = self.map.write();

		guard.note_write(now);

		f(&mut guard, now)
	}
}
impl Default for MemoryStore {
	fn default() -> Self {
		Self::with_clock(clock::system())
	}
}
impl SessionStore for MemoryStore {
	fn get<'a>(&'a self, key: &'a StoreKey) -> StoreFuture<'a, Option<String>> {
		Box::pin(async move { Ok(self.map.read().get(key, self.clock.now())) })
	}

	fn set_if_absent<'a>(
		&'a self,
		key: &'a StoreKey,
		value: String,
		ttl: Duration,
	) -> StoreFuture<'a, bool> {
		Box::pin(async move { Ok(self.write_now(|map, now| map.set_if_absent(key, value, ttl, now))) })
	}

	fn compare_and_swap<'a>(
		&'a self,
		key: &'a StoreKey,
		expected: &'a str,
		replacement: String,
		ttl: Duration,
	) -> StoreFuture<'a, CompareAndSwapOutcome> {
		Box::pin(async move {
			Ok(self.write_now(|map, now| map.compare_and_swap(key, expected, replacement, ttl, now)))
		})
	}

	fn execute(&self, batch: StoreBatch) -> StoreFuture<'_, Vec<BatchReply>> {
		Box::pin(async move { self.write_now(|map, now| map.apply(batch, now)) })
	}
}
