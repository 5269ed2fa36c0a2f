//! Shared TTL key-value store contract plus the revocation facade built on it.
//!
//! Every piece of cross-request state (revocation entries, refresh markers, rate windows, link
//! cache, login state) lives behind [`SessionStore`]. Multi-key writes go through
//! [`SessionStore::execute`] so readers never observe a half-applied batch.

pub mod file;
pub mod memory;
pub mod revocation;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use revocation::RevocationStore;

// self
use crate::{
	_prelude::*,
	auth::{ExternalId, ProviderId, SubjectId, TokenId, TokenKind},
};

/// Boxed future returned by [`SessionStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Storage backend contract implemented by session stores.
///
/// An entry is live while `now < expires_at`. Writes with a non-positive TTL leave no live entry.
pub trait SessionStore
where
	Self: Send + Sync,
{
	/// Reads the live value stored under `key`.
	fn get<'a>(&'a self, key: &'a StoreKey) -> StoreFuture<'a, Option<String>>;

	/// Stores `value` only if no live entry exists; returns `true` when written.
	fn set_if_absent<'a>(
		&'a self,
		key: &'a StoreKey,
		value: String,
		ttl: Duration,
	) -> StoreFuture<'a, bool>;

	/// Replaces the live value iff it equals `expected`, resetting the TTL.
	fn compare_and_swap<'a>(
		&'a self,
		key: &'a StoreKey,
		expected: &'a str,
		replacement: String,
		ttl: Duration,
	) -> StoreFuture<'a, CompareAndSwapOutcome>;

	/// Applies every operation in order as one atomic unit.
	fn execute(&self, batch: StoreBatch) -> StoreFuture<'_, Vec<BatchReply>>;
}

/// Result of a compare-and-swap attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareAndSwapOutcome {
	/// The stored value matched and was replaced.
	Updated,
	/// A live value exists but differs from the expected one.
	Mismatch,
	/// No live value exists for the key.
	Missing,
}

/// Error type produced by [`SessionStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Stored data could not be encoded or decoded.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
	/// Operation did not finish within the configured bound.
	#[error("Store operation timed out after {after}.")]
	Timeout {
		/// Configured bound.
		after: Duration,
	},
}

/// Typed store key; [`Display`] renders the persisted key layout.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum StoreKey {
	/// `revoke:{kind}:{subject}:{id}`
	Revocation {
		/// Kind of the revoked token.
		kind: TokenKind,
		/// Token owner.
		subject: SubjectId,
		/// Revoked token identity.
		token: TokenId,
	},
	/// `refresh_marker:{subject}`
	RefreshMarker {
		/// Marker owner.
		subject: SubjectId,
	},
	/// `ratelimit:{subject}:{bucket}`
	RateWindow {
		/// Counted subject.
		subject: SubjectId,
		/// Window index since the Unix epoch.
		bucket: i64,
	},
	/// `oauth_link:{provider}:{external}`
	OAuthLink {
		/// Identity provider.
		provider: ProviderId,
		/// Provider-assigned identifier.
		external: ExternalId,
	},
	/// `oauth_state:{provider}:{state}`
	OAuthState {
		/// Identity provider.
		provider: ProviderId,
		/// Opaque single-use state.
		state: String,
	},
}
impl Display for StoreKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Revocation { kind, subject, token } => write!(f, "revoke:{kind}:{subject}:{token}"),
			Self::RefreshMarker { subject } => write!(f, "refresh_marker:{subject}"),
			Self::RateWindow { subject, bucket } => write!(f, "ratelimit:{subject}:{bucket}"),
			Self::OAuthLink { provider, external } => write!(f, "oauth_link:{provider}:{external}"),
			Self::OAuthState { provider, state } => write!(f, "oauth_state:{provider}:{state}"),
		}
	}
}

/// Single operation inside a [`StoreBatch`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchOp {
	/// Writes a value with a TTL. Replies [`BatchReply::Unit`].
	Set {
		/// Target key.
		key: StoreKey,
		/// Value to store.
		value: String,
		/// Entry lifetime.
		ttl: Duration,
	},
	/// Removes a key. Replies [`BatchReply::Bool`] (`true` if a live entry was removed).
	Delete {
		/// Target key.
		key: StoreKey,
	},
	/// Adds one to an integer value, creating it at zero first. Replies [`BatchReply::Integer`].
	Increment {
		/// Target key.
		key: StoreKey,
	},
	/// Resets the TTL of a live key. Replies [`BatchReply::Bool`] (`true` if the key existed).
	Expire {
		/// Target key.
		key: StoreKey,
		/// New lifetime measured from now.
		ttl: Duration,
	},
}

/// Per-operation reply returned by [`SessionStore::execute`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchReply {
	/// Operation has no meaningful result.
	Unit,
	/// Post-increment counter value.
	Integer(i64),
	/// Existence flag.
	Bool(bool),
}

/// Ordered list of operations applied atomically.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreBatch(Vec<BatchOp>);
impl StoreBatch {
	/// Creates an empty batch.
	pub fn new() -> Self {
		Self::default()
	}

	/// Appends a [`BatchOp::Set`].
	pub fn set(mut self, key: StoreKey, value: impl Into<String>, ttl: Duration) -> Self {
		self.0.push(BatchOp::Set { key, value: value.into(), ttl });

		self
	}

	/// Appends a [`BatchOp::Delete`].
	pub fn delete(mut self, key: StoreKey) -> Self {
		self.0.push(BatchOp::Delete { key });

		self
	}

	/// Appends a [`BatchOp::Increment`].
	pub fn increment(mut self, key: StoreKey) -> Self {
		self.0.push(BatchOp::Increment { key });

		self
	}

	/// Appends a [`BatchOp::Expire`].
	pub fn expire(mut self, key: StoreKey, ttl: Duration) -> Self {
		self.0.push(BatchOp::Expire { key, ttl });

		self
	}

	/// Operations in application order.
	pub fn ops(&self) -> &[BatchOp] {
		&self.0
	}

	/// Number of queued operations.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns `true` when nothing is queued.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Consumes the batch.
	pub fn into_ops(self) -> Vec<BatchOp> {
		self.0
	}
}

/// Stored value plus its expiry; `None` means no TTL has been set yet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct StoredEntry {
	pub(crate) value: String,
	pub(crate) expires_at: Option<OffsetDateTime>,
}
impl StoredEntry {
	fn is_live(&self, now: OffsetDateTime) -> bool {
		self.expires_at.is_none_or(|at| now < at)
	}
}

/// Writes between two sweeps of expired entries.
pub(crate) const PURGE_INTERVAL: u64 = 64;

/// TTL-aware map shared by the in-process backends.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub(crate) struct EntryMap {
	entries: HashMap<String, StoredEntry>,
	#[serde(skip)]
	writes: u64,
}
impl EntryMap {
	pub(crate) fn get(&self, key: &StoreKey, now: OffsetDateTime) -> Option<String> {
		self.live(&key.to_string(), now).map(|e| e.value.clone())
	}

	pub(crate) fn set_if_absent(
		&mut self,
		key: &StoreKey,
		value: String,
		ttl: Duration,
		now: OffsetDateTime,
	) -> bool {
		if self.get(key, now).is_some() || !ttl.is_positive() {
			return false;
		}

		self.put(key.to_string(), value, ttl, now);

		true
	}

	pub(crate) fn compare_and_swap(
		&mut self,
		key: &StoreKey,
		expected: &str,
		replacement: String,
		ttl: Duration,
		now: OffsetDateTime,
	) -> CompareAndSwapOutcome {
		match self.get(key, now) {
			Some(current) if current == expected => {
				self.put(key.to_string(), replacement, ttl, now);

				CompareAndSwapOutcome::Updated
			},
			Some(_) => CompareAndSwapOutcome::Mismatch,
			None => CompareAndSwapOutcome::Missing,
		}
	}

	/// Validates the whole batch before touching any entry so a failing op leaves no trace.
	pub(crate) fn apply(
		&mut self,
		batch: StoreBatch,
		now: OffsetDateTime,
	) -> Result<Vec<BatchReply>, StoreError> {
		self.validate(&batch, now)?;

		let mut replies = Vec::with_capacity(batch.len());

		for op in batch.into_ops() {
			let reply = match op {
				BatchOp::Set { key, value, ttl } => {
					self.put(key.to_string(), value, ttl, now);

					BatchReply::Unit
				},
				BatchOp::Delete { key } => {
					let rendered = key.to_string();
					let live = self.live(&rendered, now).is_some();

					self.entries.remove(&rendered);

					BatchReply::Bool(live)
				},
				BatchOp::Increment { key } => {
					let rendered = key.to_string();
					let (current, expires_at) = match self.live(&rendered, now) {
						Some(entry) =>
							(entry.value.parse::<i64>().unwrap_or_default(), entry.expires_at),
						None => (0, None),
					};
					let next = current.saturating_add(1);

					self.entries.insert(rendered, StoredEntry { value: next.to_string(), expires_at });

					BatchReply::Integer(next)
				},
				BatchOp::Expire { key, ttl } => {
					let rendered = key.to_string();
					let live = self.live(&rendered, now).is_some();

					if live {
						if ttl.is_positive() {
							if let Some(entry) = self.entries.get_mut(&rendered) {
								entry.expires_at = Some(now + ttl);
							}
						} else {
							self.entries.remove(&rendered);
						}
					}

					BatchReply::Bool(live)
				},
			};

			replies.push(reply);
		}

		Ok(replies)
	}

	/// Counts a write and sweeps expired entries once every [`PURGE_INTERVAL`] writes.
	pub(crate) fn note_write(&mut self, now: OffsetDateTime) {
		self.writes = self.writes.wrapping_add(1);

		if self.writes % PURGE_INTERVAL == 0 {
			self.purge(now);
		}
	}

	/// Drops entries whose TTL has elapsed.
	pub(crate) fn purge(&mut self, now: OffsetDateTime) {
		self.entries.retain(|_, e| e.is_live(now));
	}

	pub(crate) fn len(&self) -> usize {
		self.entries.len()
	}

	fn live(&self, rendered: &str, now: OffsetDateTime) -> Option<&StoredEntry> {
		self.entries.get(rendered).filter(|e| e.is_live(now))
	}

	/// Replays the batch against a per-key overlay and rejects it if any increment would hit a
	/// non-integer value.
	fn validate(&self, batch: &StoreBatch, now: OffsetDateTime) -> Result<(), StoreError> {
		// Key -> whether the value staged earlier in this batch is absent or an integer.
		let mut staged = HashMap::<String, bool>::new();

		for op in batch.ops() {
			match op {
				BatchOp::Set { key, value, ttl } => {
					staged.insert(key.to_string(), !ttl.is_positive() || value.parse::<i64>().is_ok());
				},
				BatchOp::Delete { key } => {
					staged.insert(key.to_string(), true);
				},
				BatchOp::Increment { key } => {
					let rendered = key.to_string();
					let numeric = match staged.get(&rendered) {
						Some(numeric) => *numeric,
						None => self
							.live(&rendered, now)
							.is_none_or(|e| e.value.parse::<i64>().is_ok()),
					};

					if !numeric {
						return Err(StoreError::Serialization {
							message: format!("Value under {rendered} is not an integer."),
						});
					}

					staged.insert(rendered, true);
				},
				BatchOp::Expire { key, ttl } => {
					if !ttl.is_positive() {
						staged.insert(key.to_string(), true);
					}
				},
			}
		}

		Ok(())
	}

	fn put(&mut self, key: String, value: String, ttl: Duration, now: OffsetDateTime) {
		if ttl.is_positive() {
			self.entries.insert(key, StoredEntry { value, expires_at: Some(now + ttl) });
		} else {
			self.entries.remove(&key);
		}
	}
}

/// Runs a store future under `limit`, mapping elapsed time to [`StoreError::Timeout`].
pub(crate) async fn bounded<T>(limit: Duration, fut: StoreFuture<'_, T>) -> Result<T, StoreError> {
	match tokio::time::timeout(limit.unsigned_abs(), fut).await {
		Ok(result) => result,
		Err(_) => Err(StoreError::Timeout { after: limit }),
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn subject() -> SubjectId {
		SubjectId::new("alice").expect("Subject fixture should be valid.")
	}

	fn marker() -> StoreKey {
		StoreKey::RefreshMarker { subject: subject() }
	}

	#[test]
	fn keys_render_the_persisted_layout() {
		let token = TokenId::new("jti1").expect("Token id fixture should be valid.");

		assert_eq!(
			StoreKey::Revocation { kind: TokenKind::Access, subject: subject(), token }.to_string(),
			"revoke:access:alice:jti1"
		);
		assert_eq!(marker().to_string(), "refresh_marker:alice");
		assert_eq!(
			StoreKey::RateWindow { subject: subject(), bucket: 29_000_000 }.to_string(),
			"ratelimit:alice:29000000"
		);
		assert_eq!(
			StoreKey::OAuthLink {
				provider: ProviderId::new("yandex").expect("Provider fixture should be valid."),
				external: ExternalId::new("42").expect("External fixture should be valid."),
			}
			.to_string(),
			"oauth_link:yandex:42"
		);
	}

	#[test]
	fn failed_batches_leave_no_partial_writes() {
		let now = macros::datetime!(2025-01-01 00:00 UTC);
		let mut map = EntryMap::default();

		map.apply(StoreBatch::new().set(marker(), "not-a-number", Duration::minutes(1)), now)
			.expect("Seeding the marker should succeed.");

		let other = StoreKey::RefreshMarker {
			subject: SubjectId::new("bob").expect("Subject fixture should be valid."),
		};
		let err = map
			.apply(
				StoreBatch::new().set(other.clone(), "x", Duration::minutes(1)).increment(marker()),
				now,
			)
			.expect_err("Incrementing a non-integer should fail.");

		assert!(matches!(err, StoreError::Serialization { .. }));
		assert_eq!(map.get(&other, now), None);
	}

	#[test]
	fn validation_follows_values_staged_earlier_in_the_batch() {
		let now = macros::datetime!(2025-01-01 00:00 UTC);
		let mut map = EntryMap::default();
		let err = map
			.apply(
				StoreBatch::new().set(marker(), "jti-1", Duration::minutes(1)).increment(marker()),
				now,
			)
			.expect_err("Incrementing a value staged as text should fail.");

		assert!(matches!(err, StoreError::Serialization { .. }));
		assert_eq!(map.len(), 0);

		map.apply(StoreBatch::new().set(marker(), "not-a-number", Duration::minutes(1)), now)
			.expect("Seeding the marker should succeed.");

		let replies = map
			.apply(
				StoreBatch::new()
					.delete(marker())
					.increment(marker())
					.set(marker(), "41", Duration::minutes(1))
					.increment(marker()),
				now,
			)
			.expect("Increments over staged integers should succeed.");

		assert_eq!(replies, vec![
			BatchReply::Bool(true),
			BatchReply::Integer(1),
			BatchReply::Unit,
			BatchReply::Integer(42),
		]);
		assert_eq!(map.get(&marker(), now), Some("42".into()));
	}

	#[test]
	fn expired_entries_are_swept_on_the_purge_interval() {
		let now = macros::datetime!(2025-01-01 00:00 UTC);
		let later = now + Duration::minutes(2);
		let mut map = EntryMap::default();

		map.apply(StoreBatch::new().set(marker(), "jti-1", Duration::minutes(1)), now)
			.expect("Seeding the marker should succeed.");

		for _ in 1..PURGE_INTERVAL {
			map.note_write(later);
		}

		assert_eq!(map.len(), 1);
		assert_eq!(map.get(&marker(), later), None);

		map.note_write(later);

		assert_eq!(map.len(), 0);
	}

	#[test]
	fn non_positive_ttl_writes_leave_nothing_live() {
		let now = macros::datetime!(2025-01-01 00:00 UTC);
		let mut map = EntryMap::default();

		map.apply(StoreBatch::new().set(marker(), "a", Duration::minutes(1)), now)
			.expect("Seeding should succeed.");
		map.apply(StoreBatch::new().set(marker(), "b", Duration::ZERO), now)
			.expect("Zero-TTL set should succeed.");

		assert_eq!(map.get(&marker(), now), None);
		assert!(!map.set_if_absent(&marker(), "c".into(), Duration::seconds(-1), now));
		assert_eq!(map.len(), 0);
	}

	#[tokio::test]
	async fn bounded_maps_elapsed_futures_to_timeout() {
		let stalled: StoreFuture<'_, ()> = Box::pin(std::future::pending());
		let err = bounded(Duration::milliseconds(10), stalled)
			.await
			.expect_err("Pending future should time out.");

		assert_eq!(err, StoreError::Timeout { after: Duration::milliseconds(10) });
	}
}
