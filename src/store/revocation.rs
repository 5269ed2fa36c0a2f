//! Revocation entries and active refresh markers over a [`SessionStore`].

// self
use crate::{
	_prelude::*,
	auth::{SubjectId, TokenId, TokenKind},
	store::{self, CompareAndSwapOutcome, SessionStore, StoreBatch, StoreError, StoreKey},
};

const REVOKED: &str = "1";

/// Typed view over the `revoke:*` and `refresh_marker:*` key families.
///
/// Every call is bounded by the configured timeout; an elapsed bound is reported as
/// [`StoreError::Timeout`] so callers fail closed.
#[derive(Clone)]
pub struct RevocationStore {
	store: Arc<dyn SessionStore>,
	timeout: Duration,
}
impl RevocationStore {
	/// Wraps a store handle.
	pub fn new(store: Arc<dyn SessionStore>, timeout: Duration) -> Self {
		Self { store, timeout }
	}

	/// Returns `true` if a live revocation entry exists for the token identity.
	pub async fn is_revoked(
		&self,
		kind: TokenKind,
		subject: &SubjectId,
		token: &TokenId,
	) -> Result<bool, StoreError> {
		let key = StoreKey::Revocation { kind, subject: subject.clone(), token: token.clone() };

		Ok(store::bounded(self.timeout, self.store.get(&key)).await?.is_some())
	}

	/// Records a revocation entry living for `ttl`.
	///
	/// `ttl` should be the token's remaining lifetime; a non-positive value writes nothing since
	/// the token is already unusable.
	pub async fn revoke(
		&self,
		kind: TokenKind,
		subject: &SubjectId,
		token: &TokenId,
		ttl: Duration,
	) -> Result<(), StoreError> {
		let key = StoreKey::Revocation { kind, subject: subject.clone(), token: token.clone() };

		store::bounded(self.timeout, self.store.execute(StoreBatch::new().set(key, REVOKED, ttl)))
			.await?;

		Ok(())
	}

	/// Reads the subject's active refresh token identity.
	pub async fn active_refresh(&self, subject: &SubjectId) -> Result<Option<TokenId>, StoreError> {
		let key = StoreKey::RefreshMarker { subject: subject.clone() };

		store::bounded(self.timeout, self.store.get(&key))
			.await?
			.map(|raw| {
				TokenId::new(&raw).map_err(|e| StoreError::Serialization {
					message: format!("Refresh marker for {subject} is malformed: {e}"),
				})
			})
			.transpose()
	}

	/// Clears and sets the marker in one batch; the last writer wins.
	pub async fn replace_refresh_marker(
		&self,
		subject: &SubjectId,
		token: &TokenId,
		ttl: Duration,
	) -> Result<(), StoreError> {
		let key = StoreKey::RefreshMarker { subject: subject.clone() };
		let batch = StoreBatch::new().delete(key.clone()).set(key, token.as_ref(), ttl);

		store::bounded(self.timeout, self.store.execute(batch)).await?;

		Ok(())
	}

	/// Moves the marker from `expected` to `replacement` only if `expected` is still current.
	pub async fn rotate_refresh_marker(
		&self,
		subject: &SubjectId,
		expected: &TokenId,
		replacement: &TokenId,
		ttl: Duration,
	) -> Result<CompareAndSwapOutcome, StoreError> {
		let key = StoreKey::RefreshMarker { subject: subject.clone() };

		store::bounded(
			self.timeout,
			self.store.compare_and_swap(&key, expected.as_ref(), replacement.to_string(), ttl),
		)
		.await
	}
}
impl Debug for RevocationStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RevocationStore").field("timeout", &self.timeout).finish_non_exhaustive()
	}
}
