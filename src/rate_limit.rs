//! Per-subject request budgets counted in time-bucketed store windows.
//!
//! Each request increments `ratelimit:{subject}:{bucket}` and refreshes its TTL in one batch,
//! then compares the post-increment count against the limit. Rejected requests still count,
//! so hammering a closed window never reopens it early.

// self
use crate::{
	_prelude::*,
	auth::SubjectId,
	config::RateLimitConfig,
	store::{self, BatchReply, SessionStore, StoreBatch, StoreError, StoreKey},
};

/// Boxed future returned by [`RateLimitPolicy::evaluate`].
pub type RateLimitFuture<'a> =
	Pin<Box<dyn Future<Output = Result<RateLimitDecision, StoreError>> + 'a + Send>>;

/// Strategy that decides whether a subject may issue another request.
pub trait RateLimitPolicy
where
	Self: Send + Sync,
{
	/// Counts the request and decides whether it may proceed.
	fn evaluate<'a>(&'a self, context: &'a RateLimitContext) -> RateLimitFuture<'a>;
}

/// Context shared with a [`RateLimitPolicy`] for one request.
#[derive(Clone, Debug)]
pub struct RateLimitContext {
	/// Subject being counted.
	pub subject: SubjectId,
	/// Requests allowed per window.
	pub limit: u32,
	/// Window length.
	pub window: Duration,
	/// Instant the caller observed before invoking the policy.
	pub observed_at: OffsetDateTime,
}
impl RateLimitContext {
	/// Creates a context for `subject` under `config`, observed at `observed_at`.
	pub fn new(subject: SubjectId, config: RateLimitConfig, observed_at: OffsetDateTime) -> Self {
		Self { subject, limit: config.limit, window: config.window, observed_at }
	}
}

/// Result emitted by a [`RateLimitPolicy`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
	/// The request may proceed immediately.
	Allow,
	/// The request exceeded the budget.
	Reject(RetryDirective),
}

/// Advises callers when to retry after a [`RateLimitDecision::Reject`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryDirective {
	/// Instant when the current window closes.
	pub earliest_retry_at: OffsetDateTime,
	/// Suggested backoff duration.
	pub recommended_backoff: Duration,
	/// Optional descriptive string.
	pub reason: Option<String>,
}
impl RetryDirective {
	/// Creates a new directive with the provided timing metadata.
	pub fn new(earliest_retry_at: OffsetDateTime, recommended_backoff: Duration) -> Self {
		Self { earliest_retry_at, recommended_backoff, reason: None }
	}

	/// Adds a human-readable reason.
	pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
		self.reason = Some(reason.into());

		self
	}
}

/// Fixed-length time bucket a request falls into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WindowKey {
	/// Window index since the Unix epoch.
	pub bucket: i64,
	/// Window length.
	pub length: Duration,
}
impl WindowKey {
	/// Bucket containing `instant` for windows of `length` (clamped to at least one second).
	pub fn at(instant: OffsetDateTime, length: Duration) -> Self {
		let length = length.max(Duration::SECOND);
		let bucket = instant.unix_timestamp().div_euclid(length.whole_seconds());

		Self { bucket, length }
	}

	/// Instant the window closes.
	pub fn ends_at(&self) -> OffsetDateTime {
		let end = self.bucket.saturating_add(1).saturating_mul(self.length.whole_seconds());

		OffsetDateTime::from_unix_timestamp(end).unwrap_or(OffsetDateTime::UNIX_EPOCH)
	}
}

/// [`RateLimitPolicy`] counting requests in the shared [`SessionStore`].
#[derive(Clone)]
pub struct StoreRateLimiter {
	store: Arc<dyn SessionStore>,
	timeout: Duration,
}
impl StoreRateLimiter {
	/// Wraps a store handle; each check is bounded by `timeout`.
	pub fn new(store: Arc<dyn SessionStore>, timeout: Duration) -> Self {
		Self { store, timeout }
	}

	/// Counts one request for `subject` in `window` and compares against `limit`.
	pub async fn check(
		&self,
		subject: &SubjectId,
		window: WindowKey,
		limit: u32,
		observed_at: OffsetDateTime,
	) -> Result<RateLimitDecision, StoreError> {
		let key = StoreKey::RateWindow { subject: subject.clone(), bucket: window.bucket };
		let batch = StoreBatch::new().increment(key.clone()).expire(key, window.length);
		let replies = store::bounded(self.timeout, self.store.execute(batch)).await?;
		let count = match replies.first() {
			Some(BatchReply::Integer(count)) => *count,
			other => {
				return Err(StoreError::Backend {
					message: format!("Unexpected increment reply: {other:?}"),
				});
			},
		};

		if count <= i64::from(limit) {
			return Ok(RateLimitDecision::Allow);
		}

		let ends_at = window.ends_at();
		let backoff = (ends_at - observed_at).max(Duration::ZERO);

		Ok(RateLimitDecision::Reject(
			RetryDirective::new(ends_at, backoff)
				.with_reason(format!("{count} requests in a window allowing {limit}")),
		))
	}
}
impl RateLimitPolicy for StoreRateLimiter {
	fn evaluate<'a>(&'a self, context: &'a RateLimitContext) -> RateLimitFuture<'a> {
		Box::pin(async move {
			let window = WindowKey::at(context.observed_at, context.window);

			self.check(&context.subject, window, context.limit, context.observed_at).await
		})
	}
}
impl Debug for StoreRateLimiter {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("StoreRateLimiter").field("timeout", &self.timeout).finish_non_exhaustive()
	}
}
