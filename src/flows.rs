//! Session operations orchestrated by [`SessionBroker`] and federated resolution by
//! [`OAuthLinker`].

pub mod authorize;
pub mod login;
pub mod oauth_link;
pub mod refresh;
pub mod revoke;

pub use oauth_link::*;
pub use refresh::RefreshMetrics;

// self
use crate::{
	_prelude::*,
	auth::{SubjectClaims, SubjectId, TokenKind, TokenPair},
	clock::{self, Clock},
	codec::ClaimsCodec,
	config::SessionConfig,
	obs::{self, OpKind},
	rate_limit::{RateLimitContext, RateLimitDecision, RateLimitPolicy, StoreRateLimiter},
	store::{RevocationStore, SessionStore},
};

/// Issues, rotates, revokes, and validates paired access/refresh tokens.
///
/// The broker owns no mutable in-process state beyond counters; every cross-request decision is
/// made by the shared [`SessionStore`] so several brokers may serve the same subjects.
#[derive(Clone)]
pub struct SessionBroker {
	/// Signs and verifies tokens.
	pub codec: ClaimsCodec,
	/// Revocation entries and refresh markers.
	pub revocations: RevocationStore,
	/// Per-subject request budget; a [`StoreRateLimiter`] over the broker's store by default.
	pub limiter: Arc<dyn RateLimitPolicy>,
	/// Lifetimes, store bound, and rate limit.
	pub config: SessionConfig,
	/// Shared counters for refresh outcomes.
	pub refresh_metrics: Arc<RefreshMetrics>,
	clock: Arc<dyn Clock>,
}
impl SessionBroker {
	/// Creates a broker over `store`; every store call is bounded by `config.store_timeout`.
	pub fn new(store: Arc<dyn SessionStore>, codec: ClaimsCodec, config: SessionConfig) -> Self {
		Self {
			codec,
			revocations: RevocationStore::new(store.clone(), config.store_timeout),
			limiter: Arc::new(StoreRateLimiter::new(store, config.store_timeout)),
			config,
			refresh_metrics: Default::default(),
			clock: clock::system(),
		}
	}

	/// Replaces the time source for the broker and its codec.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.codec = self.codec.with_clock(clock.clone());
		self.clock = clock;

		self
	}

	/// Replaces the rate-limit policy.
	pub fn with_rate_limiter(mut self, limiter: Arc<dyn RateLimitPolicy>) -> Self {
		self.limiter = limiter;

		self
	}

	/// Counts one request for `subject`, failing with [`Error::RateLimited`] above the budget.
	///
	/// Store failures surface as [`Error::StoreUnavailable`]; the caller decides whether to admit
	/// the request.
	pub async fn check_rate_limit(&self, subject: &SubjectId) -> Result<()> {
		obs::observe(OpKind::RateLimit, "check_rate_limit", async move {
			let context =
				RateLimitContext::new(subject.clone(), self.config.rate_limit, self.clock.now());

			match self.limiter.evaluate(&context).await? {
				RateLimitDecision::Allow => Ok(()),
				RateLimitDecision::Reject(directive) =>
					Err(Error::RateLimited { retry_after: directive.recommended_backoff }),
			}
		})
		.await
	}

	pub(crate) fn now(&self) -> OffsetDateTime {
		self.clock.now()
	}

	fn issue_pair(&self, subject: &SubjectId, claims: &SubjectClaims) -> Result<TokenPair> {
		let access = self.codec.issue(TokenKind::Access, subject, claims, self.config.access_ttl)?;
		let refresh =
			self.codec.issue(TokenKind::Refresh, subject, claims, self.config.refresh_ttl)?;

		Ok(TokenPair { access, refresh })
	}
}
impl Debug for SessionBroker {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionBroker")
			.field("codec", &self.codec)
			.field("config", &self.config)
			.field("clock", &self.clock)
			.finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		_preludet::*,
		config::RateLimitConfig,
		rate_limit::{RateLimitFuture, RetryDirective},
	};

	/// Rejects every request and remembers what it was asked.
	#[derive(Default)]
	struct RecordingPolicy(Mutex<Vec<(SubjectId, OffsetDateTime)>>);
	impl RateLimitPolicy for RecordingPolicy {
		fn evaluate<'a>(&'a self, context: &'a RateLimitContext) -> RateLimitFuture<'a> {
			Box::pin(async move {
				self.0.lock().push((context.subject.clone(), context.observed_at));

				Ok(RateLimitDecision::Reject(RetryDirective::new(
					context.observed_at + Duration::seconds(7),
					Duration::seconds(7),
				)))
			})
		}
	}

	#[tokio::test]
	async fn rate_limit_rejects_until_the_next_window() {
		let (broker, _, clock) = build_test_broker();
		let broker = SessionBroker {
			config: SessionConfig {
				rate_limit: RateLimitConfig { limit: 2, window: Duration::MINUTE },
				..broker.config
			},
			..broker
		};
		let alice = SubjectId::new("alice").expect("Subject fixture should be valid.");

		clock.advance(Duration::seconds(15));

		for _ in 0..2 {
			broker.check_rate_limit(&alice).await.expect("Requests within budget should pass.");
		}

		let err = broker.check_rate_limit(&alice).await.expect_err("Third request should fail.");

		assert!(matches!(err, Error::RateLimited { retry_after } if retry_after == Duration::seconds(45)));

		clock.advance(Duration::seconds(45));
		broker.check_rate_limit(&alice).await.expect("Next window should reset the budget.");
	}

	#[tokio::test]
	async fn rate_limit_checks_go_through_the_configured_policy() {
		let (broker, _, clock) = build_test_broker();
		let policy = Arc::new(RecordingPolicy::default());
		let broker = broker.with_rate_limiter(policy.clone());
		let alice = SubjectId::new("alice").expect("Subject fixture should be valid.");

		clock.advance(Duration::seconds(3));

		let err = broker.check_rate_limit(&alice).await.expect_err("Policy should reject.");

		assert!(matches!(err, Error::RateLimited { retry_after } if retry_after == Duration::seconds(7)));
		assert_eq!(*policy.0.lock(), vec![(alice, test_epoch() + Duration::seconds(3))]);
	}
}
