//! Optional observability helpers for session operations.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `session_broker.op` with the `op`
//!   (operation) and `stage` (call site) fields.
//! - Enable `metrics` to increment the `session_broker_op_total` counter for every
//!   attempt/success/failure, labeled by `op` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Session operations observed by the broker and linker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
	/// Pair issuance for an authenticated subject.
	Login,
	/// Refresh token rotation.
	Refresh,
	/// Explicit revocation of one token.
	Revoke,
	/// Access token validation.
	Authorize,
	/// Revocation of an access/refresh pair.
	Logout,
	/// Provider identity to local subject resolution.
	OAuthResolve,
	/// Federated login start/completion.
	OAuthLogin,
	/// Per-subject budget check.
	RateLimit,
}
impl OpKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpKind::Login => "login",
			OpKind::Refresh => "refresh",
			OpKind::Revoke => "revoke",
			OpKind::Authorize => "authorize",
			OpKind::Logout => "logout",
			OpKind::OAuthResolve => "oauth_resolve",
			OpKind::OAuthLogin => "oauth_login",
			OpKind::RateLimit => "rate_limit",
		}
	}
}
impl Display for OpKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpOutcome {
	/// Entry to an operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl OpOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpOutcome::Attempt => "attempt",
			OpOutcome::Success => "success",
			OpOutcome::Failure => "failure",
		}
	}
}
impl Display for OpOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Runs `fut` inside an operation span, recording attempt and outcome.
pub(crate) async fn observe<T, Fut>(kind: OpKind, stage: &'static str, fut: Fut) -> Result<T>
where
	Fut: Future<Output = Result<T>>,
{
	let span = OpSpan::new(kind, stage);

	record_op_outcome(kind, OpOutcome::Attempt);

	let result = span.instrument(fut).await;

	match &result {
		Ok(_) => record_op_outcome(kind, OpOutcome::Success),
		Err(e) => {
			if matches!(e, Error::StoreUnavailable(_)) {
				warn_event(kind, stage, e);
			} else {
				debug_event(kind, stage, e);
			}

			record_op_outcome(kind, OpOutcome::Failure);
		},
	}

	result
}
