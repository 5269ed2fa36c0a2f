//! Refresh token rotation guarded by a compare-and-swap on the subject's marker.
//!
//! A refresh succeeds only while the presented token is the subject's active refresh token.
//! Rotation moves the marker with `compare_and_swap(expected = jti)`, so two concurrent
//! refreshes with the same token produce one new pair and one [`Error::StaleRefresh`].
//! Superseded refresh tokens are not denylisted; the marker alone makes them stale.

mod metrics;

pub use metrics::RefreshMetrics;

// self
use crate::{
	_prelude::*,
	auth::{TokenKind, TokenPair},
	flows::SessionBroker,
	obs::{self, OpKind},
	store::CompareAndSwapOutcome,
};

impl SessionBroker {
	/// Exchanges the active refresh token for a new pair carrying the same claims.
	pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
		const KIND: OpKind = OpKind::Refresh;

		obs::observe(KIND, "refresh", async move {
			self.refresh_metrics.record_attempt();

			let result = self.rotate(refresh_token).await;

			match &result {
				Ok(_) => self.refresh_metrics.record_rotation(),
				Err(Error::StaleRefresh) => {
					obs::debug_event(KIND, "refresh", &"presented refresh token is superseded");

					self.refresh_metrics.record_stale();
				},
				Err(_) => self.refresh_metrics.record_failure(),
			}

			result
		})
		.await
	}

	async fn rotate(&self, refresh_token: &str) -> Result<TokenPair> {
		let presented = self.codec.decode(refresh_token, TokenKind::Refresh)?;

		if self
			.revocations
			.is_revoked(TokenKind::Refresh, &presented.sub, &presented.jti)
			.await?
		{
			return Err(Error::Revoked);
		}

		let pair = self.issue_pair(&presented.sub, &presented.claims)?;
		let outcome = self
			.revocations
			.rotate_refresh_marker(
				&presented.sub,
				&presented.jti,
				&pair.refresh.id,
				self.config.refresh_ttl,
			)
			.await?;

		match outcome {
			CompareAndSwapOutcome::Updated => Ok(pair),
			CompareAndSwapOutcome::Mismatch | CompareAndSwapOutcome::Missing =>
				Err(Error::StaleRefresh),
		}
	}
}
