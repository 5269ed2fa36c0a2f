//! Explicit revocation of individual tokens and logout.

// self
use crate::{
	_prelude::*,
	auth::{SubjectId, TokenId, TokenKind},
	codec::{CodecError, TokenClaims},
	flows::SessionBroker,
	obs::{self, OpKind},
};

impl SessionBroker {
	/// Denylists a token identity for `ttl`.
	///
	/// `ttl` is capped at the configured lifetime of `kind` so an entry never outlives the token
	/// it blocks. Prefer [`SessionBroker::revoke_access`] and [`SessionBroker::revoke_refresh`],
	/// which derive the exact remaining lifetime from the token itself.
	pub async fn revoke(
		&self,
		token: &TokenId,
		subject: &SubjectId,
		kind: TokenKind,
		ttl: Duration,
	) -> Result<()> {
		obs::observe(OpKind::Revoke, "revoke", async move {
			let ttl = ttl.min(self.lifetime_of(kind));

			self.revocations.revoke(kind, subject, token, ttl).await?;

			Ok(())
		})
		.await
	}

	/// Denylists an access token for the rest of its lifetime.
	pub async fn revoke_access(&self, access_token: &str) -> Result<()> {
		obs::observe(OpKind::Revoke, "revoke_access", async move {
			let claims = self.codec.decode(access_token, TokenKind::Access)?;

			self.revoke_decoded(&claims).await
		})
		.await
	}

	/// Denylists a refresh token for the rest of its lifetime.
	pub async fn revoke_refresh(&self, refresh_token: &str) -> Result<()> {
		obs::observe(OpKind::Revoke, "revoke_refresh", async move {
			let claims = self.codec.decode(refresh_token, TokenKind::Refresh)?;

			self.revoke_decoded(&claims).await
		})
		.await
	}

	/// Revokes both halves of a session.
	///
	/// An access token that already expired needs no entry and is skipped; the refresh token must
	/// still decode.
	pub async fn logout(&self, access_token: &str, refresh_token: &str) -> Result<()> {
		obs::observe(OpKind::Logout, "logout", async move {
			let refresh = self.codec.decode(refresh_token, TokenKind::Refresh)?;

			match self.codec.decode(access_token, TokenKind::Access) {
				Ok(access) => self.revoke_decoded(&access).await?,
				Err(CodecError::Expired) =>
					obs::debug_event(OpKind::Logout, "logout", &"access token already expired"),
				Err(e) => return Err(e.into()),
			}

			self.revoke_decoded(&refresh).await
		})
		.await
	}

	async fn revoke_decoded(&self, claims: &TokenClaims) -> Result<()> {
		let ttl = claims.remaining_at(self.now());

		self.revocations.revoke(claims.kind, &claims.sub, &claims.jti, ttl).await?;

		Ok(())
	}

	fn lifetime_of(&self, kind: TokenKind) -> Duration {
		match kind {
			TokenKind::Access => self.config.access_ttl,
			TokenKind::Refresh => self.config.refresh_ttl,
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		_preludet::*,
		auth::SubjectClaims,
		store::{SessionStore, StoreKey},
	};

	fn alice() -> SubjectId {
		SubjectId::new("alice").expect("Subject fixture should be valid.")
	}

	#[tokio::test]
	async fn explicit_ttl_is_capped_at_the_kind_lifetime() {
		let (broker, _, clock) = build_test_broker();
		let token = TokenId::new("jti-1").expect("Token id fixture should be valid.");

		broker
			.revoke(&token, &alice(), TokenKind::Access, Duration::days(365))
			.await
			.expect("Revoke should succeed.");

		clock.advance(broker.config.access_ttl - Duration::SECOND);

		assert!(
			broker
				.revocations
				.is_revoked(TokenKind::Access, &alice(), &token)
				.await
				.expect("Lookup should succeed.")
		);

		clock.advance(Duration::SECOND);

		assert!(
			!broker
				.revocations
				.is_revoked(TokenKind::Access, &alice(), &token)
				.await
				.expect("Lookup should succeed.")
		);
	}

	#[tokio::test]
	async fn logout_skips_expired_access_tokens() {
		let (broker, store, clock) = build_test_broker();
		let pair =
			broker.login(&alice(), &SubjectClaims::default()).await.expect("Login should succeed.");

		clock.advance(broker.config.access_ttl);
		broker
			.logout(pair.access.secret.expose(), pair.refresh.secret.expose())
			.await
			.expect("Logout should tolerate an expired access token.");

		let key = StoreKey::Revocation {
			kind: TokenKind::Refresh,
			subject: alice(),
			token: pair.refresh.id.clone(),
		};

		assert!(store.get(&key).await.expect("Lookup should succeed.").is_some());
		assert!(matches!(broker.refresh(pair.refresh.secret.expose()).await, Err(Error::Revoked)));
	}

	#[tokio::test]
	async fn logout_rejects_a_forged_access_token() {
		let (broker, _, _) = build_test_broker();
		let pair =
			broker.login(&alice(), &SubjectClaims::default()).await.expect("Login should succeed.");

		assert!(matches!(
			broker.logout("not-a-token", pair.refresh.secret.expose()).await,
			Err(Error::InvalidSignature)
		));
	}
}
