//! Access token validation.

// self
use crate::{
	_prelude::*,
	auth::{AccessRequirement, TokenKind},
	codec::TokenClaims,
	flows::SessionBroker,
	obs::{self, OpKind},
};

impl SessionBroker {
	/// Validates an access token and returns its claims.
	///
	/// The refresh marker is not consulted; access tokens are revoked only through their own
	/// entries. A store failure rejects the token because its revocation state is unknown.
	pub async fn authorize(&self, access_token: &str) -> Result<TokenClaims> {
		obs::observe(OpKind::Authorize, "authorize", self.verify_access(access_token)).await
	}

	/// Validates an access token and checks its roles and level against `requirement`.
	pub async fn authorize_with(
		&self,
		access_token: &str,
		requirement: &AccessRequirement,
	) -> Result<TokenClaims> {
		obs::observe(OpKind::Authorize, "authorize_with", async move {
			let claims = self.verify_access(access_token).await?;

			claims.claims.check(requirement).map_err(|reason| Error::Forbidden { reason })?;

			Ok(claims)
		})
		.await
	}

	async fn verify_access(&self, access_token: &str) -> Result<TokenClaims> {
		let claims = self.codec.decode(access_token, TokenKind::Access)?;

		if self.revocations.is_revoked(TokenKind::Access, &claims.sub, &claims.jti).await? {
			return Err(Error::Revoked);
		}

		Ok(claims)
	}
}
