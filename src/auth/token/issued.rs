//! Immutable token artifacts returned by issuance and rotation.

// self
use crate::{
	_prelude::*,
	auth::{SubjectClaims, SubjectId, TokenId, TokenKind, TokenSecret},
};

/// Lifecycle status of an issued token, ignoring store-side revocation state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenStatus {
	/// Issued-at instant is in the future.
	Pending,
	/// Token is within its lifetime.
	Active,
	/// Token reached its expiry instant.
	Expired,
}

/// Signed token plus the metadata encoded inside it.
///
/// Tokens are never mutated; rotation issues a new one and revocation happens in the store.
#[derive(Clone, Serialize, Deserialize)]
pub struct IssuedToken {
	/// Access or refresh.
	pub kind: TokenKind,
	/// Unique token identity (`jti`).
	pub id: TokenId,
	/// Subject the token was issued to.
	pub subject: SubjectId,
	/// Claims snapshot embedded in the token.
	pub claims: SubjectClaims,
	/// Issue instant (second precision).
	pub issued_at: OffsetDateTime,
	/// Expiry instant (second precision).
	pub expires_at: OffsetDateTime,
	/// Encoded token string for the transport layer.
	pub secret: TokenSecret,
}
impl IssuedToken {
	/// Computes the lifecycle status at a given instant.
	pub fn status_at(&self, instant: OffsetDateTime) -> TokenStatus {
		if instant < self.issued_at {
			return TokenStatus::Pending;
		}
		if instant >= self.expires_at {
			return TokenStatus::Expired;
		}

		TokenStatus::Active
	}

	/// Remaining lifetime at `instant`, clamped at zero.
	pub fn remaining_at(&self, instant: OffsetDateTime) -> Duration {
		remaining_lifetime(self.expires_at, instant)
	}

	/// Natural lifetime between issuance and expiry.
	pub fn lifetime(&self) -> Duration {
		self.expires_at - self.issued_at
	}
}
impl Debug for IssuedToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("IssuedToken")
			.field("kind", &self.kind)
			.field("id", &self.id)
			.field("subject", &self.subject)
			.field("claims", &self.claims)
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.field("secret", &self.secret)
			.finish()
	}
}

/// Access/refresh pair minted by login and refresh.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenPair {
	/// Short-lived access token.
	pub access: IssuedToken,
	/// Refresh token that is now the subject's active refresh marker.
	pub refresh: IssuedToken,
}

pub(crate) fn remaining_lifetime(expires_at: OffsetDateTime, instant: OffsetDateTime) -> Duration {
	let remaining = expires_at - instant;

	if remaining.is_positive() { remaining } else { Duration::ZERO }
}
