//! Access/refresh token kind discriminator.

// self
use crate::_prelude::*;

/// Distinguishes short-lived access tokens from refresh tokens signed with the same key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
	/// Credential authorizing individual requests.
	Access,
	/// Credential used solely to mint new access/refresh pairs.
	Refresh,
}
impl TokenKind {
	/// Returns the stable label used in claims and store keys.
	pub const fn as_str(self) -> &'static str {
		match self {
			TokenKind::Access => "access",
			TokenKind::Refresh => "refresh",
		}
	}
}
impl Display for TokenKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
