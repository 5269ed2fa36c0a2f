//! Strongly typed identifiers used in claims, store keys, and directory records.

// std
use std::{borrow::Borrow, ops::Deref};
// crates.io
use rand::{Rng, distr::Alphanumeric};
// self
use crate::_prelude::*;

macro_rules! def_id {
	($name:ident, $doc:literal, $kind:literal) => {
		#[doc = $doc]
		#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(try_from = "String", into = "String")]
		pub struct $name(String);
		impl $name {
			/// Creates a new identifier after validation.
			pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
				let view = value.as_ref();

				validate_view($kind, view)?;

				Ok(Self(view.to_owned()))
			}
		}
		impl Deref for $name {
			type Target = str;

			fn deref(&self) -> &Self::Target {
				&self.0
			}
		}
		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}
		impl From<$name> for String {
			fn from(value: $name) -> Self {
				value.0
			}
		}
		impl TryFrom<String> for $name {
			type Error = IdentifierError;

			fn try_from(value: String) -> Result<Self, Self::Error> {
				validate_view($kind, &value)?;

				Ok(Self(value))
			}
		}
		impl Borrow<str> for $name {
			fn borrow(&self) -> &str {
				&self.0
			}
		}
		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				write!(f, concat!($kind, "({})"), self.0)
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(&self.0)
			}
		}
		impl FromStr for $name {
			type Err = IdentifierError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Self::new(s)
			}
		}
	};
}

const IDENTIFIER_MAX_LEN: usize = 128;
const TOKEN_ID_LEN: usize = 32;
// Store keys are colon-delimited.
const KEY_SEPARATOR: char = ':';

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty.
	#[error("{kind} identifier cannot be empty.")]
	Empty {
		/// Kind of identifier (subject, provider, token, ...).
		kind: &'static str,
	},
	/// The identifier contains whitespace characters.
	#[error("{kind} identifier contains whitespace.")]
	ContainsWhitespace {
		/// Kind of identifier (subject, provider, token, ...).
		kind: &'static str,
	},
	/// The identifier contains the store key separator.
	#[error("{kind} identifier contains the reserved `:` separator.")]
	ContainsSeparator {
		/// Kind of identifier (subject, provider, token, ...).
		kind: &'static str,
	},
	/// The identifier exceeded the allowed character count.
	#[error("{kind} identifier exceeds {max} characters.")]
	TooLong {
		/// Kind of identifier (subject, provider, token, ...).
		kind: &'static str,
		/// Maximum permitted character count.
		max: usize,
	},
}

def_id! { SubjectId, "Stable identifier of an authenticated principal (user id or email).", "Subject" }
def_id! { ProviderId, "Name of a configured OAuth identity provider.", "Provider" }
def_id! { ExternalId, "Identifier assigned to a user by an OAuth identity provider.", "External" }
def_id! { TokenId, "Unique token identity carried in the `jti` claim.", "Token" }
def_id! { RoleName, "Name of a role attached to a subject.", "Role" }

impl TokenId {
	/// Generates a fresh random identity.
	pub fn generate() -> Self {
		Self(random_alphanumeric(TOKEN_ID_LEN))
	}
}

impl RoleName {
	/// Role attached to subjects created through federated sign-up unless configured otherwise.
	pub fn default_member() -> Self {
		Self(String::from("user"))
	}
}

pub(crate) fn random_alphanumeric(len: usize) -> String {
	rand::rng().sample_iter(Alphanumeric).take(len).map(char::from).collect()
}

fn validate_view(kind: &'static str, view: &str) -> Result<(), IdentifierError> {
	if view.is_empty() {
		return Err(IdentifierError::Empty { kind });
	}
	if view.chars().any(char::is_whitespace) {
		return Err(IdentifierError::ContainsWhitespace { kind });
	}
	if view.contains(KEY_SEPARATOR) {
		return Err(IdentifierError::ContainsSeparator { kind });
	}
	if view.len() > IDENTIFIER_MAX_LEN {
		return Err(IdentifierError::TooLong { kind, max: IDENTIFIER_MAX_LEN });
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn identifiers_reject_whitespace_and_separators() {
		assert!(SubjectId::new(" alice@example.com").is_err(), "Leading whitespace must be rejected.");
		assert!(ProviderId::new("yandex ").is_err(), "Trailing whitespace must be rejected.");
		assert_eq!(
			ExternalId::new("a:b"),
			Err(IdentifierError::ContainsSeparator { kind: "External" })
		);

		let subject = SubjectId::new("alice@example.com")
			.expect("Email-shaped subject fixture should be considered valid.");

		assert_eq!(subject.as_ref(), "alice@example.com");
		assert!(TokenId::new("").is_err());
	}

	#[test]
	fn serde_round_trip_enforces_validation() {
		let subject: SubjectId =
			serde_json::from_str("\"user-42\"").expect("Subject should deserialize successfully.");

		assert_eq!(subject.as_ref(), "user-42");
		assert!(serde_json::from_str::<SubjectId>("\"with space\"").is_err());
		assert!(serde_json::from_str::<RoleName>("\"\"").is_err());
	}

	#[test]
	fn length_limit_is_inclusive() {
		SubjectId::new("a".repeat(IDENTIFIER_MAX_LEN)).expect("Exact length should succeed.");

		assert!(SubjectId::new("a".repeat(IDENTIFIER_MAX_LEN + 1)).is_err());
	}

	#[test]
	fn generated_token_ids_are_unique_and_valid() {
		let first = TokenId::generate();
		let second = TokenId::generate();

		assert_ne!(first, second);
		assert_eq!(first.len(), TOKEN_ID_LEN);
		TokenId::new(first.as_ref()).expect("Generated identity should pass validation.");
	}
}
