//! Session-level error types shared across the codec, stores, flows, and linker.

// self
use crate::{
	_prelude::*,
	auth::{AccessLevelError, IdentifierError, TokenKind},
	codec::CodecError,
	directory::DirectoryError,
	provider::ProviderSettingsError,
	store::StoreError,
};

/// Session-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public session APIs.
///
/// Use [`Error::public_kind`] before rendering anything to end users; the variants
/// themselves are precise enough to leak validation internals.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Token failed its integrity check or could not be parsed.
	#[error("Token signature is invalid.")]
	InvalidSignature,
	/// Token reached its expiry instant.
	#[error("Token has expired.")]
	Expired,
	/// Token kind differs from the kind the call site requires.
	#[error("Expected a {expected} token but received a {found} token.")]
	KindMismatch {
		/// Kind required by the operation.
		expected: TokenKind,
		/// Kind encoded in the token.
		found: TokenKind,
	},
	/// A revocation entry exists for the token identity.
	#[error("Token has been revoked.")]
	Revoked,
	/// Refresh token was superseded by a later login or refresh.
	#[error("Refresh token is no longer the active refresh token for its subject.")]
	StaleRefresh,
	/// Another request linked the same provider identity first.
	#[error("Provider identity is already linked to a local subject.")]
	DuplicateLink,
	/// Subject exceeded its request budget for the current window.
	#[error("Rate limit exceeded; retry in {retry_after}.")]
	RateLimited {
		/// Time until the current window closes.
		retry_after: Duration,
	},
	/// Shared store failed or timed out; revocation state cannot be confirmed.
	#[error("Session store is unavailable.")]
	StoreUnavailable(#[source] StoreError),

	/// Claims do not satisfy the role or access-level requirement.
	#[error("Access denied: {reason}.")]
	Forbidden {
		/// Which requirement failed.
		reason: String,
	},
	/// No provider settings are registered under the requested name.
	#[error("OAuth provider `{provider}` is not configured.")]
	UnknownProvider {
		/// Requested provider name.
		provider: String,
	},
	/// OAuth login state is unknown, expired, or was already consumed.
	#[error("OAuth login state is invalid or has already been used.")]
	InvalidState,
	/// User/role directory failure.
	#[error(transparent)]
	Directory(DirectoryError),
	/// Identity-provider exchange failure.
	#[error(transparent)]
	Provider(#[from] ProviderError),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
}
impl Error {
	/// Collapses the error into the category that is safe to expose to callers.
	pub fn public_kind(&self) -> PublicErrorKind {
		match self {
			Self::InvalidSignature
			| Self::Expired
			| Self::KindMismatch { .. }
			| Self::Revoked
			| Self::StaleRefresh
			| Self::InvalidState => PublicErrorKind::Unauthorized,
			Self::Forbidden { .. } => PublicErrorKind::Forbidden,
			Self::RateLimited { .. } => PublicErrorKind::RateLimited,
			Self::UnknownProvider { .. } => PublicErrorKind::NotFound,
			Self::StoreUnavailable(_) | Self::Provider(_) => PublicErrorKind::Unavailable,
			Self::Directory(DirectoryError::Backend { .. } | DirectoryError::Timeout) =>
				PublicErrorKind::Unavailable,
			Self::Directory(_) | Self::DuplicateLink | Self::Config(_) => PublicErrorKind::Internal,
		}
	}

	/// Returns `true` when the caller should treat the credentials as unusable.
	pub fn is_unauthorized(&self) -> bool {
		matches!(self.public_kind(), PublicErrorKind::Unauthorized)
	}
}
impl From<StoreError> for Error {
	fn from(e: StoreError) -> Self {
		Self::StoreUnavailable(e)
	}
}
impl From<CodecError> for Error {
	fn from(e: CodecError) -> Self {
		match e {
			CodecError::InvalidSignature => Self::InvalidSignature,
			CodecError::Expired => Self::Expired,
			CodecError::KindMismatch { expected, found } => Self::KindMismatch { expected, found },
			CodecError::Encode { .. } => Self::Config(ConfigError::TokenEncoding { source: e }),
		}
	}
}
impl From<DirectoryError> for Error {
	fn from(e: DirectoryError) -> Self {
		match e {
			DirectoryError::DuplicateLink => Self::DuplicateLink,
			other => Self::Directory(other),
		}
	}
}

/// Uniform error categories safe to surface to end users.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublicErrorKind {
	/// Credentials are missing, malformed, expired, revoked, or superseded.
	Unauthorized,
	/// Credentials are valid but lack the required roles or level.
	Forbidden,
	/// Caller should back off until the current window closes.
	RateLimited,
	/// Requested resource (e.g., provider) does not exist.
	NotFound,
	/// A backing service is down; the caller decides whether to retry.
	Unavailable,
	/// Unexpected internal failure.
	Internal,
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// Signing secret is shorter than the HS256 minimum.
	#[error("Signing secret must be at least {min} bytes long.")]
	WeakSigningSecret {
		/// Minimum accepted length in bytes.
		min: usize,
	},
	/// A duration setting is zero or negative.
	#[error("The {setting} setting must be positive.")]
	NonPositiveDuration {
		/// Setting name.
		setting: &'static str,
	},
	/// Refresh tokens must outlive the access tokens they mint.
	#[error("Refresh TTL must be longer than the access TTL.")]
	RefreshNotLongerThanAccess,
	/// Rate limit window must allow at least one request.
	#[error("Rate limit must allow at least one request per window.")]
	ZeroRateLimit,
	/// Rate limit window is shorter than one second.
	#[error("Rate limit window must be at least one second.")]
	WindowTooShort,
	/// Environment variable is present but malformed.
	#[error("Environment variable `{name}` is invalid: {reason}.")]
	InvalidEnv {
		/// Variable name.
		name: String,
		/// Parser-supplied reason.
		reason: String,
	},
	/// Required environment variable is missing.
	#[error("Environment variable `{name}` is required.")]
	MissingEnv {
		/// Variable name.
		name: String,
	},
	/// Default role for federated sign-ups is not present in the directory.
	#[error("Default role `{role}` does not exist in the directory.")]
	MissingDefaultRole {
		/// Configured role name.
		role: String,
	},
	/// Provider settings failed validation.
	#[error(transparent)]
	Provider(#[from] ProviderSettingsError),
	/// Identifier failed validation.
	#[error(transparent)]
	Identifier(#[from] IdentifierError),
	/// Access level outside the supported range.
	#[error(transparent)]
	AccessLevel(#[from] AccessLevelError),
	/// Token could not be signed.
	#[error("Token could not be encoded.")]
	TokenEncoding {
		/// Underlying codec failure.
		#[source]
		source: CodecError,
	},
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}

	pub(crate) fn invalid_env(name: &str, reason: impl Display) -> Self {
		Self::InvalidEnv { name: name.to_owned(), reason: reason.to_string() }
	}
}

/// Identity-provider exchange failures (token endpoint, user-info endpoint).
#[derive(Debug, ThisError)]
pub enum ProviderError {
	/// Provider responded with a non-success status.
	#[error("The {endpoint} endpoint returned HTTP {status}.")]
	Status {
		/// Endpoint label (`token` or `user_info`).
		endpoint: &'static str,
		/// HTTP status code.
		status: u16,
	},
	/// Provider responded with JSON that does not match the expected shape.
	#[error("The {endpoint} endpoint returned malformed JSON.")]
	Parse {
		/// Endpoint label (`token` or `user_info`).
		endpoint: &'static str,
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Profile payload lacks a field required to create a local subject.
	#[error("Provider profile is missing the `{field}` field.")]
	MissingField {
		/// Field name.
		field: &'static str,
	},
	/// Profile payload contains an identifier that fails validation.
	#[error("Provider profile contains an invalid identifier.")]
	InvalidIdentity(#[from] IdentifierError),
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the identity provider.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
}
impl ProviderError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ProviderError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
