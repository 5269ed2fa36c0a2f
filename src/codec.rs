//! Claims codec: signs and verifies expiring HS256 tokens carrying subject claims.
//!
//! The codec is a pure function of its input and the injected clock. Expiry and kind checks
//! run here rather than inside `jsonwebtoken` so the same clock drives token validity, store
//! TTLs, and rate windows.

// std
use std::{collections::HashSet, env};
// crates.io
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
// self
use crate::{
	_prelude::*,
	auth::{
		IssuedToken, SubjectClaims, SubjectId, TokenId, TokenKind, TokenSecret,
		token::issued::remaining_lifetime,
	},
	clock::{self, Clock},
	error::ConfigError,
};

/// Errors produced while encoding or decoding tokens.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum CodecError {
	/// Signature, structure, or algorithm check failed.
	#[error("Token failed signature verification.")]
	InvalidSignature,
	/// Current instant is at or past the token expiry.
	#[error("Token has expired.")]
	Expired,
	/// Token kind differs from the expected kind.
	#[error("Expected a {expected} token but found a {found} token.")]
	KindMismatch {
		/// Kind required by the caller.
		expected: TokenKind,
		/// Kind encoded in the token.
		found: TokenKind,
	},
	/// Token could not be signed.
	#[error("Token encoding failed: {message}.")]
	Encode {
		/// Encoder-supplied message.
		message: String,
	},
}

/// Claims serialized into every token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
	/// Subject identifier.
	pub sub: SubjectId,
	/// Unique token identity.
	pub jti: TokenId,
	/// Access or refresh.
	#[serde(rename = "type")]
	pub kind: TokenKind,
	/// Issued-at, seconds since the Unix epoch.
	pub iat: i64,
	/// Expiry, seconds since the Unix epoch.
	pub exp: i64,
	/// Role names held at issuance.
	#[serde(flatten)]
	pub claims: SubjectClaims,
}
impl TokenClaims {
	/// Expiry as an instant.
	pub fn expires_at(&self) -> Result<OffsetDateTime, CodecError> {
		OffsetDateTime::from_unix_timestamp(self.exp).map_err(|_| CodecError::InvalidSignature)
	}

	/// Remaining lifetime at `instant`, clamped at zero.
	pub fn remaining_at(&self, instant: OffsetDateTime) -> Duration {
		match self.expires_at() {
			Ok(expires_at) => remaining_lifetime(expires_at, instant),
			Err(_) => Duration::ZERO,
		}
	}
}

/// Signs and verifies tokens with a shared HMAC secret.
#[derive(Clone)]
pub struct ClaimsCodec {
	encoding: EncodingKey,
	decoding: DecodingKey,
	validation: Validation,
	clock: Arc<dyn Clock>,
}
impl ClaimsCodec {
	/// Minimum accepted secret length in bytes.
	pub const MIN_SECRET_LEN: usize = 32;
	/// Environment variable consulted by [`ClaimsCodec::from_env`].
	pub const SECRET_ENV: &'static str = "AUTHJWT_SECRET_KEY";

	/// Creates a codec for the provided secret using the system clock.
	pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, ConfigError> {
		let secret = secret.as_ref();

		if secret.len() < Self::MIN_SECRET_LEN {
			return Err(ConfigError::WeakSigningSecret { min: Self::MIN_SECRET_LEN });
		}

		let mut validation = Validation::new(Algorithm::HS256);

		validation.validate_exp = false;
		validation.validate_nbf = false;
		validation.validate_aud = false;
		validation.required_spec_claims = HashSet::new();

		Ok(Self {
			encoding: EncodingKey::from_secret(secret),
			decoding: DecodingKey::from_secret(secret),
			validation,
			clock: clock::system(),
		})
	}

	/// Reads the secret from `AUTHJWT_SECRET_KEY`.
	pub fn from_env() -> Result<Self, ConfigError> {
		let secret = env::var(Self::SECRET_ENV)
			.map_err(|_| ConfigError::MissingEnv { name: Self::SECRET_ENV.into() })?;

		Self::new(secret)
	}

	/// Replaces the time source.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self
	}

	/// Signs a token with a fresh identity expiring `ttl` from now.
	pub fn issue(
		&self,
		kind: TokenKind,
		subject: &SubjectId,
		claims: &SubjectClaims,
		ttl: Duration,
	) -> Result<IssuedToken, CodecError> {
		let now = self.clock.now();
		let iat = now.unix_timestamp();
		let exp = iat.saturating_add(ttl.whole_seconds());
		let payload = TokenClaims {
			sub: subject.clone(),
			jti: TokenId::generate(),
			kind,
			iat,
			exp,
			claims: claims.clone(),
		};
		let encoded = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &payload, &self.encoding)
			.map_err(|e| CodecError::Encode { message: e.to_string() })?;
		let issued_at = OffsetDateTime::from_unix_timestamp(iat)
			.map_err(|e| CodecError::Encode { message: e.to_string() })?;
		let expires_at = OffsetDateTime::from_unix_timestamp(exp)
			.map_err(|e| CodecError::Encode { message: e.to_string() })?;

		Ok(IssuedToken {
			kind,
			id: payload.jti,
			subject: payload.sub,
			claims: payload.claims,
			issued_at,
			expires_at,
			secret: TokenSecret::new(encoded),
		})
	}

	/// Verifies a token against the current instant and the expected kind.
	pub fn decode(&self, token: &str, expected: TokenKind) -> Result<TokenClaims, CodecError> {
		self.decode_at(token, expected, self.clock.now())
	}

	/// Verifies a token against an explicit instant.
	///
	/// Checks run in order: signature, expiry, kind.
	pub fn decode_at(
		&self,
		token: &str,
		expected: TokenKind,
		instant: OffsetDateTime,
	) -> Result<TokenClaims, CodecError> {
		let data = jsonwebtoken::decode::<TokenClaims>(token, &self.decoding, &self.validation)
			.map_err(|_| CodecError::InvalidSignature)?;
		let claims = data.claims;

		if instant >= claims.expires_at()? {
			return Err(CodecError::Expired);
		}
		if claims.kind != expected {
			return Err(CodecError::KindMismatch { expected, found: claims.kind });
		}

		Ok(claims)
	}
}
impl Debug for ClaimsCodec {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClaimsCodec").field("algorithm", &"HS256").field("secret", &"<redacted>").finish()
	}
}
