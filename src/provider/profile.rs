//! Authorization-code exchange and provider profile parsing.

// self
#[cfg(feature = "reqwest")] use crate::error::ConfigError;
use crate::{
	_prelude::*, auth::ExternalId, directory::SubjectProfile, error::ProviderError,
	provider::ProviderSettings,
};

/// Boxed future returned by [`ProfileClient::fetch_profile`].
pub type ProfileFuture<'a> =
	Pin<Box<dyn Future<Output = Result<ProviderProfile, ProviderError>> + 'a + Send>>;

/// Exchanges an authorization code for the caller's provider profile.
///
/// Implementations perform exactly one attempt; retry policy belongs to the caller.
pub trait ProfileClient
where
	Self: Send + Sync,
{
	/// Redeems `code` at the token endpoint and reads the user-info endpoint.
	fn fetch_profile<'a>(
		&'a self,
		settings: &'a ProviderSettings,
		code: &'a str,
	) -> ProfileFuture<'a>;
}

/// Normalized user profile returned by an identity provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderProfile {
	/// Provider-assigned identifier.
	pub external_id: ExternalId,
	/// Primary email address.
	pub email: String,
	/// Given name.
	pub first_name: Option<String>,
	/// Family name.
	pub last_name: Option<String>,
}
impl ProviderProfile {
	/// Fields used to create a local subject.
	pub fn subject_profile(&self) -> SubjectProfile {
		SubjectProfile {
			email: self.email.clone(),
			first_name: self.first_name.clone(),
			last_name: self.last_name.clone(),
		}
	}
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
	Text(String),
	Number(i64),
}

#[derive(Deserialize)]
struct RawProfile {
	#[serde(default, alias = "sub")]
	id: Option<RawId>,
	#[serde(default)]
	default_email: Option<String>,
	#[serde(default)]
	email: Option<String>,
	#[serde(default)]
	emails: Vec<String>,
	#[serde(default, alias = "given_name")]
	first_name: Option<String>,
	#[serde(default, alias = "family_name")]
	last_name: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
	access_token: String,
}

/// Parses a user-info payload.
///
/// `id` may be a string or a number; the email comes from `default_email`, `email`, or the
/// first entry of `emails`, in that order.
pub fn parse_profile(bytes: &[u8]) -> Result<ProviderProfile, ProviderError> {
	let raw: RawProfile = parse_json("user_info", bytes)?;
	let id = match raw.id.ok_or(ProviderError::MissingField { field: "id" })? {
		RawId::Text(text) => text,
		RawId::Number(number) => number.to_string(),
	};
	let email = raw
		.default_email
		.or(raw.email)
		.or_else(|| raw.emails.into_iter().next())
		.filter(|email| !email.trim().is_empty())
		.ok_or(ProviderError::MissingField { field: "email" })?;

	Ok(ProviderProfile {
		external_id: ExternalId::new(id)?,
		email,
		first_name: raw.first_name,
		last_name: raw.last_name,
	})
}

fn parse_json<T>(endpoint: &'static str, bytes: &[u8]) -> Result<T, ProviderError>
where
	T: for<'de> Deserialize<'de>,
{
	let mut deserializer = serde_json::Deserializer::from_slice(bytes);

	serde_path_to_error::deserialize(&mut deserializer)
		.map_err(|source| ProviderError::Parse { endpoint, source })
}

/// [`ProfileClient`] backed by reqwest; redirects are never followed.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestProfileClient(ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestProfileClient {
	/// Builds a client with redirect following disabled.
	pub fn new() -> Result<Self, ConfigError> {
		let client = ReqwestClient::builder()
			.redirect(reqwest::redirect::Policy::none())
			.build()
			.map_err(ConfigError::http_client_build)?;

		Ok(Self(client))
	}

	/// Wraps an existing reqwest client.
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	async fn redeem(&self, settings: &ProviderSettings, code: &str) -> Result<String, ProviderError> {
		let form = [
			("grant_type", "authorization_code"),
			("code", code),
			("client_id", settings.client_id.as_str()),
			("client_secret", settings.client_secret()),
			("redirect_uri", settings.redirect_uri.as_str()),
		];
		let response = self.0.post(settings.token_url.clone()).form(&form).send().await?;
		let status = response.status();

		if !status.is_success() {
			return Err(ProviderError::Status { endpoint: "token", status: status.as_u16() });
		}

		let token: TokenResponse = parse_json("token", &response.bytes().await?)?;

		Ok(token.access_token)
	}
}
#[cfg(feature = "reqwest")]
impl ProfileClient for ReqwestProfileClient {
	fn fetch_profile<'a>(
		&'a self,
		settings: &'a ProviderSettings,
		code: &'a str,
	) -> ProfileFuture<'a> {
		Box::pin(async move {
			let access_token = self.redeem(settings, code).await?;
			let response = self
				.0
				.get(settings.user_info_url.clone())
				.header(
					reqwest::header::AUTHORIZATION,
					format!("{} {access_token}", settings.user_info_scheme),
				)
				.send()
				.await?;
			let status = response.status();

			if !status.is_success() {
				return Err(ProviderError::Status { endpoint: "user_info", status: status.as_u16() });
			}

			parse_profile(&response.bytes().await?)
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn yandex_payload_uses_default_email_and_numeric_id() {
		let profile = parse_profile(
			br#"{"id":"1130000012345678","default_email":"alice@yandex.ru","emails":["a@b.c"],"first_name":"Alice","last_name":"Liddell"}"#,
		)
		.expect("Yandex payload should parse.");

		assert_eq!(profile.external_id.as_ref(), "1130000012345678");
		assert_eq!(profile.email, "alice@yandex.ru");
		assert_eq!(profile.first_name.as_deref(), Some("Alice"));

		let numeric = parse_profile(br#"{"id":42,"emails":["bob@example.com"]}"#)
			.expect("Numeric id payload should parse.");

		assert_eq!(numeric.external_id.as_ref(), "42");
		assert_eq!(numeric.email, "bob@example.com");
	}

	#[test]
	fn openid_payload_uses_standard_claim_names() {
		let profile = parse_profile(
			br#"{"sub":"g-1","email":"carol@example.com","given_name":"Carol","family_name":"Danvers"}"#,
		)
		.expect("OpenID payload should parse.");

		assert_eq!(profile.external_id.as_ref(), "g-1");
		assert_eq!(profile.last_name.as_deref(), Some("Danvers"));
		assert_eq!(profile.subject_profile().email, "carol@example.com");
	}

	#[test]
	fn missing_fields_and_bad_shapes_are_reported() {
		assert!(matches!(
			parse_profile(br#"{"id":"x"}"#),
			Err(ProviderError::MissingField { field: "email" })
		));
		assert!(matches!(
			parse_profile(br#"{"email":"a@b.c"}"#),
			Err(ProviderError::MissingField { field: "id" })
		));

		let err = parse_profile(br#"{"id":"x","emails":"not-a-list"}"#)
			.expect_err("Malformed emails should fail.");

		match err {
			ProviderError::Parse { endpoint, source } => {
				assert_eq!(endpoint, "user_info");
				assert_eq!(source.path().to_string(), "emails");
			},
			other => panic!("Unexpected error: {other:?}"),
		}
	}
}
