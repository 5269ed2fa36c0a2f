//! Validated per-provider OAuth settings.

// crates.io
use url::Host;
// self
use crate::{_prelude::*, auth::ProviderId};

/// Errors raised while constructing or validating provider settings.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ProviderSettingsError {
	/// A required endpoint was not supplied.
	#[error("Missing {endpoint} endpoint.")]
	MissingEndpoint {
		/// Which endpoint is missing.
		endpoint: &'static str,
	},
	/// Endpoints must use HTTPS unless they point at a loopback host.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// Client identifier is empty.
	#[error("Client identifier cannot be empty.")]
	MissingClientId,
	/// Client secret is empty.
	#[error("Client secret cannot be empty.")]
	MissingClientSecret,
	/// User-info authorization scheme is empty or contains whitespace.
	#[error("User-info authorization scheme `{scheme}` is invalid.")]
	InvalidScheme {
		/// Rejected scheme.
		scheme: String,
	},
}

/// Endpoints and client credentials for one identity provider.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderSettings {
	/// Provider name.
	pub id: ProviderId,
	/// Authorization endpoint users are redirected to.
	pub auth_url: Url,
	/// Token endpoint exchanging codes for access tokens.
	pub token_url: Url,
	/// Endpoint returning the user's profile.
	pub user_info_url: Url,
	/// OAuth client identifier.
	pub client_id: String,
	/// Redirect URI registered with the provider.
	pub redirect_uri: Url,
	/// Scheme placed before the access token in the user-info `Authorization` header.
	pub user_info_scheme: String,
	client_secret: String,
}
impl ProviderSettings {
	/// Scheme used when none is configured.
	pub const DEFAULT_USER_INFO_SCHEME: &'static str = "Bearer";

	/// Creates a builder for the provided identifier.
	pub fn builder(id: ProviderId) -> ProviderSettingsBuilder {
		ProviderSettingsBuilder::new(id)
	}

	/// Returns the client secret.
	pub fn client_secret(&self) -> &str {
		&self.client_secret
	}

	/// Authorization URL carrying the client, redirect URI, and `state`.
	pub fn authorize_url(&self, state: &str) -> Url {
		let mut url = self.auth_url.clone();

		url.query_pairs_mut()
			.append_pair("response_type", "code")
			.append_pair("client_id", &self.client_id)
			.append_pair("redirect_uri", self.redirect_uri.as_str())
			.append_pair("state", state);

		url
	}

	fn validate(&self) -> Result<(), ProviderSettingsError> {
		validate_endpoint("authorization", &self.auth_url)?;
		validate_endpoint("token", &self.token_url)?;
		validate_endpoint("user_info", &self.user_info_url)?;
		validate_endpoint("redirect", &self.redirect_uri)?;

		if self.client_id.trim().is_empty() {
			return Err(ProviderSettingsError::MissingClientId);
		}
		if self.client_secret.trim().is_empty() {
			return Err(ProviderSettingsError::MissingClientSecret);
		}
		if self.user_info_scheme.is_empty() || self.user_info_scheme.contains(char::is_whitespace) {
			return Err(ProviderSettingsError::InvalidScheme {
				scheme: self.user_info_scheme.clone(),
			});
		}

		Ok(())
	}
}
impl Debug for ProviderSettings {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ProviderSettings")
			.field("id", &self.id)
			.field("auth_url", &self.auth_url.as_str())
			.field("token_url", &self.token_url.as_str())
			.field("user_info_url", &self.user_info_url.as_str())
			.field("client_id", &self.client_id)
			.field("client_secret", &"<redacted>")
			.field("redirect_uri", &self.redirect_uri.as_str())
			.field("user_info_scheme", &self.user_info_scheme)
			.finish()
	}
}

/// Builder for [`ProviderSettings`] values.
#[derive(Debug)]
pub struct ProviderSettingsBuilder {
	id: ProviderId,
	auth_url: Option<Url>,
	token_url: Option<Url>,
	user_info_url: Option<Url>,
	redirect_uri: Option<Url>,
	client_id: String,
	client_secret: String,
	user_info_scheme: String,
}
impl ProviderSettingsBuilder {
	/// Creates a new builder seeded with the provided identifier.
	pub fn new(id: ProviderId) -> Self {
		Self {
			id,
			auth_url: None,
			token_url: None,
			user_info_url: None,
			redirect_uri: None,
			client_id: String::new(),
			client_secret: String::new(),
			user_info_scheme: ProviderSettings::DEFAULT_USER_INFO_SCHEME.into(),
		}
	}

	/// Sets the authorization endpoint.
	pub fn auth_url(mut self, url: Url) -> Self {
		self.auth_url = Some(url);

		self
	}

	/// Sets the token endpoint.
	pub fn token_url(mut self, url: Url) -> Self {
		self.token_url = Some(url);

		self
	}

	/// Sets the user-info endpoint.
	pub fn user_info_url(mut self, url: Url) -> Self {
		self.user_info_url = Some(url);

		self
	}

	/// Sets the registered redirect URI.
	pub fn redirect_uri(mut self, url: Url) -> Self {
		self.redirect_uri = Some(url);

		self
	}

	/// Sets the client credentials.
	pub fn client(mut self, id: impl Into<String>, secret: impl Into<String>) -> Self {
		self.client_id = id.into();
		self.client_secret = secret.into();

		self
	}

	/// Overrides the user-info authorization scheme (`OAuth` for Yandex).
	pub fn user_info_scheme(mut self, scheme: impl Into<String>) -> Self {
		self.user_info_scheme = scheme.into();

		self
	}

	/// Consumes the builder and validates the resulting settings.
	pub fn build(self) -> Result<ProviderSettings, ProviderSettingsError> {
		let settings = ProviderSettings {
			id: self.id,
			auth_url: self
				.auth_url
				.ok_or(ProviderSettingsError::MissingEndpoint { endpoint: "authorization" })?,
			token_url: self
				.token_url
				.ok_or(ProviderSettingsError::MissingEndpoint { endpoint: "token" })?,
			user_info_url: self
				.user_info_url
				.ok_or(ProviderSettingsError::MissingEndpoint { endpoint: "user_info" })?,
			redirect_uri: self
				.redirect_uri
				.ok_or(ProviderSettingsError::MissingEndpoint { endpoint: "redirect" })?,
			client_id: self.client_id,
			client_secret: self.client_secret,
			user_info_scheme: self.user_info_scheme,
		};

		settings.validate()?;

		Ok(settings)
	}
}

fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), ProviderSettingsError> {
	match url.scheme() {
		"https" => Ok(()),
		"http" if is_loopback(url) => Ok(()),
		_ => Err(ProviderSettingsError::InsecureEndpoint { endpoint: name, url: url.to_string() }),
	}
}

fn is_loopback(url: &Url) -> bool {
	match url.host() {
		Some(Host::Domain(domain)) => domain == "localhost",
		Some(Host::Ipv4(ip)) => ip.is_loopback(),
		Some(Host::Ipv6(ip)) => ip.is_loopback(),
		None => false,
	}
}
