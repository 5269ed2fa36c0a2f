//! Explicit provider-name to settings mapping, validated at startup.

// std
use std::env;
// self
use crate::{_prelude::*, auth::ProviderId, error::ConfigError, provider::ProviderSettings};

/// Registered identity providers keyed by name.
#[derive(Clone, Debug, Default)]
pub struct ProviderRegistry(HashMap<ProviderId, ProviderSettings>);
impl ProviderRegistry {
	/// Creates an empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers (or replaces) the settings for `settings.id`.
	pub fn with(mut self, settings: ProviderSettings) -> Self {
		self.insert(settings);

		self
	}

	/// Registers (or replaces) the settings for `settings.id`.
	pub fn insert(&mut self, settings: ProviderSettings) {
		self.0.insert(settings.id.clone(), settings);
	}

	/// Looks up a provider, failing with [`Error::UnknownProvider`].
	pub fn get(&self, provider: &ProviderId) -> Result<&ProviderSettings> {
		self.0
			.get(provider)
			.ok_or_else(|| Error::UnknownProvider { provider: provider.to_string() })
	}

	/// Registered provider names.
	pub fn ids(&self) -> impl Iterator<Item = &ProviderId> {
		self.0.keys()
	}

	/// Loads each named provider from `OAUTH_{NAME}_*` variables.
	///
	/// Required: `AUTH_URL`, `TOKEN_URL`, `USER_INFO_URL`, `CLIENT_ID`, `CLIENT_SECRET`,
	/// `CLIENT_REDIRECT_URI`. Optional: `USER_INFO_SCHEME`.
	pub fn from_env<I, S>(names: I) -> Result<Self, ConfigError>
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		let mut registry = Self::new();

		for name in names {
			let id = ProviderId::new(name.as_ref().to_lowercase())?;
			let prefix = format!("OAUTH_{}_", name.as_ref().to_uppercase());
			let mut builder = ProviderSettings::builder(id)
				.auth_url(env_url(&prefix, "AUTH_URL")?)
				.token_url(env_url(&prefix, "TOKEN_URL")?)
				.user_info_url(env_url(&prefix, "USER_INFO_URL")?)
				.redirect_uri(env_url(&prefix, "CLIENT_REDIRECT_URI")?)
				.client(env_required(&prefix, "CLIENT_ID")?, env_required(&prefix, "CLIENT_SECRET")?);

			if let Ok(scheme) = env::var(format!("{prefix}USER_INFO_SCHEME")) {
				builder = builder.user_info_scheme(scheme);
			}

			registry.insert(builder.build()?);
		}

		Ok(registry)
	}
}

fn env_required(prefix: &str, suffix: &str) -> Result<String, ConfigError> {
	let name = format!("{prefix}{suffix}");

	env::var(&name).map_err(|_| ConfigError::MissingEnv { name })
}

fn env_url(prefix: &str, suffix: &str) -> Result<Url, ConfigError> {
	let raw = env_required(prefix, suffix)?;

	Url::parse(&raw).map_err(|e| ConfigError::invalid_env(&format!("{prefix}{suffix}"), e))
}
