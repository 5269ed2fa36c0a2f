//! Session, rate-limit, and linker settings with validation and environment loading.

// std
use std::env;
// self
use crate::{_prelude::*, auth::RoleName, error::ConfigError};

/// Per-subject request budget.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitConfig {
	/// Requests allowed per window.
	pub limit: u32,
	/// Window length.
	pub window: Duration,
}
impl RateLimitConfig {
	/// Validates the budget.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.limit == 0 {
			return Err(ConfigError::ZeroRateLimit);
		}
		if self.window < Duration::SECOND {
			return Err(ConfigError::WindowTooShort);
		}

		Ok(())
	}
}
impl Default for RateLimitConfig {
	fn default() -> Self {
		Self { limit: 10, window: Duration::MINUTE }
	}
}

/// Token lifetimes and store bounds used by [`crate::flows::SessionBroker`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionConfig {
	/// Access token lifetime.
	pub access_ttl: Duration,
	/// Refresh token lifetime; also the refresh marker TTL.
	pub refresh_ttl: Duration,
	/// Upper bound for each store round-trip.
	pub store_timeout: Duration,
	/// Per-subject request budget.
	pub rate_limit: RateLimitConfig,
}
impl SessionConfig {
	/// Access TTL in seconds.
	pub const ACCESS_TTL_ENV: &'static str = "AUTHJWT_ACCESS_EXPIRES_TIME";
	/// Refresh TTL in seconds.
	pub const REFRESH_TTL_ENV: &'static str = "AUTHJWT_REFRESH_EXPIRES_TIME";
	/// Store timeout in milliseconds.
	pub const STORE_TIMEOUT_ENV: &'static str = "AUTHJWT_STORE_TIMEOUT_MS";
	/// Requests allowed per one-minute window.
	pub const RATE_LIMIT_ENV: &'static str = "RATE_LIMIT_PER_MINUTE";

	/// Starts a builder seeded with the defaults.
	pub fn builder() -> SessionConfigBuilder {
		SessionConfigBuilder(Self::default())
	}

	/// Loads overrides from the environment on top of the defaults.
	///
	/// Unset variables keep their defaults; malformed values fail.
	pub fn from_env() -> Result<Self, ConfigError> {
		let mut builder = Self::builder();

		if let Some(secs) = env_var::<i64>(Self::ACCESS_TTL_ENV)? {
			builder = builder.access_ttl(Duration::seconds(secs));
		}
		if let Some(secs) = env_var::<i64>(Self::REFRESH_TTL_ENV)? {
			builder = builder.refresh_ttl(Duration::seconds(secs));
		}
		if let Some(ms) = env_var::<i64>(Self::STORE_TIMEOUT_ENV)? {
			builder = builder.store_timeout(Duration::milliseconds(ms));
		}
		if let Some(limit) = env_var::<u32>(Self::RATE_LIMIT_ENV)? {
			builder = builder.rate_limit(RateLimitConfig { limit, window: Duration::MINUTE });
		}

		builder.build()
	}

	/// Validates every setting.
	pub fn validate(&self) -> Result<(), ConfigError> {
		for (setting, value) in [
			("access_ttl", self.access_ttl),
			("refresh_ttl", self.refresh_ttl),
			("store_timeout", self.store_timeout),
		] {
			if !value.is_positive() {
				return Err(ConfigError::NonPositiveDuration { setting });
			}
		}

		if self.refresh_ttl <= self.access_ttl {
			return Err(ConfigError::RefreshNotLongerThanAccess);
		}

		self.rate_limit.validate()
	}
}
impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			access_ttl: Duration::minutes(15),
			refresh_ttl: Duration::days(30),
			store_timeout: Duration::seconds(2),
			rate_limit: RateLimitConfig::default(),
		}
	}
}

/// Builder for [`SessionConfig`].
#[derive(Clone, Debug)]
pub struct SessionConfigBuilder(SessionConfig);
impl SessionConfigBuilder {
	/// Sets the access token lifetime.
	pub fn access_ttl(mut self, ttl: Duration) -> Self {
		self.0.access_ttl = ttl;

		self
	}

	/// Sets the refresh token lifetime.
	pub fn refresh_ttl(mut self, ttl: Duration) -> Self {
		self.0.refresh_ttl = ttl;

		self
	}

	/// Sets the per-call store bound.
	pub fn store_timeout(mut self, timeout: Duration) -> Self {
		self.0.store_timeout = timeout;

		self
	}

	/// Sets the request budget.
	pub fn rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
		self.0.rate_limit = rate_limit;

		self
	}

	/// Validates and returns the config.
	pub fn build(self) -> Result<SessionConfig, ConfigError> {
		self.0.validate()?;

		Ok(self.0)
	}
}

/// Settings for federated account resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkerConfig {
	/// Role attached to subjects created on first federated login.
	pub default_role: RoleName,
	/// Lifetime of `oauth_link:*` cache entries.
	pub link_cache_ttl: Duration,
	/// Lifetime of pending login states.
	pub state_ttl: Duration,
}
impl LinkerConfig {
	/// Overrides the default role.
	pub fn with_default_role(mut self, role: RoleName) -> Self {
		self.default_role = role;

		self
	}

	/// Overrides the link cache lifetime.
	pub fn with_link_cache_ttl(mut self, ttl: Duration) -> Self {
		self.link_cache_ttl = ttl;

		self
	}

	/// Overrides the login state lifetime.
	pub fn with_state_ttl(mut self, ttl: Duration) -> Self {
		self.state_ttl = ttl;

		self
	}

	/// Validates the durations.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if !self.link_cache_ttl.is_positive() {
			return Err(ConfigError::NonPositiveDuration { setting: "link_cache_ttl" });
		}
		if !self.state_ttl.is_positive() {
			return Err(ConfigError::NonPositiveDuration { setting: "state_ttl" });
		}

		Ok(())
	}
}
impl Default for LinkerConfig {
	fn default() -> Self {
		Self {
			default_role: RoleName::default_member(),
			link_cache_ttl: Duration::HOUR,
			state_ttl: Duration::minutes(10),
		}
	}
}

fn env_var<T>(name: &str) -> Result<Option<T>, ConfigError>
where
	T: FromStr,
	T::Err: Display,
{
	match env::var(name) {
		Ok(raw) => raw.trim().parse().map(Some).map_err(|e| ConfigError::invalid_env(name, e)),
		Err(env::VarError::NotPresent) => Ok(None),
		Err(e) => Err(ConfigError::invalid_env(name, e)),
	}
}
