//! Federated login: provider redirects, code exchange, and idempotent subject resolution.
//!
//! [`OAuthLinker::resolve`] maps `(provider, external_id)` to exactly one local subject even when
//! several first-time callbacks race. The directory's uniqueness constraint on identity links is
//! the only coordination point. A caller that loses the link race re-reads the winning link,
//! deletes the subject it created itself (if any, and only if it differs from the winner's), and
//! returns the winner's subject. A subject reused from a concurrent creator gets the default role
//! attached idempotently so no caller returns a role-less subject.

// self
use crate::{
	_prelude::*,
	auth::{ExternalId, ProviderId, SubjectId, id},
	clock::{self, Clock},
	config::LinkerConfig,
	directory::{
		DirectoryError, IdentityLink, LoginContext, LoginRecord, Subject, SubjectProfile,
		UserDirectory,
	},
	error::ConfigError,
	obs::{self, OpKind},
	provider::{ProfileClient, ProviderRegistry},
	store::{self, BatchReply, SessionStore, StoreBatch, StoreKey},
};

const STATE_LEN: usize = 32;
const STATE_MARK: &str = "1";

/// Authorization redirect returned by [`OAuthLinker::start_login`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoginRedirect {
	/// Provider authorization URL the user agent should visit.
	pub url: Url,
	/// Single-use state echoed back on the callback.
	pub state: String,
}

/// Resolves provider identities to local subjects.
#[derive(Clone)]
pub struct OAuthLinker {
	directory: Arc<dyn UserDirectory>,
	store: Arc<dyn SessionStore>,
	providers: ProviderRegistry,
	config: LinkerConfig,
	store_timeout: Duration,
	clock: Arc<dyn Clock>,
}
impl OAuthLinker {
	/// Default bound for link-cache and state store calls.
	pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::seconds(2);

	/// Creates a linker after validating `config`.
	pub fn new(
		directory: Arc<dyn UserDirectory>,
		store: Arc<dyn SessionStore>,
		providers: ProviderRegistry,
		config: LinkerConfig,
	) -> Result<Self, ConfigError> {
		config.validate()?;

		Ok(Self {
			directory,
			store,
			providers,
			config,
			store_timeout: Self::DEFAULT_STORE_TIMEOUT,
			clock: clock::system(),
		})
	}

	/// Replaces the time source used for login-history timestamps.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self
	}

	/// Overrides the store call bound.
	pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
		self.store_timeout = timeout;

		self
	}

	/// Registered providers.
	pub fn providers(&self) -> &ProviderRegistry {
		&self.providers
	}

	/// Confirms the configured default role exists; intended for startup checks.
	pub async fn ensure_default_role(&self) -> Result<()> {
		match self.directory.find_role_by_name(&self.config.default_role).await? {
			Some(_) => Ok(()),
			None => Err(self.missing_default_role()),
		}
	}

	/// Builds the provider authorization URL and records a single-use state.
	pub async fn start_login(&self, provider: &ProviderId) -> Result<LoginRedirect> {
		obs::observe(OpKind::OAuthLogin, "start_login", async move {
			let settings = self.providers.get(provider)?;
			let state = id::random_alphanumeric(STATE_LEN);
			let key = StoreKey::OAuthState { provider: provider.clone(), state: state.clone() };
			let stored = store::bounded(
				self.store_timeout,
				self.store.set_if_absent(&key, STATE_MARK.into(), self.config.state_ttl),
			)
			.await?;

			if !stored {
				return Err(Error::InvalidState);
			}

			Ok(LoginRedirect { url: settings.authorize_url(&state), state })
		})
		.await
	}

	/// Consumes `state`, exchanges `code` for a provider profile, resolves the subject, and
	/// records the login in the directory's history.
	pub async fn complete_login(
		&self,
		provider: &ProviderId,
		state: &str,
		code: &str,
		client: &dyn ProfileClient,
		context: LoginContext,
	) -> Result<Subject> {
		obs::observe(OpKind::OAuthLogin, "complete_login", async move {
			let settings = self.providers.get(provider)?;

			self.consume_state(provider, state).await?;

			let profile = client.fetch_profile(settings, code).await?;
			let subject = self
				.resolve_inner(provider, &profile.external_id, &profile.subject_profile())
				.await?;

			self.directory
				.record_login(LoginRecord {
					subject: subject.id.clone(),
					context,
					logged_in_at: self.clock.now(),
				})
				.await?;

			Ok(subject)
		})
		.await
	}

	/// Returns the subject linked to `(provider, external_id)`, creating and linking one on first
	/// sight.
	pub async fn resolve(
		&self,
		provider: &ProviderId,
		external_id: &ExternalId,
		profile: &SubjectProfile,
	) -> Result<Subject> {
		obs::observe(
			OpKind::OAuthResolve,
			"resolve",
			self.resolve_inner(provider, external_id, profile),
		)
		.await
	}

	async fn resolve_inner(
		&self,
		provider: &ProviderId,
		external_id: &ExternalId,
		profile: &SubjectProfile,
	) -> Result<Subject> {
		if let Some(subject) = self.find_linked(provider, external_id).await? {
			return Ok(subject);
		}

		let (subject, created) = self.find_or_create_subject(profile).await?;
		let link = IdentityLink {
			provider: provider.clone(),
			external_id: external_id.clone(),
			subject: subject.id.clone(),
		};

		match self.directory.create_link(link).await {
			Ok(()) => {
				self.cache_link(provider, external_id, &subject).await;

				self.current(subject).await
			},
			Err(DirectoryError::DuplicateLink) =>
				self.reconcile(provider, external_id, subject, created).await,
			Err(e) => {
				if created {
					self.discard(&subject).await;
				}

				Err(e.into())
			},
		}
	}

	async fn find_linked(
		&self,
		provider: &ProviderId,
		external_id: &ExternalId,
	) -> Result<Option<Subject>> {
		let key = StoreKey::OAuthLink { provider: provider.clone(), external: external_id.clone() };

		match store::bounded(self.store_timeout, self.store.get(&key)).await {
			Ok(Some(raw)) => match SubjectId::new(&raw) {
				Ok(id) =>
					if let Some(subject) = self.directory.find_subject_by_id(&id).await? {
						return Ok(Some(subject));
					},
				Err(e) => obs::debug_event(OpKind::OAuthResolve, "link_cache", &e),
			},
			Ok(None) => {},
			Err(e) => obs::debug_event(OpKind::OAuthResolve, "link_cache", &e),
		}

		let Some(link) = self.directory.find_link(provider, external_id).await? else {
			return Ok(None);
		};
		let subject = self
			.directory
			.find_subject_by_id(&link.subject)
			.await?
			.ok_or(DirectoryError::NotFound { entity: "subject" })?;

		self.cache_link(provider, external_id, &subject).await;

		Ok(Some(subject))
	}

	async fn find_or_create_subject(&self, profile: &SubjectProfile) -> Result<(Subject, bool)> {
		if let Some(existing) = self.directory.find_subject_by_email(&profile.email).await? {
			return self.adopt(existing).await;
		}

		let mut subject = match self.directory.create_subject(profile.clone()).await {
			Ok(subject) => subject,
			Err(DirectoryError::Conflict { message }) => {
				obs::debug_event(OpKind::OAuthResolve, "create_subject", &message);

				let existing = self
					.directory
					.find_subject_by_email(&profile.email)
					.await?
					.ok_or(DirectoryError::Conflict { message })?;

				return self.adopt(existing).await;
			},
			Err(e) => return Err(e.into()),
		};

		if let Err(e) = self.attach_default_role(&mut subject).await {
			self.discard(&subject).await;

			return Err(e);
		}

		Ok((subject, true))
	}

	/// Reuses a subject this caller did not create. Its creator may not have attached the default
	/// role yet, so a role-less subject gets it here; attaching is idempotent.
	async fn adopt(&self, mut existing: Subject) -> Result<(Subject, bool)> {
		if existing.roles.is_empty() {
			self.attach_default_role(&mut existing).await?;
		}

		Ok((existing, false))
	}

	/// Re-reads `subject` so concurrent role attachments are visible.
	async fn current(&self, subject: Subject) -> Result<Subject> {
		Ok(self.directory.find_subject_by_id(&subject.id).await?.unwrap_or(subject))
	}

	async fn attach_default_role(&self, subject: &mut Subject) -> Result<()> {
		let role = self
			.directory
			.find_role_by_name(&self.config.default_role)
			.await?
			.ok_or_else(|| self.missing_default_role())?;

		self.directory.attach_role(&subject.id, &role).await?;
		subject.roles.insert(role.name);

		Ok(())
	}

	async fn reconcile(
		&self,
		provider: &ProviderId,
		external_id: &ExternalId,
		ours: Subject,
		created: bool,
	) -> Result<Subject> {
		obs::debug_event(OpKind::OAuthResolve, "reconcile", &"identity link created concurrently");

		let Some(winner) = self.directory.find_link(provider, external_id).await? else {
			if created {
				self.discard(&ours).await;
			}

			return Err(Error::DuplicateLink);
		};

		if winner.subject == ours.id {
			return self.current(ours).await;
		}
		if created {
			self.discard(&ours).await;
		}

		let subject = self
			.directory
			.find_subject_by_id(&winner.subject)
			.await?
			.ok_or(DirectoryError::NotFound { entity: "subject" })?;

		self.cache_link(provider, external_id, &subject).await;

		Ok(subject)
	}

	async fn consume_state(&self, provider: &ProviderId, state: &str) -> Result<()> {
		let key = StoreKey::OAuthState { provider: provider.clone(), state: state.to_owned() };
		let replies =
			store::bounded(self.store_timeout, self.store.execute(StoreBatch::new().delete(key)))
				.await?;

		match replies.first() {
			Some(BatchReply::Bool(true)) => Ok(()),
			_ => Err(Error::InvalidState),
		}
	}

	async fn cache_link(&self, provider: &ProviderId, external_id: &ExternalId, subject: &Subject) {
		let key = StoreKey::OAuthLink { provider: provider.clone(), external: external_id.clone() };
		let write = self.store.set_if_absent(&key, subject.id.to_string(), self.config.link_cache_ttl);

		if let Err(e) = store::bounded(self.store_timeout, write).await {
			obs::debug_event(OpKind::OAuthResolve, "link_cache", &e);
		}
	}

	async fn discard(&self, subject: &Subject) {
		if let Err(e) = self.directory.delete_subject(&subject.id).await {
			obs::warn_event(OpKind::OAuthResolve, "discard_subject", &e);
		}
	}

	fn missing_default_role(&self) -> Error {
		ConfigError::MissingDefaultRole { role: self.config.default_role.to_string() }.into()
	}
}
impl Debug for OAuthLinker {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("OAuthLinker")
			.field("providers", &self.providers)
			.field("config", &self.config)
			.field("store_timeout", &self.store_timeout)
			.finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::collections::BTreeMap;
	// self
	use super::*;
	use crate::{
		_preludet::*,
		auth::RoleName,
		directory::MemoryDirectory,
		error::ProviderError,
		provider::{ProfileFuture, ProviderProfile, ProviderSettings},
		store::MemoryStore,
	};

	struct StaticProfile(ProviderProfile);
	impl ProfileClient for StaticProfile {
		fn fetch_profile<'a>(
			&'a self,
			_: &'a ProviderSettings,
			code: &'a str,
		) -> ProfileFuture<'a> {
			Box::pin(async move {
				if code == "good-code" {
					Ok(self.0.clone())
				} else {
					Err(ProviderError::Status { endpoint: "token", status: 400 })
				}
			})
		}
	}

	fn yandex() -> ProviderId {
		ProviderId::new("yandex").expect("Provider fixture should be valid.")
	}

	fn external(id: &str) -> ExternalId {
		ExternalId::new(id).expect("External id fixture should be valid.")
	}

	fn profile(email: &str) -> SubjectProfile {
		SubjectProfile { email: email.into(), ..Default::default() }
	}

	fn registry() -> ProviderRegistry {
		let url = |raw: &str| Url::parse(raw).expect("URL fixture should parse.");

		ProviderRegistry::new().with(
			ProviderSettings::builder(yandex())
				.auth_url(url("https://oauth.yandex.ru/authorize"))
				.token_url(url("https://oauth.yandex.ru/token"))
				.user_info_url(url("https://login.yandex.ru/info"))
				.redirect_uri(url("https://app.example.com/oauth/callback/yandex"))
				.client("client-1", "secret-1")
				.build()
				.expect("Provider settings fixture should validate."),
		)
	}

	fn linker(directory: &MemoryDirectory) -> (OAuthLinker, Arc<MemoryStore>) {
		let store = Arc::new(MemoryStore::with_clock(test_clock()));
		let linker = OAuthLinker::new(
			Arc::new(directory.clone()),
			store.clone(),
			registry(),
			LinkerConfig::default(),
		)
		.expect("Linker config should validate.")
		.with_clock(test_clock());

		(linker, store)
	}

	#[tokio::test]
	async fn first_login_creates_links_and_caches_once() {
		let directory = MemoryDirectory::with_roles([RoleName::default_member()]);
		let (linker, store) = linker(&directory);
		let created = linker
			.resolve(&yandex(), &external("42"), &profile("alice@example.com"))
			.await
			.expect("First resolve should create a subject.");

		assert!(created.roles.contains("user"));
		assert_eq!(directory.subject_count(), 1);
		assert_eq!(directory.link_count(), 1);

		let key = StoreKey::OAuthLink { provider: yandex(), external: external("42") };

		assert_eq!(
			store.get(&key).await.expect("Cache read should succeed."),
			Some(created.id.to_string())
		);

		let again = linker
			.resolve(&yandex(), &external("42"), &profile("ignored@example.com"))
			.await
			.expect("Second resolve should hit the link.");

		assert_eq!(again.id, created.id);
		assert_eq!(directory.subject_count(), 1);
	}

	#[tokio::test]
	async fn existing_email_is_linked_instead_of_duplicated() {
		let directory = MemoryDirectory::with_roles([RoleName::default_member()]);
		let (linker, _) = linker(&directory);
		let existing = directory
			.create_subject(profile("Bob@Example.com"))
			.await
			.expect("Seed subject should be created.");
		let resolved = linker
			.resolve(&yandex(), &external("7"), &profile("bob@example.com"))
			.await
			.expect("Resolve should link the existing subject.");

		assert_eq!(resolved.id, existing.id);
		assert!(resolved.roles.contains("user"));
		assert_eq!(directory.subject_count(), 1);
		assert_eq!(directory.link_count(), 1);

		let stored = directory
			.find_subject_by_id(&existing.id)
			.await
			.expect("Lookup should succeed.")
			.expect("Subject should still exist.");

		assert!(stored.roles.contains("user"));
	}

	#[tokio::test]
	async fn missing_default_role_rolls_back_the_new_subject() {
		let directory = MemoryDirectory::default();
		let (linker, _) = linker(&directory);

		assert!(matches!(
			linker.ensure_default_role().await,
			Err(Error::Config(ConfigError::MissingDefaultRole { .. }))
		));

		let err = linker
			.resolve(&yandex(), &external("42"), &profile("alice@example.com"))
			.await
			.expect_err("Resolve should fail without the default role.");

		assert!(matches!(err, Error::Config(ConfigError::MissingDefaultRole { ref role }) if role == "user"));
		assert_eq!(directory.subject_count(), 0);
		assert_eq!(directory.link_count(), 0);
	}

	#[tokio::test]
	async fn login_state_is_single_use() {
		let directory = MemoryDirectory::with_roles([RoleName::default_member()]);
		let (linker, _) = linker(&directory);
		let client = StaticProfile(ProviderProfile {
			external_id: external("99"),
			email: "carol@example.com".into(),
			first_name: Some("Carol".into()),
			last_name: None,
		});
		let redirect = linker.start_login(&yandex()).await.expect("Login should start.");
		let pairs = redirect.url.query_pairs().into_owned().collect::<BTreeMap<_, _>>();

		assert_eq!(pairs.get("state"), Some(&redirect.state));
		assert_eq!(pairs.get("client_id").map(String::as_str), Some("client-1"));

		let context = LoginContext {
			ip: Some("203.0.113.7".into()),
			user_agent: Some("Mozilla/5.0".into()),
		};
		let subject = linker
			.complete_login(&yandex(), &redirect.state, "good-code", &client, context.clone())
			.await
			.expect("Callback should resolve a subject.");

		assert_eq!(subject.first_name.as_deref(), Some("Carol"));
		assert_eq!(directory.login_history(&subject.id), vec![LoginRecord {
			subject: subject.id.clone(),
			context: context.clone(),
			logged_in_at: test_epoch(),
		}]);
		assert!(matches!(
			linker
				.complete_login(&yandex(), &redirect.state, "good-code", &client, context.clone())
				.await,
			Err(Error::InvalidState)
		));
		assert!(matches!(
			linker.complete_login(&yandex(), "forged", "good-code", &client, context).await,
			Err(Error::InvalidState)
		));
		assert_eq!(directory.login_history(&subject.id).len(), 1);
	}

	#[tokio::test]
	async fn unknown_providers_and_failed_exchanges_surface() {
		let directory = MemoryDirectory::with_roles([RoleName::default_member()]);
		let (linker, _) = linker(&directory);
		let google = ProviderId::new("google").expect("Provider fixture should be valid.");

		assert!(matches!(
			linker.start_login(&google).await,
			Err(Error::UnknownProvider { ref provider }) if provider == "google"
		));

		let client = StaticProfile(ProviderProfile {
			external_id: external("1"),
			email: "dave@example.com".into(),
			first_name: None,
			last_name: None,
		});
		let redirect = linker.start_login(&yandex()).await.expect("Login should start.");

		assert!(matches!(
			linker
				.complete_login(&yandex(), &redirect.state, "bad-code", &client, LoginContext::default())
				.await,
			Err(Error::Provider(ProviderError::Status { endpoint: "token", status: 400 }))
		));
		assert_eq!(directory.subject_count(), 0);
	}
}
