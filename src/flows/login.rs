//! Pair issuance for an authenticated subject.

// self
use crate::{
	_prelude::*,
	auth::{SubjectClaims, SubjectId, TokenPair},
	directory::{LoginContext, LoginRecord, Subject, UserDirectory},
	flows::SessionBroker,
	obs::{self, OpKind},
};

impl SessionBroker {
	/// Issues an access/refresh pair and makes the new refresh token the subject's only
	/// recognized one.
	///
	/// The previous marker is cleared and replaced in one batch, so any earlier refresh token
	/// for `subject` turns stale even though it still decodes.
	pub async fn login(&self, subject: &SubjectId, claims: &SubjectClaims) -> Result<TokenPair> {
		obs::observe(OpKind::Login, "login", async move {
			let pair = self.issue_pair(subject, claims)?;

			self.revocations
				.replace_refresh_marker(subject, &pair.refresh.id, self.config.refresh_ttl)
				.await?;

			Ok(pair)
		})
		.await
	}

	/// Logs in a directory subject, typically one returned by [`crate::flows::OAuthLinker`].
	pub async fn login_subject(&self, subject: &Subject) -> Result<TokenPair> {
		self.login(&subject.id, &subject.claims()).await
	}

	/// Logs in a directory subject and appends the sign-in to its login history.
	///
	/// History is written after the pair is issued; a directory failure fails the login.
	pub async fn login_recorded(
		&self,
		directory: &dyn UserDirectory,
		subject: &Subject,
		context: LoginContext,
	) -> Result<TokenPair> {
		let pair = self.login_subject(subject).await?;

		directory
			.record_login(LoginRecord {
				subject: subject.id.clone(),
				context,
				logged_in_at: pair.access.issued_at,
			})
			.await?;

		Ok(pair)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		_preludet::*,
		auth::{AccessLevel, RoleName, RoleSet, TokenKind},
		directory::{DirectoryError, MemoryDirectory, SubjectProfile},
	};

	#[tokio::test]
	async fn login_sets_the_marker_and_embeds_claims() {
		let (broker, store, _) = build_test_broker();
		let alice = SubjectId::new("alice").expect("Subject fixture should be valid.");
		let claims = SubjectClaims::new(
			RoleSet::new([RoleName::new("admin").expect("Role fixture should be valid.")]),
			AccessLevel::new(3).expect("Level fixture should be in range."),
		);
		let pair = broker.login(&alice, &claims).await.expect("Login should succeed.");

		assert_eq!(pair.access.kind, TokenKind::Access);
		assert_eq!(pair.refresh.kind, TokenKind::Refresh);
		assert_ne!(pair.access.id, pair.refresh.id);
		assert_eq!(pair.access.expires_at, test_epoch() + broker.config.access_ttl);
		assert_eq!(pair.refresh.expires_at, test_epoch() + broker.config.refresh_ttl);
		assert_eq!(
			broker.revocations.active_refresh(&alice).await.expect("Marker read should succeed."),
			Some(pair.refresh.id.clone())
		);
		assert_eq!(store.len(), 1);

		let decoded = broker
			.codec
			.decode(pair.access.secret.expose(), TokenKind::Access)
			.expect("Access token should decode.");

		assert_eq!(decoded.claims, claims);
	}

	#[tokio::test]
	async fn recorded_logins_append_history_with_the_client_context() {
		let (broker, _, clock) = build_test_broker();
		let directory = MemoryDirectory::with_roles([RoleName::default_member()]);
		let subject = directory
			.create_subject(SubjectProfile { email: "alice@example.com".into(), ..Default::default() })
			.await
			.expect("Subject should be created.");
		let context =
			LoginContext { ip: Some("192.0.2.10".into()), user_agent: Some("curl/8.0".into()) };

		broker
			.login_recorded(&directory, &subject, context.clone())
			.await
			.expect("First login should succeed.");
		clock.advance(Duration::minutes(5));
		broker
			.login_recorded(&directory, &subject, LoginContext::default())
			.await
			.expect("Second login should succeed.");

		let history = directory.login_history(&subject.id);

		assert_eq!(history.len(), 2);
		assert_eq!(history[0].context, context);
		assert_eq!(history[0].logged_in_at, test_epoch());
		assert_eq!(history[1].context, LoginContext::default());
		assert_eq!(history[1].logged_in_at, test_epoch() + Duration::minutes(5));

		let ghost =
			Subject { id: SubjectId::new("ghost").expect("Subject fixture should be valid."), ..subject };

		assert!(matches!(
			broker.login_recorded(&directory, &ghost, LoginContext::default()).await,
			Err(Error::Directory(DirectoryError::NotFound { entity: "subject" }))
		));
	}
}
