//! In-process [`UserDirectory`] with the same uniqueness rules as a relational backend.

// self
use crate::{
	_prelude::*,
	auth::{AccessLevel, ExternalId, ProviderId, RoleName, RoleSet, SubjectId},
	directory::{
		DirectoryError, DirectoryFuture, IdentityLink, LoginRecord, Role, Subject, SubjectProfile,
		UserDirectory,
	},
};

#[derive(Debug, Default)]
struct State {
	subjects: HashMap<SubjectId, Subject>,
	emails: HashMap<String, SubjectId>,
	roles: HashMap<RoleName, Role>,
	links: HashMap<(ProviderId, ExternalId), IdentityLink>,
	logins: Vec<LoginRecord>,
	next_id: u64,
}
impl State {
	fn next_id(&mut self) -> u64 {
		self.next_id += 1;

		self.next_id
	}
}

/// Thread-safe directory keeping users, roles, and links in memory.
///
/// Emails are unique case-insensitively and links are unique per `(provider, external_id)`.
#[derive(Clone, Debug, Default)]
pub struct MemoryDirectory(Arc<Mutex<State>>);
impl MemoryDirectory {
	/// Creates a directory pre-populated with the provided roles.
	pub fn with_roles<I>(roles: I) -> Self
	where
		I: IntoIterator<Item = RoleName>,
	{
		let directory = Self::default();

		{
			let mut state = directory.0.lock();

			for name in roles {
				let id = state.next_id();

				state.roles.insert(name.clone(), Role { id, name });
			}
		}

		directory
	}

	/// Number of stored subjects.
	pub fn subject_count(&self) -> usize {
		self.0.lock().subjects.len()
	}

	/// Number of stored identity links.
	pub fn link_count(&self) -> usize {
		self.0.lock().links.len()
	}

	/// Login history of a subject, oldest first.
	pub fn login_history(&self, id: &SubjectId) -> Vec<LoginRecord> {
		self.0.lock().logins.iter().filter(|r| &r.subject == id).cloned().collect()
	}

	/// Sets a subject's access level.
	pub fn set_access_level(&self, id: &SubjectId, level: AccessLevel) -> Result<(), DirectoryError> {
		let mut state = self.0.lock();
		let subject =
			state.subjects.get_mut(id).ok_or(DirectoryError::NotFound { entity: "subject" })?;

		subject.access_level = level;

		Ok(())
	}

	fn email_key(email: &str) -> String {
		email.trim().to_lowercase()
	}
}
impl UserDirectory for MemoryDirectory {
	fn find_subject_by_email<'a>(&'a self, email: &'a str) -> DirectoryFuture<'a, Option<Subject>> {
		Box::pin(async move {
			let state = self.0.lock();

			Ok(state.emails.get(&Self::email_key(email)).and_then(|id| state.subjects.get(id)).cloned())
		})
	}

	fn find_subject_by_id<'a>(&'a self, id: &'a SubjectId) -> DirectoryFuture<'a, Option<Subject>> {
		Box::pin(async move { Ok(self.0.lock().subjects.get(id).cloned()) })
	}

	fn create_subject(&self, profile: SubjectProfile) -> DirectoryFuture<'_, Subject> {
		Box::pin(async move {
			let email = Self::email_key(&profile.email);

			if email.is_empty() {
				return Err(DirectoryError::Conflict { message: "email cannot be empty".into() });
			}

			let mut state = self.0.lock();

			if state.emails.contains_key(&email) {
				return Err(DirectoryError::Conflict { message: format!("email {email} is taken") });
			}

			let id = SubjectId::new(format!("user-{}", state.next_id()))
				.map_err(|e| DirectoryError::Backend { message: e.to_string() })?;
			let subject = Subject {
				id: id.clone(),
				email: profile.email,
				first_name: profile.first_name,
				last_name: profile.last_name,
				roles: RoleSet::default(),
				access_level: AccessLevel::default(),
			};

			state.emails.insert(email, id.clone());
			state.subjects.insert(id, subject.clone());

			Ok(subject)
		})
	}

	fn delete_subject<'a>(&'a self, id: &'a SubjectId) -> DirectoryFuture<'a, bool> {
		Box::pin(async move {
			let mut state = self.0.lock();
			let Some(subject) = state.subjects.remove(id) else {
				return Ok(false);
			};

			state.emails.remove(&Self::email_key(&subject.email));
			state.links.retain(|_, link| &link.subject != id);
			state.logins.retain(|record| &record.subject != id);

			Ok(true)
		})
	}

	fn find_role_by_name<'a>(&'a self, name: &'a RoleName) -> DirectoryFuture<'a, Option<Role>> {
		Box::pin(async move { Ok(self.0.lock().roles.get(name).cloned()) })
	}

	fn attach_role<'a>(&'a self, subject: &'a SubjectId, role: &'a Role) -> DirectoryFuture<'a, ()> {
		Box::pin(async move {
			let mut state = self.0.lock();

			if !state.roles.contains_key(&role.name) {
				return Err(DirectoryError::NotFound { entity: "role" });
			}

			let subject =
				state.subjects.get_mut(subject).ok_or(DirectoryError::NotFound { entity: "subject" })?;

			subject.roles.insert(role.name.clone());

			Ok(())
		})
	}

	fn find_link<'a>(
		&'a self,
		provider: &'a ProviderId,
		external_id: &'a ExternalId,
	) -> DirectoryFuture<'a, Option<IdentityLink>> {
		Box::pin(async move {
			Ok(self.0.lock().links.get(&(provider.clone(), external_id.clone())).cloned())
		})
	}

	fn create_link(&self, link: IdentityLink) -> DirectoryFuture<'_, ()> {
		Box::pin(async move {
			let mut state = self.0.lock();

			if !state.subjects.contains_key(&link.subject) {
				return Err(DirectoryError::NotFound { entity: "subject" });
			}

			let key = (link.provider.clone(), link.external_id.clone());

			if state.links.contains_key(&key) {
				return Err(DirectoryError::DuplicateLink);
			}

			state.links.insert(key, link);

			Ok(())
		})
	}

	fn record_login(&self, record: LoginRecord) -> DirectoryFuture<'_, ()> {
		Box::pin(async move {
			let mut state = self.0.lock();

			if !state.subjects.contains_key(&record.subject) {
				return Err(DirectoryError::NotFound { entity: "subject" });
			}

			state.logins.push(record);

			Ok(())
		})
	}
}
