//! User, role, and identity-link collaborator consumed by the OAuth linker.
//!
//! Persistent user storage lives outside this crate. [`UserDirectory`] is the narrow seam the
//! linker talks to; [`MemoryDirectory`] is a process-local implementation for tests and demos.

pub mod memory;

pub use memory::MemoryDirectory;

// self
use crate::{
	_prelude::*,
	auth::{AccessLevel, ExternalId, ProviderId, RoleName, RoleSet, SubjectClaims, SubjectId},
};

/// Boxed future returned by [`UserDirectory`] operations.
pub type DirectoryFuture<'a, T> =
	Pin<Box<dyn Future<Output = Result<T, DirectoryError>> + 'a + Send>>;

/// Lookup and creation hooks over the external user/role store.
///
/// Lookups return `None` rather than failing when nothing matches.
pub trait UserDirectory
where
	Self: Send + Sync,
{
	/// Finds a subject by email.
	fn find_subject_by_email<'a>(&'a self, email: &'a str) -> DirectoryFuture<'a, Option<Subject>>;

	/// Finds a subject by identifier.
	fn find_subject_by_id<'a>(&'a self, id: &'a SubjectId) -> DirectoryFuture<'a, Option<Subject>>;

	/// Creates a subject; fails with [`DirectoryError::Conflict`] if the email is taken.
	fn create_subject(&self, profile: SubjectProfile) -> DirectoryFuture<'_, Subject>;

	/// Deletes a subject together with its role attachments; returns `true` if it existed.
	fn delete_subject<'a>(&'a self, id: &'a SubjectId) -> DirectoryFuture<'a, bool>;

	/// Finds a role by name.
	fn find_role_by_name<'a>(&'a self, name: &'a RoleName) -> DirectoryFuture<'a, Option<Role>>;

	/// Attaches a role to a subject; attaching twice is a no-op.
	fn attach_role<'a>(&'a self, subject: &'a SubjectId, role: &'a Role) -> DirectoryFuture<'a, ()>;

	/// Finds the link for a provider identity.
	fn find_link<'a>(
		&'a self,
		provider: &'a ProviderId,
		external_id: &'a ExternalId,
	) -> DirectoryFuture<'a, Option<IdentityLink>>;

	/// Creates a link; fails with [`DirectoryError::DuplicateLink`] if `(provider, external_id)`
	/// is already linked.
	fn create_link(&self, link: IdentityLink) -> DirectoryFuture<'_, ()>;

	/// Appends a login-history entry for a subject that just signed in.
	fn record_login(&self, record: LoginRecord) -> DirectoryFuture<'_, ()>;
}

/// Errors raised by [`UserDirectory`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum DirectoryError {
	/// `(provider, external_id)` uniqueness violated.
	#[error("Identity link already exists.")]
	DuplicateLink,
	/// Another uniqueness constraint (e.g., email) was violated.
	#[error("Directory conflict: {message}.")]
	Conflict {
		/// Backend-supplied detail.
		message: String,
	},
	/// Referenced record does not exist.
	#[error("Directory record not found: {entity}.")]
	NotFound {
		/// Kind of the missing record.
		entity: &'static str,
	},
	/// Backend failure.
	#[error("Directory backend failure: {message}.")]
	Backend {
		/// Backend-supplied detail.
		message: String,
	},
	/// Backend did not answer in time.
	#[error("Directory operation timed out.")]
	Timeout,
}

/// Local user record as seen by the session core.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
	/// Stable identifier embedded in tokens.
	pub id: SubjectId,
	/// Unique email address.
	pub email: String,
	/// Given name.
	pub first_name: Option<String>,
	/// Family name.
	pub last_name: Option<String>,
	/// Attached roles.
	pub roles: RoleSet,
	/// Privilege level.
	pub access_level: AccessLevel,
}
impl Subject {
	/// Claims snapshot to embed into issued tokens.
	pub fn claims(&self) -> SubjectClaims {
		SubjectClaims::new(self.roles.clone(), self.access_level)
	}
}

/// Fields used to create a subject from a provider profile.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectProfile {
	/// Email address.
	pub email: String,
	/// Given name.
	pub first_name: Option<String>,
	/// Family name.
	pub last_name: Option<String>,
}

/// Named role.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Role {
	/// Directory-assigned identifier.
	pub id: u64,
	/// Unique name.
	pub name: RoleName,
}

/// Federated identity bound to a local subject.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityLink {
	/// Identity provider.
	pub provider: ProviderId,
	/// Provider-assigned identifier.
	pub external_id: ExternalId,
	/// Linked local subject.
	pub subject: SubjectId,
}

/// Client details captured at sign-in.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginContext {
	/// Client address as reported by the edge proxy.
	pub ip: Option<String>,
	/// `User-Agent` header value.
	pub user_agent: Option<String>,
}

/// One login-history entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRecord {
	/// Subject that signed in.
	pub subject: SubjectId,
	/// Client details.
	pub context: LoginContext,
	/// Sign-in instant.
	pub logged_in_at: OffsetDateTime,
}
