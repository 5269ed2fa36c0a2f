//! Role and privilege-level claims embedded into issued tokens.

// self
use crate::{_prelude::*, auth::RoleName};

/// Error returned when an access level falls outside the supported range.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
#[error("Access level {value} is outside 0..={max}.")]
pub struct AccessLevelError {
	/// Rejected value.
	pub value: i64,
	/// Highest supported level.
	pub max: u8,
}

/// Privilege level in `0..=5`; higher values unlock more operations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct AccessLevel(u8);
impl AccessLevel {
	/// Highest supported level.
	pub const MAX: u8 = 5;

	/// Validates and wraps a raw level.
	pub fn new(value: i64) -> Result<Self, AccessLevelError> {
		match u8::try_from(value) {
			Ok(level) if level <= Self::MAX => Ok(Self(level)),
			_ => Err(AccessLevelError { value, max: Self::MAX }),
		}
	}

	/// Returns the raw level.
	pub const fn get(self) -> u8 {
		self.0
	}
}
impl TryFrom<i64> for AccessLevel {
	type Error = AccessLevelError;

	fn try_from(value: i64) -> Result<Self, Self::Error> {
		Self::new(value)
	}
}
impl From<AccessLevel> for u8 {
	fn from(value: AccessLevel) -> Self {
		value.0
	}
}
impl Display for AccessLevel {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{}", self.0)
	}
}

/// Ordered, deduplicated set of role names.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleSet(BTreeSet<RoleName>);
impl RoleSet {
	/// Builds a set from any iterator of role names.
	pub fn new<I>(roles: I) -> Self
	where
		I: IntoIterator<Item = RoleName>,
	{
		Self(roles.into_iter().collect())
	}

	/// Adds a role, returning `true` if it was not present yet.
	pub fn insert(&mut self, role: RoleName) -> bool {
		self.0.insert(role)
	}

	/// Returns `true` if the set contains the role.
	pub fn contains(&self, role: &str) -> bool {
		self.0.contains(role)
	}

	/// Returns `true` if the two sets share at least one role.
	pub fn intersects(&self, other: &RoleSet) -> bool {
		self.0.intersection(&other.0).next().is_some()
	}

	/// Number of roles.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns `true` if no roles are present.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Iterator over role names in lexical order.
	pub fn iter(&self) -> impl Iterator<Item = &RoleName> {
		self.0.iter()
	}
}
impl FromIterator<RoleName> for RoleSet {
	fn from_iter<T: IntoIterator<Item = RoleName>>(iter: T) -> Self {
		Self::new(iter)
	}
}

/// Snapshot of a subject's authorization data copied into every issued token.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectClaims {
	/// Roles held by the subject when the token was minted.
	#[serde(default)]
	pub roles: RoleSet,
	/// Privilege level held by the subject when the token was minted.
	#[serde(default)]
	pub access_level: AccessLevel,
}
impl SubjectClaims {
	/// Creates a claims snapshot.
	pub fn new(roles: RoleSet, access_level: AccessLevel) -> Self {
		Self { roles, access_level }
	}

	/// Checks the snapshot against a requirement.
	pub fn check(&self, requirement: &AccessRequirement) -> Result<(), String> {
		if !requirement.roles.is_empty() && !self.roles.intersects(&requirement.roles) {
			return Err("subject holds none of the required roles".into());
		}
		if self.access_level < requirement.min_level {
			return Err(format!(
				"access level {} is below the required level {}",
				self.access_level, requirement.min_level
			));
		}

		Ok(())
	}
}

/// Role/level gate evaluated against authorized claims.
///
/// An empty role set accepts any role; the level check always applies.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccessRequirement {
	/// Any one of these roles satisfies the role check.
	pub roles: RoleSet,
	/// Minimum access level.
	pub min_level: AccessLevel,
}
impl AccessRequirement {
	/// Requires any one of the provided roles.
	pub fn any_role<I>(roles: I) -> Self
	where
		I: IntoIterator<Item = RoleName>,
	{
		Self { roles: RoleSet::new(roles), min_level: AccessLevel::default() }
	}

	/// Sets the minimum access level.
	pub fn with_min_level(mut self, level: AccessLevel) -> Self {
		self.min_level = level;

		self
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn role(name: &str) -> RoleName {
		RoleName::new(name).expect("Role fixture should be valid.")
	}

	fn level(value: i64) -> AccessLevel {
		AccessLevel::new(value).expect("Level fixture should be in range.")
	}

	#[test]
	fn access_level_enforces_range() {
		assert_eq!(level(0).get(), 0);
		assert_eq!(level(5).get(), 5);
		assert_eq!(AccessLevel::new(6), Err(AccessLevelError { value: 6, max: 5 }));
		assert!(AccessLevel::new(-1).is_err());
		assert!(serde_json::from_str::<AccessLevel>("9").is_err());
		assert_eq!(serde_json::to_string(&level(3)).expect("Level should serialize."), "3");
	}

	#[test]
	fn role_set_is_ordered_and_deduplicated() {
		let roles = RoleSet::new([role("staff"), role("admin"), role("staff")]);
		let names = roles.iter().map(|r| r.as_ref()).collect::<Vec<_>>();

		assert_eq!(names, ["admin", "staff"]);
		assert_eq!(
			serde_json::to_string(&roles).expect("Role set should serialize."),
			"[\"admin\",\"staff\"]"
		);
	}

	#[test]
	fn requirement_checks_roles_then_level() {
		let claims = SubjectClaims::new(RoleSet::new([role("user")]), level(2));

		claims.check(&AccessRequirement::default()).expect("Empty requirement should pass.");
		claims
			.check(&AccessRequirement::any_role([role("admin"), role("user")]).with_min_level(level(2)))
			.expect("Matching role and level should pass.");

		let err = claims
			.check(&AccessRequirement::any_role([role("admin")]))
			.expect_err("Missing role should fail.");

		assert!(err.contains("roles"));

		let err = claims
			.check(&AccessRequirement::default().with_min_level(level(3)))
			.expect_err("Insufficient level should fail.");

		assert!(err.contains("below"));
	}
}
