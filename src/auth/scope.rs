//! Scope modeling: normalized, case-insensitive scope sets.

// std
use std::{cmp::Ordering, slice::Iter};
// crates.io
use serde::{Deserializer, Serializer, de::Error as DeError};
// self
use crate::{_prelude::*, cache::KEY_DELIMITER};

/// OIDC scopes added to every user-flow request and stripped from cached access-token targets.
pub const RESERVED_SCOPES: [&str; 3] = ["offline_access", "openid", "profile"];

/// Errors emitted when validating scopes.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ScopeValidationError {
	/// Empty scope entries are not allowed.
	#[error("Scope entries cannot be empty.")]
	Empty,
	/// Scopes cannot contain embedded whitespace characters.
	#[error("Scope contains whitespace: {scope}.")]
	ContainsWhitespace {
		/// The offending scope string.
		scope: String,
	},
	/// Scopes cannot contain the cache-key delimiter.
	#[error("Scope contains the reserved `|` character: {scope}.")]
	ReservedDelimiter {
		/// The offending scope string.
		scope: String,
	},
}

/// Normalized set of OAuth scopes.
///
/// Entries are lower-cased, deduplicated, and sorted, so two sets built from the same scopes in
/// any order or casing compare equal and render to the same string. Serializes as the
/// space-delimited form used by the token endpoint and the cache `target` field.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct ScopeSet(Arc<[String]>);
impl ScopeSet {
	/// Creates a normalized scope set from any iterator.
	pub fn new<I, S>(scopes: I) -> Result<Self, ScopeValidationError>
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		let mut set = BTreeSet::new();

		for scope in scopes {
			let scope = scope.as_ref();

			if scope.is_empty() {
				return Err(ScopeValidationError::Empty);
			}
			if scope.chars().any(char::is_whitespace) {
				return Err(ScopeValidationError::ContainsWhitespace { scope: scope.to_owned() });
			}
			if scope.contains(KEY_DELIMITER) {
				return Err(ScopeValidationError::ReservedDelimiter { scope: scope.to_owned() });
			}

			set.insert(scope.to_lowercase());
		}

		Ok(Self(set.into_iter().collect()))
	}

	/// The reserved OIDC scopes as a set.
	pub fn reserved() -> Self {
		Self(RESERVED_SCOPES.iter().map(|s| (*s).to_owned()).collect())
	}

	/// Number of distinct scopes.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns true if no scopes are defined.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Returns true if the set contains `scope`, compared case-insensitively.
	pub fn contains(&self, scope: &str) -> bool {
		let scope = scope.to_lowercase();

		self.0.binary_search_by(|candidate| candidate.as_str().cmp(&scope)).is_ok()
	}

	/// Iterator over normalized scopes.
	pub fn iter(&self) -> impl Iterator<Item = &str> {
		self.0.iter().map(|s| s.as_str())
	}

	/// Returns the normalized, space-delimited representation.
	pub fn normalized(&self) -> String {
		self.0.join(" ")
	}

	/// Returns the union of both sets.
	pub fn union(&self, other: &Self) -> Self {
		let merged = self.iter().chain(other.iter()).map(str::to_owned).collect::<BTreeSet<_>>();

		Self(merged.into_iter().collect())
	}

	/// Returns the scopes of `self` that are absent from `other`.
	pub fn difference(&self, other: &Self) -> Self {
		Self(self.iter().filter(|s| !other.contains(s)).map(str::to_owned).collect())
	}

	/// Returns true when both sets share at least one scope.
	pub fn intersects(&self, other: &Self) -> bool {
		self.iter().any(|s| other.contains(s))
	}

	/// Returns true when every scope of `other` is present in `self`.
	pub fn is_superset_of(&self, other: &Self) -> bool {
		other.iter().all(|s| self.contains(s))
	}

	/// Adds the reserved OIDC scopes.
	pub fn decorated(&self) -> Self {
		self.union(&Self::reserved())
	}

	/// Removes the reserved OIDC scopes.
	pub fn without_reserved(&self) -> Self {
		self.difference(&Self::reserved())
	}

	/// Returns the underlying slice of scope strings.
	pub fn as_slice(&self) -> &[String] {
		&self.0
	}
}
impl PartialOrd for ScopeSet {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}
impl Ord for ScopeSet {
	fn cmp(&self, other: &Self) -> Ordering {
		self.0.cmp(&other.0)
	}
}
impl Debug for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("ScopeSet").field(&self.0).finish()
	}
}
impl Display for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.normalized())
	}
}
impl FromStr for ScopeSet {
	type Err = ScopeValidationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if s.is_empty() {
			return Ok(Self::default());
		}
		if s.chars().all(char::is_whitespace) {
			return Err(ScopeValidationError::Empty);
		}

		Self::new(s.split_whitespace())
	}
}
impl TryFrom<&[&str]> for ScopeSet {
	type Error = ScopeValidationError;

	fn try_from(value: &[&str]) -> Result<Self, Self::Error> {
		Self::new(value)
	}
}

/// Iterator over scope strings.
pub struct ScopeIter<'a> {
	inner: Iter<'a, String>,
}
impl<'a> Iterator for ScopeIter<'a> {
	type Item = &'a str;

	fn next(&mut self) -> Option<Self::Item> {
		self.inner.next().map(|s| s.as_str())
	}
}
impl<'a> IntoIterator for &'a ScopeSet {
	type IntoIter = ScopeIter<'a>;
	type Item = &'a str;

	fn into_iter(self) -> Self::IntoIter {
		ScopeIter { inner: self.0.iter() }
	}
}
impl Serialize for ScopeSet {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&self.normalized())
	}
}
impl<'de> Deserialize<'de> for ScopeSet {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let raw = String::deserialize(deserializer)?;

		ScopeSet::from_str(&raw).map_err(DeError::custom)
	}
}
