//! Deterministic composite keys for cached credentials.

// self
use crate::{_prelude::*, auth::ScopeSet};

/// Character joining key fields; rejected inside any field.
pub const KEY_DELIMITER: char = '|';

/// Errors raised while building a cache key.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum KeyError {
	/// A required field is empty.
	#[error("Cache key field `{field}` is required.")]
	MissingField {
		/// Field name.
		field: &'static str,
	},
	/// A field contains the key delimiter.
	#[error("Cache key field `{field}` contains the reserved `|` character.")]
	ReservedDelimiter {
		/// Field name.
		field: &'static str,
	},
}

/// Credential kind tag embedded in every key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CredentialKind {
	/// Access token.
	AccessToken,
	/// Refresh token.
	RefreshToken,
	/// ID token.
	IdToken,
	/// Account record.
	Account,
}
impl CredentialKind {
	/// Lower-case tag written into keys.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::AccessToken => "accesstoken",
			Self::RefreshToken => "refreshtoken",
			Self::IdToken => "idtoken",
			Self::Account => "account",
		}
	}
}
impl Display for CredentialKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Composite cache key: `homeAccountId|environment|kind|clientId|tenantId[|scopes]`.
///
/// Identity is the rendered string alone.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);
impl CacheKey {
	/// Builds a key from its components.
	///
	/// `environment` is always required; `client_id` is required for every kind except
	/// [`CredentialKind::Account`]. Scopes are only rendered for access tokens.
	pub fn build(
		kind: CredentialKind,
		environment: &str,
		tenant_id: &str,
		home_account_id: &str,
		client_id: &str,
		scopes: Option<&ScopeSet>,
	) -> Result<Self, KeyError> {
		check("environment", environment, true)?;
		check("client_id", client_id, kind != CredentialKind::Account)?;
		check("tenant_id", tenant_id, false)?;
		check("home_account_id", home_account_id, false)?;

		let mut key = [home_account_id, environment, kind.as_str(), client_id, tenant_id].join("|");

		if kind == CredentialKind::AccessToken {
			// ScopeSet already rejects the delimiter.
			let scopes = scopes.map(ScopeSet::normalized).unwrap_or_default();

			key.push(KEY_DELIMITER);
			key.push_str(&scopes);
		}

		Ok(Self(key))
	}

	/// Access-token key.
	pub fn access_token(
		environment: &str,
		tenant_id: &str,
		home_account_id: &str,
		client_id: &str,
		scopes: &ScopeSet,
	) -> Result<Self, KeyError> {
		Self::build(
			CredentialKind::AccessToken,
			environment,
			tenant_id,
			home_account_id,
			client_id,
			Some(scopes),
		)
	}

	/// Refresh-token key; refresh tokens are tenant-agnostic.
	pub fn refresh_token(
		environment: &str,
		home_account_id: &str,
		client_id: &str,
	) -> Result<Self, KeyError> {
		Self::build(CredentialKind::RefreshToken, environment, "", home_account_id, client_id, None)
	}

	/// ID-token key.
	pub fn id_token(
		environment: &str,
		tenant_id: &str,
		home_account_id: &str,
		client_id: &str,
	) -> Result<Self, KeyError> {
		Self::build(
			CredentialKind::IdToken,
			environment,
			tenant_id,
			home_account_id,
			client_id,
			None,
		)
	}

	/// Account key; identity is home account id + environment.
	pub fn account(environment: &str, home_account_id: &str) -> Result<Self, KeyError> {
		Self::build(CredentialKind::Account, environment, "", home_account_id, "", None)
	}

	/// Rendered key string.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl Display for CacheKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}
impl AsRef<str> for CacheKey {
	fn as_ref(&self) -> &str {
		&self.0
	}
}

fn check(field: &'static str, value: &str, required: bool) -> Result<(), KeyError> {
	if required && value.is_empty() {
		return Err(KeyError::MissingField { field });
	}
	if value.contains(KEY_DELIMITER) {
		return Err(KeyError::ReservedDelimiter { field });
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn scopes(raw: &str) -> ScopeSet {
		ScopeSet::from_str(raw).expect("Scope fixture should parse.")
	}

	#[test]
	fn access_token_key_layout() {
		let key = CacheKey::access_token(
			"login.contoso.com",
			"",
			"",
			"X",
			&scopes("https://graph/.default"),
		)
		.expect("Key should build.");

		assert_eq!(key.as_str(), "|login.contoso.com|accesstoken|X||https://graph/.default");
	}

	#[test]
	fn scope_order_and_case_do_not_change_keys() {
		let lhs = CacheKey::access_token("env", "t", "u.t", "c", &scopes("Mail.Read user.read"))
			.expect("Key should build.");
		let rhs = CacheKey::access_token("env", "t", "u.t", "c", &scopes("USER.READ mail.read"))
			.expect("Key should build.");

		assert_eq!(lhs, rhs);
	}

	#[test]
	fn other_kinds_omit_scopes() {
		assert_eq!(
			CacheKey::refresh_token("env", "u.t", "c").expect("Key should build.").as_str(),
			"u.t|env|refreshtoken|c|"
		);
		assert_eq!(
			CacheKey::id_token("env", "t", "u.t", "c").expect("Key should build.").as_str(),
			"u.t|env|idtoken|c|t"
		);
		assert_eq!(
			CacheKey::account("env", "u.t").expect("Key should build.").as_str(),
			"u.t|env|account||"
		);
	}

	#[test]
	fn invalid_fields_are_rejected() {
		assert_eq!(
			CacheKey::refresh_token("", "u", "c"),
			Err(KeyError::MissingField { field: "environment" })
		);
		assert_eq!(
			CacheKey::refresh_token("env", "u", ""),
			Err(KeyError::MissingField { field: "client_id" })
		);
		assert_eq!(
			CacheKey::id_token("env", "t|x", "u", "c"),
			Err(KeyError::ReservedDelimiter { field: "tenant_id" })
		);
	}
}
