//! Unverified ID token claim decoding.
//!
//! Signatures are not validated here; the token arrives over TLS directly from the token
//! endpoint and is only used to populate cache records.

// self
use crate::{_prelude::*, auth::decode_base64_url, error::ClientError};

/// Subset of OIDC ID token claims used by the cache.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct IdTokenClaims {
	/// Subject.
	#[serde(default)]
	pub sub: Option<String>,
	/// Object id of the user in the issuing tenant.
	#[serde(default)]
	pub oid: Option<String>,
	/// Issuing tenant id.
	#[serde(default)]
	pub tid: Option<String>,
	/// Issuer.
	#[serde(default)]
	pub iss: Option<String>,
	/// Login hint shown to users.
	#[serde(default)]
	pub preferred_username: Option<String>,
	/// Upn, used when `preferred_username` is absent.
	#[serde(default)]
	pub upn: Option<String>,
	/// Display name.
	#[serde(default)]
	pub name: Option<String>,
}
impl IdTokenClaims {
	/// Decodes the payload segment of a compact JWT.
	pub fn decode(raw: &str) -> Result<Self, ClientError> {
		let mut segments = raw.split('.');
		let payload = match (segments.next(), segments.next()) {
			(Some(_), Some(payload)) if !payload.is_empty() => payload,
			_ => {
				return Err(ClientError::InvalidIdToken {
					reason: "expected a compact JWT".into(),
				});
			},
		};
		let bytes = decode_base64_url(payload)
			.map_err(|e| ClientError::InvalidIdToken { reason: e.to_string() })?;

		serde_json::from_slice(&bytes)
			.map_err(|e| ClientError::InvalidIdToken { reason: e.to_string() })
	}

	/// Object id, falling back to the subject.
	pub fn local_account_id(&self) -> Option<&str> {
		self.oid.as_deref().or(self.sub.as_deref())
	}

	/// Username shown to the user.
	pub fn username(&self) -> Option<&str> {
		self.preferred_username.as_deref().or(self.upn.as_deref())
	}

	/// Home account id derived from the claims when no `client_info` is available.
	pub fn home_account_id(&self) -> Option<String> {
		let local = self.local_account_id()?;

		Some(match self.tid.as_deref() {
			Some(tid) => format!("{local}.{tid}"),
			None => local.to_owned(),
		})
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
	// self
	use super::*;

	fn jwt(claims: &str) -> String {
		format!("eyJhbGciOiJub25lIn0.{}.", URL_SAFE_NO_PAD.encode(claims))
	}

	#[test]
	fn decodes_claims_and_derives_ids() {
		let claims = IdTokenClaims::decode(&jwt(
			r#"{"oid":"o-1","sub":"s-1","tid":"t-1","preferred_username":"a@contoso.com","name":"A"}"#,
		))
		.expect("ID token should decode.");

		assert_eq!(claims.local_account_id(), Some("o-1"));
		assert_eq!(claims.username(), Some("a@contoso.com"));
		assert_eq!(claims.home_account_id().as_deref(), Some("o-1.t-1"));
	}

	#[test]
	fn falls_back_to_subject() {
		let claims =
			IdTokenClaims::decode(&jwt(r#"{"sub":"s-1"}"#)).expect("ID token should decode.");

		assert_eq!(claims.home_account_id().as_deref(), Some("s-1"));
	}

	#[test]
	fn rejects_non_jwt() {
		assert!(IdTokenClaims::decode("not-a-jwt").is_err());
		assert!(IdTokenClaims::decode("a.!!!.c").is_err());
	}
}
