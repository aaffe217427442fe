//! Token request parameters and grant encodings.

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD};
use url::form_urlencoded::Serializer as FormSerializer;
// self
use crate::{_prelude::*, auth::TokenSecret, error::ClientError};

/// `grant_type` for device code redemption.
pub const DEVICE_CODE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";
/// `grant_type` for on-behalf-of redemption.
pub const JWT_BEARER_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
/// `grant_type` for SAML 1.1 assertions.
pub const SAML11_BEARER_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:saml1_1-bearer";
/// `grant_type` for SAML 2.0 assertions.
pub const SAML20_BEARER_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:saml2-bearer";

/// Ordered request parameters destined for a form body or a query string.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RequestParameters(Vec<(String, String)>);
impl RequestParameters {
	/// Sets `name`, replacing any previous value.
	pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
		let name = name.into();
		let value = value.into();

		match self.0.iter_mut().find(|(existing, _)| *existing == name) {
			Some((_, slot)) => *slot = value,
			None => self.0.push((name, value)),
		}
	}

	/// Value of `name`, if set.
	pub fn get(&self, name: &str) -> Option<&str> {
		self.0.iter().find(|(existing, _)| existing == name).map(|(_, value)| value.as_str())
	}

	/// Returns true when `name` is set.
	pub fn contains(&self, name: &str) -> bool {
		self.get(name).is_some()
	}

	/// Adds caller-supplied parameters, failing on the first name that is already set.
	pub fn extend_extra<'a, I>(&mut self, extra: I) -> Result<(), ClientError>
	where
		I: IntoIterator<Item = &'a (String, String)>,
	{
		for (name, value) in extra {
			if self.contains(name) {
				return Err(ClientError::DuplicateQueryParameter { name: name.clone() });
			}

			self.0.push((name.clone(), value.clone()));
		}

		Ok(())
	}

	/// Iterator over `(name, value)` pairs in insertion order.
	pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
		self.0.iter().map(|(name, value)| (name.as_str(), value.as_str()))
	}

	/// `application/x-www-form-urlencoded` rendering.
	pub fn to_form_body(&self) -> String {
		FormSerializer::new(String::new()).extend_pairs(self.iter()).finish()
	}

	/// Appends every parameter to `url`'s query string.
	pub fn append_to(&self, url: &mut Url) {
		if self.0.is_empty() {
			return;
		}

		url.query_pairs_mut().extend_pairs(self.iter());
	}
}
impl Debug for RequestParameters {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		// Values may carry secrets.
		f.debug_list().entries(self.0.iter().map(|(name, _)| name)).finish()
	}
}

/// SAML assertion version returned by a WS-Trust exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SamlVersion {
	/// SAML 1.1.
	Saml11,
	/// SAML 2.0.
	Saml20,
}

/// Grant-specific request contribution.
#[derive(Clone, Debug)]
pub enum Grant {
	/// Authorization code redemption.
	AuthorizationCode {
		/// Code returned to the redirect URI.
		code: TokenSecret,
		/// Redirect URI used for the authorize request.
		redirect_uri: Url,
		/// PKCE verifier.
		code_verifier: Option<TokenSecret>,
	},
	/// Refresh token redemption.
	RefreshToken {
		/// Refresh token.
		refresh_token: TokenSecret,
	},
	/// App-only client credentials.
	ClientCredentials,
	/// Device code redemption.
	DeviceCode {
		/// Device code from the device authorization endpoint.
		device_code: TokenSecret,
	},
	/// Resource-owner password credentials.
	Password {
		/// Username.
		username: String,
		/// Password.
		password: TokenSecret,
	},
	/// SAML bearer assertion, as used by integrated Windows auth.
	SamlBearer {
		/// Assertion version.
		version: SamlVersion,
		/// Raw assertion XML.
		assertion: TokenSecret,
	},
	/// On-behalf-of redemption of an incoming access token.
	OnBehalfOf {
		/// Incoming user assertion.
		assertion: TokenSecret,
	},
}
impl Grant {
	/// `grant_type` value.
	pub const fn grant_type(&self) -> &'static str {
		match self {
			Self::AuthorizationCode { .. } => "authorization_code",
			Self::RefreshToken { .. } => "refresh_token",
			Self::ClientCredentials => "client_credentials",
			Self::DeviceCode { .. } => DEVICE_CODE_GRANT_TYPE,
			Self::Password { .. } => "password",
			Self::SamlBearer { version: SamlVersion::Saml11, .. } => SAML11_BEARER_GRANT_TYPE,
			Self::SamlBearer { version: SamlVersion::Saml20, .. } => SAML20_BEARER_GRANT_TYPE,
			Self::OnBehalfOf { .. } => JWT_BEARER_GRANT_TYPE,
		}
	}

	/// Returns true for grants that act on behalf of a user and therefore request OIDC scopes.
	pub const fn is_user_grant(&self) -> bool {
		!matches!(self, Self::ClientCredentials)
	}

	/// Writes `grant_type` and the grant's own parameters.
	pub fn apply(&self, params: &mut RequestParameters) {
		params.insert("grant_type", self.grant_type());

		match self {
			Self::AuthorizationCode { code, redirect_uri, code_verifier } => {
				params.insert("code", code.expose());
				params.insert("redirect_uri", redirect_uri.as_str());

				if let Some(verifier) = code_verifier {
					params.insert("code_verifier", verifier.expose());
				}
			},
			Self::RefreshToken { refresh_token } => {
				params.insert("refresh_token", refresh_token.expose());
			},
			Self::ClientCredentials => {},
			Self::DeviceCode { device_code } => {
				params.insert("device_code", device_code.expose());
			},
			Self::Password { username, password } => {
				params.insert("username", username.as_str());
				params.insert("password", password.expose());
			},
			Self::SamlBearer { assertion, .. } => {
				params.insert("assertion", STANDARD.encode(assertion.expose()));
			},
			Self::OnBehalfOf { assertion } => {
				params.insert("assertion", assertion.expose());
				params.insert("requested_token_use", "on_behalf_of");
			},
		}
	}
}
