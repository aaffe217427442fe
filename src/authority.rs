//! Authority parsing and endpoint derivation.

mod discovery;

pub use discovery::*;

// self
use crate::{_prelude::*, cache::KEY_DELIMITER};

/// Tenant aliases that do not name a concrete directory.
pub const TENANTLESS_ALIASES: [&str; 3] = ["common", "consumers", "organizations"];

/// Errors raised while parsing an authority URL.
#[derive(Debug, PartialEq, Eq, ThisError)]
pub enum AuthorityError {
	/// Authority string is not a URL.
	#[error("Authority `{authority}` is not a valid URL.")]
	InvalidUrl {
		/// Raw input.
		authority: String,
	},
	/// Authority must use HTTPS.
	#[error("Authority `{authority}` must use https.")]
	InsecureScheme {
		/// Raw input.
		authority: String,
	},
	/// Authority has no host.
	#[error("Authority `{authority}` has no host.")]
	MissingHost {
		/// Raw input.
		authority: String,
	},
	/// Authority has no tenant path segment.
	#[error("Authority `{authority}` has no tenant segment.")]
	MissingTenant {
		/// Raw input.
		authority: String,
	},
	/// Discovered endpoint does not use https.
	#[error("Discovered endpoint `{endpoint}` must use https.")]
	InsecureEndpoint {
		/// Offending endpoint.
		endpoint: String,
	},
	/// Host or tenant contains the cache-key delimiter.
	#[error("Authority `{authority}` contains the reserved `|` character.")]
	ReservedDelimiter {
		/// Raw input.
		authority: String,
	},
}

/// Issuer of tokens, e.g. `https://login.microsoftonline.com/contoso.onmicrosoft.com/`.
///
/// The host becomes the cache `environment` and the first path segment the tenant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Authority {
	base: Url,
	environment: String,
	tenant: String,
}
impl Authority {
	/// Parses and validates an authority URL.
	pub fn parse(raw: &str) -> Result<Self, AuthorityError> {
		let url =
			Url::parse(raw).map_err(|_| AuthorityError::InvalidUrl { authority: raw.into() })?;

		if url.scheme() != "https" {
			return Err(AuthorityError::InsecureScheme { authority: raw.into() });
		}

		let environment = url
			.host_str()
			.filter(|host| !host.is_empty())
			.ok_or_else(|| AuthorityError::MissingHost { authority: raw.into() })?
			.to_lowercase();
		let tenant = url
			.path_segments()
			.and_then(|mut segments| segments.next())
			.filter(|segment| !segment.is_empty())
			.ok_or_else(|| AuthorityError::MissingTenant { authority: raw.into() })?
			.to_owned();

		if environment.contains(KEY_DELIMITER) || tenant.contains(KEY_DELIMITER) {
			return Err(AuthorityError::ReservedDelimiter { authority: raw.into() });
		}

		let mut base = url;

		base.set_path(&format!("/{tenant}/"));
		base.set_query(None);
		base.set_fragment(None);

		Ok(Self { base, environment, tenant })
	}

	/// Authority host used as the cache environment.
	pub fn environment(&self) -> &str {
		&self.environment
	}

	/// Tenant path segment (may be an alias such as `common`).
	pub fn tenant(&self) -> &str {
		&self.tenant
	}

	/// Returns true when the tenant segment is a multi-tenant alias.
	pub fn is_tenantless(&self) -> bool {
		TENANTLESS_ALIASES.iter().any(|alias| alias.eq_ignore_ascii_case(&self.tenant))
	}

	/// Tenant to use in cache keys when the response names none.
	pub fn concrete_tenant(&self) -> Option<&str> {
		(!self.is_tenantless()).then_some(self.tenant.as_str())
	}

	/// Canonical `https://host/tenant/` form.
	pub fn as_url(&self) -> &Url {
		&self.base
	}

	/// OpenID provider metadata document.
	pub fn openid_configuration_endpoint(&self) -> Url {
		self.endpoint("v2.0/.well-known/openid-configuration")
	}

	/// OAuth 2.0 token endpoint.
	pub fn token_endpoint(&self) -> Url {
		self.endpoint("oauth2/v2.0/token")
	}

	/// OAuth 2.0 authorization endpoint.
	pub fn authorize_endpoint(&self) -> Url {
		self.endpoint("oauth2/v2.0/authorize")
	}

	/// Device authorization endpoint.
	pub fn device_code_endpoint(&self) -> Url {
		self.endpoint("oauth2/v2.0/devicecode")
	}

	fn endpoint(&self, path: &str) -> Url {
		let mut url = self.base.clone();

		url.set_path(&format!("/{}/{path}", self.tenant));

		url
	}
}
impl Display for Authority {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.base.as_str())
	}
}
impl FromStr for Authority {
	type Err = AuthorityError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse(s)
	}
}
impl TryFrom<String> for Authority {
	type Error = AuthorityError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		Self::parse(&value)
	}
}
impl From<Authority> for String {
	fn from(value: Authority) -> Self {
		value.base.into()
	}
}
