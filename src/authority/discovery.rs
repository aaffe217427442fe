//! OpenID Connect discovery and the validated endpoint cache.

// self
use crate::{
	_prelude::*,
	authority::{Authority, AuthorityError},
};

/// Subset of the OpenID provider metadata document the grant handlers consume.
#[derive(Clone, Debug, Deserialize)]
pub struct OpenIdConfiguration {
	/// Token endpoint.
	pub token_endpoint: Url,
	/// Authorization endpoint.
	pub authorization_endpoint: Url,
	/// Device authorization endpoint, when the provider advertises one.
	#[serde(default)]
	pub device_authorization_endpoint: Option<Url>,
}

/// Endpoints the grant handlers talk to for one authority.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthorityEndpoints {
	/// Token endpoint.
	pub token: Url,
	/// Authorization endpoint.
	pub authorize: Url,
	/// Device authorization endpoint.
	pub device_code: Url,
}
impl AuthorityEndpoints {
	/// Fixed `oauth2/v2.0/*` layout under the authority's tenant.
	pub fn fixed(authority: &Authority) -> Self {
		Self {
			token: authority.token_endpoint(),
			authorize: authority.authorize_endpoint(),
			device_code: authority.device_code_endpoint(),
		}
	}

	/// Validates a discovery document for `authority`.
	///
	/// A missing device authorization endpoint falls back to the fixed layout. Every endpoint
	/// must use https.
	pub fn from_discovery(
		authority: &Authority,
		document: OpenIdConfiguration,
	) -> Result<Self, AuthorityError> {
		let endpoints = Self {
			token: document.token_endpoint,
			authorize: document.authorization_endpoint,
			device_code: document
				.device_authorization_endpoint
				.unwrap_or_else(|| authority.device_code_endpoint()),
		};

		for endpoint in [&endpoints.token, &endpoints.authorize, &endpoints.device_code] {
			if endpoint.scheme() != "https" {
				return Err(AuthorityError::InsecureEndpoint { endpoint: endpoint.to_string() });
			}
		}

		Ok(endpoints)
	}
}

/// Discovered endpoints keyed by canonical authority URL.
///
/// Only validated documents are stored, so a failed discovery is retried on the next
/// acquisition.
#[derive(Debug, Default)]
pub struct EndpointCache(RwLock<HashMap<String, AuthorityEndpoints>>);
impl EndpointCache {
	/// Returns the endpoints recorded for `authority`.
	pub fn get(&self, authority: &Authority) -> Option<AuthorityEndpoints> {
		self.0.read().get(authority.as_url().as_str()).cloned()
	}

	/// Records validated endpoints for `authority`.
	pub fn insert(&self, authority: &Authority, endpoints: AuthorityEndpoints) {
		self.0.write().insert(authority.as_url().as_str().to_owned(), endpoints);
	}

	/// Number of authorities with recorded endpoints.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns true when nothing has been discovered yet.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}
}
