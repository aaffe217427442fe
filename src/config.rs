//! Application configuration and the service bundle shared by every acquisition.

// self
use crate::{
	_prelude::*,
	authority::{Authority, EndpointCache},
	cache::{CachePersistence, KEY_DELIMITER, TokenCache},
	credential::ClientCredential,
	crypto::{CryptographyManager, DefaultCryptographyManager},
	error::ClientError,
	http::TokenHttpClient,
	oauth::{ClientIdentity, OAuth2Client},
};

/// Default clock-skew margin applied to access-token expiry.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::minutes(5);
/// Default `x-client-SKU` value.
pub const DEFAULT_CLIENT_SKU: &str = "oauth2-token-cache.rust";

/// Immutable application settings.
#[derive(Clone, Debug)]
pub struct ApplicationConfig {
	/// Application (client) id.
	pub client_id: String,
	/// Authority tokens are requested from.
	pub authority: Authority,
	/// Client authentication.
	pub credential: ClientCredential,
	/// Redirect URI for the authorization code flow.
	pub redirect_uri: Option<Url>,
	/// Serve access tokens from the extended lifetime window when the service is unavailable.
	pub extended_lifetime_enabled: bool,
	/// Margin subtracted from expiry instants.
	pub clock_skew: Duration,
	/// Family id whose refresh tokens this application may redeem.
	pub family_id: Option<String>,
	/// Resolve endpoints from the authority's OpenID configuration document instead of the
	/// fixed `oauth2/v2.0/*` layout.
	pub endpoint_discovery: bool,
	/// `x-client-SKU` value.
	pub client_sku: String,
	/// `x-client-Ver` value.
	pub client_version: String,
}
impl ApplicationConfig {
	/// Starts a builder for `client_id` against `authority`.
	pub fn builder(client_id: impl Into<String>, authority: Authority) -> ApplicationConfigBuilder {
		ApplicationConfigBuilder {
			client_id: client_id.into(),
			authority,
			credential: ClientCredential::None,
			redirect_uri: None,
			extended_lifetime_enabled: false,
			clock_skew: DEFAULT_CLOCK_SKEW,
			family_id: None,
			endpoint_discovery: false,
			client_sku: DEFAULT_CLIENT_SKU.into(),
			client_version: env!("CARGO_PKG_VERSION").into(),
		}
	}

	/// Returns true when a client credential is configured.
	pub fn is_confidential(&self) -> bool {
		self.credential.is_confidential()
	}
}

/// Builder for [`ApplicationConfig`].
#[derive(Clone, Debug)]
pub struct ApplicationConfigBuilder {
	client_id: String,
	authority: Authority,
	credential: ClientCredential,
	redirect_uri: Option<Url>,
	extended_lifetime_enabled: bool,
	clock_skew: Duration,
	family_id: Option<String>,
	endpoint_discovery: bool,
	client_sku: String,
	client_version: String,
}
impl ApplicationConfigBuilder {
	/// Sets the client credential.
	pub fn client_credential(mut self, credential: ClientCredential) -> Self {
		self.credential = credential;

		self
	}

	/// Sets the redirect URI.
	pub fn redirect_uri(mut self, redirect_uri: Url) -> Self {
		self.redirect_uri = Some(redirect_uri);

		self
	}

	/// Enables or disables extended-lifetime fallback.
	pub fn extended_lifetime(mut self, enabled: bool) -> Self {
		self.extended_lifetime_enabled = enabled;

		self
	}

	/// Overrides the clock-skew margin.
	pub fn clock_skew(mut self, skew: Duration) -> Self {
		self.clock_skew = skew;

		self
	}

	/// Sets the family id used for family refresh-token fallback.
	pub fn family_id(mut self, family_id: impl Into<String>) -> Self {
		self.family_id = Some(family_id.into());

		self
	}

	/// Enables OpenID Connect endpoint discovery.
	pub fn endpoint_discovery(mut self, enabled: bool) -> Self {
		self.endpoint_discovery = enabled;

		self
	}

	/// Overrides `x-client-SKU`.
	pub fn client_sku(mut self, sku: impl Into<String>) -> Self {
		self.client_sku = sku.into();

		self
	}

	/// Overrides `x-client-Ver`.
	pub fn client_version(mut self, version: impl Into<String>) -> Self {
		self.client_version = version.into();

		self
	}

	/// Validates and builds the configuration.
	pub fn build(self) -> Result<ApplicationConfig, ClientError> {
		if self.client_id.trim().is_empty() {
			return Err(ClientError::InvalidConfig { reason: "client id is empty".into() });
		}
		if self.client_id.contains(KEY_DELIMITER) {
			return Err(ClientError::InvalidConfig {
				reason: "client id contains the reserved `|` character".into(),
			});
		}
		if self.clock_skew.is_negative() {
			return Err(ClientError::InvalidConfig { reason: "clock skew is negative".into() });
		}

		Ok(ApplicationConfig {
			client_id: self.client_id,
			authority: self.authority,
			credential: self.credential,
			redirect_uri: self.redirect_uri,
			extended_lifetime_enabled: self.extended_lifetime_enabled,
			clock_skew: self.clock_skew,
			family_id: self.family_id,
			endpoint_discovery: self.endpoint_discovery,
			client_sku: self.client_sku,
			client_version: self.client_version,
		})
	}
}

/// Collaborators shared by every acquisition, built once per application.
pub struct ServiceBundle<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// Application settings.
	pub config: Arc<ApplicationConfig>,
	/// Token-endpoint client.
	pub oauth: Arc<OAuth2Client<C>>,
	/// Hashing, randomness, and signing.
	pub crypto: Arc<dyn CryptographyManager>,
	/// Persistence adapter backing `cache`.
	pub persistence: Arc<dyn CachePersistence>,
	/// Token cache.
	pub cache: Arc<TokenCache>,
	/// Endpoints discovered per authority.
	pub endpoints: Arc<EndpointCache>,
}
impl<C> ServiceBundle<C>
where
	C: TokenHttpClient,
{
	/// Wires the bundle and loads persisted cache state once.
	pub fn initialize(
		config: ApplicationConfig,
		http_client: impl Into<Arc<C>>,
		persistence: Arc<dyn CachePersistence>,
	) -> Self {
		let identity = ClientIdentity {
			sku: config.client_sku.clone(),
			version: config.client_version.clone(),
		};
		let cache = Arc::new(TokenCache::new(persistence.clone()));

		tracing::debug!(
			authority = %config.authority,
			counts = ?cache.records().counts(),
			"Service bundle initialized."
		);

		Self {
			config: Arc::new(config),
			oauth: Arc::new(OAuth2Client::new(http_client.into(), identity)),
			crypto: Arc::new(DefaultCryptographyManager),
			persistence,
			cache,
			endpoints: Default::default(),
		}
	}

	/// Replaces the cryptography manager.
	pub fn with_crypto(mut self, crypto: Arc<dyn CryptographyManager>) -> Self {
		self.crypto = crypto;

		self
	}
}
impl<C> Clone for ServiceBundle<C>
where
	C: ?Sized + TokenHttpClient,
{
	fn clone(&self) -> Self {
		Self {
			config: self.config.clone(),
			oauth: self.oauth.clone(),
			crypto: self.crypto.clone(),
			persistence: self.persistence.clone(),
			cache: self.cache.clone(),
			endpoints: self.endpoints.clone(),
		}
	}
}
impl<C> Debug for ServiceBundle<C>
where
	C: ?Sized + TokenHttpClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ServiceBundle")
			.field("config", &self.config)
			.field("cache", &self.cache)
			.finish_non_exhaustive()
	}
}
