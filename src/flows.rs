//! Grant handlers exposed as methods on [`ClientApplication`].

pub mod auth_code;
pub mod common;
pub mod device_code;
pub mod refresh;

mod client_credentials;
mod integrated_windows_auth;
mod on_behalf_of;
mod silent;
mod username_password;

pub use auth_code::*;
pub use common::*;
pub use device_code::*;
pub use refresh::*;

// self
use crate::{
	_prelude::*,
	auth::Account,
	cache::TokenCache,
	config::{ApplicationConfig, ServiceBundle},
	http::TokenHttpClient,
};
#[cfg(feature = "reqwest")]
use crate::{
	cache::{CachePersistence, NoopPersistence},
	http::ReqwestHttpClient,
};

#[cfg(feature = "reqwest")]
/// Client application specialized for the crate's default reqwest transport.
pub type ReqwestClientApplication = ClientApplication<ReqwestHttpClient>;

/// Public or confidential client registered with one authority.
///
/// The application owns the [`ServiceBundle`] (transport, crypto, persistence, cache) so each
/// grant handler only contributes its own parameters. Concurrent acquisitions that would be
/// served from the same access-token key share one in-flight request.
pub struct ClientApplication<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// Shared counters for refresh-token redemptions.
	pub refresh_metrics: Arc<RefreshMetrics>,
	bundle: ServiceBundle<C>,
	flow_guards: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}
impl<C> ClientApplication<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// Creates an application over an initialized bundle.
	pub fn from_bundle(bundle: ServiceBundle<C>) -> Self {
		Self { refresh_metrics: Default::default(), bundle, flow_guards: Default::default() }
	}

	/// Collaborators shared by every acquisition.
	pub fn bundle(&self) -> &ServiceBundle<C> {
		&self.bundle
	}

	/// Application settings.
	pub fn config(&self) -> &ApplicationConfig {
		&self.bundle.config
	}

	/// Token cache backing this application.
	pub fn cache(&self) -> &Arc<TokenCache> {
		&self.bundle.cache
	}

	/// Accounts cached for this application's authority host.
	pub fn accounts(&self) -> Vec<Account> {
		let environment = self.bundle.config.authority.environment();

		self.bundle
			.cache
			.accounts()
			.into_iter()
			.filter(|account| account.environment == environment)
			.collect()
	}

	/// Signs `account` out of the cache; returns how many records were removed.
	pub fn remove_account(&self, account: &Account) -> usize {
		self.bundle.cache.remove_account(account)
	}
}
#[cfg(feature = "reqwest")]
impl ClientApplication<ReqwestHttpClient> {
	/// Creates an in-memory application with its own reqwest transport.
	pub fn new(config: ApplicationConfig) -> Result<Self> {
		Self::with_persistence(config, Arc::new(NoopPersistence))
	}

	/// Creates an application whose cache is loaded from and flushed to `persistence`.
	pub fn with_persistence(
		config: ApplicationConfig,
		persistence: Arc<dyn CachePersistence>,
	) -> Result<Self> {
		let http_client = ReqwestHttpClient::new()?;

		Ok(Self::from_bundle(ServiceBundle::initialize(config, http_client, persistence)))
	}
}
impl<C> Clone for ClientApplication<C>
where
	C: ?Sized + TokenHttpClient,
{
	fn clone(&self) -> Self {
		Self {
			refresh_metrics: self.refresh_metrics.clone(),
			bundle: self.bundle.clone(),
			flow_guards: self.flow_guards.clone(),
		}
	}
}
impl<C> Debug for ClientApplication<C>
where
	C: ?Sized + TokenHttpClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientApplication")
			.field("client_id", &self.bundle.config.client_id)
			.field("authority", &self.bundle.config.authority)
			.field("confidential", &self.bundle.config.is_confidential())
			.finish()
	}
}
