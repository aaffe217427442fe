//! OAuth 2.0 / OIDC token client for Azure AD-compatible authorities: grant handlers, a normalized
//! multi-credential token cache, and pluggable transport + persistence boundaries.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod authority;
pub mod cache;
pub mod config;
pub mod credential;
pub mod crypto;
pub mod error;
pub mod flows;
pub mod http;
pub mod oauth;
pub mod obs;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// std
	use std::collections::VecDeque;
	// crates.io
	use oauth2::{AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse, http::StatusCode};
	// self
	use crate::{
		authority::Authority,
		cache::{MemoryPersistence, TokenCache},
		config::{ApplicationConfig, ServiceBundle},
		credential::ClientCredential,
		flows::ClientApplication,
		http::{ReqwestHttpClient, ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
	};

	/// Client application alias used by reqwest-backed integration tests.
	pub type ReqwestTestApplication = ClientApplication<ReqwestHttpClient>;

	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	/// Builds an [`ApplicationConfig`] for the provided authority URL and credential.
	pub fn test_config(
		authority: &str,
		client_id: &str,
		credential: ClientCredential,
	) -> ApplicationConfig {
		let authority = Authority::parse(authority).expect("Test authority should parse.");

		ApplicationConfig::builder(client_id, authority)
			.client_credential(credential)
			.build()
			.expect("Test application config should build.")
	}

	/// Constructs a [`ClientApplication`] backed by an in-memory persistence adapter and the
	/// reqwest transport used across integration tests.
	pub fn build_reqwest_test_application(
		config: ApplicationConfig,
	) -> (ReqwestTestApplication, Arc<MemoryPersistence>) {
		let persistence = Arc::new(MemoryPersistence::default());
		let bundle =
			ServiceBundle::initialize(config, test_reqwest_http_client(), persistence.clone());

		(ClientApplication::from_bundle(bundle), persistence)
	}

	/// Constructs a [`ClientApplication`] over a [`ScriptedHttpClient`].
	pub fn build_scripted_application(
		config: ApplicationConfig,
		http: ScriptedHttpClient,
	) -> (ClientApplication<ScriptedHttpClient>, Arc<TokenCache>) {
		let bundle =
			ServiceBundle::initialize(config, http, Arc::new(MemoryPersistence::default()));
		let cache = bundle.cache.clone();

		(ClientApplication::from_bundle(bundle), cache)
	}

	/// Transport failure raised by [`ScriptedHttpClient`] once its script is exhausted.
	#[derive(Debug)]
	pub struct ScriptExhausted;
	impl Display for ScriptExhausted {
		fn fmt(&self, f: &mut Formatter) -> FmtResult {
			f.write_str("Scripted transport has no responses left.")
		}
	}
	impl StdError for ScriptExhausted {}

	/// Request captured by [`ScriptedHttpClient`].
	#[derive(Clone, Debug)]
	pub struct RecordedRequest {
		/// HTTP method.
		pub method: String,
		/// Full request URL, including the query string.
		pub url: String,
		/// Request body decoded as UTF-8.
		pub body: String,
	}
	impl RecordedRequest {
		/// Returns the decoded form value for `name`, searching the body then the query string.
		pub fn param(&self, name: &str) -> Option<String> {
			let query = self.url.split_once('?').map(|(_, query)| query).unwrap_or_default();

			url::form_urlencoded::parse(self.body.as_bytes())
				.chain(url::form_urlencoded::parse(query.as_bytes()))
				.find(|(key, _)| key == name)
				.map(|(_, value)| value.into_owned())
		}
	}

	/// Transport that replays canned `(status, body)` pairs in order and records every request.
	#[derive(Clone, Default)]
	pub struct ScriptedHttpClient {
		responses: Arc<Mutex<VecDeque<(u16, String)>>>,
		requests: Arc<Mutex<Vec<RecordedRequest>>>,
	}
	impl ScriptedHttpClient {
		/// Appends a response to the script.
		pub fn push(&self, status: u16, body: impl Into<String>) -> &Self {
			self.responses.lock().push_back((status, body.into()));

			self
		}

		/// Returns every request observed so far.
		pub fn requests(&self) -> Vec<RecordedRequest> {
			self.requests.lock().clone()
		}
	}
	impl TokenHttpClient for ScriptedHttpClient {
		type Handle = ScriptedHandle;
		type TransportError = ScriptExhausted;

		fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
			ScriptedHandle { client: self.clone(), slot }
		}
	}

	/// Per-request handle produced by [`ScriptedHttpClient`].
	pub struct ScriptedHandle {
		client: ScriptedHttpClient,
		slot: ResponseMetadataSlot,
	}
	impl<'c> AsyncHttpClient<'c> for ScriptedHandle {
		type Error = HttpClientError<ScriptExhausted>;
		type Future =
			Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

		fn call(&'c self, request: HttpRequest) -> Self::Future {
			Box::pin(async move {
				self.slot.take();
				self.client.requests.lock().push(RecordedRequest {
					method: request.method().to_string(),
					url: request.uri().to_string(),
					body: String::from_utf8_lossy(request.body()).into_owned(),
				});

				let (status, body) = self
					.client
					.responses
					.lock()
					.pop_front()
					.ok_or_else(|| HttpClientError::Reqwest(Box::new(ScriptExhausted)))?;

				self.slot.store(ResponseMetadata { status: Some(status), ..Default::default() });

				let mut response = HttpResponse::new(body.into_bytes());

				*response.status_mut() = StatusCode::from_u16(status)
					.map_err(|e| HttpClientError::Other(e.to_string()))?;

				Ok(response)
			})
		}
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, BTreeSet, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		hash::{Hash, Hasher},
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use tokio_util::sync::CancellationToken;
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use {tokio_util, url};
#[cfg(all(test, feature = "reqwest"))] use {color_eyre as _, httpmock as _};
