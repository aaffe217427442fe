//! Client credentials grant with caching + single-flight guards.
//!
//! App-only tokens are cached without a home account id, so every caller of the same
//! application, tenant, and scope set shares one cached token. Concurrent callers wait on the
//! same guard instead of stampeding the token endpoint.

// self
use crate::{
	_prelude::*,
	error::ClientError,
	flows::{AcquireTokenRequest, AuthenticationResult, ClientApplication, common},
	http::TokenHttpClient,
	oauth::Grant,
	obs::FlowKind,
};

impl<C> ClientApplication<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// Acquires an app-only token, serving it from the cache while it is fresh.
	pub async fn acquire_token_for_client(
		&self,
		mut request: AcquireTokenRequest,
	) -> Result<AuthenticationResult> {
		const KIND: FlowKind = FlowKind::ClientCredentials;

		let ctx = request.context(KIND, "acquire_token_for_client");

		common::observe(KIND, &ctx, async {
			if !self.config().is_confidential() {
				return Err(ClientError::ConfidentialClientRequired { flow: KIND.as_str() }.into());
			}

			request.account = None;

			let cache_request = self.cache_request(&request);
			let guard = common::flow_guard(self, &cache_request)?;
			let _singleflight = guard.lock().await;
			let cached = self.cached_access_token(&request, &cache_request)?;

			if let Some(item) = cached.as_ref().filter(|item| !item.is_extended_lifetime) {
				return Ok(self.cached_result(&ctx, item.clone(), None));
			}

			let result = self
				.exchange_and_cache(&ctx, &request, &Grant::ClientCredentials, &cache_request)
				.await;

			self.fall_back_to_extended(&ctx, result, cached, None)
		})
		.await
	}
}
