//! Silent acquisition: cache first, then the account's refresh token.
//!
//! A usable cached access token is returned without touching the network. Otherwise the
//! account's refresh token (or a family refresh token) is redeemed under the per-key
//! single-flight guard, so concurrent callers share one redemption. A rejected refresh token is
//! deleted and reported as [`Error::SilentAuthUnavailable`]. When extended lifetime is enabled
//! and the identity provider cannot be reached, a token inside its extended window is served.

// self
use crate::{
	_prelude::*,
	flows::{AcquireTokenRequest, AuthenticationResult, ClientApplication, common},
	http::TokenHttpClient,
	obs::FlowKind,
};

impl<C> ClientApplication<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// Returns a cached token for the request's account, refreshing it when needed.
	pub async fn acquire_token_silent(
		&self,
		request: AcquireTokenRequest,
	) -> Result<AuthenticationResult> {
		const KIND: FlowKind = FlowKind::Silent;

		let ctx = request.context(KIND, "acquire_token_silent");

		common::observe(KIND, &ctx, async {
			let account = request
				.account
				.clone()
				.ok_or_else(|| Error::silent_unavailable("no account was supplied"))?;
			let cache_request = self.cache_request(&request);
			let guard = common::flow_guard(self, &cache_request)?;
			let _singleflight = guard.lock().await;
			let cached = self.cached_access_token(&request, &cache_request)?;

			if let Some(item) = cached.as_ref().filter(|item| !item.is_extended_lifetime) {
				return Ok(self.cached_result(&ctx, item.clone(), Some(account)));
			}

			let Some(refresh) = self.bundle().cache.try_get_refresh_token(&cache_request)? else {
				return Err(Error::silent_unavailable("no refresh token is cached for the account"));
			};
			let result = self
				.redeem_refresh_token(&ctx, &request, refresh.secret.clone(), cache_request)
				.await;

			if result
				.as_ref()
				.err()
				.and_then(Error::service_error)
				.is_some_and(|e| e.error == "invalid_grant")
			{
				tracing::info!("Removing refresh token rejected by the identity provider.");
				self.bundle().cache.remove_refresh_token(&refresh)?;
			}

			self.fall_back_to_extended(&ctx, result, cached, Some(account))
		})
		.await
	}
}
