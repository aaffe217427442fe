//! Refresh-token redemption.
//!
//! [`ClientApplication::acquire_token_by_refresh_token`] redeems a refresh token the caller
//! already holds (for example one migrated from another cache). Silent acquisition reuses the
//! same redemption path for cached refresh tokens. Every redemption updates
//! [`RefreshMetrics`]; a response without a new refresh token keeps the redeemed one.

mod metrics;

pub use metrics::RefreshMetrics;

// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	cache::CacheRequest,
	flows::{AcquireTokenRequest, AuthenticationResult, ClientApplication, common},
	http::TokenHttpClient,
	oauth::{Grant, RequestContext},
	obs::FlowKind,
};

impl<C> ClientApplication<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// Redeems `refresh_token` and caches the result.
	pub async fn acquire_token_by_refresh_token(
		&self,
		refresh_token: impl Into<TokenSecret>,
		request: AcquireTokenRequest,
	) -> Result<AuthenticationResult> {
		const KIND: FlowKind = FlowKind::RefreshToken;

		let ctx = request.context(KIND, "acquire_token_by_refresh_token");
		let refresh_token = refresh_token.into();

		common::observe(KIND, &ctx, async {
			let cache_request = self.cache_request(&request);

			self.redeem_refresh_token(&ctx, &request, refresh_token, cache_request).await
		})
		.await
	}

	pub(crate) async fn redeem_refresh_token(
		&self,
		ctx: &RequestContext,
		request: &AcquireTokenRequest,
		refresh_token: TokenSecret,
		mut cache_request: CacheRequest,
	) -> Result<AuthenticationResult> {
		self.refresh_metrics.record_attempt();

		cache_request.redeemed_refresh_token = Some(refresh_token.clone());

		let grant = Grant::RefreshToken { refresh_token };
		let result = self.exchange_and_cache(ctx, request, &grant, &cache_request).await;

		match &result {
			Ok(_) => self.refresh_metrics.record_success(),
			Err(e) => {
				tracing::debug!(error = %e, "Refresh token redemption failed.");
				self.refresh_metrics.record_failure();
			},
		}

		result
	}
}
