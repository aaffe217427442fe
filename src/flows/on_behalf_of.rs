//! On-behalf-of grant for middle-tier services.
//!
//! Tokens are cached against a SHA-256 hash of the incoming assertion rather than an account,
//! so a repeated call carrying the same upstream token is served from the cache.

// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
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
	/// Exchanges `user_assertion` (the token the caller received) for a downstream token.
	pub async fn acquire_token_on_behalf_of(
		&self,
		user_assertion: impl Into<TokenSecret>,
		mut request: AcquireTokenRequest,
	) -> Result<AuthenticationResult> {
		const KIND: FlowKind = FlowKind::OnBehalfOf;

		let ctx = request.context(KIND, "acquire_token_on_behalf_of");
		let assertion = user_assertion.into();

		common::observe(KIND, &ctx, async {
			if !self.config().is_confidential() {
				return Err(ClientError::ConfidentialClientRequired { flow: KIND.as_str() }.into());
			}
			if assertion.is_empty() {
				return Err(ClientError::MissingField { field: "assertion" }.into());
			}

			request.account = None;

			let mut cache_request = self.cache_request(&request);

			cache_request.user_assertion_hash =
				Some(self.bundle().crypto.sha256_base64_url(assertion.expose()));

			let guard = common::flow_guard(self, &cache_request)?;
			let _singleflight = guard.lock().await;
			let cached = self.cached_access_token(&request, &cache_request)?;

			if let Some(item) = cached.as_ref().filter(|item| !item.is_extended_lifetime) {
				return Ok(self.cached_result(&ctx, item.clone(), None));
			}

			let grant = Grant::OnBehalfOf { assertion };
			let result = self.exchange_and_cache(&ctx, &request, &grant, &cache_request).await;

			self.fall_back_to_extended(&ctx, result, cached, None)
		})
		.await
	}
}
