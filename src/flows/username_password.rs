//! Resource-owner password credentials grant.

// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	flows::{AcquireTokenRequest, AuthenticationResult, ClientApplication, common},
	http::TokenHttpClient,
	oauth::Grant,
	obs::FlowKind,
};

impl<C> ClientApplication<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// Signs `username` in with `password` and caches the issued tokens.
	pub async fn acquire_token_by_username_password(
		&self,
		username: impl Into<String>,
		password: impl Into<TokenSecret>,
		request: AcquireTokenRequest,
	) -> Result<AuthenticationResult> {
		const KIND: FlowKind = FlowKind::UsernamePassword;

		let ctx = request.context(KIND, "acquire_token_by_username_password");
		let grant = Grant::Password { username: username.into(), password: password.into() };

		common::observe(KIND, &ctx, async {
			let cache_request = self.cache_request(&request);

			self.exchange_and_cache(&ctx, &request, &grant, &cache_request).await
		})
		.await
	}
}
