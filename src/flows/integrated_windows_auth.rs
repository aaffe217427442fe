//! Integrated Windows auth, redeemed as a SAML bearer grant.
//!
//! Obtaining the assertion (WS-Trust against the federated IdP) is the caller's job; this
//! handler only redeems it.

// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	error::ClientError,
	flows::{AcquireTokenRequest, AuthenticationResult, ClientApplication, common},
	http::TokenHttpClient,
	oauth::{Grant, SamlVersion},
	obs::FlowKind,
};

impl<C> ClientApplication<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// Redeems a SAML assertion issued by the user's federated identity provider.
	pub async fn acquire_token_by_saml_assertion(
		&self,
		version: SamlVersion,
		assertion: impl Into<TokenSecret>,
		request: AcquireTokenRequest,
	) -> Result<AuthenticationResult> {
		const KIND: FlowKind = FlowKind::IntegratedWindowsAuth;

		let ctx = request.context(KIND, "acquire_token_by_saml_assertion");
		let assertion = assertion.into();

		common::observe(KIND, &ctx, async {
			if assertion.is_empty() {
				return Err(ClientError::MissingField { field: "assertion" }.into());
			}

			let cache_request = self.cache_request(&request);
			let grant = Grant::SamlBearer { version, assertion };

			self.exchange_and_cache(&ctx, &request, &grant, &cache_request).await
		})
		.await
	}
}
