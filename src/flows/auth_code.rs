//! Authorization Code + PKCE flow.
//!
//! [`ClientApplication::start_authorization`] builds the authorize URL (decorated scopes,
//! `state`, S256 challenge) and returns an [`AuthorizationSession`] the caller keeps until the
//! redirect arrives. [`ClientApplication::acquire_token_by_authorization_code`] validates the
//! returned state, redeems the code with the session's verifier, and caches the result.

mod session;

pub use session::*;

// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	error::ClientError,
	flows::{AcquireTokenRequest, AuthenticationResult, ClientApplication, common},
	http::TokenHttpClient,
	oauth::{Grant, RequestParameters},
	obs::FlowKind,
};

impl<C> ClientApplication<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// Builds the authorize URL and PKCE state for an interactive sign-in.
	///
	/// The request's account, when present, is sent as `login_hint`. With endpoint discovery
	/// enabled the authorize endpoint comes from the authority's OpenID configuration.
	pub async fn start_authorization(
		&self,
		request: AcquireTokenRequest,
	) -> Result<AuthorizationSession> {
		let config = self.config();
		let redirect_uri = config.redirect_uri.clone().ok_or_else(|| ClientError::InvalidConfig {
			reason: "the authorization code flow requires a redirect URI".into(),
		})?;
		let crypto = self.bundle().crypto.as_ref();
		let state = session::generate_state(crypto);
		let pkce = PkcePair::generate(crypto);
		let mut params = RequestParameters::default();

		params.insert("client_id", config.client_id.as_str());
		params.insert("response_type", "code");
		params.insert("redirect_uri", redirect_uri.as_str());
		params.insert("scope", request.scopes.decorated().normalized());
		params.insert("state", state.as_str());
		params.insert("code_challenge", pkce.challenge());
		params.insert("code_challenge_method", pkce.method().as_str());
		params.insert("client_info", "1");

		if let Some(username) =
			request.account.as_ref().and_then(|account| account.username.as_deref())
		{
			params.insert("login_hint", username);
		}
		if let Some(claims) = &request.claims {
			params.insert("claims", claims.as_str());
		}

		params.extend_extra(&request.extra_parameters)?;

		let ctx = request.context(FlowKind::AuthorizationCode, "start_authorization");
		let mut authorize_url = self.endpoints(&ctx).await?.authorize;

		params.append_to(&mut authorize_url);

		Ok(AuthorizationSession::new(request, redirect_uri, authorize_url, state, pkce))
	}

	/// Redeems the authorization `code` returned to the redirect URI.
	pub async fn acquire_token_by_authorization_code(
		&self,
		session: AuthorizationSession,
		code: impl Into<TokenSecret>,
		returned_state: &str,
	) -> Result<AuthenticationResult> {
		const KIND: FlowKind = FlowKind::AuthorizationCode;

		session.validate_state(returned_state)?;

		let (request, redirect_uri, verifier) = session.into_exchange_parts();
		let ctx = request.context(KIND, "acquire_token_by_authorization_code");
		let grant = Grant::AuthorizationCode {
			code: code.into(),
			redirect_uri,
			code_verifier: Some(TokenSecret::new(verifier)),
		};

		common::observe(KIND, &ctx, async {
			let cache_request = self.cache_request(&request);

			self.exchange_and_cache(&ctx, &request, &grant, &cache_request).await
		})
		.await
	}
}
