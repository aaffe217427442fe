// self
use crate::{
	_prelude::*,
	crypto::CryptographyManager,
	error::ClientError,
	flows::AcquireTokenRequest,
};

const STATE_LEN: usize = 32;
const PKCE_VERIFIER_LEN: usize = 64;

/// Supported PKCE challenge methods surfaced via [`AuthorizationSession`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PkceCodeChallengeMethod {
	/// SHA-256 based PKCE (RFC 7636 S256).
	S256,
}
impl PkceCodeChallengeMethod {
	/// Returns the RFC 7636 identifier for the challenge method.
	pub fn as_str(self) -> &'static str {
		match self {
			PkceCodeChallengeMethod::S256 => "S256",
		}
	}
}

/// Authorization Code + PKCE handshake state returned by
/// [`start_authorization`](crate::flows::ClientApplication::start_authorization).
#[derive(Clone)]
pub struct AuthorizationSession {
	/// Opaque state value that must round-trip via the redirect handler.
	pub state: String,
	/// Redirect URI supplied when constructing the authorize URL.
	pub redirect_uri: Url,
	/// Fully-formed HTTPS authorize URL that callers should send end-users to.
	pub authorize_url: Url,
	request: AcquireTokenRequest,
	pkce: PkcePair,
}
impl AuthorizationSession {
	pub(super) fn new(
		request: AcquireTokenRequest,
		redirect_uri: Url,
		authorize_url: Url,
		state: String,
		pkce: PkcePair,
	) -> Self {
		Self { state, redirect_uri, authorize_url, request, pkce }
	}

	/// Request the session was started with; its scopes and options apply to the exchange.
	pub fn request(&self) -> &AcquireTokenRequest {
		&self.request
	}

	/// PKCE code challenge derived from the secret verifier.
	pub fn code_challenge(&self) -> &str {
		&self.pkce.challenge
	}

	/// PKCE challenge method (currently always `S256`).
	pub fn code_challenge_method(&self) -> PkceCodeChallengeMethod {
		self.pkce.method
	}

	/// Validates the returned `state` parameter after the authorization redirect.
	pub fn validate_state(&self, returned_state: &str) -> Result<(), ClientError> {
		if returned_state == self.state { Ok(()) } else { Err(ClientError::StateMismatch) }
	}

	pub(super) fn into_exchange_parts(self) -> (AcquireTokenRequest, Url, String) {
		let AuthorizationSession { request, redirect_uri, pkce, .. } = self;

		(request, redirect_uri, pkce.verifier)
	}
}
impl Debug for AuthorizationSession {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthorizationSession")
			.field("scopes", &self.request.scopes)
			.field("state", &self.state)
			.field("redirect_uri", &self.redirect_uri)
			.field("authorize_url", &self.authorize_url)
			.field("code_challenge", &self.pkce.challenge)
			.field("code_challenge_method", &self.pkce.method)
			.finish()
	}
}

#[derive(Clone)]
pub(super) struct PkcePair {
	verifier: String,
	challenge: String,
	method: PkceCodeChallengeMethod,
}
impl PkcePair {
	pub(super) fn generate(crypto: &dyn CryptographyManager) -> Self {
		let verifier = crypto.random_string(PKCE_VERIFIER_LEN);
		let challenge = crypto.sha256_base64_url(&verifier);

		Self { verifier, challenge, method: PkceCodeChallengeMethod::S256 }
	}

	pub(super) fn challenge(&self) -> &str {
		&self.challenge
	}

	pub(super) fn method(&self) -> PkceCodeChallengeMethod {
		self.method
	}
}

pub(super) fn generate_state(crypto: &dyn CryptographyManager) -> String {
	crypto.random_string(STATE_LEN)
}
