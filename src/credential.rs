//! Client authentication attached to every token request.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::json;
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	crypto::{AssertionSigner, CryptographyManager},
	oauth::RequestParameters,
};

/// `client_assertion_type` for JWT client assertions.
pub const JWT_BEARER_ASSERTION_TYPE: &str =
	"urn:ietf:params:oauth:client-assertion-type:jwt-bearer";
/// Validity window of self-signed client assertions.
pub const CLIENT_ASSERTION_LIFETIME: Duration = Duration::minutes(10);

/// Errors raised while a credential contributes its parameters.
#[derive(Debug, ThisError)]
pub enum CredentialError {
	/// Secret or assertion is empty.
	#[error("Client credential value is empty.")]
	Empty,
	/// Signer failed.
	#[error("Client assertion signing failed: {reason}.")]
	Signing {
		/// Signer-supplied reason.
		reason: String,
	},
	/// Assertion header or claims could not be encoded.
	#[error("Client assertion could not be encoded.")]
	Encode(#[from] serde_json::Error),
}

/// Inputs for a self-signed client assertion.
#[derive(Clone, Copy, Debug)]
pub struct AssertionContext<'a> {
	/// Application id, used as issuer and subject.
	pub client_id: &'a str,
	/// Token endpoint, used as audience.
	pub audience: &'a Url,
	/// Signing time.
	pub now: OffsetDateTime,
}

/// How the application authenticates to the token endpoint.
#[derive(Clone, Default)]
pub enum ClientCredential {
	/// Public client.
	#[default]
	None,
	/// Shared secret sent as `client_secret`.
	Secret(TokenSecret),
	/// Certificate; a JWT assertion is signed for every request.
	Certificate(Arc<dyn AssertionSigner>),
	/// Caller-supplied assertion sent verbatim.
	Assertion(TokenSecret),
}
impl ClientCredential {
	/// Shared-secret credential.
	pub fn secret(secret: impl Into<String>) -> Self {
		Self::Secret(TokenSecret::new(secret))
	}

	/// Certificate credential.
	pub fn certificate(signer: impl 'static + AssertionSigner) -> Self {
		Self::Certificate(Arc::new(signer))
	}

	/// Pre-built assertion credential.
	pub fn assertion(assertion: impl Into<String>) -> Self {
		Self::Assertion(TokenSecret::new(assertion))
	}

	/// Returns true for confidential clients.
	pub fn is_confidential(&self) -> bool {
		!matches!(self, Self::None)
	}

	/// Adds `client_secret`, or `client_assertion` + `client_assertion_type`, to `params`.
	pub fn apply(
		&self,
		ctx: &AssertionContext,
		crypto: &dyn CryptographyManager,
		params: &mut RequestParameters,
	) -> Result<(), CredentialError> {
		match self {
			Self::None => {},
			Self::Secret(secret) => {
				if secret.is_empty() {
					return Err(CredentialError::Empty);
				}

				params.insert("client_secret", secret.expose());
			},
			Self::Certificate(signer) => {
				let assertion = sign_client_assertion(ctx, crypto, signer.as_ref())?;

				params.insert("client_assertion", assertion);
				params.insert("client_assertion_type", JWT_BEARER_ASSERTION_TYPE);
			},
			Self::Assertion(assertion) => {
				if assertion.is_empty() {
					return Err(CredentialError::Empty);
				}

				params.insert("client_assertion", assertion.expose());
				params.insert("client_assertion_type", JWT_BEARER_ASSERTION_TYPE);
			},
		}

		Ok(())
	}
}
impl Debug for ClientCredential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let kind = match self {
			Self::None => "None",
			Self::Secret(_) => "Secret",
			Self::Certificate(_) => "Certificate",
			Self::Assertion(_) => "Assertion",
		};

		f.debug_tuple("ClientCredential").field(&kind).finish()
	}
}

/// Builds and signs an RS256 client assertion JWT.
pub fn sign_client_assertion(
	ctx: &AssertionContext,
	crypto: &dyn CryptographyManager,
	signer: &dyn AssertionSigner,
) -> Result<String, CredentialError> {
	let nbf = ctx.now.unix_timestamp();
	let header = json!({ "alg": "RS256", "typ": "JWT", "x5t": signer.thumbprint() });
	let claims = json!({
		"aud": ctx.audience.as_str(),
		"iss": ctx.client_id,
		"sub": ctx.client_id,
		"nbf": nbf,
		"exp": nbf + CLIENT_ASSERTION_LIFETIME.whole_seconds(),
		"jti": uuid::Uuid::new_v4().to_string(),
	});
	let signing_input = format!(
		"{}.{}",
		URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
		URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?),
	);
	let signature = crypto.sign_rs256(signer, signing_input.as_bytes())?;

	Ok(format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature)))
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros::datetime;
	// self
	use super::*;
	use crate::crypto::DefaultCryptographyManager;

	struct EchoSigner;
	impl AssertionSigner for EchoSigner {
		fn thumbprint(&self) -> &str {
			"thumb"
		}

		fn sign_rs256(&self, message: &[u8]) -> Result<Vec<u8>, CredentialError> {
			Ok(message.len().to_be_bytes().to_vec())
		}
	}

	fn decode_segment(segment: &str) -> serde_json::Value {
		serde_json::from_slice(&URL_SAFE_NO_PAD.decode(segment).expect("Segment should decode."))
			.expect("Segment should be JSON.")
	}

	#[test]
	fn certificate_assertion_claims() {
		let audience = Url::parse("https://login.contoso.com/t/oauth2/v2.0/token")
			.expect("Audience fixture should parse.");
		let ctx = AssertionContext {
			client_id: "app",
			audience: &audience,
			now: datetime!(2025-01-01 00:00 UTC),
		};
		let mut params = RequestParameters::default();

		ClientCredential::certificate(EchoSigner)
			.apply(&ctx, &DefaultCryptographyManager, &mut params)
			.expect("Certificate credential should apply.");

		assert_eq!(params.get("client_assertion_type"), Some(JWT_BEARER_ASSERTION_TYPE));

		let assertion = params.get("client_assertion").expect("Assertion should be present.");
		let segments = assertion.split('.').collect::<Vec<_>>();

		assert_eq!(segments.len(), 3);

		let header = decode_segment(segments[0]);
		let claims = decode_segment(segments[1]);

		assert_eq!(header["alg"], "RS256");
		assert_eq!(header["x5t"], "thumb");
		assert_eq!(claims["aud"], audience.as_str());
		assert_eq!(claims["iss"], "app");
		assert_eq!(claims["sub"], "app");
		assert_eq!(
			claims["exp"].as_i64().expect("exp should be numeric")
				- claims["nbf"].as_i64().expect("nbf should be numeric"),
			600
		);
		assert!(
			uuid::Uuid::parse_str(claims["jti"].as_str().expect("jti should be a string")).is_ok()
		);
	}

	#[test]
	fn secret_and_public_variants() {
		let audience = Url::parse("https://login.contoso.com/t/").expect("URL should parse.");
		let ctx = AssertionContext {
			client_id: "app",
			audience: &audience,
			now: OffsetDateTime::UNIX_EPOCH,
		};
		let mut params = RequestParameters::default();

		ClientCredential::None
			.apply(&ctx, &DefaultCryptographyManager, &mut params)
			.expect("Public client should apply.");

		assert!(params.get("client_secret").is_none());

		ClientCredential::secret("s3cr3t")
			.apply(&ctx, &DefaultCryptographyManager, &mut params)
			.expect("Secret should apply.");

		assert_eq!(params.get("client_secret"), Some("s3cr3t"));
		assert!(matches!(
			ClientCredential::assertion("").apply(&ctx, &DefaultCryptographyManager, &mut params),
			Err(CredentialError::Empty)
		));
		assert_eq!(format!("{:?}", ClientCredential::secret("x")), "ClientCredential(\"Secret\")");
	}
}
