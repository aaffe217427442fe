//! Hashing, randomness, and signing primitives injected through the service bundle.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};
// self
use crate::{_prelude::*, credential::CredentialError};

/// Signs client assertions with a certificate's private key.
///
/// Certificate stores and key material live outside this crate; implementations wrap them.
pub trait AssertionSigner
where
	Self: Send + Sync,
{
	/// Base64url SHA-1 thumbprint of the certificate, sent as `x5t`.
	fn thumbprint(&self) -> &str;

	/// Signs `message` with RSASSA-PKCS1-v1_5 over SHA-256.
	fn sign_rs256(&self, message: &[u8]) -> Result<Vec<u8>, CredentialError>;
}

/// Crypto boundary used by grant handlers.
pub trait CryptographyManager
where
	Self: Send + Sync,
{
	/// Base64url (no padding) SHA-256 digest of `input`.
	fn sha256_base64_url(&self, input: &str) -> String {
		URL_SAFE_NO_PAD.encode(Sha256::digest(input.as_bytes()))
	}

	/// Random alphanumeric string of `len` characters.
	fn random_string(&self, len: usize) -> String {
		rand::rng().sample_iter(Alphanumeric).take(len).map(char::from).collect()
	}

	/// Signs `message` through `signer`.
	fn sign_rs256(
		&self,
		signer: &dyn AssertionSigner,
		message: &[u8],
	) -> Result<Vec<u8>, CredentialError> {
		signer.sign_rs256(message)
	}
}

/// [`CryptographyManager`] backed by `sha2` and the thread-local RNG.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultCryptographyManager;
impl CryptographyManager for DefaultCryptographyManager {}
