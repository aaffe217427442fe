//! Auth-domain values: scope sets, redacted secrets, accounts, and decoded identity claims.

pub mod account;
pub mod client_info;
pub mod id_token;
pub mod scope;
pub mod secret;

pub use account::*;
pub use client_info::*;
pub use id_token::*;
pub use scope::*;
pub use secret::*;

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};

/// Decodes base64url input, tolerating trailing `=` padding.
pub(crate) fn decode_base64_url(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
	URL_SAFE_NO_PAD.decode(input.trim_end_matches('='))
}
