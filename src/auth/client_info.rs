//! `client_info` decoding and home-account identifiers.

// self
use crate::{_prelude::*, auth::decode_base64_url, error::ClientError};

/// Decoded `client_info` payload returned when requests carry `client_info=1`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ClientInfo {
	/// Unique user id within the home tenant.
	pub uid: String,
	/// Home tenant id.
	pub utid: String,
}
impl ClientInfo {
	/// Decodes a base64url-encoded JSON `client_info` string.
	pub fn decode(raw: &str) -> Result<Self, ClientError> {
		let bytes = decode_base64_url(raw)
			.map_err(|e| ClientError::InvalidClientInfo { reason: e.to_string() })?;

		serde_json::from_slice(&bytes)
			.map_err(|e| ClientError::InvalidClientInfo { reason: e.to_string() })
	}

	/// Home account identifier in the `uid.utid` form.
	pub fn home_account_id(&self) -> String {
		format!("{}.{}", self.uid, self.utid)
	}
}
