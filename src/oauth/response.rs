//! Token and device-code endpoint response parsing.

// crates.io
use serde::{Deserializer, de::DeserializeOwned};
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	error::{ClientError, ServiceError},
};

/// Error code reported when a non-success status carries no OAuth `error` field.
pub const HTTP_STATUS_NOT_OK: &str = "http_status_not_200";

/// Successful token endpoint payload.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct TokenResponse {
	/// Issued access token.
	pub access_token: TokenSecret,
	/// Token type, usually `Bearer`.
	#[serde(default)]
	pub token_type: Option<String>,
	/// Lifetime in seconds.
	#[serde(default, deserialize_with = "number_or_string")]
	pub expires_in: Option<i64>,
	/// Extended lifetime in seconds.
	#[serde(default, deserialize_with = "number_or_string")]
	pub ext_expires_in: Option<i64>,
	/// Issued refresh token.
	#[serde(default)]
	pub refresh_token: Option<TokenSecret>,
	/// Issued ID token.
	#[serde(default)]
	pub id_token: Option<TokenSecret>,
	/// Granted scopes, space-delimited.
	#[serde(default)]
	pub scope: Option<String>,
	/// Base64url `client_info`.
	#[serde(default)]
	pub client_info: Option<String>,
	/// Family id; `"1"` marks a family refresh token.
	#[serde(default)]
	pub foci: Option<String>,
}

/// Device authorization endpoint payload.
#[derive(Clone, Debug, Deserialize)]
pub struct DeviceCodeResponse {
	/// Code exchanged at the token endpoint.
	pub device_code: TokenSecret,
	/// Code the user types at the verification URL.
	pub user_code: String,
	/// Verification URL.
	#[serde(alias = "verification_url")]
	pub verification_uri: String,
	/// Lifetime of the codes in seconds.
	#[serde(default, deserialize_with = "number_or_string")]
	pub expires_in: Option<i64>,
	/// Minimum polling interval in seconds.
	#[serde(default, deserialize_with = "number_or_string")]
	pub interval: Option<i64>,
	/// Message to show the user.
	#[serde(default)]
	pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
	error: String,
	#[serde(default)]
	error_description: Option<String>,
	#[serde(default)]
	error_codes: Vec<i64>,
	#[serde(default)]
	claims: Option<String>,
	#[serde(default)]
	correlation_id: Option<String>,
}

/// Outcome of parsing an endpoint response before errors are classified.
#[derive(Debug)]
pub enum EndpointReply<T> {
	/// Success payload.
	Success(T),
	/// OAuth error payload.
	Service(ServiceError),
}

/// Parses a raw response into a success payload or a [`ServiceError`].
///
/// Bodies carrying an `error` string are always treated as service errors; other bodies are
/// parsed as `T` on success statuses. Non-JSON bodies and shape mismatches are client errors.
pub fn parse_reply<T>(status: u16, body: &[u8]) -> Result<EndpointReply<T>, ClientError>
where
	T: DeserializeOwned,
{
	let value = serde_json::from_slice::<Value>(body)
		.map_err(|_| ClientError::NonJsonResponse { status })?;

	if value.get("error").is_some_and(Value::is_string) {
		let payload = serde_path_to_error::deserialize::<_, ErrorResponse>(value)
			.map_err(|source| ClientError::ResponseParse { source, status: Some(status) })?;

		return Ok(EndpointReply::Service(ServiceError {
			error: payload.error,
			description: payload.error_description,
			error_codes: payload.error_codes,
			claims: payload.claims,
			status: Some(status),
			correlation_id: payload.correlation_id,
			retry_after: None,
		}));
	}
	if !(200..300).contains(&status) {
		return Ok(EndpointReply::Service(ServiceError {
			status: Some(status),
			..ServiceError::new(HTTP_STATUS_NOT_OK)
		}));
	}

	serde_path_to_error::deserialize(value)
		.map(EndpointReply::Success)
		.map_err(|source| ClientError::ResponseParse { source, status: Some(status) })
}

fn number_or_string<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
	D: Deserializer<'de>,
{
	use serde::de::Error as _;

	match Option::<Value>::deserialize(deserializer)? {
		None | Some(Value::Null) => Ok(None),
		Some(Value::Number(n)) =>
			n.as_i64().map(Some).ok_or_else(|| D::Error::custom("expected an integer")),
		Some(Value::String(s)) =>
			s.trim().parse().map(Some).map_err(|_| D::Error::custom("expected a numeric string")),
		Some(other) => Err(D::Error::custom(format!("expected a number, found {other}"))),
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn parse_token(status: u16, body: &str) -> Result<EndpointReply<TokenResponse>, ClientError> {
		parse_reply(status, body.as_bytes())
	}

	#[test]
	fn accepts_numeric_strings() {
		let reply = parse_token(
			200,
			r#"{"access_token":"at","token_type":"Bearer","expires_in":"3600","ext_expires_in":7200}"#,
		)
		.expect("Token response should parse.");
		let EndpointReply::Success(response) = reply else {
			panic!("Expected a success payload.");
		};

		assert_eq!(response.expires_in, Some(3600));
		assert_eq!(response.ext_expires_in, Some(7200));
		assert_eq!(response.access_token.expose(), "at");
	}

	#[test]
	fn error_bodies_become_service_errors() {
		let reply = parse_token(
			400,
			r#"{"error":"invalid_grant","error_description":"AADSTS70000","error_codes":[70000],"correlation_id":"c-1"}"#,
		)
		.expect("Error body should parse.");
		let EndpointReply::Service(error) = reply else {
			panic!("Expected a service error.");
		};

		assert_eq!(error.error, "invalid_grant");
		assert_eq!(error.error_codes, vec![70000]);
		assert_eq!(error.status, Some(400));
		assert_eq!(error.correlation_id.as_deref(), Some("c-1"));
	}

	#[test]
	fn malformed_bodies_are_client_errors() {
		assert!(matches!(
			parse_token(502, "<html>bad gateway</html>"),
			Err(ClientError::NonJsonResponse { status: 502 })
		));

		let err = parse_token(200, r#"{"token_type":"Bearer","expires_in":3600}"#)
			.expect_err("Missing access_token must fail.");

		assert!(matches!(err, ClientError::ResponseParse { .. }));
		assert!(matches!(
			parse_token(500, "{}"),
			Ok(EndpointReply::Service(ServiceError { status: Some(500), .. }))
		));
	}

	#[test]
	fn device_code_accepts_verification_url_alias() {
		let reply = parse_reply::<DeviceCodeResponse>(
			200,
			br#"{"device_code":"dc","user_code":"ABC","verification_url":"https://aka.ms/devicelogin","expires_in":900,"interval":"5"}"#,
		)
		.expect("Device code response should parse.");
		let EndpointReply::Success(response) = reply else {
			panic!("Expected a success payload.");
		};

		assert_eq!(response.verification_uri, "https://aka.ms/devicelogin");
		assert_eq!(response.interval, Some(5));
	}
}
