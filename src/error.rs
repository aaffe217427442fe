//! Error taxonomy shared by the cache, the grant handlers, and the transport layer.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn StdError + Send + Sync>;

/// Service error codes that mean the caller must fall back to an interactive flow.
pub const SILENT_AUTH_FAILURE_CODES: [&str; 3] =
	["invalid_grant", "interaction_required", "consent_required"];

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local input or response-shape problem; never retried.
	#[error(transparent)]
	Client(#[from] ClientError),
	/// Token endpoint returned a structured OAuth error.
	#[error(transparent)]
	Service(#[from] ServiceError),
	/// Silent acquisition cannot complete without user interaction.
	#[error("Silent authentication is unavailable: {reason}.")]
	SilentAuthUnavailable {
		/// Short description of why silent acquisition stopped.
		reason: String,
		/// Service payload that triggered the fallback, when one was returned.
		service: Option<Box<ServiceError>>,
	},
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Cache persistence or serialization failure.
	#[error(transparent)]
	Cache(#[from] CacheError),
	/// Caller cancelled the operation.
	#[error("Operation was cancelled.")]
	Cancelled,
}
impl Error {
	/// Builds [`Error::SilentAuthUnavailable`] without a service payload.
	pub fn silent_unavailable(reason: impl Into<String>) -> Self {
		Self::SilentAuthUnavailable { reason: reason.into(), service: None }
	}

	/// Returns the service payload carried by this error, if any.
	pub fn service_error(&self) -> Option<&ServiceError> {
		match self {
			Self::Service(e) => Some(e),
			Self::SilentAuthUnavailable { service: Some(e), .. } => Some(e),
			_ => None,
		}
	}
}
impl From<crate::auth::ScopeValidationError> for Error {
	fn from(e: crate::auth::ScopeValidationError) -> Self {
		Self::Client(e.into())
	}
}
impl From<crate::cache::KeyError> for Error {
	fn from(e: crate::cache::KeyError) -> Self {
		Self::Client(e.into())
	}
}
impl From<crate::authority::AuthorityError> for Error {
	fn from(e: crate::authority::AuthorityError) -> Self {
		Self::Client(e.into())
	}
}
impl From<crate::credential::CredentialError> for Error {
	fn from(e: crate::credential::CredentialError) -> Self {
		Self::Client(e.into())
	}
}

/// Malformed input or unparseable responses detected on the client side.
#[derive(Debug, ThisError)]
pub enum ClientError {
	/// Caller-supplied parameter collides with a parameter the library sets itself.
	#[error("Extra parameter `{name}` duplicates a standard request parameter.")]
	DuplicateQueryParameter {
		/// Colliding parameter name.
		name: String,
	},
	/// Request scopes cannot be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// Cache key construction rejected its input.
	#[error("Cache key cannot be built.")]
	InvalidKey(#[from] crate::cache::KeyError),
	/// Authority URL is malformed.
	#[error("Authority is invalid.")]
	InvalidAuthority(#[from] crate::authority::AuthorityError),
	/// Client credential could not contribute its parameters.
	#[error("Client credential is unusable.")]
	Credential(#[from] crate::credential::CredentialError),
	/// Application configuration is incomplete or contradictory.
	#[error("Application configuration is invalid: {reason}.")]
	InvalidConfig {
		/// Validation failure summary.
		reason: String,
	},
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Response body is JSON but does not match the expected shape.
	#[error("Endpoint returned malformed JSON.")]
	ResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Response body is not JSON at all.
	#[error("Endpoint returned a non-JSON body with status {status}.")]
	NonJsonResponse {
		/// HTTP status code.
		status: u16,
	},
	/// Successful response omitted a required field.
	#[error("Response is missing the `{field}` field.")]
	MissingField {
		/// Absent field name.
		field: &'static str,
	},
	/// Token endpoint returned an `expires_in` that cannot be represented.
	#[error("The expires_in value is outside the supported range.")]
	ExpiresInOutOfRange,
	/// `client_info` could not be decoded.
	#[error("client_info is malformed: {reason}.")]
	InvalidClientInfo {
		/// Decoding failure summary.
		reason: String,
	},
	/// ID token could not be decoded.
	#[error("ID token is malformed: {reason}.")]
	InvalidIdToken {
		/// Decoding failure summary.
		reason: String,
	},
	/// Authorization response `state` differs from the one issued.
	#[error("Authorization response state does not match the issued state.")]
	StateMismatch,
	/// Flow requires a confidential client credential.
	#[error("The {flow} flow requires a client credential.")]
	ConfidentialClientRequired {
		/// Flow label.
		flow: &'static str,
	},
}
impl ClientError {
	/// Wraps a transport's builder failure inside [`ClientError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ClientError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Structured OAuth error returned by the token or device-code endpoint.
#[derive(Clone, Debug, Default, PartialEq, Eq, ThisError)]
#[error("Token endpoint returned `{error}`: {}", description.as_deref().unwrap_or("no description"))]
pub struct ServiceError {
	/// OAuth `error` code.
	pub error: String,
	/// `error_description`, if provided.
	pub description: Option<String>,
	/// Numeric `error_codes` array.
	pub error_codes: Vec<i64>,
	/// Claims challenge, if provided.
	pub claims: Option<String>,
	/// HTTP status of the response.
	pub status: Option<u16>,
	/// Correlation id echoed by the service.
	pub correlation_id: Option<String>,
	/// Retry-After hint captured by the transport.
	pub retry_after: Option<Duration>,
}
impl ServiceError {
	/// Creates a service error with only a code.
	pub fn new(error: impl Into<String>) -> Self {
		Self { error: error.into(), ..Default::default() }
	}

	/// Attaches an error description.
	pub fn with_description(mut self, description: impl Into<String>) -> Self {
		self.description = Some(description.into());

		self
	}

	/// Returns true when the code requires an interactive fallback.
	pub fn is_silent_auth_failure(&self) -> bool {
		SILENT_AUTH_FAILURE_CODES.contains(&self.error.as_str())
	}

	/// Converts the payload into [`Error`], recasting silent-auth failures.
	pub fn into_error(self) -> Error {
		if self.is_silent_auth_failure() {
			Error::SilentAuthUnavailable {
				reason: self.error.clone(),
				service: Some(Box::new(self)),
			}
		} else {
			Error::Service(self)
		}
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the identity provider.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the identity provider.")]
	Io(#[from] std::io::Error),
	/// Transport failed without a typed error.
	#[error("Transport failed: {message}.")]
	Other {
		/// Failure summary.
		message: String,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

/// Cache persistence and serialization failures.
#[derive(Debug, ThisError)]
pub enum CacheError {
	/// Cache state could not be (de)serialized.
	#[error("Cache state is not valid JSON.")]
	Serialization {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Cache state could not be encoded.
	#[error("Cache state could not be encoded.")]
	Encode(#[source] serde_json::Error),
	/// Persistence backend failed.
	#[error("Cache persistence failed: {message}.")]
	Backend {
		/// Backend failure summary.
		message: String,
	},
}
impl From<std::io::Error> for CacheError {
	fn from(e: std::io::Error) -> Self {
		Self::Backend { message: e.to_string() }
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn silent_codes_recast() {
		for code in SILENT_AUTH_FAILURE_CODES {
			let err = ServiceError::new(code).into_error();

			assert!(matches!(err, Error::SilentAuthUnavailable { .. }), "{code} should recast.");
			assert_eq!(err.service_error().map(|e| e.error.as_str()), Some(code));
		}

		let err = ServiceError::new("invalid_client").with_description("bad secret").into_error();

		assert!(matches!(err, Error::Service(_)));
		assert_eq!(err.to_string(), "Token endpoint returned `invalid_client`: bad secret");
	}
}
