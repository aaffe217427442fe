//! Token-endpoint client: request building, dispatch, and response classification.
//!
//! Requests are plain `oauth2::HttpRequest` values dispatched through a [`TokenHttpClient`]
//! handle, so any transport that already plugs into the `oauth2` crate works here too.

pub mod request;
pub mod response;

pub use request::*;
pub use response::*;

// crates.io
use oauth2::{
	AsyncHttpClient, HttpClientError, HttpRequest,
	http::{
		Method, Request,
		header::{ACCEPT, CONTENT_TYPE},
	},
};
use serde::de::DeserializeOwned;
use uuid::Uuid;
// self
use crate::{
	_prelude::*,
	error::{ClientError, TransportError},
	http::{ResponseMetadataSlot, TokenHttpClient},
	obs::{FlowKind, FlowSpan},
};

/// Lifecycle of one endpoint call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandlerState {
	/// Call created.
	Created,
	/// HTTP request assembled.
	RequestBuilt,
	/// Request handed to the transport.
	Sent,
	/// Transport returned a response.
	ResponseReceived,
	/// Response parsed into a success payload.
	Success,
	/// Response carried an OAuth error.
	ServiceError,
	/// Request or response failed local validation.
	ClientError,
}
impl HandlerState {
	/// Stable label for logs.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Created => "created",
			Self::RequestBuilt => "request_built",
			Self::Sent => "sent",
			Self::ResponseReceived => "response_received",
			Self::Success => "success",
			Self::ServiceError => "service_error",
			Self::ClientError => "client_error",
		}
	}

	/// Returns true when `next` is a legal successor.
	pub const fn can_advance_to(self, next: Self) -> bool {
		matches!(
			(self, next),
			(Self::Created, Self::RequestBuilt)
				| (Self::Created, Self::ClientError)
				| (Self::RequestBuilt, Self::Sent)
				| (Self::RequestBuilt, Self::ClientError)
				| (Self::Sent, Self::ResponseReceived)
				| (Self::ResponseReceived, Self::Success)
				| (Self::ResponseReceived, Self::ServiceError)
				| (Self::ResponseReceived, Self::ClientError)
		)
	}

	/// Returns true for terminal states.
	pub const fn is_terminal(self) -> bool {
		matches!(self, Self::Success | Self::ServiceError | Self::ClientError)
	}
}
impl Display for HandlerState {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Per-acquisition context threaded through every handler.
#[derive(Clone, Debug)]
pub struct RequestContext {
	/// Correlation id sent as `client-request-id`.
	pub correlation_id: Uuid,
	/// Span covering the acquisition.
	pub span: FlowSpan,
	/// Cancellation signal for network waits and polling delays.
	pub cancellation: CancellationToken,
}
impl RequestContext {
	/// Creates a context with a fresh correlation id.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		let correlation_id = Uuid::new_v4();

		Self {
			correlation_id,
			span: FlowSpan::new(kind, stage, correlation_id),
			cancellation: CancellationToken::new(),
		}
	}

	/// Replaces the correlation id.
	pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
		self.correlation_id = correlation_id;
		self.span.record_correlation_id(correlation_id);

		self
	}

	/// Replaces the cancellation signal.
	pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
		self.cancellation = cancellation;

		self
	}
}

/// HTTP verb used for an endpoint call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndpointMethod {
	/// Parameters in an urlencoded body.
	Post,
	/// Parameters in the query string.
	Get,
}

/// Library identification sent with every request.
#[derive(Clone, Debug)]
pub struct ClientIdentity {
	/// SKU (`x-client-SKU`).
	pub sku: String,
	/// Version (`x-client-Ver`).
	pub version: String,
}

/// Executes endpoint calls over a [`TokenHttpClient`].
pub struct OAuth2Client<C>
where
	C: ?Sized + TokenHttpClient,
{
	http: Arc<C>,
	identity: ClientIdentity,
}
impl<C> OAuth2Client<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// Wraps a transport.
	pub fn new(http: Arc<C>, identity: ClientIdentity) -> Self {
		Self { http, identity }
	}

	/// Calls the token endpoint and returns the parsed token response.
	///
	/// Silent-auth error codes surface as [`Error::SilentAuthUnavailable`].
	pub async fn request_token(
		&self,
		ctx: &RequestContext,
		endpoint: &Url,
		params: &RequestParameters,
	) -> Result<TokenResponse> {
		match self.call(ctx, EndpointMethod::Post, endpoint, params).await? {
			EndpointReply::Success(response) => Ok(response),
			EndpointReply::Service(error) => Err(error.into_error()),
		}
	}

	/// Calls an endpoint and returns the unclassified reply.
	pub async fn call<T>(
		&self,
		ctx: &RequestContext,
		method: EndpointMethod,
		endpoint: &Url,
		params: &RequestParameters,
	) -> Result<EndpointReply<T>>
	where
		T: DeserializeOwned,
	{
		let mut state = HandlerState::Created;
		let request = match self.build(ctx, method, endpoint, params) {
			Ok(request) => request,
			Err(e) => {
				advance(&mut state, HandlerState::ClientError);

				return Err(e.into());
			},
		};

		advance(&mut state, HandlerState::RequestBuilt);

		let slot = ResponseMetadataSlot::default();
		let handle = self.http.with_metadata(slot.clone());

		advance(&mut state, HandlerState::Sent);

		let outcome = tokio::select! {
			biased;
			_ = ctx.cancellation.cancelled() => return Err(Error::Cancelled),
			outcome = handle.call(request) => outcome,
		};
		let response = outcome.map_err(map_http_client_error)?;
		let metadata = slot.take().unwrap_or_default();
		let status = metadata.status.unwrap_or_else(|| response.status().as_u16());

		advance(&mut state, HandlerState::ResponseReceived);

		match parse_reply::<T>(status, response.body()) {
			Ok(EndpointReply::Success(payload)) => {
				advance(&mut state, HandlerState::Success);

				Ok(EndpointReply::Success(payload))
			},
			Ok(EndpointReply::Service(mut error)) => {
				advance(&mut state, HandlerState::ServiceError);

				error.retry_after = metadata.retry_after;

				if error.correlation_id.is_none() {
					error.correlation_id = metadata.correlation_id;
				}

				tracing::debug!(error = %error.error, status, "Endpoint returned an OAuth error.");

				Ok(EndpointReply::Service(error))
			},
			Err(e) => {
				advance(&mut state, HandlerState::ClientError);

				Err(e.into())
			},
		}
	}

	fn build(
		&self,
		ctx: &RequestContext,
		method: EndpointMethod,
		endpoint: &Url,
		params: &RequestParameters,
	) -> Result<HttpRequest, ClientError> {
		let builder = Request::builder()
			.header(ACCEPT, "application/json")
			.header("client-request-id", ctx.correlation_id.to_string())
			.header("return-client-request-id", "true")
			.header("x-client-SKU", self.identity.sku.as_str())
			.header("x-client-Ver", self.identity.version.as_str());
		let request = match method {
			EndpointMethod::Post => builder
				.method(Method::POST)
				.uri(endpoint.as_str())
				.header(CONTENT_TYPE, "application/x-www-form-urlencoded")
				.body(params.to_form_body().into_bytes())?,
			EndpointMethod::Get => {
				let mut url = endpoint.clone();

				params.append_to(&mut url);

				builder.method(Method::GET).uri(url.as_str()).body(Vec::new())?
			},
		};

		Ok(request)
	}
}

fn advance(state: &mut HandlerState, next: HandlerState) {
	debug_assert!(state.can_advance_to(next), "illegal transition {state} -> {next}");
	tracing::trace!(from = state.as_str(), to = next.as_str(), "Handler state changed.");

	*state = next;
}

/// Maps transport failures into [`Error`].
pub fn map_http_client_error<E>(error: HttpClientError<E>) -> Error
where
	E: 'static + Send + Sync + StdError,
{
	match error {
		HttpClientError::Reqwest(inner) => TransportError::network(*inner).into(),
		HttpClientError::Http(inner) => ClientError::from(inner).into(),
		HttpClientError::Io(inner) => TransportError::Io(inner).into(),
		HttpClientError::Other(message) => TransportError::Other { message }.into(),
		_ => TransportError::Other { message: "unknown transport failure".into() }.into(),
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn handler_states_follow_the_lifecycle() {
		let path = [
			HandlerState::Created,
			HandlerState::RequestBuilt,
			HandlerState::Sent,
			HandlerState::ResponseReceived,
			HandlerState::Success,
		];

		assert!(path.windows(2).all(|w| w[0].can_advance_to(w[1])));
		assert!(!HandlerState::Created.can_advance_to(HandlerState::Sent));
		assert!(!HandlerState::Success.can_advance_to(HandlerState::Created));
		assert!(HandlerState::ServiceError.is_terminal());
		assert!(!HandlerState::Sent.is_terminal());
	}

	#[test]
	fn transport_errors_are_classified() {
		let err = map_http_client_error::<std::io::Error>(HttpClientError::Other("reset".into()));

		assert!(matches!(err, Error::Transport(TransportError::Other { .. })));

		let err = map_http_client_error::<std::io::Error>(HttpClientError::Reqwest(Box::new(
			std::io::Error::other("dns"),
		)));

		assert!(matches!(err, Error::Transport(TransportError::Network { .. })));
	}
}
