//! Device code flow.
//!
//! The device code is requested with a GET against the device authorization endpoint, handed
//! to the caller's callback for display, and then redeemed by polling the token endpoint. Each
//! poll waits at least `interval` seconds; `authorization_pending` keeps polling, `slow_down`
//! adds five seconds to the interval, and any other error ends the flow. Polling never runs past
//! the code's `expires_in`, and the cancellation signal interrupts both the waits and the
//! in-flight requests. Nothing is written to the cache until a poll succeeds.

// std
use std::time::Duration as StdDuration;
// crates.io
use tokio::time::Instant;
// self
use crate::{
	_prelude::*,
	error::{ClientError, ServiceError},
	flows::{AcquireTokenRequest, AuthenticationResult, ClientApplication, common},
	http::TokenHttpClient,
	oauth::{
		DeviceCodeResponse, EndpointMethod, EndpointReply, Grant, RequestParameters, TokenResponse,
	},
	obs::FlowKind,
};

/// Interval used when the device authorization response names none.
pub const DEFAULT_POLL_INTERVAL: StdDuration = StdDuration::from_secs(5);
/// Lifetime used when the device authorization response names none.
pub const DEFAULT_DEVICE_CODE_LIFETIME: StdDuration = StdDuration::from_secs(15 * 60);
/// Amount added to the polling interval on `slow_down`.
pub const SLOW_DOWN_INCREMENT: StdDuration = StdDuration::from_secs(5);

/// Returns the interval to wait before the next poll, or `None` when `error` ends the flow.
pub fn next_poll_interval(error: &str, interval: StdDuration) -> Option<StdDuration> {
	match error {
		"authorization_pending" => Some(interval),
		"slow_down" => Some(interval.saturating_add(SLOW_DOWN_INCREMENT)),
		_ => None,
	}
}

/// Validates the advertised `expires_in` and returns the code's lifetime.
///
/// Negative values yield an already expired code; values past the representable calendar are
/// rejected.
pub fn device_code_lifetime(expires_in: Option<i64>) -> Result<StdDuration, ClientError> {
	let Some(secs) = expires_in else {
		return Ok(DEFAULT_DEVICE_CODE_LIFETIME);
	};

	OffsetDateTime::now_utc()
		.checked_add(Duration::seconds(secs))
		.ok_or(ClientError::ExpiresInOutOfRange)?;

	Ok(StdDuration::from_secs(u64::try_from(secs).unwrap_or_default()))
}

impl<C> ClientApplication<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// Runs the device code flow, invoking `on_device_code` once the user code is known.
	pub async fn acquire_token_with_device_code<F>(
		&self,
		request: AcquireTokenRequest,
		on_device_code: F,
	) -> Result<AuthenticationResult>
	where
		F: FnOnce(&DeviceCodeResponse),
	{
		const KIND: FlowKind = FlowKind::DeviceCode;

		let ctx = request.context(KIND, "acquire_token_with_device_code");

		common::observe(KIND, &ctx, async {
			let endpoints = self.endpoints(&ctx).await?;
			let mut params = RequestParameters::default();

			params.insert("client_id", self.config().client_id.as_str());
			params.insert("scope", request.scopes.decorated().normalized());

			if let Some(resource) = &request.resource {
				params.insert("resource", resource.as_str());
			}
			if let Some(claims) = &request.claims {
				params.insert("claims", claims.as_str());
			}

			params.extend_extra(&request.extra_parameters)?;

			let device = match self
				.bundle()
				.oauth
				.call::<DeviceCodeResponse>(
					&ctx,
					EndpointMethod::Get,
					&endpoints.device_code,
					&params,
				)
				.await?
			{
				EndpointReply::Success(device) => device,
				EndpointReply::Service(e) => return Err(e.into_error()),
			};
			let lifetime = device_code_lifetime(device.expires_in)?;
			let deadline =
				Instant::now().checked_add(lifetime).ok_or(ClientError::ExpiresInOutOfRange)?;
			let mut interval = device
				.interval
				.map(|secs| StdDuration::from_secs(u64::try_from(secs).unwrap_or_default()))
				.unwrap_or(DEFAULT_POLL_INTERVAL);

			tracing::info!(
				verification_uri = %device.verification_uri,
				expires_in = ?lifetime,
				"Device code issued."
			);
			on_device_code(&device);

			let grant = Grant::DeviceCode { device_code: device.device_code.clone() };
			let token_params = self.token_parameters(&request, &grant, &endpoints)?;
			let cache_request = self.cache_request(&request);

			loop {
				// The next poll would land on or past the deadline.
				if deadline.saturating_duration_since(Instant::now()) <= interval {
					return Err(expired().into());
				}

				tokio::select! {
					biased;
					_ = ctx.cancellation.cancelled() => return Err(Error::Cancelled),
					_ = tokio::time::sleep(interval) => {},
				}

				let reply = self
					.bundle()
					.oauth
					.call::<TokenResponse>(
						&ctx,
						EndpointMethod::Post,
						&endpoints.token,
						&token_params,
					)
					.await?;

				match reply {
					EndpointReply::Success(response) => {
						tracing::info!("Device code redeemed.");

						let stored = self.bundle().cache.store_token_response(
							&cache_request,
							&response,
							OffsetDateTime::now_utc(),
						)?;

						return Ok(common::stored_result(stored, &ctx));
					},
					EndpointReply::Service(e) => match next_poll_interval(&e.error, interval) {
						Some(next) => {
							tracing::debug!(
								error = %e.error,
								interval = ?next,
								"Device code not yet redeemed."
							);

							interval = next;
						},
						None => return Err(e.into_error()),
					},
				}
			}
		})
		.await
	}
}

fn expired() -> ServiceError {
	ServiceError::new("expired_token")
		.with_description("The device code expired before the user completed sign-in")
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn poll_interval_follows_service_hints() {
		let interval = StdDuration::from_secs(5);

		assert_eq!(next_poll_interval("authorization_pending", interval), Some(interval));
		assert_eq!(next_poll_interval("slow_down", interval), Some(StdDuration::from_secs(10)));
		assert_eq!(next_poll_interval("slow_down", StdDuration::MAX), Some(StdDuration::MAX));
		assert_eq!(next_poll_interval("expired_token", interval), None);
		assert_eq!(next_poll_interval("access_denied", interval), None);
		assert_eq!(next_poll_interval("invalid_grant", interval), None);
	}

	#[test]
	fn lifetime_rejects_unrepresentable_values() {
		assert_eq!(
			device_code_lifetime(Some(900)).expect("A normal lifetime should be accepted."),
			StdDuration::from_secs(900)
		);
		assert_eq!(
			device_code_lifetime(None).expect("A missing lifetime should use the default."),
			DEFAULT_DEVICE_CODE_LIFETIME
		);
		assert_eq!(
			device_code_lifetime(Some(-30)).expect("A negative lifetime is already expired."),
			StdDuration::ZERO
		);
		assert!(matches!(
			device_code_lifetime(Some(9_000_000_000_000_000_000)),
			Err(ClientError::ExpiresInOutOfRange)
		));
	}

	#[test]
	fn expiry_error_is_terminal() {
		let err = Error::from(expired());

		assert!(matches!(err, Error::Service(ref e) if e.error == "expired_token"));
	}
}
