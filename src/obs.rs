//! Observability helpers for acquisition flows.
//!
//! Every acquisition runs inside a `tracing` span named `oauth2_token_cache.flow` carrying the
//! `flow`, `stage`, and `correlation_id` fields. With the `metrics` feature enabled each attempt,
//! success, and failure also increments `oauth2_token_cache_flow_total{flow,outcome}`.

mod counter;
mod span;

pub use counter::*;
pub use span::*;

// self
use crate::_prelude::*;

/// Acquisition flows observed by the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Cache lookup with refresh-token fallback.
	Silent,
	/// Authorization code redemption.
	AuthorizationCode,
	/// Refresh token redemption.
	RefreshToken,
	/// Client credentials grant.
	ClientCredentials,
	/// Device code grant.
	DeviceCode,
	/// Username/password grant.
	UsernamePassword,
	/// Integrated Windows auth via SAML bearer assertion.
	IntegratedWindowsAuth,
	/// On-behalf-of grant.
	OnBehalfOf,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Silent => "silent",
			FlowKind::AuthorizationCode => "authorization_code",
			FlowKind::RefreshToken => "refresh_token",
			FlowKind::ClientCredentials => "client_credentials",
			FlowKind::DeviceCode => "device_code",
			FlowKind::UsernamePassword => "username_password",
			FlowKind::IntegratedWindowsAuth => "integrated_windows_auth",
			FlowKind::OnBehalfOf => "on_behalf_of",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to an acquisition.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
