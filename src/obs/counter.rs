// self
use crate::obs::{FlowKind, FlowOutcome};

/// Counter incremented once per flow attempt, success, and failure.
pub const FLOW_COUNTER: &str = "oauth2_token_cache_flow_total";

/// Records one flow outcome.
///
/// Outcomes are always emitted as `trace` events; the `metrics` feature additionally bumps
/// [`FLOW_COUNTER`] on the global recorder, labelled by `flow` and `outcome`.
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	tracing::trace!(flow = kind.as_str(), outcome = outcome.as_str(), "Flow outcome recorded.");

	#[cfg(feature = "metrics")]
	metrics::counter!(FLOW_COUNTER, "flow" => kind.as_str(), "outcome" => outcome.as_str())
		.increment(1);
}
