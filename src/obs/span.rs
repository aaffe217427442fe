// crates.io
use tracing::{Instrument, Span, field, instrument::Instrumented};
use uuid::Uuid;
// self
use crate::{_prelude::*, obs::FlowKind};

/// Span wrapper used by acquisition flows.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	span: Span,
}
impl FlowSpan {
	/// Creates a span tagged with the flow kind, stage, and correlation id.
	pub fn new(kind: FlowKind, stage: &'static str, correlation_id: Uuid) -> Self {
		let span = tracing::info_span!(
			"oauth2_token_cache.flow",
			flow = kind.as_str(),
			stage,
			correlation_id = %correlation_id,
			source = field::Empty,
		);

		Self { span }
	}

	/// Overwrites the correlation id field.
	pub fn record_correlation_id(&self, correlation_id: Uuid) {
		self.span.record("correlation_id", field::display(correlation_id));
	}

	/// Records where the returned token came from (`cache` or `identity_provider`).
	pub fn record_source(&self, source: &'static str) {
		self.span.record("source", source);
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> Instrumented<Fut>
	where
		Fut: Future,
	{
		fut.instrument(self.span.clone())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn instrument_wraps_future() {
		let span = FlowSpan::new(FlowKind::Silent, "instrument_wraps_future", Uuid::new_v4());

		span.record_source("cache");

		assert_eq!(FlowSpan::instrument(&span, async { 42 }).await, 42);
	}
}
