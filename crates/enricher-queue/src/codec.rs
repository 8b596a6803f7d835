//! Trace context propagation across the broker hop.
//!
//! Contexts travel as W3C `traceparent` / `tracestate` entries in the
//! message headers.

use std::collections::HashMap;

use opentelemetry::propagation::TextMapPropagator;
use opentelemetry::Context;
use opentelemetry_sdk::propagation::TraceContextPropagator;

/// Converts between trace contexts and flat header maps.
#[derive(Debug, Clone, Default)]
pub struct TraceContextCodec {
    propagator: TraceContextPropagator,
}

impl TraceContextCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Header entries for `context`. Empty when it carries no valid span.
    pub fn encode(&self, context: &Context) -> HashMap<String, String> {
        let mut carrier = HashMap::new();
        self.propagator.inject_context(context, &mut carrier);
        carrier
    }

    /// Remote context named by `headers`.
    ///
    /// Missing or malformed entries yield a fresh root context. Keys are
    /// expected in lowercase.
    pub fn decode(&self, headers: &HashMap<String, String>) -> Context {
        self.propagator.extract_with_context(&Context::new(), headers)
    }
}
