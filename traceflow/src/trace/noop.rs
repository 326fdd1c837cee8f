//! No-op trace implementations.
//!
//! Returned by the registry when no real provider has been registered (or
//! the registered one is incompatible). Designed for minimal overhead: no
//! allocation beyond the invalid span context, and no side effects.

use crate::trace::{
    self, SpanBuilder, SpanContext, TraceContextExt, TraceFlags, TraceId, TraceState,
};
use crate::{Context, KeyValue};
use std::borrow::Cow;
use std::time::SystemTime;

/// A no-op instance of a `TracerProvider`.
#[derive(Clone, Debug, Default)]
pub struct NoopTracerProvider {
    _private: (),
}

impl NoopTracerProvider {
    /// Create a new no-op tracer provider.
    pub fn new() -> Self {
        NoopTracerProvider { _private: () }
    }
}

impl trace::TracerProvider for NoopTracerProvider {
    type Tracer = NoopTracer;

    fn tracer(&self, _name: impl Into<Cow<'static, str>>) -> Self::Tracer {
        NoopTracer::new()
    }
}

/// A no-op instance of a `Span`.
#[derive(Clone, Debug)]
pub struct NoopSpan {
    span_context: SpanContext,
}

impl Default for NoopSpan {
    fn default() -> Self {
        NoopSpan::new()
    }
}

impl NoopSpan {
    /// Creates a new `NoopSpan` with an invalid span context.
    pub fn new() -> Self {
        NoopSpan {
            span_context: SpanContext::new(
                TraceId::INVALID,
                crate::trace::SpanId::INVALID,
                TraceFlags::default(),
                false,
                TraceState::default(),
            ),
        }
    }

    pub(crate) fn with_span_context(span_context: SpanContext) -> Self {
        NoopSpan { span_context }
    }
}

impl trace::Span for NoopSpan {
    fn add_event_with_timestamp<T>(
        &mut self,
        _name: T,
        _timestamp: SystemTime,
        _attributes: Vec<KeyValue>,
    ) where
        T: Into<Cow<'static, str>>,
    {
        // Ignored
    }

    fn span_context(&self) -> &SpanContext {
        &self.span_context
    }

    /// Returns false, signifying that this span never records.
    fn is_recording(&self) -> bool {
        false
    }

    fn set_attribute(&mut self, _attribute: KeyValue) {
        // Ignored
    }

    fn set_status(&mut self, _status: trace::Status) {
        // Ignored
    }

    fn update_name<T>(&mut self, _new_name: T)
    where
        T: Into<Cow<'static, str>>,
    {
        // Ignored
    }

    fn end_with_timestamp(&mut self, _timestamp: SystemTime) {
        // Ignored
    }
}

/// A no-op instance of a `Tracer`.
#[derive(Clone, Debug, Default)]
pub struct NoopTracer {
    _private: (),
}

impl NoopTracer {
    /// Create a new no-op tracer.
    pub fn new() -> Self {
        NoopTracer { _private: () }
    }
}

impl trace::Tracer for NoopTracer {
    type Span = NoopSpan;

    /// Builds a `NoopSpan` from a `SpanBuilder`.
    ///
    /// If the parent context carries a valid span context, it is propagated
    /// so downstream code can still read the trace id.
    fn build_with_context(&self, _builder: SpanBuilder, parent_cx: &Context) -> Self::Span {
        match parent_cx.span_context() {
            Some(sc) if sc.is_valid() => NoopSpan::with_span_context(sc.clone()),
            _ => NoopSpan::new(),
        }
    }
}
