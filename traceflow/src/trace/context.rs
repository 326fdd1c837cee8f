use crate::trace::SpanContext;
use crate::Context;
use std::sync::Arc;

/// Methods for storing and retrieving trace identity on a [`Context`].
pub trait TraceContextExt {
    /// Returns a clone of the current context with the given span context
    /// attached.
    fn current_with_span_context(span_context: SpanContext) -> Self;

    /// Returns a new context with the given span context attached.
    fn with_span_context(&self, span_context: SpanContext) -> Self;

    /// Returns a new context with the given span context attached and
    /// marked as remote.
    ///
    /// Used by propagators when a span context has been extracted from a
    /// wire carrier.
    fn with_remote_span_context(&self, span_context: SpanContext) -> Self;

    /// The span context attached to this context, if any.
    fn span_context(&self) -> Option<&SpanContext>;

    /// Whether a span context is attached to this context.
    fn has_active_span(&self) -> bool;
}

impl TraceContextExt for Context {
    fn current_with_span_context(span_context: SpanContext) -> Self {
        Context::map_current(|cx| cx.with_span_context(span_context))
    }

    fn with_span_context(&self, span_context: SpanContext) -> Self {
        self.with_span_context_arc(Arc::new(span_context))
    }

    fn with_remote_span_context(&self, span_context: SpanContext) -> Self {
        let remote = SpanContext::new(
            span_context.trace_id(),
            span_context.span_id(),
            span_context.trace_flags(),
            true,
            span_context.trace_state().clone(),
        );
        self.with_span_context(remote)
    }

    fn span_context(&self) -> Option<&SpanContext> {
        self.span_context.as_deref()
    }

    fn has_active_span(&self) -> bool {
        self.span_context.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{SpanId, TraceFlags, TraceId, TraceState};

    fn span_context() -> SpanContext {
        SpanContext::new(
            TraceId::from(1),
            SpanId::from(1),
            TraceFlags::SAMPLED,
            false,
            TraceState::default(),
        )
    }

    #[test]
    fn empty_context_has_no_span() {
        let cx = Context::new();
        assert!(!cx.has_active_span());
        assert!(cx.span_context().is_none());
    }

    #[test]
    fn attached_span_context_is_readable() {
        let cx = Context::new().with_span_context(span_context());
        assert!(cx.has_active_span());
        assert_eq!(cx.span_context(), Some(&span_context()));
    }

    #[test]
    fn remote_attachment_marks_remote() {
        let cx = Context::new().with_remote_span_context(span_context());
        let sc = cx.span_context().unwrap();
        assert!(sc.is_remote());
        assert_eq!(sc.trace_id(), span_context().trace_id());
        assert!(sc.is_sampled());
    }
}
