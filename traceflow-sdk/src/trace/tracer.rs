//! The SDK tracer: parenting, sampling, and span construction.

use crate::export::SpanData;
use crate::trace::{AttributeMap, SdkTracerProvider, Span, SpanEvents, SpanLinks};
use std::borrow::Cow;
use std::fmt;
use traceflow::trace::{
    SpanBuilder, SpanContext, SpanId, SpanKind, Status, TraceContextExt, TraceFlags, TraceState,
    Tracer,
};
use traceflow::Context;

/// Tracer returned by [`SdkTracerProvider::tracer`].
#[derive(Clone)]
pub struct SdkTracer {
    scope_name: Cow<'static, str>,
    provider: SdkTracerProvider,
}

impl fmt::Debug for SdkTracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SdkTracer")
            .field("scope_name", &self.scope_name)
            .finish()
    }
}

impl SdkTracer {
    pub(crate) fn new(scope_name: Cow<'static, str>, provider: SdkTracerProvider) -> Self {
        SdkTracer {
            scope_name,
            provider,
        }
    }

    pub(crate) fn provider(&self) -> &SdkTracerProvider {
        &self.provider
    }

    /// The instrumentation scope this tracer was created for.
    pub fn scope_name(&self) -> &str {
        &self.scope_name
    }

    fn non_recording(&self, span_context: SpanContext) -> Span {
        Span::new(
            span_context,
            None,
            self.clone(),
            self.provider.config().span_limits,
        )
    }
}

impl Tracer for SdkTracer {
    type Span = Span;

    fn build_with_context(&self, mut builder: SpanBuilder, parent_cx: &Context) -> Self::Span {
        if parent_cx.is_telemetry_suppressed() || self.provider.is_shutdown() {
            return self.non_recording(SpanContext::empty_context());
        }

        let config = self.provider.config();
        let parent = parent_cx.span_context().filter(|sc| sc.is_valid());

        let (trace_id, sampled, trace_state) = match parent {
            Some(sc) => (sc.trace_id(), sc.is_sampled(), sc.trace_state().clone()),
            None => {
                let trace_id = builder
                    .trace_id
                    .unwrap_or_else(|| config.id_generator.new_trace_id());
                let sampled =
                    config
                        .sampler
                        .should_sample(Some(parent_cx), trace_id, &builder.name);
                (trace_id, sampled, TraceState::default())
            }
        };
        let span_id = builder
            .span_id
            .unwrap_or_else(|| config.id_generator.new_span_id());
        let span_context = SpanContext::new(
            trace_id,
            span_id,
            TraceFlags::default().with_sampled(sampled),
            false,
            trace_state,
        );

        if !sampled && !builder.force_recording {
            return self.non_recording(span_context);
        }

        let limits = config.span_limits;
        let mut attributes = AttributeMap::new(limits.max_attributes_per_span);
        if let Some(initial) = builder.attributes.take() {
            for attribute in initial {
                attributes.insert(attribute);
            }
        }

        let mut links = SpanLinks::default();
        if let Some(mut initial) = builder.links.take() {
            let link_limit = limits.max_links_per_span as usize;
            links.dropped_count = initial.len().saturating_sub(link_limit) as u32;
            initial.truncate(link_limit);
            let attribute_limit = limits.max_attributes_per_link as usize;
            for link in &mut initial {
                let dropped = link.attributes.len().saturating_sub(attribute_limit) as u32;
                link.attributes.truncate(attribute_limit);
                link.dropped_attributes_count += dropped;
            }
            links.links = initial;
        }

        let start_time = builder.start_time.unwrap_or_else(traceflow::time::now);
        let data = SpanData {
            span_context: span_context.clone(),
            parent_span_id: parent.map(|sc| sc.span_id()).unwrap_or(SpanId::INVALID),
            span_kind: builder.span_kind.unwrap_or(SpanKind::Internal),
            name: builder.name,
            start_time,
            end_time: start_time,
            attributes,
            events: SpanEvents::default(),
            links,
            status: Status::Unset,
        };

        let mut span = Span::new(span_context, Some(data), self.clone(), limits);
        for processor in self.provider.span_processors() {
            processor.on_start(&mut span, parent_cx);
        }
        span
    }
}
