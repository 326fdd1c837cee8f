//! The tracing API: spans, tracers, and their portable identity.
//!
//! A trace is a tree of [`Span`]s, each representing a single timed
//! operation. Spans are created by a [`Tracer`], which is in turn obtained
//! from a [`TracerProvider`]. This module only defines the contracts; the
//! `traceflow-sdk` crate provides the working implementation and
//! [`noop`] provides the inert fallback.

mod context;
pub mod noop;
mod span_context;

use crate::{Context, KeyValue};
use std::borrow::Cow;
use std::time::SystemTime;

pub use crate::trace_context::{SpanId, TraceFlags, TraceId};
pub use context::TraceContextExt;
pub use span_context::{SpanContext, TraceState, TraceStateError};

/// The operation a span describes, relative to its trace.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SpanKind {
    /// Outgoing synchronous request.
    Client,
    /// Incoming synchronous request handler.
    Server,
    /// Outgoing asynchronous message.
    Producer,
    /// Incoming asynchronous message handler.
    Consumer,
    /// Internal operation within an application.
    Internal,
}

/// The status of a [`Span`] once it has ended.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Status {
    /// The default status.
    #[default]
    Unset,
    /// The operation contains an error.
    Error {
        /// A description of the error.
        description: Cow<'static, str>,
    },
    /// The operation completed successfully.
    Ok,
}

impl Status {
    /// Create a new error status with the given description.
    pub fn error(description: impl Into<Cow<'static, str>>) -> Self {
        Status::Error {
            description: description.into(),
        }
    }
}

/// A timestamped annotation on a span.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    /// The name of this event.
    pub name: Cow<'static, str>,
    /// The time this event occurred.
    pub timestamp: SystemTime,
    /// Attributes describing this event.
    pub attributes: Vec<KeyValue>,
    /// The number of attributes dropped from this event due to limits.
    pub dropped_attributes_count: u32,
}

impl Event {
    /// Create a new event.
    pub fn new<T: Into<Cow<'static, str>>>(
        name: T,
        timestamp: SystemTime,
        attributes: Vec<KeyValue>,
        dropped_attributes_count: u32,
    ) -> Self {
        Event {
            name: name.into(),
            timestamp,
            attributes,
            dropped_attributes_count,
        }
    }

    /// Create a new event with the current time and no attributes.
    pub fn with_name<T: Into<Cow<'static, str>>>(name: T) -> Self {
        Event {
            name: name.into(),
            timestamp: crate::time::now(),
            attributes: Vec::new(),
            dropped_attributes_count: 0,
        }
    }
}

/// A causal reference from one span to another, set at span creation.
#[derive(Clone, Debug, PartialEq)]
pub struct Link {
    /// The span context of the linked span.
    pub span_context: SpanContext,
    /// Attributes describing this link.
    pub attributes: Vec<KeyValue>,
    /// The number of attributes dropped from this link due to limits.
    pub dropped_attributes_count: u32,
}

impl Link {
    /// Create a new link to the given span context.
    pub fn new(span_context: SpanContext, attributes: Vec<KeyValue>) -> Self {
        Link {
            span_context,
            attributes,
            dropped_attributes_count: 0,
        }
    }
}

/// Interface for a single operation within a trace.
///
/// Spans are mutable until [`end`](Span::end) is called, after which every
/// mutator becomes a no-op. Implementations never panic on misuse.
pub trait Span {
    /// Record an event at the current time.
    fn add_event<T>(&mut self, name: T, attributes: Vec<KeyValue>)
    where
        T: Into<Cow<'static, str>>,
    {
        self.add_event_with_timestamp(name, crate::time::now(), attributes)
    }

    /// Record an event with the given timestamp.
    fn add_event_with_timestamp<T>(
        &mut self,
        name: T,
        timestamp: SystemTime,
        attributes: Vec<KeyValue>,
    ) where
        T: Into<Cow<'static, str>>;

    /// The portable identity of this span.
    ///
    /// Remains valid (and readable for correlation) even after the span has
    /// ended or when the span is a non-recording stand-in.
    fn span_context(&self) -> &SpanContext;

    /// Whether this span records the data passed to its mutators.
    fn is_recording(&self) -> bool;

    /// Set one attribute, replacing any prior value for the same key.
    fn set_attribute(&mut self, attribute: KeyValue);

    /// Set multiple attributes.
    fn set_attributes(&mut self, attributes: impl IntoIterator<Item = KeyValue>)
    where
        Self: Sized,
    {
        for attribute in attributes {
            self.set_attribute(attribute);
        }
    }

    /// Set the span status. The first non-`Unset` status wins.
    fn set_status(&mut self, status: Status);

    /// Replace the span name.
    fn update_name<T>(&mut self, new_name: T)
    where
        T: Into<Cow<'static, str>>;

    /// End the span with the current time.
    fn end(&mut self) {
        self.end_with_timestamp(crate::time::now());
    }

    /// End the span with the given timestamp. Only the first call has any
    /// effect.
    fn end_with_timestamp(&mut self, timestamp: SystemTime);
}

/// Configuration for a new span, built up before handing it to a
/// [`Tracer`].
#[derive(Clone, Debug, Default)]
pub struct SpanBuilder {
    /// The span name.
    pub name: Cow<'static, str>,
    /// Overrides the generated trace id for root spans, if set.
    pub trace_id: Option<TraceId>,
    /// Overrides the generated span id, if set.
    pub span_id: Option<SpanId>,
    /// The span kind; defaults to [`SpanKind::Internal`].
    pub span_kind: Option<SpanKind>,
    /// An explicit start time, instead of the time `build` is called.
    pub start_time: Option<SystemTime>,
    /// Initial attributes.
    pub attributes: Option<Vec<KeyValue>>,
    /// Links to other spans; can only be set at creation.
    pub links: Option<Vec<Link>>,
    /// Record this span even when the sampling decision says not to
    /// export it.
    pub force_recording: bool,
}

impl SpanBuilder {
    /// Create a builder for a span with the given name.
    pub fn from_name<T: Into<Cow<'static, str>>>(name: T) -> Self {
        SpanBuilder {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Assign the span kind.
    pub fn with_kind(self, span_kind: SpanKind) -> Self {
        SpanBuilder {
            span_kind: Some(span_kind),
            ..self
        }
    }

    /// Assign an explicit trace id for root spans.
    pub fn with_trace_id(self, trace_id: TraceId) -> Self {
        SpanBuilder {
            trace_id: Some(trace_id),
            ..self
        }
    }

    /// Assign an explicit span id.
    pub fn with_span_id(self, span_id: SpanId) -> Self {
        SpanBuilder {
            span_id: Some(span_id),
            ..self
        }
    }

    /// Assign an explicit start time.
    pub fn with_start_time<T: Into<SystemTime>>(self, start_time: T) -> Self {
        SpanBuilder {
            start_time: Some(start_time.into()),
            ..self
        }
    }

    /// Assign initial attributes.
    pub fn with_attributes<I>(self, attributes: I) -> Self
    where
        I: IntoIterator<Item = KeyValue>,
    {
        SpanBuilder {
            attributes: Some(attributes.into_iter().collect()),
            ..self
        }
    }

    /// Assign links to other spans.
    pub fn with_links(self, links: Vec<Link>) -> Self {
        SpanBuilder {
            links: Some(links),
            ..self
        }
    }

    /// Force this span to record even if the sampler drops it.
    pub fn with_force_recording(self, force_recording: bool) -> Self {
        SpanBuilder {
            force_recording,
            ..self
        }
    }

    /// Build the span using the current context for parenting.
    pub fn start<T: Tracer>(self, tracer: &T) -> T::Span {
        Context::map_current(|cx| tracer.build_with_context(self, cx))
    }

    /// Build the span using an explicit parent context.
    pub fn start_with_context<T: Tracer>(self, tracer: &T, parent_cx: &Context) -> T::Span {
        tracer.build_with_context(self, parent_cx)
    }
}

/// Types that can create [`Span`]s.
pub trait Tracer {
    /// The `Span` type produced by this tracer.
    type Span: Span;

    /// Start a span with the given name, parented from the current context.
    fn start<T>(&self, name: T) -> Self::Span
    where
        T: Into<Cow<'static, str>>,
    {
        Context::map_current(|cx| self.start_with_context(name, cx))
    }

    /// Start a span with the given name and explicit parent context.
    fn start_with_context<T>(&self, name: T, parent_cx: &Context) -> Self::Span
    where
        T: Into<Cow<'static, str>>,
    {
        self.build_with_context(SpanBuilder::from_name(name), parent_cx)
    }

    /// Create a span builder for further configuration.
    fn span_builder<T>(&self, name: T) -> SpanBuilder
    where
        T: Into<Cow<'static, str>>,
    {
        SpanBuilder::from_name(name)
    }

    /// Build a span from a builder, parented from the current context.
    fn build(&self, builder: SpanBuilder) -> Self::Span {
        Context::map_current(|cx| self.build_with_context(builder, cx))
    }

    /// Build a span from a builder and an explicit parent context.
    fn build_with_context(&self, builder: SpanBuilder, parent_cx: &Context) -> Self::Span;

    /// Run `f` inside a new span, ending the span when `f` returns.
    ///
    /// The new span is attached as the active context for the duration of
    /// the closure.
    fn in_span<T, F, N>(&self, name: N, f: F) -> T
    where
        F: FnOnce(Context) -> T,
        N: Into<Cow<'static, str>>,
        Self::Span: Send + Sync + 'static,
        Self: Sized,
    {
        let span = self.start(name);
        let cx = Context::current().with_span_context(span.span_context().clone());
        let guard = cx.clone().attach();
        let mut span = span;
        let result = f(cx);
        drop(guard);
        span.end();
        result
    }
}

/// Types that can create instances of [`Tracer`].
pub trait TracerProvider {
    /// The [`Tracer`] type this provider returns.
    type Tracer: Tracer;

    /// Returns a tracer scoped to the given instrumentation name.
    fn tracer(&self, name: impl Into<Cow<'static, str>>) -> Self::Tracer;
}
