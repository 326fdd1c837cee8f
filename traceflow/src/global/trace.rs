use crate::trace::{self, SpanBuilder, SpanContext, Status};
use crate::{Context, KeyValue};
use std::borrow::Cow;
use std::fmt;
use std::time::SystemTime;

/// Object-safe mirror of [`trace::Span`], allowing spans from any SDK to
/// travel behind one trait object.
pub trait ObjectSafeSpan {
    /// Record an event with the given timestamp.
    fn add_event_with_timestamp(
        &mut self,
        name: Cow<'static, str>,
        timestamp: SystemTime,
        attributes: Vec<KeyValue>,
    );

    /// The portable identity of this span.
    fn span_context(&self) -> &SpanContext;

    /// Whether this span records the data passed to its mutators.
    fn is_recording(&self) -> bool;

    /// Set one attribute.
    fn set_attribute(&mut self, attribute: KeyValue);

    /// Set the span status.
    fn set_status(&mut self, status: Status);

    /// Replace the span name.
    fn update_name(&mut self, new_name: Cow<'static, str>);

    /// End the span with the given timestamp.
    fn end_with_timestamp(&mut self, timestamp: SystemTime);
}

impl<T: trace::Span> ObjectSafeSpan for T {
    fn add_event_with_timestamp(
        &mut self,
        name: Cow<'static, str>,
        timestamp: SystemTime,
        attributes: Vec<KeyValue>,
    ) {
        trace::Span::add_event_with_timestamp(self, name, timestamp, attributes)
    }

    fn span_context(&self) -> &SpanContext {
        trace::Span::span_context(self)
    }

    fn is_recording(&self) -> bool {
        trace::Span::is_recording(self)
    }

    fn set_attribute(&mut self, attribute: KeyValue) {
        trace::Span::set_attribute(self, attribute)
    }

    fn set_status(&mut self, status: Status) {
        trace::Span::set_status(self, status)
    }

    fn update_name(&mut self, new_name: Cow<'static, str>) {
        trace::Span::update_name(self, new_name)
    }

    fn end_with_timestamp(&mut self, timestamp: SystemTime) {
        trace::Span::end_with_timestamp(self, timestamp)
    }
}

/// A span returned through the registry, wrapping whichever SDK produced
/// it.
pub struct BoxedSpan(Box<dyn ObjectSafeSpan + Send + Sync>);

impl BoxedSpan {
    pub(crate) fn new(span: Box<dyn ObjectSafeSpan + Send + Sync>) -> Self {
        BoxedSpan(span)
    }
}

impl fmt::Debug for BoxedSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoxedSpan")
            .field("span_context", self.0.span_context())
            .finish()
    }
}

impl trace::Span for BoxedSpan {
    fn add_event_with_timestamp<T>(
        &mut self,
        name: T,
        timestamp: SystemTime,
        attributes: Vec<KeyValue>,
    ) where
        T: Into<Cow<'static, str>>,
    {
        self.0
            .add_event_with_timestamp(name.into(), timestamp, attributes)
    }

    fn span_context(&self) -> &SpanContext {
        self.0.span_context()
    }

    fn is_recording(&self) -> bool {
        self.0.is_recording()
    }

    fn set_attribute(&mut self, attribute: KeyValue) {
        self.0.set_attribute(attribute)
    }

    fn set_status(&mut self, status: Status) {
        self.0.set_status(status)
    }

    fn update_name<T>(&mut self, new_name: T)
    where
        T: Into<Cow<'static, str>>,
    {
        self.0.update_name(new_name.into())
    }

    fn end_with_timestamp(&mut self, timestamp: SystemTime) {
        self.0.end_with_timestamp(timestamp)
    }
}

/// Object-safe mirror of [`trace::Tracer`].
pub trait ObjectSafeTracer {
    /// Build a boxed span from a builder and parent context.
    fn build_with_context_boxed(
        &self,
        builder: SpanBuilder,
        parent_cx: &Context,
    ) -> Box<dyn ObjectSafeSpan + Send + Sync>;
}

impl<T> ObjectSafeTracer for T
where
    T: trace::Tracer,
    T::Span: Send + Sync + 'static,
{
    fn build_with_context_boxed(
        &self,
        builder: SpanBuilder,
        parent_cx: &Context,
    ) -> Box<dyn ObjectSafeSpan + Send + Sync> {
        Box::new(self.build_with_context(builder, parent_cx))
    }
}

/// A tracer resolved through the registry, wrapping whichever SDK
/// provided it.
pub struct BoxedTracer(Box<dyn ObjectSafeTracer + Send + Sync>);

impl BoxedTracer {
    pub(crate) fn new(tracer: Box<dyn ObjectSafeTracer + Send + Sync>) -> Self {
        BoxedTracer(tracer)
    }
}

impl fmt::Debug for BoxedTracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BoxedTracer")
    }
}

impl trace::Tracer for BoxedTracer {
    type Span = BoxedSpan;

    fn build_with_context(&self, builder: SpanBuilder, parent_cx: &Context) -> Self::Span {
        BoxedSpan(self.0.build_with_context_boxed(builder, parent_cx))
    }
}

/// Object-safe mirror of [`trace::TracerProvider`].
pub trait ObjectSafeTracerProvider {
    /// Create a boxed tracer for the given instrumentation name.
    fn boxed_tracer(&self, name: Cow<'static, str>) -> Box<dyn ObjectSafeTracer + Send + Sync>;
}

impl<P> ObjectSafeTracerProvider for P
where
    P: trace::TracerProvider,
    P::Tracer: Send + Sync + 'static,
    <P::Tracer as trace::Tracer>::Span: Send + Sync + 'static,
{
    fn boxed_tracer(&self, name: Cow<'static, str>) -> Box<dyn ObjectSafeTracer + Send + Sync> {
        Box::new(self.tracer(name))
    }
}
