//! The recording span produced by [`SdkTracer`].

use crate::export::SpanData;
use crate::trace::{SdkTracer, SpanLimits};
use std::borrow::Cow;
use std::time::SystemTime;
use traceflow::trace::{Event, SpanContext, Status};
use traceflow::KeyValue;

/// A span under construction.
///
/// Mutations apply while the span is recording and has not ended; after
/// [`end`](traceflow::trace::Span::end) they become no-ops. Dropping a
/// span that was never ended ends it implicitly at drop time.
#[derive(Debug)]
pub struct Span {
    span_context: SpanContext,
    data: Option<SpanData>,
    tracer: SdkTracer,
    span_limits: SpanLimits,
}

impl Span {
    pub(crate) fn new(
        span_context: SpanContext,
        data: Option<SpanData>,
        tracer: SdkTracer,
        span_limits: SpanLimits,
    ) -> Self {
        Span {
            span_context,
            data,
            tracer,
            span_limits,
        }
    }

    fn with_data<T>(&mut self, f: impl FnOnce(&mut SpanData) -> T) -> Option<T> {
        self.data.as_mut().map(f)
    }

    /// A copy of the data recorded so far, if the span is recording.
    pub fn exported_data(&self) -> Option<SpanData> {
        let mut data = self.data.clone()?;
        data.span_context = self.span_context.clone();
        Some(data)
    }

    fn ensure_ended_and_exported(&mut self, timestamp: Option<SystemTime>) {
        // Taking the data is what makes `end` idempotent: later calls and
        // the drop handler find nothing left to export.
        let Some(mut data) = self.data.take() else {
            return;
        };
        data.span_context = self.span_context.clone();
        data.end_time = timestamp
            .unwrap_or_else(traceflow::time::now)
            .max(data.start_time);

        match self.tracer.provider().span_processors() {
            [] => {}
            [processor] => processor.on_end(data),
            processors => {
                if let Some((last, rest)) = processors.split_last() {
                    for processor in rest {
                        processor.on_end(data.clone());
                    }
                    last.on_end(data);
                }
            }
        }
    }
}

impl traceflow::trace::Span for Span {
    fn add_event_with_timestamp<T>(
        &mut self,
        name: T,
        timestamp: SystemTime,
        mut attributes: Vec<KeyValue>,
    ) where
        T: Into<Cow<'static, str>>,
    {
        let event_attribute_limit = self.span_limits.max_attributes_per_event as usize;
        let event_limit = self.span_limits.max_events_per_span;
        self.with_data(|data| {
            if data.events.events.len() >= event_limit as usize {
                data.events.dropped_count += 1;
                return;
            }
            let dropped = attributes.len().saturating_sub(event_attribute_limit) as u32;
            attributes.truncate(event_attribute_limit);
            data.events
                .events
                .push(Event::new(name, timestamp, attributes, dropped));
        });
    }

    fn span_context(&self) -> &SpanContext {
        &self.span_context
    }

    fn is_recording(&self) -> bool {
        self.data.is_some()
    }

    fn set_attribute(&mut self, attribute: KeyValue) {
        self.with_data(|data| {
            data.attributes.insert(attribute);
        });
    }

    fn set_status(&mut self, status: Status) {
        self.with_data(|data| {
            if data.status == Status::Unset {
                data.status = status;
            }
        });
    }

    fn update_name<T>(&mut self, new_name: T)
    where
        T: Into<Cow<'static, str>>,
    {
        let name = new_name.into();
        self.with_data(|data| {
            data.name = name;
        });
    }

    fn end_with_timestamp(&mut self, timestamp: SystemTime) {
        self.ensure_ended_and_exported(Some(timestamp));
    }
}

impl Drop for Span {
    fn drop(&mut self) {
        self.ensure_ended_and_exported(None);
    }
}
