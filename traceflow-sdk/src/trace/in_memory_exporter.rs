use crate::error::SdkError;
use crate::export::{ExportResult, SpanData, SpanExporter};
use futures_util::future::BoxFuture;
use std::sync::{Arc, Mutex, PoisonError};

/// A [`SpanExporter`] that stores finished spans in memory, for tests
/// and assertions.
///
/// Clones share storage, so a clone kept by the test observes what the
/// pipeline exports. Spans survive shutdown and stay readable until
/// [`reset`](InMemorySpanExporter::reset) is called.
///
/// ```
/// use traceflow::trace::{Span, Tracer, TracerProvider};
/// use traceflow_sdk::trace::{InMemorySpanExporter, SdkTracerProvider};
///
/// let exporter = InMemorySpanExporter::default();
/// let provider = SdkTracerProvider::builder()
///     .with_simple_exporter(exporter.clone())
///     .build();
///
/// provider.tracer("scope").start("operation").end();
/// assert_eq!(exporter.get_finished_spans().unwrap().len(), 1);
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemorySpanExporter {
    spans: Arc<Mutex<Vec<SpanData>>>,
}

/// Builder for [`InMemorySpanExporter`].
#[derive(Clone, Debug, Default)]
pub struct InMemorySpanExporterBuilder {}

impl InMemorySpanExporterBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self {}
    }

    /// Builds the exporter.
    pub fn build(&self) -> InMemorySpanExporter {
        InMemorySpanExporter::default()
    }
}

impl InMemorySpanExporter {
    /// A copy of every span exported so far.
    pub fn get_finished_spans(&self) -> Result<Vec<SpanData>, SdkError> {
        Ok(self.spans.lock()?.clone())
    }

    /// Discard all stored spans.
    pub fn reset(&self) {
        self.spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl SpanExporter for InMemorySpanExporter {
    fn export(&self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        self.spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(batch);
        Box::pin(futures_util::future::ready(Ok(())))
    }
}
