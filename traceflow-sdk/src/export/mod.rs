//! Span export: finished-span data, the exporter contract, and the
//! retrying export engine.

mod retry;
mod trace;

pub use retry::{
    is_retryable, RetryExporter, RetryExporterBuilder, RetryPolicy, SpanTransport,
};
pub use trace::{ExportError, ExportResult, NoopSpanExporter, SpanData, SpanExporter, TransportError};
