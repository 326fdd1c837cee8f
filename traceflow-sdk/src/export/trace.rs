use crate::trace::{AttributeMap, SpanEvents, SpanLinks};
use futures_util::future::BoxFuture;
use std::borrow::Cow;
use std::fmt;
use std::time::{Duration, SystemTime};
use thiserror::Error;
use traceflow::trace::{SpanContext, SpanId, SpanKind, Status};

/// Immutable record of a finished span, handed to processors and
/// exporters.
#[derive(Clone, Debug, PartialEq)]
pub struct SpanData {
    /// Portable identity of the span.
    pub span_context: SpanContext,
    /// Span id of the parent, or [`SpanId::INVALID`] for a root span.
    pub parent_span_id: SpanId,
    /// Relationship of the span to its trace.
    pub span_kind: SpanKind,
    /// Operation name.
    pub name: Cow<'static, str>,
    /// When the operation started.
    pub start_time: SystemTime,
    /// When the operation ended. Never earlier than `start_time`.
    pub end_time: SystemTime,
    /// Bounded attribute set.
    pub attributes: AttributeMap,
    /// Bounded event list.
    pub events: SpanEvents,
    /// Bounded link list.
    pub links: SpanLinks,
    /// Final status of the operation.
    pub status: Status,
}

impl SpanData {
    /// Wall-clock duration of the span.
    pub fn duration(&self) -> Duration {
        self.end_time
            .duration_since(self.start_time)
            .unwrap_or_default()
    }
}

/// A transport-level export failure carrying the peer's status code.
///
/// Status codes follow HTTP semantics; code `0` means the transport
/// failed before producing a response (connection error, panic).
#[derive(Error, Debug, Clone, PartialEq)]
#[error("transport failure (status {status_code}): {message}")]
pub struct TransportError {
    /// HTTP-like status code, or `0` when none was produced.
    pub status_code: u16,
    /// Human-readable description.
    pub message: String,
}

/// Terminal outcome of a failed export.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ExportError {
    /// The exporter was shut down before this export started.
    #[error("exporter already shutdown")]
    AlreadyShutdown,

    /// The exporter's concurrency limit was reached; the batch was
    /// rejected without being sent.
    #[error("concurrent export limit reached")]
    AdmissionRejected,

    /// The export did not finish within the configured deadline.
    #[error("export timed out after {0:?}")]
    Timeout(Duration),

    /// The transport failed with a non-retryable error.
    #[error("export failed: {0}")]
    Transport(#[source] TransportError),

    /// Every allowed attempt failed with a retryable error.
    #[error("export failed after {attempts} attempts: {source}")]
    RetryExhausted {
        /// How many attempts were made.
        attempts: u32,
        /// The final attempt's error.
        #[source]
        source: TransportError,
    },
}

/// Outcome of an export or exporter lifecycle call.
pub type ExportResult = Result<(), ExportError>;

/// Sink for batches of finished spans.
///
/// Exports are asynchronous; lifecycle calls are synchronous and must be
/// safe to call from any thread. Shared-reference receivers let one
/// exporter serve concurrent processors without external locking.
pub trait SpanExporter: Send + Sync + fmt::Debug {
    /// Export a batch of spans.
    fn export(&self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult>;

    /// Release the exporter's resources. Called at most once by each
    /// owner; implementations decide whether repeat calls are errors.
    fn shutdown(&self) -> ExportResult {
        Ok(())
    }

    /// Flush any data the exporter itself has buffered.
    fn force_flush(&self) -> ExportResult {
        Ok(())
    }
}

/// An exporter that drops everything it is given.
#[derive(Debug, Default)]
pub struct NoopSpanExporter;

impl SpanExporter for NoopSpanExporter {
    fn export(&self, _batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        Box::pin(futures_util::future::ready(Ok(())))
    }
}
