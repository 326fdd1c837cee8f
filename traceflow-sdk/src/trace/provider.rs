//! The SDK tracer provider: owns the processor pipeline and its
//! lifecycle.

use crate::error::{aggregate_errors, SdkError, SdkResult};
use crate::export::SpanExporter;
use crate::trace::span_processor::{BatchSpanProcessor, SimpleSpanProcessor, SpanProcessor};
use crate::trace::{Config, SdkTracer, SpanLimits};
use crate::trace::id_generator::IdGenerator;
use crate::trace::sampler::ShouldSample;
use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use traceflow::flow_warn;
use traceflow::trace::TracerProvider;

/// Creates [`SdkTracer`]s and fans finished spans out to its processors.
///
/// Cheap to clone; clones share the pipeline. When the last clone is
/// dropped without an explicit [`shutdown`](SdkTracerProvider::shutdown),
/// the processors are shut down implicitly.
#[derive(Clone)]
pub struct SdkTracerProvider {
    inner: Arc<TracerProviderInner>,
}

struct TracerProviderInner {
    processors: Vec<Box<dyn SpanProcessor>>,
    config: Config,
    is_shutdown: AtomicBool,
}

impl fmt::Debug for SdkTracerProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SdkTracerProvider")
            .field("processors", &self.inner.processors.len())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl SdkTracerProvider {
    /// Start configuring a provider.
    pub fn builder() -> TracerProviderBuilder {
        TracerProviderBuilder::default()
    }

    pub(crate) fn config(&self) -> &Config {
        &self.inner.config
    }

    pub(crate) fn span_processors(&self) -> &[Box<dyn SpanProcessor>] {
        &self.inner.processors
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.inner.is_shutdown.load(Ordering::Relaxed)
    }

    /// Synchronously flush all processors.
    pub fn force_flush(&self) -> SdkResult {
        aggregate_errors(
            self.inner
                .processors
                .iter()
                .filter_map(|processor| processor.force_flush().err()),
        )
    }

    /// Shut the pipeline down, flushing buffered spans first.
    ///
    /// Only the first call runs the shutdown; later calls (from any
    /// clone) return [`SdkError::AlreadyShutdown`]. Tracers created from
    /// this provider produce inert spans afterwards.
    pub fn shutdown(&self) -> SdkResult {
        if self
            .inner
            .is_shutdown
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SdkError::AlreadyShutdown);
        }
        aggregate_errors(
            self.inner
                .processors
                .iter()
                .filter_map(|processor| processor.shutdown().err()),
        )
    }
}

impl Drop for TracerProviderInner {
    fn drop(&mut self) {
        if !self.is_shutdown.load(Ordering::SeqCst) {
            for processor in &self.processors {
                if let Err(err) = processor.shutdown() {
                    flow_warn!(
                        name: "TracerProvider.DropShutdownFailed",
                        error = err.to_string().as_str()
                    );
                }
            }
        }
    }
}

impl TracerProvider for SdkTracerProvider {
    type Tracer = SdkTracer;

    fn tracer(&self, name: impl Into<Cow<'static, str>>) -> Self::Tracer {
        SdkTracer::new(name.into(), self.clone())
    }
}

/// Configures and builds an [`SdkTracerProvider`].
#[derive(Debug, Default)]
pub struct TracerProviderBuilder {
    processors: Vec<Box<dyn SpanProcessor>>,
    config: Config,
}

impl TracerProviderBuilder {
    /// Export each span synchronously as it ends.
    pub fn with_simple_exporter<E: SpanExporter + 'static>(mut self, exporter: E) -> Self {
        self.processors
            .push(Box::new(SimpleSpanProcessor::new(exporter)));
        self
    }

    /// Export spans in batches from a background thread.
    pub fn with_batch_exporter<E: SpanExporter + 'static>(mut self, exporter: E) -> Self {
        self.processors
            .push(Box::new(BatchSpanProcessor::builder(exporter).build()));
        self
    }

    /// Add a custom processor. Processors run in registration order.
    pub fn with_span_processor<P: SpanProcessor + 'static>(mut self, processor: P) -> Self {
        self.processors.push(Box::new(processor));
        self
    }

    /// Replace the default (always-on) sampler.
    pub fn with_sampler<S: ShouldSample + 'static>(mut self, sampler: S) -> Self {
        self.config.sampler = Box::new(sampler);
        self
    }

    /// Replace the default (random) id generator.
    pub fn with_id_generator<G: IdGenerator + 'static>(mut self, id_generator: G) -> Self {
        self.config.id_generator = Box::new(id_generator);
        self
    }

    /// Replace the default per-span data caps.
    pub fn with_span_limits(mut self, span_limits: SpanLimits) -> Self {
        self.config.span_limits = span_limits;
        self
    }

    /// Build the provider.
    pub fn build(self) -> SdkTracerProvider {
        SdkTracerProvider {
            inner: Arc::new(TracerProviderInner {
                processors: self.processors,
                config: self.config,
                is_shutdown: AtomicBool::new(false),
            }),
        }
    }
}
