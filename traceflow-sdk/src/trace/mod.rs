//! The span pipeline: provider, tracer, span, processors, and their
//! configuration.

mod attributes;
mod config;
mod events;
pub mod id_generator;
mod in_memory_exporter;
mod links;
mod provider;
mod sampler;
mod span;
mod span_processor;
mod tracer;

pub use attributes::AttributeMap;
pub use config::{
    Config, SpanLimits, DEFAULT_MAX_ATTRIBUTES_PER_EVENT, DEFAULT_MAX_ATTRIBUTES_PER_LINK,
    DEFAULT_MAX_ATTRIBUTES_PER_SPAN, DEFAULT_MAX_EVENTS_PER_SPAN, DEFAULT_MAX_LINKS_PER_SPAN,
};
pub use events::SpanEvents;
pub use id_generator::{IdGenerator, IncrementIdGenerator, RandomIdGenerator};
pub use in_memory_exporter::{InMemorySpanExporter, InMemorySpanExporterBuilder};
pub use links::SpanLinks;
pub use provider::{SdkTracerProvider, TracerProviderBuilder};
pub use sampler::{CloneShouldSample, Sampler, ShouldSample};
pub use span::Span;
pub use span_processor::{
    BatchConfig, BatchConfigBuilder, BatchSpanProcessor, BatchSpanProcessorBuilder,
    MultiSpanProcessor, NoopSpanProcessor, SimpleSpanProcessor, SpanProcessor,
    TRACEFLOW_BSP_EXPORT_TIMEOUT,
    TRACEFLOW_BSP_MAX_EXPORT_BATCH_SIZE, TRACEFLOW_BSP_MAX_QUEUE_SIZE,
    TRACEFLOW_BSP_SCHEDULE_DELAY,
};
pub use tracer::SdkTracer;
