//! Span processors: the hook between ended spans and their exporter.
//!
//! [`SimpleSpanProcessor`] exports every span inline as it ends, which
//! is predictable but slow. [`BatchSpanProcessor`] queues spans into a
//! dedicated worker thread and exports them in batches, trading latency
//! for throughput. [`MultiSpanProcessor`] fans out to several child
//! processors while isolating their failures from each other.

use crate::error::{aggregate_errors, SdkError, SdkResult};
use crate::export::{SpanData, SpanExporter};
use crate::trace::Span;
use futures_executor::block_on;
use futures_timer::Delay;
use futures_util::future::{select, Either};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use traceflow::{flow_debug, flow_warn, Context};

/// Hooks invoked at the start and end of every span's life.
///
/// `on_start` and `on_end` sit on the application's hot path and must
/// not block longer than they have to; `force_flush` and `shutdown` are
/// lifecycle calls and may block.
pub trait SpanProcessor: Send + Sync + fmt::Debug {
    /// Called when a recording span starts, before it is handed to the
    /// caller.
    fn on_start(&self, span: &mut Span, cx: &Context);

    /// Called with the finished data of every ended span.
    fn on_end(&self, span: SpanData);

    /// Push all buffered spans to the exporter and wait for the result.
    fn force_flush(&self) -> SdkResult;

    /// Flush, then release the processor's resources. Must be safe to
    /// call more than once.
    fn shutdown(&self) -> SdkResult;
}

/// A [`SpanProcessor`] that does nothing, for configurations that want a
/// pipeline shape without any export.
#[derive(Debug, Default)]
pub struct NoopSpanProcessor;

impl SpanProcessor for NoopSpanProcessor {
    fn on_start(&self, _span: &mut Span, _cx: &Context) {}

    fn on_end(&self, _span: SpanData) {}

    fn force_flush(&self) -> SdkResult {
        Ok(())
    }

    fn shutdown(&self) -> SdkResult {
        Ok(())
    }
}

/// A [`SpanProcessor`] that exports each span as soon as it ends, on the
/// thread that ended it.
#[derive(Debug)]
pub struct SimpleSpanProcessor {
    exporter: Box<dyn SpanExporter>,
    is_shutdown: AtomicBool,
}

impl SimpleSpanProcessor {
    /// Wraps an exporter for inline, per-span export.
    pub fn new<E: SpanExporter + 'static>(exporter: E) -> Self {
        SimpleSpanProcessor {
            exporter: Box::new(exporter),
            is_shutdown: AtomicBool::new(false),
        }
    }
}

impl SpanProcessor for SimpleSpanProcessor {
    fn on_start(&self, _span: &mut Span, _cx: &Context) {}

    fn on_end(&self, span: SpanData) {
        if !span.span_context.is_sampled() {
            return;
        }
        if self.is_shutdown.load(Ordering::Relaxed) {
            flow_warn!(name: "SimpleSpanProcessor.SpanAfterShutdown");
            return;
        }
        if let Err(err) = block_on(self.exporter.export(vec![span])) {
            flow_warn!(
                name: "SimpleSpanProcessor.ExportFailed",
                error = err.to_string().as_str()
            );
        }
    }

    fn force_flush(&self) -> SdkResult {
        self.exporter
            .force_flush()
            .map_err(|err| SdkError::InternalFailure(err.to_string()))
    }

    fn shutdown(&self) -> SdkResult {
        if self.is_shutdown.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.exporter
            .shutdown()
            .map_err(|err| SdkError::InternalFailure(err.to_string()))
    }
}

const DEFAULT_MAX_QUEUE_SIZE: usize = 2048;
const DEFAULT_SCHEDULE_DELAY: Duration = Duration::from_millis(5000);
const DEFAULT_MAX_EXPORT_BATCH_SIZE: usize = 512;
const DEFAULT_EXPORT_TIMEOUT: Duration = Duration::from_millis(30_000);
const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

// Slack beyond the span queue so flush and shutdown requests always fit.
const CONTROL_HEADROOM: usize = 16;

/// Maximum spans held by the batch processor, as a count.
pub const TRACEFLOW_BSP_MAX_QUEUE_SIZE: &str = "TRACEFLOW_BSP_MAX_QUEUE_SIZE";
/// Delay between scheduled exports, in milliseconds.
pub const TRACEFLOW_BSP_SCHEDULE_DELAY: &str = "TRACEFLOW_BSP_SCHEDULE_DELAY";
/// Maximum spans per exported batch, as a count.
pub const TRACEFLOW_BSP_MAX_EXPORT_BATCH_SIZE: &str = "TRACEFLOW_BSP_MAX_EXPORT_BATCH_SIZE";
/// Deadline for one batch export, in milliseconds.
pub const TRACEFLOW_BSP_EXPORT_TIMEOUT: &str = "TRACEFLOW_BSP_EXPORT_TIMEOUT";

fn env_usize(name: &str, default: usize) -> usize {
    match std::env::var(name) {
        Ok(value) => match value.parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                flow_warn!(
                    name: "BatchConfig.InvalidEnvValue",
                    variable = name,
                    value = value.as_str()
                );
                default
            }
        },
        Err(_) => default,
    }
}

fn env_duration(name: &str, default: Duration) -> Duration {
    match std::env::var(name) {
        Ok(value) => match value.parse::<u64>() {
            Ok(millis) => Duration::from_millis(millis),
            Err(_) => {
                flow_warn!(
                    name: "BatchConfig.InvalidEnvValue",
                    variable = name,
                    value = value.as_str()
                );
                default
            }
        },
        Err(_) => default,
    }
}

/// Settings for a [`BatchSpanProcessor`].
#[derive(Clone, Debug)]
pub struct BatchConfig {
    max_queue_size: usize,
    scheduled_delay: Duration,
    max_export_batch_size: usize,
    export_timeout: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfigBuilder::default().build()
    }
}

/// Builds a [`BatchConfig`], seeded from the `TRACEFLOW_BSP_*`
/// environment variables.
#[derive(Clone, Debug)]
pub struct BatchConfigBuilder {
    max_queue_size: usize,
    scheduled_delay: Duration,
    max_export_batch_size: usize,
    export_timeout: Duration,
}

impl Default for BatchConfigBuilder {
    fn default() -> Self {
        BatchConfigBuilder {
            max_queue_size: env_usize(TRACEFLOW_BSP_MAX_QUEUE_SIZE, DEFAULT_MAX_QUEUE_SIZE),
            scheduled_delay: env_duration(TRACEFLOW_BSP_SCHEDULE_DELAY, DEFAULT_SCHEDULE_DELAY),
            max_export_batch_size: env_usize(
                TRACEFLOW_BSP_MAX_EXPORT_BATCH_SIZE,
                DEFAULT_MAX_EXPORT_BATCH_SIZE,
            ),
            export_timeout: env_duration(TRACEFLOW_BSP_EXPORT_TIMEOUT, DEFAULT_EXPORT_TIMEOUT),
        }
    }
}

impl BatchConfigBuilder {
    /// Cap on spans waiting to be exported; further spans are dropped.
    pub fn with_max_queue_size(mut self, max_queue_size: usize) -> Self {
        self.max_queue_size = max_queue_size;
        self
    }

    /// Interval between scheduled exports.
    pub fn with_scheduled_delay(mut self, scheduled_delay: Duration) -> Self {
        self.scheduled_delay = scheduled_delay;
        self
    }

    /// Cap on spans per exported batch. Clamped to the queue size, with a
    /// floor of one.
    pub fn with_max_export_batch_size(mut self, max_export_batch_size: usize) -> Self {
        self.max_export_batch_size = max_export_batch_size;
        self
    }

    /// Deadline for one batch export.
    pub fn with_export_timeout(mut self, export_timeout: Duration) -> Self {
        self.export_timeout = export_timeout;
        self
    }

    /// Build the config.
    pub fn build(self) -> BatchConfig {
        BatchConfig {
            max_queue_size: self.max_queue_size,
            scheduled_delay: self.scheduled_delay,
            max_export_batch_size: self.max_export_batch_size.min(self.max_queue_size).max(1),
            export_timeout: self.export_timeout,
        }
    }
}

enum BatchMessage {
    Span(SpanData),
    ForceFlush(SyncSender<SdkResult>),
    Shutdown(SyncSender<SdkResult>),
}

/// A [`SpanProcessor`] that batches spans on a dedicated worker thread.
///
/// Ended spans go into a bounded queue; when the queue is full, new
/// spans are dropped and counted rather than blocking the application
/// or evicting older spans. The worker exports a batch when enough
/// spans have accumulated or when the schedule delay elapses, whichever
/// comes first.
#[derive(Debug)]
pub struct BatchSpanProcessor {
    sender: SyncSender<BatchMessage>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
    is_shutdown: AtomicBool,
    queued_spans: Arc<AtomicUsize>,
    dropped_spans: AtomicUsize,
    max_queue_size: usize,
    reply_timeout: Duration,
}

impl BatchSpanProcessor {
    /// Start configuring a batch processor around the given exporter.
    pub fn builder<E: SpanExporter + 'static>(exporter: E) -> BatchSpanProcessorBuilder<E> {
        BatchSpanProcessorBuilder {
            exporter,
            config: BatchConfig::default(),
        }
    }

    /// How many spans have been dropped because the queue was full.
    pub fn dropped_spans(&self) -> usize {
        self.dropped_spans.load(Ordering::Relaxed)
    }

    fn record_dropped_span(&self) {
        if self.dropped_spans.fetch_add(1, Ordering::Relaxed) == 0 {
            flow_warn!(
                name: "BatchSpanProcessor.SpanDropped",
                reason = "queue full"
            );
        }
    }

    fn request(
        &self,
        message: impl FnOnce(SyncSender<SdkResult>) -> BatchMessage,
    ) -> SdkResult {
        let (reply, response) = mpsc::sync_channel(1);
        self.sender
            .try_send(message(reply))
            .map_err(|_| SdkError::InternalFailure("batch worker unreachable".to_string()))?;
        match response.recv_timeout(self.reply_timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(SdkError::Timeout(self.reply_timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(SdkError::InternalFailure(
                "batch worker exited".to_string(),
            )),
        }
    }
}

impl SpanProcessor for BatchSpanProcessor {
    fn on_start(&self, _span: &mut Span, _cx: &Context) {}

    fn on_end(&self, span: SpanData) {
        if !span.span_context.is_sampled() {
            return;
        }
        if self.is_shutdown.load(Ordering::Relaxed) {
            flow_warn!(name: "BatchSpanProcessor.SpanAfterShutdown");
            return;
        }
        // Reserve a queue slot; the worker releases it once the span has
        // been handed to the exporter.
        if self.queued_spans.fetch_add(1, Ordering::SeqCst) >= self.max_queue_size {
            self.queued_spans.fetch_sub(1, Ordering::SeqCst);
            self.record_dropped_span();
            return;
        }
        if self.sender.try_send(BatchMessage::Span(span)).is_err() {
            self.queued_spans.fetch_sub(1, Ordering::SeqCst);
            self.record_dropped_span();
        }
    }

    fn force_flush(&self) -> SdkResult {
        if self.is_shutdown.load(Ordering::SeqCst) {
            return Err(SdkError::AlreadyShutdown);
        }
        self.request(BatchMessage::ForceFlush)
    }

    fn shutdown(&self) -> SdkResult {
        if self.is_shutdown.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let dropped = self.dropped_spans.load(Ordering::Relaxed);
        if dropped > 0 {
            flow_warn!(
                name: "BatchSpanProcessor.SpansDropped",
                count = dropped as u64
            );
        }
        let result = self.request(BatchMessage::Shutdown);
        if let Some(handle) = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            if handle.join().is_err() {
                return Err(SdkError::InternalFailure(
                    "batch worker panicked".to_string(),
                ));
            }
        }
        result
    }
}

/// Configures and builds a [`BatchSpanProcessor`].
#[derive(Debug)]
pub struct BatchSpanProcessorBuilder<E> {
    exporter: E,
    config: BatchConfig,
}

impl<E: SpanExporter + 'static> BatchSpanProcessorBuilder<E> {
    /// Replace the default batch configuration.
    pub fn with_batch_config(mut self, config: BatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the processor, spawning its worker thread.
    pub fn build(self) -> BatchSpanProcessor {
        let config = self.config;
        let (sender, receiver) =
            mpsc::sync_channel(config.max_queue_size + CONTROL_HEADROOM);
        let queued_spans = Arc::new(AtomicUsize::new(0));
        let max_queue_size = config.max_queue_size;

        let worker = BatchWorker {
            exporter: self.exporter,
            config,
            receiver,
            queued_spans: Arc::clone(&queued_spans),
            buffer: Vec::new(),
        };
        let handle = thread::Builder::new()
            .name("traceflow-batch-processor".to_string())
            .spawn(move || worker.run())
            .expect("failed to spawn batch span processor thread");

        BatchSpanProcessor {
            sender,
            handle: Mutex::new(Some(handle)),
            is_shutdown: AtomicBool::new(false),
            queued_spans,
            dropped_spans: AtomicUsize::new(0),
            max_queue_size,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
        }
    }
}

struct BatchWorker<E> {
    exporter: E,
    config: BatchConfig,
    receiver: Receiver<BatchMessage>,
    queued_spans: Arc<AtomicUsize>,
    buffer: Vec<SpanData>,
}

enum Control {
    Flush(SyncSender<SdkResult>),
    Stop(SyncSender<SdkResult>),
}

impl<E: SpanExporter> BatchWorker<E> {
    fn run(mut self) {
        let mut next_export = Instant::now() + self.config.scheduled_delay;
        loop {
            let timeout = next_export.saturating_duration_since(Instant::now());
            match self.receiver.recv_timeout(timeout) {
                Ok(BatchMessage::Span(span)) => {
                    self.buffer.push(span);
                    if self.buffer.len() >= self.config.max_export_batch_size {
                        if let Err(err) = self.export_one_batch() {
                            flow_warn!(
                                name: "BatchSpanProcessor.ExportFailed",
                                error = err.to_string().as_str()
                            );
                        }
                    }
                }
                Ok(BatchMessage::ForceFlush(reply)) => {
                    let controls = self.drain_spans();
                    let result = self.export_all();
                    let _ = reply.send(result);
                    if self.handle_controls(controls) {
                        return;
                    }
                }
                Ok(BatchMessage::Shutdown(reply)) => {
                    self.finish(reply);
                    return;
                }
                Err(RecvTimeoutError::Timeout) => {
                    if let Err(err) = self.export_one_batch() {
                        flow_warn!(
                            name: "BatchSpanProcessor.ExportFailed",
                            error = err.to_string().as_str()
                        );
                    }
                    next_export = Instant::now() + self.config.scheduled_delay;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    let _ = self.export_all();
                    return;
                }
            }
        }
    }

    /// Pull every already-queued span into the buffer, setting aside any
    /// control messages found between them.
    fn drain_spans(&mut self) -> Vec<Control> {
        let mut controls = Vec::new();
        while let Ok(message) = self.receiver.try_recv() {
            match message {
                BatchMessage::Span(span) => self.buffer.push(span),
                BatchMessage::ForceFlush(reply) => controls.push(Control::Flush(reply)),
                BatchMessage::Shutdown(reply) => controls.push(Control::Stop(reply)),
            }
        }
        controls
    }

    /// Answer controls collected during a drain. Returns `true` when a
    /// shutdown was among them and the worker should exit.
    fn handle_controls(&mut self, controls: Vec<Control>) -> bool {
        for control in controls {
            match control {
                Control::Flush(reply) => {
                    let result = self.export_all();
                    let _ = reply.send(result);
                }
                Control::Stop(reply) => {
                    self.finish(reply);
                    return true;
                }
            }
        }
        false
    }

    fn finish(&mut self, reply: SyncSender<SdkResult>) {
        let controls = self.drain_spans();
        let mut result = self.export_all();
        for control in controls {
            match control {
                Control::Flush(flush_reply) => {
                    let _ = flush_reply.send(result.clone());
                }
                Control::Stop(stop_reply) => {
                    let _ = stop_reply.send(Err(SdkError::AlreadyShutdown));
                }
            }
        }
        let teardown = self
            .exporter
            .shutdown()
            .map_err(|err| SdkError::InternalFailure(err.to_string()));
        if result.is_ok() {
            result = teardown;
        }
        let _ = reply.send(result);
    }

    /// Export the oldest spans in the buffer, at most one batch's worth.
    fn export_one_batch(&mut self) -> SdkResult {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let batch_size = self.config.max_export_batch_size.min(self.buffer.len());
        let batch: Vec<SpanData> = self.buffer.drain(..batch_size).collect();
        let count = batch.len();
        flow_debug!(
            name: "BatchSpanProcessor.ExportingBatch",
            batch_size = count as u64
        );
        let result = self.export(batch);
        self.queued_spans.fetch_sub(count, Ordering::SeqCst);
        result
    }

    fn export_all(&mut self) -> SdkResult {
        let mut first_error = None;
        while !self.buffer.is_empty() {
            if let Err(err) = self.export_one_batch() {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn export(&mut self, batch: Vec<SpanData>) -> SdkResult {
        let deadline = Delay::new(self.config.export_timeout);
        match block_on(select(self.exporter.export(batch), deadline)) {
            Either::Left((Ok(()), _)) => Ok(()),
            Either::Left((Err(err), _)) => Err(SdkError::InternalFailure(err.to_string())),
            Either::Right(((), _)) => Err(SdkError::Timeout(self.config.export_timeout)),
        }
    }
}

/// A [`SpanProcessor`] that fans out to several children in order.
///
/// A child that fails or panics never prevents its siblings from seeing
/// the span; lifecycle results are aggregated across all children.
/// `force_flush` and `shutdown` run the children one after another, so a
/// slow child delays when its siblings start flushing and the total wait
/// is the sum of the children's, not the maximum.
#[derive(Debug)]
pub struct MultiSpanProcessor {
    processors: Vec<Box<dyn SpanProcessor>>,
}

impl MultiSpanProcessor {
    /// Combine the given processors into one.
    pub fn new(processors: Vec<Box<dyn SpanProcessor>>) -> Self {
        MultiSpanProcessor { processors }
    }

    fn isolated(operation: impl FnOnce() -> SdkResult) -> SdkResult {
        match catch_unwind(AssertUnwindSafe(operation)) {
            Ok(result) => result,
            Err(_) => Err(SdkError::InternalFailure(
                "span processor panicked".to_string(),
            )),
        }
    }
}

impl SpanProcessor for MultiSpanProcessor {
    fn on_start(&self, span: &mut Span, cx: &Context) {
        for processor in &self.processors {
            if catch_unwind(AssertUnwindSafe(|| processor.on_start(span, cx))).is_err() {
                flow_warn!(name: "MultiSpanProcessor.OnStartPanicked");
            }
        }
    }

    fn on_end(&self, span: SpanData) {
        for processor in &self.processors {
            let span = span.clone();
            if catch_unwind(AssertUnwindSafe(|| processor.on_end(span))).is_err() {
                flow_warn!(name: "MultiSpanProcessor.OnEndPanicked");
            }
        }
    }

    fn force_flush(&self) -> SdkResult {
        aggregate_errors(
            self.processors
                .iter()
                .filter_map(|processor| Self::isolated(|| processor.force_flush()).err()),
        )
    }

    fn shutdown(&self) -> SdkResult {
        aggregate_errors(
            self.processors
                .iter()
                .filter_map(|processor| Self::isolated(|| processor.shutdown()).err()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{AttributeMap, SpanEvents, SpanLinks};
    use futures_util::future::BoxFuture;
    use std::time::SystemTime;
    use traceflow::trace::{
        SpanContext, SpanId, SpanKind, Status, TraceFlags, TraceId, TraceState,
    };

    fn span_with_flags(name: &'static str, flags: TraceFlags) -> SpanData {
        SpanData {
            span_context: SpanContext::new(
                TraceId::from_bytes([1; 16]),
                SpanId::from_bytes([2; 8]),
                flags,
                false,
                TraceState::default(),
            ),
            parent_span_id: SpanId::INVALID,
            span_kind: SpanKind::Internal,
            name: name.into(),
            start_time: SystemTime::UNIX_EPOCH,
            end_time: SystemTime::UNIX_EPOCH,
            attributes: AttributeMap::default(),
            events: SpanEvents::default(),
            links: SpanLinks::default(),
            status: Status::Unset,
        }
    }

    fn sampled_span(name: &'static str) -> SpanData {
        span_with_flags(name, TraceFlags::SAMPLED)
    }

    /// Exporter that records each exported batch.
    #[derive(Clone, Debug, Default)]
    struct BatchRecordingExporter {
        batches: Arc<Mutex<Vec<Vec<SpanData>>>>,
        shutdowns: Arc<AtomicUsize>,
    }

    impl BatchRecordingExporter {
        fn batch_sizes(&self) -> Vec<usize> {
            self.batches.lock().unwrap().iter().map(Vec::len).collect()
        }

        fn exported_spans(&self) -> usize {
            self.batches.lock().unwrap().iter().map(Vec::len).sum()
        }
    }

    impl SpanExporter for BatchRecordingExporter {
        fn export(
            &self,
            batch: Vec<SpanData>,
        ) -> BoxFuture<'static, crate::export::ExportResult> {
            self.batches.lock().unwrap().push(batch);
            Box::pin(futures_util::future::ready(Ok(())))
        }

        fn shutdown(&self) -> crate::export::ExportResult {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn small_batch_processor(
        exporter: BatchRecordingExporter,
        queue: usize,
        batch: usize,
    ) -> BatchSpanProcessor {
        BatchSpanProcessor::builder(exporter).with_batch_config(
            BatchConfigBuilder::default()
                .with_max_queue_size(queue)
                .with_max_export_batch_size(batch)
                .with_scheduled_delay(Duration::from_secs(3600))
                .build(),
        )
        .build()
    }

    #[test]
    fn batch_config_reads_env_vars() {
        temp_env::with_vars(
            [
                (TRACEFLOW_BSP_MAX_QUEUE_SIZE, Some("4096")),
                (TRACEFLOW_BSP_SCHEDULE_DELAY, Some("250")),
                (TRACEFLOW_BSP_MAX_EXPORT_BATCH_SIZE, Some("128")),
                (TRACEFLOW_BSP_EXPORT_TIMEOUT, Some("1500")),
            ],
            || {
                let config = BatchConfig::default();
                assert_eq!(config.max_queue_size, 4096);
                assert_eq!(config.scheduled_delay, Duration::from_millis(250));
                assert_eq!(config.max_export_batch_size, 128);
                assert_eq!(config.export_timeout, Duration::from_millis(1500));
            },
        );
    }

    #[test]
    fn batch_config_ignores_invalid_env_values() {
        temp_env::with_vars(
            [(TRACEFLOW_BSP_MAX_QUEUE_SIZE, Some("not-a-number"))],
            || {
                assert_eq!(BatchConfig::default().max_queue_size, DEFAULT_MAX_QUEUE_SIZE);
            },
        );
    }

    #[test]
    fn batch_size_is_clamped_to_queue_size() {
        let config = BatchConfigBuilder::default()
            .with_max_queue_size(10)
            .with_max_export_batch_size(512)
            .build();
        assert_eq!(config.max_export_batch_size, 10);
    }

    #[test]
    fn zero_batch_size_is_floored_to_one() {
        let config = BatchConfigBuilder::default()
            .with_max_queue_size(10)
            .with_max_export_batch_size(0)
            .build();
        assert_eq!(config.max_export_batch_size, 1);

        temp_env::with_vars(
            [(TRACEFLOW_BSP_MAX_EXPORT_BATCH_SIZE, Some("0"))],
            || {
                assert_eq!(BatchConfig::default().max_export_batch_size, 1);
            },
        );
    }

    #[test]
    fn zero_batch_size_flush_and_shutdown_terminate() {
        let exporter = BatchRecordingExporter::default();
        let processor = small_batch_processor(exporter.clone(), 100, 0);

        processor.on_end(sampled_span("operation"));
        assert_eq!(processor.force_flush(), Ok(()));
        assert_eq!(exporter.exported_spans(), 1);
        assert_eq!(processor.shutdown(), Ok(()));
    }

    #[test]
    fn batch_exports_when_threshold_reached() {
        let exporter = BatchRecordingExporter::default();
        let processor = small_batch_processor(exporter.clone(), 100, 5);

        for _ in 0..5 {
            processor.on_end(sampled_span("operation"));
        }

        // The worker exports asynchronously; poll briefly.
        let deadline = Instant::now() + Duration::from_secs(5);
        while exporter.exported_spans() < 5 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(exporter.batch_sizes(), [5]);
        processor.shutdown().unwrap();
    }

    #[test]
    fn batch_threshold_exports_oldest_spans_only() {
        let exporter = BatchRecordingExporter::default();
        let processor = small_batch_processor(exporter.clone(), 100, 2);

        for _ in 0..3 {
            processor.on_end(sampled_span("operation"));
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        while exporter.exported_spans() < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(exporter.batch_sizes(), [2]);

        // The straggler stays queued until the next trigger.
        processor.force_flush().unwrap();
        assert_eq!(exporter.batch_sizes(), [2, 1]);
        processor.shutdown().unwrap();
    }

    #[test]
    fn noop_processor_discards_spans() {
        let processor = NoopSpanProcessor;
        processor.on_end(sampled_span("operation"));
        assert_eq!(processor.force_flush(), Ok(()));
        assert_eq!(processor.shutdown(), Ok(()));
    }

    #[test]
    fn queue_overflow_drops_new_spans() {
        let exporter = BatchRecordingExporter::default();
        let processor = small_batch_processor(exporter.clone(), 5, 5000);

        for _ in 0..8 {
            processor.on_end(sampled_span("operation"));
        }
        assert_eq!(processor.dropped_spans(), 3);

        processor.force_flush().unwrap();
        assert_eq!(exporter.exported_spans(), 5);
        processor.shutdown().unwrap();
    }

    #[test]
    fn scheduled_delay_triggers_export() {
        let exporter = BatchRecordingExporter::default();
        let processor = BatchSpanProcessor::builder(exporter.clone())
            .with_batch_config(
                BatchConfigBuilder::default()
                    .with_scheduled_delay(Duration::from_millis(50))
                    .build(),
            )
            .build();

        processor.on_end(sampled_span("operation"));
        processor.on_end(sampled_span("operation"));

        let deadline = Instant::now() + Duration::from_secs(5);
        while exporter.exported_spans() < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(exporter.exported_spans(), 2);
        processor.shutdown().unwrap();
    }

    #[test]
    fn shutdown_flushes_and_is_idempotent() {
        let exporter = BatchRecordingExporter::default();
        let processor = small_batch_processor(exporter.clone(), 100, 50);

        for _ in 0..7 {
            processor.on_end(sampled_span("operation"));
        }
        assert_eq!(processor.shutdown(), Ok(()));
        assert_eq!(exporter.exported_spans(), 7);
        assert_eq!(exporter.shutdowns.load(Ordering::SeqCst), 1);

        // Repeat shutdowns succeed without touching the exporter again.
        assert_eq!(processor.shutdown(), Ok(()));
        assert_eq!(exporter.shutdowns.load(Ordering::SeqCst), 1);

        processor.on_end(sampled_span("late"));
        assert_eq!(exporter.exported_spans(), 7);
    }

    #[test]
    fn unsampled_spans_never_reach_exporter() {
        let exporter = BatchRecordingExporter::default();
        let processor = small_batch_processor(exporter.clone(), 100, 1);

        processor.on_end(span_with_flags("quiet", TraceFlags::default()));
        processor.force_flush().unwrap();
        assert_eq!(exporter.exported_spans(), 0);
        processor.shutdown().unwrap();
    }

    #[test]
    fn simple_processor_skips_unsampled_spans() {
        let exporter = BatchRecordingExporter::default();
        let processor = SimpleSpanProcessor::new(exporter.clone());

        processor.on_end(span_with_flags("quiet", TraceFlags::default()));
        assert_eq!(exporter.exported_spans(), 0);

        processor.on_end(sampled_span("loud"));
        assert_eq!(exporter.batch_sizes(), [1]);
    }

    #[test]
    fn multi_processor_isolates_panicking_children() {
        #[derive(Debug)]
        struct PanickingProcessor;

        impl SpanProcessor for PanickingProcessor {
            fn on_start(&self, _span: &mut Span, _cx: &Context) {}

            fn on_end(&self, _span: SpanData) {
                panic!("processor fault");
            }

            fn force_flush(&self) -> SdkResult {
                panic!("processor fault");
            }

            fn shutdown(&self) -> SdkResult {
                Ok(())
            }
        }

        #[derive(Debug, Default)]
        struct CountingProcessor {
            ended: Arc<AtomicUsize>,
        }

        impl SpanProcessor for CountingProcessor {
            fn on_start(&self, _span: &mut Span, _cx: &Context) {}

            fn on_end(&self, _span: SpanData) {
                self.ended.fetch_add(1, Ordering::SeqCst);
            }

            fn force_flush(&self) -> SdkResult {
                Ok(())
            }

            fn shutdown(&self) -> SdkResult {
                Ok(())
            }
        }

        let ended = Arc::new(AtomicUsize::new(0));
        let multi = MultiSpanProcessor::new(vec![
            Box::new(PanickingProcessor),
            Box::new(CountingProcessor {
                ended: ended.clone(),
            }),
        ]);

        multi.on_end(sampled_span("operation"));
        assert_eq!(ended.load(Ordering::SeqCst), 1);

        // The panic surfaces as an error without blocking the sibling.
        assert!(matches!(
            multi.force_flush(),
            Err(SdkError::InternalFailure(_))
        ));
        assert_eq!(multi.shutdown(), Ok(()));
    }
}
