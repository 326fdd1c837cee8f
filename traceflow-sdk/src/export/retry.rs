//! Export engine: retry with backoff, admission control, deadline
//! enforcement, and run-once shutdown on top of a pluggable transport.

use super::trace::{ExportError, ExportResult, SpanData, SpanExporter, TransportError};
use futures_timer::Delay;
use futures_util::future::{self, BoxFuture, Either};
use futures_util::FutureExt;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, OnceLock, PoisonError};
use std::time::{Duration, Instant};
use traceflow::{flow_debug, flow_warn};

/// Wire-level sender the [`RetryExporter`] drives.
///
/// Implementations speak one protocol to one destination and report
/// failures as [`TransportError`]s; all retry, deadline, and concurrency
/// decisions stay in the engine.
pub trait SpanTransport: Send + Sync + fmt::Debug + 'static {
    /// Deliver one batch of spans to the destination.
    fn send(&self, batch: Vec<SpanData>) -> BoxFuture<'static, Result<(), TransportError>>;

    /// Tear down any connections held by the transport.
    fn shutdown(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Whether a transport status code is worth retrying.
///
/// Retryable codes signal transient server-side or throttling conditions;
/// everything else, including client errors and code `0`, fails the export
/// immediately.
pub fn is_retryable(status_code: u16) -> bool {
    matches!(status_code, 429 | 502 | 503 | 504)
}

const DEFAULT_MAX_ATTEMPTS: u32 = 4;
const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(1000);
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 1.5;
const DEFAULT_EXPORT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Retry schedule for failed export attempts.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Total attempts per export, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Factor applied to the delay after each retry.
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

/// A [`SpanExporter`] that wraps a [`SpanTransport`] with retry,
/// admission control, a per-export deadline, and guarded shutdown.
///
/// Cloning is cheap and clones share all state, including the shutdown
/// flag and the in-flight count.
#[derive(Clone, Debug)]
pub struct RetryExporter {
    inner: Arc<ExporterInner>,
}

struct ExporterInner {
    transport: Box<dyn SpanTransport>,
    policy: RetryPolicy,
    export_timeout: Duration,
    concurrency_limit: Option<usize>,
    shutdown_timeout: Duration,
    is_shutdown: AtomicBool,
    in_flight: Mutex<usize>,
    idle: Condvar,
    shutdown_result: OnceLock<ExportResult>,
}

impl fmt::Debug for ExporterInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryExporter")
            .field("transport", &self.transport)
            .field("concurrency_limit", &self.concurrency_limit)
            .field("is_shutdown", &self.is_shutdown.load(Ordering::Relaxed))
            .finish()
    }
}

/// Configures and builds a [`RetryExporter`].
#[derive(Debug)]
pub struct RetryExporterBuilder {
    transport: Box<dyn SpanTransport>,
    policy: RetryPolicy,
    export_timeout: Duration,
    concurrency_limit: Option<usize>,
    shutdown_timeout: Duration,
}

impl RetryExporterBuilder {
    /// Replace the default retry schedule.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Deadline for one export, covering all attempts and backoff waits.
    pub fn with_export_timeout(mut self, timeout: Duration) -> Self {
        self.export_timeout = timeout;
        self
    }

    /// Cap on concurrently running exports. Exports beyond the cap are
    /// rejected immediately, never queued. Unlimited by default.
    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = Some(limit);
        self
    }

    /// How long shutdown waits for in-flight exports to drain.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Build the exporter.
    pub fn build(mut self) -> RetryExporter {
        self.policy.max_attempts = self.policy.max_attempts.max(1);
        RetryExporter {
            inner: Arc::new(ExporterInner {
                transport: self.transport,
                policy: self.policy,
                export_timeout: self.export_timeout,
                concurrency_limit: self.concurrency_limit,
                shutdown_timeout: self.shutdown_timeout,
                is_shutdown: AtomicBool::new(false),
                in_flight: Mutex::new(0),
                idle: Condvar::new(),
                shutdown_result: OnceLock::new(),
            }),
        }
    }
}

impl RetryExporter {
    /// Start building an exporter around the given transport.
    pub fn builder<T: SpanTransport>(transport: T) -> RetryExporterBuilder {
        RetryExporterBuilder {
            transport: Box::new(transport),
            policy: RetryPolicy::default(),
            export_timeout: DEFAULT_EXPORT_TIMEOUT,
            concurrency_limit: None,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Wrap a transport with the default policy and limits.
    pub fn new<T: SpanTransport>(transport: T) -> Self {
        Self::builder(transport).build()
    }
}

/// Keeps the in-flight count accurate even when the export future is
/// dropped mid-flight.
struct InFlightPermit {
    inner: Arc<ExporterInner>,
}

impl Drop for InFlightPermit {
    fn drop(&mut self) {
        let mut in_flight = self
            .inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *in_flight = in_flight.saturating_sub(1);
        drop(in_flight);
        self.inner.idle.notify_all();
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "transport panicked".to_string()
    }
}

async fn run_attempts(inner: Arc<ExporterInner>, batch: Vec<SpanData>) -> ExportResult {
    let mut backoff = inner.policy.initial_backoff;
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let outcome = match AssertUnwindSafe(inner.transport.send(batch.clone()))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(payload) => Err(TransportError {
                status_code: 0,
                message: panic_message(payload),
            }),
        };
        match outcome {
            Ok(()) => return Ok(()),
            Err(err) if !is_retryable(err.status_code) => {
                return Err(ExportError::Transport(err));
            }
            Err(err) => {
                if attempt >= inner.policy.max_attempts {
                    return Err(ExportError::RetryExhausted {
                        attempts: attempt,
                        source: err,
                    });
                }
                flow_debug!(
                    name: "RetryExporter.Backoff",
                    status_code = err.status_code,
                    attempt = attempt,
                    delay_ms = backoff.as_millis() as u64
                );
                Delay::new(backoff).await;
                backoff = backoff.mul_f64(inner.policy.backoff_multiplier);
            }
        }
    }
}

impl SpanExporter for RetryExporter {
    fn export(&self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        if self.inner.is_shutdown.load(Ordering::SeqCst) {
            return Box::pin(future::ready(Err(ExportError::AlreadyShutdown)));
        }

        // Admission is decided up front: a full exporter rejects rather
        // than queues, so callers see backpressure immediately.
        {
            let mut in_flight = self
                .inner
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(limit) = self.inner.concurrency_limit {
                if *in_flight >= limit {
                    return Box::pin(future::ready(Err(ExportError::AdmissionRejected)));
                }
            }
            *in_flight += 1;
        }
        let permit = InFlightPermit {
            inner: Arc::clone(&self.inner),
        };

        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            let _permit = permit;
            let deadline = Delay::new(inner.export_timeout);
            let attempts = Box::pin(run_attempts(Arc::clone(&inner), batch));
            match future::select(attempts, deadline).await {
                Either::Left((result, _)) => result,
                Either::Right(((), _)) => Err(ExportError::Timeout(inner.export_timeout)),
            }
        })
    }

    fn shutdown(&self) -> ExportResult {
        self.inner
            .shutdown_result
            .get_or_init(|| {
                self.inner.is_shutdown.store(true, Ordering::SeqCst);

                let teardown = match std::panic::catch_unwind(AssertUnwindSafe(|| {
                    self.inner.transport.shutdown()
                })) {
                    Ok(result) => result.map_err(ExportError::Transport),
                    Err(payload) => Err(ExportError::Transport(TransportError {
                        status_code: 0,
                        message: panic_message(payload),
                    })),
                };

                let deadline = Instant::now() + self.inner.shutdown_timeout;
                let mut in_flight = self
                    .inner
                    .in_flight
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                while *in_flight > 0 {
                    let now = Instant::now();
                    if now >= deadline {
                        flow_warn!(
                            name: "RetryExporter.ShutdownTimedOut",
                            in_flight = *in_flight as u64
                        );
                        return Err(ExportError::Timeout(self.inner.shutdown_timeout));
                    }
                    let (guard, _) = self
                        .inner
                        .idle
                        .wait_timeout(in_flight, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner);
                    in_flight = guard;
                }
                teardown
            })
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{AttributeMap, SpanEvents, SpanLinks};
    use futures_executor::block_on;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::SystemTime;
    use traceflow::trace::{SpanContext, SpanId, SpanKind, Status, TraceFlags, TraceId, TraceState};

    fn test_batch() -> Vec<SpanData> {
        vec![SpanData {
            span_context: SpanContext::new(
                TraceId::from_bytes([1; 16]),
                SpanId::from_bytes([2; 8]),
                TraceFlags::SAMPLED,
                false,
                TraceState::default(),
            ),
            parent_span_id: SpanId::INVALID,
            span_kind: SpanKind::Internal,
            name: "operation".into(),
            start_time: SystemTime::UNIX_EPOCH,
            end_time: SystemTime::UNIX_EPOCH,
            attributes: AttributeMap::default(),
            events: SpanEvents::default(),
            links: SpanLinks::default(),
            status: Status::Unset,
        }]
    }

    fn quick_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(1),
            backoff_multiplier: 1.0,
        }
    }

    /// Transport that answers from a script of status codes, then
    /// succeeds.
    #[derive(Debug, Default)]
    struct ScriptedTransport {
        responses: Mutex<VecDeque<u16>>,
        sends: AtomicUsize,
        shutdowns: AtomicUsize,
    }

    impl ScriptedTransport {
        fn failing_with(codes: impl IntoIterator<Item = u16>) -> Arc<Self> {
            Arc::new(ScriptedTransport {
                responses: Mutex::new(codes.into_iter().collect()),
                ..Default::default()
            })
        }
    }

    impl SpanTransport for Arc<ScriptedTransport> {
        fn send(&self, _batch: Vec<SpanData>) -> BoxFuture<'static, Result<(), TransportError>> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            let next = self.responses.lock().unwrap().pop_front();
            Box::pin(future::ready(match next {
                Some(code) => Err(TransportError {
                    status_code: code,
                    message: format!("status {code}"),
                }),
                None => Ok(()),
            }))
        }

        fn shutdown(&self) -> Result<(), TransportError> {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Transport whose first send blocks until the gate is released.
    #[derive(Debug)]
    struct GatedTransport {
        gate: Mutex<Option<futures_channel::oneshot::Receiver<()>>>,
    }

    impl GatedTransport {
        fn new() -> (Self, futures_channel::oneshot::Sender<()>) {
            let (tx, rx) = futures_channel::oneshot::channel();
            (
                GatedTransport {
                    gate: Mutex::new(Some(rx)),
                },
                tx,
            )
        }
    }

    impl SpanTransport for GatedTransport {
        fn send(&self, _batch: Vec<SpanData>) -> BoxFuture<'static, Result<(), TransportError>> {
            let gate = self.gate.lock().unwrap().take();
            Box::pin(async move {
                if let Some(gate) = gate {
                    let _ = gate.await;
                }
                Ok(())
            })
        }
    }

    #[test]
    fn retryable_status_codes() {
        #[rustfmt::skip]
        let cases = [
            (429, true), (502, true), (503, true), (504, true),
            (400, false), (401, false), (404, false), (500, false),
            (501, false), (200, false), (0, false),
        ];
        for (code, expected) in cases {
            assert_eq!(is_retryable(code), expected, "status {code}");
        }
    }

    #[test]
    fn succeeds_after_retryable_failures() {
        let transport = ScriptedTransport::failing_with([503, 429]);
        let exporter = RetryExporter::builder(Arc::clone(&transport))
            .with_retry_policy(RetryPolicy {
                max_attempts: 4,
                initial_backoff: Duration::from_millis(20),
                backoff_multiplier: 1.5,
            })
            .build();

        let started = Instant::now();
        assert_eq!(block_on(exporter.export(test_batch())), Ok(()));
        assert_eq!(transport.sends.load(Ordering::SeqCst), 3);
        // Two backoff waits: 20ms then 30ms.
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let transport = ScriptedTransport::failing_with([503, 503, 503, 503]);
        let exporter = RetryExporter::builder(Arc::clone(&transport))
            .with_retry_policy(quick_policy())
            .build();
        let result = block_on(exporter.export(test_batch()));
        assert_eq!(
            result,
            Err(ExportError::RetryExhausted {
                attempts: 4,
                source: TransportError {
                    status_code: 503,
                    message: "status 503".to_string(),
                },
            })
        );
        assert_eq!(transport.sends.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn non_retryable_fails_without_retry() {
        let transport = ScriptedTransport::failing_with([400]);
        let exporter = RetryExporter::builder(Arc::clone(&transport))
            .with_retry_policy(quick_policy())
            .build();
        let result = block_on(exporter.export(test_batch()));
        assert!(matches!(
            result,
            Err(ExportError::Transport(TransportError {
                status_code: 400,
                ..
            }))
        ));
        assert_eq!(transport.sends.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn transport_panic_is_contained() {
        #[derive(Debug)]
        struct PanickingTransport;

        impl SpanTransport for PanickingTransport {
            fn send(
                &self,
                _batch: Vec<SpanData>,
            ) -> BoxFuture<'static, Result<(), TransportError>> {
                Box::pin(async { panic!("wire fault") })
            }
        }

        let exporter = RetryExporter::new(PanickingTransport);
        let result = block_on(exporter.export(test_batch()));
        assert_eq!(
            result,
            Err(ExportError::Transport(TransportError {
                status_code: 0,
                message: "wire fault".to_string(),
            }))
        );
    }

    #[test]
    fn export_respects_deadline() {
        #[derive(Debug)]
        struct StuckTransport;

        impl SpanTransport for StuckTransport {
            fn send(
                &self,
                _batch: Vec<SpanData>,
            ) -> BoxFuture<'static, Result<(), TransportError>> {
                Box::pin(std::future::pending())
            }
        }

        let timeout = Duration::from_millis(20);
        let exporter = RetryExporter::builder(StuckTransport)
            .with_export_timeout(timeout)
            .build();
        assert_eq!(
            block_on(exporter.export(test_batch())),
            Err(ExportError::Timeout(timeout))
        );
    }

    #[test]
    fn admission_rejects_beyond_limit() {
        let (transport, release) = GatedTransport::new();
        let exporter = RetryExporter::builder(transport)
            .with_concurrency_limit(1)
            .build();

        let busy = exporter.clone();
        let worker = thread::spawn(move || block_on(busy.export(test_batch())));

        // Give the first export time to take the only slot.
        thread::sleep(Duration::from_millis(100));
        assert_eq!(
            block_on(exporter.export(test_batch())),
            Err(ExportError::AdmissionRejected)
        );

        let _ = release.send(());
        assert_eq!(worker.join().unwrap(), Ok(()));

        // The slot is free again once the first export finishes.
        assert_eq!(block_on(exporter.export(test_batch())), Ok(()));
    }

    #[test]
    fn shutdown_runs_once_and_gates_exports() {
        let transport = Arc::new(ScriptedTransport::default());
        let exporter = RetryExporter::new(Arc::clone(&transport));
        assert_eq!(exporter.shutdown(), Ok(()));
        assert_eq!(exporter.shutdown(), Ok(()));
        assert_eq!(transport.shutdowns.load(Ordering::SeqCst), 1);

        assert_eq!(
            block_on(exporter.export(test_batch())),
            Err(ExportError::AlreadyShutdown)
        );
        assert_eq!(transport.sends.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn shutdown_result_is_cached() {
        let (transport, release) = GatedTransport::new();
        let timeout = Duration::from_millis(20);
        let exporter = RetryExporter::builder(transport)
            .with_shutdown_timeout(timeout)
            .build();

        let busy = exporter.clone();
        let worker = thread::spawn(move || block_on(busy.export(test_batch())));
        thread::sleep(Duration::from_millis(100));

        // The in-flight export outlives the drain window.
        assert_eq!(exporter.shutdown(), Err(ExportError::Timeout(timeout)));

        let _ = release.send(());
        let _ = worker.join().unwrap();

        // Later calls replay the first outcome rather than re-running.
        assert_eq!(exporter.shutdown(), Err(ExportError::Timeout(timeout)));
    }
}
