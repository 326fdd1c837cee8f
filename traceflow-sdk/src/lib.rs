//! Working implementation of the traceflow tracing API.
//!
//! This crate turns the traits defined in the `traceflow` crate into a
//! functioning pipeline: [`trace::SdkTracerProvider`] creates tracers whose
//! spans flow through configurable [`trace::SpanProcessor`]s into a
//! [`export::SpanExporter`], with batching, retry/backoff, admission
//! control, and idempotent shutdown handled along the way. The
//! [`propagation`] module provides the wire codec that carries trace
//! identity and baggage across process boundaries.
//!
//! Telemetry must never crash the instrumented program: every expected
//! failure in this crate surfaces as a structured `Result` or an internal
//! log line, not a panic.

#![warn(missing_docs, missing_debug_implementations)]

pub mod error;
pub mod export;
pub mod propagation;
pub mod trace;

pub use error::{SdkError, SdkResult};
