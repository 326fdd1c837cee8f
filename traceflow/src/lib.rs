//! Core API for the traceflow distributed tracing SDK.
//!
//! This crate holds the value types and traits shared between
//! instrumentation code and SDK implementations: trace identity
//! ([`trace::SpanContext`] and friends), the [`Context`] used for implicit
//! propagation, [`baggage::Baggage`], the [`trace::Span`] / [`trace::Tracer`] /
//! [`trace::TracerProvider`] traits, and the [`propagation`] codec traits.
//!
//! It performs no I/O of its own. The working implementation lives in the
//! `traceflow-sdk` crate; this crate only defines the contracts plus no-op
//! fallbacks so that instrumented libraries can link against a stable
//! surface regardless of which SDK (if any) the application installs.

#![warn(missing_docs, missing_debug_implementations)]

mod common;
mod context;

#[macro_use]
mod internal_logging;

pub mod baggage;
pub mod global;
pub mod propagation;
pub mod time;
pub mod trace;

mod trace_context;

pub use common::{Array, Key, KeyValue, StringValue, Value};
pub use context::{Context, ContextGuard};

#[doc(hidden)]
#[cfg(feature = "internal-logs")]
pub mod _private {
    pub use tracing::{debug, error, info, warn};
}
