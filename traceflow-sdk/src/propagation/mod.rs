//! Wire propagation formats implemented by this SDK.

mod jaeger;

pub use jaeger::JaegerPropagator;
