//! Carrier abstractions and codec traits for cross-process context
//! propagation.
//!
//! A propagator encodes the active [`SpanContext`] and
//! [`Baggage`] into a text carrier (HTTP headers or any key/value
//! map) on the way out, and decodes them on the way in. The carrier is
//! abstracted behind the [`Injector`] and [`Extractor`] traits so the same
//! codec works for any host header map.
//!
//! [`SpanContext`]: crate::trace::SpanContext
//! [`Baggage`]: crate::baggage::Baggage

use std::collections::HashMap;

mod composite;
mod text_map_propagator;

pub use composite::TextMapCompositePropagator;
pub use text_map_propagator::{FieldIter, TextMapPropagator};

/// Mutable access to an outgoing carrier.
pub trait Injector {
    /// Set a key/value pair on the carrier.
    fn set(&mut self, key: &str, value: String);
}

/// Read-only access to an incoming carrier.
pub trait Extractor {
    /// Get the value for the given key, if it exists.
    fn get(&self, key: &str) -> Option<&str>;

    /// All keys present in the carrier.
    fn keys(&self) -> Vec<&str>;
}

impl<S: std::hash::BuildHasher> Injector for HashMap<String, String, S> {
    /// Set a key/value pair. Keys are lowercased, matching HTTP header
    /// semantics.
    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_lowercase(), value);
    }
}

impl<S: std::hash::BuildHasher> Extractor for HashMap<String, String, S> {
    /// Get a value. Keys are looked up lowercased, matching HTTP header
    /// semantics.
    fn get(&self, key: &str) -> Option<&str> {
        self.get(&key.to_lowercase()).map(|v| v.as_str())
    }

    fn keys(&self) -> Vec<&str> {
        self.keys().map(|k| k.as_str()).collect()
    }
}
