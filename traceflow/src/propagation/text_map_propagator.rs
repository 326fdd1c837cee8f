use crate::propagation::{Extractor, Injector};
use crate::Context;
use std::fmt::Debug;
use std::slice;

/// Methods to inject and extract context over a text carrier.
///
/// Implementations are stateless codecs: `extract` never errors, it simply
/// returns the input context unchanged when the carrier holds nothing it
/// recognizes.
pub trait TextMapPropagator: Debug {
    /// Encode the current context into the carrier.
    fn inject(&self, injector: &mut dyn Injector) {
        Context::map_current(|cx| self.inject_context(cx, injector))
    }

    /// Encode the given context into the carrier.
    fn inject_context(&self, cx: &Context, injector: &mut dyn Injector);

    /// Decode a context from the carrier, layered over the current
    /// context.
    fn extract(&self, extractor: &dyn Extractor) -> Context {
        Context::map_current(|cx| self.extract_with_context(cx, extractor))
    }

    /// Decode a context from the carrier, layered over the given context.
    fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context;

    /// The carrier keys this propagator reads and writes.
    ///
    /// Lets callers that manage carriers (proxies stripping headers, for
    /// example) know which keys to preserve.
    fn fields(&self) -> FieldIter<'_>;
}

/// An iterator over the carrier keys used by a propagator.
#[derive(Debug)]
pub struct FieldIter<'a>(slice::Iter<'a, String>);

impl<'a> FieldIter<'a> {
    /// Create a new `FieldIter` from a slice of field names.
    pub fn new(fields: &'a [String]) -> Self {
        FieldIter(fields.iter())
    }
}

impl<'a> Iterator for FieldIter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|field| field.as_str())
    }
}
