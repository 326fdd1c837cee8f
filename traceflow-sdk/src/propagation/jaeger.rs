//! Propagator for the Jaeger header format.
//!
//! Trace identity travels in a single header shaped
//! `{trace-id}:{span-id}:{parent-span-id}:{flags}`; the parent span id
//! field is deprecated and always written as `0`. Baggage entries travel
//! in one header per entry, named `{prefix}-{key}` with a
//! percent-encoded value.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use std::fmt;
use traceflow::baggage::{BaggageExt, KeyValueMetadata};
use traceflow::propagation::{Extractor, FieldIter, Injector, TextMapPropagator};
use traceflow::trace::{
    SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState,
};
use traceflow::Context;

const TRACE_HEADER: &str = "uber-trace-id";
const BAGGAGE_PREFIX: &str = "uberctx";
const DEPRECATED_PARENT_SPAN_ID: &str = "0";

const BAGGAGE_VALUE_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'%')
    .add(b',')
    .add(b';')
    .add(b'=');

/// Codec for the Jaeger trace and baggage headers.
///
/// Extraction is tolerant: a header that does not have exactly four
/// colon-separated fields, or whose ids do not parse to non-zero hex, is
/// ignored and the incoming context is returned unchanged. Malformed
/// flags degrade to unsampled rather than discarding the identity.
pub struct JaegerPropagator {
    trace_header: String,
    baggage_prefix: String,
    fields: [String; 1],
}

impl fmt::Debug for JaegerPropagator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JaegerPropagator")
            .field("trace_header", &self.trace_header)
            .field("baggage_prefix", &self.baggage_prefix)
            .finish()
    }
}

impl Default for JaegerPropagator {
    fn default() -> Self {
        JaegerPropagator::new()
    }
}

impl JaegerPropagator {
    /// Creates a propagator using the standard header names.
    pub fn new() -> Self {
        Self::with_custom_header_and_baggage(TRACE_HEADER, BAGGAGE_PREFIX)
    }

    /// Creates a propagator with a custom trace header name.
    pub fn with_custom_header(custom_header: &str) -> Self {
        Self::with_custom_header_and_baggage(custom_header, BAGGAGE_PREFIX)
    }

    /// Creates a propagator with custom trace header and baggage prefix
    /// names.
    pub fn with_custom_header_and_baggage(custom_header: &str, baggage_prefix: &str) -> Self {
        let trace_header = if custom_header.is_empty() {
            TRACE_HEADER.to_string()
        } else {
            custom_header.to_string()
        };
        let baggage_prefix = if baggage_prefix.is_empty() {
            BAGGAGE_PREFIX.to_string()
        } else {
            baggage_prefix.to_string()
        };
        JaegerPropagator {
            fields: [trace_header.clone()],
            trace_header,
            baggage_prefix,
        }
    }

    fn extract_span_context(&self, extractor: &dyn Extractor) -> Option<SpanContext> {
        let header_value = extractor.get(&self.trace_header)?.trim();
        // Some proxies deliver the header with its separators URL-encoded.
        let decoded;
        let value = if header_value.split(':').count() == 4 {
            header_value
        } else {
            decoded = percent_decode_str(header_value)
                .decode_utf8()
                .ok()?
                .to_string();
            &decoded
        };
        let parts: Vec<&str> = value.split(':').collect();
        if parts.len() != 4 {
            return None;
        }

        let trace_id = Self::extract_trace_id(parts[0])?;
        let span_id = Self::extract_span_id(parts[1])?;
        // parts[2] is the deprecated parent span id; ignored.
        let flags = Self::extract_trace_flags(parts[3]);

        Some(SpanContext::new(
            trace_id,
            span_id,
            flags,
            true,
            TraceState::default(),
        ))
    }

    fn extract_trace_id(trace_id: &str) -> Option<TraceId> {
        if trace_id.len() > 32 {
            return None;
        }
        // Short ids are zero-padded on the left by the hex parse.
        TraceId::from_hex(trace_id).ok()
    }

    fn extract_span_id(span_id: &str) -> Option<SpanId> {
        if span_id.len() > 16 {
            return None;
        }
        SpanId::from_hex(span_id).ok()
    }

    fn extract_trace_flags(flags: &str) -> TraceFlags {
        if flags.is_empty() || flags.len() > 2 {
            return TraceFlags::default();
        }
        // Only the sampled bit is carried over; a flags field that does
        // not parse degrades to unsampled.
        match u8::from_str_radix(flags, 16) {
            Ok(parsed) => TraceFlags::new(parsed & TraceFlags::SAMPLED.to_u8()),
            Err(_) => TraceFlags::default(),
        }
    }

    fn extract_baggage(&self, extractor: &dyn Extractor) -> Vec<KeyValueMetadata> {
        let prefix = format!("{}-", self.baggage_prefix);
        extractor
            .keys()
            .into_iter()
            .filter_map(|key| {
                let name = key.strip_prefix(prefix.as_str()).filter(|k| !k.is_empty())?;
                let value = extractor.get(key)?;
                let decoded = percent_decode_str(value)
                    .decode_utf8()
                    .map(|v| v.to_string())
                    .unwrap_or_else(|_| value.to_string());
                Some(KeyValueMetadata::new(name.to_string(), decoded, ""))
            })
            .collect()
    }
}

impl TextMapPropagator for JaegerPropagator {
    fn inject_context(&self, cx: &Context, injector: &mut dyn Injector) {
        if cx.is_telemetry_suppressed() {
            return;
        }

        if let Some(span_context) = cx.span_context() {
            if span_context.is_valid() {
                let flag: u8 = if span_context.is_sampled() { 1 } else { 0 };
                injector.set(
                    &self.trace_header,
                    format!(
                        "{}:{}:{}:{:02x}",
                        span_context.trace_id(),
                        span_context.span_id(),
                        DEPRECATED_PARENT_SPAN_ID,
                        flag
                    ),
                );
            }
        }

        for (key, (value, _metadata)) in cx.baggage() {
            injector.set(
                &format!("{}-{}", self.baggage_prefix, key),
                utf8_percent_encode(value.as_str(), BAGGAGE_VALUE_ENCODE_SET).to_string(),
            );
        }
    }

    fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context {
        let mut cx = match self.extract_span_context(extractor) {
            Some(span_context) if span_context.is_valid() => {
                cx.with_remote_span_context(span_context)
            }
            _ => cx.clone(),
        };
        let baggage = self.extract_baggage(extractor);
        if !baggage.is_empty() {
            cx = cx.with_baggage(baggage);
        }
        cx
    }

    fn fields(&self) -> FieldIter<'_> {
        FieldIter::new(&self.fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn carrier(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn sampled_context() -> SpanContext {
        SpanContext::new(
            TraceId::from_hex("a3ce929d0e0e4736").unwrap(),
            SpanId::from_hex("0102030405060708").unwrap(),
            TraceFlags::SAMPLED,
            false,
            TraceState::default(),
        )
    }

    #[test]
    fn inject_writes_single_header() {
        let propagator = JaegerPropagator::new();
        let cx = Context::new().with_span_context(sampled_context());
        let mut injector = HashMap::new();
        propagator.inject_context(&cx, &mut injector);

        assert_eq!(
            injector.get("uber-trace-id").map(String::as_str),
            Some("0000000000000000a3ce929d0e0e4736:0102030405060708:0:01")
        );
    }

    #[test]
    fn inject_skips_invalid_and_suppressed_contexts() {
        let propagator = JaegerPropagator::new();

        let mut injector = HashMap::new();
        propagator.inject_context(&Context::new(), &mut injector);
        assert!(injector.is_empty());

        let suppressed = Context::new()
            .with_span_context(sampled_context())
            .with_telemetry_suppressed();
        propagator.inject_context(&suppressed, &mut injector);
        assert!(injector.is_empty());
    }

    #[test]
    fn round_trip_preserves_identity() {
        let propagator = JaegerPropagator::new();
        let cx = Context::new().with_span_context(sampled_context());
        let mut injector = HashMap::new();
        propagator.inject_context(&cx, &mut injector);

        let extracted = propagator.extract_with_context(&Context::new(), &injector);
        let span_context = extracted.span_context().unwrap();
        assert_eq!(span_context.trace_id(), sampled_context().trace_id());
        assert_eq!(span_context.span_id(), sampled_context().span_id());
        assert!(span_context.is_sampled());
        assert!(span_context.is_remote());
    }

    #[test]
    fn extract_pads_short_ids() {
        let propagator = JaegerPropagator::new();
        let carrier = carrier(&[("uber-trace-id", "e28a:b7ad6b71:0:1")]);

        let cx = propagator.extract_with_context(&Context::new(), &carrier);
        let span_context = cx.span_context().unwrap();
        assert_eq!(
            span_context.trace_id(),
            TraceId::from_hex("e28a").unwrap()
        );
        assert_eq!(span_context.span_id(), SpanId::from_hex("b7ad6b71").unwrap());
    }

    #[test]
    fn extract_accepts_url_encoded_header() {
        let propagator = JaegerPropagator::new();
        let carrier = carrier(&[("uber-trace-id", "e28a%3Ab7ad6b71%3A0%3A1")]);

        let cx = propagator.extract_with_context(&Context::new(), &carrier);
        let span_context = cx.span_context().unwrap();
        assert_eq!(span_context.trace_id(), TraceId::from_hex("e28a").unwrap());
        assert!(span_context.is_sampled());
    }

    #[test]
    fn extract_ignores_malformed_headers() {
        let propagator = JaegerPropagator::new();
        #[rustfmt::skip]
        let bad_headers = [
            "",
            "e28a:b7ad6b71:0",
            "e28a:b7ad6b71:0:1:extra",
            "not-hex:b7ad6b71:0:1",
            "0:b7ad6b71:0:1",
            "e28a:0:0:1",
            "e28a:b7ad6b71zzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzz:0:1",
        ];
        for header in bad_headers {
            let carrier = carrier(&[("uber-trace-id", header)]);
            let cx = propagator.extract_with_context(&Context::new(), &carrier);
            assert!(cx.span_context().is_none(), "header {header:?} accepted");
        }
    }

    #[test]
    fn malformed_flags_degrade_to_unsampled() {
        let propagator = JaegerPropagator::new();
        #[rustfmt::skip]
        let cases = [
            ("1", true),
            ("01", true),
            ("0", false),
            ("zz", false),
            ("", false),
            ("123", false),
        ];
        for (flags, sampled) in cases {
            let header = format!("e28a:b7ad6b71:0:{flags}");
            let carrier = carrier(&[("uber-trace-id", header.as_str())]);
            let cx = propagator.extract_with_context(&Context::new(), &carrier);
            let span_context = cx.span_context().unwrap();
            assert_eq!(span_context.is_sampled(), sampled, "flags {flags:?}");
        }
    }

    #[test]
    fn baggage_round_trips_with_encoding() {
        let propagator = JaegerPropagator::new();
        let cx = Context::new().with_baggage([KeyValueMetadata::new(
            "user-id",
            "alice smith".to_string(),
            "",
        )]);

        let mut injector = HashMap::new();
        propagator.inject_context(&cx, &mut injector);
        assert_eq!(
            injector.get("uberctx-user-id").map(String::as_str),
            Some("alice%20smith")
        );

        let extracted = propagator.extract_with_context(&Context::new(), &injector);
        assert_eq!(
            extracted.baggage().get("user-id").map(|v| v.as_str()),
            Some("alice smith")
        );
    }

    #[test]
    fn extracted_baggage_overrides_existing_entries() {
        let propagator = JaegerPropagator::new();
        let base = Context::new().with_baggage([
            KeyValueMetadata::new("kept", "original".to_string(), ""),
            KeyValueMetadata::new("clashing", "original".to_string(), ""),
        ]);

        let carrier = carrier(&[("uberctx-clashing", "incoming")]);
        let cx = propagator.extract_with_context(&base, &carrier);
        assert_eq!(
            cx.baggage().get("kept").map(|v| v.as_str()),
            Some("original")
        );
        assert_eq!(
            cx.baggage().get("clashing").map(|v| v.as_str()),
            Some("incoming")
        );
    }

    #[test]
    fn fields_lists_trace_header_only() {
        let propagator = JaegerPropagator::new();
        assert_eq!(propagator.fields().collect::<Vec<_>>(), ["uber-trace-id"]);
    }

    #[test]
    fn custom_header_and_prefix_are_used() {
        let propagator = JaegerPropagator::with_custom_header_and_baggage("trace", "ctx");
        let cx = Context::new()
            .with_span_context(sampled_context())
            .with_baggage([KeyValueMetadata::new("k", "v".to_string(), "")]);

        let mut injector = HashMap::new();
        propagator.inject_context(&cx, &mut injector);
        assert!(injector.contains_key("trace"));
        assert!(injector.contains_key("ctx-k"));
    }
}
