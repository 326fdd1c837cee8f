use crate::propagation::{Extractor, FieldIter, Injector, TextMapPropagator};
use crate::Context;
use std::collections::HashSet;

/// A propagator that delegates to an ordered list of propagators.
///
/// Injection calls every inner propagator in registration order; extraction
/// folds the carrier through each propagator so later ones see (and may
/// refine) the context produced by earlier ones.
#[derive(Debug)]
pub struct TextMapCompositePropagator {
    propagators: Vec<Box<dyn TextMapPropagator + Send + Sync>>,
    fields: Vec<String>,
}

impl TextMapCompositePropagator {
    /// Constructs a new propagator from the given list.
    pub fn new(propagators: Vec<Box<dyn TextMapPropagator + Send + Sync>>) -> Self {
        let mut seen = HashSet::new();
        let mut fields = Vec::new();
        for propagator in &propagators {
            for field in propagator.fields() {
                if seen.insert(field.to_string()) {
                    fields.push(field.to_string());
                }
            }
        }

        TextMapCompositePropagator {
            propagators,
            fields,
        }
    }
}

impl TextMapPropagator for TextMapCompositePropagator {
    fn inject_context(&self, context: &Context, injector: &mut dyn Injector) {
        for propagator in &self.propagators {
            propagator.inject_context(context, injector)
        }
    }

    fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context {
        self.propagators
            .iter()
            .fold(cx.clone(), |current_cx, propagator| {
                propagator.extract_with_context(&current_cx, extractor)
            })
    }

    fn fields(&self) -> FieldIter<'_> {
        FieldIter::new(self.fields.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{
        SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState,
    };
    use std::collections::HashMap;

    /// Writes and reads the trace id through a single named carrier key.
    #[derive(Debug)]
    struct TestPropagator {
        fields: [String; 1],
    }

    impl TestPropagator {
        fn new(field: &'static str) -> Self {
            TestPropagator {
                fields: [field.to_string()],
            }
        }
    }

    impl TextMapPropagator for TestPropagator {
        fn inject_context(&self, cx: &Context, injector: &mut dyn Injector) {
            if let Some(sc) = cx.span_context() {
                injector.set(&self.fields[0], sc.trace_id().to_string());
            }
        }

        fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context {
            match extractor
                .get(&self.fields[0])
                .and_then(|v| TraceId::from_hex(v).ok())
            {
                Some(trace_id) => cx.with_remote_span_context(SpanContext::new(
                    trace_id,
                    SpanId::from(1),
                    TraceFlags::default(),
                    true,
                    TraceState::default(),
                )),
                None => cx.clone(),
            }
        }

        fn fields(&self) -> FieldIter<'_> {
            FieldIter::new(&self.fields)
        }
    }

    #[test]
    fn zero_propagators_are_noop() {
        let composite = TextMapCompositePropagator::new(vec![]);
        let mut carrier = HashMap::new();
        composite.inject_context(&Context::new(), &mut carrier);
        assert!(carrier.is_empty());
        let cx = composite.extract_with_context(&Context::new(), &carrier);
        assert!(!cx.has_active_span());
    }

    #[test]
    fn inject_invokes_every_propagator() {
        let composite = TextMapCompositePropagator::new(vec![
            Box::new(TestPropagator::new("first")),
            Box::new(TestPropagator::new("second")),
        ]);
        let cx = Context::new().with_span_context(SpanContext::new(
            TraceId::from(7),
            SpanId::from(7),
            TraceFlags::SAMPLED,
            false,
            TraceState::default(),
        ));

        let mut carrier = HashMap::new();
        composite.inject_context(&cx, &mut carrier);
        assert_eq!(carrier.len(), 2);
        assert_eq!(
            carrier.get("first").map(|s| s.as_str()),
            Some("00000000000000000000000000000007")
        );
    }

    #[test]
    fn later_extractors_win() {
        let composite = TextMapCompositePropagator::new(vec![
            Box::new(TestPropagator::new("first")),
            Box::new(TestPropagator::new("second")),
        ]);
        let mut carrier = HashMap::new();
        carrier.insert("first".to_string(), format!("{:x}", 1));
        carrier.insert("second".to_string(), format!("{:x}", 2));

        let cx = composite.extract_with_context(&Context::new(), &carrier);
        assert_eq!(
            cx.span_context().map(|sc| sc.trace_id()),
            Some(TraceId::from(2))
        );
    }

    #[test]
    fn fields_are_deduplicated_in_order() {
        let composite = TextMapCompositePropagator::new(vec![
            Box::new(TestPropagator::new("alpha")),
            Box::new(TestPropagator::new("beta")),
            Box::new(TestPropagator::new("alpha")),
        ]);
        let fields: Vec<&str> = composite.fields().collect();
        assert_eq!(fields, vec!["alpha", "beta"]);
    }
}
