use std::fmt;
use traceflow::trace::TraceId;
use traceflow::Context;

/// Decides at creation time whether a span will be exported.
///
/// Called once per root or remote-parented span; spans with a valid local
/// parent inherit the parent's decision instead. Implementations must be
/// pure: the decision may depend only on the arguments.
pub trait ShouldSample: CloneShouldSample + Send + Sync + fmt::Debug {
    /// Returns `true` when the span should be recorded and exported.
    fn should_sample(
        &self,
        parent_context: Option<&Context>,
        trace_id: TraceId,
        name: &str,
    ) -> bool;
}

/// Lets `Box<dyn ShouldSample>` be cloned into new provider configs.
pub trait CloneShouldSample {
    /// Clone this sampler behind a fresh box.
    fn box_clone(&self) -> Box<dyn ShouldSample>;
}

impl<T> CloneShouldSample for T
where
    T: ShouldSample + Clone + 'static,
{
    fn box_clone(&self) -> Box<dyn ShouldSample> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn ShouldSample> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Built-in sampling strategies.
#[derive(Clone, Debug)]
pub enum Sampler {
    /// Sample every span.
    AlwaysOn,
    /// Sample no spans.
    AlwaysOff,
}

impl ShouldSample for Sampler {
    fn should_sample(
        &self,
        _parent_context: Option<&Context>,
        _trace_id: TraceId,
        _name: &str,
    ) -> bool {
        match self {
            Sampler::AlwaysOn => true,
            Sampler::AlwaysOff => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_samplers_are_constant() {
        let trace_id = TraceId::from_bytes([7; 16]);
        for _ in 0..3 {
            assert!(Sampler::AlwaysOn.should_sample(None, trace_id, "op"));
            assert!(!Sampler::AlwaysOff.should_sample(None, trace_id, "op"));
        }
    }
}
