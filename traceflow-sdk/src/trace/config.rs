//! Tracer provider configuration: sampling, id generation, and span
//! limits.

use crate::trace::id_generator::{IdGenerator, RandomIdGenerator};
use crate::trace::sampler::{Sampler, ShouldSample};
use std::fmt;

/// Default cap on attributes recorded per span.
pub const DEFAULT_MAX_ATTRIBUTES_PER_SPAN: u32 = 32;
/// Default cap on events recorded per span.
pub const DEFAULT_MAX_EVENTS_PER_SPAN: u32 = 128;
/// Default cap on links recorded per span.
pub const DEFAULT_MAX_LINKS_PER_SPAN: u32 = 32;
/// Default cap on attributes recorded per event.
pub const DEFAULT_MAX_ATTRIBUTES_PER_EVENT: u32 = 32;
/// Default cap on attributes recorded per link.
pub const DEFAULT_MAX_ATTRIBUTES_PER_LINK: u32 = 32;

/// Caps applied to every span a provider creates.
///
/// When a cap is reached the earliest entries are kept and later ones are
/// counted as dropped; nothing is evicted.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SpanLimits {
    /// Max attributes per span.
    pub max_attributes_per_span: u32,
    /// Max events per span.
    pub max_events_per_span: u32,
    /// Max links per span.
    pub max_links_per_span: u32,
    /// Max attributes per event.
    pub max_attributes_per_event: u32,
    /// Max attributes per link.
    pub max_attributes_per_link: u32,
}

impl Default for SpanLimits {
    fn default() -> Self {
        SpanLimits {
            max_attributes_per_span: DEFAULT_MAX_ATTRIBUTES_PER_SPAN,
            max_events_per_span: DEFAULT_MAX_EVENTS_PER_SPAN,
            max_links_per_span: DEFAULT_MAX_LINKS_PER_SPAN,
            max_attributes_per_event: DEFAULT_MAX_ATTRIBUTES_PER_EVENT,
            max_attributes_per_link: DEFAULT_MAX_ATTRIBUTES_PER_LINK,
        }
    }
}

/// Settings shared by all tracers of one provider.
pub struct Config {
    /// Decides whether new root and remote-parented spans are sampled.
    pub sampler: Box<dyn ShouldSample>,
    /// Source of trace and span ids.
    pub id_generator: Box<dyn IdGenerator>,
    /// Per-span data caps.
    pub span_limits: SpanLimits,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            sampler: Box::new(Sampler::AlwaysOn),
            id_generator: Box::new(RandomIdGenerator::default()),
            span_limits: SpanLimits::default(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("sampler", &self.sampler)
            .field("id_generator", &self.id_generator)
            .field("span_limits", &self.span_limits)
            .finish()
    }
}
