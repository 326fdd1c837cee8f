use std::ops::Deref;
use traceflow::trace::Event;

/// Bounded list of span events plus the count of events that did not
/// fit.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpanEvents {
    /// Recorded events in the order they were added.
    pub events: Vec<Event>,
    /// How many events were rejected once the span's cap was reached.
    pub dropped_count: u32,
}

impl Deref for SpanEvents {
    type Target = [Event];

    fn deref(&self) -> &Self::Target {
        &self.events
    }
}

impl IntoIterator for SpanEvents {
    type Item = Event;
    type IntoIter = std::vec::IntoIter<Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}
