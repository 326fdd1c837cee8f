use std::ops::Deref;
use traceflow::trace::Link;

/// Bounded list of span links plus the count of links that did not fit.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpanLinks {
    /// Recorded links in the order they were added.
    pub links: Vec<Link>,
    /// How many links were rejected once the span's cap was reached.
    pub dropped_count: u32,
}

impl Deref for SpanLinks {
    type Target = [Link];

    fn deref(&self) -> &Self::Target {
        &self.links
    }
}

impl IntoIterator for SpanLinks {
    type Item = Link;
    type IntoIter = std::vec::IntoIter<Link>;

    fn into_iter(self) -> Self::IntoIter {
        self.links.into_iter()
    }
}
