use crate::trace::config::DEFAULT_MAX_ATTRIBUTES_PER_SPAN;
use std::slice;
use traceflow::{Key, KeyValue, Value};

/// Insertion-ordered attribute set with a fixed capacity.
///
/// The first distinct keys up to the capacity are kept; inserts of new
/// keys past that point are counted as dropped. Re-setting a key that is
/// already present always succeeds and does not consume capacity.
#[derive(Clone, Debug, PartialEq)]
pub struct AttributeMap {
    entries: Vec<KeyValue>,
    capacity: u32,
    dropped_count: u32,
}

impl AttributeMap {
    /// Creates an empty map that holds at most `capacity` distinct keys.
    pub fn new(capacity: u32) -> Self {
        AttributeMap {
            entries: Vec::new(),
            capacity,
            dropped_count: 0,
        }
    }

    /// Sets an attribute, updating in place when the key already exists.
    pub fn insert(&mut self, attribute: KeyValue) {
        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|entry| entry.key == attribute.key)
        {
            existing.value = attribute.value;
        } else if self.entries.len() < self.capacity as usize {
            self.entries.push(attribute);
        } else {
            self.dropped_count += 1;
        }
    }

    /// Looks up the value recorded for a key.
    pub fn get(&self, key: &Key) -> Option<&Value> {
        self.entries
            .iter()
            .find(|entry| &entry.key == key)
            .map(|entry| &entry.value)
    }

    /// Number of recorded attributes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no attributes are recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// How many inserts were rejected because the map was full.
    pub fn dropped_count(&self) -> u32 {
        self.dropped_count
    }

    /// Iterates over recorded attributes in insertion order.
    pub fn iter(&self) -> slice::Iter<'_, KeyValue> {
        self.entries.iter()
    }
}

impl Default for AttributeMap {
    fn default() -> Self {
        AttributeMap::new(DEFAULT_MAX_ATTRIBUTES_PER_SPAN)
    }
}

impl<'a> IntoIterator for &'a AttributeMap {
    type Item = &'a KeyValue;
    type IntoIter = slice::Iter<'a, KeyValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
