//! Application-defined key/value context that crosses process boundaries.
//!
//! [`Baggage`] is propagated alongside trace identity but independent of
//! it. It is an insertion-ordered map from string keys to values with
//! optional metadata, bounded in entry count and total content size.
//! Baggage values are immutable; new contexts are derived copy-on-write
//! through [`BaggageExt`].

use crate::{Context, Key, KeyValue, StringValue};
use std::fmt;
use std::sync::OnceLock;

/// Maximum number of entries a baggage can hold.
const MAX_KEY_VALUE_PAIRS: usize = 64;
/// Maximum combined length of all keys and values, in bytes.
const MAX_LEN_OF_ALL_PAIRS: usize = 8192;

static DEFAULT_BAGGAGE: OnceLock<Baggage> = OnceLock::new();

fn get_default_baggage() -> &'static Baggage {
    DEFAULT_BAGGAGE.get_or_init(Baggage::new)
}

/// An insertion-ordered map of propagated key/value entries.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Baggage {
    entries: Vec<(Key, (StringValue, BaggageMetadata))>,
    kv_content_len: usize,
}

impl Baggage {
    /// Creates an empty `Baggage`.
    pub fn new() -> Self {
        Baggage {
            entries: Vec::new(),
            kv_content_len: 0,
        }
    }

    /// Returns the value for the given key, if it exists.
    pub fn get<K: AsRef<str>>(&self, key: K) -> Option<&StringValue> {
        self.entries
            .iter()
            .find(|(k, _)| k.as_str() == key.as_ref())
            .map(|(_, (value, _))| value)
    }

    /// Returns the value and metadata for the given key, if they exist.
    pub fn get_with_metadata<K: AsRef<str>>(
        &self,
        key: K,
    ) -> Option<&(StringValue, BaggageMetadata)> {
        self.entries
            .iter()
            .find(|(k, _)| k.as_str() == key.as_ref())
            .map(|(_, entry)| entry)
    }

    /// Inserts a key/value pair, returning the previous value if the key
    /// was present.
    ///
    /// Re-inserting an existing key replaces its value in place, keeping
    /// its position in iteration order; the entry-count bound does not
    /// apply, but the content-length bound does. Insertions or
    /// replacements that would exceed a bound are silently dropped and
    /// `None` is returned.
    pub fn insert<K, V>(&mut self, key: K, value: V) -> Option<StringValue>
    where
        K: Into<Key>,
        V: Into<StringValue>,
    {
        self.insert_with_metadata(key, value, BaggageMetadata::default())
            .map(|(value, _)| value)
    }

    /// Inserts a key/value pair with metadata, returning the previous
    /// entry if the key was present.
    pub fn insert_with_metadata<K, V, S>(
        &mut self,
        key: K,
        value: V,
        metadata: S,
    ) -> Option<(StringValue, BaggageMetadata)>
    where
        K: Into<Key>,
        V: Into<StringValue>,
        S: Into<BaggageMetadata>,
    {
        let (key, value, metadata) = (key.into(), value.into(), metadata.into());
        if !Self::valid_key(key.as_str()) {
            return None;
        }
        let entry_content_len = key_value_metadata_bytes_size(
            key.as_str(),
            value.as_str(),
            metadata.as_str(),
        );

        if let Some(index) = self.entries.iter().position(|(k, _)| *k == key) {
            let old_content_len = {
                let (_, (old_value, old_metadata)) = &self.entries[index];
                key_value_metadata_bytes_size(
                    key.as_str(),
                    old_value.as_str(),
                    old_metadata.as_str(),
                )
            };
            // A replacement must still respect the content budget.
            if self.kv_content_len - old_content_len + entry_content_len > MAX_LEN_OF_ALL_PAIRS {
                return None;
            }
            let (_, old_entry) = std::mem::replace(
                &mut self.entries[index],
                (key.clone(), (value, metadata)),
            );
            self.kv_content_len = self.kv_content_len - old_content_len + entry_content_len;
            return Some(old_entry);
        }

        if self.entries.len() >= MAX_KEY_VALUE_PAIRS
            || self.kv_content_len + entry_content_len > MAX_LEN_OF_ALL_PAIRS
        {
            return None;
        }
        self.kv_content_len += entry_content_len;
        self.entries.push((key, (value, metadata)));
        None
    }

    /// Removes the entry for the given key, returning its value if it was
    /// present.
    pub fn remove<K: Into<Key>>(&mut self, key: K) -> Option<(StringValue, BaggageMetadata)> {
        let key = key.into();
        let index = self.entries.iter().position(|(k, _)| *k == key)?;
        let (key, entry) = self.entries.remove(index);
        self.kv_content_len -= key_value_metadata_bytes_size(
            key.as_str(),
            entry.0.as_str(),
            entry.1.as_str(),
        );
        Some(entry)
    }

    /// The number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> Iter<'_> {
        self.into_iter()
    }

    /// Baggage keys are non-empty ASCII strings without control characters
    /// or separators that would break a header encoding.
    fn valid_key(key: &str) -> bool {
        !key.is_empty()
            && key.bytes().all(|b| {
                (0x21..=0x7e).contains(&b)
                    && !matches!(b, b'"' | b',' | b';' | b'\\' | b'=')
            })
    }
}

fn key_value_metadata_bytes_size(key: &str, value: &str, metadata: &str) -> usize {
    key.len() + value.len() + metadata.len()
}

/// An iterator over baggage entries in insertion order.
#[derive(Debug)]
pub struct Iter<'a>(std::slice::Iter<'a, (Key, (StringValue, BaggageMetadata))>);

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a Key, &'a (StringValue, BaggageMetadata));

    fn next(&mut self) -> Option<Self::Item> {
        let (key, entry) = self.0.next()?;
        Some((key, entry))
    }
}

impl<'a> IntoIterator for &'a Baggage {
    type Item = (&'a Key, &'a (StringValue, BaggageMetadata));
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        Iter(self.entries.iter())
    }
}

impl FromIterator<KeyValueMetadata> for Baggage {
    fn from_iter<I: IntoIterator<Item = KeyValueMetadata>>(iter: I) -> Self {
        let mut baggage = Baggage::new();
        for kvm in iter {
            baggage.insert_with_metadata(kvm.key, kvm.value, kvm.metadata);
        }
        baggage
    }
}

impl fmt::Display for Baggage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, (value, metadata))) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}={}", key, value)?;
            if !metadata.as_str().is_empty() {
                write!(f, ";{}", metadata.as_str())?;
            }
        }
        Ok(())
    }
}

/// Optional, opaque metadata string attached to a baggage entry.
#[derive(Clone, Debug, PartialEq, Eq, Default, Hash)]
pub struct BaggageMetadata(String);

impl BaggageMetadata {
    /// Returns the raw metadata string.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<String> for BaggageMetadata {
    fn from(s: String) -> Self {
        BaggageMetadata(s.trim().to_string())
    }
}

impl From<&str> for BaggageMetadata {
    fn from(s: &str) -> Self {
        BaggageMetadata(s.trim().to_string())
    }
}

/// A baggage entry in flight: key, value, and optional metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct KeyValueMetadata {
    /// The entry key.
    pub key: Key,
    /// The entry value.
    pub value: StringValue,
    /// The entry metadata.
    pub metadata: BaggageMetadata,
}

impl KeyValueMetadata {
    /// Create a new entry.
    pub fn new<K, V, S>(key: K, value: V, metadata: S) -> Self
    where
        K: Into<Key>,
        V: Into<StringValue>,
        S: Into<BaggageMetadata>,
    {
        KeyValueMetadata {
            key: key.into(),
            value: value.into(),
            metadata: metadata.into(),
        }
    }
}

impl From<KeyValue> for KeyValueMetadata {
    fn from(kv: KeyValue) -> Self {
        KeyValueMetadata {
            key: kv.key,
            value: StringValue::from(kv.value.as_str().to_string()),
            metadata: BaggageMetadata::default(),
        }
    }
}

/// Methods for storing and retrieving baggage on a [`Context`].
pub trait BaggageExt {
    /// Returns a clone of the current context with the given entries
    /// merged into its baggage.
    fn current_with_baggage<T, I>(baggage: T) -> Self
    where
        T: IntoIterator<Item = I>,
        I: Into<KeyValueMetadata>;

    /// Returns a new context with the given entries merged into this
    /// context's baggage. Existing keys not named are retained; named keys
    /// are replaced.
    fn with_baggage<T, I>(&self, baggage: T) -> Self
    where
        T: IntoIterator<Item = I>,
        I: Into<KeyValueMetadata>;

    /// Returns a new context with an empty baggage.
    fn with_cleared_baggage(&self) -> Self;

    /// The baggage of this context, or an empty one.
    fn baggage(&self) -> &Baggage;
}

impl BaggageExt for Context {
    fn current_with_baggage<T, I>(baggage: T) -> Self
    where
        T: IntoIterator<Item = I>,
        I: Into<KeyValueMetadata>,
    {
        Context::map_current(|cx| cx.with_baggage(baggage))
    }

    fn with_baggage<T, I>(&self, baggage: T) -> Self
    where
        T: IntoIterator<Item = I>,
        I: Into<KeyValueMetadata>,
    {
        let mut merged = self.baggage().clone();
        for kvm in baggage.into_iter().map(|kv| kv.into()) {
            merged.insert_with_metadata(kvm.key, kvm.value, kvm.metadata);
        }
        self.with_value(merged)
    }

    fn with_cleared_baggage(&self) -> Self {
        self.with_value(Baggage::new())
    }

    fn baggage(&self) -> &Baggage {
        self.get::<Baggage>()
            .map_or(get_default_baggage(), |baggage| baggage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_preserves_order_and_replaces_in_place() {
        let mut baggage = Baggage::new();
        baggage.insert("a", "1");
        baggage.insert("b", "2");
        baggage.insert("a", "3");
        let keys: Vec<&str> = baggage.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(baggage.get("a").map(|v| v.as_str()), Some("3"));
    }

    #[test]
    fn entry_count_is_bounded() {
        let mut baggage = Baggage::new();
        for i in 0..MAX_KEY_VALUE_PAIRS + 5 {
            baggage.insert(format!("key{i}"), "v");
        }
        assert_eq!(baggage.len(), MAX_KEY_VALUE_PAIRS);
        assert!(baggage.get("key0").is_some());
        assert!(baggage.get(format!("key{}", MAX_KEY_VALUE_PAIRS)).is_none());
        // replacing an existing key still succeeds at capacity
        assert!(baggage.insert("key0", "replaced").is_some());
        assert_eq!(baggage.get("key0").map(|v| v.as_str()), Some("replaced"));
    }

    #[test]
    fn oversized_content_is_rejected() {
        let mut baggage = Baggage::new();
        let huge = "x".repeat(MAX_LEN_OF_ALL_PAIRS);
        baggage.insert("big", huge);
        assert!(baggage.get("big").is_none());
    }

    #[test]
    fn invalid_keys_are_rejected() {
        let mut baggage = Baggage::new();
        for key in ["", "has space", "quote\"", "semi;colon", "eq=key"] {
            baggage.insert(key.to_string(), "v");
        }
        assert!(baggage.is_empty());
    }

    #[test]
    fn remove_adjusts_content_budget() {
        let mut baggage = Baggage::new();
        baggage.insert("a", "x".repeat(MAX_LEN_OF_ALL_PAIRS - 1));
        assert_eq!(baggage.len(), 1);
        baggage.remove("a");
        baggage.insert("b", "x".repeat(MAX_LEN_OF_ALL_PAIRS - 1));
        assert_eq!(baggage.len(), 1);
        assert!(baggage.get("b").is_some());
    }

    #[test]
    fn oversized_replacement_keeps_old_entry() {
        let mut baggage = Baggage::new();
        baggage.insert("a", "small");
        baggage.insert("b", "x".repeat(MAX_LEN_OF_ALL_PAIRS - 100));
        assert_eq!(baggage.len(), 2);

        // Growing "a" past the remaining budget is rejected in place.
        assert!(baggage.insert("a", "y".repeat(200)).is_none());
        assert_eq!(baggage.get("a").map(|v| v.as_str()), Some("small"));

        // Shrinking frees budget for later inserts.
        assert!(baggage.insert("b", "tiny").is_some());
        assert!(baggage.insert("a", "y".repeat(200)).is_some());
    }

    #[test]
    fn context_without_baggage_yields_empty_default() {
        let cx = Context::new();
        assert!(cx.baggage().is_empty());
        assert_eq!(cx.baggage().len(), 0);
    }

    #[test]
    fn context_baggage_is_copy_on_write() {
        let base = Context::new().with_baggage(vec![KeyValue::new("a", "1")]);
        let derived = base.with_baggage(vec![KeyValue::new("b", "2")]);

        assert_eq!(base.baggage().len(), 1);
        assert_eq!(derived.baggage().len(), 2);
        assert_eq!(derived.baggage().get("a").map(|v| v.as_str()), Some("1"));

        let cleared = derived.with_cleared_baggage();
        assert!(cleared.baggage().is_empty());
    }

    #[test]
    fn metadata_round_trip() {
        let mut baggage = Baggage::new();
        baggage.insert_with_metadata("key", "value", "prop=1");
        let (value, metadata) = baggage.get_with_metadata("key").unwrap();
        assert_eq!(value.as_str(), "value");
        assert_eq!(metadata.as_str(), "prop=1");
        assert_eq!(baggage.to_string(), "key=value;prop=1");
    }
}
