use crate::trace_context::{SpanId, TraceFlags, TraceId};
use std::collections::VecDeque;
use std::str::FromStr;
use thiserror::Error;

/// Vendor-specific trace identity data, carried alongside the trace and
/// span ids.
///
/// Entries are an ordered list of key/value pairs. `TraceState` is an
/// immutable value: mutations return a new instance. Keys and values are
/// validated on construction; invalid input is rejected with a
/// [`TraceStateError`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TraceState(Option<VecDeque<(String, String)>>);

impl TraceState {
    /// Validates a trace state key.
    ///
    /// Keys are lowercase alphanumeric strings that may also contain `_`,
    /// `-`, `*`, `/` and a single `@` vendor separator, up to 256
    /// characters.
    fn valid_key(key: &str) -> bool {
        if key.is_empty() || key.len() > 256 {
            return false;
        }

        let allowed_special = |b: u8| matches!(b, b'_' | b'-' | b'*' | b'/');
        let mut vendor_start = None;
        for (i, &b) in key.as_bytes().iter().enumerate() {
            if !(b.is_ascii_lowercase() || b.is_ascii_digit() || allowed_special(b) || b == b'@') {
                return false;
            }
            if b == b'@' {
                if vendor_start.is_some() {
                    return false;
                }
                vendor_start = Some(i);
            }
        }

        match key.as_bytes().first() {
            Some(b) if b.is_ascii_lowercase() || b.is_ascii_digit() => {}
            _ => return false,
        }
        if let Some(i) = vendor_start {
            // vendor part must be non-empty and at most 14 characters
            let vendor = &key[i + 1..];
            if vendor.is_empty() || vendor.len() > 14 {
                return false;
            }
        }
        true
    }

    /// Validates a trace state value.
    ///
    /// Values are up to 256 printable ASCII characters excluding `,` and
    /// `=`, and must not end in a space.
    fn valid_value(value: &str) -> bool {
        if value.len() > 256 || value.ends_with(' ') {
            return false;
        }
        value
            .as_bytes()
            .iter()
            .all(|&b| (0x20..=0x7e).contains(&b) && b != b',' && b != b'=')
    }

    /// Creates a `TraceState` from the given key/value pairs, preserving
    /// order.
    pub fn from_key_value<T, K, V>(trace_state: T) -> Result<Self, TraceStateError>
    where
        T: IntoIterator<Item = (K, V)>,
        K: ToString,
        V: ToString,
    {
        let ordered_data = trace_state
            .into_iter()
            .map(|(key, value)| {
                let (key, value) = (key.to_string(), value.to_string());
                if !TraceState::valid_key(key.as_str()) {
                    return Err(TraceStateError::Key(key));
                }
                if !TraceState::valid_value(value.as_str()) {
                    return Err(TraceStateError::Value(value));
                }
                Ok((key, value))
            })
            .collect::<Result<VecDeque<_>, TraceStateError>>()?;

        if ordered_data.is_empty() {
            Ok(TraceState(None))
        } else {
            Ok(TraceState(Some(ordered_data)))
        }
    }

    /// Returns the value for the given key, if it exists.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.as_ref().and_then(|kvs| {
            kvs.iter()
                .find(|(entry_key, _)| entry_key == key)
                .map(|(_, value)| value.as_str())
        })
    }

    /// Returns a new `TraceState` with the given key/value set.
    ///
    /// An existing entry for the key is replaced and moved to the front of
    /// the list; otherwise the new entry is inserted at the front.
    pub fn insert<K, V>(&self, key: K, value: V) -> Result<TraceState, TraceStateError>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let (key, value) = (key.into(), value.into());
        if !TraceState::valid_key(key.as_str()) {
            return Err(TraceStateError::Key(key));
        }
        if !TraceState::valid_value(value.as_str()) {
            return Err(TraceStateError::Value(value));
        }

        let mut trace_state = self.delete_from_deque(&key);
        let kvs = trace_state.0.get_or_insert(VecDeque::with_capacity(1));
        kvs.push_front((key, value));
        Ok(trace_state)
    }

    /// Returns a new `TraceState` with the given key removed.
    pub fn delete<K: Into<String>>(&self, key: K) -> Result<TraceState, TraceStateError> {
        let key = key.into();
        if !TraceState::valid_key(key.as_str()) {
            return Err(TraceStateError::Key(key));
        }
        Ok(self.delete_from_deque(&key))
    }

    fn delete_from_deque(&self, key: &str) -> TraceState {
        let mut copy = self.clone();
        if let Some(kvs) = copy.0.as_mut() {
            if let Some(index) = kvs.iter().position(|(entry_key, _)| entry_key == key) {
                kvs.remove(index);
            }
        }
        copy
    }

    /// Creates a new `TraceState` header string, with the default `,`
    /// entry delimiter.
    pub fn header(&self) -> String {
        self.header_delimited("=", ",")
    }

    /// Creates a new `TraceState` header string, with the given key/value
    /// and entry delimiters.
    pub fn header_delimited(&self, entry_delimiter: &str, list_delimiter: &str) -> String {
        self.0
            .as_ref()
            .map(|kvs| {
                kvs.iter()
                    .map(|(key, value)| format!("{}{}{}", key, entry_delimiter, value))
                    .collect::<Vec<String>>()
                    .join(list_delimiter)
            })
            .unwrap_or_default()
    }
}

impl FromStr for TraceState {
    type Err = TraceStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let list_members: Vec<&str> = s.split_terminator(',').map(str::trim).collect();
        let mut key_value_pairs = Vec::with_capacity(list_members.len());

        for list_member in list_members {
            match list_member.find('=') {
                None => return Err(TraceStateError::List(list_member.to_string())),
                Some(separator_index) => {
                    let (key, value) = list_member.split_at(separator_index);
                    key_value_pairs.push((key.to_string(), value[1..].to_string()));
                }
            }
        }

        TraceState::from_key_value(key_value_pairs)
    }
}

/// Error returned by [`TraceState`] operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TraceStateError {
    /// The key is invalid.
    #[error("{0} is not a valid trace state key")]
    Key(String),

    /// The value is invalid.
    #[error("{0} is not a valid trace state value")]
    Value(String),

    /// The list member is invalid.
    #[error("{0} is not a valid trace state list member")]
    List(String),
}

/// Immutable portion of a span's identity that is propagated across
/// process boundaries.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SpanContext {
    trace_id: TraceId,
    span_id: SpanId,
    trace_flags: TraceFlags,
    is_remote: bool,
    trace_state: TraceState,
}

impl SpanContext {
    /// An invalid span context, used as the parent of root spans.
    pub fn empty_context() -> Self {
        SpanContext::new(
            TraceId::INVALID,
            SpanId::INVALID,
            TraceFlags::default(),
            false,
            TraceState::default(),
        )
    }

    /// Construct a new `SpanContext`.
    pub fn new(
        trace_id: TraceId,
        span_id: SpanId,
        trace_flags: TraceFlags,
        is_remote: bool,
        trace_state: TraceState,
    ) -> Self {
        SpanContext {
            trace_id,
            span_id,
            trace_flags,
            is_remote,
            trace_state,
        }
    }

    /// The trace id of this context.
    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    /// The span id of this context.
    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    /// The trace flags of this context.
    pub fn trace_flags(&self) -> TraceFlags {
        self.trace_flags
    }

    /// Whether this context was received from a remote process.
    pub fn is_remote(&self) -> bool {
        self.is_remote
    }

    /// Whether both the trace id and span id are non-zero.
    pub fn is_valid(&self) -> bool {
        self.trace_id != TraceId::INVALID && self.span_id != SpanId::INVALID
    }

    /// Whether the `sampled` trace flag is set.
    pub fn is_sampled(&self) -> bool {
        self.trace_flags.is_sampled()
    }

    /// The vendor trace state of this context.
    pub fn trace_state(&self) -> &TraceState {
        &self.trace_state
    }
}
