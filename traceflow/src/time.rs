//! Wall-clock access used for span timestamps.

use std::time::SystemTime;

/// Returns the current time, as used for span start and end timestamps.
pub fn now() -> SystemTime {
    SystemTime::now()
}
