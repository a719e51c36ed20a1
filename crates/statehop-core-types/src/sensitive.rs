//! Redacting wrapper for secrets carried in settings
//!
//! Connection strings such as a Redis URL routinely embed a password. Wrapping
//! them in `Sensitive<T>` keeps them out of `{:?}` dumps of the settings and
//! out of log lines.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Wrapper that prints `***REDACTED***` instead of its content
///
/// # Example
///
/// ```
/// use statehop_core_types::Sensitive;
///
/// let url = Sensitive::new("redis://:hunter2@cache:6379".to_string());
/// assert_eq!(format!("{:?}", url), "***REDACTED***");
/// assert!(url.expose().starts_with("redis://"));
/// ```
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Sensitive<T>(T);

impl<T> Sensitive<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Borrow the secret; only call this at the point of use
    pub fn expose(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for Sensitive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "***REDACTED***")
    }
}

impl<T> fmt::Display for Sensitive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "***REDACTED***")
    }
}

impl<T> From<T> for Sensitive<T> {
    fn from(value: T) -> Self {
        Self(value)
    }
}

// Settings files are read and written through serde, so the secret has to
// round-trip transparently there.
impl<T: Serialize> Serialize for Sensitive<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Sensitive<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        T::deserialize(deserializer).map(Self)
    }
}
