use std::{
    fmt,
    fmt::{Debug, Display},
};

/// A wrapper for tokens and signing keys. The wrapped value is never printed by `Debug` or `Display`, so config
/// structs holding secrets can be logged freely.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secret<T>
where T: Clone + Default
{
    value: T,
}

impl<T: Clone + Default> Secret<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }

    pub fn reveal(&self) -> &T {
        &self.value
    }
}

impl Secret<String> {
    /// Wraps the value, treating missing and blank strings alike as "no secret configured".
    pub fn non_empty(value: Option<String>) -> Option<Self> {
        value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).map(Self::new)
    }

    pub fn matches(&self, candidate: &str) -> bool {
        self.value.as_bytes() == candidate.as_bytes()
    }
}

impl From<&str> for Secret<String> {
    fn from(value: &str) -> Self {
        Self::new(value.to_string())
    }
}

impl<T: Clone + Default> Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}

impl<T: Clone + Default> Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}
