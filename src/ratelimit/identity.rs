//! Identity key handling.

use std::borrow::Borrow;
use std::fmt;

/// An opaque key identifying the caller being rate limited.
///
/// The engine never interprets the key; it is only compared and hashed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityKey(String);

impl IdentityKey {
    /// Create a new identity key.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for IdentityKey {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for IdentityKey {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// Lets the limiter maps be probed with a plain `&str`.
impl Borrow<str> for IdentityKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
