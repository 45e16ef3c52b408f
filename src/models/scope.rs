use serde::{Deserialize, Serialize};
use std::fmt;

/// A named room partition on the push channel.
///
/// Scopes limit which events a connection receives: one per restaurant for
/// order traffic, one per kitchen for ticket traffic, one per user for
/// personal notifications. The key format is `{domain}:{id}` and the server
/// treats it as opaque.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scope(String);

impl Scope {
    /// Scope for a restaurant's order stream.
    pub fn restaurant(id: &str) -> Self {
        Self(format!("restaurant:{}", id))
    }

    /// Scope for a kitchen's ticket stream.
    pub fn kitchen(id: &str) -> Self {
        Self(format!("kitchen:{}", id))
    }

    /// Scope for a user's personal notification stream.
    pub fn user(id: &str) -> Self {
        Self(format!("user:{}", id))
    }

    /// An arbitrary pre-formatted scope key.
    pub fn raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The underlying room key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
