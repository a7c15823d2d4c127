// Copyright 2025 Cowboy AI, LLC.

//! Identifier types for catalog types and compositions

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity of a type known to a catalog: a target class, a mixin, a
/// capability set or a plain class used for structural requirements.
///
/// Keys order lexically so sets of keys have one canonical iteration order.
///
/// # Examples
///
/// ```rust
/// use cim_mixin::TypeKey;
///
/// let key = TypeKey::new("Billing.Invoice");
/// assert_eq!(key.as_str(), "Billing.Invoice");
/// assert_eq!(key, TypeKey::from("Billing.Invoice"));
/// ```
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct TypeKey(String);

impl TypeKey {
    /// Create a key from a type name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// View the underlying name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeKey {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for TypeKey {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl From<&TypeKey> for TypeKey {
    fn from(key: &TypeKey) -> Self {
        key.clone()
    }
}

impl AsRef<str> for TypeKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identity of one synthesized composition object
///
/// Two handles with the same id refer to the same cached composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct CompositionId(Uuid);

impl CompositionId {
    /// Create a new random composition ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CompositionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CompositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<CompositionId> for Uuid {
    fn from(id: CompositionId) -> Self {
        id.0
    }
}
