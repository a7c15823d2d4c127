// Copyright 2025 Cowboy AI, LLC.

//! Member signatures, visibility and field state
//!
//! A member is identified by its kind, its name and its parameter and return
//! types. Names may carry an explicit interface qualification (`IClock.Now`);
//! matching discounts that prefix unless both sides are qualified.

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Dynamic value passed to and returned from member bodies
pub type Value = serde_json::Value;

/// Declared field state of a target or mixin instance, in declaration order
pub type FieldSet = IndexMap<String, Value>;

/// Kind of a member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum MemberKind {
    /// Callable method
    Method,
    /// Property; invoked with no argument to read and one argument to write
    Property,
    /// Event; invoked with a handler argument to subscribe
    Event,
}

impl fmt::Display for MemberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberKind::Method => f.write_str("method"),
            MemberKind::Property => f.write_str("property"),
            MemberKind::Event => f.write_str("event"),
        }
    }
}

/// Member visibility
///
/// Only public and protected members take part in override matching and
/// requirement satisfaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum Visibility {
    /// Visible to everyone
    Public,
    /// Visible to derived types
    Protected,
    /// Visible inside the declaring module only
    Internal,
    /// Visible to the declaring type only
    Private,
}

impl Visibility {
    /// True for visibilities a composition can see
    pub fn is_accessible(self) -> bool {
        matches!(self, Visibility::Public | Visibility::Protected)
    }
}

/// Signature of a method, property or event
///
/// # Examples
///
/// ```rust
/// use cim_mixin::MemberSignature;
///
/// let explicit = MemberSignature::method("IClock.Now").returning("Instant");
/// let plain = MemberSignature::method("Now").returning("Instant");
/// assert_eq!(explicit.simple_name(), "Now");
/// assert!(plain.matches(&explicit));
/// assert_eq!(plain.key(), "Now()");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct MemberSignature {
    /// Member kind
    pub kind: MemberKind,
    /// Member name, possibly interface-qualified
    pub name: String,
    /// Parameter type names
    pub parameters: Vec<String>,
    /// Return type (property type, event handler type)
    pub return_type: Option<String>,
}

impl MemberSignature {
    /// Method signature with no parameters and no return type
    pub fn method(name: impl Into<String>) -> Self {
        Self {
            kind: MemberKind::Method,
            name: name.into(),
            parameters: Vec::new(),
            return_type: None,
        }
    }

    /// Property signature of the given type
    pub fn property(name: impl Into<String>, property_type: impl Into<String>) -> Self {
        Self {
            kind: MemberKind::Property,
            name: name.into(),
            parameters: Vec::new(),
            return_type: Some(property_type.into()),
        }
    }

    /// Event signature with the given handler type
    pub fn event(name: impl Into<String>, handler_type: impl Into<String>) -> Self {
        Self {
            kind: MemberKind::Event,
            name: name.into(),
            parameters: Vec::new(),
            return_type: Some(handler_type.into()),
        }
    }

    /// Append a parameter type
    pub fn param(mut self, parameter_type: impl Into<String>) -> Self {
        self.parameters.push(parameter_type.into());
        self
    }

    /// Set the return type
    pub fn returning(mut self, return_type: impl Into<String>) -> Self {
        self.return_type = Some(return_type.into());
        self
    }

    /// Name without an explicit interface qualification
    pub fn simple_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    /// Explicit interface qualification, if any
    pub fn qualifier(&self) -> Option<&str> {
        self.name.rsplit_once('.').map(|(qualifier, _)| qualifier)
    }

    /// Whether the name carries an explicit interface qualification
    pub fn is_qualified(&self) -> bool {
        self.qualifier().is_some()
    }

    /// Same kind, parameters and return type
    pub fn same_shape(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.parameters == other.parameters
            && self.return_type == other.return_type
    }

    /// Signature match used for overrides and structural requirements.
    ///
    /// Qualified names on both sides must agree exactly; otherwise the
    /// qualification is discounted and simple names are compared.
    pub fn matches(&self, other: &Self) -> bool {
        if !self.same_shape(other) {
            return false;
        }
        match (self.qualifier(), other.qualifier()) {
            (Some(_), Some(_)) => self.name == other.name,
            _ => self.simple_name() == other.simple_name(),
        }
    }

    /// Lookup key: name plus parameter list, e.g. `Total(Currency)`
    pub fn key(&self) -> String {
        format!("{}({})", self.name, self.parameters.join(","))
    }

    /// Lookup key without the interface qualification
    pub fn simple_key(&self) -> String {
        format!("{}({})", self.simple_name(), self.parameters.join(","))
    }

    /// Whether a caller-supplied member reference selects this signature.
    ///
    /// A reference may be the full key (`Total(Currency)`), the simple key,
    /// the declared name or the simple name.
    pub fn is_selected_by(&self, reference: &str) -> bool {
        if reference.contains('(') {
            self.key() == reference || self.simple_key() == reference
        } else {
            self.name == reference || self.simple_name() == reference
        }
    }
}

impl fmt::Display for MemberSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}({})", self.kind, self.name, self.parameters.join(", "))?;
        if let Some(return_type) = &self.return_type {
            write!(f, " -> {return_type}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Visibility::Public, true ; "public")]
    #[test_case(Visibility::Protected, true ; "protected")]
    #[test_case(Visibility::Internal, false ; "internal")]
    #[test_case(Visibility::Private, false ; "private")]
    fn test_visibility_accessibility(visibility: Visibility, accessible: bool) {
        assert_eq!(visibility.is_accessible(), accessible);
    }

    /// Test qualified and unqualified names match on simple names
    ///
    /// ```mermaid
    /// graph LR
    ///     A[IClock.Now] -->|discount prefix| B[Now]
    ///     C[Now] --> B
    ///     D[ITimer.Now] -.->|both qualified| A
    /// ```
    #[test]
    fn test_signature_matching() {
        let plain = MemberSignature::method("Now").returning("Instant");
        let clock = MemberSignature::method("IClock.Now").returning("Instant");
        let timer = MemberSignature::method("ITimer.Now").returning("Instant");

        assert!(plain.matches(&clock));
        assert!(clock.matches(&plain));
        assert!(!clock.matches(&timer));
        assert!(clock.matches(&clock.clone()));

        let other_return = MemberSignature::method("Now").returning("u64");
        assert!(!plain.matches(&other_return));

        let with_param = MemberSignature::method("Now").param("Zone").returning("Instant");
        assert!(!plain.matches(&with_param));

        let property = MemberSignature::property("Now", "Instant");
        assert!(!plain.matches(&property));
    }

    /// Test member references select by key or name
    #[test]
    fn test_member_reference_selection() {
        let sig = MemberSignature::method("IPricing.Total").param("Currency");
        assert!(sig.is_selected_by("Total"));
        assert!(sig.is_selected_by("IPricing.Total"));
        assert!(sig.is_selected_by("Total(Currency)"));
        assert!(sig.is_selected_by("IPricing.Total(Currency)"));
        assert!(!sig.is_selected_by("Total()"));
        assert!(!sig.is_selected_by("Subtotal"));
    }

    /// Test display formatting
    #[test]
    fn test_signature_display() {
        let sig = MemberSignature::method("Total").param("Currency").param("bool").returning("Money");
        assert_eq!(sig.to_string(), "method Total(Currency, bool) -> Money");
        assert_eq!(sig.key(), "Total(Currency,bool)");
        assert_eq!(MemberSignature::event("Changed", "Handler").to_string(), "event Changed() -> Handler");
    }
}
