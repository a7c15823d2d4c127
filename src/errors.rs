// Copyright 2025 Cowboy AI, LLC.

//! Error types for composition and dispatch
//!
//! Every configuration problem surfaces as a [`CompositionError`] while the
//! composition is being built; nothing is downgraded to a warning and nothing
//! is cached for a context whose composition failed. [`InvocationError`] covers
//! calls made against an already composed object.

use std::fmt;

use thiserror::Error;

/// Why an externally supplied mixin instance was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidInstanceReason {
    /// The mixin requires a derived shape (the target overrides some of its
    /// members) but a plain instance was supplied
    NotDerived,
    /// The instance was derived for a different target
    ForeignDerivation,
    /// Another instance already fills this slot
    DuplicateSlot,
    /// The mixin type is not part of the configuration at all
    NotConfigured,
}

impl fmt::Display for InvalidInstanceReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotDerived => f.write_str(
                "it is not possible to use it as mixin instance because the mixin has members \
                 overridden by the target and requires a derived instance",
            ),
            Self::ForeignDerivation => f.write_str(
                "it is not possible to use it as mixin instance because it was derived for another target",
            ),
            Self::DuplicateSlot => f.write_str("its slot has already been filled by another instance"),
            Self::NotConfigured => f.write_str("the mixin is not part of the configuration"),
        }
    }
}

/// Errors raised while composing a target with its mixins
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompositionError {
    /// A type named by a configuration is missing from the catalog
    #[error("Unknown {kind} type: {key}")]
    UnknownType {
        /// Catalog section that was searched (class, mixin, capability)
        kind: String,
        /// Key that was searched for
        key: String,
    },

    /// A type key was registered twice in one catalog
    #[error("Type already registered: {0}")]
    DuplicateType(String),

    /// The same mixin appears twice in one class context
    #[error("Mixin {mixin} is configured more than once for target {target}")]
    DuplicateMixin {
        /// Target type
        target: String,
        /// Repeated mixin type
        mixin: String,
    },

    /// The dependency sorter could not produce a total order
    #[error("Cyclic mixin dependency on target {target}: {}", .mixins.join(" -> "))]
    CyclicMixinDependency {
        /// Target type
        target: String,
        /// Mixins that are part of (or blocked by) the cycle, in declaration order
        mixins: Vec<String>,
    },

    /// An aggregate capability set reaches itself through its components
    #[error("Cyclic capability aggregate {capability}: {}", .path.join(" -> "))]
    CyclicCapability {
        /// Aggregate whose component closes the cycle
        capability: String,
        /// Aggregates from the required capability down to the repeated one
        path: Vec<String>,
    },

    /// A declared override matches no visible base member
    #[error(
        "Unresolved override: {overrider} on {declaring} does not match any public or protected \
         member (target {target}); closest candidates: [{}]",
        .candidates.join(", ")
    )]
    UnresolvedOverride {
        /// Target type
        target: String,
        /// Type declaring the override
        declaring: String,
        /// Signature of the overriding member
        overrider: String,
        /// Same-named members that were found but did not qualify
        candidates: Vec<String>,
    },

    /// A declared override matches more than one base member
    #[error(
        "Ambiguous override: {overrider} on {declaring} matches several members (target {target}): [{}]",
        .candidates.join(", ")
    )]
    AmbiguousOverride {
        /// Target type
        target: String,
        /// Type declaring the override
        declaring: String,
        /// Signature of the overriding member
        overrider: String,
        /// All matching base members
        candidates: Vec<String>,
    },

    /// Several mixins override one member without ordering information
    #[error(
        "Ambiguous override: mixins [{}] all override {member} on target {target} but provide no \
         dependency information ordering them",
        .mixins.join(", ")
    )]
    AmbiguousOverrideOrdering {
        /// Target type
        target: String,
        /// Overridden member signature
        member: String,
        /// Unordered overriding mixins
        mixins: Vec<String>,
    },

    /// A required capability set cannot be satisfied by any implementer
    #[error(
        "Unfulfilled requirement: [{}] require {requirement}{} but neither target {target} nor any \
         mixin provides it",
        .dependents.join(", "),
        .member.as_ref().map(|m| format!(" (missing member {m})")).unwrap_or_default()
    )]
    UnfulfilledRequirement {
        /// Target type
        target: String,
        /// Dependent mixins (or the target, for complete interfaces)
        dependents: Vec<String>,
        /// Required capability set, class or mixin
        requirement: String,
        /// First missing member signature, when a member is missing
        member: Option<String>,
    },

    /// Two mixins introduce the same capability set
    #[error("Capability {interface} is introduced by more than one mixin on {target}: [{}]", .mixins.join(", "))]
    DuplicateIntroduction {
        /// Target type
        target: String,
        /// Introduced capability set
        interface: String,
        /// Introducing mixins
        mixins: Vec<String>,
    },

    /// An initialization hook parameter has no known role
    #[error("Initialization hook of mixin {mixin} has parameter {parameter} that is neither the target nor the next proxy")]
    InvalidInitializationParameter {
        /// Mixin declaring the hook
        mixin: String,
        /// Offending parameter
        parameter: String,
    },

    /// An externally supplied mixin instance was rejected
    #[error("Invalid mixin instance of {mixin} for target {target}: {reason}")]
    InvalidMixinInstance {
        /// Target type
        target: String,
        /// Mixin type of the supplied instance
        mixin: String,
        /// Rejection reason
        reason: InvalidInstanceReason,
    },

    /// A mixin slot could not be filled by default construction
    #[error("Mixin {mixin} on target {target} has no public or protected default construction path")]
    MissingDefaultConstructor {
        /// Target type
        target: String,
        /// Mixin type
        mixin: String,
    },

    /// A reconstructed object is incompatible with what was expected
    #[error("Serialization mismatch: expected {expected}, found {found}")]
    SerializationMismatch {
        /// What the caller or composition expected
        expected: String,
        /// What the snapshot contained
        found: String,
    },

    /// Malformed snapshot or configuration document
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A hook failed while an instance was being initialized
    #[error("Initialization of {owner} failed: {source}")]
    Initialization {
        /// Mixin or target whose hook failed
        owner: String,
        /// Underlying failure
        source: InvocationError,
    },
}

/// Result type for composition operations
pub type CompositionResult<T> = Result<T, CompositionError>;

impl From<serde_json::Error> for CompositionError {
    fn from(err: serde_json::Error) -> Self {
        CompositionError::Serialization(err.to_string())
    }
}

impl CompositionError {
    /// Create an unknown-type error
    pub fn unknown(kind: impl Into<String>, key: impl fmt::Display) -> Self {
        CompositionError::UnknownType {
            kind: kind.into(),
            key: key.to_string(),
        }
    }

    /// Check if this error reports an override ambiguity of either kind
    pub fn is_ambiguous_override(&self) -> bool {
        matches!(
            self,
            CompositionError::AmbiguousOverride { .. }
                | CompositionError::AmbiguousOverrideOrdering { .. }
        )
    }

    /// Check if this error comes from validating the configuration itself
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            CompositionError::UnknownType { .. }
                | CompositionError::DuplicateMixin { .. }
                | CompositionError::CyclicMixinDependency { .. }
                | CompositionError::CyclicCapability { .. }
                | CompositionError::UnresolvedOverride { .. }
                | CompositionError::AmbiguousOverride { .. }
                | CompositionError::AmbiguousOverrideOrdering { .. }
                | CompositionError::UnfulfilledRequirement { .. }
                | CompositionError::DuplicateIntroduction { .. }
                | CompositionError::InvalidInitializationParameter { .. }
        )
    }

    /// Check if this error was raised while creating a single instance
    pub fn is_instance_error(&self) -> bool {
        matches!(
            self,
            CompositionError::InvalidMixinInstance { .. }
                | CompositionError::MissingDefaultConstructor { .. }
                | CompositionError::Initialization { .. }
        )
    }
}

/// Errors raised when invoking members on a composed object
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvocationError {
    /// No member with this name or signature exists on the owner
    #[error("Unknown member {member} on {owner}")]
    UnknownMember {
        /// Target or mixin searched
        owner: String,
        /// Requested member
        member: String,
    },

    /// A bare member name matches several overloads
    #[error("Member name {member} on {owner} is ambiguous: [{}]", .candidates.join(", "))]
    AmbiguousMember {
        /// Target or mixin searched
        owner: String,
        /// Requested member
        member: String,
        /// Matching signatures
        candidates: Vec<String>,
    },

    /// The member exists but has no body
    #[error("Member {member} on {owner} has no implementation")]
    NoImplementation {
        /// Declaring target or mixin
        owner: String,
        /// Member signature
        member: String,
    },

    /// A base call was made where no next implementation exists
    #[error("No next implementation for {member}")]
    NoNextImplementation {
        /// Requested member
        member: String,
    },

    /// A mixin named in a call is not part of the composition
    #[error("Unknown mixin {0}")]
    UnknownMixin(String),

    /// The composed object does not implement the requested capability set
    #[error("Capability {0} is not implemented by the composed object")]
    NotImplemented(String),

    /// A member body reported a failure
    #[error("Invocation failed: {0}")]
    Failed(String),
}

impl InvocationError {
    /// Create a failure reported by a member body
    pub fn failed(msg: impl Into<String>) -> Self {
        InvocationError::Failed(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test error display messages carry identifying context
    ///
    /// ```mermaid
    /// graph TD
    ///     A[CompositionError] -->|Display| B[Message with target, mixins, member]
    /// ```
    #[test]
    fn test_error_display_messages() {
        let err = CompositionError::CyclicMixinDependency {
            target: "Order".to_string(),
            mixins: vec!["Audit".to_string(), "Pricing".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Cyclic mixin dependency on target Order: Audit -> Pricing"
        );

        let err = CompositionError::CyclicCapability {
            capability: "IRight".to_string(),
            path: vec!["ILeft".to_string(), "IRight".to_string(), "ILeft".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Cyclic capability aggregate IRight: ILeft -> IRight -> ILeft"
        );

        let err = CompositionError::AmbiguousOverrideOrdering {
            target: "Order".to_string(),
            member: "Total()".to_string(),
            mixins: vec!["Discount".to_string(), "Tax".to_string()],
        };
        assert!(err.to_string().contains("[Discount, Tax]"));
        assert!(err.to_string().contains("Total()"));

        let err = CompositionError::UnfulfilledRequirement {
            target: "Order".to_string(),
            dependents: vec!["Audit".to_string()],
            requirement: "IClock".to_string(),
            member: Some("method Now() -> Instant".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Unfulfilled requirement: [Audit] require IClock (missing member method Now() -> Instant) \
             but neither target Order nor any mixin provides it"
        );

        let err = CompositionError::InvalidMixinInstance {
            target: "Order".to_string(),
            mixin: "Audit".to_string(),
            reason: InvalidInstanceReason::NotDerived,
        };
        assert!(err.to_string().contains("not possible to use it as mixin instance"));
    }

    /// Test error classification helpers
    #[test]
    fn test_error_classification() {
        let ambiguous = CompositionError::AmbiguousOverride {
            target: "T".to_string(),
            declaring: "M".to_string(),
            overrider: "Foo()".to_string(),
            candidates: vec!["IA.Foo()".to_string(), "IB.Foo()".to_string()],
        };
        assert!(ambiguous.is_ambiguous_override());
        assert!(ambiguous.is_configuration_error());
        assert!(!ambiguous.is_instance_error());

        let missing = CompositionError::MissingDefaultConstructor {
            target: "T".to_string(),
            mixin: "M".to_string(),
        };
        assert!(missing.is_instance_error());
        assert!(!missing.is_configuration_error());
    }

    /// Test conversion from serde_json errors
    #[test]
    fn test_from_serde_json_error() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let composition: CompositionError = err.into();
        assert!(matches!(composition, CompositionError::Serialization(_)));
    }
}
