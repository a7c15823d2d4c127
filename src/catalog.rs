// Copyright 2025 Cowboy AI, LLC.

//! Type catalog: authoring-time descriptions of targets, mixins and capability sets
//!
//! Targets and mixins are declared once, independently of each other. Nothing
//! in a [`ClassType`] knows which mixins will be applied to it and nothing in a
//! [`MixinType`] knows the concrete target it ends up on; the composition
//! pipeline joins them later through a [`ClassContext`](crate::ClassContext).

use indexmap::{IndexMap, IndexSet};
use std::fmt;
use std::sync::Arc;

use crate::errors::{CompositionError, CompositionResult, InvocationError};
use crate::identifiers::TypeKey;
use crate::member::{FieldSet, MemberSignature, Value, Visibility};
use crate::runtime::{CallContext, HookArgument};

/// Body of a method, property accessor or event accessor
pub type MemberFn =
    Arc<dyn Fn(&mut CallContext<'_>, &[Value]) -> Result<Value, InvocationError> + Send + Sync>;

/// Body of a mixin initialization hook
pub type HookFn =
    Arc<dyn Fn(&mut CallContext<'_>, &[HookArgument]) -> Result<(), InvocationError> + Send + Sync>;

/// Body of an on-deserialized hook
pub type DeserializedFn =
    Arc<dyn Fn(&mut CallContext<'_>) -> Result<(), InvocationError> + Send + Sync>;

/// Constructor producing the initial field state of a mixin
pub type FactoryFn = Arc<dyn Fn() -> FieldSet + Send + Sync>;

/// Override declaration attached to a member
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverrideDecl {
    /// A mixin member overriding a member of its target
    Target,
    /// A target member overriding a mixin member, optionally restricted to
    /// one mixin type
    Mixin {
        /// Mixin whose member is overridden; any configured mixin when `None`
        mixin: Option<TypeKey>,
    },
}

/// Declaration of one member of a class or mixin
#[derive(Clone)]
pub struct MemberDecl {
    /// Signature
    pub signature: MemberSignature,
    /// Visibility
    pub visibility: Visibility,
    /// Override declaration, if the member overrides something
    pub override_decl: Option<OverrideDecl>,
    /// Body; abstract members have none
    pub implementation: Option<MemberFn>,
}

impl MemberDecl {
    /// Public member with the given signature and no body
    pub fn new(signature: MemberSignature) -> Self {
        Self {
            signature,
            visibility: Visibility::Public,
            override_decl: None,
            implementation: None,
        }
    }

    /// Public method with no parameters and no return type
    pub fn method(name: impl Into<String>) -> Self {
        Self::new(MemberSignature::method(name))
    }

    /// Set the visibility
    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Mark the member protected
    pub fn protected(self) -> Self {
        self.with_visibility(Visibility::Protected)
    }

    /// Mark the member private
    pub fn private(self) -> Self {
        self.with_visibility(Visibility::Private)
    }

    /// Declare that this mixin member overrides a target member
    pub fn overriding_target(mut self) -> Self {
        self.override_decl = Some(OverrideDecl::Target);
        self
    }

    /// Declare that this target member overrides a member of any mixin
    pub fn overriding_mixin(mut self) -> Self {
        self.override_decl = Some(OverrideDecl::Mixin { mixin: None });
        self
    }

    /// Declare that this target member overrides a member of one mixin
    pub fn overriding_mixin_of(mut self, mixin: impl Into<TypeKey>) -> Self {
        self.override_decl = Some(OverrideDecl::Mixin {
            mixin: Some(mixin.into()),
        });
        self
    }

    /// Attach a body
    pub fn body<F>(mut self, body: F) -> Self
    where
        F: Fn(&mut CallContext<'_>, &[Value]) -> Result<Value, InvocationError>
            + Send
            + Sync
            + 'static,
    {
        self.implementation = Some(Arc::new(body));
        self
    }
}

impl fmt::Debug for MemberDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemberDecl")
            .field("signature", &self.signature.to_string())
            .field("visibility", &self.visibility)
            .field("override_decl", &self.override_decl)
            .field("has_body", &self.implementation.is_some())
            .finish()
    }
}

/// A named set of required member signatures
///
/// A set with no own members and at least one component is an aggregator:
/// requiring it means requiring each component separately.
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilitySet {
    /// Identity
    pub key: TypeKey,
    /// Members declared by this set itself
    pub members: Vec<MemberSignature>,
    /// Component (base) capability sets
    pub components: Vec<TypeKey>,
}

impl CapabilitySet {
    /// Create an empty capability set
    pub fn new(key: impl Into<TypeKey>) -> Self {
        Self {
            key: key.into(),
            members: Vec::new(),
            components: Vec::new(),
        }
    }

    /// Add a member signature
    pub fn member(mut self, signature: MemberSignature) -> Self {
        self.members.push(signature);
        self
    }

    /// Add a component capability set
    pub fn extends(mut self, component: impl Into<TypeKey>) -> Self {
        self.components.push(component.into());
        self
    }

    /// Zero own members and at least one component
    pub fn is_aggregator(&self) -> bool {
        self.members.is_empty() && !self.components.is_empty()
    }

    /// Zero own members and no components
    pub fn is_empty_interface(&self) -> bool {
        self.members.is_empty() && self.components.is_empty()
    }
}

/// A concrete class: the target of a composition, or a class named by a
/// duck-typed requirement
#[derive(Clone)]
pub struct ClassType {
    /// Identity
    pub key: TypeKey,
    /// Declared members
    pub members: Vec<MemberDecl>,
    /// Implemented capability sets
    pub implements: Vec<TypeKey>,
    /// Declared fields with their initial values
    pub fields: FieldSet,
    /// Hook run after the object was restored from a snapshot
    pub on_deserialized: Option<DeserializedFn>,
}

impl ClassType {
    /// Create a class with no members
    pub fn new(key: impl Into<TypeKey>) -> Self {
        Self {
            key: key.into(),
            members: Vec::new(),
            implements: Vec::new(),
            fields: FieldSet::new(),
            on_deserialized: None,
        }
    }

    /// Add a member
    pub fn member(mut self, member: MemberDecl) -> Self {
        self.members.push(member);
        self
    }

    /// Declare an implemented capability set
    pub fn implements(mut self, capability: impl Into<TypeKey>) -> Self {
        self.implements.push(capability.into());
        self
    }

    /// Declare a field with its initial value
    pub fn field(mut self, name: impl Into<String>, initial: Value) -> Self {
        self.fields.insert(name.into(), initial);
        self
    }

    /// Attach an on-deserialized hook
    pub fn on_deserialized<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut CallContext<'_>) -> Result<(), InvocationError> + Send + Sync + 'static,
    {
        self.on_deserialized = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for ClassType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassType")
            .field("key", &self.key)
            .field("members", &self.members)
            .field("implements", &self.implements)
            .field("fields", &self.fields)
            .field("has_on_deserialized", &self.on_deserialized.is_some())
            .finish()
    }
}

/// What a mixin requires from the target or from the rest of the chain
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RequirementSpec {
    /// A capability set named directly
    Capability(TypeKey),
    /// A concrete class; its implemented capability sets are required
    /// structurally
    Class(TypeKey),
}

impl RequirementSpec {
    /// Key of the named capability set or class
    pub fn key(&self) -> &TypeKey {
        match self {
            RequirementSpec::Capability(key) | RequirementSpec::Class(key) => key,
        }
    }
}

/// How a mixin instance is created when none is supplied
#[derive(Clone)]
pub enum ConstructionPath {
    /// Value-like mixin: default construction copies the declared fields
    Value,
    /// Reference mixin with a parameterless constructor
    Constructor {
        /// Constructor visibility
        visibility: Visibility,
        /// Custom constructor body; declared fields are used when absent
        factory: Option<FactoryFn>,
    },
    /// No parameterless constructor exists
    Unavailable,
}

impl Default for ConstructionPath {
    fn default() -> Self {
        ConstructionPath::Constructor {
            visibility: Visibility::Public,
            factory: None,
        }
    }
}

impl fmt::Debug for ConstructionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstructionPath::Value => f.write_str("Value"),
            ConstructionPath::Constructor { visibility, factory } => f
                .debug_struct("Constructor")
                .field("visibility", visibility)
                .field("has_factory", &factory.is_some())
                .finish(),
            ConstructionPath::Unavailable => f.write_str("Unavailable"),
        }
    }
}

/// Declared parameter of an initialization hook
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookParameter {
    /// Receives the target
    Target,
    /// Receives the base-call proxy one level below the mixin
    Next,
    /// Any other parameter; rejected at composition time
    Other {
        /// Parameter name
        name: String,
    },
}

/// Initialization hook of a mixin
#[derive(Clone)]
pub struct InitHook {
    /// Positional parameters
    pub parameters: Vec<HookParameter>,
    /// Hook body
    pub body: HookFn,
}

impl fmt::Debug for InitHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitHook")
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

/// A pluggable behavior unit
#[derive(Clone)]
pub struct MixinType {
    /// Identity
    pub key: TypeKey,
    /// Declared members
    pub members: Vec<MemberDecl>,
    /// Capability sets the mixin implements and introduces on its target
    pub implements: Vec<TypeKey>,
    /// Declared fields with their initial values
    pub fields: FieldSet,
    /// Requirements on the target ("this")
    pub this_requirements: Vec<RequirementSpec>,
    /// Requirements on the rest of the chain ("next")
    pub next_requirements: Vec<RequirementSpec>,
    /// Other mixins this one needs; they are ordered first
    pub mixin_requirements: Vec<TypeKey>,
    /// Pure ordering dependencies; they are ordered first when present
    pub depends_on: Vec<TypeKey>,
    /// Default construction path
    pub construction: ConstructionPath,
    /// Initialization hook
    pub initializer: Option<InitHook>,
    /// Hook run after the composed object was restored from a snapshot
    pub on_deserialized: Option<DeserializedFn>,
    /// Whether declaration order may decide its position relative to other
    /// mixins overriding the same member
    pub accepts_declaration_order: bool,
}

impl MixinType {
    /// Create a mixin with no members or requirements
    pub fn new(key: impl Into<TypeKey>) -> Self {
        Self {
            key: key.into(),
            members: Vec::new(),
            implements: Vec::new(),
            fields: FieldSet::new(),
            this_requirements: Vec::new(),
            next_requirements: Vec::new(),
            mixin_requirements: Vec::new(),
            depends_on: Vec::new(),
            construction: ConstructionPath::default(),
            initializer: None,
            on_deserialized: None,
            accepts_declaration_order: false,
        }
    }

    /// Add a member
    pub fn member(mut self, member: MemberDecl) -> Self {
        self.members.push(member);
        self
    }

    /// Declare an implemented (introduced) capability set
    pub fn implements(mut self, capability: impl Into<TypeKey>) -> Self {
        self.implements.push(capability.into());
        self
    }

    /// Declare a field with its initial value
    pub fn field(mut self, name: impl Into<String>, initial: Value) -> Self {
        self.fields.insert(name.into(), initial);
        self
    }

    /// Require a capability set from the target
    pub fn requires_this(mut self, capability: impl Into<TypeKey>) -> Self {
        self.this_requirements
            .push(RequirementSpec::Capability(capability.into()));
        self
    }

    /// Require the target to look like a concrete class
    pub fn requires_this_class(mut self, class: impl Into<TypeKey>) -> Self {
        self.this_requirements.push(RequirementSpec::Class(class.into()));
        self
    }

    /// Require a capability set from the rest of the chain
    pub fn requires_next(mut self, capability: impl Into<TypeKey>) -> Self {
        self.next_requirements
            .push(RequirementSpec::Capability(capability.into()));
        self
    }

    /// Require the rest of the chain to look like a concrete class
    pub fn requires_next_class(mut self, class: impl Into<TypeKey>) -> Self {
        self.next_requirements.push(RequirementSpec::Class(class.into()));
        self
    }

    /// Require another mixin
    pub fn requires_mixin(mut self, mixin: impl Into<TypeKey>) -> Self {
        self.mixin_requirements.push(mixin.into());
        self
    }

    /// Declare an ordering dependency on another mixin
    pub fn depends_on(mut self, mixin: impl Into<TypeKey>) -> Self {
        self.depends_on.push(mixin.into());
        self
    }

    /// Set the default construction path
    pub fn construction(mut self, construction: ConstructionPath) -> Self {
        self.construction = construction;
        self
    }

    /// Attach an initialization hook with positional parameters
    pub fn initializer<F>(mut self, parameters: Vec<HookParameter>, body: F) -> Self
    where
        F: Fn(&mut CallContext<'_>, &[HookArgument]) -> Result<(), InvocationError>
            + Send
            + Sync
            + 'static,
    {
        self.initializer = Some(InitHook {
            parameters,
            body: Arc::new(body),
        });
        self
    }

    /// Attach an on-deserialized hook
    pub fn on_deserialized<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut CallContext<'_>) -> Result<(), InvocationError> + Send + Sync + 'static,
    {
        self.on_deserialized = Some(Arc::new(hook));
        self
    }

    /// Allow declaration order to break override ordering ties
    pub fn accepts_declaration_order(mut self) -> Self {
        self.accepts_declaration_order = true;
        self
    }
}

impl fmt::Debug for MixinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MixinType")
            .field("key", &self.key)
            .field("members", &self.members)
            .field("implements", &self.implements)
            .field("fields", &self.fields)
            .field("this_requirements", &self.this_requirements)
            .field("next_requirements", &self.next_requirements)
            .field("mixin_requirements", &self.mixin_requirements)
            .field("depends_on", &self.depends_on)
            .field("construction", &self.construction)
            .field("initializer", &self.initializer)
            .field("accepts_declaration_order", &self.accepts_declaration_order)
            .finish()
    }
}

/// Registry of every type a composition may refer to
///
/// Keys are unique across all three sections.
#[derive(Default, Clone)]
pub struct TypeCatalog {
    classes: IndexMap<TypeKey, Arc<ClassType>>,
    mixins: IndexMap<TypeKey, Arc<MixinType>>,
    capabilities: IndexMap<TypeKey, Arc<CapabilitySet>>,
}

impl TypeCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_unregistered(&self, key: &TypeKey) -> CompositionResult<()> {
        if self.classes.contains_key(key)
            || self.mixins.contains_key(key)
            || self.capabilities.contains_key(key)
        {
            return Err(CompositionError::DuplicateType(key.to_string()));
        }
        Ok(())
    }

    /// Register a class
    ///
    /// # Errors
    ///
    /// Returns an error if the key is already registered
    pub fn register_class(&mut self, class: ClassType) -> CompositionResult<()> {
        self.ensure_unregistered(&class.key)?;
        self.classes.insert(class.key.clone(), Arc::new(class));
        Ok(())
    }

    /// Register a mixin
    ///
    /// # Errors
    ///
    /// Returns an error if the key is already registered
    pub fn register_mixin(&mut self, mixin: MixinType) -> CompositionResult<()> {
        self.ensure_unregistered(&mixin.key)?;
        self.mixins.insert(mixin.key.clone(), Arc::new(mixin));
        Ok(())
    }

    /// Register a capability set
    ///
    /// # Errors
    ///
    /// Returns an error if the key is already registered
    pub fn register_capability(&mut self, capability: CapabilitySet) -> CompositionResult<()> {
        self.ensure_unregistered(&capability.key)?;
        self.capabilities
            .insert(capability.key.clone(), Arc::new(capability));
        Ok(())
    }

    /// Look up a class
    pub fn class(&self, key: &TypeKey) -> CompositionResult<&Arc<ClassType>> {
        self.classes
            .get(key)
            .ok_or_else(|| CompositionError::unknown("class", key))
    }

    /// Look up a mixin
    pub fn mixin(&self, key: &TypeKey) -> CompositionResult<&Arc<MixinType>> {
        self.mixins
            .get(key)
            .ok_or_else(|| CompositionError::unknown("mixin", key))
    }

    /// Look up a capability set
    pub fn capability(&self, key: &TypeKey) -> CompositionResult<&Arc<CapabilitySet>> {
        self.capabilities
            .get(key)
            .ok_or_else(|| CompositionError::unknown("capability", key))
    }

    /// Whether a mixin is registered under the key
    pub fn has_mixin(&self, key: &TypeKey) -> bool {
        self.mixins.contains_key(key)
    }

    /// Every capability set reachable from the roots through components.
    ///
    /// Each set appears once, in depth-first preorder; component graphs that
    /// revisit a set (diamonds) or loop back are walked only once.
    pub fn capability_closure<'a>(
        &self,
        roots: impl IntoIterator<Item = &'a TypeKey>,
    ) -> CompositionResult<IndexSet<TypeKey>> {
        let mut visited = IndexSet::new();
        let mut stack: Vec<TypeKey> = roots.into_iter().cloned().collect();
        stack.reverse();
        while let Some(key) = stack.pop() {
            if visited.contains(&key) {
                continue;
            }
            let capability = self.capability(&key)?;
            visited.insert(key);
            for component in capability.components.iter().rev() {
                if !visited.contains(component) {
                    stack.push(component.clone());
                }
            }
        }
        Ok(visited)
    }

    /// Whether a type implementing `implemented` nominally implements
    /// `capability`, directly or through components
    pub fn implements(
        &self,
        implemented: &[TypeKey],
        capability: &TypeKey,
    ) -> CompositionResult<bool> {
        Ok(self.capability_closure(implemented)?.contains(capability))
    }

    /// Deduplicated member list of a capability set and all its components
    pub fn capability_members(&self, key: &TypeKey) -> CompositionResult<Vec<MemberSignature>> {
        let mut members = IndexSet::new();
        for reached in self.capability_closure(std::iter::once(key))? {
            members.extend(self.capability(&reached)?.members.iter().cloned());
        }
        Ok(members.into_iter().collect())
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.classes.len() + self.mixins.len() + self.capabilities.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for TypeCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeCatalog")
            .field("classes", &self.classes.keys().collect::<Vec<_>>())
            .field("mixins", &self.mixins.keys().collect::<Vec<_>>())
            .field("capabilities", &self.capabilities.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn diamond_catalog() -> TypeCatalog {
        let mut catalog = TypeCatalog::new();
        catalog
            .register_capability(
                CapabilitySet::new("IBase").member(MemberSignature::method("Id").returning("u64")),
            )
            .unwrap();
        catalog
            .register_capability(
                CapabilitySet::new("ILeft")
                    .extends("IBase")
                    .member(MemberSignature::method("Left")),
            )
            .unwrap();
        catalog
            .register_capability(
                CapabilitySet::new("IRight")
                    .extends("IBase")
                    .member(MemberSignature::method("Right")),
            )
            .unwrap();
        catalog
            .register_capability(CapabilitySet::new("IBoth").extends("ILeft").extends("IRight"))
            .unwrap();
        catalog
    }

    /// Test registration rejects duplicate keys across sections
    #[test]
    fn test_duplicate_registration() {
        let mut catalog = TypeCatalog::new();
        catalog.register_class(ClassType::new("Order")).unwrap();
        let err = catalog.register_mixin(MixinType::new("Order")).unwrap_err();
        assert_eq!(err, CompositionError::DuplicateType("Order".to_string()));
        assert_eq!(catalog.len(), 1);
    }

    /// Test capability closure walks diamonds once
    ///
    /// ```mermaid
    /// graph TD
    ///     IBoth --> ILeft
    ///     IBoth --> IRight
    ///     ILeft --> IBase
    ///     IRight --> IBase
    /// ```
    #[test]
    fn test_capability_closure_deduplicates() {
        let catalog = diamond_catalog();
        let closure = catalog
            .capability_closure(std::iter::once(&TypeKey::new("IBoth")))
            .unwrap();
        let names: Vec<&str> = closure.iter().map(TypeKey::as_str).collect();
        assert_eq!(names, vec!["IBoth", "ILeft", "IBase", "IRight"]);

        let members = catalog.capability_members(&TypeKey::new("IBoth")).unwrap();
        let keys: Vec<String> = members.iter().map(MemberSignature::key).collect();
        assert_eq!(keys, vec!["Left()", "Id()", "Right()"]);
    }

    /// Test aggregator and empty classification
    #[test]
    fn test_capability_flags() {
        let catalog = diamond_catalog();
        assert!(catalog.capability(&"IBoth".into()).unwrap().is_aggregator());
        assert!(!catalog.capability(&"ILeft".into()).unwrap().is_aggregator());
        assert!(CapabilitySet::new("IMarker").is_empty_interface());
    }

    /// Test nominal implementation through components
    #[test]
    fn test_implements_through_components() {
        let catalog = diamond_catalog();
        let implemented = vec![TypeKey::new("ILeft")];
        assert!(catalog.implements(&implemented, &"IBase".into()).unwrap());
        assert!(!catalog.implements(&implemented, &"IRight".into()).unwrap());
    }

    /// Test unknown capability sets surface as errors
    #[test]
    fn test_unknown_capability() {
        let catalog = TypeCatalog::new();
        let err = catalog
            .capability_closure(std::iter::once(&TypeKey::new("IMissing")))
            .unwrap_err();
        assert!(matches!(err, CompositionError::UnknownType { .. }));
    }

    /// Test cyclic component graphs terminate
    #[test]
    fn test_cyclic_components_terminate() {
        let mut catalog = TypeCatalog::new();
        catalog
            .register_capability(CapabilitySet::new("IA").extends("IB").member(MemberSignature::method("A")))
            .unwrap();
        catalog
            .register_capability(CapabilitySet::new("IB").extends("IA").member(MemberSignature::method("B")))
            .unwrap();
        let members = catalog.capability_members(&"IA".into()).unwrap();
        assert_eq!(members.len(), 2);
    }
}
