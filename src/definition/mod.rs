// Copyright 2025 Cowboy AI, LLC.

//! Definition model: the resolved description of one composition
//!
//! A [`TargetClassDefinition`] owns the target's member definitions and the
//! mixin definitions in sorted order. Members refer to each other through
//! [`MemberRef`]s (owner + position) rather than pointers, so the whole graph
//! is immutable and freely shareable once the pipeline has filled in override
//! edges and requirement resolutions.

mod builder;

pub use builder::DefinitionBuilder;

use indexmap::{IndexMap, IndexSet};
use std::fmt;
use std::sync::Arc;

use crate::catalog::{ClassType, MemberFn, MixinType, OverrideDecl};
use crate::context::{ClassContext, MixinContext, MixinKind};
use crate::errors::InvocationError;
use crate::identifiers::TypeKey;
use crate::member::{MemberSignature, Visibility};

/// Owner of a member: the target or the mixin at a sorted index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DefinitionRef {
    /// The target class
    Target,
    /// The mixin with this mixin index
    Mixin(usize),
}

/// Position of a member inside its owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemberRef {
    /// Declaring definition
    pub owner: DefinitionRef,
    /// Index into the owner's member list
    pub index: usize,
}

impl MemberRef {
    /// Member of the target
    pub fn target(index: usize) -> Self {
        Self {
            owner: DefinitionRef::Target,
            index,
        }
    }

    /// Member of a mixin
    pub fn mixin(mixin: usize, index: usize) -> Self {
        Self {
            owner: DefinitionRef::Mixin(mixin),
            index,
        }
    }
}

/// Method, property or event definition
#[derive(Clone)]
pub struct MemberDefinition {
    pub(crate) signature: MemberSignature,
    pub(crate) visibility: Visibility,
    pub(crate) declaring: DefinitionRef,
    pub(crate) override_decl: Option<OverrideDecl>,
    pub(crate) base: Option<MemberRef>,
    pub(crate) overrides: Vec<MemberRef>,
    pub(crate) implementation: Option<MemberFn>,
}

impl MemberDefinition {
    /// Signature
    pub fn signature(&self) -> &MemberSignature {
        &self.signature
    }

    /// Visibility
    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    /// Declaring target or mixin
    pub fn declaring(&self) -> DefinitionRef {
        self.declaring
    }

    /// Override declaration as written on the member
    pub fn override_decl(&self) -> Option<&OverrideDecl> {
        self.override_decl.as_ref()
    }

    /// The single member this one overrides
    pub fn base(&self) -> Option<MemberRef> {
        self.base
    }

    /// Members overriding this one, in mixin sort order
    pub fn overrides(&self) -> &[MemberRef] {
        &self.overrides
    }

    /// Whether anything overrides this member
    pub fn is_overridden(&self) -> bool {
        !self.overrides.is_empty()
    }

    /// Body, if the member is not abstract
    pub fn implementation(&self) -> Option<&MemberFn> {
        self.implementation.as_ref()
    }
}

impl fmt::Debug for MemberDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemberDefinition")
            .field("signature", &self.signature.to_string())
            .field("visibility", &self.visibility)
            .field("declaring", &self.declaring)
            .field("base", &self.base)
            .field("overrides", &self.overrides)
            .field("has_body", &self.implementation.is_some())
            .finish()
    }
}

/// Kind of a requirement edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequirementKind {
    /// Needed from the target ("this")
    Face,
    /// Needed from the rest of the chain ("next")
    NextCall,
    /// Needed from another mixin directly
    Mixin,
}

impl fmt::Display for RequirementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequirementKind::Face => f.write_str("face"),
            RequirementKind::NextCall => f.write_str("next call"),
            RequirementKind::Mixin => f.write_str("mixin"),
        }
    }
}

/// A required capability set, structural class requirement or mixin
#[derive(Debug, Clone, PartialEq)]
pub struct RequiredTypeDefinition {
    pub(crate) kind: RequirementKind,
    pub(crate) key: TypeKey,
    pub(crate) own_members: Vec<MemberSignature>,
    pub(crate) members: Vec<MemberSignature>,
    pub(crate) components: Vec<TypeKey>,
    pub(crate) structural: bool,
    pub(crate) requiring_dependencies: Vec<DefinitionRef>,
}

impl RequiredTypeDefinition {
    /// Kind of requirement
    pub fn kind(&self) -> RequirementKind {
        self.kind
    }

    /// Required capability set, class or mixin
    pub fn key(&self) -> &TypeKey {
        &self.key
    }

    /// Members declared by the set itself
    pub fn own_members(&self) -> &[MemberSignature] {
        &self.own_members
    }

    /// Every required member, deduplicated across components
    pub fn members(&self) -> &[MemberSignature] {
        &self.members
    }

    /// Component capability sets
    pub fn components(&self) -> &[TypeKey] {
        &self.components
    }

    /// Whether the requirement was inferred from a concrete class
    pub fn is_structural(&self) -> bool {
        self.structural
    }

    /// No members and no components
    pub fn is_empty_interface(&self) -> bool {
        self.own_members.is_empty() && self.components.is_empty()
    }

    /// Pure union of other capability sets: no own members, at least one
    /// component
    pub fn is_aggregator_interface(&self) -> bool {
        !self.structural && self.own_members.is_empty() && !self.components.is_empty()
    }

    /// Definitions whose dependencies point at this requirement
    pub fn requiring_dependencies(&self) -> &[DefinitionRef] {
        &self.requiring_dependencies
    }
}

/// Definition that satisfies a dependency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Implementer {
    /// The target class
    Target,
    /// The mixin with this mixin index
    Mixin(usize),
}

impl From<Implementer> for DefinitionRef {
    fn from(implementer: Implementer) -> Self {
        match implementer {
            Implementer::Target => DefinitionRef::Target,
            Implementer::Mixin(index) => DefinitionRef::Mixin(index),
        }
    }
}

/// Edge from a depender to a required type, with its resolution
#[derive(Debug, Clone, PartialEq)]
pub struct Dependency {
    pub(crate) kind: RequirementKind,
    pub(crate) depender: DefinitionRef,
    pub(crate) required: TypeKey,
    pub(crate) aggregated: Vec<Dependency>,
    pub(crate) implementer: Option<Implementer>,
    pub(crate) resolved_members: IndexMap<MemberSignature, MemberRef>,
}

impl Dependency {
    pub(crate) fn new(kind: RequirementKind, depender: DefinitionRef, required: TypeKey) -> Self {
        Self {
            kind,
            depender,
            required,
            aggregated: Vec::new(),
            implementer: None,
            resolved_members: IndexMap::new(),
        }
    }

    /// Kind of edge
    pub fn kind(&self) -> RequirementKind {
        self.kind
    }

    /// Definition holding the requirement
    pub fn depender(&self) -> DefinitionRef {
        self.depender
    }

    /// Required type
    pub fn required(&self) -> &TypeKey {
        &self.required
    }

    /// Sub-dependencies of an aggregate
    pub fn aggregated(&self) -> &[Dependency] {
        &self.aggregated
    }

    /// Whether this dependency expands into sub-dependencies
    pub fn is_aggregate(&self) -> bool {
        !self.aggregated.is_empty()
    }

    /// Resolved implementer; aggregates report one only when all parts agree
    pub fn implementer(&self) -> Option<Implementer> {
        self.implementer
    }

    /// Required member signature → implementing member
    pub fn resolved_members(&self) -> &IndexMap<MemberSignature, MemberRef> {
        &self.resolved_members
    }

    /// Find the implementing member for a member reference, searching
    /// aggregated parts as well
    pub fn resolve_member(&self, reference: &str) -> Option<MemberRef> {
        self.resolved_members
            .iter()
            .find(|(signature, _)| signature.is_selected_by(reference))
            .map(|(_, member)| *member)
            .or_else(|| {
                self.aggregated
                    .iter()
                    .find_map(|part| part.resolve_member(reference))
            })
    }

    /// Every resolved member, including those of aggregated parts
    pub fn all_resolved_members(&self) -> Vec<(&MemberSignature, MemberRef)> {
        let mut all: Vec<(&MemberSignature, MemberRef)> = self
            .resolved_members
            .iter()
            .map(|(signature, member)| (signature, *member))
            .collect();
        for part in &self.aggregated {
            all.extend(part.all_resolved_members());
        }
        all
    }
}

/// A capability set introduced onto the target by one mixin
#[derive(Debug, Clone, PartialEq)]
pub struct Introduction {
    pub(crate) mixin: usize,
    pub(crate) members: IndexMap<MemberSignature, usize>,
}

impl Introduction {
    /// Introducing mixin index
    pub fn mixin(&self) -> usize {
        self.mixin
    }

    /// Capability member → member index inside the mixin
    pub fn members(&self) -> &IndexMap<MemberSignature, usize> {
        &self.members
    }
}

/// One mixin as applied to one target
#[derive(Clone)]
pub struct MixinDefinition {
    pub(crate) index: usize,
    pub(crate) mixin_type: Arc<MixinType>,
    pub(crate) context: MixinContext,
    pub(crate) members: Vec<MemberDefinition>,
    pub(crate) implemented: IndexSet<TypeKey>,
    pub(crate) this_dependencies: IndexMap<TypeKey, Dependency>,
    pub(crate) next_call_dependencies: IndexMap<TypeKey, Dependency>,
    pub(crate) mixin_dependencies: IndexMap<TypeKey, Dependency>,
    pub(crate) needs_derived_type: bool,
}

impl MixinDefinition {
    /// Mixin index (position in sort order)
    pub fn index(&self) -> usize {
        self.index
    }

    /// Mixin type key
    pub fn key(&self) -> &TypeKey {
        &self.mixin_type.key
    }

    /// Catalog description of the mixin
    pub fn mixin_type(&self) -> &Arc<MixinType> {
        &self.mixin_type
    }

    /// Attachment kind from the configuration
    pub fn kind(&self) -> MixinKind {
        self.context.kind
    }

    /// Configuration entry
    pub fn context(&self) -> &MixinContext {
        &self.context
    }

    /// Member definitions
    pub fn members(&self) -> &[MemberDefinition] {
        &self.members
    }

    /// Capability sets the mixin implements, with components
    pub fn implemented(&self) -> &IndexSet<TypeKey> {
        &self.implemented
    }

    /// Capabilities needed from the target
    pub fn this_dependencies(&self) -> &IndexMap<TypeKey, Dependency> {
        &self.this_dependencies
    }

    /// Capabilities needed from the rest of the chain
    pub fn next_call_dependencies(&self) -> &IndexMap<TypeKey, Dependency> {
        &self.next_call_dependencies
    }

    /// Other mixins this one needs
    pub fn mixin_dependencies(&self) -> &IndexMap<TypeKey, Dependency> {
        &self.mixin_dependencies
    }

    /// Whether the target overrides members of this mixin, so instances need
    /// the derived shape
    pub fn needs_derived_type(&self) -> bool {
        self.needs_derived_type
    }

    /// Find a member by key or name
    pub fn find_member(&self, reference: &str) -> Result<usize, InvocationError> {
        select_member(&self.members, self.key(), reference)
    }
}

impl fmt::Debug for MixinDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MixinDefinition")
            .field("index", &self.index)
            .field("key", self.key())
            .field("members", &self.members)
            .field("this_dependencies", &self.this_dependencies)
            .field("next_call_dependencies", &self.next_call_dependencies)
            .field("mixin_dependencies", &self.mixin_dependencies)
            .field("needs_derived_type", &self.needs_derived_type)
            .finish()
    }
}

/// Target plus its sorted mixins, fully resolved
#[derive(Clone)]
pub struct TargetClassDefinition {
    pub(crate) context: ClassContext,
    pub(crate) class_type: Arc<ClassType>,
    pub(crate) members: Vec<MemberDefinition>,
    pub(crate) mixins: Vec<MixinDefinition>,
    pub(crate) implemented: IndexSet<TypeKey>,
    pub(crate) introductions: IndexMap<TypeKey, Introduction>,
    pub(crate) required_faces: IndexMap<TypeKey, RequiredTypeDefinition>,
    pub(crate) required_next_calls: IndexMap<TypeKey, RequiredTypeDefinition>,
    pub(crate) required_mixins: IndexMap<TypeKey, RequiredTypeDefinition>,
    pub(crate) complete_interfaces: IndexMap<TypeKey, Dependency>,
}

impl TargetClassDefinition {
    /// Configuration this definition was built from
    pub fn context(&self) -> &ClassContext {
        &self.context
    }

    /// Target type key
    pub fn key(&self) -> &TypeKey {
        &self.class_type.key
    }

    /// Catalog description of the target
    pub fn class_type(&self) -> &Arc<ClassType> {
        &self.class_type
    }

    /// Target member definitions
    pub fn members(&self) -> &[MemberDefinition] {
        &self.members
    }

    /// Mixin definitions in sorted order
    pub fn mixins(&self) -> &[MixinDefinition] {
        &self.mixins
    }

    /// Number of mixins
    pub fn mixin_count(&self) -> usize {
        self.mixins.len()
    }

    /// Mixin at a mixin index
    pub fn mixin(&self, index: usize) -> Option<&MixinDefinition> {
        self.mixins.get(index)
    }

    /// Mixin index of a mixin type
    pub fn mixin_index(&self, key: &TypeKey) -> Option<usize> {
        self.mixins.iter().position(|m| m.key() == key)
    }

    /// Capability sets implemented by the target, with components
    pub fn implemented(&self) -> &IndexSet<TypeKey> {
        &self.implemented
    }

    /// Capability sets introduced by mixins
    pub fn introductions(&self) -> &IndexMap<TypeKey, Introduction> {
        &self.introductions
    }

    /// Face requirements of all mixins and complete interfaces
    pub fn required_faces(&self) -> &IndexMap<TypeKey, RequiredTypeDefinition> {
        &self.required_faces
    }

    /// Next-call requirements of all mixins
    pub fn required_next_calls(&self) -> &IndexMap<TypeKey, RequiredTypeDefinition> {
        &self.required_next_calls
    }

    /// Mixin-to-mixin requirements
    pub fn required_mixins(&self) -> &IndexMap<TypeKey, RequiredTypeDefinition> {
        &self.required_mixins
    }

    /// Resolved complete interfaces
    pub fn complete_interfaces(&self) -> &IndexMap<TypeKey, Dependency> {
        &self.complete_interfaces
    }

    /// Members of a definition
    pub fn members_of(&self, owner: DefinitionRef) -> &[MemberDefinition] {
        match owner {
            DefinitionRef::Target => &self.members,
            DefinitionRef::Mixin(index) => self
                .mixins
                .get(index)
                .map(|m| m.members.as_slice())
                .unwrap_or(&[]),
        }
    }

    /// Member definition behind a reference
    pub fn member(&self, member: MemberRef) -> Option<&MemberDefinition> {
        self.members_of(member.owner).get(member.index)
    }

    pub(crate) fn member_mut(&mut self, member: MemberRef) -> Option<&mut MemberDefinition> {
        match member.owner {
            DefinitionRef::Target => self.members.get_mut(member.index),
            DefinitionRef::Mixin(index) => self
                .mixins
                .get_mut(index)
                .and_then(|m| m.members.get_mut(member.index)),
        }
    }

    /// Type key of a definition
    pub fn owner_key(&self, owner: DefinitionRef) -> &TypeKey {
        match owner {
            DefinitionRef::Target => self.key(),
            DefinitionRef::Mixin(index) => self.mixins.get(index).map(|m| m.key()).unwrap_or(self.key()),
        }
    }

    /// `Owner::signature` description used in diagnostics
    pub fn describe(&self, member: MemberRef) -> String {
        match self.member(member) {
            Some(definition) => format!("{}::{}", self.owner_key(member.owner), definition.signature),
            None => format!("{}::#{}", self.owner_key(member.owner), member.index),
        }
    }

    /// Find a target member by key or name
    pub fn find_target_member(&self, reference: &str) -> Result<usize, InvocationError> {
        select_member(&self.members, self.key(), reference)
    }

    /// Whether the composed object implements a capability set
    pub fn implements(&self, capability: &TypeKey) -> bool {
        self.implemented.contains(capability)
            || self.complete_interfaces.contains_key(capability)
            || self.introductions.values().any(|introduction| {
                self.mixins
                    .get(introduction.mixin)
                    .map(|m| m.implemented.contains(capability))
                    .unwrap_or(false)
            })
    }
}

impl fmt::Debug for TargetClassDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetClassDefinition")
            .field("key", self.key())
            .field("members", &self.members)
            .field("mixins", &self.mixins)
            .field("introductions", &self.introductions)
            .field("required_faces", &self.required_faces.keys().collect::<Vec<_>>())
            .field("required_next_calls", &self.required_next_calls.keys().collect::<Vec<_>>())
            .field("required_mixins", &self.required_mixins.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Select one member by key or name; exact name or key matches win over
/// simple-name matches
pub(crate) fn select_member(
    members: &[MemberDefinition],
    owner: &TypeKey,
    reference: &str,
) -> Result<usize, InvocationError> {
    let matches: Vec<usize> = members
        .iter()
        .enumerate()
        .filter(|(_, m)| m.signature.is_selected_by(reference))
        .map(|(index, _)| index)
        .collect();
    match matches.as_slice() {
        [] => Err(InvocationError::UnknownMember {
            owner: owner.to_string(),
            member: reference.to_string(),
        }),
        [only] => Ok(*only),
        several => {
            let exact: Vec<usize> = several
                .iter()
                .copied()
                .filter(|&i| members[i].signature.name == reference || members[i].signature.key() == reference)
                .collect();
            match exact.as_slice() {
                [only] => Ok(*only),
                _ => Err(InvocationError::AmbiguousMember {
                    owner: owner.to_string(),
                    member: reference.to_string(),
                    candidates: several.iter().map(|&i| members[i].signature.key()).collect(),
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(signature: MemberSignature) -> MemberDefinition {
        MemberDefinition {
            signature,
            visibility: Visibility::Public,
            declaring: DefinitionRef::Target,
            override_decl: None,
            base: None,
            overrides: Vec::new(),
            implementation: None,
        }
    }

    /// Test member selection by name, key and qualification
    #[test]
    fn test_select_member() {
        let members = vec![
            member(MemberSignature::method("Total")),
            member(MemberSignature::method("Total").param("Currency")),
            member(MemberSignature::method("IAudit.Log")),
        ];
        let owner = TypeKey::new("Order");

        assert_eq!(select_member(&members, &owner, "Total()").unwrap(), 0);
        assert_eq!(select_member(&members, &owner, "Total(Currency)").unwrap(), 1);
        assert_eq!(select_member(&members, &owner, "Log").unwrap(), 2);
        assert_eq!(select_member(&members, &owner, "IAudit.Log").unwrap(), 2);

        let err = select_member(&members, &owner, "Total").unwrap_err();
        assert!(matches!(err, InvocationError::AmbiguousMember { ref candidates, .. } if candidates.len() == 2));

        let err = select_member(&members, &owner, "Missing").unwrap_err();
        assert!(matches!(err, InvocationError::UnknownMember { .. }));
    }

    /// Test aggregator classification is derived from members and components
    #[test]
    fn test_required_type_flags() {
        let aggregator = RequiredTypeDefinition {
            kind: RequirementKind::Face,
            key: TypeKey::new("IBoth"),
            own_members: Vec::new(),
            members: vec![MemberSignature::method("Left")],
            components: vec![TypeKey::new("ILeft")],
            structural: false,
            requiring_dependencies: Vec::new(),
        };
        assert!(aggregator.is_aggregator_interface());
        assert!(!aggregator.is_empty_interface());

        let empty = RequiredTypeDefinition {
            components: Vec::new(),
            members: Vec::new(),
            ..aggregator.clone()
        };
        assert!(empty.is_empty_interface());
        assert!(!empty.is_aggregator_interface());
    }

    /// Test aggregated dependencies resolve members through their parts
    #[test]
    fn test_dependency_member_resolution() {
        let mut part = Dependency::new(RequirementKind::Face, DefinitionRef::Mixin(0), TypeKey::new("ILeft"));
        part.implementer = Some(Implementer::Target);
        part.resolved_members
            .insert(MemberSignature::method("Left"), MemberRef::target(3));

        let mut aggregate = Dependency::new(RequirementKind::Face, DefinitionRef::Mixin(0), TypeKey::new("IBoth"));
        aggregate.aggregated.push(part);

        assert!(aggregate.is_aggregate());
        assert_eq!(aggregate.resolve_member("Left"), Some(MemberRef::target(3)));
        assert_eq!(aggregate.resolve_member("Right"), None);
        assert_eq!(aggregate.all_resolved_members().len(), 1);
    }
}
