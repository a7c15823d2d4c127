// Copyright 2025 Cowboy AI, LLC.

//! Composition synthesis: turns a resolved definition into a dispatch plan
//!
//! For every target member with overrides the plan holds a dispatch table
//! indexed by call depth. Depth `d` means "the first override living at mixin
//! index `d` or later"; depth `N` (the mixin count) always means the target's
//! own implementation. A base call from the override at mixin index `i`
//! continues at depth `i + 1`, so each call walks strictly down the chain.
//!
//! ```text
//! overrides at [2, 5, 7], N = 8
//! depth:     0 1 2 3 4 5 6 7 8
//! dispatch:  2 2 2 5 5 5 7 7 T
//! ```

use indexmap::IndexMap;
use std::sync::Arc;
use tracing::info;

use crate::catalog::{ConstructionPath, HookParameter};
use crate::context::ClassContext;
use crate::definition::{DefinitionRef, MemberRef, TargetClassDefinition};
use crate::errors::{CompositionError, CompositionResult, InvalidInstanceReason};
use crate::identifiers::{CompositionId, TypeKey};
use crate::member::MemberSignature;
use crate::runtime::{ComposedObject, InstanceInitializer, MixinInstance, MixinShape};

/// Where a call at one depth lands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// An override declared by a mixin
    Mixin {
        /// Mixin index of the override
        index: usize,
        /// Overriding member
        member: MemberRef,
        /// Depth a base call from this override continues at
        next_depth: usize,
    },
    /// The target's own implementation
    Target {
        /// Target member
        member: MemberRef,
    },
}

/// Override chain of one target member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideChain {
    base: MemberRef,
    overriders: Vec<MemberRef>,
    dispatch: Vec<Dispatch>,
}

impl OverrideChain {
    /// Build the depth table for a base member and its overriders, which
    /// must be sorted by mixin index
    pub fn build(base: MemberRef, overriders: Vec<MemberRef>, mixin_count: usize) -> Self {
        let mut dispatch = vec![Dispatch::Target { member: base }; mixin_count + 1];
        let mut current = Dispatch::Target { member: base };
        let mut pending = overriders.iter().rev().peekable();
        for depth in (0..mixin_count).rev() {
            while let Some(&&overrider) = pending.peek() {
                match overrider.owner {
                    DefinitionRef::Mixin(index) if index >= depth => {
                        current = Dispatch::Mixin {
                            index,
                            member: overrider,
                            next_depth: index + 1,
                        };
                        pending.next();
                    }
                    DefinitionRef::Mixin(_) => break,
                    DefinitionRef::Target => {
                        pending.next();
                    }
                }
            }
            dispatch[depth] = current;
        }
        Self {
            base,
            overriders,
            dispatch,
        }
    }

    /// Overridden target member
    pub fn base(&self) -> MemberRef {
        self.base
    }

    /// Overriding members in chain order
    pub fn overriders(&self) -> &[MemberRef] {
        &self.overriders
    }

    /// Dispatch target at a depth; depths past the table land on the target
    pub fn at(&self, depth: usize) -> Dispatch {
        self.dispatch
            .get(depth)
            .copied()
            .unwrap_or(Dispatch::Target { member: self.base })
    }

    /// Full table, indexed by depth
    pub fn table(&self) -> &[Dispatch] {
        &self.dispatch
    }
}

/// How an interface or requirement member is entered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPoint {
    /// Through the override chain of a target member
    Chain {
        /// Target member index
        member: usize,
    },
    /// Straight into a member body
    Direct {
        /// Member entered
        member: MemberRef,
    },
    /// A mixin member the target overrides; the target member runs first
    /// and its base call reaches the mixin member
    TargetOverride {
        /// Overriding target member index
        overrider: usize,
        /// Overridden mixin member
        base: MemberRef,
    },
}

/// Role bound to an initialization hook parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitRole {
    /// The composed object itself
    Target,
    /// The proxy one level below the mixin
    NextProxy,
}

/// Precomputed dispatch structures of one composition
#[derive(Debug, Clone)]
pub struct CompositionPlan {
    mixin_count: usize,
    chains: IndexMap<usize, OverrideChain>,
    mixin_overrides: IndexMap<MemberRef, usize>,
    interfaces: IndexMap<TypeKey, IndexMap<MemberSignature, EntryPoint>>,
    init_roles: Vec<Vec<InitRole>>,
}

impl CompositionPlan {
    /// Number of mixins; depths run from 0 to this value
    pub fn mixin_count(&self) -> usize {
        self.mixin_count
    }

    /// Override chain of a target member
    pub fn chain(&self, target_member: usize) -> Option<&OverrideChain> {
        self.chains.get(&target_member)
    }

    /// Every override chain, keyed by target member index
    pub fn chains(&self) -> &IndexMap<usize, OverrideChain> {
        &self.chains
    }

    /// Dispatch a call to a target member at a depth
    pub fn dispatch(&self, target_member: usize, depth: usize) -> Dispatch {
        match self.chains.get(&target_member) {
            Some(chain) => chain.at(depth),
            None => Dispatch::Target {
                member: MemberRef::target(target_member),
            },
        }
    }

    /// Target member overriding a mixin member
    pub fn mixin_override(&self, member: MemberRef) -> Option<usize> {
        self.mixin_overrides.get(&member).copied()
    }

    /// Entry point for a resolved member
    pub fn entry_point(&self, member: MemberRef) -> EntryPoint {
        match member.owner {
            DefinitionRef::Target if self.chains.contains_key(&member.index) => EntryPoint::Chain {
                member: member.index,
            },
            DefinitionRef::Mixin(_) => match self.mixin_override(member) {
                Some(overrider) => EntryPoint::TargetOverride {
                    overrider,
                    base: member,
                },
                None => EntryPoint::Direct { member },
            },
            DefinitionRef::Target => EntryPoint::Direct { member },
        }
    }

    /// Entry points of a complete or introduced interface
    pub fn interface(&self, capability: &TypeKey) -> Option<&IndexMap<MemberSignature, EntryPoint>> {
        self.interfaces.get(capability)
    }

    /// Interfaces exposed through entry points
    pub fn interfaces(&self) -> impl Iterator<Item = &TypeKey> {
        self.interfaces.keys()
    }

    /// Roles of a mixin's initialization hook parameters
    pub fn init_roles(&self, mixin: usize) -> &[InitRole] {
        self.init_roles.get(mixin).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// A synthesized composition: the shared, immutable runtime type of every
/// object created for one class context
#[derive(Debug)]
pub struct Composition {
    id: CompositionId,
    context: ClassContext,
    definition: Arc<TargetClassDefinition>,
    plan: CompositionPlan,
}

impl Composition {
    /// Composition identity
    pub fn id(&self) -> CompositionId {
        self.id
    }

    /// Class context this composition was built for
    pub fn context(&self) -> &ClassContext {
        &self.context
    }

    /// Target type
    pub fn target(&self) -> &TypeKey {
        self.definition.key()
    }

    /// Resolved definition
    pub fn definition(&self) -> &Arc<TargetClassDefinition> {
        &self.definition
    }

    /// Dispatch plan
    pub fn plan(&self) -> &CompositionPlan {
        &self.plan
    }

    /// Create an instance of a configured mixin in the shape this
    /// composition requires, using the mixin's default construction path
    ///
    /// # Errors
    ///
    /// Returns `InvalidMixinInstance` for unconfigured mixins and
    /// `MissingDefaultConstructor` when no accessible construction path
    /// exists
    pub fn new_mixin_instance(&self, mixin: &TypeKey) -> CompositionResult<MixinInstance> {
        let index = self.definition.mixin_index(mixin).ok_or_else(|| {
            CompositionError::InvalidMixinInstance {
                target: self.target().to_string(),
                mixin: mixin.to_string(),
                reason: InvalidInstanceReason::NotConfigured,
            }
        })?;
        self.instantiate_mixin(index)
    }

    pub(crate) fn instantiate_mixin(&self, index: usize) -> CompositionResult<MixinInstance> {
        let Some(mixin) = self.definition.mixin(index) else {
            return Err(CompositionError::unknown("mixin", format!("#{index}")));
        };
        let mixin_type = mixin.mixin_type();
        let missing = || CompositionError::MissingDefaultConstructor {
            target: self.target().to_string(),
            mixin: mixin.key().to_string(),
        };
        let fields = match &mixin_type.construction {
            ConstructionPath::Value => mixin_type.fields.clone(),
            ConstructionPath::Constructor { visibility, factory } => {
                if !visibility.is_accessible() {
                    return Err(missing());
                }
                match factory {
                    Some(factory) => factory(),
                    None => mixin_type.fields.clone(),
                }
            }
            ConstructionPath::Unavailable => return Err(missing()),
        };
        let shape = if mixin.needs_derived_type() {
            MixinShape::Derived {
                target: self.target().clone(),
            }
        } else {
            MixinShape::Plain
        };
        Ok(MixinInstance::from_parts(mixin.key().clone(), shape, fields))
    }

    /// Create a new object, filling every mixin slot from `supplied` or by
    /// default construction
    ///
    /// # Errors
    ///
    /// Returns instance errors for rejected or unconstructible mixins and
    /// `Initialization` when a hook fails
    pub fn create_instance(
        self: &Arc<Self>,
        supplied: Vec<MixinInstance>,
    ) -> CompositionResult<ComposedObject> {
        InstanceInitializer::new(Arc::clone(self)).initialize(supplied)
    }
}

/// Builds [`Composition`]s from resolved definitions
pub struct CompositionSynthesizer;

impl CompositionSynthesizer {
    /// Synthesize the runtime plan of a definition
    ///
    /// # Errors
    ///
    /// Returns `InvalidInitializationParameter` when a hook parameter has no
    /// known role
    pub fn synthesize(definition: TargetClassDefinition) -> CompositionResult<Composition> {
        let mixin_count = definition.mixin_count();

        let mut chains = IndexMap::new();
        for (index, member) in definition.members().iter().enumerate() {
            let overriders: Vec<MemberRef> = member
                .overrides()
                .iter()
                .copied()
                .filter(|o| matches!(o.owner, DefinitionRef::Mixin(_)))
                .collect();
            if !overriders.is_empty() {
                chains.insert(
                    index,
                    OverrideChain::build(MemberRef::target(index), overriders, mixin_count),
                );
            }
        }

        let mut mixin_overrides = IndexMap::new();
        for (index, member) in definition.members().iter().enumerate() {
            if let Some(base) = member.base() {
                if matches!(base.owner, DefinitionRef::Mixin(_)) {
                    mixin_overrides.insert(base, index);
                }
            }
        }

        let mut init_roles = Vec::with_capacity(mixin_count);
        for mixin in definition.mixins() {
            let mut roles = Vec::new();
            if let Some(hook) = &mixin.mixin_type().initializer {
                for parameter in &hook.parameters {
                    match parameter {
                        HookParameter::Target => roles.push(InitRole::Target),
                        HookParameter::Next => roles.push(InitRole::NextProxy),
                        HookParameter::Other { name } => {
                            return Err(CompositionError::InvalidInitializationParameter {
                                mixin: mixin.key().to_string(),
                                parameter: name.clone(),
                            })
                        }
                    }
                }
            }
            init_roles.push(roles);
        }

        let mut plan = CompositionPlan {
            mixin_count,
            chains,
            mixin_overrides,
            interfaces: IndexMap::new(),
            init_roles,
        };

        let mut interfaces = IndexMap::new();
        for (capability, dependency) in definition.complete_interfaces() {
            let entries: IndexMap<MemberSignature, EntryPoint> = dependency
                .all_resolved_members()
                .into_iter()
                .map(|(signature, member)| (signature.clone(), plan.entry_point(member)))
                .collect();
            interfaces.insert(capability.clone(), entries);
        }
        for (capability, introduction) in definition.introductions() {
            let entries: IndexMap<MemberSignature, EntryPoint> = introduction
                .members()
                .iter()
                .map(|(signature, &position)| {
                    (
                        signature.clone(),
                        plan.entry_point(MemberRef::mixin(introduction.mixin(), position)),
                    )
                })
                .collect();
            interfaces.entry(capability.clone()).or_insert(entries);
        }
        plan.interfaces = interfaces;

        info!(
            target_type = %definition.key(),
            mixins = mixin_count,
            chains = plan.chains.len(),
            interfaces = plan.interfaces.len(),
            "Synthesized composition"
        );

        Ok(Composition {
            id: CompositionId::new(),
            context: definition.context().clone(),
            definition: Arc::new(definition),
            plan,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn mixin_target(chain: &OverrideChain, depth: usize) -> Option<usize> {
        match chain.at(depth) {
            Dispatch::Mixin { index, .. } => Some(index),
            Dispatch::Target { .. } => None,
        }
    }

    /// Test the depth table of a chain with gaps
    ///
    /// ```mermaid
    /// graph LR
    ///     D0[depth 0..2] --> M2[mixin 2]
    ///     D3[depth 3..5] --> M5[mixin 5]
    ///     D6[depth 6..7] --> M7[mixin 7]
    ///     D8[depth 8] --> T[target]
    /// ```
    #[test]
    fn test_chain_with_gaps() {
        let base = MemberRef::target(0);
        let chain = OverrideChain::build(
            base,
            vec![MemberRef::mixin(2, 0), MemberRef::mixin(5, 1), MemberRef::mixin(7, 0)],
            8,
        );

        let resolved: Vec<Option<usize>> = (0..=8).map(|d| mixin_target(&chain, d)).collect();
        assert_eq!(
            resolved,
            vec![Some(2), Some(2), Some(2), Some(5), Some(5), Some(5), Some(7), Some(7), None]
        );
        assert_eq!(
            chain.at(0),
            Dispatch::Mixin {
                index: 2,
                member: MemberRef::mixin(2, 0),
                next_depth: 3
            }
        );
        assert_eq!(chain.at(8), Dispatch::Target { member: base });
        assert_eq!(chain.at(42), Dispatch::Target { member: base });
        assert_eq!(chain.table().len(), 9);
    }

    /// Test a single override at the last position
    #[test]
    fn test_chain_single_last() {
        let chain = OverrideChain::build(MemberRef::target(1), vec![MemberRef::mixin(2, 0)], 3);
        let resolved: Vec<Option<usize>> = (0..=3).map(|d| mixin_target(&chain, d)).collect();
        assert_eq!(resolved, vec![Some(2), Some(2), Some(2), None]);
    }

    /// Test entry points route through chains and target overrides
    #[test]
    fn test_entry_points() {
        let mut chains = IndexMap::new();
        chains.insert(0, OverrideChain::build(MemberRef::target(0), vec![MemberRef::mixin(0, 0)], 1));
        let mut mixin_overrides = IndexMap::new();
        mixin_overrides.insert(MemberRef::mixin(0, 1), 1);
        let plan = CompositionPlan {
            mixin_count: 1,
            chains,
            mixin_overrides,
            interfaces: IndexMap::new(),
            init_roles: vec![Vec::new()],
        };

        assert_eq!(plan.entry_point(MemberRef::target(0)), EntryPoint::Chain { member: 0 });
        assert_eq!(
            plan.entry_point(MemberRef::target(2)),
            EntryPoint::Direct { member: MemberRef::target(2) }
        );
        assert_eq!(
            plan.entry_point(MemberRef::mixin(0, 1)),
            EntryPoint::TargetOverride { overrider: 1, base: MemberRef::mixin(0, 1) }
        );
        assert_eq!(plan.dispatch(2, 0), Dispatch::Target { member: MemberRef::target(2) });
        assert!(plan.init_roles(5).is_empty());
    }
}
