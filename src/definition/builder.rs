// Copyright 2025 Cowboy AI, LLC.

//! Builds the unresolved definition graph from a context and its mixin order

use indexmap::IndexMap;
use tracing::debug;

use super::{
    DefinitionRef, Introduction, MemberDefinition, MixinDefinition, TargetClassDefinition,
};
use crate::catalog::{MemberDecl, TypeCatalog};
use crate::context::ClassContext;
use crate::errors::{CompositionError, CompositionResult};
use crate::sorter::MixinOrder;

/// Turns catalog types into definitions in sorted order
pub struct DefinitionBuilder<'a> {
    catalog: &'a TypeCatalog,
}

impl<'a> DefinitionBuilder<'a> {
    /// Create a builder
    pub fn new(catalog: &'a TypeCatalog) -> Self {
        Self { catalog }
    }

    /// Build the definition of a context
    ///
    /// Override edges and requirement resolutions are left empty; the
    /// override resolver and requirement analyzer fill them in.
    ///
    /// # Errors
    ///
    /// Returns `UnknownType` for missing types, `DuplicateIntroduction` when
    /// two mixins introduce the same capability set and
    /// `UnfulfilledRequirement` when a mixin introduces a set it does not
    /// implement completely
    pub fn build(
        &self,
        context: &ClassContext,
        order: &MixinOrder,
    ) -> CompositionResult<TargetClassDefinition> {
        let class_type = self.catalog.class(context.target())?.clone();
        let implemented = self.catalog.capability_closure(&class_type.implements)?;
        let members = member_definitions(&class_type.members, DefinitionRef::Target);

        let mut mixins = Vec::with_capacity(order.len());
        for (index, key) in order.mixins().iter().enumerate() {
            let mixin_type = self.catalog.mixin(key)?.clone();
            let mixin_context = context
                .mixin(key)
                .cloned()
                .ok_or_else(|| CompositionError::unknown("mixin", key))?;
            mixins.push(MixinDefinition {
                index,
                members: member_definitions(&mixin_type.members, DefinitionRef::Mixin(index)),
                implemented: self.catalog.capability_closure(&mixin_type.implements)?,
                mixin_type,
                context: mixin_context,
                this_dependencies: IndexMap::new(),
                next_call_dependencies: IndexMap::new(),
                mixin_dependencies: IndexMap::new(),
                needs_derived_type: false,
            });
        }

        let mut introductions: IndexMap<_, Introduction> = IndexMap::new();
        for mixin in &mixins {
            for capability in &mixin.mixin_type.implements {
                if implemented.contains(capability) {
                    continue;
                }
                if let Some(existing) = introductions.get(capability) {
                    return Err(CompositionError::DuplicateIntroduction {
                        target: context.target().to_string(),
                        interface: capability.to_string(),
                        mixins: vec![
                            mixins[existing.mixin].key().to_string(),
                            mixin.key().to_string(),
                        ],
                    });
                }

                let mut introduced = IndexMap::new();
                for signature in self.catalog.capability_members(capability)? {
                    let found = mixin.members.iter().position(|m| {
                        m.visibility.is_accessible() && m.signature.matches(&signature)
                    });
                    match found {
                        Some(position) => {
                            introduced.insert(signature, position);
                        }
                        None => {
                            return Err(CompositionError::UnfulfilledRequirement {
                                target: context.target().to_string(),
                                dependents: vec![mixin.key().to_string()],
                                requirement: capability.to_string(),
                                member: Some(signature.to_string()),
                            });
                        }
                    }
                }
                introductions.insert(
                    capability.clone(),
                    Introduction {
                        mixin: mixin.index,
                        members: introduced,
                    },
                );
            }
        }

        debug!(
            target_type = %context.target(),
            mixins = mixins.len(),
            introductions = introductions.len(),
            "Built target class definition"
        );

        Ok(TargetClassDefinition {
            context: context.clone(),
            class_type,
            members,
            mixins,
            implemented,
            introductions,
            required_faces: IndexMap::new(),
            required_next_calls: IndexMap::new(),
            required_mixins: IndexMap::new(),
            complete_interfaces: IndexMap::new(),
        })
    }
}

fn member_definitions(declarations: &[MemberDecl], declaring: DefinitionRef) -> Vec<MemberDefinition> {
    declarations
        .iter()
        .map(|decl| MemberDefinition {
            signature: decl.signature.clone(),
            visibility: decl.visibility,
            declaring,
            override_decl: decl.override_decl.clone(),
            base: None,
            overrides: Vec::new(),
            implementation: decl.implementation.clone(),
        })
        .collect()
}
