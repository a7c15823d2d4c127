// Copyright 2025 Cowboy AI, LLC.

//! Override resolution
//!
//! Links every member declaring an override to exactly one base member and
//! records the reverse edge on the base. Mixin members overriding target
//! members are collected in ascending mixin index, so a base's override list
//! is already in chain order.

use tracing::{debug, warn};

use crate::catalog::OverrideDecl;
use crate::definition::{DefinitionRef, MemberRef, TargetClassDefinition};
use crate::errors::{CompositionError, CompositionResult};
use crate::sorter::MixinOrder;

/// Resolves override declarations of one definition
pub struct OverrideResolver<'a> {
    order: &'a MixinOrder,
}

impl<'a> OverrideResolver<'a> {
    /// Create a resolver using the order the definition was built from
    pub fn new(order: &'a MixinOrder) -> Self {
        Self { order }
    }

    /// Resolve every override declaration and set derived-type flags
    ///
    /// # Errors
    ///
    /// Returns `UnresolvedOverride` when nothing matches, `AmbiguousOverride`
    /// when several members match and `AmbiguousOverrideOrdering` when mixins
    /// overriding the same member are unrelated by dependencies
    pub fn resolve(&self, definition: &mut TargetClassDefinition) -> CompositionResult<()> {
        let mut links: Vec<(MemberRef, MemberRef)> = Vec::new();

        let target_pool: Vec<MemberRef> = (0..definition.members().len())
            .map(MemberRef::target)
            .collect();
        for mixin in definition.mixins() {
            for (position, member) in mixin.members().iter().enumerate() {
                if member.override_decl() == Some(&OverrideDecl::Target) {
                    let overrider = MemberRef::mixin(mixin.index(), position);
                    let base = self.match_base(definition, overrider, &target_pool)?;
                    links.push((overrider, base));
                }
            }
        }

        for (position, member) in definition.members().iter().enumerate() {
            if let Some(OverrideDecl::Mixin { mixin: filter }) = member.override_decl() {
                let pool: Vec<MemberRef> = definition
                    .mixins()
                    .iter()
                    .filter(|m| filter.as_ref().map(|f| f == m.key()).unwrap_or(true))
                    .flat_map(|m| (0..m.members().len()).map(move |i| MemberRef::mixin(m.index(), i)))
                    .collect();
                let overrider = MemberRef::target(position);
                let base = self.match_base(definition, overrider, &pool)?;
                links.push((overrider, base));
            }
        }

        for &(overrider, base) in &links {
            if let Some(member) = definition.member_mut(overrider) {
                member.base = Some(base);
            }
            if let Some(member) = definition.member_mut(base) {
                member.overrides.push(overrider);
            }
        }

        for mixin in &mut definition.mixins {
            mixin.needs_derived_type = mixin.members.iter().any(|m| m.is_overridden());
        }

        self.check_ordering(definition)?;

        debug!(
            target_type = %definition.key(),
            overrides = links.len(),
            "Resolved overrides"
        );
        Ok(())
    }

    fn match_base(
        &self,
        definition: &TargetClassDefinition,
        overrider: MemberRef,
        pool: &[MemberRef],
    ) -> CompositionResult<MemberRef> {
        let Some(overriding) = definition.member(overrider) else {
            return Err(CompositionError::unknown("member", definition.describe(overrider)));
        };
        let signature = overriding.signature();

        let matches: Vec<MemberRef> = pool
            .iter()
            .copied()
            .filter(|&candidate| {
                definition
                    .member(candidate)
                    .map(|m| m.visibility().is_accessible() && m.signature().matches(signature))
                    .unwrap_or(false)
            })
            .collect();

        match matches.as_slice() {
            [only] => Ok(*only),
            [] => {
                let candidates = pool
                    .iter()
                    .copied()
                    .filter(|&candidate| {
                        definition
                            .member(candidate)
                            .map(|m| m.signature().simple_name() == signature.simple_name())
                            .unwrap_or(false)
                    })
                    .map(|candidate| definition.describe(candidate))
                    .collect();
                warn!(overrider = %definition.describe(overrider), "Unresolved override");
                Err(CompositionError::UnresolvedOverride {
                    target: definition.key().to_string(),
                    declaring: definition.owner_key(overrider.owner).to_string(),
                    overrider: signature.to_string(),
                    candidates,
                })
            }
            several => Err(CompositionError::AmbiguousOverride {
                target: definition.key().to_string(),
                declaring: definition.owner_key(overrider.owner).to_string(),
                overrider: signature.to_string(),
                candidates: several.iter().map(|&m| definition.describe(m)).collect(),
            }),
        }
    }

    /// Mixins overriding one target member must be related by dependencies
    /// unless all of them accept declaration order
    fn check_ordering(&self, definition: &TargetClassDefinition) -> CompositionResult<()> {
        for member in definition.members() {
            let overriders: Vec<usize> = member
                .overrides()
                .iter()
                .filter_map(|o| match o.owner {
                    DefinitionRef::Mixin(index) => Some(index),
                    DefinitionRef::Target => None,
                })
                .collect();
            if overriders.len() < 2 {
                continue;
            }

            let accepts = |index: usize| {
                definition
                    .mixin(index)
                    .map(|m| m.mixin_type().accepts_declaration_order)
                    .unwrap_or(false)
            };
            let mut unordered = Vec::new();
            for (i, &a) in overriders.iter().enumerate() {
                for &b in &overriders[i + 1..] {
                    if !self.order.is_ordered(a, b) && !(accepts(a) && accepts(b)) {
                        unordered.push(a);
                        unordered.push(b);
                    }
                }
            }
            if !unordered.is_empty() {
                unordered.sort_unstable();
                unordered.dedup();
                return Err(CompositionError::AmbiguousOverrideOrdering {
                    target: definition.key().to_string(),
                    member: member.signature().key(),
                    mixins: unordered
                        .into_iter()
                        .map(|index| definition.owner_key(DefinitionRef::Mixin(index)).to_string())
                        .collect(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ClassType, MemberDecl, MixinType, TypeCatalog};
    use crate::context::ClassContext;
    use crate::definition::DefinitionBuilder;
    use crate::member::MemberSignature;
    use crate::sorter::DependencySorter;
    use pretty_assertions::assert_eq;

    fn resolve(catalog: &TypeCatalog, context: &ClassContext) -> CompositionResult<TargetClassDefinition> {
        let order = DependencySorter::new(catalog).sort(context)?;
        let mut definition = DefinitionBuilder::new(catalog).build(context, &order)?;
        OverrideResolver::new(&order).resolve(&mut definition)?;
        Ok(definition)
    }

    fn order_class() -> ClassType {
        ClassType::new("Order")
            .member(MemberDecl::new(MemberSignature::method("Total").returning("Money")))
            .member(MemberDecl::method("Hidden").private())
    }

    /// Test mixin overrides attach to the target member in chain order
    ///
    /// ```mermaid
    /// graph LR
    ///     Total -->|overrides[0]| Discount
    ///     Total -->|overrides[1]| Tax
    /// ```
    #[test]
    fn test_mixin_overrides_target() {
        let mut catalog = TypeCatalog::new();
        catalog.register_class(order_class()).unwrap();
        catalog
            .register_mixin(
                MixinType::new("Discount")
                    .member(MemberDecl::new(MemberSignature::method("Total").returning("Money")).overriding_target()),
            )
            .unwrap();
        catalog
            .register_mixin(
                MixinType::new("Tax")
                    .depends_on("Discount")
                    .member(MemberDecl::new(MemberSignature::method("Total").returning("Money")).overriding_target()),
            )
            .unwrap();
        let context = ClassContext::builder("Order").mixin("Tax").mixin("Discount").build().unwrap();
        let definition = resolve(&catalog, &context).unwrap();

        let total = &definition.members()[0];
        assert_eq!(total.overrides(), &[MemberRef::mixin(0, 0), MemberRef::mixin(1, 0)]);
        assert_eq!(definition.mixins()[0].members()[0].base(), Some(MemberRef::target(0)));
        assert!(!definition.mixins()[0].needs_derived_type());
    }

    /// Test private members are never override candidates
    #[test]
    fn test_private_member_not_overridable() {
        let mut catalog = TypeCatalog::new();
        catalog.register_class(order_class()).unwrap();
        catalog
            .register_mixin(MixinType::new("Peek").member(MemberDecl::method("Hidden").overriding_target()))
            .unwrap();
        let context = ClassContext::builder("Order").mixin("Peek").build().unwrap();
        let err = resolve(&catalog, &context).unwrap_err();
        match err {
            CompositionError::UnresolvedOverride { candidates, .. } => {
                assert_eq!(candidates, vec!["Order::method Hidden()".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    /// Test target overriding a mixin member sets the derived flag
    #[test]
    fn test_target_overrides_mixin() {
        let mut catalog = TypeCatalog::new();
        catalog
            .register_class(ClassType::new("Order").member(MemberDecl::method("Describe").overriding_mixin()))
            .unwrap();
        catalog
            .register_mixin(MixinType::new("Audit").member(MemberDecl::method("Describe")))
            .unwrap();
        let context = ClassContext::builder("Order").mixin("Audit").build().unwrap();
        let definition = resolve(&catalog, &context).unwrap();

        assert!(definition.mixins()[0].needs_derived_type());
        assert_eq!(definition.members()[0].base(), Some(MemberRef::mixin(0, 0)));
    }

    /// Test target overrides matching two mixins are ambiguous without a filter
    #[test]
    fn test_ambiguous_target_override() {
        let mut catalog = TypeCatalog::new();
        catalog
            .register_class(ClassType::new("Order").member(MemberDecl::method("Describe").overriding_mixin()))
            .unwrap();
        catalog
            .register_class(ClassType::new("Invoice").member(MemberDecl::method("Describe").overriding_mixin_of("Audit")))
            .unwrap();
        catalog
            .register_mixin(MixinType::new("Audit").member(MemberDecl::method("Describe")))
            .unwrap();
        catalog
            .register_mixin(MixinType::new("Trace").member(MemberDecl::method("Describe")))
            .unwrap();

        let context = ClassContext::builder("Order").mixin("Audit").mixin("Trace").build().unwrap();
        let err = resolve(&catalog, &context).unwrap_err();
        assert!(matches!(err, CompositionError::AmbiguousOverride { ref candidates, .. } if candidates.len() == 2));

        let context = ClassContext::builder("Invoice").mixin("Audit").mixin("Trace").build().unwrap();
        let definition = resolve(&catalog, &context).unwrap();
        assert_eq!(definition.members()[0].base(), Some(MemberRef::mixin(0, 0)));
    }

    /// Test unrelated mixins overriding one member are rejected
    #[test]
    fn test_ambiguous_ordering() {
        let mut catalog = TypeCatalog::new();
        catalog.register_class(order_class()).unwrap();
        for name in ["Discount", "Tax"] {
            catalog
                .register_mixin(
                    MixinType::new(name)
                        .member(MemberDecl::new(MemberSignature::method("Total").returning("Money")).overriding_target()),
                )
                .unwrap();
        }
        let context = ClassContext::builder("Order").mixin("Tax").mixin("Discount").build().unwrap();
        let err = resolve(&catalog, &context).unwrap_err();
        assert_eq!(
            err,
            CompositionError::AmbiguousOverrideOrdering {
                target: "Order".to_string(),
                member: "Total()".to_string(),
                mixins: vec!["Tax".to_string(), "Discount".to_string()],
            }
        );
    }

    /// Test declaration order is accepted when both mixins opt in
    #[test]
    fn test_declaration_order_accepted() {
        let mut catalog = TypeCatalog::new();
        catalog.register_class(order_class()).unwrap();
        for name in ["Discount", "Tax"] {
            catalog
                .register_mixin(
                    MixinType::new(name)
                        .accepts_declaration_order()
                        .member(MemberDecl::new(MemberSignature::method("Total").returning("Money")).overriding_target()),
                )
                .unwrap();
        }
        let context = ClassContext::builder("Order").mixin("Tax").mixin("Discount").build().unwrap();
        let definition = resolve(&catalog, &context).unwrap();
        assert_eq!(definition.mixins()[0].key().as_str(), "Tax");
        assert_eq!(definition.members()[0].overrides().len(), 2);
    }
}
