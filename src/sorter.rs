// Copyright 2025 Cowboy AI, LLC.

//! Dependency sorter: the total order of mixins on one target
//!
//! Edges come from three places:
//!
//! - explicit dependencies recorded in the class context
//! - `depends_on` and mixin requirements declared by the mixin type
//! - next-call requirements: a mixin that calls "next" on a capability set is
//!   placed before every other mixin implementing that set, so the call can
//!   reach it through the chain
//!
//! The order is a Kahn topological sort whose ready set is keyed by
//! declaration index, so unrelated mixins keep their declaration order.

use std::collections::BTreeSet;
use tracing::{debug, warn};

use crate::catalog::{RequirementSpec, TypeCatalog};
use crate::context::ClassContext;
use crate::errors::{CompositionError, CompositionResult};
use crate::identifiers::TypeKey;

/// Sorted mixins of one class context
///
/// Besides the order itself this records, for every position, the positions
/// that must come before it through some chain of edges. Two mixins without
/// such a relation were placed by declaration order alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MixinOrder {
    target: TypeKey,
    mixins: Vec<TypeKey>,
    predecessors: Vec<BTreeSet<usize>>,
}

impl MixinOrder {
    /// Target of the sorted context
    pub fn target(&self) -> &TypeKey {
        &self.target
    }

    /// Mixin types by mixin index
    pub fn mixins(&self) -> &[TypeKey] {
        &self.mixins
    }

    /// Number of mixins
    pub fn len(&self) -> usize {
        self.mixins.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.mixins.is_empty()
    }

    /// Mixin index of a mixin type
    pub fn index_of(&self, mixin: &TypeKey) -> Option<usize> {
        self.mixins.iter().position(|m| m == mixin)
    }

    /// Positions that transitively precede `index`
    pub fn predecessors(&self, index: usize) -> Option<&BTreeSet<usize>> {
        self.predecessors.get(index)
    }

    /// Whether two positions are related by dependency edges, in either
    /// direction
    pub fn is_ordered(&self, a: usize, b: usize) -> bool {
        let precedes = |x: usize, y: usize| {
            self.predecessors
                .get(y)
                .map(|p| p.contains(&x))
                .unwrap_or(false)
        };
        precedes(a, b) || precedes(b, a)
    }
}

/// Computes [`MixinOrder`]s against a catalog
pub struct DependencySorter<'a> {
    catalog: &'a TypeCatalog,
}

impl<'a> DependencySorter<'a> {
    /// Create a sorter
    pub fn new(catalog: &'a TypeCatalog) -> Self {
        Self { catalog }
    }

    /// Sort the mixins of a context
    ///
    /// # Errors
    ///
    /// Returns `UnknownType` for types missing from the catalog and
    /// `CyclicMixinDependency` when no total order exists
    pub fn sort(&self, context: &ClassContext) -> CompositionResult<MixinOrder> {
        context.validate()?;
        let edges = self.edges(context)?;
        let count = edges.len();

        let mut remaining: Vec<usize> = edges.iter().map(BTreeSet::len).collect();
        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); count];
        for (node, preds) in edges.iter().enumerate() {
            for &pred in preds {
                successors[pred].push(node);
            }
        }

        let mut ready: BTreeSet<usize> = (0..count).filter(|&n| remaining[n] == 0).collect();
        let mut sorted = Vec::with_capacity(count);
        while let Some(next) = ready.pop_first() {
            sorted.push(next);
            for &successor in &successors[next] {
                remaining[successor] -= 1;
                if remaining[successor] == 0 {
                    ready.insert(successor);
                }
            }
        }

        if sorted.len() != count {
            let placed: BTreeSet<usize> = sorted.iter().copied().collect();
            let blocked: Vec<String> = (0..count)
                .filter(|n| !placed.contains(n))
                .map(|n| context.mixins()[n].mixin_type.to_string())
                .collect();
            warn!(target_type = %context.target(), blocked = ?blocked, "Mixin dependency cycle");
            return Err(CompositionError::CyclicMixinDependency {
                target: context.target().to_string(),
                mixins: blocked,
            });
        }

        // declared index -> sorted index
        let mut position = vec![0; count];
        for (sorted_index, &declared) in sorted.iter().enumerate() {
            position[declared] = sorted_index;
        }

        let mut predecessors: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); count];
        for (sorted_index, &declared) in sorted.iter().enumerate() {
            let mut closure = BTreeSet::new();
            for &pred in &edges[declared] {
                let pred_position = position[pred];
                closure.insert(pred_position);
                closure.extend(predecessors[pred_position].iter().copied());
            }
            predecessors[sorted_index] = closure;
        }

        let mixins: Vec<TypeKey> = sorted
            .iter()
            .map(|&declared| context.mixins()[declared].mixin_type.clone())
            .collect();
        debug!(target_type = %context.target(), order = ?mixins, "Sorted mixins");

        Ok(MixinOrder {
            target: context.target().clone(),
            mixins,
            predecessors,
        })
    }

    /// Direct predecessors of every mixin, by declaration index
    fn edges(&self, context: &ClassContext) -> CompositionResult<Vec<BTreeSet<usize>>> {
        let class = self.catalog.class(context.target())?;
        let target_capabilities = self.catalog.capability_closure(&class.implements)?;

        let mut mixin_types = Vec::with_capacity(context.mixins().len());
        for entry in context.mixins() {
            mixin_types.push(self.catalog.mixin(&entry.mixin_type)?);
        }

        let mut edges = vec![BTreeSet::new(); mixin_types.len()];
        for (index, entry) in context.mixins().iter().enumerate() {
            let mixin = mixin_types[index];
            let ordering = entry
                .explicit_dependencies
                .iter()
                .chain(&mixin.depends_on)
                .chain(&mixin.mixin_requirements);
            for dependency in ordering {
                if let Some(pred) = context.declaration_index(dependency) {
                    if pred != index {
                        edges[index].insert(pred);
                    }
                }
            }

            for requirement in &mixin.next_requirements {
                let capabilities = match requirement {
                    RequirementSpec::Capability(key) => vec![key.clone()],
                    RequirementSpec::Class(key) => {
                        let required = self.catalog.class(key)?;
                        self.catalog
                            .capability_closure(&required.implements)?
                            .into_iter()
                            .collect()
                    }
                };
                for capability in capabilities {
                    if target_capabilities.contains(&capability) {
                        continue;
                    }
                    for (other, other_type) in mixin_types.iter().enumerate() {
                        if other != index
                            && self.catalog.implements(&other_type.implements, &capability)?
                        {
                            edges[other].insert(index);
                        }
                    }
                }
            }
        }
        Ok(edges)
    }
}
