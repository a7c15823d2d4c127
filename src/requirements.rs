// Copyright 2025 Cowboy AI, LLC.

//! Requirement analysis
//!
//! Every mixin states what it needs from its target (face requirements), from
//! the rest of the chain (next-call requirements) and from other mixins. The
//! analyzer turns each statement into a [`Dependency`] and resolves it to one
//! implementer, binding every required member to a concrete member.
//!
//! Candidates are searched in a fixed order: the target first, then mixins in
//! mixin index order. For next-call requirements only mixins after the
//! depender are candidates, since a base call can only travel down the chain.
//! Nominal implementers win over structural ones.

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, warn};

use crate::catalog::{RequirementSpec, TypeCatalog};
use crate::definition::{
    DefinitionRef, Dependency, Implementer, MemberDefinition, MemberRef, RequiredTypeDefinition,
    RequirementKind, TargetClassDefinition,
};
use crate::errors::{CompositionError, CompositionResult};
use crate::identifiers::TypeKey;
use crate::member::MemberSignature;

type RequiredTable = IndexMap<TypeKey, RequiredTypeDefinition>;
type DependencyTable = IndexMap<TypeKey, Dependency>;

/// A requirement that could not be satisfied
#[derive(Debug, Clone)]
struct Failure {
    kind: RequirementKind,
    key: TypeKey,
    depender: DefinitionRef,
    member: Option<MemberSignature>,
}

/// Aggregates being expanded and capabilities already reached under one
/// top-level requirement
#[derive(Debug, Default)]
struct Expansion {
    path: Vec<TypeKey>,
    expanded: IndexSet<TypeKey>,
}

/// Result of one analysis run
#[derive(Debug, Default, PartialEq)]
struct Analysis {
    required_faces: RequiredTable,
    required_next_calls: RequiredTable,
    required_mixins: RequiredTable,
    this_dependencies: Vec<DependencyTable>,
    next_call_dependencies: Vec<DependencyTable>,
    mixin_dependencies: Vec<DependencyTable>,
    complete_interfaces: DependencyTable,
}

impl Analysis {
    fn table(&mut self, kind: RequirementKind) -> &mut RequiredTable {
        match kind {
            RequirementKind::Face => &mut self.required_faces,
            RequirementKind::NextCall => &mut self.required_next_calls,
            RequirementKind::Mixin => &mut self.required_mixins,
        }
    }

    fn matches(&self, definition: &TargetClassDefinition) -> bool {
        self.required_faces == definition.required_faces
            && self.required_next_calls == definition.required_next_calls
            && self.required_mixins == definition.required_mixins
            && self.complete_interfaces == definition.complete_interfaces
            && definition.mixins.iter().enumerate().all(|(index, mixin)| {
                self.this_dependencies.get(index) == Some(&mixin.this_dependencies)
                    && self.next_call_dependencies.get(index) == Some(&mixin.next_call_dependencies)
                    && self.mixin_dependencies.get(index) == Some(&mixin.mixin_dependencies)
            })
    }

    fn apply(self, definition: &mut TargetClassDefinition) {
        definition.required_faces = self.required_faces;
        definition.required_next_calls = self.required_next_calls;
        definition.required_mixins = self.required_mixins;
        definition.complete_interfaces = self.complete_interfaces;
        let per_mixin = self
            .this_dependencies
            .into_iter()
            .zip(self.next_call_dependencies)
            .zip(self.mixin_dependencies);
        for (mixin, ((this, next), mixins)) in definition.mixins.iter_mut().zip(per_mixin) {
            mixin.this_dependencies = this;
            mixin.next_call_dependencies = next;
            mixin.mixin_dependencies = mixins;
        }
    }
}

/// Shape of a requirement after catalog lookup
struct Requirement {
    key: TypeKey,
    own_members: Vec<MemberSignature>,
    members: Vec<MemberSignature>,
    components: Vec<TypeKey>,
    structural: bool,
}

impl Requirement {
    fn is_aggregator(&self) -> bool {
        !self.structural && self.own_members.is_empty() && !self.components.is_empty()
    }
}

/// Resolves the requirements of a definition against a catalog
pub struct RequirementAnalyzer<'a> {
    catalog: &'a TypeCatalog,
}

impl<'a> RequirementAnalyzer<'a> {
    /// Create an analyzer
    pub fn new(catalog: &'a TypeCatalog) -> Self {
        Self { catalog }
    }

    /// Resolve every requirement and store the results on the definition
    ///
    /// # Errors
    ///
    /// Returns `UnfulfilledRequirement` naming every dependent of the first
    /// unsatisfiable requirement, or `UnknownType` for missing catalog types
    pub fn analyze(&self, definition: &mut TargetClassDefinition) -> CompositionResult<()> {
        let analysis = self.compute(definition)?;
        debug!(
            target_type = %definition.key(),
            faces = analysis.required_faces.len(),
            next_calls = analysis.required_next_calls.len(),
            mixins = analysis.required_mixins.len(),
            "Analyzed requirements"
        );
        analysis.apply(definition);
        Ok(())
    }

    /// Re-run the analysis on an analyzed definition and report whether it
    /// produces exactly what is stored
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`RequirementAnalyzer::analyze`]
    pub fn verify(&self, definition: &TargetClassDefinition) -> CompositionResult<bool> {
        Ok(self.compute(definition)?.matches(definition))
    }

    fn compute(&self, definition: &TargetClassDefinition) -> CompositionResult<Analysis> {
        let mut analysis = Analysis::default();
        let mut failures = Vec::new();

        for mixin in definition.mixins() {
            let depender = DefinitionRef::Mixin(mixin.index());
            let mixin_type = mixin.mixin_type();

            let mut this = DependencyTable::new();
            for spec in &mixin_type.this_requirements {
                let dependency = self.dependency(
                    definition,
                    RequirementKind::Face,
                    depender,
                    spec,
                    &mut analysis,
                    &mut failures,
                )?;
                this.insert(spec.key().clone(), dependency);
            }

            let mut next = DependencyTable::new();
            for spec in &mixin_type.next_requirements {
                let dependency = self.dependency(
                    definition,
                    RequirementKind::NextCall,
                    depender,
                    spec,
                    &mut analysis,
                    &mut failures,
                )?;
                next.insert(spec.key().clone(), dependency);
            }

            let mut mixins = DependencyTable::new();
            let required: IndexSet<&TypeKey> = mixin_type
                .mixin_requirements
                .iter()
                .chain(&mixin_type.depends_on)
                .chain(&mixin.context().explicit_dependencies)
                .collect();
            for key in required {
                register(
                    analysis.table(RequirementKind::Mixin),
                    RequirementKind::Mixin,
                    key,
                    Vec::new(),
                    Vec::new(),
                    Vec::new(),
                    false,
                    depender,
                );
                let mut dependency = Dependency::new(RequirementKind::Mixin, depender, key.clone());
                match definition.mixin_index(key) {
                    Some(index) => dependency.implementer = Some(Implementer::Mixin(index)),
                    None => failures.push(Failure {
                        kind: RequirementKind::Mixin,
                        key: key.clone(),
                        depender,
                        member: None,
                    }),
                }
                mixins.insert(key.clone(), dependency);
            }

            analysis.this_dependencies.push(this);
            analysis.next_call_dependencies.push(next);
            analysis.mixin_dependencies.push(mixins);
        }

        for capability in definition.context().complete_interfaces() {
            let spec = RequirementSpec::Capability(capability.clone());
            let dependency = self.dependency(
                definition,
                RequirementKind::Face,
                DefinitionRef::Target,
                &spec,
                &mut analysis,
                &mut failures,
            )?;
            analysis
                .complete_interfaces
                .insert(capability.clone(), dependency);
        }

        if let Some(first) = failures.first() {
            let mut dependents: Vec<String> = Vec::new();
            for failure in failures
                .iter()
                .filter(|f| f.kind == first.kind && f.key == first.key)
            {
                let name = definition.owner_key(failure.depender).to_string();
                if !dependents.contains(&name) {
                    dependents.push(name);
                }
            }
            warn!(
                target_type = %definition.key(),
                requirement = %first.key,
                kind = %first.kind,
                "Unfulfilled requirement"
            );
            return Err(CompositionError::UnfulfilledRequirement {
                target: definition.key().to_string(),
                dependents,
                requirement: first.key.to_string(),
                member: first.member.as_ref().map(ToString::to_string),
            });
        }

        Ok(analysis)
    }

    fn requirement(&self, spec: &RequirementSpec) -> CompositionResult<Requirement> {
        match spec {
            RequirementSpec::Capability(key) => {
                let capability = self.catalog.capability(key)?;
                Ok(Requirement {
                    key: key.clone(),
                    own_members: capability.members.clone(),
                    members: self.catalog.capability_members(key)?,
                    components: capability.components.clone(),
                    structural: false,
                })
            }
            RequirementSpec::Class(key) => {
                let class = self.catalog.class(key)?;
                let mut members = IndexSet::new();
                for capability in self.catalog.capability_closure(&class.implements)? {
                    members.extend(self.catalog.capability(&capability)?.members.iter().cloned());
                }
                let members: Vec<MemberSignature> = members.into_iter().collect();
                Ok(Requirement {
                    key: key.clone(),
                    own_members: members.clone(),
                    members,
                    components: Vec::new(),
                    structural: true,
                })
            }
        }
    }

    fn dependency(
        &self,
        definition: &TargetClassDefinition,
        kind: RequirementKind,
        depender: DefinitionRef,
        spec: &RequirementSpec,
        analysis: &mut Analysis,
        failures: &mut Vec<Failure>,
    ) -> CompositionResult<Dependency> {
        let mut expansion = Expansion::default();
        self.expand(definition, kind, depender, spec, analysis, failures, &mut expansion)
    }

    #[allow(clippy::too_many_arguments)]
    fn expand(
        &self,
        definition: &TargetClassDefinition,
        kind: RequirementKind,
        depender: DefinitionRef,
        spec: &RequirementSpec,
        analysis: &mut Analysis,
        failures: &mut Vec<Failure>,
        expansion: &mut Expansion,
    ) -> CompositionResult<Dependency> {
        let requirement = self.requirement(spec)?;
        register(
            analysis.table(kind),
            kind,
            &requirement.key,
            requirement.own_members.clone(),
            requirement.members.clone(),
            requirement.components.clone(),
            requirement.structural,
            depender,
        );

        let mut dependency = Dependency::new(kind, depender, requirement.key.clone());
        if requirement.is_aggregator() {
            expansion.path.push(requirement.key.clone());
            for component in &requirement.components {
                if expansion.path.contains(component) {
                    let mut path: Vec<String> =
                        expansion.path.iter().map(ToString::to_string).collect();
                    path.push(component.to_string());
                    warn!(target_type = %definition.key(), path = ?path, "Cyclic capability aggregate");
                    return Err(CompositionError::CyclicCapability {
                        capability: requirement.key.to_string(),
                        path,
                    });
                }
                // a capability reached twice through one aggregate is one dependency
                if !expansion.expanded.insert(component.clone()) {
                    continue;
                }
                let part = self.expand(
                    definition,
                    kind,
                    depender,
                    &RequirementSpec::Capability(component.clone()),
                    analysis,
                    failures,
                    expansion,
                )?;
                // nested aggregates whose parts were all reached earlier add nothing
                let covered = part.aggregated.is_empty() && {
                    let nested = self.catalog.capability(component)?;
                    nested.members.is_empty() && !nested.components.is_empty()
                };
                if !covered {
                    dependency.aggregated.push(part);
                }
            }
            expansion.path.pop();
            let implementers: IndexSet<Option<Implementer>> =
                dependency.aggregated.iter().map(Dependency::implementer).collect();
            dependency.implementer = match implementers.len() {
                1 => implementers.into_iter().next().flatten(),
                _ => None,
            };
            return Ok(dependency);
        }

        match self.resolve(definition, kind, depender, &requirement)? {
            Ok((implementer, members)) => {
                dependency.implementer = Some(implementer);
                dependency.resolved_members = members;
            }
            Err(missing) => failures.push(Failure {
                kind,
                key: requirement.key.clone(),
                depender,
                member: missing,
            }),
        }
        Ok(dependency)
    }

    fn candidates(
        definition: &TargetClassDefinition,
        kind: RequirementKind,
        depender: DefinitionRef,
    ) -> Vec<Implementer> {
        let mut candidates = vec![Implementer::Target];
        for mixin in definition.mixins() {
            let eligible = match (kind, depender) {
                (RequirementKind::NextCall, DefinitionRef::Mixin(own)) => mixin.index() > own,
                (_, DefinitionRef::Mixin(own)) => mixin.index() != own,
                (_, DefinitionRef::Target) => true,
            };
            if eligible {
                candidates.push(Implementer::Mixin(mixin.index()));
            }
        }
        candidates
    }

    fn implements_nominally(
        &self,
        definition: &TargetClassDefinition,
        candidate: Implementer,
        requirement: &Requirement,
    ) -> bool {
        match (candidate, requirement.structural) {
            (Implementer::Target, false) => definition.implemented().contains(&requirement.key),
            (Implementer::Target, true) => definition.key() == &requirement.key,
            (Implementer::Mixin(index), false) => definition
                .mixin(index)
                .map(|m| m.implemented().contains(&requirement.key))
                .unwrap_or(false),
            (Implementer::Mixin(index), true) => definition
                .mixin(index)
                .map(|m| m.key() == &requirement.key)
                .unwrap_or(false),
        }
    }

    /// Pick the implementer of a leaf requirement; the error carries the
    /// first member the target is missing
    #[allow(clippy::type_complexity)]
    fn resolve(
        &self,
        definition: &TargetClassDefinition,
        kind: RequirementKind,
        depender: DefinitionRef,
        requirement: &Requirement,
    ) -> CompositionResult<Result<(Implementer, IndexMap<MemberSignature, MemberRef>), Option<MemberSignature>>>
    {
        let candidates = Self::candidates(definition, kind, depender);

        if requirement.members.is_empty() {
            let implementer = candidates
                .iter()
                .copied()
                .find(|&c| self.implements_nominally(definition, c, requirement))
                .unwrap_or(Implementer::Target);
            return Ok(Ok((implementer, IndexMap::new())));
        }

        let mut first_missing = None;
        for nominal_pass in [true, false] {
            for &candidate in &candidates {
                if self.implements_nominally(definition, candidate, requirement) != nominal_pass {
                    continue;
                }
                let members = definition.members_of(candidate.into());
                match bind_members(members, candidate, &requirement.key, &requirement.members) {
                    Ok(bound) => return Ok(Ok((candidate, bound))),
                    Err(missing) => {
                        if candidate == Implementer::Target && first_missing.is_none() {
                            first_missing = Some(missing);
                        }
                    }
                }
            }
        }
        Ok(Err(first_missing.or_else(|| requirement.members.first().cloned())))
    }
}

#[allow(clippy::too_many_arguments)]
fn register(
    table: &mut RequiredTable,
    kind: RequirementKind,
    key: &TypeKey,
    own_members: Vec<MemberSignature>,
    members: Vec<MemberSignature>,
    components: Vec<TypeKey>,
    structural: bool,
    depender: DefinitionRef,
) {
    let required = table
        .entry(key.clone())
        .or_insert_with(|| RequiredTypeDefinition {
            kind,
            key: key.clone(),
            own_members,
            members,
            components,
            structural,
            requiring_dependencies: Vec::new(),
        });
    if !required.requiring_dependencies.contains(&depender) {
        required.requiring_dependencies.push(depender);
    }
}

/// Bind every required signature to an accessible member of the candidate,
/// preferring members qualified with the required capability set
fn bind_members(
    members: &[MemberDefinition],
    candidate: Implementer,
    capability: &TypeKey,
    required: &[MemberSignature],
) -> Result<IndexMap<MemberSignature, MemberRef>, MemberSignature> {
    let owner = DefinitionRef::from(candidate);
    let mut bound = IndexMap::new();
    for signature in required {
        let matching: Vec<usize> = members
            .iter()
            .enumerate()
            .filter(|(_, m)| m.visibility().is_accessible() && m.signature().matches(signature))
            .map(|(index, _)| index)
            .collect();
        let chosen = matching
            .iter()
            .copied()
            .find(|&index| members[index].signature().qualifier() == Some(capability.as_str()))
            .or_else(|| matching.first().copied());
        match chosen {
            Some(index) => {
                bound.insert(signature.clone(), MemberRef { owner, index });
            }
            None => return Err(signature.clone()),
        }
    }
    Ok(bound)
}
