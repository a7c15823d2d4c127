// Copyright 2025 Cowboy AI, LLC.

//! Instance initialization
//!
//! Objects move through [`InitState`] in a fixed order: extension slots are
//! allocated, every slot is filled (from supplied instances first, default
//! construction second), proxies are wired, then initialization hooks run in
//! mixin order. Restoring a snapshot uses the same sequence but fills slots
//! only from the snapshot and never default-constructs.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{ComposedObject, HookArgument, InitReason, InitState, MixinInstance, MixinShape};
use crate::definition::DefinitionRef;
use crate::errors::{CompositionError, CompositionResult, InvalidInstanceReason};
use crate::synthesis::{Composition, InitRole};

thread_local! {
    static SUPPLIED: RefCell<Vec<Vec<MixinInstance>>> = const { RefCell::new(Vec::new()) };
}

/// Scope supplying mixin instances to the next object created on this thread
///
/// Scopes nest; the innermost one is consumed by the next construction and
/// every scope is removed when its guard drops, whether construction happened
/// or not.
///
/// # Examples
///
/// ```rust
/// use cim_mixin::{MixinInstance, MixinInstantiationScope};
///
/// {
///     let _scope = MixinInstantiationScope::new(vec![MixinInstance::new("Audit")]);
///     assert!(MixinInstantiationScope::is_active());
/// }
/// assert!(!MixinInstantiationScope::is_active());
/// ```
#[derive(Debug)]
pub struct MixinInstantiationScope {
    depth: usize,
    _thread_bound: PhantomData<*const ()>,
}

impl MixinInstantiationScope {
    /// Open a scope supplying `instances`
    pub fn new(instances: Vec<MixinInstance>) -> Self {
        let depth = SUPPLIED.with(|stack| {
            let mut stack = stack.borrow_mut();
            stack.push(instances);
            stack.len()
        });
        Self {
            depth,
            _thread_bound: PhantomData,
        }
    }

    /// Whether any scope is open on this thread
    pub fn is_active() -> bool {
        SUPPLIED.with(|stack| !stack.borrow().is_empty())
    }

    /// Instances still waiting in the innermost scope
    pub fn pending() -> usize {
        SUPPLIED.with(|stack| stack.borrow().last().map(Vec::len).unwrap_or(0))
    }

    /// Take the innermost scope's instances, leaving it empty
    pub(crate) fn take_supplied() -> Vec<MixinInstance> {
        SUPPLIED.with(|stack| {
            stack
                .borrow_mut()
                .last_mut()
                .map(std::mem::take)
                .unwrap_or_default()
        })
    }
}

impl Drop for MixinInstantiationScope {
    fn drop(&mut self) {
        SUPPLIED.with(|stack| stack.borrow_mut().truncate(self.depth.saturating_sub(1)));
    }
}

/// Drives one object through initialization
pub struct InstanceInitializer {
    composition: Arc<Composition>,
}

impl InstanceInitializer {
    /// Create an initializer for a composition
    pub fn new(composition: Arc<Composition>) -> Self {
        Self { composition }
    }

    /// Construct a new object
    ///
    /// # Errors
    ///
    /// Returns `InvalidMixinInstance` for rejected supplied instances,
    /// `MissingDefaultConstructor` for slots that cannot be default
    /// constructed and `Initialization` when a hook fails
    pub fn initialize(&self, supplied: Vec<MixinInstance>) -> CompositionResult<ComposedObject> {
        let fields = self.composition.definition().class_type().fields.clone();
        let mut object = ComposedObject::allocate(Arc::clone(&self.composition), fields);

        let mut slots = self.allocate_slots(&mut object);
        self.place(&mut slots, supplied)?;
        let mut extensions = Vec::with_capacity(slots.len());
        for (index, slot) in slots.into_iter().enumerate() {
            match slot {
                Some(instance) => extensions.push(instance),
                None => extensions.push(self.composition.instantiate_mixin(index)?),
            }
        }

        object.assign_extensions(extensions);
        object.wire_proxies();
        self.run_init_hooks(&mut object, InitReason::Construction)?;
        object.advance(InitState::Initialized);
        debug!(
            target_type = %self.composition.target(),
            composition = %self.composition.id(),
            "Constructed composed object"
        );
        Ok(object)
    }

    /// Finish an object whose target fields were restored from a snapshot
    ///
    /// # Errors
    ///
    /// Returns `SerializationMismatch` when a slot has no restored instance,
    /// instance validation errors and `Initialization` when a hook fails
    pub(crate) fn restore(
        &self,
        mut object: ComposedObject,
        restored: Vec<MixinInstance>,
    ) -> CompositionResult<ComposedObject> {
        let mut slots = self.allocate_slots(&mut object);
        self.place(&mut slots, restored)?;
        let mut extensions = Vec::with_capacity(slots.len());
        for (index, slot) in slots.into_iter().enumerate() {
            match slot {
                Some(instance) => extensions.push(instance),
                None => {
                    let expected = self
                        .composition
                        .definition()
                        .owner_key(DefinitionRef::Mixin(index))
                        .to_string();
                    return Err(CompositionError::SerializationMismatch {
                        expected,
                        found: "no restored instance".to_string(),
                    });
                }
            }
        }

        object.assign_extensions(extensions);
        object.wire_proxies();
        self.run_init_hooks(&mut object, InitReason::Deserialization)?;
        self.run_deserialized_hooks(&mut object)?;
        object.advance(InitState::Initialized);
        debug!(
            target_type = %self.composition.target(),
            composition = %self.composition.id(),
            "Restored composed object"
        );
        Ok(object)
    }

    fn allocate_slots(&self, object: &mut ComposedObject) -> Vec<Option<MixinInstance>> {
        object.advance(InitState::ExtensionsAllocated);
        vec![None; self.composition.definition().mixin_count()]
    }

    /// Validate supplied instances and put each into its slot
    fn place(
        &self,
        slots: &mut [Option<MixinInstance>],
        supplied: Vec<MixinInstance>,
    ) -> CompositionResult<()> {
        let definition = self.composition.definition();
        for instance in supplied {
            let reject = |reason: InvalidInstanceReason| {
                warn!(
                    target_type = %definition.key(),
                    mixin = %instance.mixin_type(),
                    reason = %reason,
                    "Rejected mixin instance"
                );
                CompositionError::InvalidMixinInstance {
                    target: definition.key().to_string(),
                    mixin: instance.mixin_type().to_string(),
                    reason,
                }
            };

            let Some(index) = definition.mixin_index(instance.mixin_type()) else {
                return Err(reject(InvalidInstanceReason::NotConfigured));
            };
            let needs_derived = definition.mixins()[index].needs_derived_type();
            match instance.shape() {
                MixinShape::Plain if needs_derived => {
                    return Err(reject(InvalidInstanceReason::NotDerived));
                }
                MixinShape::Derived { target } if target != definition.key() => {
                    return Err(reject(InvalidInstanceReason::ForeignDerivation));
                }
                _ => {}
            }
            if slots[index].is_some() {
                return Err(reject(InvalidInstanceReason::DuplicateSlot));
            }
            slots[index] = Some(instance);
        }
        Ok(())
    }

    fn run_init_hooks(&self, object: &mut ComposedObject, reason: InitReason) -> CompositionResult<()> {
        let definition = Arc::clone(self.composition.definition());
        for mixin in definition.mixins() {
            let Some(hook) = &mixin.mixin_type().initializer else {
                continue;
            };
            let arguments: Vec<HookArgument> = self
                .composition
                .plan()
                .init_roles(mixin.index())
                .iter()
                .map(|role| match role {
                    InitRole::Target => HookArgument::Target,
                    InitRole::NextProxy => object
                        .proxies()
                        .get(mixin.index() + 1)
                        .copied()
                        .map(HookArgument::Next)
                        .unwrap_or(HookArgument::Target),
                })
                .collect();
            object
                .run_init_hook(mixin.index(), reason, &hook.body, &arguments)
                .map_err(|source| CompositionError::Initialization {
                    owner: mixin.key().to_string(),
                    source,
                })?;
        }
        Ok(())
    }

    fn run_deserialized_hooks(&self, object: &mut ComposedObject) -> CompositionResult<()> {
        let definition = Arc::clone(self.composition.definition());
        for mixin in definition.mixins() {
            if let Some(hook) = &mixin.mixin_type().on_deserialized {
                object
                    .run_deserialized_hook(DefinitionRef::Mixin(mixin.index()), hook)
                    .map_err(|source| CompositionError::Initialization {
                        owner: mixin.key().to_string(),
                        source,
                    })?;
            }
        }
        if let Some(hook) = &definition.class_type().on_deserialized {
            object
                .run_deserialized_hook(DefinitionRef::Target, hook)
                .map_err(|source| CompositionError::Initialization {
                    owner: definition.key().to_string(),
                    source,
                })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test scopes nest and pop in order
    ///
    /// ```mermaid
    /// sequenceDiagram
    ///     participant O as outer scope
    ///     participant I as inner scope
    ///     O->>O: push [Audit]
    ///     I->>I: push [Audit, Trace]
    ///     I-->>O: drop inner
    ///     O-->>O: drop outer
    /// ```
    #[test]
    fn test_scope_nesting() {
        assert!(!MixinInstantiationScope::is_active());
        let outer = MixinInstantiationScope::new(vec![MixinInstance::new("Audit")]);
        assert_eq!(MixinInstantiationScope::pending(), 1);
        {
            let _inner = MixinInstantiationScope::new(vec![
                MixinInstance::new("Audit"),
                MixinInstance::new("Trace"),
            ]);
            assert_eq!(MixinInstantiationScope::pending(), 2);
            assert_eq!(MixinInstantiationScope::take_supplied().len(), 2);
            assert_eq!(MixinInstantiationScope::pending(), 0);
        }
        assert_eq!(MixinInstantiationScope::pending(), 1);
        drop(outer);
        assert!(!MixinInstantiationScope::is_active());
        assert!(MixinInstantiationScope::take_supplied().is_empty());
    }

    /// Test scopes are removed on unwinding
    #[test]
    fn test_scope_removed_on_panic() {
        let result = std::panic::catch_unwind(|| {
            let _scope = MixinInstantiationScope::new(vec![MixinInstance::new("Audit")]);
            panic!("construction failed");
        });
        assert!(result.is_err());
        assert!(!MixinInstantiationScope::is_active());
    }
}
