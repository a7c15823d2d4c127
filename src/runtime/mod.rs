// Copyright 2025 Cowboy AI, LLC.

//! Runtime side of a composition: composed objects and calls against them
//!
//! A [`ComposedObject`] holds the target's field state, one extension per mixin
//! slot and one [`BaseCallProxy`] per call depth. Member bodies run with a
//! [`CallContext`] that knows which definition they belong to and where a base
//! call continues.

mod initializer;

pub use initializer::{InstanceInitializer, MixinInstantiationScope};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::trace;

use crate::catalog::{DeserializedFn, HookFn};
use crate::definition::{DefinitionRef, MemberRef, TargetClassDefinition};
use crate::errors::InvocationError;
use crate::identifiers::TypeKey;
use crate::member::{FieldSet, Value};
use crate::synthesis::{Composition, Dispatch, EntryPoint};

/// Runtime shape of a mixin instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum MixinShape {
    /// Instance of the mixin type itself
    Plain,
    /// Instance derived for one target, required when that target overrides
    /// members of the mixin
    Derived {
        /// Target the instance was derived for
        target: TypeKey,
    },
}

/// State of one mixin slot
#[derive(Debug, Clone, PartialEq)]
pub struct MixinInstance {
    mixin_type: TypeKey,
    shape: MixinShape,
    fields: FieldSet,
}

impl MixinInstance {
    /// Plain instance with no field state
    pub fn new(mixin_type: impl Into<TypeKey>) -> Self {
        Self::from_parts(mixin_type.into(), MixinShape::Plain, FieldSet::new())
    }

    /// Instance derived for a target
    pub fn derived(mixin_type: impl Into<TypeKey>, target: impl Into<TypeKey>) -> Self {
        Self::from_parts(
            mixin_type.into(),
            MixinShape::Derived {
                target: target.into(),
            },
            FieldSet::new(),
        )
    }

    pub(crate) fn from_parts(mixin_type: TypeKey, shape: MixinShape, fields: FieldSet) -> Self {
        Self {
            mixin_type,
            shape,
            fields,
        }
    }

    /// Set a field, builder style
    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Mixin type
    pub fn mixin_type(&self) -> &TypeKey {
        &self.mixin_type
    }

    /// Shape
    pub fn shape(&self) -> &MixinShape {
        &self.shape
    }

    /// Field state
    pub fn fields(&self) -> &FieldSet {
        &self.fields
    }

    /// Mutable field state
    pub fn fields_mut(&mut self) -> &mut FieldSet {
        &mut self.fields
    }

    /// Read one field
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Write one field, returning the previous value
    pub fn set_field(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.fields.insert(name.into(), value)
    }
}

/// Call target for one depth of the override chains
///
/// The proxy at depth `d` is what an override living at mixin index `d - 1`
/// reaches with a base call. The last proxy (depth = mixin count) reaches the
/// target's own implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BaseCallProxy {
    depth: usize,
    next: Option<usize>,
}

impl BaseCallProxy {
    /// Depth this proxy dispatches at
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Depth of the proxy after this one
    pub fn next(&self) -> Option<usize> {
        self.next
    }

    /// Whether this proxy reaches the target directly
    pub fn is_terminal(&self) -> bool {
        self.next.is_none()
    }
}

/// Argument passed to an initialization hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookArgument {
    /// The composed object; reach it through the hook's [`CallContext`]
    Target,
    /// The proxy one level below the mixin
    Next(BaseCallProxy),
}

impl HookArgument {
    /// The proxy, for `Next` arguments
    pub fn as_proxy(&self) -> Option<BaseCallProxy> {
        match self {
            HookArgument::Next(proxy) => Some(*proxy),
            HookArgument::Target => None,
        }
    }
}

/// Why initialization hooks are running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitReason {
    /// A new object is being constructed
    Construction,
    /// An object is being restored from a snapshot
    Deserialization,
}

/// Initialization progress of a composed object
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum InitState {
    /// Memory allocated, nothing attached
    Unconstructed,
    /// Extension slots allocated
    ExtensionsAllocated,
    /// Every slot holds a mixin instance
    MixinsAssigned,
    /// Base-call proxies created
    ProxiesWired,
    /// Hooks have run; the object is usable
    Initialized,
}

/// Where a base call from the running member continues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Continuation {
    /// Dispatch the named target member at this depth
    Chain(usize),
    /// Run the mixin member a target member overrides
    MixinBase(MemberRef),
    /// Nothing below
    End,
}

/// An instance of a composition
pub struct ComposedObject {
    composition: Arc<Composition>,
    state: InitState,
    fields: FieldSet,
    extensions: Vec<MixinInstance>,
    proxies: Vec<BaseCallProxy>,
}

impl ComposedObject {
    pub(crate) fn allocate(composition: Arc<Composition>, fields: FieldSet) -> Self {
        Self {
            composition,
            state: InitState::Unconstructed,
            fields,
            extensions: Vec::new(),
            proxies: Vec::new(),
        }
    }

    pub(crate) fn advance(&mut self, state: InitState) {
        trace!(target_type = %self.target(), from = ?self.state, to = ?state, "Initialization state");
        self.state = state;
    }

    pub(crate) fn assign_extensions(&mut self, extensions: Vec<MixinInstance>) {
        self.extensions = extensions;
        self.advance(InitState::MixinsAssigned);
    }

    pub(crate) fn wire_proxies(&mut self) {
        let count = self.composition.plan().mixin_count();
        self.proxies = (0..=count)
            .map(|depth| BaseCallProxy {
                depth,
                next: (depth < count).then_some(depth + 1),
            })
            .collect();
        self.advance(InitState::ProxiesWired);
    }

    /// Composition this object belongs to
    pub fn composition(&self) -> &Arc<Composition> {
        &self.composition
    }

    /// Resolved definition of the composition
    pub fn definition(&self) -> &Arc<TargetClassDefinition> {
        self.composition.definition()
    }

    /// Target type
    pub fn target(&self) -> &TypeKey {
        self.composition.target()
    }

    /// Initialization state
    pub fn state(&self) -> InitState {
        self.state
    }

    /// Target field state
    pub fn fields(&self) -> &FieldSet {
        &self.fields
    }

    /// Mutable target field state
    pub fn fields_mut(&mut self) -> &mut FieldSet {
        &mut self.fields
    }

    /// Read a target field
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Write a target field, returning the previous value
    pub fn set_field(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.fields.insert(name.into(), value)
    }

    /// Mixin instances by mixin index
    pub fn extensions(&self) -> &[MixinInstance] {
        &self.extensions
    }

    /// Mixin instance of a mixin type
    pub fn extension(&self, mixin: &TypeKey) -> Option<&MixinInstance> {
        self.extensions.iter().find(|e| e.mixin_type() == mixin)
    }

    /// Mutable mixin instance of a mixin type
    pub fn extension_mut(&mut self, mixin: &TypeKey) -> Option<&mut MixinInstance> {
        self.extensions.iter_mut().find(|e| e.mixin_type() == mixin)
    }

    /// Proxies by depth
    pub fn proxies(&self) -> &[BaseCallProxy] {
        &self.proxies
    }

    /// Proxy at depth 0, where external calls enter the chains
    pub fn first_proxy(&self) -> Option<BaseCallProxy> {
        self.proxies.first().copied()
    }

    /// Whether the object implements a capability set, natively, through an
    /// introduction or as a complete interface
    pub fn implements(&self, capability: &TypeKey) -> bool {
        self.definition().implements(capability)
    }

    /// Call a member through its override chain, starting at depth 0
    ///
    /// Members introduced by mixins are reachable by name as well.
    ///
    /// # Errors
    ///
    /// Returns lookup errors or the error of the member body
    pub fn invoke(&mut self, member: &str, args: &[Value]) -> Result<Value, InvocationError> {
        let composition = Arc::clone(&self.composition);
        match composition.definition().find_target_member(member) {
            Ok(index) => self.dispatch_target(index, 0, args),
            Err(InvocationError::UnknownMember { owner, member: name }) => {
                match self.introduced_entry(member)? {
                    Some(entry) => self.run_entry(entry, args),
                    None => Err(InvocationError::UnknownMember { owner, member: name }),
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Call a member at the depth of a proxy
    ///
    /// # Errors
    ///
    /// Returns lookup errors or the error of the member body
    pub fn invoke_at(
        &mut self,
        proxy: BaseCallProxy,
        member: &str,
        args: &[Value],
    ) -> Result<Value, InvocationError> {
        let index = self.composition.definition().find_target_member(member)?;
        self.dispatch_target(index, proxy.depth, args)
    }

    /// Call the target's own implementation, bypassing every override
    ///
    /// # Errors
    ///
    /// Returns lookup errors or the error of the member body
    pub fn invoke_direct(&mut self, member: &str, args: &[Value]) -> Result<Value, InvocationError> {
        let index = self.composition.definition().find_target_member(member)?;
        let member = MemberRef::target(index);
        let next = self.continuation_after(member);
        self.run_member(member, next, args)
    }

    /// Call a member declared by one mixin
    ///
    /// If the target overrides that member the target's override runs first.
    ///
    /// # Errors
    ///
    /// Returns `UnknownMixin`, lookup errors or the error of the member body
    pub fn invoke_mixin(
        &mut self,
        mixin: &TypeKey,
        member: &str,
        args: &[Value],
    ) -> Result<Value, InvocationError> {
        let composition = Arc::clone(&self.composition);
        let definition = composition.definition();
        let index = definition
            .mixin_index(mixin)
            .ok_or_else(|| InvocationError::UnknownMixin(mixin.to_string()))?;
        let position = definition.mixins()[index].find_member(member)?;
        let entry = composition.plan().entry_point(MemberRef::mixin(index, position));
        self.run_entry(entry, args)
    }

    /// Call a member through a capability set the object implements
    ///
    /// # Errors
    ///
    /// Returns `NotImplemented` when the capability set is not implemented,
    /// lookup errors or the error of the member body
    pub fn invoke_interface(
        &mut self,
        capability: &TypeKey,
        member: &str,
        args: &[Value],
    ) -> Result<Value, InvocationError> {
        let composition = Arc::clone(&self.composition);
        match composition.plan().interface(capability) {
            Some(entries) => {
                let selected: Vec<EntryPoint> = entries
                    .iter()
                    .filter(|(signature, _)| signature.is_selected_by(member))
                    .map(|(_, entry)| *entry)
                    .collect();
                match selected.as_slice() {
                    [entry] => self.run_entry(*entry, args),
                    [] => Err(InvocationError::UnknownMember {
                        owner: capability.to_string(),
                        member: member.to_string(),
                    }),
                    _ => Err(InvocationError::AmbiguousMember {
                        owner: capability.to_string(),
                        member: member.to_string(),
                        candidates: entries
                            .keys()
                            .filter(|s| s.is_selected_by(member))
                            .map(|s| s.key())
                            .collect(),
                    }),
                }
            }
            None if composition.definition().implemented().contains(capability) => {
                self.invoke(member, args)
            }
            None => Err(InvocationError::NotImplemented(capability.to_string())),
        }
    }

    fn introduced_entry(&self, member: &str) -> Result<Option<EntryPoint>, InvocationError> {
        let plan = self.composition.plan();
        let mut found: Vec<EntryPoint> = Vec::new();
        for capability in plan.interfaces() {
            if let Some(entries) = plan.interface(capability) {
                for (signature, entry) in entries {
                    if signature.is_selected_by(member) && !found.contains(entry) {
                        found.push(*entry);
                    }
                }
            }
        }
        match found.len() {
            0 => Ok(None),
            1 => Ok(found.pop()),
            _ => Err(InvocationError::AmbiguousMember {
                owner: self.target().to_string(),
                member: member.to_string(),
                candidates: found.iter().map(|e| format!("{e:?}")).collect(),
            }),
        }
    }

    fn continuation_after(&self, member: MemberRef) -> Continuation {
        match member.owner {
            DefinitionRef::Mixin(index) => Continuation::Chain(index + 1),
            DefinitionRef::Target => match self
                .composition
                .definition()
                .member(member)
                .and_then(|m| m.base())
            {
                Some(base) => Continuation::MixinBase(base),
                None => Continuation::End,
            },
        }
    }

    pub(crate) fn run_entry(
        &mut self,
        entry: EntryPoint,
        args: &[Value],
    ) -> Result<Value, InvocationError> {
        match entry {
            EntryPoint::Chain { member } => self.dispatch_target(member, 0, args),
            EntryPoint::Direct { member } => {
                let next = self.continuation_after(member);
                self.run_member(member, next, args)
            }
            EntryPoint::TargetOverride { overrider, base } => self.run_member(
                MemberRef::target(overrider),
                Continuation::MixinBase(base),
                args,
            ),
        }
    }

    pub(crate) fn dispatch_target(
        &mut self,
        member: usize,
        depth: usize,
        args: &[Value],
    ) -> Result<Value, InvocationError> {
        let dispatch = self.composition.plan().dispatch(member, depth);
        trace!(target_type = %self.target(), member, depth, dispatch = ?dispatch, "Dispatching call");
        match dispatch {
            Dispatch::Mixin {
                member, next_depth, ..
            } => self.run_member(member, Continuation::Chain(next_depth), args),
            Dispatch::Target { member } => {
                let next = self.continuation_after(member);
                self.run_member(member, next, args)
            }
        }
    }

    fn run_member(
        &mut self,
        member: MemberRef,
        next: Continuation,
        args: &[Value],
    ) -> Result<Value, InvocationError> {
        let composition = Arc::clone(&self.composition);
        let definition = composition.definition();
        let declared = definition
            .member(member)
            .ok_or_else(|| InvocationError::UnknownMember {
                owner: definition.owner_key(member.owner).to_string(),
                member: format!("#{}", member.index),
            })?;
        let body = declared
            .implementation()
            .cloned()
            .ok_or_else(|| InvocationError::NoImplementation {
                owner: definition.owner_key(member.owner).to_string(),
                member: declared.signature().to_string(),
            })?;
        let mut context = CallContext::new(self, member.owner, next, None);
        body(&mut context, args)
    }

    pub(crate) fn run_init_hook(
        &mut self,
        mixin: usize,
        reason: InitReason,
        hook: &HookFn,
        args: &[HookArgument],
    ) -> Result<(), InvocationError> {
        let mut context = CallContext::new(
            self,
            DefinitionRef::Mixin(mixin),
            Continuation::Chain(mixin + 1),
            Some(reason),
        );
        hook(&mut context, args)
    }

    pub(crate) fn run_deserialized_hook(
        &mut self,
        owner: DefinitionRef,
        hook: &DeserializedFn,
    ) -> Result<(), InvocationError> {
        let next = match owner {
            DefinitionRef::Mixin(index) => Continuation::Chain(index + 1),
            DefinitionRef::Target => Continuation::End,
        };
        let mut context = CallContext::new(self, owner, next, Some(InitReason::Deserialization));
        hook(&mut context)
    }
}

impl fmt::Debug for ComposedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComposedObject")
            .field("composition", &self.composition.id())
            .field("target", self.target())
            .field("state", &self.state)
            .field("fields", &self.fields)
            .field("extensions", &self.extensions)
            .field("proxies", &self.proxies.len())
            .finish()
    }
}

/// Execution context handed to member bodies and hooks
///
/// Field access is scoped to the running definition: a mixin body sees its own
/// extension's fields through [`CallContext::fields`] and reaches the target's
/// state through [`CallContext::target_fields`].
pub struct CallContext<'a> {
    object: &'a mut ComposedObject,
    owner: DefinitionRef,
    next: Continuation,
    reason: Option<InitReason>,
}

impl<'a> CallContext<'a> {
    pub(crate) fn new(
        object: &'a mut ComposedObject,
        owner: DefinitionRef,
        next: Continuation,
        reason: Option<InitReason>,
    ) -> Self {
        Self {
            object,
            owner,
            next,
            reason,
        }
    }

    /// Definition the running body belongs to
    pub fn owner(&self) -> DefinitionRef {
        self.owner
    }

    /// Type of the definition the running body belongs to
    pub fn owner_type(&self) -> &TypeKey {
        self.object.definition().owner_key(self.owner)
    }

    /// The composed object
    pub fn object(&self) -> &ComposedObject {
        &*self.object
    }

    /// Set while initialization or deserialization hooks run
    pub fn init_reason(&self) -> Option<InitReason> {
        self.reason
    }

    /// Field state of the running definition
    pub fn fields(&self) -> &FieldSet {
        match self.owner {
            DefinitionRef::Target => &self.object.fields,
            // slots are assigned before any body can run
            DefinitionRef::Mixin(index) => &self.object.extensions[index].fields,
        }
    }

    /// Mutable field state of the running definition
    pub fn fields_mut(&mut self) -> &mut FieldSet {
        match self.owner {
            DefinitionRef::Target => &mut self.object.fields,
            DefinitionRef::Mixin(index) => &mut self.object.extensions[index].fields,
        }
    }

    /// Read a field of the running definition
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields().get(name)
    }

    /// Write a field of the running definition
    pub fn set_field(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.fields_mut().insert(name.into(), value)
    }

    /// Target field state
    pub fn target_fields(&self) -> &FieldSet {
        &self.object.fields
    }

    /// Mutable target field state
    pub fn target_fields_mut(&mut self) -> &mut FieldSet {
        &mut self.object.fields
    }

    /// Field state of another mixin
    ///
    /// # Errors
    ///
    /// Returns `UnknownMixin` when the mixin is not part of the composition
    pub fn mixin_fields(&self, mixin: &TypeKey) -> Result<&FieldSet, InvocationError> {
        self.object
            .extension(mixin)
            .map(MixinInstance::fields)
            .ok_or_else(|| InvocationError::UnknownMixin(mixin.to_string()))
    }

    /// Mutable field state of another mixin
    ///
    /// # Errors
    ///
    /// Returns `UnknownMixin` when the mixin is not part of the composition
    pub fn mixin_fields_mut(&mut self, mixin: &TypeKey) -> Result<&mut FieldSet, InvocationError> {
        self.object
            .extension_mut(mixin)
            .map(MixinInstance::fields_mut)
            .ok_or_else(|| InvocationError::UnknownMixin(mixin.to_string()))
    }

    /// Proxy a base call from here goes through
    pub fn next_proxy(&self) -> Option<BaseCallProxy> {
        match self.next {
            Continuation::Chain(depth) => self.object.proxies.get(depth).copied(),
            Continuation::MixinBase(_) | Continuation::End => None,
        }
    }

    /// Base call: continue with the next implementation of a member
    ///
    /// From a mixin this enters the override chains below the mixin. Members
    /// the target does not declare are looked up in the mixin's next-call
    /// requirements. From a target member overriding a mixin member this runs
    /// the mixin member.
    ///
    /// # Errors
    ///
    /// Returns `NoNextImplementation` when nothing is below, or the error of
    /// the member body
    pub fn call_next(&mut self, member: &str, args: &[Value]) -> Result<Value, InvocationError> {
        let composition = Arc::clone(&self.object.composition);
        let definition = composition.definition();
        match self.next {
            Continuation::Chain(depth) => match definition.find_target_member(member) {
                Ok(index) => self.object.dispatch_target(index, depth, args),
                Err(InvocationError::UnknownMember { .. }) => {
                    let resolved = match self.owner {
                        DefinitionRef::Mixin(index) => definition.mixin(index).and_then(|m| {
                            m.next_call_dependencies()
                                .values()
                                .find_map(|d| d.resolve_member(member))
                        }),
                        DefinitionRef::Target => None,
                    };
                    match resolved {
                        Some(resolved) => self
                            .object
                            .run_entry(composition.plan().entry_point(resolved), args),
                        None => Err(InvocationError::NoNextImplementation {
                            member: member.to_string(),
                        }),
                    }
                }
                Err(err) => Err(err),
            },
            Continuation::MixinBase(base) => {
                let selected = definition
                    .member(base)
                    .map(|m| m.signature().is_selected_by(member))
                    .unwrap_or(false);
                if !selected {
                    return Err(InvocationError::NoNextImplementation {
                        member: member.to_string(),
                    });
                }
                let next = self.object.continuation_after(base);
                self.object.run_member(base, next, args)
            }
            Continuation::End => Err(InvocationError::NoNextImplementation {
                member: member.to_string(),
            }),
        }
    }

    /// Call a member on the composed object ("this")
    ///
    /// Members bound by the running mixin's face requirements are entered
    /// through their resolved implementer; anything else goes through the
    /// target's override chains from depth 0.
    ///
    /// # Errors
    ///
    /// Returns lookup errors or the error of the member body
    pub fn call_this(&mut self, member: &str, args: &[Value]) -> Result<Value, InvocationError> {
        let composition = Arc::clone(&self.object.composition);
        if let DefinitionRef::Mixin(index) = self.owner {
            let resolved = composition.definition().mixin(index).and_then(|m| {
                m.this_dependencies()
                    .values()
                    .find_map(|d| d.resolve_member(member))
            });
            if let Some(resolved) = resolved {
                return self
                    .object
                    .run_entry(composition.plan().entry_point(resolved), args);
            }
        }
        self.object.invoke(member, args)
    }

    /// Call a member declared by a mixin
    ///
    /// # Errors
    ///
    /// Returns `UnknownMixin`, lookup errors or the error of the member body
    pub fn call_mixin(
        &mut self,
        mixin: &TypeKey,
        member: &str,
        args: &[Value],
    ) -> Result<Value, InvocationError> {
        self.object.invoke_mixin(mixin, member, args)
    }

    /// Call a member at the depth of a proxy, e.g. one received by an
    /// initialization hook
    ///
    /// # Errors
    ///
    /// Returns lookup errors or the error of the member body
    pub fn call_via(
        &mut self,
        proxy: BaseCallProxy,
        member: &str,
        args: &[Value],
    ) -> Result<Value, InvocationError> {
        self.object.invoke_at(proxy, member, args)
    }
}

impl fmt::Debug for CallContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("owner", &self.owner)
            .field("next", &self.next)
            .field("reason", &self.reason)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Test mixin instance builders
    #[test]
    fn test_mixin_instance_builders() {
        let plain = MixinInstance::new("Audit").with_field("entries", json!(3));
        assert_eq!(plain.shape(), &MixinShape::Plain);
        assert_eq!(plain.field("entries"), Some(&json!(3)));

        let mut derived = MixinInstance::derived("Audit", "Order");
        assert_eq!(
            derived.shape(),
            &MixinShape::Derived {
                target: TypeKey::new("Order")
            }
        );
        assert_eq!(derived.set_field("entries", json!(1)), None);
        assert_eq!(derived.fields().len(), 1);
    }

    /// Test shapes serialize with a tag
    #[test]
    fn test_shape_serialization() {
        let shape = MixinShape::Derived {
            target: TypeKey::new("Order"),
        };
        let value = serde_json::to_value(&shape).unwrap();
        assert_eq!(value, json!({ "shape": "derived", "target": "Order" }));
        assert_eq!(serde_json::to_value(MixinShape::Plain).unwrap(), json!({ "shape": "plain" }));
    }

    /// Test hook arguments expose their proxy
    #[test]
    fn test_hook_argument_proxy() {
        let proxy = BaseCallProxy { depth: 1, next: None };
        assert!(proxy.is_terminal());
        assert_eq!(HookArgument::Next(proxy).as_proxy(), Some(proxy));
        assert_eq!(HookArgument::Target.as_proxy(), None);
        assert!(InitState::Unconstructed < InitState::Initialized);
    }
}
