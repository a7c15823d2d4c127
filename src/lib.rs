// Copyright 2025 Cowboy AI, LLC.

//! # CIM Mixin
//!
//! Mixin composition engine: attach independently authored behavior units
//! (mixins) to target classes and dispatch calls through the resulting
//! override chains.
//!
//! This crate provides:
//! - **Catalog**: authoring-time descriptions of targets, mixins and capability sets
//! - **Class Contexts**: the immutable identity of one target + mixins composition
//! - **Dependency Sorting**: a total mixin order honoring every ordering edge
//! - **Override Resolution**: one base member per override, ordered chains per base
//! - **Requirement Analysis**: face, next-call and mixin requirements bound to implementers
//! - **Synthesis**: depth-indexed dispatch tables and entry points
//! - **Runtime**: composed objects, base-call proxies and initialization hooks
//! - **Serialization**: flat snapshots restoring the exact composition
//! - **Caching**: at most one synthesis per context, even under concurrency
//!
//! ## Design Principles
//!
//! 1. **Fail at composition time**: every configuration problem is an error before
//!    the first object exists
//! 2. **Immutable compositions**: a synthesized composition never changes and is
//!    shared by every object of its context
//! 3. **Deterministic order**: declaration order only breaks ties the
//!    dependency graph leaves open
//! 4. **Strictly descending calls**: a base call always continues below its caller

#![warn(missing_docs)]

mod cache;
mod catalog;
mod composer;
mod context;
mod errors;
mod identifiers;
mod member;
mod overrides;
mod requirements;
mod sorter;
mod synthesis;
pub mod definition;
pub mod runtime;
pub mod serialization;

pub use cache::{CacheStats, CoalescingCache, CompositionCache};
pub use catalog::{
    CapabilitySet, ClassType, ConstructionPath, DeserializedFn, FactoryFn, HookFn, HookParameter,
    InitHook, MemberDecl, MemberFn, MixinType, OverrideDecl, RequirementSpec, TypeCatalog,
};
pub use composer::Composer;
pub use context::{
    ClassContext, ClassContextBuilder, ConfigurationEntry, MixinConfiguration, MixinContext,
    MixinKind, MixinOrigin,
};
pub use definition::{
    DefinitionBuilder, DefinitionRef, Dependency, Implementer, MemberDefinition, MemberRef,
    MixinDefinition, RequiredTypeDefinition, RequirementKind, TargetClassDefinition,
};
pub use errors::{
    CompositionError, CompositionResult, InvalidInstanceReason, InvocationError,
};
pub use identifiers::{CompositionId, TypeKey};
pub use member::{FieldSet, MemberKind, MemberSignature, Value, Visibility};
pub use overrides::OverrideResolver;
pub use requirements::RequirementAnalyzer;
pub use runtime::{
    BaseCallProxy, CallContext, ComposedObject, HookArgument, InitReason, InitState,
    InstanceInitializer, MixinInstance, MixinInstantiationScope, MixinShape,
};
pub use serialization::{snapshot, snapshot_schema, FlatSnapshot, SerializationBridge};
pub use sorter::{DependencySorter, MixinOrder};
pub use synthesis::{
    Composition, CompositionPlan, CompositionSynthesizer, Dispatch, EntryPoint, InitRole,
    OverrideChain,
};
