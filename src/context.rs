// Copyright 2025 Cowboy AI, LLC.

//! Class contexts: the immutable identity of one target + mixins composition
//!
//! A [`ClassContext`] is what the configuration layer hands to the core and
//! what a snapshot stores to find its composition again. Complete interfaces
//! behave as a set for equality and hashing. Mixins compare in declaration
//! order, because the dependency sorter breaks ties with it.

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

use crate::errors::{CompositionError, CompositionResult};
use crate::identifiers::TypeKey;

/// How a mixin was attached to its target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
pub enum MixinKind {
    /// The mixin declared that it extends the target
    #[default]
    Extending,
    /// The target declared that it uses the mixin
    Used,
}

/// Where a mixin configuration entry came from; diagnostic only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MixinOrigin {
    /// Kind of declaration (attribute, configuration file, code)
    pub kind: String,
    /// Location of the declaration
    pub location: String,
}

impl MixinOrigin {
    /// Create an origin marker
    pub fn new(kind: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            location: location.into(),
        }
    }
}

/// One mixin entry of a class context
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MixinContext {
    /// Mixin type
    pub mixin_type: TypeKey,
    /// How it was attached
    #[serde(default)]
    pub kind: MixinKind,
    /// Explicit ordering dependencies on other mixins of the same context
    #[serde(default)]
    pub explicit_dependencies: BTreeSet<TypeKey>,
    /// Where the entry came from; not part of the identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<MixinOrigin>,
}

impl MixinContext {
    /// Extending mixin entry with no explicit dependencies
    pub fn new(mixin_type: impl Into<TypeKey>) -> Self {
        Self {
            mixin_type: mixin_type.into(),
            kind: MixinKind::Extending,
            explicit_dependencies: BTreeSet::new(),
            origin: None,
        }
    }

    /// Set the attachment kind
    pub fn with_kind(mut self, kind: MixinKind) -> Self {
        self.kind = kind;
        self
    }

    /// Add an explicit ordering dependency
    pub fn depending_on(mut self, mixin: impl Into<TypeKey>) -> Self {
        self.explicit_dependencies.insert(mixin.into());
        self
    }

    /// Record the origin of the entry
    pub fn with_origin(mut self, origin: MixinOrigin) -> Self {
        self.origin = Some(origin);
        self
    }
}

impl PartialEq for MixinContext {
    fn eq(&self, other: &Self) -> bool {
        self.mixin_type == other.mixin_type
            && self.kind == other.kind
            && self.explicit_dependencies == other.explicit_dependencies
    }
}

impl Eq for MixinContext {}

impl Hash for MixinContext {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.mixin_type.hash(state);
        self.kind.hash(state);
        self.explicit_dependencies.hash(state);
    }
}

/// Identity and configuration of one composition
///
/// # Examples
///
/// ```rust
/// use cim_mixin::ClassContext;
///
/// let a = ClassContext::builder("Order").mixin("Audit").mixin("Pricing").build().unwrap();
/// let b = ClassContext::builder("Order").mixin("Audit").mixin("Pricing").build().unwrap();
/// let swapped = ClassContext::builder("Order").mixin("Pricing").mixin("Audit").build().unwrap();
/// assert_eq!(a, b);
/// assert_ne!(a, swapped);
/// assert_eq!(a.mixins()[0].mixin_type.as_str(), "Audit");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClassContext {
    target: TypeKey,
    mixins: Vec<MixinContext>,
    #[serde(default)]
    complete_interfaces: BTreeSet<TypeKey>,
}

impl ClassContext {
    /// Context with no mixins
    pub fn new(target: impl Into<TypeKey>) -> Self {
        Self {
            target: target.into(),
            mixins: Vec::new(),
            complete_interfaces: BTreeSet::new(),
        }
    }

    /// Start building a context
    pub fn builder(target: impl Into<TypeKey>) -> ClassContextBuilder {
        ClassContextBuilder {
            context: Self::new(target),
            duplicate: None,
        }
    }

    /// Target type
    pub fn target(&self) -> &TypeKey {
        &self.target
    }

    /// Mixin entries in declaration order
    pub fn mixins(&self) -> &[MixinContext] {
        &self.mixins
    }

    /// Complete interface markers
    pub fn complete_interfaces(&self) -> &BTreeSet<TypeKey> {
        &self.complete_interfaces
    }

    /// Entry for a mixin type
    pub fn mixin(&self, mixin_type: &TypeKey) -> Option<&MixinContext> {
        self.mixins.iter().find(|m| &m.mixin_type == mixin_type)
    }

    /// Whether the mixin type is configured
    pub fn contains_mixin(&self, mixin_type: &TypeKey) -> bool {
        self.mixin(mixin_type).is_some()
    }

    /// Declaration position of a mixin type
    pub fn declaration_index(&self, mixin_type: &TypeKey) -> Option<usize> {
        self.mixins.iter().position(|m| &m.mixin_type == mixin_type)
    }

    /// Check the context for repeated mixins
    ///
    /// # Errors
    ///
    /// Returns an error naming the first repeated mixin
    pub fn validate(&self) -> CompositionResult<()> {
        let mut seen = BTreeSet::new();
        for mixin in &self.mixins {
            if !seen.insert(&mixin.mixin_type) {
                return Err(CompositionError::DuplicateMixin {
                    target: self.target.to_string(),
                    mixin: mixin.mixin_type.to_string(),
                });
            }
        }
        Ok(())
    }
}

// Declaration order is part of the identity: the sorter breaks ties by it,
// so two contexts listing the same mixins differently may compose differently.
impl PartialEq for ClassContext {
    fn eq(&self, other: &Self) -> bool {
        self.target == other.target
            && self.complete_interfaces == other.complete_interfaces
            && self.mixins == other.mixins
    }
}

impl Eq for ClassContext {}

impl Hash for ClassContext {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.target.hash(state);
        self.complete_interfaces.hash(state);
        self.mixins.hash(state);
    }
}

/// Fluent builder for [`ClassContext`]
#[derive(Debug, Clone)]
pub struct ClassContextBuilder {
    context: ClassContext,
    duplicate: Option<TypeKey>,
}

impl ClassContextBuilder {
    /// Add an extending mixin
    pub fn mixin(self, mixin_type: impl Into<TypeKey>) -> Self {
        self.mixin_context(MixinContext::new(mixin_type))
    }

    /// Add a fully described mixin entry
    pub fn mixin_context(mut self, mixin: MixinContext) -> Self {
        if self.duplicate.is_none() && self.context.contains_mixin(&mixin.mixin_type) {
            self.duplicate = Some(mixin.mixin_type.clone());
        }
        self.context.mixins.push(mixin);
        self
    }

    /// Add a complete interface marker
    pub fn complete_interface(mut self, capability: impl Into<TypeKey>) -> Self {
        self.context.complete_interfaces.insert(capability.into());
        self
    }

    /// Finish the context
    ///
    /// # Errors
    ///
    /// Returns an error if a mixin was added twice
    pub fn build(self) -> CompositionResult<ClassContext> {
        if let Some(mixin) = self.duplicate {
            return Err(CompositionError::DuplicateMixin {
                target: self.context.target.to_string(),
                mixin: mixin.to_string(),
            });
        }
        Ok(self.context)
    }
}

/// Set of class contexts, one per target
///
/// This is the surface a configuration loader fills in; the core only reads
/// [`ClassContext`]s out of it.
#[derive(Debug, Clone, Default, Serialize, JsonSchema)]
pub struct MixinConfiguration {
    classes: Vec<ClassContext>,
    #[serde(skip)]
    index: IndexMap<TypeKey, usize>,
}

impl MixinConfiguration {
    /// Empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the context of a target
    ///
    /// # Errors
    ///
    /// Returns an error if the context repeats a mixin
    pub fn add_class(&mut self, context: ClassContext) -> CompositionResult<()> {
        context.validate()?;
        match self.index.get(context.target()) {
            Some(&position) => self.classes[position] = context,
            None => {
                self.index.insert(context.target().clone(), self.classes.len());
                self.classes.push(context);
            }
        }
        Ok(())
    }

    /// Start or extend the context of a target
    pub fn for_class(&mut self, target: impl Into<TypeKey>) -> ConfigurationEntry<'_> {
        let target = target.into();
        let position = match self.index.get(&target) {
            Some(&position) => position,
            None => {
                self.index.insert(target.clone(), self.classes.len());
                self.classes.push(ClassContext::new(target));
                self.classes.len() - 1
            }
        };
        ConfigurationEntry {
            context: &mut self.classes[position],
        }
    }

    /// Context configured for a target
    pub fn class_context(&self, target: &TypeKey) -> Option<&ClassContext> {
        self.index.get(target).map(|&position| &self.classes[position])
    }

    /// All configured contexts in insertion order
    pub fn class_contexts(&self) -> impl Iterator<Item = &ClassContext> {
        self.classes.iter()
    }

    /// Load a configuration document
    ///
    /// # Errors
    ///
    /// Returns an error for malformed JSON, repeated targets or repeated mixins
    pub fn from_json(json: &str) -> CompositionResult<Self> {
        #[derive(Deserialize)]
        struct Document {
            classes: Vec<ClassContext>,
        }

        let document: Document = serde_json::from_str(json)?;
        let mut configuration = Self::new();
        for context in document.classes {
            if configuration.index.contains_key(context.target()) {
                return Err(CompositionError::Serialization(format!(
                    "target {} is configured more than once",
                    context.target()
                )));
            }
            configuration.add_class(context)?;
        }
        Ok(configuration)
    }

    /// Write the configuration document
    pub fn to_json(&self) -> CompositionResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Mutable access to one target's context inside a [`MixinConfiguration`]
pub struct ConfigurationEntry<'a> {
    context: &'a mut ClassContext,
}

impl ConfigurationEntry<'_> {
    /// Add an extending mixin
    ///
    /// # Errors
    ///
    /// Returns an error if the mixin is already configured for this target
    pub fn add_mixin(self, mixin_type: impl Into<TypeKey>) -> CompositionResult<Self> {
        self.add_mixin_context(MixinContext::new(mixin_type))
    }

    /// Add a fully described mixin entry
    ///
    /// # Errors
    ///
    /// Returns an error if the mixin is already configured for this target
    pub fn add_mixin_context(self, mixin: MixinContext) -> CompositionResult<Self> {
        if self.context.contains_mixin(&mixin.mixin_type) {
            return Err(CompositionError::DuplicateMixin {
                target: self.context.target.to_string(),
                mixin: mixin.mixin_type.to_string(),
            });
        }
        self.context.mixins.push(mixin);
        Ok(self)
    }

    /// Add a complete interface marker
    pub fn add_complete_interface(self, capability: impl Into<TypeKey>) -> Self {
        self.context.complete_interfaces.insert(capability.into());
        self
    }

    /// Snapshot of the context as configured so far
    pub fn context(&self) -> ClassContext {
        self.context.clone()
    }
}
