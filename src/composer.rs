// Copyright 2025 Cowboy AI, LLC.

//! Composer: the entry point tying the pipeline, caches and instance
//! creation together
//!
//! ```text
//! ClassContext
//!   -> DependencySorter      (MixinOrder, cached)
//!   -> DefinitionBuilder     (TargetClassDefinition)
//!   -> OverrideResolver      (override edges)
//!   -> RequirementAnalyzer   (dependencies)
//!   -> CompositionSynthesizer (dispatch plan, cached)
//! ```

use std::sync::Arc;
use tracing::{debug, instrument};

use crate::cache::CompositionCache;
use crate::catalog::TypeCatalog;
use crate::context::{ClassContext, MixinConfiguration};
use crate::definition::DefinitionBuilder;
use crate::errors::CompositionResult;
use crate::identifiers::TypeKey;
use crate::overrides::OverrideResolver;
use crate::requirements::RequirementAnalyzer;
use crate::runtime::{ComposedObject, MixinInstance, MixinInstantiationScope};
use crate::sorter::{DependencySorter, MixinOrder};
use crate::synthesis::{Composition, CompositionSynthesizer};

/// Composes targets with their mixins against one catalog
///
/// # Examples
///
/// ```rust
/// use cim_mixin::{ClassContext, ClassType, Composer, MemberDecl, MixinType, TypeCatalog};
/// use serde_json::json;
///
/// let mut catalog = TypeCatalog::new();
/// catalog
///     .register_class(ClassType::new("Order").member(MemberDecl::method("Total").body(|_, _| Ok(json!(100)))))
///     .unwrap();
/// catalog
///     .register_mixin(MixinType::new("Discount").member(
///         MemberDecl::method("Total")
///             .overriding_target()
///             .body(|ctx, args| {
///                 let base = ctx.call_next("Total", args)?;
///                 Ok(json!(base.as_i64().unwrap_or(0) - 10))
///             }),
///     ))
///     .unwrap();
///
/// let composer = Composer::new(catalog);
/// let context = ClassContext::builder("Order").mixin("Discount").build().unwrap();
/// let mut order = composer.create_instance(&context).unwrap();
/// assert_eq!(order.invoke("Total", &[]).unwrap(), json!(90));
/// ```
#[derive(Debug, Clone)]
pub struct Composer {
    catalog: Arc<TypeCatalog>,
    cache: Arc<CompositionCache>,
}

impl Composer {
    /// Create a composer with its own, empty cache
    pub fn new(catalog: TypeCatalog) -> Self {
        Self::with_cache(Arc::new(catalog), Arc::new(CompositionCache::new()))
    }

    /// Create a composer sharing a catalog and cache
    pub fn with_cache(catalog: Arc<TypeCatalog>, cache: Arc<CompositionCache>) -> Self {
        Self { catalog, cache }
    }

    /// Catalog types are resolved against
    pub fn catalog(&self) -> &Arc<TypeCatalog> {
        &self.catalog
    }

    /// Cache of orders and compositions
    pub fn cache(&self) -> &Arc<CompositionCache> {
        &self.cache
    }

    /// Sorted mixins of a context, computed once per context
    ///
    /// # Errors
    ///
    /// Returns `DuplicateMixin`, `UnknownType` or `CyclicMixinDependency`
    pub fn mixin_order(&self, context: &ClassContext) -> CompositionResult<Arc<MixinOrder>> {
        context.validate()?;
        self.cache
            .orders()
            .get_or_try_insert_with(context, || DependencySorter::new(&self.catalog).sort(context))
    }

    /// Composition of a context, synthesized at most once per context even
    /// under concurrent requests
    ///
    /// # Errors
    ///
    /// Returns any configuration error found while building the composition;
    /// failed compositions are not cached
    pub fn compose(&self, context: &ClassContext) -> CompositionResult<Arc<Composition>> {
        context.validate()?;
        self.cache
            .compositions()
            .get_or_try_insert_with(context, || self.synthesize(context))
    }

    #[instrument(level = "debug", skip(self, context), fields(target_type = %context.target()))]
    fn synthesize(&self, context: &ClassContext) -> CompositionResult<Composition> {
        let order = self.mixin_order(context)?;
        let mut definition = DefinitionBuilder::new(&self.catalog).build(context, &order)?;
        OverrideResolver::new(&order).resolve(&mut definition)?;
        RequirementAnalyzer::new(&self.catalog).analyze(&mut definition)?;
        CompositionSynthesizer::synthesize(definition)
    }

    /// Create an object, consuming the instances supplied by the innermost
    /// [`MixinInstantiationScope`] on this thread
    ///
    /// # Errors
    ///
    /// Returns composition errors and instance errors
    pub fn create_instance(&self, context: &ClassContext) -> CompositionResult<ComposedObject> {
        let composition = self.compose(context)?;
        let supplied = MixinInstantiationScope::take_supplied();
        debug!(
            target_type = %context.target(),
            supplied = supplied.len(),
            "Creating composed object"
        );
        composition.create_instance(supplied)
    }

    /// Create an object with explicitly supplied mixin instances
    ///
    /// # Errors
    ///
    /// Returns composition errors and instance errors
    pub fn create_instance_with(
        &self,
        context: &ClassContext,
        supplied: Vec<MixinInstance>,
    ) -> CompositionResult<ComposedObject> {
        self.compose(context)?.create_instance(supplied)
    }

    /// Create an object for a target as configured; targets without an entry
    /// get no mixins
    ///
    /// # Errors
    ///
    /// Returns composition errors and instance errors
    pub fn create_configured(
        &self,
        configuration: &MixinConfiguration,
        target: &TypeKey,
    ) -> CompositionResult<ComposedObject> {
        match configuration.class_context(target) {
            Some(context) => self.create_instance(context),
            None => self.create_instance(&ClassContext::new(target.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ClassType, MixinType};
    use crate::errors::CompositionError;

    fn composer() -> Composer {
        let mut catalog = TypeCatalog::new();
        catalog.register_class(ClassType::new("Order")).unwrap();
        catalog.register_mixin(MixinType::new("Audit")).unwrap();
        catalog
            .register_mixin(MixinType::new("Loop").depends_on("Loop2"))
            .unwrap();
        catalog
            .register_mixin(MixinType::new("Loop2").depends_on("Loop"))
            .unwrap();
        Composer::new(catalog)
    }

    /// Test equal contexts share one composition
    #[test]
    fn test_compose_cached() {
        let composer = composer();
        let a = ClassContext::builder("Order").mixin("Audit").build().unwrap();
        let b = ClassContext::builder("Order").mixin("Audit").build().unwrap();

        let first = composer.compose(&a).unwrap();
        let second = composer.compose(&b).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(composer.cache().compositions().stats().syntheses, 1);
        assert_eq!(composer.cache().orders().len(), 1);
    }

    /// Test failed compositions are not cached
    #[test]
    fn test_failure_not_cached() {
        let composer = composer();
        let context = ClassContext::builder("Order").mixin("Loop").mixin("Loop2").build().unwrap();
        for _ in 0..2 {
            let err = composer.compose(&context).unwrap_err();
            assert!(matches!(err, CompositionError::CyclicMixinDependency { .. }));
        }
        assert!(composer.cache().compositions().is_empty());
        assert_eq!(composer.cache().compositions().stats().syntheses, 2);
    }

    /// Test unconfigured targets compose without mixins
    #[test]
    fn test_create_configured_without_entry() {
        let composer = composer();
        let configuration = MixinConfiguration::new();
        let object = composer
            .create_configured(&configuration, &TypeKey::new("Order"))
            .unwrap();
        assert!(object.extensions().is_empty());
        assert_eq!(object.proxies().len(), 1);
    }
}
