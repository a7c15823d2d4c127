// Copyright 2025 Cowboy AI, LLC.

//! Concurrent composition: at most one synthesis per class context

use cim_mixin::{
    ClassContext, ClassType, Composer, CompositionCache, MemberDecl, MixinType, TypeCatalog,
};
use serde_json::json;
use std::sync::{Arc, Barrier};
use std::thread;

fn catalog() -> TypeCatalog {
    let mut catalog = TypeCatalog::new();
    catalog
        .register_class(
            ClassType::new("Account")
                .field("balance", json!(100))
                .member(MemberDecl::method("Balance").body(|ctx, _| {
                    Ok(ctx.field("balance").cloned().unwrap_or(json!(0)))
                })),
        )
        .unwrap();
    catalog
        .register_mixin(MixinType::new("Overdraft").member(
            MemberDecl::method("Balance")
                .overriding_target()
                .body(|ctx, args| {
                    let base = ctx.call_next("Balance", args)?.as_i64().unwrap_or(0);
                    Ok(json!(base + 50))
                }),
        ))
        .unwrap();
    catalog.register_mixin(MixinType::new("Audit")).unwrap();
    catalog
}

/// Test threads racing on a context share a single composition per context
///
/// ```mermaid
/// sequenceDiagram
///     participant T as 16 threads
///     participant C as CompositionCache
///     T->>C: compose(Account + [Overdraft, Audit])
///     T->>C: compose(Account + [Audit, Overdraft])
///     C->>C: synthesize once per declaration order
///     C-->>T: shared Arc<Composition> per context
/// ```
#[test]
fn test_concurrent_compose_synthesizes_once() {
    let composer = Composer::new(catalog());
    let barrier = Arc::new(Barrier::new(16));

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let composer = composer.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                // half the threads declare the mixins in the other order
                let context = if i % 2 == 0 {
                    ClassContext::builder("Account").mixin("Overdraft").mixin("Audit")
                } else {
                    ClassContext::builder("Account").mixin("Audit").mixin("Overdraft")
                }
                .build()
                .unwrap();
                barrier.wait();
                let composition = composer.compose(&context).unwrap();
                let mut account = composition.create_instance(Vec::new()).unwrap();
                let balance = account.invoke("Balance", &[]).unwrap();
                (composition, balance)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for (i, (composition, balance)) in results.iter().enumerate() {
        // one composition per declaration order
        assert!(Arc::ptr_eq(composition, &results[i % 2].0));
        assert_eq!(balance, &json!(150));
    }
    assert!(!Arc::ptr_eq(&results[0].0, &results[1].0));

    let stats = composer.cache().compositions().stats();
    assert_eq!(stats.syntheses, 2);
    assert_eq!(stats.entries, 2);
    assert_eq!(stats.hits + stats.misses, 16);
    assert_eq!(composer.cache().orders().stats().syntheses, 2);
}

/// Test composers sharing a cache share compositions
#[test]
fn test_shared_cache_across_composers() {
    let cache = Arc::new(CompositionCache::new());
    let catalog = Arc::new(catalog());
    let first = Composer::with_cache(Arc::clone(&catalog), Arc::clone(&cache));
    let second = Composer::with_cache(catalog, Arc::clone(&cache));
    let context = ClassContext::builder("Account").mixin("Audit").build().unwrap();

    let a = first.compose(&context).unwrap();
    let b = second.compose(&context).unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(cache.compositions().stats().syntheses, 1);

    cache.clear();
    let c = second.compose(&context).unwrap();
    assert!(!Arc::ptr_eq(&a, &c));
    assert_eq!(cache.compositions().stats().syntheses, 2);
}

/// Test distinct contexts get distinct compositions under concurrency
#[test]
fn test_distinct_contexts_in_parallel() {
    let composer = Composer::new(catalog());
    let handles: Vec<_> = ["Audit", "Overdraft"]
        .into_iter()
        .flat_map(|mixin| (0..4).map(move |_| mixin))
        .map(|mixin| {
            let composer = composer.clone();
            thread::spawn(move || {
                let context = ClassContext::builder("Account").mixin(mixin).build().unwrap();
                composer.compose(&context).unwrap()
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(composer.cache().compositions().len(), 2);
    assert_eq!(composer.cache().compositions().stats().syntheses, 2);
}
