// Copyright 2025 Cowboy AI, LLC.

//! Property tests: dispatch chains and dependency sorting

use cim_mixin::{
    ClassContext, ClassType, Composer, DependencySorter, Dispatch, MemberDecl, MemberRef,
    MixinType, OverrideChain, TypeCatalog, TypeKey,
};
use proptest::prelude::*;
use serde_json::json;

fn mixin_name(index: usize) -> String {
    format!("M{index}")
}

fn chain_catalog(count: usize, overriders: &[bool]) -> TypeCatalog {
    let mut catalog = TypeCatalog::new();
    catalog
        .register_class(
            ClassType::new("Report")
                .member(MemberDecl::method("Describe").body(|_, _| Ok(json!("Target")))),
        )
        .unwrap();
    for index in 0..count {
        let name = mixin_name(index);
        let mixin = if overriders[index] {
            let label = name.clone();
            MixinType::new(name.as_str())
                .accepts_declaration_order()
                .member(MemberDecl::method("Describe").overriding_target().body(
                    move |ctx, args| {
                        let next = ctx.call_next("Describe", args)?;
                        Ok(json!(format!("{label}>{}", next.as_str().unwrap_or_default())))
                    },
                ))
        } else {
            MixinType::new(name.as_str())
        };
        catalog.register_mixin(mixin).unwrap();
    }
    catalog
}

fn expected_chain(depth: usize, overriders: &[bool]) -> String {
    let mut parts: Vec<String> = overriders
        .iter()
        .enumerate()
        .skip(depth)
        .filter(|(_, overrides)| **overrides)
        .map(|(index, _)| mixin_name(index))
        .collect();
    parts.push("Target".to_string());
    parts.join(">")
}

proptest! {
    /// Entering at any depth runs exactly the overrides at or below it, in order
    #[test]
    fn chain_visits_overrides_at_or_below_depth(
        overriders in proptest::collection::vec(any::<bool>(), 1..10)
    ) {
        let count = overriders.len();
        let composer = Composer::new(chain_catalog(count, &overriders));
        let mut builder = ClassContext::builder("Report");
        for index in 0..count {
            builder = builder.mixin(mixin_name(index));
        }
        let context = builder.build().unwrap();
        let mut report = composer.create_instance(&context).unwrap();

        prop_assert_eq!(report.proxies().len(), count + 1);
        for depth in 0..=count {
            let proxy = report.proxies()[depth];
            let described = report.invoke_at(proxy, "Describe", &[]).unwrap();
            prop_assert_eq!(described, json!(expected_chain(depth, &overriders)));
        }
    }

    /// Every table slot points at the first override at or after its depth
    #[test]
    fn chain_table_selects_nearest_override(
        positions in proptest::collection::btree_set(0usize..16, 0..6)
    ) {
        let count = 16;
        let overriders: Vec<MemberRef> = positions.iter().map(|&p| MemberRef::mixin(p, 0)).collect();
        let chain = OverrideChain::build(MemberRef::target(0), overriders, count);

        prop_assert_eq!(chain.table().len(), count + 1);
        for depth in 0..=count {
            match (chain.at(depth), positions.range(depth..).next()) {
                (Dispatch::Mixin { index, next_depth, .. }, Some(&expected)) => {
                    prop_assert_eq!(index, expected);
                    prop_assert_eq!(next_depth, expected + 1);
                }
                (Dispatch::Target { member }, None) => {
                    prop_assert_eq!(member, MemberRef::target(0));
                }
                (dispatch, expected) => {
                    prop_assert!(false, "depth {} dispatched to {:?}, expected {:?}", depth, dispatch, expected);
                }
            }
        }
    }
}

/// Random dependency graph over `n` mixins, declared in a shuffled order;
/// edges only point from lower to higher indices so the graph is acyclic
fn dependency_graph() -> impl Strategy<Value = (usize, Vec<(usize, usize)>, Vec<usize>)> {
    (2usize..8).prop_flat_map(|n| {
        let pairs: Vec<(usize, usize)> = (0..n)
            .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
            .collect();
        let edges = proptest::sample::subsequence(pairs.clone(), 0..=pairs.len());
        let declared = Just((0..n).collect::<Vec<_>>()).prop_shuffle();
        (Just(n), edges, declared)
    })
}

fn sorter_fixture(
    n: usize,
    edges: &[(usize, usize)],
    declared: &[usize],
) -> (TypeCatalog, ClassContext) {
    let mut catalog = TypeCatalog::new();
    catalog.register_class(ClassType::new("T")).unwrap();
    for index in 0..n {
        let mut mixin = MixinType::new(mixin_name(index));
        for (before, _) in edges.iter().filter(|(_, after)| *after == index) {
            mixin = mixin.depends_on(mixin_name(*before));
        }
        catalog.register_mixin(mixin).unwrap();
    }
    let mut builder = ClassContext::builder("T");
    for index in declared {
        builder = builder.mixin(mixin_name(*index));
    }
    (catalog, builder.build().unwrap())
}

proptest! {
    /// The sorted order honors every dependency edge
    #[test]
    fn sorted_order_respects_dependencies((n, edges, declared) in dependency_graph()) {
        let (catalog, context) = sorter_fixture(n, &edges, &declared);
        let order = DependencySorter::new(&catalog).sort(&context).unwrap();

        prop_assert_eq!(order.len(), n);
        for (before, after) in &edges {
            let b = order.index_of(&TypeKey::new(mixin_name(*before))).unwrap();
            let a = order.index_of(&TypeKey::new(mixin_name(*after))).unwrap();
            prop_assert!(b < a, "{} must precede {}", before, after);
            prop_assert!(order.is_ordered(b, a));
        }
    }

    /// Sorting the same context twice gives the same order
    #[test]
    fn sorting_is_deterministic((n, edges, declared) in dependency_graph()) {
        let (catalog, context) = sorter_fixture(n, &edges, &declared);
        let first = DependencySorter::new(&catalog).sort(&context).unwrap();
        let second = DependencySorter::new(&catalog.clone()).sort(&context.clone()).unwrap();
        prop_assert_eq!(first, second);
    }

    /// Without dependencies declaration order is kept
    #[test]
    fn unconstrained_mixins_keep_declaration_order(
        declared in Just((0..6usize).collect::<Vec<_>>()).prop_shuffle()
    ) {
        let (catalog, context) = sorter_fixture(6, &[], &declared);
        let order = DependencySorter::new(&catalog).sort(&context).unwrap();
        let expected: Vec<TypeKey> = declared.iter().map(|i| TypeKey::new(mixin_name(*i))).collect();
        prop_assert_eq!(order.mixins().to_vec(), expected);
    }
}
