// Copyright 2025 Cowboy AI, LLC.

use cim_mixin::{
    ClassContext, ClassType, Composer, MemberDecl, MixinType, SerializationBridge, TypeCatalog,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;

fn catalog(mixins: usize) -> TypeCatalog {
    let mut catalog = TypeCatalog::new();
    catalog
        .register_class(
            ClassType::new("Counter")
                .field("value", json!(1))
                .member(MemberDecl::method("Value").body(|ctx, _| {
                    Ok(ctx.field("value").cloned().unwrap_or(json!(0)))
                })),
        )
        .unwrap();
    for index in 0..mixins {
        catalog
            .register_mixin(
                MixinType::new(format!("Add{index}"))
                    .accepts_declaration_order()
                    .member(MemberDecl::method("Value").overriding_target().body(
                        |ctx, args| {
                            let base = ctx.call_next("Value", args)?.as_i64().unwrap_or(0);
                            Ok(json!(base + 1))
                        },
                    )),
            )
            .unwrap();
    }
    catalog
}

fn context(mixins: usize) -> ClassContext {
    let mut builder = ClassContext::builder("Counter");
    for index in 0..mixins {
        builder = builder.mixin(format!("Add{index}"));
    }
    builder.build().unwrap()
}

fn benchmark_cached_compose(c: &mut Criterion) {
    let composer = Composer::new(catalog(8));
    let context = context(8);
    composer.compose(&context).unwrap();

    c.bench_function("compose_cached_8_mixins", |b| {
        b.iter(|| black_box(composer.compose(black_box(&context)).unwrap()));
    });
}

fn benchmark_chain_invoke(c: &mut Criterion) {
    let mut group = c.benchmark_group("invoke_chain");
    for mixins in [0usize, 1, 4, 16] {
        let composer = Composer::new(catalog(mixins));
        let mut object = composer.create_instance(&context(mixins)).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(mixins), &mixins, |b, _| {
            b.iter(|| black_box(object.invoke("Value", &[]).unwrap()));
        });
    }
    group.finish();
}

fn benchmark_create_instance(c: &mut Criterion) {
    let composer = Composer::new(catalog(8));
    let context = context(8);

    c.bench_function("create_instance_8_mixins", |b| {
        b.iter(|| black_box(composer.create_instance(&context).unwrap()));
    });
}

fn benchmark_snapshot_round_trip(c: &mut Criterion) {
    let composer = Composer::new(catalog(4));
    let object = composer.create_instance(&context(4)).unwrap();
    let bridge = SerializationBridge::new(composer);

    c.bench_function("snapshot_round_trip_4_mixins", |b| {
        b.iter(|| {
            let snapshot = bridge.serialize(&object).unwrap();
            black_box(bridge.deserialize(&snapshot).unwrap())
        });
    });
}

criterion_group!(
    benches,
    benchmark_cached_compose,
    benchmark_chain_invoke,
    benchmark_create_instance,
    benchmark_snapshot_round_trip
);
criterion_main!(benches);
