//! Atomics Performance Benchmarks
//!
//! Measures the cost of validation plus dispatch for `Atomics.add`,
//! `Atomics.compareExchange` and `Atomics.load`, single-threaded and under
//! contention.

use criterion::{Criterion, criterion_group, criterion_main};
use heron_vm_core::array_buffer::allocate_shared_array_buffer;
use heron_vm_core::typed_array_helper::create_from_array_buffer;
use heron_vm_core::{Agent, AgentConfig, ElementKind, Value, atomics};
use num_bigint::BigInt;
use std::hint::black_box;
use std::thread;

fn shared_array(kind: ElementKind, len: usize) -> Value {
    let agent = Agent::new(AgentConfig::default());
    let buffer = allocate_shared_array_buffer(&agent, (len * kind.element_size()) as u64).unwrap();
    Value::typed_array(
        create_from_array_buffer(kind, &buffer, &Value::undefined(), &Value::undefined()).unwrap(),
    )
}

/// Benchmark: Atomics.add on each integer width
fn bench_add_per_kind(c: &mut Criterion) {
    let mut group = c.benchmark_group("atomics_add");
    for kind in [ElementKind::Int8, ElementKind::Uint16, ElementKind::Int32, ElementKind::Uint32] {
        let ta = shared_array(kind, 16);
        let idx = Value::int32(3);
        let one = Value::int32(1);
        group.bench_function(kind.name(), |b| {
            b.iter(|| black_box(atomics::add(black_box(&ta), &idx, &one).unwrap()));
        });
    }

    let ta = shared_array(ElementKind::BigInt64, 16);
    let idx = Value::int32(3);
    let one = Value::bigint(BigInt::from(1));
    group.bench_function("BigInt64Array", |b| {
        b.iter(|| black_box(atomics::add(black_box(&ta), &idx, &one).unwrap()));
    });
    group.finish();
}

/// Benchmark: compareExchange hit and miss
fn bench_compare_exchange(c: &mut Criterion) {
    let ta = shared_array(ElementKind::Int32, 4);
    let idx = Value::int32(0);
    let zero = Value::int32(0);
    let seven = Value::int32(7);

    c.bench_function("compare_exchange_hit", |b| {
        b.iter(|| black_box(atomics::compare_exchange(&ta, &idx, &zero, &zero).unwrap()));
    });
    c.bench_function("compare_exchange_miss", |b| {
        b.iter(|| black_box(atomics::compare_exchange(&ta, &idx, &seven, &zero).unwrap()));
    });
}

/// Benchmark: Atomics.load
fn bench_load(c: &mut Criterion) {
    let ta = shared_array(ElementKind::Int32, 4);
    let idx = Value::int32(2);
    c.bench_function("load_int32", |b| {
        b.iter(|| black_box(atomics::load(black_box(&ta), &idx).unwrap()));
    });
}

/// Benchmark: four threads adding into one element
fn bench_contended_add(c: &mut Criterion) {
    let ta = shared_array(ElementKind::Int32, 1);
    c.bench_function("contended_add_4x1000", |b| {
        b.iter(|| {
            let threads: Vec<_> = (0..4)
                .map(|_| {
                    let ta = ta.clone();
                    thread::spawn(move || {
                        let idx = Value::int32(0);
                        let one = Value::int32(1);
                        for _ in 0..1000 {
                            atomics::add(&ta, &idx, &one).unwrap();
                        }
                    })
                })
                .collect();
            for t in threads {
                t.join().unwrap();
            }
        });
    });
}

criterion_group!(
    benches,
    bench_add_per_kind,
    bench_compare_exchange,
    bench_load,
    bench_contended_add
);
criterion_main!(benches);
