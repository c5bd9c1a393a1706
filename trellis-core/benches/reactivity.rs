//! Micro-benchmarks for the hot paths: tracked reads, write propagation,
//! and cached derived reads.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use trellis_core::reactive::{ComputationOptions, Runtime};
use trellis_core::value::Value;

fn tracked_read(c: &mut Criterion) {
    c.bench_function("tracked_read", |b| {
        let runtime = Runtime::new();
        let state = runtime.wrap(Value::record([("x", Value::number(1.0))]));
        let handle = state.as_handle().expect("records wrap").clone();

        b.iter(|| black_box(handle.get("x")));
    });
}

fn write_propagation(c: &mut Criterion) {
    c.bench_function("write_propagation_16_observers", |b| {
        let runtime = Runtime::new();
        let state = runtime.wrap(Value::record([("x", Value::number(0.0))]));
        let handle = state.as_handle().expect("records wrap").clone();

        let _observers: Vec<_> = (0..16)
            .map(|_| {
                let handle = handle.clone();
                runtime.create_computation(move || handle.get("x"), ComputationOptions::default())
            })
            .collect();

        let mut n = 0.0;
        b.iter(|| {
            n += 1.0;
            handle.set("x", Value::number(n)).expect("write");
        });
    });
}

fn derived_cached_read(c: &mut Criterion) {
    c.bench_function("derived_cached_read", |b| {
        let runtime = Runtime::new();
        let cell = runtime.cell(Value::number(1.0));
        let derived = {
            let cell = cell.clone();
            runtime.derive(move || cell.get())
        };
        derived.get();

        b.iter(|| black_box(derived.get()));
    });
}

criterion_group!(benches, tracked_read, write_propagation, derived_cached_read);
criterion_main!(benches);
