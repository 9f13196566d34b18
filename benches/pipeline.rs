//! Benchmarks for the optimization pipeline.
//!
//! Measures the stages that scale with body size:
//! - SSA construction over loop-carried slots
//! - The full pipeline including effect refinement and costing
//! - Parallel optimization of many independent bodies

extern crate ssaopt;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use ssaopt::{
    ir::{CodeBuilder, CodeInfo, Expr, Intrinsic, IrType, Value},
    ssa::{convert_to_ircode, slot2reg},
    OptimizerConfig, Optimizer,
};
use std::hint::black_box;

/// A loop updating `slots` accumulators on each iteration.
///
/// ```text
/// i = 0; a_k = k
/// while i < n { a_k = a_k + i; i = i + 1 }
/// return a_0
/// ```
fn loop_body(name: &str, slots: usize) -> CodeInfo {
    let mut b = CodeBuilder::new(name, &[IrType::Int]);
    let i = b.slot("i", IrType::Int);
    let accs: Vec<usize> = (0..slots)
        .map(|k| b.slot(&format!("a{k}"), IrType::Int))
        .collect();
    b.store(i, Value::int(0));
    for (k, &acc) in accs.iter().enumerate() {
        b.store(acc, Value::int(k as i64));
    }

    let head = b.new_label();
    let exit = b.new_label();
    b.bind(head);
    let cond = b.expr(
        Expr::intrinsic(Intrinsic::SltInt, vec![Value::Slot(i), Value::Argument(0)]),
        IrType::Bool,
    );
    b.goto_if_not(cond, exit);
    for &acc in &accs {
        b.store(
            acc,
            Expr::intrinsic(Intrinsic::AddInt, vec![Value::Slot(acc), Value::Slot(i)]),
        );
    }
    b.store(
        i,
        Expr::intrinsic(Intrinsic::AddInt, vec![Value::Slot(i), Value::int(1)]),
    );
    b.goto(head);
    b.bind(exit);
    b.ret(Value::Slot(accs[0]));
    b.finish().unwrap()
}

/// Benchmark slot-to-SSA conversion.
fn bench_slot2reg(c: &mut Criterion) {
    let mut group = c.benchmark_group("slot2reg");
    for slots in [4, 32, 256] {
        let code = loop_body("f", slots);
        group.bench_with_input(BenchmarkId::from_parameter(slots), &code, |b, code| {
            b.iter(|| {
                let mut ir = convert_to_ircode(black_box(code), false).unwrap();
                let stats = slot2reg(&mut ir, code).unwrap();
                black_box(stats)
            });
        });
    }
    group.finish();
}

/// Benchmark the full pipeline of a single body.
fn bench_optimize(c: &mut Criterion) {
    let config = OptimizerConfig::default().with_verification(false);
    let mut group = c.benchmark_group("optimize");
    for slots in [4, 32, 256] {
        let code = loop_body("f", slots);
        group.bench_with_input(BenchmarkId::from_parameter(slots), &code, |b, code| {
            b.iter(|| {
                let optimizer = Optimizer::new(config.clone());
                black_box(optimizer.optimize(black_box(code)).unwrap())
            });
        });
    }
    group.finish();
}

/// Benchmark optimizing many bodies on the thread pool.
fn bench_optimize_all(c: &mut Criterion) {
    let config = OptimizerConfig::default().with_verification(false);
    let codes: Vec<CodeInfo> = (0..64).map(|n| loop_body(&format!("f{n}"), 16)).collect();

    c.bench_function("optimize_all_64", |b| {
        b.iter(|| {
            let optimizer = Optimizer::new(config.clone());
            black_box(optimizer.optimize_all(black_box(&codes)))
        });
    });
}

criterion_group!(benches, bench_slot2reg, bench_optimize, bench_optimize_all);
criterion_main!(benches);
