//! # Scheduler Benchmark
//!
//! A busy level keeps a few hundred timed tasks alive; one tick must stay
//! far below a frame.
//!
//! Run with: `cargo bench --package jedi_tasks`

// Benchmarks don't need docs
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use jedi_core::Region;
use jedi_tasks::{Fixed16, SchedulerConfig, TaskContext, TaskScheduler, TaskStep};

/// Task body that wakes every few ticks, staggered by its slot.
fn pulse(ctx: &mut TaskContext<'_, u64>) -> TaskStep {
    *ctx.world() += 1;
    let spread = i32::try_from(ctx.id().index() % 7).unwrap_or(0);
    TaskStep::loop_after(Fixed16::from_ticks(1 + spread))
}

/// Benchmark: one tick over N looping tasks.
fn bench_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler_tick");

    for count in [64usize, 256, 1024] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let mut region = Region::new("level", 64 * 1024).unwrap();
            let mut counter = 0u64;
            let mut scheduler: TaskScheduler<u64> = TaskScheduler::new(SchedulerConfig {
                max_tasks: count,
                max_active: count,
                max_ready: count,
            });
            for _ in 0..count {
                scheduler.push_task("pulse", pulse).unwrap();
            }

            b.iter(|| black_box(scheduler.run_tasks(&mut region, &mut counter, Fixed16::ONE).ok()));
        });
    }

    group.finish();
}

/// Benchmark: create, activate and free tasks.
fn bench_task_churn(c: &mut Criterion) {
    let mut region = Region::new("level", 64 * 1024).unwrap();
    let mut scheduler: TaskScheduler<u64> = TaskScheduler::default();

    c.bench_function("push_free_256", |b| {
        b.iter(|| {
            let ids: Vec<_> = (0..256).filter_map(|_| scheduler.push_task("pulse", pulse).ok()).collect();
            for id in ids {
                black_box(scheduler.free_task(&mut region, id).ok());
            }
        });
    });
}

criterion_group!(benches, bench_tick, bench_task_churn);
criterion_main!(benches);
