//! # Memory Pool Benchmark
//!
//! Level loads churn thousands of small allocations; per-frame gameplay
//! walks and edits lists of a few hundred items.
//!
//! Run with: `cargo bench --package jedi_core`

// Benchmarks don't need docs
#![allow(missing_docs)]

use bytemuck::{Pod, Zeroable};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use jedi_core::{ChunkedSlotArray, ListAllocator, Region};

/// Block size used by the level region in the runtime defaults.
const BLOCK_SIZE: usize = 64 * 1024;

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct Elevator {
    sector: u32,
    speed: i32,
    key: u64,
}

/// Benchmark: fill a region with small allocations, then clear it.
fn bench_region_alloc_clear(c: &mut Criterion) {
    let mut group = c.benchmark_group("region_alloc_clear");

    for count in [1_000usize, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let mut region = Region::new("level", BLOCK_SIZE).unwrap();
            b.iter(|| {
                for size in (0..count).map(|i| 16 + (i % 8) * 8) {
                    black_box(region.alloc(size).ok());
                }
                region.clear();
            });
        });
    }

    group.finish();
}

/// Benchmark: slot alloc/free churn (LIFO reuse path).
fn bench_slot_churn(c: &mut Criterion) {
    let mut region = Region::new("level", BLOCK_SIZE).unwrap();
    let mut array: ChunkedSlotArray<Elevator> =
        ChunkedSlotArray::new(256, 4, &mut region).unwrap();

    c.bench_function("slot_alloc_free_1k", |b| {
        b.iter(|| {
            let slots: Vec<_> = (0..1_000).filter_map(|_| array.alloc(&mut region).ok()).collect();
            for slot in slots {
                black_box(array.free(slot).ok());
            }
        });
    });
}

/// Benchmark: walk a list deleting every third item, then refill it.
fn bench_list_walk_delete(c: &mut Criterion) {
    let mut region = Region::new("level", BLOCK_SIZE).unwrap();
    let mut list: ListAllocator<Elevator> = ListAllocator::new(&mut region).unwrap();

    c.bench_function("list_walk_delete_refill_300", |b| {
        b.iter(|| {
            while list.len() < 300 {
                black_box(list.new_item(&mut region).ok());
            }
            let mut step = 0u32;
            while let Some(id) = list.next_item() {
                if step % 3 == 0 {
                    black_box(list.delete_item(id).ok());
                }
                step += 1;
            }
        });
    });
}

criterion_group!(benches, bench_region_alloc_clear, bench_slot_churn, bench_list_walk_delete);
criterion_main!(benches);
