// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Benchmarks for the product ledger and bid evaluator.
//!
//! Run with: cargo bench
//!
//! Benchmarks include:
//! - Single-threaded product creation and bidding
//! - Parallel bidding on one hot product versus spread products
//! - Listing cost as the ledger grows
//! - Contention effects as bidders pile onto fewer products

use bidmarket_rs::{BidEvaluator, ProductDraft, ProductId, ProductLedger, UserId};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rayon::prelude::*;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

// =============================================================================
// Helper Functions
// =============================================================================

const SELLER: UserId = UserId(1);

fn make_draft(title: &str) -> ProductDraft {
    ProductDraft {
        title: title.to_string(),
        description: "benchmark listing".to_string(),
        starting_price: Decimal::new(10000, 4),
        image_ref: None,
    }
}

fn ledger_with_products(count: usize) -> (Arc<ProductLedger>, Vec<ProductId>) {
    let ledger = Arc::new(ProductLedger::new());
    let ids = (0..count)
        .map(|i| {
            ledger
                .create(SELLER, make_draft(&format!("lot {i}")))
                .unwrap()
                .id
        })
        .collect();
    (ledger, ids)
}

// =============================================================================
// Single-Threaded Benchmarks
// =============================================================================

fn bench_create_product(c: &mut Criterion) {
    c.bench_function("create_product", |b| {
        b.iter(|| {
            let ledger = ProductLedger::new();
            ledger
                .create(SELLER, black_box(make_draft("single")))
                .unwrap();
        })
    });
}

fn bench_single_bid(c: &mut Criterion) {
    c.bench_function("single_bid", |b| {
        b.iter(|| {
            let (ledger, ids) = ledger_with_products(1);
            let evaluator = BidEvaluator::new(ledger);
            evaluator
                .place_bid(ids[0], UserId(2), black_box(Decimal::new(20000, 4)))
                .unwrap();
        })
    });
}

fn bench_bid_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("bid_throughput");

    for count in [100, 1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter(|| {
                let (ledger, ids) = ledger_with_products(1);
                let evaluator = BidEvaluator::new(Arc::clone(&ledger));
                // Each bid must beat the last, so amounts climb by one cent.
                for i in 0..count {
                    let amount = Decimal::new(10001 + i as i64, 4);
                    evaluator.place_bid(ids[0], UserId(2), amount).unwrap();
                }
                black_box(&ledger);
            })
        });
    }
    group.finish();
}

// =============================================================================
// Multi-Threaded Benchmarks
// =============================================================================

fn bench_parallel_bids_hot_product(c: &mut Criterion) {
    let mut group = c.benchmark_group("parallel_bids_hot_product");

    for count in [1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter(|| {
                let (ledger, ids) = ledger_with_products(1);
                let evaluator = Arc::new(BidEvaluator::new(Arc::clone(&ledger)));
                let amount_counter = AtomicU64::new(10001);

                (0..count).into_par_iter().for_each(|i| {
                    let amount =
                        Decimal::new(amount_counter.fetch_add(1, Ordering::SeqCst) as i64, 4);
                    // Smaller racing amounts legitimately lose.
                    let _ = evaluator.place_bid(ids[0], UserId(2 + i as u64), amount);
                });

                black_box(&ledger);
            })
        });
    }
    group.finish();
}

fn bench_parallel_bids_spread_products(c: &mut Criterion) {
    let mut group = c.benchmark_group("parallel_bids_spread_products");

    for count in [1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            b.iter(|| {
                let (ledger, ids) = ledger_with_products(1_000);
                let evaluator = Arc::new(BidEvaluator::new(Arc::clone(&ledger)));
                let amount_counter = AtomicU64::new(10001);

                (0..count).into_par_iter().for_each(|i| {
                    let id = ids[i % ids.len()];
                    let amount =
                        Decimal::new(amount_counter.fetch_add(1, Ordering::SeqCst) as i64, 4);
                    let _ = evaluator.place_bid(id, UserId(2 + i as u64), amount);
                });

                black_box(&ledger);
            })
        });
    }
    group.finish();
}

fn bench_contention(c: &mut Criterion) {
    let mut group = c.benchmark_group("contention");
    let total_bids = 10_000usize;

    // Fewer products = more bidders competing for the same record lock.
    for num_products in [1, 10, 100, 1_000].iter() {
        group.throughput(Throughput::Elements(total_bids as u64));
        group.bench_with_input(
            BenchmarkId::new("products", num_products),
            num_products,
            |b, &num_products| {
                b.iter(|| {
                    let (ledger, ids) = ledger_with_products(num_products);
                    let evaluator = Arc::new(BidEvaluator::new(Arc::clone(&ledger)));
                    let amount_counter = AtomicU64::new(10001);

                    (0..total_bids).into_par_iter().for_each(|i| {
                        let id = ids[i % ids.len()];
                        let amount =
                            Decimal::new(amount_counter.fetch_add(1, Ordering::SeqCst) as i64, 4);
                        let _ = evaluator.place_bid(id, UserId(2 + i as u64), amount);
                    });

                    black_box(&ledger);
                })
            },
        );
    }
    group.finish();
}

// =============================================================================
// Listing Benchmarks
// =============================================================================

fn bench_list_all(c: &mut Criterion) {
    let mut group = c.benchmark_group("list_all");

    for count in [100, 1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let (ledger, _ids) = ledger_with_products(count);
            b.iter(|| {
                black_box(ledger.list_all());
            })
        });
    }
    group.finish();
}

fn bench_snapshot_with_history(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot_with_history");

    // Snapshot cost grows with the bid history it must clone.
    for history_size in [10, 100, 1_000].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(history_size),
            history_size,
            |b, &history_size| {
                let (ledger, ids) = ledger_with_products(1);
                let evaluator = BidEvaluator::new(Arc::clone(&ledger));
                for i in 0..history_size {
                    let amount = Decimal::new(10001 + i as i64, 4);
                    evaluator.place_bid(ids[0], UserId(2), amount).unwrap();
                }

                b.iter(|| {
                    black_box(ledger.get(ids[0]).unwrap());
                })
            },
        );
    }
    group.finish();
}

// =============================================================================
// Criterion Groups
// =============================================================================

criterion_group!(
    single_threaded,
    bench_create_product,
    bench_single_bid,
    bench_bid_throughput,
);

criterion_group!(
    multi_threaded,
    bench_parallel_bids_hot_product,
    bench_parallel_bids_spread_products,
    bench_contention,
);

criterion_group!(listing, bench_list_all, bench_snapshot_with_history,);

criterion_main!(single_threaded, multi_threaded, listing);
