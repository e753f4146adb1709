//! Allocation sweep benchmarks.
//!
//! Measures the cost of auto-allocating a kit's components against ledgers of
//! varying depth, which is dominated by the oldest-first availability scan.

use std::hint::black_box;
use std::sync::Arc;

use chrono::{Duration, Utc};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use rust_decimal_macros::dec;

use kitforge_build::{AddComponent, BuildId, CreateKit, Kit, KitCommand, KitEngine, KitId, KitItemId};
use kitforge_catalog::{BomLineId, PartId};
use kitforge_core::{AggregateId, Quantity, TenantId, UserId};
use kitforge_events::execute;
use kitforge_stock::{InMemoryStockLedger, StockItem, StockItemId, StockLedger};

struct Setup {
    engine: KitEngine,
    kit: Kit,
    user: UserId,
}

/// A kit with `components` BOM components, each needing 2 units, against a
/// ledger holding `lots_per_part` one-unit-too-small and one satisfying lot
/// per part.
fn setup(components: usize, lots_per_part: usize) -> Setup {
    let tenant_id = TenantId::new();
    let kit_part = PartId(AggregateId::new());
    let ledger = Arc::new(InMemoryStockLedger::new());
    let user = UserId::new();

    let mut kit = Kit::empty(KitId(AggregateId::new()));
    execute(
        &mut kit,
        &KitCommand::CreateKit(CreateKit {
            tenant_id,
            kit_id: kit.id_typed(),
            build: BuildId(AggregateId::new()),
            build_part: kit_part,
            part: None,
            quantity: 1,
            reference: None,
            title: "bench kit".to_string(),
            batch: None,
            target_date: None,
            link: None,
            notes: None,
            occurred_at: Utc::now(),
        }),
    )
    .unwrap();

    let base = Utc::now() - Duration::days(30);
    for c in 0..components {
        let sub_part = PartId(AggregateId::new());
        execute(
            &mut kit,
            &KitCommand::AddComponent(AddComponent {
                tenant_id,
                kit_id: kit.id_typed(),
                item_id: KitItemId(AggregateId::new()),
                bom_line: BomLineId(AggregateId::new()),
                bom_part: kit_part,
                sub_part,
                quantity: Quantity::new(dec!(2)).unwrap(),
                notes: None,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        // Lots too small to satisfy the component, then one that fits.
        for lot in 0..lots_per_part {
            ledger
                .insert(StockItem::new(
                    StockItemId(AggregateId::new()),
                    sub_part,
                    Quantity::ONE,
                    base + Duration::minutes((c * lots_per_part + lot) as i64),
                ))
                .unwrap();
        }
        ledger
            .insert(StockItem::new(
                StockItemId(AggregateId::new()),
                sub_part,
                Quantity::from_units(10),
                base + Duration::days(1),
            ))
            .unwrap();
    }

    Setup {
        engine: KitEngine::new(ledger),
        kit,
        user,
    }
}

fn bench_allocation_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocation_sweep");

    for components in [5usize, 25, 100] {
        group.throughput(Throughput::Elements(components as u64));
        group.bench_with_input(
            BenchmarkId::new("components", components),
            &components,
            |b, &components| {
                b.iter_batched(
                    || setup(components, 8),
                    |mut s| {
                        let (report, events) =
                            s.engine.allocate_stock(&mut s.kit, s.user).unwrap();
                        black_box((report.allocated(), events.len()))
                    },
                    criterion::BatchSize::SmallInput,
                )
            },
        );
    }

    group.finish();
}

fn bench_repeat_sweep(c: &mut Criterion) {
    // The second sweep finds nothing to do; this measures the no-op path.
    c.bench_function("allocation_sweep/idempotent_resweep", |b| {
        b.iter_batched(
            || {
                let mut s = setup(25, 8);
                s.engine.allocate_stock(&mut s.kit, s.user).unwrap();
                s
            },
            |mut s| {
                let (report, _) = s.engine.allocate_stock(&mut s.kit, s.user).unwrap();
                black_box(report.allocated())
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_allocation_sweep, bench_repeat_sweep);
criterion_main!(benches);
