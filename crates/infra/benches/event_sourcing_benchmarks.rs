use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use std::sync::Arc;

use chrono::Utc;
use gescom_clients::ClientDetails;
use gescom_core::{ExpectedVersion, Money, RequestContext, TenantId, UserId};
use gescom_events::{EventEnvelope, InMemoryEventBus};
use gescom_infra::command_dispatcher::CommandDispatcher;
use gescom_infra::event_store::{EventStore, InMemoryEventStore, UncommittedEvent};
use gescom_infra::projections::ProjectionHub;
use gescom_infra::workflows::{DeliveryDetails, MovementRequest, NewLine, NewOrder, NewProduct};
use gescom_infra::Gescom;
use gescom_inventory::{
    MovementQuantity, MovementType, RecordMovement, StockCommand, StockEvent, StockLedger,
};
use gescom_products::{ProductDetails, ProductId, ProductPrices};

type Dispatcher = CommandDispatcher<InMemoryEventStore, Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>>>;

fn setup_dispatcher() -> (Dispatcher, TenantId, ProductId) {
    let store = InMemoryEventStore::new();
    let bus: Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>> = Arc::new(InMemoryEventBus::new());
    (CommandDispatcher::new(store, bus), TenantId::new(), ProductId::generate())
}

fn movement(tenant_id: TenantId, product_id: ProductId, movement_type: MovementType, quantity: u32) -> StockCommand {
    StockCommand::RecordMovement(RecordMovement {
        tenant_id,
        product_id,
        movement_type,
        quantity: MovementQuantity::Delta(quantity),
        reason: None,
        reference: None,
        unit_cost: None,
        actor: None,
        occurred_at: Utc::now(),
    })
}

fn record(dispatcher: &Dispatcher, tenant_id: TenantId, product_id: ProductId, command: StockCommand) {
    dispatcher
        .dispatch(
            tenant_id,
            product_id.aggregate_id(),
            StockLedger::AGGREGATE_TYPE,
            command,
            |_, id| StockLedger::empty(ProductId::new(id)),
        )
        .unwrap();
}

fn product(code: &str, price: &str) -> NewProduct {
    NewProduct {
        code: code.to_string(),
        details: ProductDetails::named(code),
        prices: ProductPrices {
            purchase_price: "1.00".parse::<Money>().unwrap(),
            selling_price: price.parse::<Money>().unwrap(),
        },
    }
}

fn bench_stock_movement_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("stock_movement_latency");
    group.sample_size(1000);

    group.bench_function("stock_in_fresh_ledger", |b| {
        let (dispatcher, tenant_id, _) = setup_dispatcher();
        b.iter(|| {
            let product_id = ProductId::generate();
            record(&dispatcher, tenant_id, product_id, movement(tenant_id, product_id, MovementType::StockIn, black_box(5)));
        });
    });

    // Ledger history grows with every iteration; each dispatch replays it.
    group.bench_function("stock_in_with_history", |b| {
        let (dispatcher, tenant_id, product_id) = setup_dispatcher();
        record(&dispatcher, tenant_id, product_id, movement(tenant_id, product_id, MovementType::StockIn, 100));

        b.iter(|| {
            record(&dispatcher, tenant_id, product_id, movement(tenant_id, product_id, MovementType::StockIn, black_box(1)));
        });
    });

    group.finish();
}

fn bench_event_append_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_append_throughput");

    for batch_size in [1u32, 10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(u64::from(*batch_size)));
        group.bench_with_input(BenchmarkId::new("batch_append", batch_size), batch_size, |b, &size| {
            let store = InMemoryEventStore::new();
            let tenant_id = TenantId::new();
            let product_id = ProductId::generate();

            b.iter(|| {
                let events: Vec<UncommittedEvent> = (0..size)
                    .map(|i| {
                        let event = StockEvent::MovementRecorded(gescom_inventory::StockMovement {
                            tenant_id,
                            product_id,
                            movement_type: MovementType::StockIn,
                            quantity: MovementQuantity::Delta(1),
                            delta: 1,
                            previous_quantity: i,
                            new_quantity: i + 1,
                            reason: None,
                            reference: None,
                            unit_cost: None,
                            actor: None,
                            occurred_at: Utc::now(),
                        });
                        UncommittedEvent::from_typed(
                            tenant_id,
                            product_id.aggregate_id(),
                            StockLedger::AGGREGATE_TYPE,
                            uuid::Uuid::now_v7(),
                            &event,
                        )
                        .unwrap()
                    })
                    .collect();

                black_box(store.append(events, ExpectedVersion::Any).unwrap());
            });
        });
    }

    group.finish();
}

fn bench_read_model_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_model_rebuild");

    for movement_count in [10u32, 100, 1000, 10000].iter() {
        group.bench_with_input(
            BenchmarkId::new("rebuild_from_log", movement_count),
            movement_count,
            |b, &count| {
                let (dispatcher, tenant_id, product_id) = setup_dispatcher();
                record(&dispatcher, tenant_id, product_id, movement(tenant_id, product_id, MovementType::StockIn, count));
                for i in 1..count {
                    let kind = if i % 2 == 0 { MovementType::StockIn } else { MovementType::StockOut };
                    record(&dispatcher, tenant_id, product_id, movement(tenant_id, product_id, kind, 1));
                }

                let hub = ProjectionHub::new();
                b.iter(|| {
                    black_box(hub.rebuild(dispatcher.store()).unwrap());
                });
            },
        );
    }

    group.finish();
}

fn bench_order_to_delivery(c: &mut Criterion) {
    let mut group = c.benchmark_group("order_to_delivery");
    group.sample_size(200);

    // Place, confirm and deliver a three-line order: one multi-stream batch per delivery.
    group.bench_function("place_confirm_deliver", |b| {
        let app = Gescom::in_memory();
        let ctx = RequestContext::new(TenantId::new(), Some(UserId::new()));
        let products: Vec<ProductId> = ["A", "B", "C"]
            .iter()
            .map(|code| {
                let created = app.create_product(&ctx, product(code, "9.90")).unwrap();
                let product_id = created.product.product_id;
                app.record_movement(
                    &ctx,
                    MovementRequest {
                        product_id,
                        movement_type: MovementType::StockIn,
                        quantity: MovementQuantity::Delta(u32::MAX / 2),
                        reason: None,
                        reference: None,
                        unit_cost: None,
                    },
                )
                .unwrap();
                product_id
            })
            .collect();
        let client_id = app
            .create_client(&ctx, ClientDetails::company("Bench SARL"))
            .unwrap()
            .client_id;

        b.iter(|| {
            let order = app
                .place_order(
                    &ctx,
                    NewOrder {
                        client_id,
                        shipping_address: None,
                        billing_address: None,
                        notes: None,
                        lines: products
                            .iter()
                            .map(|product_id| NewLine { product_id: *product_id, quantity: 2 })
                            .collect(),
                        discount: None,
                    },
                )
                .unwrap();
            app.confirm_order(&ctx, order.order_id).unwrap();
            black_box(app.create_delivery(&ctx, order.order_id, DeliveryDetails::default()).unwrap());
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_stock_movement_latency,
    bench_event_append_throughput,
    bench_read_model_rebuild,
    bench_order_to_delivery
);
criterion_main!(benches);
