//! Integration tests for the full event-sourced pipeline.
//!
//! Tests: Workflow → EventStore (atomic batch) → read models
//!
//! Verifies:
//! - Multi-stream operations commit everything or nothing
//! - Invoicing is tied 1:1 to a delivered order
//! - Concurrent stock-outs never overdraw a ledger
//! - Tenant isolation is preserved
//! - Orders are only taken for known, active clients
//! - Read models rebuilt from the log match the live ones

#[cfg(test)]
mod tests {
    use std::str::FromStr;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use chrono::{NaiveDate, Utc};

    use gescom_clients::ClientDetails;
    use gescom_core::{ClientId, DomainError, Money, RequestContext, TaxRate, TenantId, UserId};
    use gescom_events::InMemoryEventBus;
    use gescom_inventory::{replay_quantity, MovementQuantity, MovementType};
    use gescom_invoicing::{InvoiceId, InvoiceStatus, PaymentMethod};
    use gescom_products::{ProductDetails, ProductId, ProductPrices};
    use gescom_sales::{SalesOrderId, SalesOrderStatus};

    use crate::command_dispatcher::DispatchError;
    use crate::config::Settings;
    use crate::event_store::{EventStore, InMemoryEventStore};
    use crate::projections::{ActivityAction, ActivityFilter, ClientFilter, ProjectionHub};
    use crate::services::{Gescom, ServiceError};
    use crate::workflows::{
        DeliveryDetails, InvoiceRequest, MovementRequest, NewLine, NewOrder, NewProduct, PaymentRequest,
    };

    fn money(s: &str) -> Money {
        Money::from_str(s).unwrap()
    }

    fn ctx(tenant_id: TenantId) -> RequestContext {
        RequestContext::new(tenant_id, Some(UserId::new()))
    }

    fn domain_error(err: ServiceError) -> DomainError {
        match err.domain() {
            Some(e) => e.clone(),
            None => panic!("expected a domain error, got {err:?}"),
        }
    }

    fn create_product(app: &Gescom, ctx: &RequestContext, code: &str, price: &str, stock: u32) -> ProductId {
        let product = app
            .create_product(
                ctx,
                NewProduct {
                    code: code.to_string(),
                    details: ProductDetails::named(format!("Product {code}")),
                    prices: ProductPrices {
                        purchase_price: money("1.00"),
                        selling_price: money(price),
                    },
                },
            )
            .unwrap();
        let product_id = product.product.product_id;

        if stock > 0 {
            app.record_movement(ctx, stock_in(product_id, stock)).unwrap();
        }
        product_id
    }

    fn stock_in(product_id: ProductId, quantity: u32) -> MovementRequest {
        MovementRequest {
            product_id,
            movement_type: MovementType::StockIn,
            quantity: MovementQuantity::Delta(quantity),
            reason: Some("reception".to_string()),
            reference: None,
            unit_cost: None,
        }
    }

    fn stock_out(product_id: ProductId, quantity: u32) -> MovementRequest {
        MovementRequest {
            movement_type: MovementType::StockOut,
            quantity: MovementQuantity::Delta(quantity),
            reason: None,
            ..stock_in(product_id, quantity)
        }
    }

    fn register_client(app: &Gescom, ctx: &RequestContext, last_name: &str) -> ClientId {
        app.create_client(ctx, ClientDetails::individual("Karim", last_name))
            .unwrap()
            .client_id
    }

    fn confirmed_order(app: &Gescom, ctx: &RequestContext, lines: &[(ProductId, u32)]) -> SalesOrderId {
        let order = app
            .place_order(
                ctx,
                NewOrder {
                    client_id: register_client(app, ctx, "Benali"),
                    shipping_address: Some("12 rue des Lilas, Casablanca".to_string()),
                    billing_address: None,
                    notes: None,
                    lines: lines
                        .iter()
                        .map(|(product_id, quantity)| NewLine {
                            product_id: *product_id,
                            quantity: *quantity,
                        })
                        .collect(),
                    discount: None,
                },
            )
            .unwrap();
        app.confirm_order(ctx, order.order_id).unwrap();
        order.order_id
    }

    fn tax(percent: u32) -> TaxRate {
        TaxRate::new(percent.into()).unwrap()
    }

    #[test]
    fn order_to_cash_lifecycle() {
        let app = Gescom::in_memory();
        let ctx = ctx(TenantId::new());
        let a = create_product(&app, &ctx, "A-001", "10.00", 10);
        let b = create_product(&app, &ctx, "B-001", "5.00", 4);

        let order_id = confirmed_order(&app, &ctx, &[(a, 3), (b, 1)]);
        let order = app.order(&ctx, order_id).unwrap();
        assert_eq!(order.status, SalesOrderStatus::Confirmed);
        assert_eq!(order.total_amount, money("35.00"));

        let delivery = app.create_delivery(&ctx, order_id, DeliveryDetails::default()).unwrap();
        assert_eq!(delivery.order_id, Some(order_id));
        assert_eq!(
            delivery.delivery_address.as_deref(),
            Some("12 rue des Lilas, Casablanca")
        );
        assert_eq!(app.current_quantity(&ctx, a).unwrap().quantity, 7);
        assert_eq!(app.current_quantity(&ctx, b).unwrap().quantity, 3);

        let last = &app.movement_history(&ctx, a, 1, 0).unwrap()[0];
        assert_eq!(last.movement_type, MovementType::StockOut);
        assert_eq!(last.reference.as_deref(), Some(delivery.delivery_number.as_str()));
        assert_eq!(app.order(&ctx, order_id).unwrap().status, SalesOrderStatus::Delivered);

        let invoice = app
            .create_invoice(&ctx, order_id, InvoiceRequest { tax_rate: tax(20), due_date: None })
            .unwrap();
        assert_eq!(invoice.subtotal, money("35.00"));
        assert_eq!(invoice.tax_amount, money("7.00"));
        assert_eq!(invoice.total_amount, money("42.00"));
        assert_eq!(invoice.status, InvoiceStatus::Unpaid);
        assert_eq!(invoice.due_date, ctx.today().checked_add_days(chrono::Days::new(30)));
        assert_eq!(app.order(&ctx, order_id).unwrap().status, SalesOrderStatus::Invoiced);

        let pay = |amount: &str| PaymentRequest {
            amount: money(amount),
            method: PaymentMethod::Cash,
            paid_on: None,
            reference: None,
        };
        let partial = app.record_payment(&ctx, invoice.invoice_id, pay("20.00")).unwrap();
        assert_eq!(partial.status, InvoiceStatus::PartiallyPaid);
        assert_eq!(partial.paid_amount, money("20.00"));

        let paid = app.record_payment(&ctx, invoice.invoice_id, pay("22.00")).unwrap();
        assert_eq!(paid.status, InvoiceStatus::Paid);
        assert_eq!(paid.outstanding_amount, Money::zero());

        let dashboard = app.dashboard(&ctx).unwrap();
        assert_eq!(dashboard.order_count, 1);
        assert_eq!(dashboard.total_sales, money("35.00"));
        assert_eq!(dashboard.outstanding_amount, Money::zero());
        assert_eq!(dashboard.recent_orders.len(), 1);
    }

    #[test]
    fn delivery_exceeding_stock_commits_nothing() {
        let app = Gescom::in_memory();
        let ctx = ctx(TenantId::new());
        let a = create_product(&app, &ctx, "A-001", "10.00", 10);
        let b = create_product(&app, &ctx, "B-001", "5.00", 2);

        let order_id = confirmed_order(&app, &ctx, &[(a, 3), (b, 5)]);
        let events_before = app.store().load_all().unwrap().len();

        let err = app.create_delivery(&ctx, order_id, DeliveryDetails::default()).unwrap_err();
        assert_eq!(
            domain_error(err),
            DomainError::InsufficientStock { requested: 5, available: 2 }
        );

        assert_eq!(app.store().load_all().unwrap().len(), events_before);
        assert_eq!(app.order(&ctx, order_id).unwrap().status, SalesOrderStatus::Confirmed);
        assert_eq!(app.current_quantity(&ctx, a).unwrap().quantity, 10);
        assert_eq!(app.current_quantity(&ctx, b).unwrap().quantity, 2);
        assert!(app.deliveries(&ctx).is_empty());
    }

    #[test]
    fn pending_order_cannot_be_delivered_or_invoiced() {
        let app = Gescom::in_memory();
        let ctx = ctx(TenantId::new());
        let a = create_product(&app, &ctx, "A-001", "10.00", 10);

        let order = app
            .place_order(
                &ctx,
                NewOrder {
                    client_id: register_client(&app, &ctx, "Benali"),
                    shipping_address: None,
                    billing_address: None,
                    notes: None,
                    lines: vec![NewLine { product_id: a, quantity: 1 }],
                    discount: None,
                },
            )
            .unwrap();

        let err = app
            .create_delivery(&ctx, order.order_id, DeliveryDetails::default())
            .unwrap_err();
        assert!(matches!(domain_error(err), DomainError::OrderLocked(_)));
        assert_eq!(app.current_quantity(&ctx, a).unwrap().quantity, 10);

        let err = app
            .create_invoice(&ctx, order.order_id, InvoiceRequest { tax_rate: tax(20), due_date: None })
            .unwrap_err();
        assert_eq!(domain_error(err), DomainError::OrderNotDelivered);
    }

    #[test]
    fn second_invoice_for_an_order_is_rejected() {
        let app = Gescom::in_memory();
        let ctx = ctx(TenantId::new());
        let a = create_product(&app, &ctx, "A-001", "10.00", 10);
        let order_id = confirmed_order(&app, &ctx, &[(a, 1)]);
        app.create_delivery(&ctx, order_id, DeliveryDetails::default()).unwrap();

        let request = InvoiceRequest { tax_rate: tax(20), due_date: None };
        app.create_invoice(&ctx, order_id, request).unwrap();
        let err = app.create_invoice(&ctx, order_id, request).unwrap_err();
        assert_eq!(domain_error(err), DomainError::DuplicateInvoice);
        assert_eq!(app.invoices(&ctx, None).len(), 1);

        let err = app.cancel_order(&ctx, order_id, None).unwrap_err();
        assert!(matches!(domain_error(err), DomainError::OrderLocked(_)));
    }

    #[test]
    fn due_date_before_invoice_date_is_invalid() {
        let app = Gescom::in_memory();
        let ctx = ctx(TenantId::new());
        let a = create_product(&app, &ctx, "A-001", "10.00", 10);
        let order_id = confirmed_order(&app, &ctx, &[(a, 1)]);
        app.create_delivery(&ctx, order_id, DeliveryDetails::default()).unwrap();

        let yesterday = ctx.today().pred_opt().unwrap_or(NaiveDate::MIN);
        let err = app
            .create_invoice(&ctx, order_id, InvoiceRequest { tax_rate: tax(20), due_date: Some(yesterday) })
            .unwrap_err();
        assert!(matches!(domain_error(err), DomainError::InvalidInput(_)));
        assert_eq!(app.order(&ctx, order_id).unwrap().status, SalesOrderStatus::Delivered);
    }

    #[test]
    fn overpayment_leaves_paid_amount_unchanged() {
        let app = Gescom::in_memory();
        let ctx = ctx(TenantId::new());
        let a = create_product(&app, &ctx, "A-001", "100.00", 1);
        let order_id = confirmed_order(&app, &ctx, &[(a, 1)]);
        app.create_delivery(&ctx, order_id, DeliveryDetails::default()).unwrap();
        let invoice = app
            .create_invoice(&ctx, order_id, InvoiceRequest { tax_rate: tax(0), due_date: None })
            .unwrap();

        let payment = |amount: &str| PaymentRequest {
            amount: money(amount),
            method: PaymentMethod::BankTransfer,
            paid_on: None,
            reference: Some("VIR-1".to_string()),
        };
        app.record_payment(&ctx, invoice.invoice_id, payment("60.00")).unwrap();
        let err = app.record_payment(&ctx, invoice.invoice_id, payment("40.01")).unwrap_err();
        assert!(matches!(domain_error(err), DomainError::OverPayment { .. }));

        let view = app.invoice(&ctx, invoice.invoice_id).unwrap();
        assert_eq!(view.paid_amount, money("60.00"));
        assert_eq!(view.status, InvoiceStatus::PartiallyPaid);
    }

    #[test]
    fn concurrent_stock_outs_never_overdraw() {
        let mut settings = Settings::default();
        settings.dispatch.max_retries = 64;
        let app = Arc::new(Gescom::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemoryEventBus::new()),
            &settings,
        ));
        let ctx = ctx(TenantId::new());
        let product = create_product(&app, &ctx, "HOT-1", "1.00", 10);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let app = Arc::clone(&app);
                std::thread::spawn(move || app.record_movement(&ctx, stock_out(product, 2)))
            })
            .collect();

        let mut succeeded = 0;
        for handle in handles {
            match handle.join().unwrap() {
                Ok(_) => succeeded += 1,
                Err(err) => assert!(
                    matches!(err.domain(), Some(DomainError::InsufficientStock { .. }))
                        || matches!(err, ServiceError::Dispatch(DispatchError::Concurrency(_))),
                    "unexpected error {err:?}"
                ),
            }
        }

        let level = app.current_quantity(&ctx, product).unwrap();
        assert_eq!(succeeded, 5);
        assert_eq!(level.quantity, 0);

        let history = app.movement_history(&ctx, product, usize::MAX, 0).unwrap();
        assert_eq!(replay_quantity(history.iter().rev()).unwrap(), level.quantity);
    }

    #[test]
    fn tenants_do_not_see_each_other() {
        let app = Gescom::in_memory();
        let a = ctx(TenantId::new());
        let b = ctx(TenantId::new());

        let product = create_product(&app, &a, "SHARED", "3.00", 5);
        assert!(app.products(&b).is_empty());
        assert_eq!(domain_error(app.product(&b, product).unwrap_err()), DomainError::NotFound);

        // Same code is free in another tenant.
        create_product(&app, &b, "SHARED", "4.00", 0);
        assert_eq!(app.products(&b).len(), 1);

        let err = app
            .create_product(
                &a,
                NewProduct {
                    code: "shared".to_string(),
                    details: ProductDetails::named("dup"),
                    prices: ProductPrices {
                        purchase_price: Money::zero(),
                        selling_price: Money::zero(),
                    },
                },
            )
            .unwrap_err();
        assert!(matches!(domain_error(err), DomainError::Conflict(_)));
    }

    #[test]
    fn inactive_products_cannot_be_ordered() {
        let app = Gescom::in_memory();
        let ctx = ctx(TenantId::new());
        let product = create_product(&app, &ctx, "OLD", "2.00", 3);
        app.set_product_active(&ctx, product, false).unwrap();

        let err = app
            .place_order(
                &ctx,
                NewOrder {
                    client_id: register_client(&app, &ctx, "Benali"),
                    shipping_address: None,
                    billing_address: None,
                    notes: None,
                    lines: vec![NewLine { product_id: product, quantity: 1 }],
                    discount: None,
                },
            )
            .unwrap_err();
        assert!(matches!(domain_error(err), DomainError::InvalidInput(_)));
        assert!(app.orders(&ctx, None).is_empty());
    }

    fn order_for(client_id: ClientId, product_id: ProductId) -> NewOrder {
        NewOrder {
            client_id,
            shipping_address: None,
            billing_address: None,
            notes: None,
            lines: vec![NewLine { product_id, quantity: 1 }],
            discount: None,
        }
    }

    #[test]
    fn orders_need_a_known_active_client() {
        let app = Gescom::in_memory();
        let other = ctx(TenantId::new());
        let ctx = ctx(TenantId::new());
        let product = create_product(&app, &ctx, "A-001", "2.00", 3);

        let err = app.place_order(&ctx, order_for(ClientId::new(), product)).unwrap_err();
        assert_eq!(domain_error(err), DomainError::NotFound);

        let client = register_client(&app, &ctx, "Alaoui");
        app.set_client_active(&ctx, client, false).unwrap();
        let err = app.place_order(&ctx, order_for(client, product)).unwrap_err();
        assert!(matches!(domain_error(err), DomainError::InvalidInput(_)));
        assert!(app.orders(&ctx, None).is_empty());

        // A client of another tenant is unknown here.
        let foreign = register_client(&app, &other, "Tazi");
        let err = app.place_order(&ctx, order_for(foreign, product)).unwrap_err();
        assert_eq!(domain_error(err), DomainError::NotFound);

        app.set_client_active(&ctx, client, true).unwrap();
        let order = app.place_order(&ctx, order_for(client, product)).unwrap();
        assert_eq!(order.client_id, Some(client));
    }

    #[test]
    fn client_emails_are_unique_per_tenant() {
        let app = Gescom::in_memory();
        let other = ctx(TenantId::new());
        let ctx = ctx(TenantId::new());
        let with_email = |email: &str| {
            let mut details = ClientDetails::company("Atlas Negoce");
            details.contact.email = Some(email.to_string());
            details
        };

        let first = app.create_client(&ctx, with_email("achats@atlas.ma")).unwrap();
        let err = app.create_client(&ctx, with_email(" ACHATS@atlas.ma ")).unwrap_err();
        assert!(matches!(domain_error(err), DomainError::Conflict(_)));

        // Re-saving the owner's own email is not a clash.
        app.update_client(&ctx, first.client_id, with_email("achats@atlas.ma")).unwrap();

        app.create_client(&other, with_email("achats@atlas.ma")).unwrap();
        assert_eq!(app.clients(&ctx, ClientFilter::default()).len(), 1);
    }

    #[test]
    fn invoice_numbers_are_unique_and_searchable() {
        let app = Gescom::in_memory();
        let ctx = ctx(TenantId::new());
        let a = create_product(&app, &ctx, "A-001", "10.00", 10);
        let order_id = confirmed_order(&app, &ctx, &[(a, 1)]);
        app.create_delivery(&ctx, order_id, DeliveryDetails::default()).unwrap();
        let invoice = app
            .create_invoice(&ctx, order_id, InvoiceRequest { tax_rate: tax(20), due_date: None })
            .unwrap();

        let found = app
            .invoice_by_number(&ctx, &invoice.invoice_number.to_lowercase())
            .unwrap();
        assert_eq!(found.invoice_id, invoice.invoice_id);
        assert_eq!(
            domain_error(app.invoice_by_number(&ctx, "FACT-19990101-000000000000").unwrap_err()),
            DomainError::NotFound
        );

        // An id whose number is taken is skipped for the next fresh one.
        let fresh = InvoiceId::generate();
        let mut candidates = vec![fresh, invoice.invoice_id].into_iter().rev();
        let picked = app
            .unused_invoice_id(&ctx, || candidates.next().unwrap_or_else(InvoiceId::generate))
            .unwrap();
        assert_eq!(picked, fresh);

        let err = app.unused_invoice_id(&ctx, || invoice.invoice_id).unwrap_err();
        assert!(matches!(domain_error(err), DomainError::Conflict(_)));
    }

    #[test]
    fn rebuilt_read_models_match_live_ones() {
        let app = Gescom::in_memory();
        let ctx = ctx(TenantId::new());
        let a = create_product(&app, &ctx, "A-001", "10.00", 10);
        let order_id = confirmed_order(&app, &ctx, &[(a, 4)]);
        let delivery = app.create_delivery(&ctx, order_id, DeliveryDetails::default()).unwrap();
        app.create_invoice(&ctx, order_id, InvoiceRequest { tax_rate: tax(20), due_date: None })
            .unwrap();

        let rebuilt = ProjectionHub::new();
        let stats = rebuilt.rebuild(app.store()).unwrap();
        assert_eq!(stats.events as usize, app.store().load_all().unwrap().len());

        let live = app.read_models();
        assert_eq!(rebuilt.orders.get(ctx.tenant_id, order_id), live.orders.get(ctx.tenant_id, order_id));
        assert_eq!(rebuilt.stock.level(ctx.tenant_id, &a), live.stock.level(ctx.tenant_id, &a));
        assert_eq!(
            rebuilt.deliveries.get(ctx.tenant_id, delivery.delivery_id),
            live.deliveries.get(ctx.tenant_id, delivery.delivery_id)
        );
        assert_eq!(rebuilt.invoices.list(ctx.tenant_id, None), live.invoices.list(ctx.tenant_id, None));

        // A second rebuild is idempotent.
        rebuilt.rebuild(app.store()).unwrap();
        assert_eq!(rebuilt.stock.quantity(ctx.tenant_id, &a), 6);
    }

    #[test]
    fn cash_register_counts_sales_in_range() {
        let app = Gescom::in_memory();
        let ctx = ctx(TenantId::new());
        let a = create_product(&app, &ctx, "A-001", "10.00", 10);

        let delivered = confirmed_order(&app, &ctx, &[(a, 2)]);
        app.create_delivery(&ctx, delivered, DeliveryDetails::default()).unwrap();
        confirmed_order(&app, &ctx, &[(a, 1)]);

        let from = ctx.now - chrono::Duration::hours(1);
        let to = Utc::now() + chrono::Duration::hours(1);
        let report = app.cash_register(&ctx, from, to, None).unwrap();
        assert_eq!(report.order_count, 1);
        assert_eq!(report.items_sold, 2);
        assert_eq!(report.total_sales, money("20.00"));
        assert_eq!(report.average_order_value, money("20.00"));

        let empty = app.cash_register(&ctx, from, to, Some(UserId::new())).unwrap();
        assert_eq!(empty.order_count, 0);
        assert_eq!(empty.average_order_value, Money::zero());
    }

    #[test]
    fn activity_worker_records_committed_events() {
        let app = Gescom::in_memory();
        let worker = app.spawn_activity_worker().unwrap();
        let ctx = ctx(TenantId::new());

        let product = create_product(&app, &ctx, "A-001", "10.00", 5);
        app.record_movement(&ctx, stock_out(product, 2)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        let filter = ActivityFilter::default();
        while app.activity(&ctx, &filter, 10).len() < 3 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        worker.shutdown();

        let entries = app.activity(&ctx, &filter, 10);
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().any(|e| e.action == ActivityAction::StockOut));
        assert!(entries.iter().any(|e| e.action == ActivityAction::Create));
        assert!(entries.iter().all(|e| e.actor == ctx.actor));
    }
}
