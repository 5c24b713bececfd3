//! Application services: the operations exposed to the outside world.
//!
//! Every write runs a workflow, then folds the committed events into the read
//! models before returning, so a caller always reads its own writes. Reads go
//! to the read models only; nothing here replays a stream on the query path.

use std::io;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use gescom_clients::ClientDetails;
use gescom_core::numbering::{document_number, INVOICE_PREFIX};
use gescom_core::{ClientId, DomainError, Money, RequestContext, UserId};
use gescom_events::{EventEnvelope, InMemoryEventBus};
use gescom_inventory::{MovementOutcome, StockMovement};
use gescom_invoicing::{InvoiceId, InvoiceStatus};
use gescom_products::ProductId;
use gescom_sales::{DeliveryId, SalesOrderId, SalesOrderStatus};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::config::{InvoicingSettings, Settings};
use crate::event_store::{EventStore, InMemoryEventStore, StoredEvent};
use crate::projections::reports::{self, CashRegisterReport, Dashboard, ProductStock, StockStats};
use crate::projections::{
    ActivityEntry, ActivityFilter, ClientFilter, ClientView, DeliveryView, InvoiceView, OrderView, ProjectionError,
    ProjectionHub, RebuildStats, StockLevel,
};
use crate::workers::{ProjectionWorker, WorkerHandle};
use crate::workflows::{
    self, DeliveryDetails, InvoiceRequest, MovementRequest, NewLine, NewOrder, NewProduct,
    PaymentRequest, ProductChanges,
};

pub type SharedEventStore = Arc<dyn EventStore>;
pub type SharedEventBus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
pub type Dispatcher = CommandDispatcher<SharedEventStore, SharedEventBus>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("read model rebuild failed: {0}")]
    Projection(#[from] ProjectionError),
}

impl From<DomainError> for ServiceError {
    fn from(value: DomainError) -> Self {
        ServiceError::Dispatch(DispatchError::Domain(value))
    }
}

impl ServiceError {
    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            ServiceError::Dispatch(DispatchError::Domain(e)) => Some(e),
            _ => None,
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Fresh ids drawn before giving up on a free invoice number.
const INVOICE_NUMBER_ATTEMPTS: usize = 8;

fn found<T>(value: Option<T>) -> ServiceResult<T> {
    value.ok_or_else(|| DomainError::NotFound.into())
}

/// The gescom application: write side, read models and settings.
pub struct Gescom {
    dispatcher: Dispatcher,
    read: Arc<ProjectionHub>,
    invoicing: InvoicingSettings,
}

impl core::fmt::Debug for Gescom {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Gescom")
            .field("max_retries", &self.dispatcher.max_retries())
            .field("invoicing", &self.invoicing)
            .finish_non_exhaustive()
    }
}

impl Gescom {
    pub fn new(store: SharedEventStore, bus: SharedEventBus, settings: &Settings) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(store, bus).with_max_retries(settings.dispatch.max_retries),
            read: Arc::new(ProjectionHub::new()),
            invoicing: settings.invoicing.clone(),
        }
    }

    /// In-memory store and bus with default settings (tests, demos).
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemoryEventBus::new()),
            &Settings::default(),
        )
    }

    pub fn read_models(&self) -> &Arc<ProjectionHub> {
        &self.read
    }

    pub fn bus(&self) -> &SharedEventBus {
        self.dispatcher.bus()
    }

    pub fn store(&self) -> &SharedEventStore {
        self.dispatcher.store()
    }

    /// Replay the whole log into fresh read models (startup).
    pub fn rebuild_read_models(&self) -> ServiceResult<RebuildStats> {
        Ok(self.read.rebuild(self.dispatcher.store())?)
    }

    /// Feed the activity log from the bus on a background thread.
    pub fn spawn_activity_worker(&self) -> io::Result<WorkerHandle> {
        let read = Arc::clone(&self.read);
        ProjectionWorker::spawn(
            "activity-log",
            self.bus().as_ref(),
            None,
            move |envelope: EventEnvelope<JsonValue>| read.activity.apply_envelope(&envelope).map(|_| ()),
        )
    }

    /// The events are durable at this point; a projection failure is logged
    /// and left for the next rebuild rather than reported as a failed write.
    fn project(&self, committed: &[StoredEvent]) {
        if let Err(e) = self.read.apply_committed(self.dispatcher.store(), committed) {
            tracing::warn!(error = %e, events = committed.len(), "read model update failed after commit");
        }
    }

    // -- catalog ------------------------------------------------------------

    pub fn create_product(&self, ctx: &RequestContext, product: NewProduct) -> ServiceResult<ProductStock> {
        let code = product.code.trim().to_string();
        if code.is_empty() {
            return Err(DomainError::invalid_input("code cannot be empty").into());
        }
        if self.read.products.find_by_code(ctx.tenant_id, &code).is_some() {
            return Err(DomainError::conflict(format!("product code '{code}' already exists")).into());
        }

        let committed = workflows::create_product(
            &self.dispatcher,
            ctx,
            ProductId::generate(),
            NewProduct { code, ..product },
        )?;
        self.project(&committed.events);
        self.product(ctx, committed.value)
    }

    pub fn update_product(
        &self,
        ctx: &RequestContext,
        product_id: ProductId,
        changes: ProductChanges,
    ) -> ServiceResult<ProductStock> {
        let committed = workflows::update_product(&self.dispatcher, ctx, product_id, changes)?;
        self.project(&committed.events);
        self.product(ctx, product_id)
    }

    pub fn set_product_active(
        &self,
        ctx: &RequestContext,
        product_id: ProductId,
        active: bool,
    ) -> ServiceResult<ProductStock> {
        let committed = workflows::set_product_active(&self.dispatcher, ctx, product_id, active)?;
        self.project(&committed.events);
        self.product(ctx, product_id)
    }

    pub fn product(&self, ctx: &RequestContext, product_id: ProductId) -> ServiceResult<ProductStock> {
        let product = found(self.read.products.get(ctx.tenant_id, &product_id))?;
        Ok(reports::with_stock(&self.read, ctx.tenant_id, product))
    }

    /// Every product of the tenant, active or not, sorted by code.
    pub fn products(&self, ctx: &RequestContext) -> Vec<ProductStock> {
        self.read
            .products
            .list(ctx.tenant_id)
            .into_iter()
            .map(|p| reports::with_stock(&self.read, ctx.tenant_id, p))
            .collect()
    }

    // -- clients --------------------------------------------------------------

    /// Fails with `Conflict` when another client of the tenant already uses the email.
    fn ensure_email_free(
        &self,
        ctx: &RequestContext,
        details: &ClientDetails,
        owner: Option<ClientId>,
    ) -> ServiceResult<()> {
        let Some(email) = details.normalized_email() else {
            return Ok(());
        };
        match self.read.clients.find_by_email(ctx.tenant_id, &email) {
            Some(existing) if Some(existing.client_id) != owner => {
                Err(DomainError::conflict(format!("email '{email}' already belongs to another client")).into())
            }
            _ => Ok(()),
        }
    }

    pub fn create_client(&self, ctx: &RequestContext, details: ClientDetails) -> ServiceResult<ClientView> {
        self.ensure_email_free(ctx, &details, None)?;
        let committed = workflows::register_client(&self.dispatcher, ctx, ClientId::new(), details)?;
        self.project(&committed.events);
        self.client(ctx, committed.value)
    }

    /// Replace a client's details.
    pub fn update_client(
        &self,
        ctx: &RequestContext,
        client_id: ClientId,
        details: ClientDetails,
    ) -> ServiceResult<ClientView> {
        self.ensure_email_free(ctx, &details, Some(client_id))?;
        let committed = workflows::update_client(&self.dispatcher, ctx, client_id, details)?;
        self.project(&committed.events);
        self.client(ctx, client_id)
    }

    pub fn set_client_active(
        &self,
        ctx: &RequestContext,
        client_id: ClientId,
        active: bool,
    ) -> ServiceResult<ClientView> {
        let committed = workflows::set_client_active(&self.dispatcher, ctx, client_id, active)?;
        self.project(&committed.events);
        self.client(ctx, client_id)
    }

    pub fn client(&self, ctx: &RequestContext, client_id: ClientId) -> ServiceResult<ClientView> {
        found(self.read.clients.get(ctx.tenant_id, client_id))
    }

    pub fn clients(&self, ctx: &RequestContext, filter: ClientFilter) -> Vec<ClientView> {
        self.read.clients.list(ctx.tenant_id, filter)
    }

    // -- stock ----------------------------------------------------------------

    pub fn record_movement(&self, ctx: &RequestContext, request: MovementRequest) -> ServiceResult<MovementOutcome> {
        let committed = workflows::record_movement(&self.dispatcher, ctx, request)?;
        self.project(&committed.events);
        Ok(committed.value)
    }

    /// Movements newest first.
    pub fn movement_history(
        &self,
        ctx: &RequestContext,
        product_id: ProductId,
        limit: usize,
        offset: usize,
    ) -> ServiceResult<Vec<StockMovement>> {
        found(self.read.products.get(ctx.tenant_id, &product_id))?;
        Ok(self.read.stock.history(ctx.tenant_id, &product_id, limit, offset))
    }

    pub fn current_quantity(&self, ctx: &RequestContext, product_id: ProductId) -> ServiceResult<StockLevel> {
        found(self.read.products.get(ctx.tenant_id, &product_id))?;
        Ok(self.read.stock.level(ctx.tenant_id, &product_id))
    }

    pub fn low_stock(&self, ctx: &RequestContext) -> Vec<ProductStock> {
        reports::low_stock(&self.read, ctx.tenant_id)
    }

    pub fn out_of_stock(&self, ctx: &RequestContext) -> Vec<ProductStock> {
        reports::out_of_stock(&self.read, ctx.tenant_id)
    }

    pub fn stock_stats(&self, ctx: &RequestContext) -> ServiceResult<StockStats> {
        Ok(reports::stock_stats(&self.read, ctx.tenant_id)?)
    }

    // -- orders ---------------------------------------------------------------

    pub fn place_order(&self, ctx: &RequestContext, order: NewOrder) -> ServiceResult<OrderView> {
        let committed = workflows::place_order(&self.dispatcher, ctx, SalesOrderId::generate(), order)?;
        self.project(&committed.events);
        self.order(ctx, committed.value)
    }

    pub fn add_line(&self, ctx: &RequestContext, order_id: SalesOrderId, line: NewLine) -> ServiceResult<OrderView> {
        let committed = workflows::add_line(&self.dispatcher, ctx, order_id, line)?;
        self.project(&committed.events);
        self.order(ctx, order_id)
    }

    pub fn remove_line(&self, ctx: &RequestContext, order_id: SalesOrderId, line_no: u32) -> ServiceResult<OrderView> {
        let committed = workflows::remove_line(&self.dispatcher, ctx, order_id, line_no)?;
        self.project(&committed.events);
        self.order(ctx, order_id)
    }

    pub fn set_discount(&self, ctx: &RequestContext, order_id: SalesOrderId, discount: Money) -> ServiceResult<OrderView> {
        let committed = workflows::set_discount(&self.dispatcher, ctx, order_id, discount)?;
        self.project(&committed.events);
        self.order(ctx, order_id)
    }

    pub fn confirm_order(&self, ctx: &RequestContext, order_id: SalesOrderId) -> ServiceResult<OrderView> {
        let committed = workflows::confirm_order(&self.dispatcher, ctx, order_id)?;
        self.project(&committed.events);
        self.order(ctx, order_id)
    }

    pub fn cancel_order(
        &self,
        ctx: &RequestContext,
        order_id: SalesOrderId,
        reason: Option<String>,
    ) -> ServiceResult<OrderView> {
        let committed = workflows::cancel_order(&self.dispatcher, ctx, order_id, reason)?;
        self.project(&committed.events);
        self.order(ctx, order_id)
    }

    pub fn order(&self, ctx: &RequestContext, order_id: SalesOrderId) -> ServiceResult<OrderView> {
        found(self.read.orders.get(ctx.tenant_id, order_id))
    }

    pub fn orders(&self, ctx: &RequestContext, status: Option<SalesOrderStatus>) -> Vec<OrderView> {
        self.read.orders.list(ctx.tenant_id, status)
    }

    // -- deliveries -----------------------------------------------------------

    pub fn create_delivery(
        &self,
        ctx: &RequestContext,
        order_id: SalesOrderId,
        details: DeliveryDetails,
    ) -> ServiceResult<DeliveryView> {
        let committed =
            workflows::create_delivery(&self.dispatcher, ctx, order_id, DeliveryId::generate(), details)?;
        self.project(&committed.events);
        self.delivery(ctx, committed.value)
    }

    pub fn delivery(&self, ctx: &RequestContext, delivery_id: DeliveryId) -> ServiceResult<DeliveryView> {
        found(self.read.deliveries.get(ctx.tenant_id, delivery_id))
    }

    pub fn deliveries(&self, ctx: &RequestContext) -> Vec<DeliveryView> {
        self.read.deliveries.list(ctx.tenant_id)
    }

    // -- invoices -------------------------------------------------------------

    pub fn create_invoice(
        &self,
        ctx: &RequestContext,
        order_id: SalesOrderId,
        request: InvoiceRequest,
    ) -> ServiceResult<InvoiceView> {
        let invoice_id = self.unused_invoice_id(ctx, InvoiceId::generate)?;
        let committed = workflows::create_invoice(
            &self.dispatcher,
            ctx,
            order_id,
            invoice_id,
            request,
            self.invoicing.default_due_days,
        )?;
        self.project(&committed.events);
        self.invoice(ctx, committed.value)
    }

    /// Draw invoice ids until one yields a number the tenant has not used yet.
    pub(crate) fn unused_invoice_id(
        &self,
        ctx: &RequestContext,
        mut generate: impl FnMut() -> InvoiceId,
    ) -> ServiceResult<InvoiceId> {
        for _ in 0..INVOICE_NUMBER_ATTEMPTS {
            let invoice_id = generate();
            let number = document_number(INVOICE_PREFIX, ctx.now, &invoice_id.aggregate_id());
            if self.read.invoices.find_by_number(ctx.tenant_id, &number).is_none() {
                return Ok(invoice_id);
            }
            tracing::warn!(%number, "invoice number already taken");
        }
        Err(DomainError::conflict("no unused invoice number available").into())
    }

    pub fn record_payment(
        &self,
        ctx: &RequestContext,
        invoice_id: InvoiceId,
        payment: PaymentRequest,
    ) -> ServiceResult<InvoiceView> {
        let committed = workflows::record_payment(&self.dispatcher, ctx, invoice_id, payment)?;
        self.project(&committed.events);
        self.invoice(ctx, invoice_id)
    }

    pub fn cancel_invoice(
        &self,
        ctx: &RequestContext,
        invoice_id: InvoiceId,
        reason: Option<String>,
    ) -> ServiceResult<InvoiceView> {
        let committed = workflows::cancel_invoice(&self.dispatcher, ctx, invoice_id, reason)?;
        self.project(&committed.events);
        self.invoice(ctx, invoice_id)
    }

    pub fn invoice(&self, ctx: &RequestContext, invoice_id: InvoiceId) -> ServiceResult<InvoiceView> {
        found(self.read.invoices.get(ctx.tenant_id, invoice_id))
    }

    pub fn invoice_by_number(&self, ctx: &RequestContext, invoice_number: &str) -> ServiceResult<InvoiceView> {
        found(self.read.invoices.find_by_number(ctx.tenant_id, invoice_number))
    }

    pub fn invoices(&self, ctx: &RequestContext, status: Option<InvoiceStatus>) -> Vec<InvoiceView> {
        self.read.invoices.list(ctx.tenant_id, status)
    }

    pub fn overdue_invoices(&self, ctx: &RequestContext) -> Vec<InvoiceView> {
        self.read.invoices.overdue(ctx.tenant_id, ctx.today())
    }

    // -- reporting ------------------------------------------------------------

    pub fn cash_register(
        &self,
        ctx: &RequestContext,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        created_by: Option<UserId>,
    ) -> ServiceResult<CashRegisterReport> {
        if to < from {
            return Err(DomainError::invalid_input("report range ends before it starts").into());
        }
        Ok(reports::cash_register(&self.read, ctx.tenant_id, from, to, created_by)?)
    }

    pub fn dashboard(&self, ctx: &RequestContext) -> ServiceResult<Dashboard> {
        Ok(reports::dashboard(&self.read, ctx.tenant_id, ctx.today())?)
    }

    pub fn activity(&self, ctx: &RequestContext, filter: &ActivityFilter, limit: usize) -> Vec<ActivityEntry> {
        self.read.activity.recent(ctx.tenant_id, filter, limit)
    }
}
