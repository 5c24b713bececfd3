use serde_json::Value as JsonValue;

use gescom_clients::Client;
use gescom_events::EventEnvelope;
use gescom_inventory::StockLedger;
use gescom_invoicing::Invoice;
use gescom_products::Product;
use gescom_sales::{Delivery, SalesOrder};

use super::activity_log::ActivityLogProjection;
use super::clients::ClientsProjection;
use super::cursor::{Applied, ProjectionError};
use super::deliveries::DeliveriesProjection;
use super::invoices::InvoicesProjection;
use super::products::ProductsProjection;
use super::sales_orders::SalesOrdersProjection;
use super::stock::StockProjection;
use crate::event_store::{EventStore, StoredEvent};

/// Counters returned by [`ProjectionHub::rebuild`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildStats {
    pub events: u64,
    pub applied: u64,
    pub skipped: u64,
}

/// Every read model of the system, fed from committed events.
///
/// The stream-ordered projections are applied synchronously after each commit
/// (read-your-writes). The activity log is fed from the bus by the projection
/// worker and only touched here during a rebuild.
#[derive(Debug, Default)]
pub struct ProjectionHub {
    pub products: ProductsProjection,
    pub clients: ClientsProjection,
    pub stock: StockProjection,
    pub orders: SalesOrdersProjection,
    pub deliveries: DeliveriesProjection,
    pub invoices: InvoicesProjection,
    pub activity: ActivityLogProjection,
}

impl ProjectionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route one envelope to the projection owning its aggregate type.
    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<Applied, ProjectionError> {
        let aggregate_type = envelope.aggregate_type();
        if aggregate_type == Product::AGGREGATE_TYPE {
            self.products.apply_envelope(envelope)
        } else if aggregate_type == Client::AGGREGATE_TYPE {
            self.clients.apply_envelope(envelope)
        } else if aggregate_type == StockLedger::AGGREGATE_TYPE {
            self.stock.apply_envelope(envelope)
        } else if aggregate_type == SalesOrder::AGGREGATE_TYPE {
            self.orders.apply_envelope(envelope)
        } else if aggregate_type == Delivery::AGGREGATE_TYPE {
            self.deliveries.apply_envelope(envelope)
        } else if aggregate_type == Invoice::AGGREGATE_TYPE {
            self.invoices.apply_envelope(envelope)
        } else {
            tracing::debug!(aggregate_type, "no projection for aggregate type");
            Ok(Applied::Skipped)
        }
    }

    /// Apply freshly committed events.
    ///
    /// Two writers committing the same stream can reach this point out of
    /// order. A gap is closed by reloading the whole stream from the store;
    /// events already applied are skipped by the cursors.
    pub fn apply_committed<S>(&self, store: &S, committed: &[StoredEvent]) -> Result<(), ProjectionError>
    where
        S: EventStore + ?Sized,
    {
        for stored in committed {
            match self.apply_envelope(&stored.to_envelope()) {
                Ok(_) => {}
                Err(ProjectionError::Gap { last, found, .. }) => {
                    tracing::debug!(
                        aggregate_type = %stored.aggregate_type,
                        aggregate_id = %stored.aggregate_id,
                        last,
                        found,
                        "projection gap, catching up from the store"
                    );
                    self.catch_up(store, stored)?;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn catch_up<S>(&self, store: &S, stored: &StoredEvent) -> Result<(), ProjectionError>
    where
        S: EventStore + ?Sized,
    {
        let stream = store
            .load_stream(stored.tenant_id, &stored.aggregate_type, stored.aggregate_id)
            .map_err(|e| ProjectionError::Store(e.to_string()))?;
        for event in &stream {
            self.apply_envelope(&event.to_envelope())?;
        }
        Ok(())
    }

    /// Drop every read model and replay the full log in commit order.
    pub fn rebuild<S>(&self, store: &S) -> Result<RebuildStats, ProjectionError>
    where
        S: EventStore + ?Sized,
    {
        self.reset();
        let events = store
            .load_all()
            .map_err(|e| ProjectionError::Store(e.to_string()))?;

        let mut stats = RebuildStats::default();
        for stored in &events {
            let envelope = stored.to_envelope();
            stats.events += 1;
            match self.apply_envelope(&envelope)? {
                Applied::Applied => stats.applied += 1,
                Applied::Skipped => stats.skipped += 1,
            }
            self.activity.apply_envelope(&envelope)?;
        }

        tracing::info!(
            events = stats.events,
            applied = stats.applied,
            skipped = stats.skipped,
            "read models rebuilt"
        );
        Ok(stats)
    }

    pub fn reset(&self) {
        self.products.reset();
        self.clients.reset();
        self.stock.reset();
        self.orders.reset();
        self.deliveries.reset();
        self.invoices.reset();
        self.activity.reset();
    }
}
