use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use gescom_core::{Money, TenantId};
use gescom_events::EventEnvelope;
use gescom_products::{ProductEvent, ProductId};

use super::cursor::{decode, Applied, ProjectionError, StreamCursors};
use crate::read_model::{InMemoryTenantStore, TenantStore};

/// Queryable product read model (catalog).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductView {
    pub product_id: ProductId,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub unit: String,
    pub barcode: Option<String>,
    pub min_stock_alert: u32,
    pub purchase_price: Money,
    pub selling_price: Money,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Product catalog projection.
#[derive(Debug)]
pub struct ProductsProjection<S = InMemoryTenantStore<ProductId, ProductView>>
where
    S: TenantStore<ProductId, ProductView>,
{
    store: S,
    cursors: StreamCursors,
}

impl Default for ProductsProjection {
    fn default() -> Self {
        Self::new(InMemoryTenantStore::new())
    }
}

impl<S> ProductsProjection<S>
where
    S: TenantStore<ProductId, ProductView>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, tenant_id: TenantId, product_id: &ProductId) -> Option<ProductView> {
        self.store.get(tenant_id, product_id)
    }

    /// Catalog ordered by code.
    pub fn list(&self, tenant_id: TenantId) -> Vec<ProductView> {
        let mut products = self.store.list(tenant_id);
        products.sort_by(|a, b| a.code.cmp(&b.code));
        products
    }

    /// Product codes are unique per tenant, compared case-insensitively.
    pub fn find_by_code(&self, tenant_id: TenantId, code: &str) -> Option<ProductView> {
        let code = code.trim();
        self.store
            .list(tenant_id)
            .into_iter()
            .find(|p| p.code.eq_ignore_ascii_case(code))
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<Applied, ProjectionError> {
        self.cursors.apply(envelope, || {
            let event: ProductEvent = decode(envelope, ProductEvent::tenant_id)?;
            let product_id = event.product_id();
            if product_id.aggregate_id() != envelope.aggregate_id() {
                return Err(ProjectionError::TenantIsolation(
                    "event product_id does not match envelope aggregate_id".to_string(),
                ));
            }

            let tenant_id = envelope.tenant_id();
            if let ProductEvent::ProductCreated(e) = &event {
                self.store.upsert(
                    tenant_id,
                    product_id,
                    ProductView {
                        product_id,
                        code: e.code.clone(),
                        name: e.details.name.clone(),
                        description: e.details.description.clone(),
                        category: e.details.category.clone(),
                        unit: e.details.unit.clone(),
                        barcode: e.details.barcode.clone(),
                        min_stock_alert: e.details.min_stock_alert,
                        purchase_price: e.prices.purchase_price,
                        selling_price: e.prices.selling_price,
                        active: true,
                        created_at: e.occurred_at,
                        updated_at: e.occurred_at,
                    },
                );
                return Ok(());
            }

            let mut view = self.store.get(tenant_id, &product_id).ok_or_else(|| {
                ProjectionError::Invalid(format!("product {product_id} updated before creation"))
            })?;
            match event {
                ProductEvent::ProductCreated(_) => {}
                ProductEvent::ProductDetailsUpdated(e) => {
                    view.name = e.details.name;
                    view.description = e.details.description;
                    view.category = e.details.category;
                    view.unit = e.details.unit;
                    view.barcode = e.details.barcode;
                    view.min_stock_alert = e.details.min_stock_alert;
                    view.updated_at = e.occurred_at;
                }
                ProductEvent::ProductPricesChanged(e) => {
                    view.purchase_price = e.prices.purchase_price;
                    view.selling_price = e.prices.selling_price;
                    view.updated_at = e.occurred_at;
                }
                ProductEvent::ProductActivated(e) => {
                    view.active = true;
                    view.updated_at = e.occurred_at;
                }
                ProductEvent::ProductDeactivated(e) => {
                    view.active = false;
                    view.updated_at = e.occurred_at;
                }
            }
            self.store.upsert(tenant_id, product_id, view);
            Ok(())
        })
    }

    pub fn reset(&self) {
        self.cursors.reset();
        self.store.clear_all();
    }
}
