use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use gescom_core::TenantId;
use gescom_events::EventEnvelope;
use gescom_inventory::{StockEvent, StockMovement};
use gescom_products::ProductId;

use super::cursor::{decode, Applied, ProjectionError, StreamCursors};
use crate::read_model::{InMemoryTenantStore, TenantStore};

/// Cached on-hand quantity of one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockLevel {
    pub product_id: ProductId,
    pub quantity: u32,
    pub movement_count: u64,
    pub last_movement_at: Option<DateTime<Utc>>,
}

impl StockLevel {
    fn empty(product_id: ProductId) -> Self {
        Self {
            product_id,
            quantity: 0,
            movement_count: 0,
            last_movement_at: None,
        }
    }
}

/// Stock levels plus the per-product movement journal.
///
/// Quantity reads are a single map lookup; history reads page through the
/// journal newest first.
#[derive(Debug)]
pub struct StockProjection<S = InMemoryTenantStore<ProductId, StockLevel>>
where
    S: TenantStore<ProductId, StockLevel>,
{
    levels: S,
    journal: RwLock<HashMap<(TenantId, ProductId), Vec<StockMovement>>>,
    cursors: StreamCursors,
}

impl Default for StockProjection {
    fn default() -> Self {
        Self::new(InMemoryTenantStore::new())
    }
}

impl<S> StockProjection<S>
where
    S: TenantStore<ProductId, StockLevel>,
{
    pub fn new(levels: S) -> Self {
        Self {
            levels,
            journal: RwLock::new(HashMap::new()),
            cursors: StreamCursors::new(),
        }
    }

    /// Current quantity; 0 for a product that never moved.
    pub fn quantity(&self, tenant_id: TenantId, product_id: &ProductId) -> u32 {
        self.levels
            .get(tenant_id, product_id)
            .map(|l| l.quantity)
            .unwrap_or(0)
    }

    pub fn level(&self, tenant_id: TenantId, product_id: &ProductId) -> StockLevel {
        self.levels
            .get(tenant_id, product_id)
            .unwrap_or_else(|| StockLevel::empty(*product_id))
    }

    pub fn levels(&self, tenant_id: TenantId) -> Vec<StockLevel> {
        self.levels.list(tenant_id)
    }

    /// Movements newest first, skipping `offset` and returning at most `limit`.
    pub fn history(
        &self,
        tenant_id: TenantId,
        product_id: &ProductId,
        limit: usize,
        offset: usize,
    ) -> Vec<StockMovement> {
        let Ok(journal) = self.journal.read() else {
            return vec![];
        };
        journal
            .get(&(tenant_id, *product_id))
            .map(|movements| {
                movements
                    .iter()
                    .rev()
                    .skip(offset)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every movement of the tenant within `[from, to)`, oldest first.
    pub fn movements_between(
        &self,
        tenant_id: TenantId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Vec<StockMovement> {
        let Ok(journal) = self.journal.read() else {
            return vec![];
        };
        let mut movements: Vec<StockMovement> = journal
            .iter()
            .filter(|((t, _), _)| *t == tenant_id)
            .flat_map(|(_, m)| m.iter())
            .filter(|m| m.occurred_at >= from && m.occurred_at < to)
            .cloned()
            .collect();
        movements.sort_by_key(|m| m.occurred_at);
        movements
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<Applied, ProjectionError> {
        self.cursors.apply(envelope, || {
            let StockEvent::MovementRecorded(movement) = decode(envelope, StockEvent::tenant_id)?;
            if movement.product_id.aggregate_id() != envelope.aggregate_id() {
                return Err(ProjectionError::TenantIsolation(
                    "movement product_id does not match envelope aggregate_id".to_string(),
                ));
            }

            let tenant_id = envelope.tenant_id();
            let current = self.quantity(tenant_id, &movement.product_id);
            if movement.previous_quantity != current {
                return Err(ProjectionError::Invalid(format!(
                    "movement starts at {} but the cached quantity is {current}",
                    movement.previous_quantity
                )));
            }

            self.levels.update(tenant_id, movement.product_id, &mut |level| {
                let mut level = level.unwrap_or_else(|| StockLevel::empty(movement.product_id));
                level.quantity = movement.new_quantity;
                level.movement_count += 1;
                level.last_movement_at = Some(movement.occurred_at);
                level
            });

            let mut journal = self
                .journal
                .write()
                .map_err(|_| ProjectionError::Invalid("journal lock poisoned".to_string()))?;
            journal
                .entry((tenant_id, movement.product_id))
                .or_default()
                .push(movement);
            Ok(())
        })
    }

    pub fn reset(&self) {
        self.cursors.reset();
        self.levels.clear_all();
        if let Ok(mut journal) = self.journal.write() {
            journal.clear();
        }
    }
}
