use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use gescom_core::{AggregateId, TenantId, UserId};
use gescom_events::EventEnvelope;

use super::cursor::{Applied, ProjectionError};

/// Entries kept per tenant; older ones are dropped first.
pub const DEFAULT_ACTIVITY_CAPACITY: usize = 1_000;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityAction {
    Create,
    Update,
    Sale,
    Payment,
    StockIn,
    StockOut,
    Cancel,
}

impl core::str::FromStr for ActivityAction {
    type Err = gescom_core::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CREATE" => Ok(Self::Create),
            "UPDATE" => Ok(Self::Update),
            "SALE" => Ok(Self::Sale),
            "PAYMENT" => Ok(Self::Payment),
            "STOCK_IN" => Ok(Self::StockIn),
            "STOCK_OUT" => Ok(Self::StockOut),
            "CANCEL" => Ok(Self::Cancel),
            other => Err(gescom_core::DomainError::invalid_input(format!(
                "unknown activity action '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityEntry {
    pub event_id: Uuid,
    pub action: ActivityAction,
    /// Aggregate type the event belongs to (`sales.order`, ...).
    pub entity: String,
    pub entity_id: AggregateId,
    pub event_type: String,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Filter for [`ActivityLogProjection::recent`].
#[derive(Debug, Clone, Default)]
pub struct ActivityFilter {
    pub actor: Option<UserId>,
    pub action: Option<ActivityAction>,
    pub entity: Option<String>,
}

/// Recent activity per tenant, fed from the bus by a background worker.
///
/// Bus delivery order across concurrent commits is not stream order, so this
/// projection deduplicates on event id instead of keeping stream cursors.
#[derive(Debug)]
pub struct ActivityLogProjection {
    capacity: usize,
    entries: RwLock<HashMap<TenantId, VecDeque<ActivityEntry>>>,
}

impl Default for ActivityLogProjection {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_ACTIVITY_CAPACITY)
    }
}

impl ActivityLogProjection {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Newest first, at most `limit` entries.
    pub fn recent(&self, tenant_id: TenantId, filter: &ActivityFilter, limit: usize) -> Vec<ActivityEntry> {
        let Ok(entries) = self.entries.read() else {
            return vec![];
        };
        let Some(log) = entries.get(&tenant_id) else {
            return vec![];
        };

        let mut matching: Vec<ActivityEntry> = log
            .iter()
            .filter(|e| filter.actor.is_none() || e.actor == filter.actor)
            .filter(|e| filter.action.is_none_or(|a| e.action == a))
            .filter(|e| filter.entity.as_deref().is_none_or(|t| e.entity == t))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
        matching.truncate(limit);
        matching
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<Applied, ProjectionError> {
        let entry = ActivityEntry {
            event_id: envelope.event_id(),
            action: classify(envelope.event_type(), envelope.payload()),
            entity: envelope.aggregate_type().to_string(),
            entity_id: envelope.aggregate_id(),
            event_type: envelope.event_type().to_string(),
            actor: actor_of(envelope.payload()),
            occurred_at: envelope.occurred_at(),
        };

        let mut entries = self
            .entries
            .write()
            .map_err(|_| ProjectionError::Invalid("activity log lock poisoned".to_string()))?;
        let log = entries.entry(envelope.tenant_id()).or_default();
        if log.iter().any(|e| e.event_id == entry.event_id) {
            return Ok(Applied::Skipped);
        }

        log.push_back(entry);
        while log.len() > self.capacity {
            log.pop_front();
        }
        Ok(Applied::Applied)
    }

    pub fn reset(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }
}

/// Payloads are externally tagged enums: `{"Variant": {...}}`.
fn body(payload: &JsonValue) -> Option<&JsonValue> {
    payload.as_object()?.values().next()
}

fn actor_of(payload: &JsonValue) -> Option<UserId> {
    let raw = body(payload)?.get("actor")?;
    serde_json::from_value(raw.clone()).ok()
}

fn classify(event_type: &str, payload: &JsonValue) -> ActivityAction {
    match event_type.rsplit('.').next().unwrap_or_default() {
        "created" | "registered" | "placed" | "issued" => ActivityAction::Create,
        "recorded" => ActivityAction::Sale,
        "payment_recorded" => ActivityAction::Payment,
        "canceled" | "deactivated" => ActivityAction::Cancel,
        "movement_recorded" => {
            let delta = body(payload)
                .and_then(|b| b.get("delta"))
                .and_then(JsonValue::as_i64)
                .unwrap_or(0);
            if delta < 0 {
                ActivityAction::StockOut
            } else {
                ActivityAction::StockIn
            }
        }
        _ => ActivityAction::Update,
    }
}
