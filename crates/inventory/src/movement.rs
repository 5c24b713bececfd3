use core::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gescom_core::{DomainError, Money, TenantId, UserId};
use gescom_products::ProductId;

/// Kind of stock movement.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovementType {
    #[serde(rename = "IN")]
    StockIn,
    #[serde(rename = "OUT")]
    StockOut,
    #[serde(rename = "ADJUSTMENT")]
    Adjustment,
    #[serde(rename = "RETURN")]
    Return,
    #[serde(rename = "DAMAGE")]
    Damage,
    /// Transfer out of this location.
    #[serde(rename = "TRANSFER")]
    Transfer,
}

/// Which way a movement moves the on-hand quantity.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MovementDirection {
    Inbound,
    Outbound,
    /// Sets the quantity to an absolute target.
    Absolute,
}

impl MovementType {
    pub const ALL: [MovementType; 6] = [
        MovementType::StockIn,
        MovementType::StockOut,
        MovementType::Adjustment,
        MovementType::Return,
        MovementType::Damage,
        MovementType::Transfer,
    ];

    pub fn direction(self) -> MovementDirection {
        match self {
            MovementType::StockIn | MovementType::Return => MovementDirection::Inbound,
            MovementType::StockOut | MovementType::Damage | MovementType::Transfer => {
                MovementDirection::Outbound
            }
            MovementType::Adjustment => MovementDirection::Absolute,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MovementType::StockIn => "IN",
            MovementType::StockOut => "OUT",
            MovementType::Adjustment => "ADJUSTMENT",
            MovementType::Return => "RETURN",
            MovementType::Damage => "DAMAGE",
            MovementType::Transfer => "TRANSFER",
        }
    }
}

impl fmt::Display for MovementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for MovementType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MovementType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DomainError::invalid_input(format!("unknown movement type '{s}'")))
    }
}

/// Quantity carried by a movement.
///
/// Adjustments set an absolute target; every other movement moves by a
/// positive delta in the direction of its type.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementQuantity {
    Delta(u32),
    SetTo(u32),
}

impl MovementQuantity {
    /// Check the quantity form against the movement type.
    pub fn validate_for(self, movement_type: MovementType) -> Result<(), DomainError> {
        match (movement_type.direction(), self) {
            (MovementDirection::Absolute, MovementQuantity::SetTo(_)) => Ok(()),
            (MovementDirection::Absolute, MovementQuantity::Delta(_)) => Err(
                DomainError::invalid_input("ADJUSTMENT takes an absolute target (set_to)"),
            ),
            (_, MovementQuantity::SetTo(_)) => Err(DomainError::invalid_input(format!(
                "{movement_type} takes a positive delta, not an absolute target"
            ))),
            (_, MovementQuantity::Delta(0)) => {
                Err(DomainError::invalid_input("quantity must be positive"))
            }
            (_, MovementQuantity::Delta(_)) => Ok(()),
        }
    }
}

/// Immutable record of one movement on a product's ledger.
///
/// `new_quantity = previous_quantity + delta` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub movement_type: MovementType,
    pub quantity: MovementQuantity,
    pub delta: i64,
    pub previous_quantity: u32,
    pub new_quantity: u32,
    pub reason: Option<String>,
    pub reference: Option<String>,
    pub unit_cost: Option<Money>,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}
