use serde::{Deserialize, Serialize};

/// Stock level classification against a product's alert threshold.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockStatus {
    InStock,
    LowStock,
    OutOfStock,
}

/// Out of stock at zero; low when at or below the threshold.
pub fn stock_status(quantity: u32, min_stock_alert: u32) -> StockStatus {
    if quantity == 0 {
        StockStatus::OutOfStock
    } else if quantity <= min_stock_alert {
        StockStatus::LowStock
    } else {
        StockStatus::InStock
    }
}
