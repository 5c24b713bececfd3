//! Product catalog domain module (event-sourced).
//!
//! Catalog data only: code, name, prices, unit, alert threshold, active flag.
//! The on-hand quantity lives in the product's stock ledger
//! (`gescom-inventory`), which has its own stream.

pub mod product;

pub use product::{
    ChangePrices, CreateProduct, Product, ProductActivated, ProductCommand, ProductCreated,
    ProductDeactivated, ProductDetails, ProductDetailsUpdated, ProductEvent, ProductId,
    ProductPrices, ProductPricesChanged, SetProductActive, UpdateProductDetails,
    DEFAULT_MIN_STOCK_ALERT, DEFAULT_UNIT,
};
