use axum::Router;

pub mod clients;
pub mod deliveries;
pub mod invoices;
pub mod orders;
pub mod products;
pub mod reports;
pub mod stock;
pub mod system;

/// Router for all tenant-scoped endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/products", products::router())
        .nest("/clients", clients::router())
        .nest("/stock", stock::router())
        .nest("/orders", orders::router())
        .nest("/deliveries", deliveries::router())
        .nest("/invoices", invoices::router())
        .nest("/reports", reports::router())
        .merge(reports::activity_router())
}
