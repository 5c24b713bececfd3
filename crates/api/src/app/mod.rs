//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: event store selection and read model warm-up
//! - `routes/`: HTTP routes + handlers (one file per domain area)
//! - `dto.rs`: request DTOs and their mapping to workflow inputs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use gescom_infra::Gescom;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs` and tests).
pub fn build_app(app: Arc<Gescom>) -> Router {
    // Tenant-scoped routes: require the tenant context headers.
    let scoped = routes::router()
        .layer(Extension(app))
        .layer(axum::middleware::from_fn(middleware::context_middleware));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(scoped)
        .layer(ServiceBuilder::new())
}
