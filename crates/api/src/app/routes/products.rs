use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};

use gescom_core::RequestContext;
use gescom_infra::Gescom;
use gescom_products::ProductId;

use crate::app::dto;
use crate::app::errors::{self, HandlerResult};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_product).get(list_products))
        .route("/:id", get(get_product).put(update_product))
        .route("/:id/status", patch(set_status))
}

pub async fn create_product(
    Extension(app): Extension<Arc<Gescom>>,
    Extension(ctx): Extension<RequestContext>,
    body: Result<Json<dto::CreateProductRequest>, JsonRejection>,
) -> HandlerResult {
    let Json(body) = body.map_err(|e| errors::invalid_input(e.body_text()))?;
    errors::respond(StatusCode::CREATED, app.create_product(&ctx, body.into()))
}

pub async fn list_products(
    Extension(app): Extension<Arc<Gescom>>,
    Extension(ctx): Extension<RequestContext>,
) -> HandlerResult {
    errors::respond(StatusCode::OK, Ok(app.products(&ctx)))
}

pub async fn get_product(
    Extension(app): Extension<Arc<Gescom>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> HandlerResult {
    let product_id: ProductId = errors::parse_id(&id, "product")?;
    errors::respond(StatusCode::OK, app.product(&ctx, product_id))
}

pub async fn update_product(
    Extension(app): Extension<Arc<Gescom>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
    body: Result<Json<dto::UpdateProductRequest>, JsonRejection>,
) -> HandlerResult {
    let product_id: ProductId = errors::parse_id(&id, "product")?;
    let Json(body) = body.map_err(|e| errors::invalid_input(e.body_text()))?;

    let current = app.product(&ctx, product_id).map_err(errors::service_error_to_response)?;
    let changes = body.into_changes(&current.product);
    errors::respond(StatusCode::OK, app.update_product(&ctx, product_id, changes))
}

pub async fn set_status(
    Extension(app): Extension<Arc<Gescom>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
    body: Result<Json<dto::SetStatusRequest>, JsonRejection>,
) -> HandlerResult {
    let product_id: ProductId = errors::parse_id(&id, "product")?;
    let Json(body) = body.map_err(|e| errors::invalid_input(e.body_text()))?;
    errors::respond(StatusCode::OK, app.set_product_active(&ctx, product_id, body.active))
}
