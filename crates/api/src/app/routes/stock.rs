use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Extension, Path, Query,
    },
    http::StatusCode,
    routing::get,
    Json, Router,
};

use gescom_core::RequestContext;
use gescom_infra::Gescom;
use gescom_products::ProductId;

use crate::app::dto;
use crate::app::errors::{self, HandlerResult};

pub fn router() -> Router {
    Router::new()
        .route("/alerts/low", get(low_stock))
        .route("/alerts/out", get(out_of_stock))
        .route("/stats", get(stock_stats))
        .route("/:product_id", get(current_quantity))
        .route("/:product_id/movements", get(movement_history).post(record_movement))
}

pub async fn record_movement(
    Extension(app): Extension<Arc<Gescom>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
    body: Result<Json<dto::RecordMovementRequest>, JsonRejection>,
) -> HandlerResult {
    let product_id: ProductId = errors::parse_id(&id, "product")?;
    let Json(body) = body.map_err(|e| errors::invalid_input(e.body_text()))?;
    errors::respond(
        StatusCode::CREATED,
        app.record_movement(&ctx, body.into_request(product_id)),
    )
}

pub async fn movement_history(
    Extension(app): Extension<Arc<Gescom>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
    query: Result<Query<dto::PageQuery>, QueryRejection>,
) -> HandlerResult {
    let product_id: ProductId = errors::parse_id(&id, "product")?;
    let Query(page) = query.map_err(|e| errors::invalid_input(e.body_text()))?;
    errors::respond(
        StatusCode::OK,
        app.movement_history(&ctx, product_id, page.limit(), page.offset()),
    )
}

pub async fn current_quantity(
    Extension(app): Extension<Arc<Gescom>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> HandlerResult {
    let product_id: ProductId = errors::parse_id(&id, "product")?;
    errors::respond(StatusCode::OK, app.current_quantity(&ctx, product_id))
}

pub async fn low_stock(
    Extension(app): Extension<Arc<Gescom>>,
    Extension(ctx): Extension<RequestContext>,
) -> HandlerResult {
    errors::respond(StatusCode::OK, Ok(app.low_stock(&ctx)))
}

pub async fn out_of_stock(
    Extension(app): Extension<Arc<Gescom>>,
    Extension(ctx): Extension<RequestContext>,
) -> HandlerResult {
    errors::respond(StatusCode::OK, Ok(app.out_of_stock(&ctx)))
}

pub async fn stock_stats(
    Extension(app): Extension<Arc<Gescom>>,
    Extension(ctx): Extension<RequestContext>,
) -> HandlerResult {
    errors::respond(StatusCode::OK, app.stock_stats(&ctx))
}
