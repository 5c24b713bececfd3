use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Extension, Path, Query,
    },
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};

use gescom_core::RequestContext;
use gescom_infra::Gescom;
use gescom_sales::{SalesOrderId, SalesOrderStatus};

use crate::app::dto;
use crate::app::errors::{self, HandlerResult};

pub fn router() -> Router {
    Router::new()
        .route("/", post(place_order).get(list_orders))
        .route("/:id", get(get_order))
        .route("/:id/lines", post(add_line))
        .route("/:id/lines/:line_no", delete(remove_line))
        .route("/:id/discount", put(set_discount))
        .route("/:id/confirm", post(confirm_order))
        .route("/:id/cancel", post(cancel_order))
        .route("/:id/deliveries", post(create_delivery))
        .route("/:id/invoice", post(create_invoice))
}

fn order_id(raw: &str) -> Result<SalesOrderId, axum::response::Response> {
    errors::parse_id(raw, "order")
}

pub async fn place_order(
    Extension(app): Extension<Arc<Gescom>>,
    Extension(ctx): Extension<RequestContext>,
    body: Result<Json<dto::PlaceOrderRequest>, JsonRejection>,
) -> HandlerResult {
    let Json(body) = body.map_err(|e| errors::invalid_input(e.body_text()))?;
    errors::respond(StatusCode::CREATED, app.place_order(&ctx, body.into()))
}

pub async fn list_orders(
    Extension(app): Extension<Arc<Gescom>>,
    Extension(ctx): Extension<RequestContext>,
    query: Result<Query<dto::StatusQuery>, QueryRejection>,
) -> HandlerResult {
    let Query(query) = query.map_err(|e| errors::invalid_input(e.body_text()))?;
    let status = query
        .status
        .as_deref()
        .map(str::parse::<SalesOrderStatus>)
        .transpose()
        .map_err(|e| errors::domain_error_to_response(&e))?;
    errors::respond(StatusCode::OK, Ok(app.orders(&ctx, status)))
}

pub async fn get_order(
    Extension(app): Extension<Arc<Gescom>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> HandlerResult {
    errors::respond(StatusCode::OK, app.order(&ctx, order_id(&id)?))
}

pub async fn add_line(
    Extension(app): Extension<Arc<Gescom>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
    body: Result<Json<dto::OrderLineRequest>, JsonRejection>,
) -> HandlerResult {
    let order_id = order_id(&id)?;
    let Json(body) = body.map_err(|e| errors::invalid_input(e.body_text()))?;
    errors::respond(StatusCode::OK, app.add_line(&ctx, order_id, body.into()))
}

pub async fn remove_line(
    Extension(app): Extension<Arc<Gescom>>,
    Extension(ctx): Extension<RequestContext>,
    Path((id, line_no)): Path<(String, String)>,
) -> HandlerResult {
    let order_id = order_id(&id)?;
    let line_no: u32 = line_no
        .parse()
        .map_err(|_| errors::invalid_input(format!("invalid line number '{line_no}'")))?;
    errors::respond(StatusCode::OK, app.remove_line(&ctx, order_id, line_no))
}

pub async fn set_discount(
    Extension(app): Extension<Arc<Gescom>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
    body: Result<Json<dto::DiscountRequest>, JsonRejection>,
) -> HandlerResult {
    let order_id = order_id(&id)?;
    let Json(body) = body.map_err(|e| errors::invalid_input(e.body_text()))?;
    errors::respond(StatusCode::OK, app.set_discount(&ctx, order_id, body.discount))
}

pub async fn confirm_order(
    Extension(app): Extension<Arc<Gescom>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> HandlerResult {
    errors::respond(StatusCode::OK, app.confirm_order(&ctx, order_id(&id)?))
}

/// The body is optional; `{"reason": "..."}` is recorded on the order.
pub async fn cancel_order(
    Extension(app): Extension<Arc<Gescom>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
    body: Bytes,
) -> HandlerResult {
    let order_id = order_id(&id)?;
    let reason = errors::optional_json::<dto::ReasonRequest>(&body)?.and_then(|b| b.reason);
    errors::respond(StatusCode::OK, app.cancel_order(&ctx, order_id, reason))
}

pub async fn create_delivery(
    Extension(app): Extension<Arc<Gescom>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
    body: Bytes,
) -> HandlerResult {
    let order_id = order_id(&id)?;
    let details = errors::optional_json::<dto::CreateDeliveryRequest>(&body)?.unwrap_or_default();
    errors::respond(StatusCode::CREATED, app.create_delivery(&ctx, order_id, details.into()))
}

pub async fn create_invoice(
    Extension(app): Extension<Arc<Gescom>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
    body: Result<Json<dto::CreateInvoiceRequest>, JsonRejection>,
) -> HandlerResult {
    let order_id = order_id(&id)?;
    let Json(body) = body.map_err(|e| errors::invalid_input(e.body_text()))?;
    errors::respond(StatusCode::CREATED, app.create_invoice(&ctx, order_id, body.into()))
}
