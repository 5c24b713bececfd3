use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    routing::get,
    Router,
};

use gescom_core::RequestContext;
use gescom_infra::Gescom;
use gescom_sales::DeliveryId;

use crate::app::errors::{self, HandlerResult};

/// Deliveries are created through `POST /orders/:id/deliveries`.
pub fn router() -> Router {
    Router::new()
        .route("/", get(list_deliveries))
        .route("/:id", get(get_delivery))
}

pub async fn list_deliveries(
    Extension(app): Extension<Arc<Gescom>>,
    Extension(ctx): Extension<RequestContext>,
) -> HandlerResult {
    errors::respond(StatusCode::OK, Ok(app.deliveries(&ctx)))
}

pub async fn get_delivery(
    Extension(app): Extension<Arc<Gescom>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> HandlerResult {
    let delivery_id: DeliveryId = errors::parse_id(&id, "delivery")?;
    errors::respond(StatusCode::OK, app.delivery(&ctx, delivery_id))
}
