use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Extension, Path, Query,
    },
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use gescom_core::RequestContext;
use gescom_infra::Gescom;
use gescom_invoicing::{InvoiceId, InvoiceStatus};

use crate::app::dto;
use crate::app::errors::{self, HandlerResult};

/// Invoices are created through `POST /orders/:id/invoice`.
pub fn router() -> Router {
    Router::new()
        .route("/", get(list_invoices))
        .route("/overdue", get(overdue_invoices))
        .route("/number/:number", get(get_invoice_by_number))
        .route("/:id", get(get_invoice))
        .route("/:id/payments", post(record_payment))
        .route("/:id/cancel", post(cancel_invoice))
}

pub async fn list_invoices(
    Extension(app): Extension<Arc<Gescom>>,
    Extension(ctx): Extension<RequestContext>,
    query: Result<Query<dto::StatusQuery>, QueryRejection>,
) -> HandlerResult {
    let Query(query) = query.map_err(|e| errors::invalid_input(e.body_text()))?;
    let status = query
        .status
        .as_deref()
        .map(str::parse::<InvoiceStatus>)
        .transpose()
        .map_err(|e| errors::domain_error_to_response(&e))?;
    errors::respond(StatusCode::OK, Ok(app.invoices(&ctx, status)))
}

pub async fn overdue_invoices(
    Extension(app): Extension<Arc<Gescom>>,
    Extension(ctx): Extension<RequestContext>,
) -> HandlerResult {
    errors::respond(StatusCode::OK, Ok(app.overdue_invoices(&ctx)))
}

pub async fn get_invoice(
    Extension(app): Extension<Arc<Gescom>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> HandlerResult {
    let invoice_id: InvoiceId = errors::parse_id(&id, "invoice")?;
    errors::respond(StatusCode::OK, app.invoice(&ctx, invoice_id))
}

pub async fn get_invoice_by_number(
    Extension(app): Extension<Arc<Gescom>>,
    Extension(ctx): Extension<RequestContext>,
    Path(number): Path<String>,
) -> HandlerResult {
    errors::respond(StatusCode::OK, app.invoice_by_number(&ctx, &number))
}

pub async fn record_payment(
    Extension(app): Extension<Arc<Gescom>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
    body: Result<Json<dto::RecordPaymentRequest>, JsonRejection>,
) -> HandlerResult {
    let invoice_id: InvoiceId = errors::parse_id(&id, "invoice")?;
    let Json(body) = body.map_err(|e| errors::invalid_input(e.body_text()))?;
    errors::respond(StatusCode::CREATED, app.record_payment(&ctx, invoice_id, body.into()))
}

pub async fn cancel_invoice(
    Extension(app): Extension<Arc<Gescom>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
    body: Bytes,
) -> HandlerResult {
    let invoice_id: InvoiceId = errors::parse_id(&id, "invoice")?;
    let reason = errors::optional_json::<dto::ReasonRequest>(&body)?.and_then(|b| b.reason);
    errors::respond(StatusCode::OK, app.cancel_invoice(&ctx, invoice_id, reason))
}
