use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Extension, Query},
    http::StatusCode,
    routing::get,
    Router,
};

use gescom_core::RequestContext;
use gescom_infra::projections::{ActivityAction, ActivityFilter};
use gescom_infra::Gescom;

use crate::app::dto;
use crate::app::errors::{self, HandlerResult};

/// Entries returned by `/activity` when no limit is given.
const DEFAULT_ACTIVITY_LIMIT: usize = 20;

pub fn router() -> Router {
    Router::new()
        .route("/cash-register", get(cash_register))
        .route("/dashboard", get(dashboard))
}

pub fn activity_router() -> Router {
    Router::new().route("/activity", get(activity))
}

pub async fn cash_register(
    Extension(app): Extension<Arc<Gescom>>,
    Extension(ctx): Extension<RequestContext>,
    query: Result<Query<dto::CashRegisterQuery>, QueryRejection>,
) -> HandlerResult {
    let Query(query) = query.map_err(|e| errors::invalid_input(e.body_text()))?;
    errors::respond(
        StatusCode::OK,
        app.cash_register(&ctx, query.from, query.to, query.created_by),
    )
}

pub async fn dashboard(
    Extension(app): Extension<Arc<Gescom>>,
    Extension(ctx): Extension<RequestContext>,
) -> HandlerResult {
    errors::respond(StatusCode::OK, app.dashboard(&ctx))
}

pub async fn activity(
    Extension(app): Extension<Arc<Gescom>>,
    Extension(ctx): Extension<RequestContext>,
    query: Result<Query<dto::ActivityQuery>, QueryRejection>,
) -> HandlerResult {
    let Query(query) = query.map_err(|e| errors::invalid_input(e.body_text()))?;
    let action = query
        .action
        .as_deref()
        .map(str::parse::<ActivityAction>)
        .transpose()
        .map_err(|e| errors::domain_error_to_response(&e))?;

    let filter = ActivityFilter {
        actor: query.actor,
        action,
        entity: query.entity,
    };
    let limit = query.limit.unwrap_or(DEFAULT_ACTIVITY_LIMIT);
    errors::respond(StatusCode::OK, Ok(app.activity(&ctx, &filter, limit)))
}
