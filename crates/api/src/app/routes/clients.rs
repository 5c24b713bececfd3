use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Extension, Path, Query,
    },
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};

use gescom_clients::ClientType;
use gescom_core::{ClientId, RequestContext};
use gescom_infra::projections::ClientFilter;
use gescom_infra::Gescom;

use crate::app::dto;
use crate::app::errors::{self, HandlerResult};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_client).get(list_clients))
        .route("/:id", get(get_client).put(update_client))
        .route("/:id/status", patch(set_status))
}

pub async fn create_client(
    Extension(app): Extension<Arc<Gescom>>,
    Extension(ctx): Extension<RequestContext>,
    body: Result<Json<dto::ClientRequest>, JsonRejection>,
) -> HandlerResult {
    let Json(body) = body.map_err(|e| errors::invalid_input(e.body_text()))?;
    errors::respond(StatusCode::CREATED, app.create_client(&ctx, body.into()))
}

/// `?active=true&type=ENTREPRISE`
pub async fn list_clients(
    Extension(app): Extension<Arc<Gescom>>,
    Extension(ctx): Extension<RequestContext>,
    query: Result<Query<dto::ClientQuery>, QueryRejection>,
) -> HandlerResult {
    let Query(query) = query.map_err(|e| errors::invalid_input(e.body_text()))?;
    let client_type = query
        .client_type
        .as_deref()
        .map(str::parse::<ClientType>)
        .transpose()
        .map_err(|e| errors::domain_error_to_response(&e))?;
    let filter = ClientFilter {
        active: query.active,
        client_type,
    };
    errors::respond(StatusCode::OK, Ok(app.clients(&ctx, filter)))
}

pub async fn get_client(
    Extension(app): Extension<Arc<Gescom>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> HandlerResult {
    let client_id: ClientId = errors::parse_id(&id, "client")?;
    errors::respond(StatusCode::OK, app.client(&ctx, client_id))
}

pub async fn update_client(
    Extension(app): Extension<Arc<Gescom>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
    body: Result<Json<dto::ClientRequest>, JsonRejection>,
) -> HandlerResult {
    let client_id: ClientId = errors::parse_id(&id, "client")?;
    let Json(body) = body.map_err(|e| errors::invalid_input(e.body_text()))?;
    errors::respond(StatusCode::OK, app.update_client(&ctx, client_id, body.into()))
}

pub async fn set_status(
    Extension(app): Extension<Arc<Gescom>>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
    body: Result<Json<dto::SetStatusRequest>, JsonRejection>,
) -> HandlerResult {
    let client_id: ClientId = errors::parse_id(&id, "client")?;
    let Json(body) = body.map_err(|e| errors::invalid_input(e.body_text()))?;
    errors::respond(StatusCode::OK, app.set_client_active(&ctx, client_id, body.active))
}
