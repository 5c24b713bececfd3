//! Per-request context taken from headers.
//!
//! Every domain route needs a tenant; the actor is optional and is only
//! recorded on the events it causes.

use axum::http::HeaderMap;
use thiserror::Error;

use gescom_core::{RequestContext, TenantId, UserId};

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const ACTOR_HEADER: &str = "x-actor-id";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("missing X-Tenant-Id header")]
    MissingTenant,

    #[error("invalid X-Tenant-Id header: {0}")]
    InvalidTenant(String),

    #[error("invalid X-Actor-Id header: {0}")]
    InvalidActor(String),
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Build the [`RequestContext`] for a request, stamped with the current time.
pub fn from_headers(headers: &HeaderMap) -> Result<RequestContext, ContextError> {
    let tenant = header(headers, TENANT_HEADER).ok_or(ContextError::MissingTenant)?;
    let tenant_id: TenantId = tenant
        .parse()
        .map_err(|_| ContextError::InvalidTenant(tenant.to_string()))?;

    let actor = match header(headers, ACTOR_HEADER) {
        Some(raw) => Some(
            raw.parse::<UserId>()
                .map_err(|_| ContextError::InvalidActor(raw.to_string()))?,
        ),
        None => None,
    };

    Ok(RequestContext::new(tenant_id, actor))
}
