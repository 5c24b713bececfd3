use axum::{
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::app::errors;
use crate::context;

/// Resolve the tenant/actor headers into a `RequestContext` extension.
pub async fn context_middleware(mut req: Request<axum::body::Body>, next: Next) -> Response {
    let ctx = match context::from_headers(req.headers()) {
        Ok(ctx) => ctx,
        Err(e) => {
            tracing::debug!(error = %e, path = %req.uri().path(), "rejected request without tenant context");
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_context", e.to_string());
        }
    };

    req.extensions_mut().insert(ctx);
    next.run(req).await
}
