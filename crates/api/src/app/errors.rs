use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;

use gescom_core::DomainError;
use gescom_infra::command_dispatcher::DispatchError;
use gescom_infra::ServiceError;

/// Handlers short-circuit with a ready-made error response.
pub type HandlerResult = Result<Response, Response>;

pub fn domain_error_to_response(err: &DomainError) -> Response {
    let status = match err {
        DomainError::InvalidInput(_) | DomainError::InvalidId(_) => StatusCode::BAD_REQUEST,
        DomainError::InsufficientStock { .. }
        | DomainError::OrderLocked(_)
        | DomainError::OrderNotDelivered
        | DomainError::DuplicateInvoice
        | DomainError::Conflict(_) => StatusCode::CONFLICT,
        DomainError::OverPayment { .. } | DomainError::InvariantViolation(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        DomainError::NotFound => StatusCode::NOT_FOUND,
    };
    json_error(status, err.code(), err.to_string())
}

pub fn dispatch_error_to_response(err: DispatchError) -> Response {
    match err {
        DispatchError::Domain(e) => domain_error_to_response(&e),
        DispatchError::Concurrency(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DispatchError::TenantIsolation(msg) => json_error(StatusCode::FORBIDDEN, "tenant_isolation", msg),
        DispatchError::Deserialize(msg) => {
            tracing::error!(error = %msg, "stored event could not be decoded");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "deserialize_error", msg)
        }
        DispatchError::Store(e) => {
            tracing::error!(error = %e, "event store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string())
        }
    }
}

pub fn service_error_to_response(err: ServiceError) -> Response {
    match err {
        ServiceError::Dispatch(e) => dispatch_error_to_response(e),
        ServiceError::Projection(e) => {
            tracing::error!(error = %e, "read model failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "projection_error", e.to_string())
        }
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn invalid_input(message: impl Into<String>) -> Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_input", message)
}

/// Parse a path segment into a typed id.
pub fn parse_id<T: core::str::FromStr>(raw: &str, what: &str) -> Result<T, Response> {
    raw.parse()
        .map_err(|_| json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what} id '{raw}'")))
}

/// Decode a body that may be left out: blank means `None`, anything else must be
/// valid JSON for `T`, unknown fields included.
pub fn optional_json<T: DeserializeOwned>(body: &[u8]) -> Result<Option<T>, Response> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body)
        .map(Some)
        .map_err(|e| invalid_input(format!("invalid JSON body: {e}")))
}

/// Serialize a service result, or map its error.
pub fn respond<T: Serialize>(status: StatusCode, result: Result<T, ServiceError>) -> HandlerResult {
    match result {
        Ok(value) => Ok((status, axum::Json(value)).into_response()),
        Err(e) => Err(service_error_to_response(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: DomainError) -> StatusCode {
        domain_error_to_response(&err).status()
    }

    #[test]
    fn domain_errors_map_to_http_statuses() {
        assert_eq!(status_of(DomainError::invalid_input("x")), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(DomainError::InsufficientStock { requested: 15, available: 10 }),
            StatusCode::CONFLICT
        );
        assert_eq!(status_of(DomainError::order_locked("x")), StatusCode::CONFLICT);
        assert_eq!(status_of(DomainError::OrderNotDelivered), StatusCode::CONFLICT);
        assert_eq!(status_of(DomainError::DuplicateInvoice), StatusCode::CONFLICT);
        assert_eq!(
            status_of(DomainError::OverPayment {
                amount: "50.00".to_string(),
                outstanding: "40.00".to_string()
            }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(status_of(DomainError::NotFound), StatusCode::NOT_FOUND);
    }

    #[test]
    fn exhausted_retries_are_a_conflict() {
        let response = dispatch_error_to_response(DispatchError::Concurrency("stale".to_string()));
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn blank_optional_body_is_none_but_bad_json_is_rejected() {
        use crate::app::dto::ReasonRequest;

        assert!(optional_json::<ReasonRequest>(b"").unwrap().is_none());
        assert!(optional_json::<ReasonRequest>(b"  \n").unwrap().is_none());

        let parsed = optional_json::<ReasonRequest>(br#"{"reason":"client left"}"#).unwrap();
        assert_eq!(parsed.and_then(|r| r.reason).as_deref(), Some("client left"));

        let unknown = optional_json::<ReasonRequest>(br#"{"motif":"x"}"#).unwrap_err();
        assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);
        let malformed = optional_json::<ReasonRequest>(b"{reason").unwrap_err();
        assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
    }
}
