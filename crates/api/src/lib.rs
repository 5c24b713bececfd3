//! HTTP API: routing, request context and request/response mapping.

pub mod app;
pub mod context;
pub mod middleware;
