//! ImageShift Infrastructure Library
//!
//! Shared infrastructure for the HTTP service: request id and security header
//! middleware, anti-forgery tokens, and tracing initialization.

pub mod middleware;
pub mod telemetry;

// Re-export commonly used types
pub use middleware::{
    apply_security_headers, get_request_id, request_id_middleware, security_headers_middleware,
    CsrfTokens, RequestId, REQUEST_ID_HEADER,
};
pub use telemetry::{init_telemetry, shutdown_telemetry, DEFAULT_LOG_DIRECTIVES};
