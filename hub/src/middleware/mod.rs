//! Cross-cutting HTTP middleware: rate limiting, request tracking, security headers.

pub mod governor;
pub mod request_tracking;
pub mod route_matcher;
pub mod security_headers;

pub use governor::{GovernorConfig, GovernorRateLimit, RateLimitExceeded};
pub use request_tracking::{
    request_id_layer, request_id_propagation_layer, sensitive_headers_layer,
    RequestTrackingConfig, PROPAGATE_HEADERS, SENSITIVE_HEADERS,
};
pub use route_matcher::{normalize_path, CompiledRoutePatterns};
pub use security_headers::apply_security_headers;
