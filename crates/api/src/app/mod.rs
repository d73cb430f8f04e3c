//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store/issuer wiring from `ApiConfig`
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use sentinel_infra::SecurityAuditService;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs` and tests).
pub fn build_app(service: SecurityAuditService) -> Router {
    let service = Arc::new(service);
    let auth_state = middleware::AuthState {
        service: service.clone(),
    };

    // Protected routes: require a verified bearer credential.
    let protected = routes::router().layer(
        ServiceBuilder::new()
            .layer(axum::middleware::from_fn_with_state(
                auth_state,
                middleware::auth_middleware,
            ))
            .layer(Extension(service)),
    );

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
}
