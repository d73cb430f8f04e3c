use std::sync::Arc;

use axum::{
    extract::State,
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use sentinel_infra::SecurityAuditService;

use crate::app::errors;
use crate::context::CallerContext;

#[derive(Clone)]
pub struct AuthState {
    pub service: Arc<SecurityAuditService>,
}

/// Authenticate the bearer credential and attach a `CallerContext`.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let token = extract_bearer(req.headers()).map(str::to_owned);

    let principal = state
        .service
        .authenticate(token.as_deref())
        .await
        .map_err(errors::access_error_to_response)?;

    req.extensions_mut().insert(CallerContext::new(principal));

    Ok(next.run(req).await)
}

/// The credential, if an `Authorization: Bearer` header carries one.
fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?;
    let header = header.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}
