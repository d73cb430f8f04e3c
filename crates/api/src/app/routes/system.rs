use axum::{Extension, Json, http::StatusCode, response::IntoResponse};

use sentinel_infra::UserSummary;

use crate::app::dto::WhoAmI;
use crate::context::CallerContext;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(Extension(caller): Extension<CallerContext>) -> impl IntoResponse {
    let principal = caller.principal();
    Json(WhoAmI {
        provider: principal.provider.clone(),
        external_id: principal.principal.external_id.clone(),
        email: principal.principal.email.clone(),
        user: caller
            .user()
            .map(|u| UserSummary::new(&u.user, Some(&u.role))),
    })
}
