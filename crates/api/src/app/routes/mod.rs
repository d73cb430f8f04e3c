use axum::{
    Router,
    routing::{get, post},
};

pub mod events;
pub mod session;
pub mod system;
pub mod users;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/session/login", post(session::login))
        .route("/session/logout", post(session::logout))
        .route("/users", get(users::list_users))
        .route("/users/:id/role", post(users::assign_role))
        .route("/roles", get(users::list_roles))
        .nest("/events", events::router())
}
