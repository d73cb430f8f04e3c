//! HTTP API: a thin transport adapter over `SecurityAuditService`.

pub mod app;
pub mod authz;
pub mod config;
pub mod context;
pub mod middleware;
