//! `sentinel-core`: shared identity primitives.
//!
//! This crate contains **pure** building blocks (no infrastructure concerns).

pub mod clock;
pub mod entity;
pub mod error;
pub mod id;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{ClaimId, RoleId, SecurityEventId, UserId};
