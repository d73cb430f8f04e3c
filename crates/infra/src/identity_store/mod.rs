//! Identity store boundary.
//!
//! Users, roles, claims and the append-only security event log live behind one
//! trait so that a role change and its audit record can commit together.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryIdentityStore;
pub use postgres::PostgresIdentityStore;
pub use r#trait::{IdentityStore, RoleChange, SharedStore, StoreError};
