//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Users, roles and claims are entities; two records with the same id are the
/// same record regardless of their current attribute values.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> Self::Id;
}
