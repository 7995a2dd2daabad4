//! Resource, link, and instance identifiers.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unique identifier for a resource, link, child, or instance.
/// Uses UUIDv7 for time-ordered, sortable IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct ElementId(Uuid);

impl ElementId {
    /// Create a new unique id using UUIDv7.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Create an id from an existing UUID (e.g. one loaded from persisted state).
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// The all-zero id used as a sentinel for "no instance yet" / a fresh child.
    pub fn nil() -> Self {
        Self(Uuid::nil())
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for ElementId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for ElementId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<ElementId> for Uuid {
    fn from(id: ElementId) -> Self {
        id.0
    }
}

impl std::str::FromStr for ElementId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Joins two resource logical names into the link name `"A::B"`.
pub fn link_name(resource_a: &str, resource_b: &str) -> String {
    format!("{resource_a}::{resource_b}")
}

/// Splits a link name of the form `"A::B"` back into its two endpoint names.
pub fn split_link_name(name: &str) -> Option<(&str, &str)> {
    name.split_once("::")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_name_round_trips() {
        let name = link_name("ordersApi", "ordersDb");
        assert_eq!(name, "ordersApi::ordersDb");
        assert_eq!(split_link_name(&name), Some(("ordersApi", "ordersDb")));
    }

    #[test]
    fn nil_id_detected() {
        assert!(ElementId::nil().is_nil());
        assert!(!ElementId::new().is_nil());
    }
}
