//! Strongly-typed identifiers for twinsync.
//!
//! - [`EntityId`] is the join key of the two metadata feeds. Its ordering is
//!   plain byte-lexicographic order, which is the order both feeds must produce.
//! - [`PolicyRef`] addresses a separately-versioned authorization policy.
//! - [`PassId`] names one reconciliation pass (ULID, sortable by start time).
//!
//! # Example
//!
//! ```rust
//! use twinsync_core::id::{EntityId, PassId};
//!
//! let a = EntityId::new("org.acme:a").unwrap();
//! let b = EntityId::new("org.acme:b").unwrap();
//! assert!(a < b);
//!
//! let pass = PassId::generate();
//! assert_eq!(pass.to_string().len(), 26);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

use crate::error::{Error, Result};

/// Identifier of an entity (digital twin) in the authoritative store.
///
/// Entity IDs must be non-empty and free of control characters. Length is
/// unbounded: whatever the store accepts, the feeds may carry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId(String);

impl EntityId {
    /// Creates a new entity ID after validating the format.
    ///
    /// # Errors
    ///
    /// Returns an error if the ID is empty or contains control characters.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        validate("entity ID", &id)?;
        Ok(Self(id))
    }

    /// Creates an entity ID without validation.
    ///
    /// Intended for IDs read back from a store that already validated them.
    #[must_use]
    pub fn new_unchecked(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the entity ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for EntityId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for EntityId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

/// Reference to an authorization policy.
///
/// Policies are versioned independently of the entities that reference them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PolicyRef(String);

impl PolicyRef {
    /// Creates a new policy reference after validating the format.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference is empty or contains control characters.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        validate("policy reference", &id)?;
        Ok(Self(id))
    }

    /// Creates a policy reference without validation.
    #[must_use]
    pub fn new_unchecked(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the policy reference as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PolicyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PolicyRef {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for PolicyRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for PolicyRef {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<PolicyRef> for String {
    fn from(policy: PolicyRef) -> Self {
        policy.0
    }
}

/// A unique identifier for one reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PassId(Ulid);

impl PassId {
    /// Generates a new unique pass ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new())
    }

    /// Creates a pass ID from a raw ULID.
    #[must_use]
    pub const fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    /// Returns the underlying ULID.
    #[must_use]
    pub const fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl fmt::Display for PassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PassId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ulid::from_string(s)
            .map(Self)
            .map_err(|e| Error::InvalidId {
                message: format!("invalid pass ID '{s}': {e}"),
            })
    }
}

fn validate(kind: &str, id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(Error::InvalidId {
            message: format!("{kind} cannot be empty"),
        });
    }

    if id.chars().any(char::is_control) {
        return Err(Error::InvalidId {
            message: format!("{kind} '{}' contains control characters", id.escape_debug()),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_entity_ids() {
        assert!(EntityId::new("x:0-only-persisted").is_ok());
        assert!(EntityId::new("org.eclipse:thing-1").is_ok());
        assert!(EntityId::new("a").is_ok());
    }

    #[test]
    fn invalid_entity_ids() {
        assert!(EntityId::new("").is_err());
        assert!(EntityId::new("tab\there").is_err());
    }

    #[test]
    fn long_entity_ids_are_accepted() {
        let id = format!("org.acme:{}", "x".repeat(4_096));
        assert_eq!(EntityId::new(id.clone()).unwrap().as_str(), id);

        let json = serde_json::to_string(&id).unwrap();
        assert!(serde_json::from_str::<EntityId>(&json).is_ok());
    }

    #[test]
    fn entity_ids_order_lexicographically() {
        let ids: Vec<EntityId> = ["b", "a", "B", "ab"]
            .into_iter()
            .map(EntityId::new_unchecked)
            .collect();
        let mut sorted = ids.clone();
        sorted.sort();
        let sorted: Vec<&str> = sorted.iter().map(EntityId::as_str).collect();
        assert_eq!(sorted, vec!["B", "a", "ab", "b"]);
    }

    #[test]
    fn entity_id_deserialize_validates() {
        let ok: EntityId = serde_json::from_str("\"x:1\"").unwrap();
        assert_eq!(ok.as_str(), "x:1");
        assert!(serde_json::from_str::<EntityId>("\"\"").is_err());
    }

    #[test]
    fn pass_id_roundtrip() {
        let id = PassId::generate();
        let parsed: PassId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-ulid".parse::<PassId>().is_err());
    }
}
