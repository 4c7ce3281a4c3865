//! Core types for the balance scenario
//!
//! This module defines the identifiers and values shared by every crate:
//! - [`ScenarioId`]: Unique identifier for one scenario run
//! - [`Alias`]: Stable human-assigned record name used for lookup
//! - [`Identity`]: Store-assigned record identifier
//! - [`Record`]: The shared balance entity

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Numeric balance held by a record.
pub type Balance = f64;

/// Unique identifier for a scenario run
///
/// Every log line and report produced by one run carries the same id, so
/// concurrent runs against the same store can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScenarioId(Uuid);

impl ScenarioId {
    /// Create a new random ScenarioId using UUID v4
    ///
    /// # Examples
    ///
    /// ```
    /// use walletrace_core::types::ScenarioId;
    ///
    /// let id1 = ScenarioId::new();
    /// let id2 = ScenarioId::new();
    /// assert_ne!(id1, id2);
    /// ```
    pub fn new() -> Self {
        ScenarioId(Uuid::new_v4())
    }

    /// Get raw bytes representation
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for ScenarioId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable, human-assigned record name
///
/// Aliases are immutable once a record exists and at most one record carries
/// a given alias.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Alias(String);

impl Alias {
    /// Create an alias
    pub fn new(alias: impl Into<String>) -> Self {
        Alias(alias.into())
    }

    /// Borrow the alias text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Alias {
    fn default() -> Self {
        Alias::new("a")
    }
}

impl std::fmt::Display for Alias {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Alias {
    fn from(s: &str) -> Self {
        Alias::new(s)
    }
}

/// Store-assigned internal identifier
///
/// Opaque to callers. Stores that use numeric ids render them in the
/// `0x..` hex form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Wrap a raw identifier
    pub fn new(raw: impl Into<String>) -> Self {
        Identity(raw.into())
    }

    /// Identity for a numeric id, in `0x..` form
    pub fn from_u64(id: u64) -> Self {
        Identity(format!("{:#x}", id))
    }

    /// Borrow the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The shared mutable balance entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Lookup key
    pub alias: Alias,
    /// Store identity, stable once created
    pub identity: Identity,
    /// Current balance
    pub balance: Balance,
}

/// Position of a participant in the scenario's start order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub usize);

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "participant-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_hex_form() {
        assert_eq!(Identity::from_u64(1).as_str(), "0x1");
        assert_eq!(Identity::from_u64(255).as_str(), "0xff");
    }

    #[test]
    fn test_alias_default_and_display() {
        let alias = Alias::default();
        assert_eq!(alias.as_str(), "a");
        assert_eq!(alias.to_string(), "a");
        assert_eq!(Alias::from("b"), Alias::new("b"));
    }

    #[test]
    fn test_alias_serializes_transparently() {
        let json = serde_json::to_string(&Alias::new("a")).unwrap();
        assert_eq!(json, "\"a\"");
    }

    #[test]
    fn test_scenario_id_unique() {
        assert_ne!(ScenarioId::new(), ScenarioId::new());
    }

    #[test]
    fn test_participant_display() {
        assert_eq!(ParticipantId(1).to_string(), "participant-1");
    }
}
