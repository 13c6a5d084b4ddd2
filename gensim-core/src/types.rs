//! Core type definitions for the gensim kernel.
//!
//! All types are serializable so a whole world can be saved as one blob.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identity Types
// ---------------------------------------------------------------------------

/// Store-assigned identifier for a generic entity (character, stat, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub Uuid);

impl EntityId {
    /// Create a new random entity ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Store-assigned identifier for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    /// Create a new random event ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Targets
// ---------------------------------------------------------------------------

/// Kinds of generic entities that requirements and effects can point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// A character; the player is a character with `is_player = 1`.
    Character,
    /// A directed relationship between two characters.
    Relationship,
    /// A labelled numeric stat owned by a character.
    Stat,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Character => write!(f, "Character"),
            Self::Relationship => write!(f, "Relationship"),
            Self::Stat => write!(f, "Stat"),
        }
    }
}

/// A typed reference to a stored entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetRef {
    /// Kind of the entity.
    pub kind: EntityKind,
    /// Store id of the entity.
    pub id: EntityId,
}

impl TargetRef {
    /// Build a reference.
    #[must_use]
    pub fn new(kind: EntityKind, id: EntityId) -> Self {
        Self { kind, id }
    }
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind, self.id)
    }
}

// ---------------------------------------------------------------------------
// Attribute values
// ---------------------------------------------------------------------------

/// An attribute value. Booleans are stored as `Int(0)` / `Int(1)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Value {
    /// Integer value (stats, energy, timestamps, strengths).
    Int(i64),
    /// Free text (names, location names).
    Text(String),
}

impl Value {
    /// Integer view of the value.
    ///
    /// Text counts as numeric only when it is all ASCII digits: no sign, no
    /// surrounding whitespace.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Text(s) => digits(s),
        }
    }

    /// Like [`Value::as_int`], but text may also carry a leading `-`.
    #[must_use]
    pub fn as_signed_int(&self) -> Option<i64> {
        match self {
            Self::Text(s) => match s.strip_prefix('-') {
                Some(rest) => digits(rest).map(i64::wrapping_neg),
                None => digits(s),
            },
            Self::Int(_) => self.as_int(),
        }
    }

    /// Text view of the value, if it is text.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Int(_) => None,
        }
    }

    /// Whether both values render to the same text.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a == b,
            _ => self.to_string() == other.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Int(i64::from(b))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

/// Named attributes of a generic entity.
pub type Attributes = BTreeMap<String, Value>;

/// Build an [`Attributes`] map from `(name, value)` pairs.
#[must_use]
pub fn attrs<I, K, V>(pairs: I) -> Attributes
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// A generic entity handle returned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Kind of the entity.
    pub kind: EntityKind,
    /// Store id.
    pub id: EntityId,
    /// Named attributes.
    pub attributes: Attributes,
}

impl Entity {
    /// Reference to this entity.
    #[must_use]
    pub fn target(&self) -> TargetRef {
        TargetRef::new(self.kind, self.id)
    }

    /// Look up an attribute.
    #[must_use]
    pub fn get(&self, property: &str) -> Option<&Value> {
        self.attributes.get(property)
    }

    /// Text attribute, if present and textual.
    #[must_use]
    pub fn text(&self, property: &str) -> Option<&str> {
        self.get(property).and_then(Value::as_str)
    }

    /// Integer attribute, if present and numeric.
    #[must_use]
    pub fn int(&self, property: &str) -> Option<i64> {
        self.get(property).and_then(Value::as_int)
    }

    /// Whether every filter pair equals the corresponding attribute.
    #[must_use]
    pub fn matches(&self, filters: &[(&str, Value)]) -> bool {
        filters
            .iter()
            .all(|(k, v)| self.get(k).is_some_and(|actual| actual.matches(v)))
    }
}

fn digits(text: &str) -> Option<i64> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}
