//! Error types for the gensim kernel.

use thiserror::Error;

use crate::types::{EntityKind, TargetRef};

/// Top-level error type for all kernel operations.
#[derive(Error, Debug)]
pub enum GensimError {
    /// The target entity exists but has no attribute with this name.
    #[error("Attribute not found: {kind}.{property} on {id}")]
    AttributeNotFound {
        /// Kind of the target entity.
        kind: EntityKind,
        /// Store id of the target entity.
        id: crate::EntityId,
        /// The missing property.
        property: String,
    },

    /// No entity matches the given reference.
    #[error("Entity not found: {0}")]
    EntityNotFound(TargetRef),

    /// No entity of this kind matches the lookup.
    #[error("No {kind} matches {filter}")]
    NoMatch {
        /// Kind searched.
        kind: EntityKind,
        /// The lookup, rendered as text.
        filter: String,
    },

    /// No event with this name or id exists.
    #[error("Event not found: {0}")]
    EventNotFound(String),

    /// No location with this name exists.
    #[error("Location not found: {0}")]
    LocationNotFound(String),

    /// The notice handle does not point at a live calendar node.
    #[error("Notice not found: {0}")]
    NoticeNotFound(crate::calendar::NoticeId),

    /// A record with this unique name already exists.
    #[error("Duplicate {kind} name: {name}")]
    DuplicateName {
        /// Record kind ("event", "location", ...).
        kind: &'static str,
        /// The clashing name.
        name: String,
    },

    /// The `(kind, property)` pair is not in the capability table.
    #[error("{kind}.{property} cannot be required or affected")]
    NotRequirable {
        /// Kind of the target entity.
        kind: EntityKind,
        /// The rejected property.
        property: String,
    },

    /// A numeric operation met a non-numeric value.
    #[error("Type mismatch on {property}: expected a number, got {value:?}")]
    TypeMismatch {
        /// The property being compared or changed.
        property: String,
        /// The offending value, rendered as text.
        value: String,
    },

    /// Effect scores must be `-1` (always applies) or non-negative.
    #[error("Invalid effect score: {0}")]
    InvalidScore(i64),

    /// The activator chain of this event loops back on itself.
    #[error("Activator cycle through event {0}")]
    ActivatorCycle(String),

    /// An action needs the character to share the player's location.
    #[error("{character} is at {character_location}, not at {player_location}")]
    NotColocated {
        /// The character the action targets.
        character: String,
        /// Where that character is.
        character_location: String,
        /// Where the player is.
        player_location: String,
    },

    /// No route connects the two locations.
    #[error("No route from {origin} to {destination}")]
    Unreachable {
        /// Start of the attempted walk.
        origin: String,
        /// Requested destination.
        destination: String,
    },

    /// A fixed-size structure has no room left.
    #[error("Capacity exceeded: {0}")]
    Capacity(String),

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// SQLite persistence error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, GensimError>;
