//! Allow-list of `(entity kind, property)` pairs that rules may reference.
//!
//! Requirements, effects and buff requirements all share one record shape;
//! this table decides which properties that shape may point at.

use crate::error::{GensimError, Result};
use crate::types::EntityKind;

/// Properties that requirements and effects may target, per entity kind.
pub const CAN_BE_REQUIRED: &[(EntityKind, &[&str])] = &[
    (EntityKind::Character, &["location_name", "energy"]),
    (EntityKind::Relationship, &["strength"]),
    (EntityKind::Stat, &["value"]),
];

/// Whether `kind.property` is in the capability table.
#[must_use]
pub fn is_requirable(kind: EntityKind, property: &str) -> bool {
    CAN_BE_REQUIRED
        .iter()
        .any(|(k, props)| *k == kind && props.contains(&property))
}

/// Reject pairs outside the capability table.
///
/// # Errors
/// Returns [`GensimError::NotRequirable`] for unknown pairs.
pub fn check(kind: EntityKind, property: &str) -> Result<()> {
    if is_requirable(kind, property) {
        Ok(())
    } else {
        Err(GensimError::NotRequirable {
            kind,
            property: property.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_pairs_pass() {
        assert!(check(EntityKind::Stat, "value").is_ok());
        assert!(check(EntityKind::Character, "location_name").is_ok());
        assert!(check(EntityKind::Relationship, "strength").is_ok());
    }

    #[test]
    fn unknown_pairs_are_rejected() {
        assert!(matches!(
            check(EntityKind::Stat, "label"),
            Err(GensimError::NotRequirable { .. })
        ));
        assert!(!is_requirable(EntityKind::Character, "strength"));
    }
}
