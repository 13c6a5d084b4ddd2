//! Requirements: preconditions comparing a live attribute against a stored value.
//!
//! The stored value encodes the comparison. A non-negative integer `n` means
//! "at least `n`"; a negative integer `-n` means "less than `n`", which is how
//! date windows are expressed (`time >= start` plus `time < end`). Anything
//! else is an exact textual match.

use serde::{Deserialize, Serialize};

use crate::capability;
use crate::error::{GensimError, Result};
use crate::store::EntityStore;
use crate::types::{TargetRef, Value};

/// A precondition on one property of one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requirement {
    /// The entity whose property is read.
    pub target: TargetRef,
    /// Property name, checked against the capability table.
    pub property: String,
    /// Comparison value; its sign selects the comparison for integers.
    pub value: Value,
}

/// How a requirement compares the live value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Comparison {
    /// `live >= n`.
    AtLeast(i64),
    /// `live < n`.
    LessThan(i64),
    /// Textual equality.
    Equals(Value),
}

impl Comparison {
    /// Decode the comparison encoded in a stored value.
    #[must_use]
    pub fn parse(value: &Value) -> Self {
        match value.as_signed_int() {
            Some(n) if n >= 0 => Self::AtLeast(n),
            Some(n) => Self::LessThan(n.saturating_neg()),
            None => Self::Equals(value.clone()),
        }
    }

    /// Apply the comparison to a live value.
    ///
    /// # Errors
    /// Returns [`GensimError::TypeMismatch`] when a numeric comparison meets
    /// a non-numeric live value.
    pub fn holds(&self, property: &str, live: &Value) -> Result<bool> {
        match self {
            Self::Equals(expected) => Ok(live.matches(expected)),
            Self::AtLeast(n) => Ok(numeric(property, live)? >= *n),
            Self::LessThan(n) => Ok(numeric(property, live)? < *n),
        }
    }
}

fn numeric(property: &str, live: &Value) -> Result<i64> {
    live.as_signed_int().ok_or_else(|| GensimError::TypeMismatch {
        property: property.to_string(),
        value: live.to_string(),
    })
}

impl Requirement {
    /// Create a requirement, validating the target property.
    ///
    /// # Errors
    /// Returns [`GensimError::NotRequirable`] if `target.kind.property` is not
    /// in the capability table.
    pub fn new(target: TargetRef, property: impl Into<String>, value: impl Into<Value>) -> Result<Self> {
        let property = property.into();
        capability::check(target.kind, &property)?;
        Ok(Self {
            target,
            property,
            value: value.into(),
        })
    }

    /// The comparison this requirement performs.
    #[must_use]
    pub fn comparison(&self) -> Comparison {
        Comparison::parse(&self.value)
    }

    /// Whether the live value satisfies the requirement.
    ///
    /// # Errors
    /// Propagates lookup failures from the store and type mismatches.
    pub fn fulfilled<S: EntityStore + ?Sized>(&self, store: &S) -> Result<bool> {
        let live = store.attribute(&self.target, &self.property)?;
        self.comparison().holds(&self.property, &live)
    }
}

/// Whether every requirement in `requirements` is fulfilled.
///
/// # Errors
/// Propagates the first evaluation failure.
pub fn all_fulfilled<S: EntityStore + ?Sized>(requirements: &[Requirement], store: &S) -> Result<bool> {
    for requirement in requirements {
        if !requirement.fulfilled(store)? {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::{attrs, EntityKind};

    fn stat(store: &mut MemoryStore, value: i64) -> TargetRef {
        store
            .create(
                EntityKind::Stat,
                attrs([
                    ("label", Value::from("score")),
                    ("chara_name", Value::from("Yamato")),
                    ("value", Value::Int(value)),
                ]),
            )
            .expect("create")
            .target()
    }

    #[test]
    fn positive_value_means_at_least() {
        let mut store = MemoryStore::new();
        let target = stat(&mut store, 100);
        let req = Requirement::new(target, "value", 100).expect("req");
        assert!(req.fulfilled(&store).expect("eval"));

        store.set_attribute(&target, "value", Value::Int(99)).expect("set");
        assert!(!req.fulfilled(&store).expect("eval"));
    }

    #[test]
    fn negative_value_means_less_than() {
        let mut store = MemoryStore::new();
        let target = stat(&mut store, 99);
        let req = Requirement::new(target, "value", -100).expect("req");
        assert!(req.fulfilled(&store).expect("eval"));

        store.set_attribute(&target, "value", Value::Int(100)).expect("set");
        assert!(!req.fulfilled(&store).expect("eval"));
    }

    #[test]
    fn numeric_text_is_parsed() {
        assert_eq!(Comparison::parse(&Value::from("100")), Comparison::AtLeast(100));
        assert_eq!(Comparison::parse(&Value::from("-30")), Comparison::LessThan(30));
        assert_eq!(
            Comparison::parse(&Value::from("Hakurei Shrine")),
            Comparison::Equals(Value::from("Hakurei Shrine"))
        );
    }

    #[test]
    fn text_value_is_exact_match() {
        let mut store = MemoryStore::new();
        let chara = store
            .create(
                EntityKind::Character,
                attrs([
                    ("name", Value::from("Yamato")),
                    ("location_name", Value::from("Hakurei Shrine")),
                    ("energy", Value::Int(2000)),
                ]),
            )
            .expect("create")
            .target();
        let here = Requirement::new(chara, "location_name", "Hakurei Shrine").expect("req");
        let there = Requirement::new(chara, "location_name", "Nowhere").expect("req");
        assert!(here.fulfilled(&store).expect("eval"));
        assert!(!there.fulfilled(&store).expect("eval"));
    }

    #[test]
    fn numeric_comparison_on_text_is_mismatch() {
        let cmp = Comparison::AtLeast(1);
        assert!(matches!(
            cmp.holds("location_name", &Value::from("Nowhere")),
            Err(GensimError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn missing_target_propagates() {
        let store = MemoryStore::new();
        let req = Requirement::new(
            TargetRef::new(EntityKind::Stat, crate::EntityId::new()),
            "value",
            1,
        )
        .expect("req");
        assert!(matches!(req.fulfilled(&store), Err(GensimError::EntityNotFound(_))));
    }

    #[test]
    fn capability_table_is_enforced() {
        let target = TargetRef::new(EntityKind::Stat, crate::EntityId::new());
        assert!(Requirement::new(target, "label", "x").is_err());
    }
}
