//! Effects: weighted, possibly buffed mutations of one entity property.
//!
//! Numeric properties receive a delta. The delta is the effect's `change`
//! multiplied by the modifier of every available buff, so buffs compound on
//! the change rather than on the base value. Non-numeric properties (a
//! character's `location_name`, say) are overwritten with `change` as is.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::buff::Buff;
use crate::capability;
use crate::dialog::DialogSource;
use crate::error::{GensimError, Result};
use crate::store::EntityStore;
use crate::types::{EntityKind, TargetRef, Value};

/// Score marking an effect that commits every round without competing.
pub const ALWAYS_APPLIES: i64 = -1;

/// Default weight of a competing effect.
pub const DEFAULT_SCORE: i64 = 100;

/// A mutation applied when its event completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Effect {
    /// The entity being changed.
    pub target: TargetRef,
    /// Property name, checked against the capability table.
    pub property: String,
    /// Delta for numeric properties, replacement value otherwise.
    pub change: Value,
    /// Draw weight, or [`ALWAYS_APPLIES`].
    pub score: i64,
    /// Multipliers on the delta.
    pub buffs: Vec<Buff>,
    /// Candidate lines of text shown when the effect commits.
    pub dialog: Vec<String>,
}

/// What a committed effect reports back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectResult {
    /// Kind of the changed entity.
    pub target: EntityKind,
    /// The changed property.
    pub property: String,
    /// Value after the change.
    pub new_value: Value,
    /// Dialog text; cleared by the orchestrator for off-screen events.
    pub text: String,
}

impl Effect {
    /// Create an effect, validating the property and score.
    ///
    /// # Errors
    /// Returns [`GensimError::NotRequirable`] for properties outside the
    /// capability table and [`GensimError::InvalidScore`] for scores below
    /// [`ALWAYS_APPLIES`].
    pub fn new(
        target: TargetRef,
        property: impl Into<String>,
        change: impl Into<Value>,
        score: i64,
    ) -> Result<Self> {
        let property = property.into();
        capability::check(target.kind, &property)?;
        if score < ALWAYS_APPLIES {
            return Err(GensimError::InvalidScore(score));
        }
        Ok(Self {
            target,
            property,
            change: change.into(),
            score,
            buffs: Vec::new(),
            dialog: Vec::new(),
        })
    }

    /// Attach a buff.
    #[must_use]
    pub fn with_buff(mut self, buff: Buff) -> Self {
        self.buffs.push(buff);
        self
    }

    /// Attach a dialog line.
    #[must_use]
    pub fn with_dialog(mut self, line: impl Into<String>) -> Self {
        self.dialog.push(line.into());
        self
    }

    /// Whether the effect commits regardless of the draw.
    #[must_use]
    pub fn always_applies(&self) -> bool {
        self.score == ALWAYS_APPLIES
    }

    /// Compute the new value and write it to the store.
    ///
    /// # Errors
    /// Propagates lookup failures; returns [`GensimError::TypeMismatch`] when
    /// a numeric property gets a non-numeric change.
    pub fn commit<S: EntityStore + ?Sized>(
        &self,
        store: &mut S,
        dialog: &dyn DialogSource,
        rng: &mut dyn RngCore,
    ) -> Result<EffectResult> {
        let current = store.attribute(&self.target, &self.property)?;

        let new_value = match current.as_int() {
            Some(attr) => {
                let change = self.change.as_signed_int().ok_or_else(|| GensimError::TypeMismatch {
                    property: self.property.clone(),
                    value: self.change.to_string(),
                })?;
                let mut delta = change as f64;
                for buff in &self.buffs {
                    if buff.available(&*store)? {
                        delta *= buff.modifier;
                    }
                }
                Value::Int(attr.saturating_add(clamp_delta(delta)))
            }
            None => self.change.clone(),
        };

        store.set_attribute(&self.target, &self.property, new_value.clone())?;

        info!(
            entity = %self.target,
            property = %self.property,
            new_value = %new_value,
            "Committed effect"
        );

        let text = dialog.line(self, rng);
        debug!(text = %text, "Effect text");

        Ok(EffectResult {
            target: self.target.kind,
            property: self.property.clone(),
            new_value,
            text,
        })
    }

    #[cfg(test)]
    pub(crate) fn placeholder() -> Self {
        Self {
            target: TargetRef::new(EntityKind::Stat, crate::EntityId::new()),
            property: "value".to_string(),
            change: Value::Int(0),
            score: DEFAULT_SCORE,
            buffs: Vec::new(),
            dialog: Vec::new(),
        }
    }
}

/// Truncate a buffed delta toward zero, pinned to the `i64` range.
#[allow(clippy::cast_possible_truncation)]
fn clamp_delta(delta: f64) -> i64 {
    if delta.is_nan() {
        return 0;
    }
    // `as` saturates at the bounds
    delta.trunc() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialog::{RandomLine, Silent};
    use crate::requirement::Requirement;
    use crate::store::MemoryStore;
    use crate::types::attrs;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn stat(store: &mut MemoryStore, value: i64) -> TargetRef {
        store
            .create(
                EntityKind::Stat,
                attrs([
                    ("label", Value::from("alive")),
                    ("chara_name", Value::from("Yamato")),
                    ("value", Value::Int(value)),
                ]),
            )
            .expect("create")
            .target()
    }

    #[test]
    fn numeric_change_is_added() {
        let mut store = MemoryStore::new();
        let mut rng = StdRng::seed_from_u64(0);
        let target = stat(&mut store, 1);
        let effect = Effect::new(target, "value", -1, DEFAULT_SCORE).expect("effect");

        let result = effect.commit(&mut store, &Silent, &mut rng).expect("commit");
        assert_eq!(result.new_value, Value::Int(0));
        assert_eq!(store.attribute(&target, "value").expect("attr"), Value::Int(0));
    }

    #[test]
    fn available_buff_scales_delta() {
        let mut store = MemoryStore::new();
        let mut rng = StdRng::seed_from_u64(0);
        let target = stat(&mut store, 0);
        let effect = Effect::new(target, "value", -1, DEFAULT_SCORE)
            .expect("effect")
            .with_buff(Buff::new(10.0));

        let result = effect.commit(&mut store, &Silent, &mut rng).expect("commit");
        assert_eq!(result.new_value, Value::Int(-10));
    }

    #[test]
    fn buffs_compound_and_unavailable_ones_are_skipped() {
        let mut store = MemoryStore::new();
        let mut rng = StdRng::seed_from_u64(0);
        let target = stat(&mut store, 100);
        let gate = stat(&mut store, 0);
        let effect = Effect::new(target, "value", 5, DEFAULT_SCORE)
            .expect("effect")
            .with_buff(Buff::new(2.0))
            .with_buff(Buff::new(3.0))
            .with_buff(Buff::new(100.0).requiring(Requirement::new(gate, "value", 1).expect("req")));

        let result = effect.commit(&mut store, &Silent, &mut rng).expect("commit");
        assert_eq!(result.new_value, Value::Int(130));
    }

    #[test]
    fn fractional_delta_truncates_toward_zero() {
        let mut store = MemoryStore::new();
        let mut rng = StdRng::seed_from_u64(0);
        let target = stat(&mut store, 0);
        let effect = Effect::new(target, "value", 5, DEFAULT_SCORE)
            .expect("effect")
            .with_buff(Buff::new(1.2));

        let result = effect.commit(&mut store, &Silent, &mut rng).expect("commit");
        assert_eq!(result.new_value, Value::Int(6));
    }

    #[test]
    fn extreme_changes_saturate() {
        let mut store = MemoryStore::new();
        let mut rng = StdRng::seed_from_u64(0);
        let target = stat(&mut store, i64::MAX - 1);
        let effect = Effect::new(target, "value", 10, DEFAULT_SCORE).expect("effect");
        let result = effect.commit(&mut store, &Silent, &mut rng).expect("commit");
        assert_eq!(result.new_value, Value::Int(i64::MAX));

        let floor = stat(&mut store, -5);
        let effect = Effect::new(floor, "value", -1, DEFAULT_SCORE)
            .expect("effect")
            .with_buff(Buff::new(1e300));
        let result = effect.commit(&mut store, &Silent, &mut rng).expect("commit");
        assert_eq!(result.new_value, Value::Int(i64::MIN));

        let flat = stat(&mut store, 3);
        let effect = Effect::new(flat, "value", 1, DEFAULT_SCORE)
            .expect("effect")
            .with_buff(Buff::new(f64::NAN));
        let result = effect.commit(&mut store, &Silent, &mut rng).expect("commit");
        assert_eq!(result.new_value, Value::Int(3));
    }

    #[test]
    fn text_property_is_replaced() {
        let mut store = MemoryStore::new();
        let mut rng = StdRng::seed_from_u64(0);
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
        let effect = Effect::new(chara, "location_name", "Nowhere", ALWAYS_APPLIES)
            .expect("effect")
            .with_buff(Buff::new(10.0));

        let result = effect.commit(&mut store, &Silent, &mut rng).expect("commit");
        assert_eq!(result.new_value, Value::from("Nowhere"));
    }

    #[test]
    fn result_carries_dialog_text() {
        let mut store = MemoryStore::new();
        let mut rng = StdRng::seed_from_u64(0);
        let target = stat(&mut store, 1);
        let effect = Effect::new(target, "value", -1, DEFAULT_SCORE)
            .expect("effect")
            .with_dialog("...Execution");

        let result = effect.commit(&mut store, &RandomLine, &mut rng).expect("commit");
        assert_eq!(result.text, "...Execution");
        assert_eq!(result.target, EntityKind::Stat);
        assert_eq!(result.property, "value");
    }

    #[test]
    fn scores_below_always_applies_are_rejected() {
        let target = TargetRef::new(EntityKind::Stat, crate::EntityId::new());
        assert!(matches!(
            Effect::new(target, "value", 1, -2),
            Err(GensimError::InvalidScore(-2))
        ));
    }

    #[test]
    fn numeric_property_with_text_change_is_mismatch() {
        let mut store = MemoryStore::new();
        let mut rng = StdRng::seed_from_u64(0);
        let target = stat(&mut store, 1);
        let effect = Effect::new(target, "value", "lots", DEFAULT_SCORE).expect("effect");
        assert!(matches!(
            effect.commit(&mut store, &Silent, &mut rng),
            Err(GensimError::TypeMismatch { .. })
        ));
    }
}
