//! Events: the unit the simulation triggers.
//!
//! An event is available when its requirements hold and nothing locks it.
//! Events with an activator skip all of that and adopt the activator's
//! availability instead, which is how a chain of events shares one set of
//! conditions. Completing an event draws one competing effect score and
//! commits every effect with that score plus every always-apply effect.

use rand::distributions::{Distribution, WeightedIndex};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

use crate::dialog::DialogSource;
use crate::effect::{Effect, EffectResult, ALWAYS_APPLIES};
use crate::error::{GensimError, Result};
use crate::requirement::{self, Requirement};
use crate::store::EntityStore;
use crate::types::EventId;

// ---------------------------------------------------------------------------
// Kinds and relations
// ---------------------------------------------------------------------------

/// Classification used to pick which events an action triggers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Considered on every loop.
    Global,
    /// Triggered when arriving where the event's character is.
    Encounter,
    /// Triggered by chatting with the event's character.
    Chat,
    /// Ambient text for characters sharing the player's location.
    Flavor,
    /// The fishing action.
    Fish,
    /// The cooking action.
    Cook,
    /// A choice presented after its parent completes.
    Subevent,
    /// Any other authored tag.
    Custom(String),
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => write!(f, "GLOBAL"),
            Self::Encounter => write!(f, "ENCOUNTER"),
            Self::Chat => write!(f, "CHAT"),
            Self::Flavor => write!(f, "FLAVOR"),
            Self::Fish => write!(f, "FISH"),
            Self::Cook => write!(f, "COOK"),
            Self::Subevent => write!(f, "SUBEVENT"),
            Self::Custom(tag) => write!(f, "{tag}"),
        }
    }
}

impl From<&str> for EventKind {
    fn from(tag: &str) -> Self {
        match tag.to_ascii_uppercase().as_str() {
            "GLOBAL" => Self::Global,
            "ENCOUNTER" => Self::Encounter,
            "CHAT" => Self::Chat,
            "FLAVOR" => Self::Flavor,
            "FISH" => Self::Fish,
            "COOK" => Self::Cook,
            "SUBEVENT" => Self::Subevent,
            _ => Self::Custom(tag.to_string()),
        }
    }
}

/// `key` locks `lock`: while the row exists, `lock` is unavailable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventLock {
    /// Name of the locking event.
    pub key: String,
    /// Name of the locked event.
    pub lock: String,
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A scripted event with its requirements and effects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Store-assigned id; replaced on insertion.
    pub id: EventId,
    /// Unique name.
    pub name: String,
    /// Trigger classification.
    pub kind: EventKind,
    /// Delete the event after its first completion.
    pub prune: bool,
    /// Label shown when the event is offered as a choice.
    pub verbose_name: Option<String>,
    /// Character the event belongs to.
    pub character: Option<String>,
    /// Location where the event is active.
    pub location: Option<String>,
    /// Event this one is a choice of.
    pub parent: Option<String>,
    /// Event whose availability this one adopts.
    pub activator: Option<String>,
    /// Conditions for availability.
    pub requirements: Vec<Requirement>,
    /// Mutations applied on completion.
    pub effects: Vec<Effect>,
}

impl Event {
    /// A bare event with no conditions and no effects.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: EventKind) -> Self {
        Self {
            id: EventId::new(),
            name: name.into(),
            kind,
            prune: false,
            verbose_name: None,
            character: None,
            location: None,
            parent: None,
            activator: None,
            requirements: Vec::new(),
            effects: Vec::new(),
        }
    }

    /// Mark the event for deletion after completion.
    #[must_use]
    pub fn pruned(mut self) -> Self {
        self.prune = true;
        self
    }

    /// Set the choice label.
    #[must_use]
    pub fn verbose(mut self, label: impl Into<String>) -> Self {
        self.verbose_name = Some(label.into());
        self
    }

    /// Attach the event to a character.
    #[must_use]
    pub fn with_character(mut self, name: impl Into<String>) -> Self {
        self.character = Some(name.into());
        self
    }

    /// Make the event active at a location.
    #[must_use]
    pub fn at_location(mut self, name: impl Into<String>) -> Self {
        self.location = Some(name.into());
        self
    }

    /// Make the event a choice of `parent`.
    #[must_use]
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Defer availability to `activator`.
    #[must_use]
    pub fn activated_by(mut self, activator: impl Into<String>) -> Self {
        self.activator = Some(activator.into());
        self
    }

    /// Add a requirement.
    #[must_use]
    pub fn with_requirement(mut self, requirement: Requirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    /// Add an effect.
    #[must_use]
    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    /// Whether the event can fire now.
    ///
    /// # Errors
    /// Returns [`GensimError::EventNotFound`] for a dangling activator,
    /// [`GensimError::ActivatorCycle`] when the activator chain loops, and
    /// propagates requirement evaluation failures.
    pub fn available<S: EntityStore + ?Sized>(&self, store: &S) -> Result<bool> {
        let mut current = self;
        let mut chain = vec![self.name.as_str()];
        while let Some(name) = current.activator.as_deref() {
            if chain.contains(&name) {
                return Err(GensimError::ActivatorCycle(name.to_string()));
            }
            chain.push(name);
            current = store
                .event_by_name(name)
                .ok_or_else(|| GensimError::EventNotFound(name.to_string()))?;
        }

        if !store.locked_by(&current.name).is_empty() {
            return Ok(false);
        }
        requirement::all_fulfilled(&current.requirements, store)
    }

    /// Draw the winning score among the competing effects.
    ///
    /// Returns [`ALWAYS_APPLIES`] when there is nothing to draw from.
    pub fn draw_score(&self, rng: &mut dyn RngCore) -> i64 {
        let competing: Vec<&Effect> = self
            .effects
            .iter()
            .filter(|e| !e.always_applies())
            .collect();
        if competing.is_empty() {
            warn!(event = %self.name, "No effects set");
            return ALWAYS_APPLIES;
        }
        match WeightedIndex::new(competing.iter().map(|e| e.score)) {
            Ok(weights) => competing[weights.sample(rng)].score,
            Err(e) => {
                warn!(event = %self.name, error = %e, "Effect weights cannot be drawn from");
                ALWAYS_APPLIES
            }
        }
    }

    /// Commit the drawn effects. Pruning is left to the caller.
    ///
    /// # Errors
    /// Propagates the first effect commit failure.
    pub fn complete<S: EntityStore + ?Sized>(
        &self,
        store: &mut S,
        dialog: &dyn DialogSource,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<EffectResult>> {
        let score = self.draw_score(rng);
        info!(event = %self.name, score, "Event marked as complete, committing effects");

        let mut results = Vec::new();
        for effect in &self.effects {
            if effect.score == score || effect.always_applies() {
                results.push(effect.commit(store, dialog, rng)?);
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialog::Silent;
    use crate::effect::DEFAULT_SCORE;
    use crate::store::MemoryStore;
    use crate::types::{attrs, EntityKind, TargetRef, Value};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn stat(store: &mut MemoryStore, label: &str, value: i64) -> TargetRef {
        store
            .create(
                EntityKind::Stat,
                attrs([
                    ("label", Value::from(label)),
                    ("chara_name", Value::from("Yamato")),
                    ("value", Value::Int(value)),
                ]),
            )
            .expect("create")
            .target()
    }

    #[test]
    fn requirements_gate_availability() {
        let mut store = MemoryStore::new();
        let alive = stat(&mut store, "alive", 0);
        let event = Event::new("die", EventKind::Global)
            .with_requirement(Requirement::new(alive, "value", 1).expect("req"));
        let id = store.create_event(event).expect("event");

        let event = store.event(id).expect("stored").clone();
        assert!(!event.available(&store).expect("eval"));
        assert!(!event.available(&store).expect("eval"));

        store.set_attribute(&alive, "value", Value::Int(1)).expect("set");
        assert!(event.available(&store).expect("eval"));
    }

    #[test]
    fn lock_blocks_until_removed() {
        let mut store = MemoryStore::new();
        store.create_event(Event::new("door", EventKind::Global)).expect("event");
        store.create_event(Event::new("key", EventKind::Global)).expect("event");
        store.add_lock("key", "door").expect("lock");

        let door = store.event_by_name("door").expect("door").clone();
        assert!(!door.available(&store).expect("eval"));
        assert_eq!(store.locks("key").len(), 1);

        assert!(store.remove_lock("key", "door"));
        assert!(door.available(&store).expect("eval"));
    }

    #[test]
    fn activator_overrides_own_requirements_and_locks() {
        let mut store = MemoryStore::new();
        let gate = stat(&mut store, "gate", 0);
        store
            .create_event(
                Event::new("first", EventKind::Global)
                    .with_requirement(Requirement::new(gate, "value", 0).expect("req")),
            )
            .expect("event");
        store
            .create_event(
                Event::new("second", EventKind::Global)
                    .activated_by("first")
                    .with_requirement(Requirement::new(gate, "value", 100).expect("req")),
            )
            .expect("event");
        store.create_event(Event::new("blocker", EventKind::Global)).expect("event");
        store.add_lock("blocker", "second").expect("lock");

        let second = store.event_by_name("second").expect("second").clone();
        assert!(second.available(&store).expect("eval"));

        store.add_lock("blocker", "first").expect("lock");
        assert!(!second.available(&store).expect("eval"));
    }

    #[test]
    fn activator_cycle_is_reported() {
        let mut store = MemoryStore::new();
        store
            .create_event(Event::new("a", EventKind::Global).activated_by("b"))
            .expect("event");
        store
            .create_event(Event::new("b", EventKind::Global).activated_by("a"))
            .expect("event");
        let a = store.event_by_name("a").expect("a").clone();
        assert!(matches!(a.available(&store), Err(GensimError::ActivatorCycle(_))));
    }

    #[test]
    fn dangling_activator_is_not_found() {
        let store = MemoryStore::new();
        let orphan = Event::new("orphan", EventKind::Global).activated_by("ghost");
        assert!(matches!(orphan.available(&store), Err(GensimError::EventNotFound(_))));
    }

    #[test]
    fn always_apply_effects_commit_every_round() {
        let mut store = MemoryStore::new();
        let mut rng = StdRng::seed_from_u64(42);
        let clock = stat(&mut store, "time", 0);
        let luck = stat(&mut store, "luck", 0);
        let event = Event::new("gamble", EventKind::Global)
            .with_effect(Effect::new(clock, "value", 10, ALWAYS_APPLIES).expect("effect"))
            .with_effect(Effect::new(luck, "value", 1, 10).expect("effect"))
            .with_effect(Effect::new(luck, "value", -1, 20).expect("effect"));

        for round in 1..=20 {
            let results = event.complete(&mut store, &Silent, &mut rng).expect("complete");
            assert_eq!(results.len(), 2);
            assert_eq!(store.attribute(&clock, "value").expect("attr"), Value::Int(10 * round));
        }
    }

    #[test]
    fn equal_scores_commit_together() {
        let mut store = MemoryStore::new();
        let mut rng = StdRng::seed_from_u64(7);
        let a = stat(&mut store, "a", 0);
        let b = stat(&mut store, "b", 0);
        let event = Event::new("pair", EventKind::Global)
            .with_effect(Effect::new(a, "value", 1, DEFAULT_SCORE).expect("effect"))
            .with_effect(Effect::new(b, "value", 1, DEFAULT_SCORE).expect("effect"));

        let results = event.complete(&mut store, &Silent, &mut rng).expect("complete");
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn no_competing_effects_draws_always_applies() {
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(Event::new("empty", EventKind::Flavor).draw_score(&mut rng), ALWAYS_APPLIES);

        let target = TargetRef::new(EntityKind::Stat, crate::EntityId::new());
        let zeroed = Event::new("zeroed", EventKind::Flavor)
            .with_effect(Effect::new(target, "value", 1, 0).expect("effect"));
        assert_eq!(zeroed.draw_score(&mut rng), ALWAYS_APPLIES);
    }

    #[test]
    fn draw_follows_weights() {
        let mut rng = StdRng::seed_from_u64(3);
        let target = TargetRef::new(EntityKind::Stat, crate::EntityId::new());
        let event = Event::new("lopsided", EventKind::Global)
            .with_effect(Effect::new(target, "value", 1, 0).expect("effect"))
            .with_effect(Effect::new(target, "value", 1, 5).expect("effect"));
        for _ in 0..50 {
            assert_eq!(event.draw_score(&mut rng), 5);
        }
    }

    #[test]
    fn kind_tags_parse() {
        assert_eq!(EventKind::from("encounter"), EventKind::Encounter);
        assert_eq!(EventKind::from("WORK"), EventKind::Custom("WORK".to_string()));
        assert_eq!(EventKind::Chat.to_string(), "CHAT");
    }
}
