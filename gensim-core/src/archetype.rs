//! Declarative event authoring.
//!
//! Content is written as plain [`EventSpec`] data built from the helpers in
//! this module, then [`install`]ed into a store. Targets are described with
//! [`TargetSpec`] and only resolved to entity ids at install time, so the same
//! archetype can be reused for any character.
//!
//! ```text
//!   chat("tea_talk", "Hatter")                 EventSpec (data)
//!       .with_effect(prel_eff(5))                    |
//!       .scheduled(schedule_daily(hm(17, 0)))        |  install(store, &spec, &world)
//!                                                    v
//!   Event { requirements, effects, buffs }  +  EventLock rows  +  Schedule rows
//! ```

use chrono::Duration;
use tracing::{debug, info, warn};

use crate::buff::Buff;
use crate::config::WorldConfig;
use crate::dialog;
use crate::effect::{Effect, ALWAYS_APPLIES};
use crate::error::{GensimError, Result};
use crate::event::{Event, EventKind};
use crate::requirement::Requirement;
use crate::schedule::{Schedule, ScheduleKind};
use crate::store::EntityStore;
use crate::types::{attrs, EntityKind, EventId, TargetRef, Value};

/// Weight given to authored effects that do not set one.
pub const AUTHORED_SCORE: i64 = 5;

/// Relationship strength at which [`friend_buff`] applies.
pub const FRIEND_STRENGTH: i64 = 100;

/// Relationship strength at which [`infatuated_buff`] applies.
pub const INFATUATED_STRENGTH: i64 = 500;

// ---------------------------------------------------------------------------
// Specs
// ---------------------------------------------------------------------------

/// Which entity a rule points at, resolved when the event is installed.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetSpec {
    /// The global character's time stat.
    WorldClock,
    /// The player character.
    Player,
    /// A stat of the player, by label.
    PlayerStat(String),
    /// The relationship between the player and the event's character.
    PlayerRelationship,
    /// The event's character.
    EventCharacter,
    /// A character by name.
    Character(String),
    /// An already-known entity.
    Entity(TargetRef),
}

/// A requirement before target resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct RequirementSpec {
    /// Entity to read.
    pub target: TargetSpec,
    /// Property to compare.
    pub property: String,
    /// Comparison value.
    pub value: Value,
}

/// A buff before target resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct BuffSpec {
    /// Multiplier on the effect's change.
    pub modifier: f64,
    /// Conditions for the multiplier.
    pub requirements: Vec<RequirementSpec>,
}

/// An effect before target resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectSpec {
    /// Entity to change.
    pub target: TargetSpec,
    /// Property to change.
    pub property: String,
    /// Delta or replacement value.
    pub change: Value,
    /// Draw weight or [`ALWAYS_APPLIES`].
    pub score: i64,
    /// Multipliers.
    pub buffs: Vec<BuffSpec>,
    /// Dialog templates; `{player}` is replaced with the player's name.
    pub dialog: Vec<String>,
}

impl EffectSpec {
    /// An effect with the authored default score and no dialog.
    #[must_use]
    pub fn new(target: TargetSpec, property: impl Into<String>, change: impl Into<Value>) -> Self {
        Self {
            target,
            property: property.into(),
            change: change.into(),
            score: AUTHORED_SCORE,
            buffs: Vec::new(),
            dialog: Vec::new(),
        }
    }

    /// Override the draw weight.
    #[must_use]
    pub fn scored(mut self, score: i64) -> Self {
        self.score = score;
        self
    }

    /// Attach a buff.
    #[must_use]
    pub fn with_buff(mut self, buff: BuffSpec) -> Self {
        self.buffs.push(buff);
        self
    }

    /// Attach one dialog template.
    #[must_use]
    pub fn with_line(mut self, line: impl Into<String>) -> Self {
        self.dialog.push(line.into());
        self
    }

    /// Attach every `***`-separated chunk of an authored dialog file.
    #[must_use]
    pub fn with_dialog_text(mut self, source: &str) -> Self {
        self.dialog.extend(dialog::chunks(source));
        self
    }
}

/// A recurrence before the event name is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleSpec {
    /// Period.
    pub kind: ScheduleKind,
    /// Seconds after the period mask.
    pub offset: i64,
    /// Seconds the event stays available, if continuous.
    pub duration: Option<i64>,
    /// Days, weekdays or months the schedule applies to.
    pub date_indexes: Vec<u32>,
}

impl ScheduleSpec {
    /// Keep the event available for `duration` seconds.
    #[must_use]
    pub fn lasting(mut self, duration: i64) -> Self {
        self.duration = Some(duration);
        self
    }

    fn for_event(&self, name: &str) -> Schedule {
        let mut schedule =
            Schedule::new(name, self.kind, self.offset).on(self.date_indexes.iter().copied());
        if let Some(duration) = self.duration {
            schedule = schedule.lasting(duration);
        }
        schedule
    }
}

/// An event and everything hanging off it.
#[derive(Debug, Clone, PartialEq)]
pub struct EventSpec {
    /// Unique name.
    pub name: String,
    /// Trigger classification; children are forced to `Subevent`.
    pub kind: EventKind,
    /// Delete after the first completion.
    pub prune: bool,
    /// Choice label.
    pub verbose_name: Option<String>,
    /// Owning character.
    pub character: Option<String>,
    /// Location where the event is active.
    pub location: Option<String>,
    /// Event whose availability this one adopts.
    pub activator: Option<String>,
    /// Preconditions.
    pub requirements: Vec<RequirementSpec>,
    /// Effects.
    pub effects: Vec<EffectSpec>,
    /// Choices offered after completion.
    pub children: Vec<EventSpec>,
    /// Events this one locks.
    pub locks: Vec<String>,
    /// Events that lock this one.
    pub locked_by: Vec<String>,
    /// Recurrences.
    pub schedules: Vec<ScheduleSpec>,
}

impl EventSpec {
    /// An event with nothing attached.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: EventKind) -> Self {
        Self {
            name: name.into(),
            kind,
            prune: false,
            verbose_name: None,
            character: None,
            location: None,
            activator: None,
            requirements: Vec::new(),
            effects: Vec::new(),
            children: Vec::new(),
            locks: Vec::new(),
            locked_by: Vec::new(),
            schedules: Vec::new(),
        }
    }

    /// Delete after the first completion.
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

    /// Attach to a character.
    #[must_use]
    pub fn with_character(mut self, name: impl Into<String>) -> Self {
        self.character = Some(name.into());
        self
    }

    /// Make active at a location.
    #[must_use]
    pub fn at_location(mut self, name: impl Into<String>) -> Self {
        self.location = Some(name.into());
        self
    }

    /// Adopt another event's availability.
    #[must_use]
    pub fn activated_by(mut self, name: impl Into<String>) -> Self {
        self.activator = Some(name.into());
        self
    }

    /// Add a requirement.
    #[must_use]
    pub fn with_requirement(mut self, requirement: RequirementSpec) -> Self {
        self.requirements.push(requirement);
        self
    }

    /// Add an effect.
    #[must_use]
    pub fn with_effect(mut self, effect: EffectSpec) -> Self {
        self.effects.push(effect);
        self
    }

    /// Add a choice.
    #[must_use]
    pub fn with_child(mut self, child: EventSpec) -> Self {
        self.children.push(child);
        self
    }

    /// Lock another event while this one exists.
    #[must_use]
    pub fn locks(mut self, name: impl Into<String>) -> Self {
        self.locks.push(name.into());
        self
    }

    /// Be locked by another event while it exists.
    #[must_use]
    pub fn locked_by(mut self, name: impl Into<String>) -> Self {
        self.locked_by.push(name.into());
        self
    }

    /// Add a recurrence.
    #[must_use]
    pub fn scheduled(mut self, schedule: ScheduleSpec) -> Self {
        self.schedules.push(schedule);
        self
    }
}

// ---------------------------------------------------------------------------
// Rule helpers
// ---------------------------------------------------------------------------

/// The world clock must be at or past `timestamp` (or before `-timestamp`).
#[must_use]
pub fn time_req(timestamp: i64) -> RequirementSpec {
    RequirementSpec {
        target: TargetSpec::WorldClock,
        property: "value".to_string(),
        value: Value::Int(timestamp),
    }
}

/// Advance the world clock; always applies and shows no text.
#[must_use]
pub fn time_eff(elapsed: Duration) -> EffectSpec {
    EffectSpec::new(TargetSpec::WorldClock, "value", elapsed.num_seconds()).scored(ALWAYS_APPLIES)
}

/// Move the event's character to `location`.
#[must_use]
pub fn move_eff(location: impl Into<String>) -> EffectSpec {
    EffectSpec::new(TargetSpec::EventCharacter, "location_name", location.into())
}

/// Requirement on the player's relationship with the event's character.
#[must_use]
pub fn prel_req(value: i64) -> RequirementSpec {
    RequirementSpec {
        target: TargetSpec::PlayerRelationship,
        property: "strength".to_string(),
        value: Value::Int(value),
    }
}

/// Change the player's relationship with the event's character.
///
/// Friends get a bigger change.
#[must_use]
pub fn prel_eff(change: i64) -> EffectSpec {
    EffectSpec::new(TargetSpec::PlayerRelationship, "strength", change).with_buff(friend_buff())
}

/// Change a player stat.
#[must_use]
pub fn pstat_eff(label: impl Into<String>, change: i64) -> EffectSpec {
    EffectSpec::new(TargetSpec::PlayerStat(label.into()), "value", change)
}

/// A text-only effect: touches the player's energy by zero.
#[must_use]
pub fn no_effect() -> EffectSpec {
    EffectSpec::new(TargetSpec::Player, "energy", 0)
}

/// x1.2 once the relationship reaches [`FRIEND_STRENGTH`].
#[must_use]
pub fn friend_buff() -> BuffSpec {
    BuffSpec {
        modifier: 1.2,
        requirements: vec![prel_req(FRIEND_STRENGTH)],
    }
}

/// x1.5 once the relationship reaches [`INFATUATED_STRENGTH`].
#[must_use]
pub fn infatuated_buff() -> BuffSpec {
    BuffSpec {
        modifier: 1.5,
        requirements: vec![prel_req(INFATUATED_STRENGTH)],
    }
}

// ---------------------------------------------------------------------------
// Archetypes
// ---------------------------------------------------------------------------

/// Talking to a character the player already knows.
#[must_use]
pub fn chat(name: impl Into<String>, character: impl Into<String>) -> EventSpec {
    EventSpec::new(name, EventKind::Chat)
        .with_character(character)
        .with_requirement(prel_req(1))
        .with_effect(prel_eff(5))
        .with_effect(time_eff(Duration::minutes(30)))
}

/// Running into a known character on arrival.
#[must_use]
pub fn encounter(name: impl Into<String>, character: impl Into<String>) -> EventSpec {
    EventSpec::new(name, EventKind::Encounter)
        .with_character(character)
        .with_requirement(prel_req(1))
        .with_effect(prel_eff(1))
}

/// First meeting: needs a relationship below 1 and raises it to 1, so it
/// cannot fire twice.
#[must_use]
pub fn meet(name: impl Into<String>, character: impl Into<String>) -> EventSpec {
    EventSpec::new(name, EventKind::Encounter)
        .with_character(character)
        .with_requirement(prel_req(-1))
        .with_effect(prel_eff(1))
}

/// Ambient text about a known character nearby.
#[must_use]
pub fn flavor(name: impl Into<String>, character: impl Into<String>) -> EventSpec {
    EventSpec::new(name, EventKind::Flavor)
        .with_character(character)
        .with_requirement(prel_req(1))
        .with_effect(no_effect())
}

/// The fishing action.
#[must_use]
pub fn fish(name: impl Into<String>) -> EventSpec {
    EventSpec::new(name, EventKind::Fish)
        .with_effect(pstat_eff("fishing_skill", 1).scored(ALWAYS_APPLIES))
        .with_effect(time_eff(Duration::minutes(30)))
}

/// The cooking action.
#[must_use]
pub fn cook(name: impl Into<String>) -> EventSpec {
    EventSpec::new(name, EventKind::Cook)
        .with_effect(pstat_eff("cooking_skill", 1).scored(ALWAYS_APPLIES))
        .with_effect(time_eff(Duration::minutes(30)))
}

/// Monday to Friday at `offset` seconds after midnight.
#[must_use]
pub fn schedule_work(offset: i64) -> ScheduleSpec {
    ScheduleSpec {
        kind: ScheduleKind::Weekly,
        offset,
        duration: None,
        date_indexes: (0..5).collect(),
    }
}

/// Every day at `offset` seconds after midnight.
#[must_use]
pub fn schedule_daily(offset: i64) -> ScheduleSpec {
    ScheduleSpec {
        kind: ScheduleKind::Daily,
        offset,
        duration: None,
        date_indexes: Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Install
// ---------------------------------------------------------------------------

/// Make sure the global character and its clock stat exist.
///
/// A missing clock starts at midnight UTC of `world.start_date`; an existing
/// one is left as it is. Returns the clock.
///
/// # Errors
/// Returns [`GensimError::Config`] if the start date does not parse.
pub fn seed_world<S: EntityStore + ?Sized>(store: &mut S, world: &WorldConfig) -> Result<TargetRef> {
    if let Ok(clock) = store.stat(&world.global_character, &world.time_label) {
        return Ok(clock.target());
    }
    let start = world.start_timestamp()?;
    if store.character(&world.global_character).is_err() {
        store.create(
            EntityKind::Character,
            attrs([
                ("name", Value::from(world.global_character.as_str())),
                ("is_player", Value::Int(0)),
                ("location_name", Value::from("nowhere")),
            ]),
        )?;
    }
    let clock = store
        .create(
            EntityKind::Stat,
            attrs([
                ("chara_name", Value::from(world.global_character.as_str())),
                ("label", Value::from(world.time_label.as_str())),
                ("value", Value::Int(start)),
            ]),
        )?
        .target();
    info!(start_date = %world.start_date, start, "Started the world clock");
    Ok(clock)
}

struct Scope<'a> {
    world: &'a WorldConfig,
    event: &'a str,
    character: Option<&'a str>,
    player: Option<String>,
}

impl Scope<'_> {
    fn player_name(&self) -> Result<&str> {
        self.player.as_deref().ok_or_else(|| GensimError::NoMatch {
            kind: EntityKind::Character,
            filter: "is_player = 1".to_string(),
        })
    }

    fn event_character(&self) -> Result<&str> {
        self.character.ok_or_else(|| GensimError::NoMatch {
            kind: EntityKind::Character,
            filter: format!("character of event {}", self.event),
        })
    }

    fn resolve<S: EntityStore + ?Sized>(&self, store: &S, target: &TargetSpec) -> Result<TargetRef> {
        let entity = match target {
            TargetSpec::Entity(target) => return Ok(*target),
            TargetSpec::WorldClock => {
                store.stat(&self.world.global_character, &self.world.time_label)?
            }
            TargetSpec::Player => store.player()?,
            TargetSpec::PlayerStat(label) => store.stat(self.player_name()?, label)?,
            TargetSpec::PlayerRelationship => {
                store.relationship(self.player_name()?, self.event_character()?)?
            }
            TargetSpec::EventCharacter => store.character(self.event_character()?)?,
            TargetSpec::Character(name) => store.character(name)?,
        };
        Ok(entity.target())
    }

    fn requirement<S: EntityStore + ?Sized>(
        &self,
        store: &S,
        spec: &RequirementSpec,
    ) -> Result<Requirement> {
        Requirement::new(self.resolve(store, &spec.target)?, &spec.property, spec.value.clone())
    }

    fn effect<S: EntityStore + ?Sized>(&self, store: &S, spec: &EffectSpec) -> Result<Effect> {
        let mut effect = Effect::new(
            self.resolve(store, &spec.target)?,
            &spec.property,
            spec.change.clone(),
            spec.score,
        )?;
        for buff in &spec.buffs {
            let mut built = Buff::new(buff.modifier);
            for requirement in &buff.requirements {
                built = built.requiring(self.requirement(store, requirement)?);
            }
            effect = effect.with_buff(built);
        }
        let player = self.player.as_deref().unwrap_or("");
        for line in &spec.dialog {
            effect = effect.with_dialog(dialog::render(line, &[("player", player)]));
        }
        Ok(effect)
    }
}

/// Create the event described by `spec`, its children, locks and schedules.
///
/// Lock rows may name events installed later; the store checks both ends, so
/// install the locked events first. Installation is all or nothing: when any
/// step fails, every event created so far is deleted again, taking its lock
/// rows and schedules with it.
///
/// # Errors
/// Propagates target resolution failures ([`GensimError::NoMatch`]),
/// capability and score validation, duplicate names and unknown lock or
/// schedule events.
pub fn install<S: EntityStore + ?Sized>(
    store: &mut S,
    spec: &EventSpec,
    world: &WorldConfig,
) -> Result<EventId> {
    let mut created = Vec::new();
    let result = install_under(store, spec, world, None, &mut created);
    if let Err(e) = &result {
        warn!(event = %spec.name, error = %e, rolled_back = created.len(), "Install failed");
        for id in created.into_iter().rev() {
            if let Err(rollback) = store.delete_event(id) {
                warn!(error = %rollback, "Could not roll back installed event");
            }
        }
    }
    result
}

fn install_under<S: EntityStore + ?Sized>(
    store: &mut S,
    spec: &EventSpec,
    world: &WorldConfig,
    parent: Option<&str>,
    created: &mut Vec<EventId>,
) -> Result<EventId> {
    let player = store
        .player()
        .ok()
        .and_then(|p| p.text("name").map(str::to_string));
    let scope = Scope {
        world,
        event: &spec.name,
        character: spec.character.as_deref(),
        player,
    };

    let mut event = Event::new(
        &spec.name,
        if parent.is_some() {
            EventKind::Subevent
        } else {
            spec.kind.clone()
        },
    );
    event.prune = spec.prune;
    event.verbose_name.clone_from(&spec.verbose_name);
    event.character.clone_from(&spec.character);
    event.location.clone_from(&spec.location);
    event.activator.clone_from(&spec.activator);
    event.parent = parent.map(str::to_string);
    for requirement in &spec.requirements {
        event.requirements.push(scope.requirement(&*store, requirement)?);
    }
    for effect in &spec.effects {
        event.effects.push(scope.effect(&*store, effect)?);
    }

    let id = store.create_event(event)?;
    created.push(id);
    debug!(event = %spec.name, "Installed event");

    for child in &spec.children {
        install_under(store, child, world, Some(&spec.name), created)?;
    }
    for name in &spec.locks {
        store.add_lock(&spec.name, name)?;
    }
    for name in &spec.locked_by {
        store.add_lock(name, &spec.name)?;
    }
    for schedule in &spec.schedules {
        store.create_schedule(schedule.for_event(&spec.name))?;
    }
    Ok(id)
}
