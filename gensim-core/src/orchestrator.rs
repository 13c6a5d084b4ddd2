//! The trigger orchestrator: the one entry point a game action goes through.
//!
//! ```text
//!  action ──> candidate events ──> trigger ──> resolve (available only)
//!                                      │            │ commit effects, hide
//!                                      │            │ off-screen text, prune
//!                                      │            v
//!                                      │       clock moved from start to end
//!                                      v
//!         day changed? fire the old day's leftovers, rebuild calendar
//!                                      │
//!                                      v
//!                 notices in (start, end] ──> resolve, advance cursor
//! ```
//!
//! The orchestrator owns the store. Every mutating call takes `&mut self`;
//! nothing here is meant to be shared across threads.

use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn};

use crate::archetype;
use crate::calendar::{Calendar, Notice, NoticeId, RangeScan};
use crate::config::GensimConfig;
use crate::dialog::{DialogSource, RandomLine};
use crate::effect::EffectResult;
use crate::error::{GensimError, Result};
use crate::event::{Event, EventKind};
use crate::metrics::{spans, SimCounters, TickBudgetMonitor};
use crate::requirement::Requirement;
use crate::schedule::{self, Schedule};
use crate::store::EntityStore;
use crate::types::{Entity, EntityKind, EventId, TargetRef, Value};
use crate::walk::{PathFinder, RouteCost};

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// A choice offered after its parent event completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    /// Name of the subevent.
    pub name: String,
    /// Label to show, if any.
    pub verbose_name: Option<String>,
}

/// An event that fired during a trigger pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedEvent {
    /// Event name.
    pub name: String,
    /// Event kind.
    pub kind: EventKind,
    /// Choice label.
    pub verbose_name: Option<String>,
    /// Committed effects; text is empty for off-screen events.
    pub effects: Vec<EffectResult>,
    /// Subevents now on offer.
    pub children: Vec<Choice>,
}

/// What the player sees after a loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    /// World clock after the pass.
    pub time: i64,
    /// The player's location.
    pub location: String,
    /// Other characters sharing it.
    pub characters: Vec<String>,
    /// Events that fired.
    pub events: Vec<CompletedEvent>,
}

/// Outcome of moving a character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Travel {
    /// The route taken.
    pub route: RouteCost,
    /// Encounters at the destination.
    pub events: Vec<CompletedEvent>,
}

// ---------------------------------------------------------------------------
// Calendar state
// ---------------------------------------------------------------------------

/// Where the day's calendar stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalendarState {
    /// Never built.
    Unset,
    /// Built; `cursor` is where the next scan resumes.
    Active {
        /// Today's notices.
        calendar: Calendar,
        /// Last notice handed out, or the first still pending.
        cursor: NoticeId,
    },
    /// Nothing left today; wait for the date to change.
    Exhausted,
}

#[derive(Serialize, Deserialize)]
struct SavedCalendar {
    state: CalendarState,
    today: Option<NaiveDate>,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives events, the calendar and movement against one store.
pub struct Orchestrator<S: EntityStore> {
    store: S,
    config: GensimConfig,
    paths: PathFinder,
    calendar: CalendarState,
    today: Option<NaiveDate>,
    rng: StdRng,
    dialog: Box<dyn DialogSource>,
    counters: SimCounters,
    ticks: Arc<TickBudgetMonitor>,
}

impl<S: EntityStore> Orchestrator<S> {
    /// An orchestrator with no calendar yet.
    ///
    /// The RNG is seeded from `config.general.seed` when set.
    #[must_use]
    pub fn new(store: S, config: GensimConfig) -> Self {
        let rng = config
            .general
            .seed
            .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        Self {
            paths: PathFinder::new(&config.walk),
            ticks: Arc::new(TickBudgetMonitor::new(config.performance.tick_budget_ms)),
            store,
            config,
            calendar: CalendarState::Unset,
            today: None,
            rng,
            dialog: Box::new(RandomLine),
            counters: SimCounters::new(),
        }
    }

    /// An orchestrator over a fresh world.
    ///
    /// Creates the global character and its clock, set to
    /// `config.world.start_date`, unless the store already has them.
    ///
    /// # Errors
    /// Returns [`GensimError::Config`] for an unparsable start date.
    pub fn start(mut store: S, config: GensimConfig) -> Result<Self> {
        archetype::seed_world(&mut store, &config.world)?;
        Ok(Self::new(store, config))
    }

    /// Rebuild an orchestrator from a store that carries a saved calendar.
    ///
    /// # Errors
    /// Returns [`GensimError::Serialization`] if the blob does not decode.
    pub fn resume(store: S, config: GensimConfig) -> Result<Self> {
        let mut orchestrator = Self::new(store, config);
        if let Some(blob) = orchestrator.store.calendar_blob() {
            let saved: SavedCalendar = bincode::deserialize(blob)
                .map_err(|e| GensimError::Serialization(e.to_string()))?;
            orchestrator.calendar = saved.state;
            orchestrator.today = saved.today;
            info!(today = ?orchestrator.today, "Resumed calendar");
        }
        Ok(orchestrator)
    }

    /// Replace the dialog source.
    #[must_use]
    pub fn with_dialog(mut self, dialog: impl DialogSource + 'static) -> Self {
        self.dialog = Box::new(dialog);
        self
    }

    /// The store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The store, for authoring content.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Give the store back.
    pub fn into_store(self) -> S {
        self.store
    }

    /// Runtime counters.
    pub fn counters(&self) -> &SimCounters {
        &self.counters
    }

    /// Trigger pass timings.
    pub fn ticks(&self) -> &TickBudgetMonitor {
        &self.ticks
    }

    /// The calendar as of the last pass.
    pub fn calendar_state(&self) -> &CalendarState {
        &self.calendar
    }

    /// Day the calendar was built for.
    pub fn today(&self) -> Option<NaiveDate> {
        self.today
    }

    /// Active configuration.
    pub fn config(&self) -> &GensimConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Contract
    // -----------------------------------------------------------------------

    /// Whether an event can fire now.
    ///
    /// # Errors
    /// Returns [`GensimError::EventNotFound`] for unknown ids and propagates
    /// evaluation failures.
    pub fn is_available(&self, id: EventId) -> Result<bool> {
        self.event(id)?.available(&self.store)
    }

    /// Commit an event's effects without checking availability or pruning.
    ///
    /// # Errors
    /// Returns [`GensimError::EventNotFound`] for unknown ids and propagates
    /// commit failures.
    pub fn complete(&mut self, id: EventId) -> Result<Vec<EffectResult>> {
        let event = self.event(id)?.clone();
        let results = event.complete(&mut self.store, self.dialog.as_ref(), &mut self.rng)?;
        SimCounters::bump(&self.counters.events_completed, 1);
        SimCounters::bump(&self.counters.effects_committed, results.len() as u64);
        Ok(results)
    }

    /// Events with notices in `(start, end]` on the current calendar, plus
    /// the node a follow-up scan should resume from.
    ///
    /// Reads from the head; the orchestrator's own cursor is left alone.
    /// Without a live calendar the scan is empty and has no cursor.
    ///
    /// # Errors
    /// Returns [`GensimError::NoticeNotFound`] if the calendar is corrupt.
    pub fn due_events(&self, start: i64, end: i64) -> Result<RangeScan> {
        match &self.calendar {
            CalendarState::Active { calendar, .. } => match calendar.head() {
                Some(head) => calendar.ids_in_range(head, start, end),
                None => Ok(RangeScan::default()),
            },
            CalendarState::Unset | CalendarState::Exhausted => Ok(RangeScan::default()),
        }
    }

    /// Cheapest route between two locations.
    ///
    /// # Errors
    /// Returns [`GensimError::LocationNotFound`] for unknown names.
    pub fn walk(&mut self, origin: &str, destination: &str) -> Result<RouteCost> {
        let _span = info_span!(spans::WALK, origin, destination).entered();
        let route = self.paths.walk(&self.store, origin, destination)?;
        self.counters.record_walk_cache(self.paths.stats());
        Ok(route)
    }

    // -----------------------------------------------------------------------
    // Actions
    // -----------------------------------------------------------------------

    /// Resolve `events`, then fire whatever the calendar has due.
    ///
    /// # Errors
    /// Propagates store, evaluation and calendar failures.
    pub fn trigger(&mut self, events: &[EventId]) -> Result<Vec<CompletedEvent>> {
        let start = self.now()?;
        self.trigger_since(start, events)
    }

    /// Trigger one event by name.
    ///
    /// # Errors
    /// Returns [`GensimError::EventNotFound`] for unknown names.
    pub fn trigger_named(&mut self, name: &str) -> Result<Vec<CompletedEvent>> {
        let id = self
            .store
            .event_by_name(name)
            .ok_or_else(|| GensimError::EventNotFound(name.to_string()))?
            .id;
        self.trigger(&[id])
    }

    /// Trigger every event of one kind, e.g. fishing or cooking.
    ///
    /// # Errors
    /// Propagates [`Self::trigger`] failures.
    pub fn trigger_kind(&mut self, kind: &EventKind) -> Result<Vec<CompletedEvent>> {
        let ids = ids(self.store.events_of_kind(kind));
        self.trigger(&ids)
    }

    /// The main loop: global events, events active where the player is, and
    /// flavor text of the characters there.
    ///
    /// # Errors
    /// Returns [`GensimError::NoMatch`] without a player and propagates
    /// [`Self::trigger`] failures.
    pub fn tick(&mut self) -> Result<Scene> {
        let location = location_of(self.store.player()?)?;
        let characters: Vec<String> = self
            .store
            .get(EntityKind::Character, &[("location_name", Value::from(location.as_str()))])
            .into_iter()
            .filter(|c| c.int("is_player") != Some(1))
            .filter_map(|c| c.text("name").map(str::to_string))
            .collect();

        let mut candidates = ids(self.store.events_of_kind(&EventKind::Global));
        candidates.extend(
            self.store
                .events()
                .into_iter()
                .filter(|e| e.location.as_deref() == Some(location.as_str()))
                .map(|e| e.id),
        );
        candidates.extend(
            self.store
                .events_of_kind(&EventKind::Flavor)
                .into_iter()
                .filter(|e| e.character.as_ref().is_some_and(|c| characters.contains(c)))
                .map(|e| e.id),
        );
        let mut seen = Vec::with_capacity(candidates.len());
        candidates.retain(|id| {
            let fresh = !seen.contains(id);
            seen.push(*id);
            fresh
        });

        let events = self.trigger(&candidates)?;
        Ok(Scene {
            time: self.now()?,
            location,
            characters,
            events,
        })
    }

    /// Walk `character` to `destination`, advance the clock by the route
    /// time and fire encounters with whoever is there.
    ///
    /// # Errors
    /// Returns [`GensimError::Unreachable`] when no route exists, plus lookup
    /// and [`Self::trigger`] failures.
    pub fn travel(&mut self, character: &str, destination: &str) -> Result<Travel> {
        let walker = self.store.character(character)?;
        let walker_ref = walker.target();
        let origin = location_of(walker)?;

        let route = self.walk(&origin, destination)?;
        if !route.is_reachable() {
            return Err(GensimError::Unreachable {
                origin,
                destination: destination.to_string(),
            });
        }

        let start = self.now()?;
        let clock = self.clock()?;
        self.store
            .set_attribute(&clock, "value", Value::Int(start + route.time))?;
        self.store
            .set_attribute(&walker_ref, "location_name", Value::from(destination))?;
        info!(character, origin = %origin, destination, time = route.time, "Walked");

        let present: Vec<String> = self
            .store
            .get(EntityKind::Character, &[("location_name", Value::from(destination))])
            .into_iter()
            .filter_map(|c| c.text("name").map(str::to_string))
            .collect();
        let encounters: Vec<EventId> = self
            .store
            .events_of_kind(&EventKind::Encounter)
            .into_iter()
            .filter(|e| e.character.as_ref().is_some_and(|c| present.contains(c)))
            .map(|e| e.id)
            .collect();

        let events = self.trigger_since(start, &encounters)?;
        Ok(Travel { route, events })
    }

    /// Chat with a character in the player's location.
    ///
    /// # Errors
    /// Returns [`GensimError::NotColocated`] when the character is
    /// elsewhere, plus lookup and [`Self::trigger`] failures.
    pub fn chat(&mut self, character: &str) -> Result<Vec<CompletedEvent>> {
        let character_location = location_of(self.store.character(character)?)?;
        let player_location = location_of(self.store.player()?)?;
        if character_location != player_location {
            return Err(GensimError::NotColocated {
                character: character.to_string(),
                character_location,
                player_location,
            });
        }
        let chats: Vec<EventId> = self
            .store
            .events_of_kind(&EventKind::Chat)
            .into_iter()
            .filter(|e| e.character.as_deref() == Some(character))
            .map(|e| e.id)
            .collect();
        self.trigger(&chats)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn event(&self, id: EventId) -> Result<&Event> {
        self.store
            .event(id)
            .ok_or_else(|| GensimError::EventNotFound(id.to_string()))
    }

    fn clock(&self) -> Result<TargetRef> {
        let world = &self.config.world;
        Ok(self
            .store
            .stat(&world.global_character, &world.time_label)?
            .target())
    }

    /// Current world clock in Unix seconds.
    ///
    /// # Errors
    /// Returns [`GensimError::NoMatch`] without a clock stat and
    /// [`GensimError::TypeMismatch`] if it is not numeric.
    pub fn now(&self) -> Result<i64> {
        let value = self.store.attribute(&self.clock()?, "value")?;
        value.as_int().ok_or_else(|| GensimError::TypeMismatch {
            property: "value".to_string(),
            value: value.to_string(),
        })
    }

    fn trigger_since(&mut self, start: i64, events: &[EventId]) -> Result<Vec<CompletedEvent>> {
        let ticks = Arc::clone(&self.ticks);
        let _tick = ticks.begin_tick();
        let _span = info_span!(spans::TRIGGER, candidates = events.len()).entered();

        let mut completed = self.resolve(events)?;
        let end = self.now()?;

        let day = schedule::day_of(end);
        if self.today.is_some_and(|today| day > today) {
            // Drain what is left of the old day before its calendar goes.
            let overnight = self.advance_cursor(start, end)?;
            if !overnight.is_empty() {
                completed.extend(self.resolve(&overnight)?);
            }
            self.reschedule(day)?;
        } else if matches!(self.calendar, CalendarState::Unset) {
            self.reschedule(day)?;
        }

        let due = self.advance_cursor(start, end)?;
        if !due.is_empty() {
            completed.extend(self.resolve(&due)?);
        }
        Ok(completed)
    }

    fn resolve(&mut self, events: &[EventId]) -> Result<Vec<CompletedEvent>> {
        let player_location = location_of(self.store.player()?)?;
        let mut completed = Vec::new();

        for &id in events {
            // Pruned earlier in this pass.
            let Some(event) = self.store.event(id).cloned() else {
                continue;
            };
            if !event.available(&self.store)? {
                continue;
            }
            info!(event = %event.name, "The event is currently available");

            let mut effects = self.complete(id)?;
            if self.off_screen(&event, &player_location)? {
                debug!(event = %event.name, "Event is happening elsewhere, hiding its text");
                for effect in &mut effects {
                    effect.text.clear();
                }
            }

            if event.prune {
                warn!(event = %event.name, "Pruning");
                self.store.delete_event(id)?;
                SimCounters::bump(&self.counters.events_pruned, 1);
            }

            let children = self
                .store
                .children(&event.name)
                .into_iter()
                .map(|c| Choice {
                    name: c.name.clone(),
                    verbose_name: c.verbose_name.clone(),
                })
                .collect();
            completed.push(CompletedEvent {
                name: event.name,
                kind: event.kind,
                verbose_name: event.verbose_name,
                effects,
                children,
            });
        }
        Ok(completed)
    }

    fn off_screen(&self, event: &Event, player_location: &str) -> Result<bool> {
        if event.kind != EventKind::Global {
            if let Some(name) = &event.character {
                if location_of(self.store.character(name)?)? != player_location {
                    return Ok(true);
                }
            }
        }
        Ok(event
            .location
            .as_deref()
            .is_some_and(|location| location != player_location))
    }

    /// Build a fresh calendar from the schedules due on `day`, pinning each
    /// event to its slot with date requirements.
    fn reschedule(&mut self, day: NaiveDate) -> Result<()> {
        let _span = info_span!(spans::RESCHEDULE, %day).entered();
        let reason = if self.today.is_none() { "no calendar" } else { "date change" };
        info!(reason, "Resetting schedule");

        let clock = self.clock()?;
        let due: Vec<Schedule> = schedule::due_on(self.store.schedules(), day)
            .cloned()
            .collect();

        let mut calendar = Calendar::new();
        for slot in due {
            let Some(id) = self.store.event_by_name(&slot.event_name).map(|e| e.id) else {
                warn!(event = %slot.event_name, "Scheduled event no longer exists");
                continue;
            };
            let date = slot.timestamp_on(day);
            let event = self
                .store
                .event_mut(id)
                .ok_or_else(|| GensimError::EventNotFound(slot.event_name.clone()))?;

            event
                .requirements
                .retain(|r| !(r.target == clock && r.property == "value"));
            event.requirements.push(Requirement::new(clock, "value", date)?);
            debug!(event = %event.name, date, "Using date");
            if let Some(duration) = slot.duration {
                debug!(event = %event.name, duration, "Event is continuous, adding another requirement");
                event
                    .requirements
                    .push(Requirement::new(clock, "value", -(date + duration))?);
            }

            calendar.schedule(Notice::new(id, date))?;
            SimCounters::bump(&self.counters.notices_scheduled, 1);
        }

        let notices = calendar.len();
        self.today = Some(day);
        self.calendar = match calendar.head() {
            Some(head) => CalendarState::Active {
                calendar,
                cursor: head,
            },
            None => CalendarState::Exhausted,
        };
        self.save_calendar()?;
        info!(notices, "Calendar updated");
        Ok(())
    }

    /// Collect the notices in `(start, end]` and move the cursor past them.
    fn advance_cursor(&mut self, start: i64, end: i64) -> Result<Vec<EventId>> {
        let (scan, previous) = match &self.calendar {
            CalendarState::Active { calendar, cursor } => {
                (calendar.ids_in_range(*cursor, start, end)?, *cursor)
            }
            CalendarState::Unset | CalendarState::Exhausted => return Ok(Vec::new()),
        };
        match scan.cursor {
            Some(next) => {
                if let CalendarState::Active { cursor, .. } = &mut self.calendar {
                    *cursor = next;
                }
            }
            None => {
                warn!(end, "No more events for today");
                self.calendar = CalendarState::Exhausted;
            }
        }
        if scan.cursor != Some(previous) {
            self.save_calendar()?;
        }
        Ok(scan.event_ids)
    }

    fn save_calendar(&mut self) -> Result<()> {
        let saved = SavedCalendar {
            state: self.calendar.clone(),
            today: self.today,
        };
        let blob =
            bincode::serialize(&saved).map_err(|e| GensimError::Serialization(e.to_string()))?;
        self.store.store_calendar_blob(blob);
        Ok(())
    }
}

impl<S: EntityStore> fmt::Debug for Orchestrator<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("calendar", &self.calendar)
            .field("today", &self.today)
            .field("paths", &self.paths)
            .field("counters", &self.counters.snapshot())
            .finish_non_exhaustive()
    }
}

fn ids(events: Vec<&Event>) -> Vec<EventId> {
    events.into_iter().map(|e| e.id).collect()
}

fn location_of(character: &Entity) -> Result<String> {
    character
        .text("location_name")
        .map(str::to_string)
        .ok_or_else(|| GensimError::AttributeNotFound {
            kind: character.kind,
            id: character.id,
            property: "location_name".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archetype::{self, chat, encounter, meet, schedule_daily, time_eff, EventSpec};
    use crate::config::TerrainConfig;
    use crate::dialog::Silent;
    use crate::schedule::{hm, midnight};
    use crate::store::MemoryStore;
    use crate::types::attrs;
    use crate::walk::{Location, Path, Terrain, TerrainKind};
    use chrono::Duration;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, 3, 16).expect("date")
    }

    fn add_character(store: &mut MemoryStore, name: &str, player: bool, location: &str) {
        store
            .create(
                EntityKind::Character,
                attrs([
                    ("name", Value::from(name)),
                    ("is_player", Value::from(player)),
                    ("location_name", Value::from(location)),
                    ("energy", Value::Int(2000)),
                ]),
            )
            .expect("character");
    }

    fn add_relationship(store: &mut MemoryStore, from: &str, to: &str, strength: i64) {
        store
            .create(
                EntityKind::Relationship,
                attrs([
                    ("from", Value::from(from)),
                    ("to", Value::from(to)),
                    ("strength", Value::Int(strength)),
                ]),
            )
            .expect("relationship");
    }

    /// Ann (player) and the Hatter at the meadow, the Queen at the castle,
    /// clock at 08:00.
    fn orchestrator() -> Orchestrator<MemoryStore> {
        let mut config = GensimConfig::default();
        config.general.seed = Some(7);
        let mut store = MemoryStore::new();
        add_character(&mut store, &config.world.global_character, false, "nowhere");
        add_character(&mut store, "Ann", true, "meadow");
        add_character(&mut store, "Hatter", false, "meadow");
        add_character(&mut store, "Queen", false, "castle");
        store
            .create(
                EntityKind::Stat,
                attrs([
                    ("chara_name", Value::from(config.world.global_character.as_str())),
                    ("label", Value::from(config.world.time_label.as_str())),
                    ("value", Value::Int(midnight(day()) + hm(8, 0))),
                ]),
            )
            .expect("clock");
        add_relationship(&mut store, "Ann", "Hatter", 0);
        add_relationship(&mut store, "Ann", "Queen", 1);

        let terrain = Terrain::configured(TerrainKind::Urban, &TerrainConfig::default());
        for name in ["meadow", "castle", "island"] {
            store.create_location(Location::new(name)).expect("location");
        }
        store
            .create_path(Path::new("meadow", "castle", 100, terrain))
            .expect("path");
        Orchestrator::new(store, config).with_dialog(Silent)
    }

    fn install(orchestrator: &mut Orchestrator<MemoryStore>, spec: &EventSpec) -> EventId {
        let world = orchestrator.config().world.clone();
        archetype::install(orchestrator.store_mut(), spec, &world).expect("install")
    }

    fn names(events: &[CompletedEvent]) -> Vec<&str> {
        events.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn contract_entry_points() {
        let mut orch = orchestrator();
        let id = install(&mut orch, &meet("hello", "Hatter"));
        assert!(orch.is_available(id).expect("available"));
        assert_eq!(orch.complete(id).expect("complete").len(), 1);
        assert!(!orch.is_available(id).expect("available"));
        assert!(matches!(
            orch.is_available(EventId::new()),
            Err(GensimError::EventNotFound(_))
        ));
        assert_eq!(orch.walk("meadow", "castle").expect("walk").time, 70);
        assert_eq!(orch.due_events(0, i64::MAX).expect("due"), RangeScan::default());
    }

    #[test]
    fn start_sets_the_clock_from_the_start_date() {
        let mut config = GensimConfig::default();
        config.world.start_date = "2022-03-16".to_string();
        let mut store = MemoryStore::new();
        add_character(&mut store, "Ann", true, "meadow");

        let mut orch = Orchestrator::start(store, config.clone()).expect("start");
        assert_eq!(orch.now().expect("now"), midnight(day()));
        assert!(orch.store().character(&config.world.global_character).is_ok());

        // An existing clock is kept.
        orch.trigger(&[]).expect("trigger");
        let restarted = Orchestrator::start(orch.into_store(), config).expect("start");
        assert_eq!(restarted.now().expect("now"), midnight(day()));

        let mut broken = GensimConfig::default();
        broken.world.start_date = "someday".to_string();
        assert!(matches!(
            Orchestrator::start(MemoryStore::new(), broken),
            Err(GensimError::Config(_))
        ));
    }

    #[test]
    fn trigger_skips_unavailable_and_prunes() {
        let mut orch = orchestrator();
        let once = install(&mut orch, &meet("hello", "Hatter").pruned());
        let locked = install(&mut orch, &chat("tea", "Hatter"));

        let fired = orch.trigger(&[locked, once]).expect("trigger");
        assert_eq!(names(&fired), vec!["hello"]);
        assert!(orch.store().event(once).is_none());
        assert_eq!(orch.counters().snapshot().events_pruned, 1);

        // Pruned ids are skipped, the chat is now open.
        let fired = orch.trigger(&[once, locked]).expect("trigger");
        assert_eq!(names(&fired), vec!["tea"]);
        assert_eq!(orch.ticks().tick_count(), 2);
    }

    #[test]
    fn off_screen_text_is_hidden() {
        let mut orch = orchestrator().with_dialog(RandomLine);
        let spec = encounter("wave", "Queen").with_effect(
            archetype::prel_eff(1).with_line("The Queen waves at {player}."),
        );
        let id = install(&mut orch, &spec);
        let fired = orch.trigger(&[id]).expect("trigger");
        assert_eq!(fired.len(), 1);
        assert!(fired[0].effects.iter().all(|e| e.text.is_empty()));

        let at_castle = install(
            &mut orch,
            &EventSpec::new("trumpets", EventKind::Global)
                .at_location("castle")
                .with_effect(archetype::no_effect().with_line("Trumpets!")),
        );
        let fired = orch.trigger(&[at_castle]).expect("trigger");
        assert_eq!(fired[0].effects[0].text, "");
    }

    #[test]
    fn scheduled_event_fires_exactly_once() {
        let mut orch = orchestrator();
        let spec = EventSpec::new("tea_time", EventKind::Global)
            .with_effect(archetype::no_effect())
            .scheduled(schedule_daily(hm(9, 0)));
        install(&mut orch, &spec);
        let wait = install(
            &mut orch,
            &EventSpec::new("wait", EventKind::Custom("WAIT".into()))
                .with_effect(time_eff(Duration::hours(1))),
        );

        // 08:00: builds the calendar, nothing due yet.
        let fired = orch.trigger(&[]).expect("trigger");
        assert!(fired.is_empty());
        assert_eq!(orch.today(), Some(day()));
        let tea = orch.store().event_by_name("tea_time").expect("tea").clone();
        assert_eq!(tea.requirements.len(), 1);
        assert!(!orch.is_available(tea.id).expect("available"));

        // 08:00 -> 09:00 crosses the slot.
        let fired = orch.trigger(&[wait]).expect("trigger");
        assert_eq!(names(&fired), vec!["wait", "tea_time"]);
        assert!(matches!(orch.calendar_state(), CalendarState::Active { .. }));

        // 09:00 -> 10:00 does not fire it again and exhausts the day.
        let fired = orch.trigger(&[wait]).expect("trigger");
        assert_eq!(names(&fired), vec!["wait"]);
        assert_eq!(orch.calendar_state(), &CalendarState::Exhausted);
    }

    #[test]
    fn notices_before_midnight_fire_after_the_date_changes() {
        let mut orch = orchestrator();
        let clock = orch.clock().expect("clock");
        orch.store_mut()
            .set_attribute(&clock, "value", Value::Int(midnight(day()) + hm(23, 0)))
            .expect("clock");
        let late = install(
            &mut orch,
            &EventSpec::new("late_show", EventKind::Global)
                .with_effect(archetype::no_effect())
                .scheduled(schedule_daily(hm(23, 30))),
        );
        let wait = install(
            &mut orch,
            &EventSpec::new("wait", EventKind::Custom("WAIT".into()))
                .with_effect(time_eff(Duration::hours(2))),
        );

        assert!(orch.trigger(&[]).expect("trigger").is_empty());

        // 23:00 -> 01:00 the next day.
        let fired = orch.trigger(&[wait]).expect("trigger");
        assert_eq!(names(&fired), vec!["wait", "late_show"]);
        assert_eq!(orch.today(), day().succ_opt());
        assert_eq!(orch.counters().snapshot().notices_scheduled, 2);

        // Tonight's slot is pinned to the new date and still pending.
        assert!(!orch.is_available(late).expect("available"));
        assert!(matches!(orch.calendar_state(), CalendarState::Active { .. }));
        let fired = orch.trigger(&[wait]).expect("trigger");
        assert_eq!(names(&fired), vec!["wait"]);
    }

    #[test]
    fn due_events_report_where_to_resume() {
        let mut orch = orchestrator();
        for (name, at) in [("breakfast", hm(9, 0)), ("lunch", hm(12, 0))] {
            install(
                &mut orch,
                &EventSpec::new(name, EventKind::Global)
                    .with_effect(archetype::no_effect())
                    .scheduled(schedule_daily(at)),
            );
        }
        orch.trigger(&[]).expect("trigger");
        let breakfast = orch.store().event_by_name("breakfast").expect("breakfast").id;
        let lunch = orch.store().event_by_name("lunch").expect("lunch").id;
        let morning = midnight(day());

        let scan = orch
            .due_events(morning + hm(8, 0), morning + hm(10, 0))
            .expect("due");
        assert_eq!(scan.event_ids, vec![breakfast]);
        let cursor = scan.cursor.expect("cursor");

        let CalendarState::Active { calendar, .. } = orch.calendar_state() else {
            panic!("calendar should be active");
        };
        assert_eq!(
            calendar.notice(cursor).expect("notice").timestamp,
            morning + hm(9, 0)
        );
        let rest = calendar
            .ids_in_range(cursor, morning + hm(10, 0), morning + hm(13, 0))
            .expect("scan");
        assert_eq!(rest.event_ids, vec![lunch]);

        let late = orch
            .due_events(morning + hm(13, 0), morning + hm(23, 0))
            .expect("due");
        assert!(late.event_ids.is_empty());
        assert_eq!(late.cursor, None);
    }

    #[test]
    fn continuous_events_get_an_end() {
        let mut orch = orchestrator();
        let spec = EventSpec::new("market", EventKind::Global)
            .with_effect(archetype::no_effect())
            .scheduled(schedule_daily(hm(7, 0)).lasting(hm(2, 0)));
        let id = install(&mut orch, &spec);
        orch.trigger(&[]).expect("trigger");

        let market = orch.store().event(id).expect("market");
        let values: Vec<i64> = market
            .requirements
            .iter()
            .filter_map(|r| r.value.as_int())
            .collect();
        let slot = midnight(day()) + hm(7, 0);
        assert_eq!(values, vec![slot, -(slot + hm(2, 0))]);
        assert!(orch.is_available(id).expect("available"));
    }

    #[test]
    fn calendar_survives_resume() {
        let mut orch = orchestrator();
        install(
            &mut orch,
            &EventSpec::new("noon", EventKind::Global)
                .with_effect(archetype::no_effect())
                .scheduled(schedule_daily(hm(12, 0))),
        );
        orch.trigger(&[]).expect("trigger");
        let state = orch.calendar_state().clone();
        let config = orch.config().clone();

        let resumed = Orchestrator::resume(orch.into_store(), config).expect("resume");
        assert_eq!(resumed.calendar_state(), &state);
        assert_eq!(resumed.today(), Some(day()));
    }

    #[test]
    fn travel_moves_and_meets() {
        let mut orch = orchestrator();
        install(&mut orch, &encounter("bow", "Queen"));
        let before = orch.now().expect("now");

        let travel = orch.travel("Ann", "castle").expect("travel");
        assert_eq!(travel.route.time, 70);
        assert_eq!(names(&travel.events), vec!["bow"]);
        assert_eq!(orch.now().expect("now"), before + 70);
        assert_eq!(
            orch.store().player().expect("player").text("location_name"),
            Some("castle")
        );

        assert!(matches!(
            orch.travel("Ann", "island"),
            Err(GensimError::Unreachable { .. })
        ));
    }

    #[test]
    fn chat_needs_company() {
        let mut orch = orchestrator();
        install(&mut orch, &meet("hello", "Hatter"));
        install(&mut orch, &chat("tea", "Hatter"));
        install(&mut orch, &chat("decree", "Queen"));

        assert!(matches!(
            orch.chat("Queen"),
            Err(GensimError::NotColocated { .. })
        ));
        assert!(orch.chat("Hatter").expect("chat").is_empty());
        orch.trigger_named("hello").expect("hello");
        assert_eq!(names(&orch.chat("Hatter").expect("chat")), vec!["tea"]);
    }

    #[test]
    fn tick_collects_the_scene() {
        let mut orch = orchestrator();
        install(&mut orch, &meet("hello", "Hatter"));
        install(
            &mut orch,
            &EventSpec::new("breeze", EventKind::Global).with_effect(archetype::no_effect()),
        );
        install(&mut orch, &archetype::flavor("hum", "Queen"));

        let scene = orch.tick().expect("tick");
        assert_eq!(scene.location, "meadow");
        assert_eq!(scene.characters, vec!["Hatter".to_string()]);
        // The Queen's flavor text is elsewhere; the meet is an encounter.
        assert_eq!(names(&scene.events), vec!["breeze"]);
    }

    #[test]
    fn trigger_kind_runs_actions() {
        let mut orch = orchestrator();
        orch.store_mut()
            .create(
                EntityKind::Stat,
                attrs([
                    ("chara_name", Value::from("Ann")),
                    ("label", Value::from("cooking_skill")),
                    ("value", Value::Int(0)),
                ]),
            )
            .expect("skill");
        install(&mut orch, &archetype::cook("stew"));
        let fired = orch.trigger_kind(&EventKind::Cook).expect("cook");
        assert_eq!(names(&fired), vec!["stew"]);
        let skill = orch.store().stat("Ann", "cooking_skill").expect("skill");
        assert_eq!(skill.int("value"), Some(1));
    }
}
