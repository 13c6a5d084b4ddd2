//! # Gensim Core Library
//!
//! Simulation kernel for a small persistent world of characters, locations
//! and scripted events.
//!
//! - **Rules**: [`Requirement`]s gate events, [`Effect`]s mutate entities,
//!   [`Buff`]s scale effects. All three point at a `(kind, property)` pair
//!   from one capability table.
//! - **Event graph**: activators share availability, locks block it, and
//!   subevents are offered as choices once their parent completes.
//! - **Calendar**: recurring [`Schedule`]s become a time-ordered list of
//!   notices that the orchestrator scans as the world clock moves.
//! - **Movement**: a memoized route search over terrain-costed paths.
//!
//! Every operation reads and writes the world through [`EntityStore`].
//! [`MemoryStore`] is the in-process implementation, and [`SaveEngine`]
//! keeps whole stores in SQLite save slots.
//!
//! ## Performance Contract
//!
//! The kernel runs synchronously inside one game action:
//! - Availability check: a handful of attribute reads per event
//! - Calendar insert: linear in the notices between the anchor and the slot
//! - Repeated walks over an unchanged graph: answered from the memo cache
//! - Trigger pass: timed against `performance.tick_budget_ms`

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod archetype;
pub mod buff;
pub mod calendar;
pub mod capability;
pub mod config;
pub mod dialog;
pub mod effect;
pub mod error;
pub mod event;
pub mod metrics;
pub mod orchestrator;
pub mod persistence;
pub mod requirement;
pub mod schedule;
pub mod store;
pub mod types;
pub mod walk;

pub use buff::Buff;
pub use calendar::{Calendar, Notice, NoticeId, RangeScan};
pub use config::GensimConfig;
pub use effect::{Effect, EffectResult};
pub use error::{GensimError, Result};
pub use event::{Event, EventKind, EventLock};
pub use orchestrator::{CalendarState, CompletedEvent, Orchestrator};
pub use persistence::SaveEngine;
pub use requirement::Requirement;
pub use schedule::{Schedule, ScheduleKind};
pub use store::{EntityStore, MemoryStore};
pub use types::*;
pub use walk::{Location, Path, PathFinder, RouteCost, Terrain, TerrainKind};
