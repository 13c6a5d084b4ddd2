//! The entity store: every record the kernel reads or writes.
//!
//! The kernel only talks to [`EntityStore`]. [`MemoryStore`] is the reference
//! implementation: insertion-ordered vectors, serializable as a whole so a
//! world can be saved into one slot. Insertion order matters, as it is the
//! order paths are enumerated in and therefore the walk tie-break.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GensimError, Result};
use crate::event::{Event, EventKind, EventLock};
use crate::schedule::Schedule;
use crate::types::{Attributes, Entity, EntityId, EntityKind, EventId, TargetRef, Value};
use crate::walk::{Location, Path};

/// Filter-by-equality access to the world's records.
pub trait EntityStore {
    // -----------------------------------------------------------------------
    // Generic entities
    // -----------------------------------------------------------------------

    /// Entities of `kind` whose attributes equal every filter pair.
    fn get(&self, kind: EntityKind, filters: &[(&str, Value)]) -> Vec<&Entity>;

    /// The entity behind a reference.
    fn entity(&self, target: &TargetRef) -> Option<&Entity>;

    /// Create an entity with a fresh id.
    ///
    /// # Errors
    /// Implementations may reject invalid attribute sets.
    fn create(&mut self, kind: EntityKind, attributes: Attributes) -> Result<Entity>;

    /// Merge `attributes` into an entity.
    ///
    /// # Errors
    /// Returns [`GensimError::EntityNotFound`] for unknown targets.
    fn update(&mut self, target: &TargetRef, attributes: Attributes) -> Result<Entity>;

    /// Read one attribute.
    ///
    /// # Errors
    /// Returns [`GensimError::EntityNotFound`] or
    /// [`GensimError::AttributeNotFound`].
    fn attribute(&self, target: &TargetRef, property: &str) -> Result<Value> {
        let entity = self
            .entity(target)
            .ok_or(GensimError::EntityNotFound(*target))?;
        entity
            .get(property)
            .cloned()
            .ok_or_else(|| GensimError::AttributeNotFound {
                kind: target.kind,
                id: target.id,
                property: property.to_string(),
            })
    }

    /// Write one attribute.
    ///
    /// # Errors
    /// Returns [`GensimError::EntityNotFound`] for unknown targets.
    fn set_attribute(&mut self, target: &TargetRef, property: &str, value: Value) -> Result<()> {
        let mut change = Attributes::new();
        change.insert(property.to_string(), value);
        self.update(target, change).map(|_| ())
    }

    // -----------------------------------------------------------------------
    // Events and locks
    // -----------------------------------------------------------------------

    /// Store an event, assigning its id.
    ///
    /// # Errors
    /// Returns [`GensimError::DuplicateName`] if the name is taken.
    fn create_event(&mut self, event: Event) -> Result<EventId>;

    /// Event by id.
    fn event(&self, id: EventId) -> Option<&Event>;

    /// Mutable event by id (requirements are flushed and re-added in place).
    fn event_mut(&mut self, id: EventId) -> Option<&mut Event>;

    /// Event by unique name.
    fn event_by_name(&self, name: &str) -> Option<&Event>;

    /// Every event, in creation order.
    fn events(&self) -> Vec<&Event>;

    /// Delete an event with its lock rows and schedules.
    ///
    /// # Errors
    /// Returns [`GensimError::EventNotFound`] for unknown ids.
    fn delete_event(&mut self, id: EventId) -> Result<Event>;

    /// Record that `key` locks `lock`.
    ///
    /// # Errors
    /// Returns [`GensimError::EventNotFound`] if either event is unknown.
    fn add_lock(&mut self, key: &str, lock: &str) -> Result<()>;

    /// Remove a lock row; returns whether it existed.
    fn remove_lock(&mut self, key: &str, lock: &str) -> bool;

    /// Rows where `name` is the locking event.
    fn locks(&self, name: &str) -> Vec<&EventLock>;

    /// Rows where `name` is the locked event.
    fn locked_by(&self, name: &str) -> Vec<&EventLock>;

    /// Events of a given kind, in creation order.
    fn events_of_kind(&self, kind: &EventKind) -> Vec<&Event> {
        self.events().into_iter().filter(|e| &e.kind == kind).collect()
    }

    /// Choices of `parent`, in creation order.
    fn children(&self, parent: &str) -> Vec<&Event> {
        self.events()
            .into_iter()
            .filter(|e| e.parent.as_deref() == Some(parent))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Location graph
    // -----------------------------------------------------------------------

    /// Store a location.
    ///
    /// # Errors
    /// Returns [`GensimError::DuplicateName`] if the name is taken.
    fn create_location(&mut self, location: Location) -> Result<()>;

    /// Location by name.
    fn location(&self, name: &str) -> Option<&Location>;

    /// Store a path.
    ///
    /// # Errors
    /// Returns [`GensimError::LocationNotFound`] if an end is unknown.
    fn create_path(&mut self, path: Path) -> Result<()>;

    /// Paths authored from `location`, then paths authored to it.
    fn paths_touching(&self, location: &str) -> Vec<&Path>;

    /// Bumped whenever locations or paths change.
    fn graph_revision(&self) -> u64;

    // -----------------------------------------------------------------------
    // Schedules and the calendar blob
    // -----------------------------------------------------------------------

    /// Store a schedule.
    ///
    /// # Errors
    /// Returns [`GensimError::EventNotFound`] if the event is unknown.
    fn create_schedule(&mut self, schedule: Schedule) -> Result<()>;

    /// Every schedule, in creation order.
    fn schedules(&self) -> Vec<&Schedule>;

    /// The persisted calendar, if any.
    fn calendar_blob(&self) -> Option<&[u8]>;

    /// Replace the persisted calendar.
    fn store_calendar_blob(&mut self, blob: Vec<u8>);

    // -----------------------------------------------------------------------
    // Lookups by name
    // -----------------------------------------------------------------------

    /// The player character.
    ///
    /// # Errors
    /// Returns [`GensimError::NoMatch`] when no character is the player.
    fn player(&self) -> Result<&Entity> {
        first(
            self.get(EntityKind::Character, &[("is_player", Value::Int(1))]),
            EntityKind::Character,
            "is_player = 1",
        )
    }

    /// A character by name.
    ///
    /// # Errors
    /// Returns [`GensimError::NoMatch`] for unknown names.
    fn character(&self, name: &str) -> Result<&Entity> {
        first(
            self.get(EntityKind::Character, &[("name", Value::from(name))]),
            EntityKind::Character,
            &format!("name = {name}"),
        )
    }

    /// The stat labelled `label` owned by `owner`.
    ///
    /// # Errors
    /// Returns [`GensimError::NoMatch`] when there is none.
    fn stat(&self, owner: &str, label: &str) -> Result<&Entity> {
        first(
            self.get(
                EntityKind::Stat,
                &[("chara_name", Value::from(owner)), ("label", Value::from(label))],
            ),
            EntityKind::Stat,
            &format!("{owner}.{label}"),
        )
    }

    /// The relationship between two characters, stored in either direction.
    ///
    /// # Errors
    /// Returns [`GensimError::NoMatch`] when there is none.
    fn relationship(&self, a: &str, b: &str) -> Result<&Entity> {
        let forward = self.get(
            EntityKind::Relationship,
            &[("from", Value::from(a)), ("to", Value::from(b))],
        );
        if !forward.is_empty() {
            return first(forward, EntityKind::Relationship, "");
        }
        first(
            self.get(
                EntityKind::Relationship,
                &[("from", Value::from(b)), ("to", Value::from(a))],
            ),
            EntityKind::Relationship,
            &format!("{a} <-> {b}"),
        )
    }
}

fn first<'a>(found: Vec<&'a Entity>, kind: EntityKind, filter: &str) -> Result<&'a Entity> {
    found.into_iter().next().ok_or_else(|| GensimError::NoMatch {
        kind,
        filter: filter.to_string(),
    })
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Reference [`EntityStore`] keeping everything in insertion-ordered vectors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStore {
    entities: Vec<Entity>,
    events: Vec<Event>,
    locks: Vec<EventLock>,
    locations: Vec<Location>,
    paths: Vec<Path>,
    schedules: Vec<Schedule>,
    calendar: Option<Vec<u8>>,
    graph_revision: u64,
}

impl MemoryStore {
    /// An empty world.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of generic entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Number of events.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    fn entity_mut(&mut self, target: &TargetRef) -> Option<&mut Entity> {
        self.entities
            .iter_mut()
            .find(|e| e.kind == target.kind && e.id == target.id)
    }
}

impl EntityStore for MemoryStore {
    fn get(&self, kind: EntityKind, filters: &[(&str, Value)]) -> Vec<&Entity> {
        self.entities
            .iter()
            .filter(|e| e.kind == kind && e.matches(filters))
            .collect()
    }

    fn entity(&self, target: &TargetRef) -> Option<&Entity> {
        self.entities
            .iter()
            .find(|e| e.kind == target.kind && e.id == target.id)
    }

    fn create(&mut self, kind: EntityKind, attributes: Attributes) -> Result<Entity> {
        let entity = Entity {
            kind,
            id: EntityId::new(),
            attributes,
        };
        debug!(entity = %entity.target(), "Created entity");
        self.entities.push(entity.clone());
        Ok(entity)
    }

    fn update(&mut self, target: &TargetRef, attributes: Attributes) -> Result<Entity> {
        let entity = self
            .entity_mut(target)
            .ok_or(GensimError::EntityNotFound(*target))?;
        entity.attributes.extend(attributes);
        Ok(entity.clone())
    }

    fn set_attribute(&mut self, target: &TargetRef, property: &str, value: Value) -> Result<()> {
        let entity = self
            .entity_mut(target)
            .ok_or(GensimError::EntityNotFound(*target))?;
        entity.attributes.insert(property.to_string(), value);
        Ok(())
    }

    fn create_event(&mut self, mut event: Event) -> Result<EventId> {
        if self.event_by_name(&event.name).is_some() {
            return Err(GensimError::DuplicateName {
                kind: "event",
                name: event.name,
            });
        }
        event.id = EventId::new();
        let id = event.id;
        debug!(event = %event.name, kind = %event.kind, "Created event");
        self.events.push(event);
        Ok(id)
    }

    fn event(&self, id: EventId) -> Option<&Event> {
        self.events.iter().find(|e| e.id == id)
    }

    fn event_mut(&mut self, id: EventId) -> Option<&mut Event> {
        self.events.iter_mut().find(|e| e.id == id)
    }

    fn event_by_name(&self, name: &str) -> Option<&Event> {
        self.events.iter().find(|e| e.name == name)
    }

    fn events(&self) -> Vec<&Event> {
        self.events.iter().collect()
    }

    fn delete_event(&mut self, id: EventId) -> Result<Event> {
        let index = self
            .events
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| GensimError::EventNotFound(id.to_string()))?;
        let event = self.events.remove(index);
        self.locks.retain(|l| l.key != event.name && l.lock != event.name);
        self.schedules.retain(|s| s.event_name != event.name);
        Ok(event)
    }

    fn add_lock(&mut self, key: &str, lock: &str) -> Result<()> {
        for name in [key, lock] {
            if self.event_by_name(name).is_none() {
                return Err(GensimError::EventNotFound(name.to_string()));
            }
        }
        let row = EventLock {
            key: key.to_string(),
            lock: lock.to_string(),
        };
        if !self.locks.contains(&row) {
            self.locks.push(row);
        }
        Ok(())
    }

    fn remove_lock(&mut self, key: &str, lock: &str) -> bool {
        let before = self.locks.len();
        self.locks.retain(|l| !(l.key == key && l.lock == lock));
        self.locks.len() != before
    }

    fn locks(&self, name: &str) -> Vec<&EventLock> {
        self.locks.iter().filter(|l| l.key == name).collect()
    }

    fn locked_by(&self, name: &str) -> Vec<&EventLock> {
        self.locks.iter().filter(|l| l.lock == name).collect()
    }

    fn create_location(&mut self, location: Location) -> Result<()> {
        if self.location(&location.name).is_some() {
            return Err(GensimError::DuplicateName {
                kind: "location",
                name: location.name,
            });
        }
        self.locations.push(location);
        self.graph_revision += 1;
        Ok(())
    }

    fn location(&self, name: &str) -> Option<&Location> {
        self.locations.iter().find(|l| l.name == name)
    }

    fn create_path(&mut self, path: Path) -> Result<()> {
        for name in [&path.origin, &path.destination] {
            if self.location(name).is_none() {
                return Err(GensimError::LocationNotFound(name.clone()));
            }
        }
        self.paths.push(path);
        self.graph_revision += 1;
        Ok(())
    }

    fn paths_touching(&self, location: &str) -> Vec<&Path> {
        let authored_from = self.paths.iter().filter(|p| p.origin == location);
        let authored_to = self
            .paths
            .iter()
            .filter(|p| p.destination == location && p.origin != location);
        authored_from.chain(authored_to).collect()
    }

    fn graph_revision(&self) -> u64 {
        self.graph_revision
    }

    fn create_schedule(&mut self, schedule: Schedule) -> Result<()> {
        if self.event_by_name(&schedule.event_name).is_none() {
            return Err(GensimError::EventNotFound(schedule.event_name));
        }
        self.schedules.push(schedule);
        Ok(())
    }

    fn schedules(&self) -> Vec<&Schedule> {
        self.schedules.iter().collect()
    }

    fn calendar_blob(&self) -> Option<&[u8]> {
        self.calendar.as_deref()
    }

    fn store_calendar_blob(&mut self, blob: Vec<u8>) {
        self.calendar = Some(blob);
    }
}
