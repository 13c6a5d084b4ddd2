//! Locations, terrain-costed paths and the memoized route search.
//!
//! The search is depth-first. From the current location it looks at every
//! path touching it (stored in either direction), skips locations already on
//! the current branch, and returns immediately when a neighbour is the
//! destination. Otherwise it recurses into every neighbour and keeps the
//! cheapest result by time, the first one found on ties.
//!
//! Every call is memoized on its full argument tuple, so repeated walks over
//! an unchanged graph are answered from the cache.

use std::fmt;
use std::num::NonZeroUsize;

use lru::LruCache;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::config::{TerrainConfig, WalkConfig};
use crate::error::{GensimError, Result};
use crate::store::EntityStore;

/// Route time reported when the destination cannot be reached.
pub const UNREACHABLE_TIME: i64 = 9999;

// ---------------------------------------------------------------------------
// Graph records
// ---------------------------------------------------------------------------

/// Terrain a path crosses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TerrainKind {
    /// Slowest to cross.
    River,
    /// Mountain trails.
    Mountain,
    /// Forest tracks.
    Forest,
    /// Open fields.
    Grasslands,
    /// Streets; the default for authored paths.
    Urban,
}

impl fmt::Display for TerrainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::River => write!(f, "RIVER"),
            Self::Mountain => write!(f, "MOUNTAIN"),
            Self::Forest => write!(f, "FOREST"),
            Self::Grasslands => write!(f, "GRASSLANDS"),
            Self::Urban => write!(f, "URBAN"),
        }
    }
}

/// A terrain kind with its quality multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Terrain {
    /// Kind of terrain.
    pub kind: TerrainKind,
    /// Multiplier turning distance into time and energy.
    pub quality: f64,
}

impl Terrain {
    /// Terrain with the quality configured for `kind`.
    #[must_use]
    pub fn configured(kind: TerrainKind, config: &TerrainConfig) -> Self {
        Self {
            kind,
            quality: config.quality(kind),
        }
    }
}

/// A node of the location graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Unique name.
    pub name: String,
    /// Optional grouping of locations.
    pub area: Option<String>,
}

impl Location {
    /// A location outside any area.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            area: None,
        }
    }

    /// Place the location in an area.
    #[must_use]
    pub fn in_area(mut self, area: impl Into<String>) -> Self {
        self.area = Some(area.into());
        self
    }
}

/// A stored edge between two locations, walkable both ways.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Path {
    /// Location the row was authored from.
    pub origin: String,
    /// Location the row was authored to.
    pub destination: String,
    /// Raw distance.
    pub distance: i64,
    /// Terrain crossed.
    pub terrain: Terrain,
}

impl Path {
    /// Create a path.
    #[must_use]
    pub fn new(
        origin: impl Into<String>,
        destination: impl Into<String>,
        distance: i64,
        terrain: Terrain,
    ) -> Self {
        Self {
            origin: origin.into(),
            destination: destination.into(),
            distance,
            terrain,
        }
    }

    /// Seconds needed to cross, rounded down.
    #[must_use]
    pub fn seconds_taken(&self) -> i64 {
        (self.distance as f64 * self.terrain.quality).floor() as i64
    }

    /// Energy spent crossing, rounded down; charged per whole ten units.
    #[must_use]
    pub fn energy_taken(&self) -> i64 {
        ((self.distance / 10) as f64 * self.terrain.quality).floor() as i64
    }

    /// The end of this path that is not `from`.
    #[must_use]
    pub fn other_end(&self, from: &str) -> &str {
        if self.destination == from {
            &self.origin
        } else {
            &self.destination
        }
    }

    /// Whether either end is `location`.
    #[must_use]
    pub fn touches(&self, location: &str) -> bool {
        self.origin == location || self.destination == location
    }
}

// ---------------------------------------------------------------------------
// Route search
// ---------------------------------------------------------------------------

/// Accumulated cost of a route.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouteCost {
    /// Seconds spent, or [`UNREACHABLE_TIME`].
    pub time: i64,
    /// Energy spent.
    pub energy: i64,
    /// Locations entered, in order, ending at the destination.
    pub visited: Vec<String>,
}

impl RouteCost {
    /// The "no route" sentinel.
    #[must_use]
    pub fn unreachable() -> Self {
        Self {
            time: UNREACHABLE_TIME,
            energy: 0,
            visited: Vec::new(),
        }
    }

    /// Whether this is a real route.
    #[must_use]
    pub fn is_reachable(&self) -> bool {
        self.time < UNREACHABLE_TIME
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct WalkKey {
    origin: String,
    destination: String,
    visited: Vec<String>,
    time: i64,
    energy: i64,
}

/// Cache counters of a [`PathFinder`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Calls answered from the cache.
    pub hits: u64,
    /// Calls that had to search.
    pub misses: u64,
}

/// Memoized route search over the store's location graph.
pub struct PathFinder {
    cache: LruCache<WalkKey, RouteCost>,
    max_depth: usize,
    revision: Option<u64>,
    stats: CacheStats,
}

impl PathFinder {
    /// Create a path finder sized by `config`.
    #[must_use]
    pub fn new(config: &WalkConfig) -> Self {
        let cache = NonZeroUsize::new(config.cache_capacity)
            .map_or_else(LruCache::unbounded, LruCache::new);
        Self {
            cache,
            max_depth: config.max_depth,
            revision: None,
            stats: CacheStats::default(),
        }
    }

    /// Drop every memoized result.
    pub fn invalidate(&mut self) {
        debug!(entries = self.cache.len(), "Invalidating walk cache");
        self.cache.clear();
    }

    /// Number of memoized calls.
    #[must_use]
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Hit and miss counts since creation.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Cheapest route from `origin` to `destination`.
    ///
    /// Returns [`RouteCost::unreachable`] when no route exists. Walking to
    /// the current location costs nothing.
    ///
    /// # Errors
    /// Returns [`GensimError::LocationNotFound`] for unknown location names.
    pub fn walk<S: EntityStore + ?Sized>(
        &mut self,
        store: &S,
        origin: &str,
        destination: &str,
    ) -> Result<RouteCost> {
        for name in [origin, destination] {
            if store.location(name).is_none() {
                return Err(GensimError::LocationNotFound(name.to_string()));
            }
        }

        let revision = store.graph_revision();
        if self.revision != Some(revision) {
            if self.revision.is_some() {
                self.invalidate();
            }
            self.revision = Some(revision);
        }

        if origin == destination {
            return Ok(RouteCost {
                time: 0,
                energy: 0,
                visited: Vec::new(),
            });
        }

        let key = WalkKey {
            origin: origin.to_string(),
            destination: destination.to_string(),
            visited: Vec::new(),
            time: 0,
            energy: 0,
        };
        let cost = self.search(store, key, 0);
        debug!(
            origin,
            destination,
            time = cost.time,
            energy = cost.energy,
            reachable = cost.is_reachable(),
            "Walk resolved"
        );
        Ok(cost)
    }

    fn search<S: EntityStore + ?Sized>(&mut self, store: &S, key: WalkKey, depth: usize) -> RouteCost {
        if let Some(hit) = self.cache.get(&key).cloned() {
            self.stats.hits += 1;
            trace!(origin = %key.origin, "Walk cache hit");
            return hit;
        }
        self.stats.misses += 1;

        let cost = self.expand(store, &key, depth);
        self.cache.put(key, cost.clone());
        cost
    }

    fn expand<S: EntityStore + ?Sized>(&mut self, store: &S, key: &WalkKey, depth: usize) -> RouteCost {
        if depth >= self.max_depth {
            warn!(origin = %key.origin, depth, "Walk depth cap reached");
            return RouteCost::unreachable();
        }

        let mut reserve = Vec::new();
        for path in store.paths_touching(&key.origin) {
            let location = path.other_end(&key.origin);
            if key.visited.iter().any(|v| v == location) {
                trace!(location, "Already visited");
                continue;
            }

            let time = key.time + path.seconds_taken();
            let energy = key.energy + path.energy_taken();
            let mut visited = key.visited.clone();
            visited.push(location.to_string());

            if location == key.destination {
                trace!(?visited, destination = %key.destination, "Found path");
                return RouteCost { time, energy, visited };
            }

            reserve.push(WalkKey {
                origin: location.to_string(),
                destination: key.destination.clone(),
                visited,
                time,
                energy,
            });
        }

        let mut shortest = RouteCost::unreachable();
        for next in reserve {
            let cost = self.search(store, next, depth + 1);
            if cost.time < shortest.time {
                shortest = cost;
            }
        }
        shortest
    }
}

impl fmt::Debug for PathFinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathFinder")
            .field("cached", &self.cache.len())
            .field("max_depth", &self.max_depth)
            .field("revision", &self.revision)
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn urban(origin: &str, destination: &str, distance: i64) -> Path {
        Path::new(
            origin,
            destination,
            distance,
            Terrain::configured(TerrainKind::Urban, &TerrainConfig::default()),
        )
    }

    fn line_world() -> MemoryStore {
        let mut store = MemoryStore::new();
        for name in ["a", "b", "c", "z"] {
            store.create_location(Location::new(name)).expect("location");
        }
        store.create_path(urban("a", "b", 10)).expect("path");
        store.create_path(urban("c", "b", 10)).expect("path");
        store
    }

    #[test]
    fn path_costs_round_down() {
        let config = TerrainConfig::default();
        let river = Path::new("a", "b", 10, Terrain::configured(TerrainKind::River, &config));
        assert_eq!(river.seconds_taken(), 50);
        assert_eq!(river.energy_taken(), 5);

        let street = urban("a", "b", 19);
        assert_eq!(street.seconds_taken(), 13);
        assert_eq!(street.energy_taken(), 0);
    }

    #[test]
    fn reversed_rows_are_walked() {
        let store = line_world();
        let mut finder = PathFinder::new(&WalkConfig::default());
        let cost = finder.walk(&store, "a", "c").expect("walk");
        assert_eq!(cost.time, 14);
        assert_eq!(cost.visited, vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn equal_routes_keep_the_first_found() {
        let diamond = |rows: [(&str, &str); 4]| {
            let mut store = MemoryStore::new();
            for name in ["a", "b", "c", "d"] {
                store.create_location(Location::new(name)).expect("location");
            }
            for (origin, destination) in rows {
                store.create_path(urban(origin, destination, 10)).expect("path");
            }
            store
        };

        let store = diamond([("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")]);
        let cost = PathFinder::new(&WalkConfig::default())
            .walk(&store, "a", "d")
            .expect("walk");
        assert_eq!(cost.time, 14);
        assert_eq!(cost.visited, vec!["b".to_string(), "d".to_string()]);

        let store = diamond([("a", "c"), ("a", "b"), ("c", "d"), ("b", "d")]);
        let cost = PathFinder::new(&WalkConfig::default())
            .walk(&store, "a", "d")
            .expect("walk");
        assert_eq!(cost.time, 14);
        assert_eq!(cost.visited, vec!["c".to_string(), "d".to_string()]);
    }

    #[test]
    fn disconnected_is_sentinel() {
        let store = line_world();
        let mut finder = PathFinder::new(&WalkConfig::default());
        let cost = finder.walk(&store, "a", "z").expect("walk");
        assert_eq!(cost.time, UNREACHABLE_TIME);
        assert!(!cost.is_reachable());
    }

    #[test]
    fn unknown_location_is_error() {
        let store = line_world();
        let mut finder = PathFinder::new(&WalkConfig::default());
        assert!(matches!(
            finder.walk(&store, "a", "nowhere"),
            Err(GensimError::LocationNotFound(_))
        ));
    }

    #[test]
    fn same_location_is_free() {
        let store = line_world();
        let mut finder = PathFinder::new(&WalkConfig::default());
        let cost = finder.walk(&store, "b", "b").expect("walk");
        assert_eq!(cost.time, 0);
        assert!(cost.visited.is_empty());
    }

    #[test]
    fn repeated_walk_hits_cache() {
        let store = line_world();
        let mut finder = PathFinder::new(&WalkConfig::default());
        finder.walk(&store, "a", "c").expect("walk");
        let misses = finder.stats().misses;
        finder.walk(&store, "a", "c").expect("walk");
        assert_eq!(finder.stats().misses, misses);
        assert!(finder.stats().hits >= 1);
    }

    #[test]
    fn graph_change_invalidates_cache() {
        let mut store = line_world();
        let mut finder = PathFinder::new(&WalkConfig::default());
        assert!(!finder.walk(&store, "a", "z").expect("walk").is_reachable());

        store.create_path(urban("c", "z", 10)).expect("path");
        let cost = finder.walk(&store, "a", "z").expect("walk");
        assert_eq!(cost.time, 21);
    }

    #[test]
    fn depth_cap_stops_search() {
        let store = line_world();
        let mut finder = PathFinder::new(&WalkConfig {
            cache_capacity: 0,
            max_depth: 1,
        });
        assert!(!finder.walk(&store, "a", "c").expect("walk").is_reachable());
    }
}
