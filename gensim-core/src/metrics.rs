//! Runtime counters and tick timing.
//!
//! Counters are plain `AtomicU64`s bumped by the orchestrator and read on
//! export. The tick monitor keeps a ring of recent trigger-pass durations
//! behind a `parking_lot::Mutex`; it is only locked once per pass.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

use crate::walk::CacheStats;

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

/// Monotonic counters for the simulation loop.
#[derive(Debug)]
pub struct SimCounters {
    /// Events whose effects were committed.
    pub events_completed: AtomicU64,
    /// Individual effect commits.
    pub effects_committed: AtomicU64,
    /// One-shot events deleted after completion.
    pub events_pruned: AtomicU64,
    /// Notices inserted into the calendar.
    pub notices_scheduled: AtomicU64,
    /// Walk calls answered from the memo cache.
    pub walk_cache_hits: AtomicU64,
    /// Walk calls that searched.
    pub walk_cache_misses: AtomicU64,
}

impl SimCounters {
    /// Zeroed counters.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            events_completed: AtomicU64::new(0),
            effects_committed: AtomicU64::new(0),
            events_pruned: AtomicU64::new(0),
            notices_scheduled: AtomicU64::new(0),
            walk_cache_hits: AtomicU64::new(0),
            walk_cache_misses: AtomicU64::new(0),
        }
    }

    /// Add `n` to a counter.
    pub fn bump(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Mirror the path finder's cumulative cache counts.
    pub fn record_walk_cache(&self, stats: CacheStats) {
        self.walk_cache_hits.store(stats.hits, Ordering::Relaxed);
        self.walk_cache_misses.store(stats.misses, Ordering::Relaxed);
    }

    /// Read every counter.
    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            events_completed: self.events_completed.load(Ordering::Relaxed),
            effects_committed: self.effects_committed.load(Ordering::Relaxed),
            events_pruned: self.events_pruned.load(Ordering::Relaxed),
            notices_scheduled: self.notices_scheduled.load(Ordering::Relaxed),
            walk_cache_hits: self.walk_cache_hits.load(Ordering::Relaxed),
            walk_cache_misses: self.walk_cache_misses.load(Ordering::Relaxed),
        }
    }
}

impl Default for SimCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Counter values at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// Events completed.
    pub events_completed: u64,
    /// Effects committed.
    pub effects_committed: u64,
    /// Events pruned.
    pub events_pruned: u64,
    /// Notices scheduled.
    pub notices_scheduled: u64,
    /// Walk cache hits.
    pub walk_cache_hits: u64,
    /// Walk cache misses.
    pub walk_cache_misses: u64,
}

impl CounterSnapshot {
    /// Prometheus text exposition.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        let rows = [
            ("gensim_events_completed_total", "Events completed", self.events_completed),
            ("gensim_effects_committed_total", "Effects committed", self.effects_committed),
            ("gensim_events_pruned_total", "One-shot events pruned", self.events_pruned),
            ("gensim_notices_scheduled_total", "Calendar notices scheduled", self.notices_scheduled),
        ];
        let mut out = String::new();
        for (name, help, value) in rows {
            out.push_str(&format!(
                "# HELP {name} {help}\n# TYPE {name} counter\n{name} {value}\n"
            ));
        }
        out.push_str(&format!(
            "# HELP gensim_walk_cache_total Walk memo lookups\n\
             # TYPE gensim_walk_cache_total counter\n\
             gensim_walk_cache_total{{result=\"hit\"}} {}\n\
             gensim_walk_cache_total{{result=\"miss\"}} {}\n",
            self.walk_cache_hits, self.walk_cache_misses,
        ));
        out
    }
}

// ---------------------------------------------------------------------------
// Tick budget
// ---------------------------------------------------------------------------

const TICK_HISTORY: usize = 128;

/// Times trigger passes against a budget.
#[derive(Debug)]
pub struct TickBudgetMonitor {
    budget_ms: f64,
    history: Mutex<TickHistory>,
}

#[derive(Debug)]
struct TickHistory {
    timings: Vec<f64>,
    next: usize,
    count: u64,
    last_over_budget: bool,
}

impl TickHistory {
    fn recorded(&self) -> &[f64] {
        let n = usize::try_from(self.count).unwrap_or(usize::MAX).min(self.timings.len());
        &self.timings[..n]
    }
}

impl TickBudgetMonitor {
    /// A monitor flagging passes slower than `budget_ms`.
    #[must_use]
    pub fn new(budget_ms: f64) -> Self {
        Self {
            budget_ms,
            history: Mutex::new(TickHistory {
                timings: vec![0.0; TICK_HISTORY],
                next: 0,
                count: 0,
                last_over_budget: false,
            }),
        }
    }

    /// Start timing a pass; the duration is recorded when the guard drops.
    pub fn begin_tick(&self) -> TickGuard<'_> {
        TickGuard {
            monitor: self,
            start: Instant::now(),
        }
    }

    /// Record a pass duration in milliseconds.
    pub fn record(&self, ms: f64) {
        let mut h = self.history.lock();
        let slot = h.next;
        h.timings[slot] = ms;
        h.next = (slot + 1) % TICK_HISTORY;
        h.count += 1;
        h.last_over_budget = ms > self.budget_ms;
        if h.last_over_budget {
            tracing::warn!(ms, budget_ms = self.budget_ms, "Trigger pass over budget");
        }
    }

    /// Whether the most recent pass exceeded the budget.
    #[must_use]
    pub fn is_over_budget(&self) -> bool {
        self.history.lock().last_over_budget
    }

    /// Passes recorded since creation.
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.history.lock().count
    }

    /// Configured budget in milliseconds.
    #[must_use]
    pub fn budget_ms(&self) -> f64 {
        self.budget_ms
    }

    /// Median, p95 and max over the retained history.
    #[must_use]
    pub fn percentiles(&self) -> TickPercentiles {
        let h = self.history.lock();
        let mut sorted = h.recorded().to_vec();
        if sorted.is_empty() {
            return TickPercentiles::default();
        }
        sorted.sort_by(f64::total_cmp);
        let at = |q: f64| {
            let idx = ((sorted.len() - 1) as f64 * q).round() as usize;
            sorted[idx]
        };
        let over = sorted.iter().filter(|&&t| t > self.budget_ms).count();
        TickPercentiles {
            p50: at(0.5),
            p95: at(0.95),
            max: sorted[sorted.len() - 1],
            over_budget_ratio: over as f64 / sorted.len() as f64,
        }
    }
}

/// Records the elapsed time of a trigger pass on drop.
pub struct TickGuard<'a> {
    monitor: &'a TickBudgetMonitor,
    start: Instant,
}

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.monitor.record(self.start.elapsed().as_secs_f64() * 1000.0);
    }
}

/// Summary of recent pass durations, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TickPercentiles {
    /// Median.
    pub p50: f64,
    /// 95th percentile.
    pub p95: f64,
    /// Slowest retained pass.
    pub max: f64,
    /// Share of retained passes over budget.
    pub over_budget_ratio: f64,
}

// ---------------------------------------------------------------------------
// Span names
// ---------------------------------------------------------------------------

/// Names for `tracing` spans opened by the kernel.
pub mod spans {
    /// One orchestrator trigger pass.
    pub const TRIGGER: &str = "gensim::trigger";
    /// Rebuilding the day's calendar.
    pub const RESCHEDULE: &str = "gensim::calendar::reschedule";
    /// A route search.
    pub const WALK: &str = "gensim::walk";
    /// Writing a save slot.
    pub const PERSIST_SAVE: &str = "gensim::persist::save";
    /// Reading a save slot.
    pub const PERSIST_LOAD: &str = "gensim::persist::load";
}
