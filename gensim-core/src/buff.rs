//! Buffs: conditional multipliers on an effect's change.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::requirement::{self, Requirement};
use crate::store::EntityStore;

/// A multiplier applied to an effect's delta while its requirements hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Buff {
    /// Factor the delta is multiplied by.
    pub modifier: f64,
    /// Conditions gating the buff, commonly a relationship strength.
    pub requirements: Vec<Requirement>,
}

impl Buff {
    /// A buff with no requirements (always available).
    #[must_use]
    pub fn new(modifier: f64) -> Self {
        Self {
            modifier,
            requirements: Vec::new(),
        }
    }

    /// Add a gating requirement.
    #[must_use]
    pub fn requiring(mut self, requirement: Requirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    /// Whether all of the buff's requirements are fulfilled.
    ///
    /// # Errors
    /// Propagates requirement evaluation failures.
    pub fn available<S: EntityStore + ?Sized>(&self, store: &S) -> Result<bool> {
        requirement::all_fulfilled(&self.requirements, store)
    }
}
