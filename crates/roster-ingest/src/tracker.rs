//! Per-identifier lifecycle registry
//!
//! Every roll number moves through `Discovered -> Fetched -> Persisted`
//! exactly once. The tracker is the only place this state lives; tasks report
//! transitions through it and any out-of-order report comes back as a
//! [`LifecycleViolation`], which the pipeline treats as fatal.
//!
//! A single mutex guards the whole map. Transitions are rare next to the
//! network round-trips around them, so contention is not a concern.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, error};

use crate::error::LifecycleViolation;
use crate::models::Identifier;

/// Processing stage of one identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Seen on a listing page, detail not fetched yet
    Discovered,
    /// Detail fetch attempted and parsed
    Fetched,
    /// Store write attempted, terminal
    Persisted,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Discovered => "discovered",
            LifecycleState::Fetched => "fetched",
            LifecycleState::Persisted => "persisted",
        }
    }
}

/// Result of a successful `mark_persisted` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    /// Moved from `Fetched` to `Persisted`; the caller should write the record
    Transitioned,
    /// Already `Persisted`; the caller must skip the write
    AlreadyPersisted,
}

/// Number of identifiers at each stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StateCounts {
    pub discovered: usize,
    pub fetched: usize,
    pub persisted: usize,
}

impl StateCounts {
    pub fn total(&self) -> usize {
        self.discovered + self.fetched + self.persisted
    }
}

/// Concurrency-safe identifier -> stage registry
#[derive(Debug, Default)]
pub struct KeyTracker {
    states: Mutex<HashMap<Identifier, LifecycleState>>,
}

impl KeyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave the map half-updated:
    // every transition is a single insert.
    fn lock(&self) -> MutexGuard<'_, HashMap<Identifier, LifecycleState>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record `id` as discovered
    pub fn register(&self, id: &str) -> Result<(), LifecycleViolation> {
        let mut states = self.lock();
        if let Some(state) = states.get(id) {
            return Err(LifecycleViolation::DuplicateRegistration {
                id: id.to_string(),
                state: *state,
            });
        }
        states.insert(id.to_string(), LifecycleState::Discovered);
        debug!(roll = %id, "Discovered");
        Ok(())
    }

    /// Move `id` from `Discovered` to `Fetched`
    pub fn mark_fetched(&self, id: &str) -> Result<(), LifecycleViolation> {
        let mut states = self.lock();
        match states.get_mut(id) {
            None => Err(LifecycleViolation::NotRegistered { id: id.to_string() }),
            Some(state @ LifecycleState::Discovered) => {
                *state = LifecycleState::Fetched;
                debug!(roll = %id, "Fetched");
                Ok(())
            },
            Some(current) => Err(LifecycleViolation::IllegalTransition {
                id: id.to_string(),
                current: *current,
                attempted: LifecycleState::Fetched,
            }),
        }
    }

    /// Move `id` from `Fetched` to `Persisted`
    ///
    /// A repeat call on an already persisted identifier is not an error; it
    /// returns [`PersistOutcome::AlreadyPersisted`] so the write can be skipped.
    pub fn mark_persisted(&self, id: &str) -> Result<PersistOutcome, LifecycleViolation> {
        let mut states = self.lock();
        match states.get_mut(id) {
            None => Err(LifecycleViolation::NotRegistered { id: id.to_string() }),
            Some(state @ LifecycleState::Fetched) => {
                *state = LifecycleState::Persisted;
                debug!(roll = %id, "Persisted");
                Ok(PersistOutcome::Transitioned)
            },
            Some(LifecycleState::Persisted) => Ok(PersistOutcome::AlreadyPersisted),
            Some(current @ LifecycleState::Discovered) => Err(LifecycleViolation::IllegalTransition {
                id: id.to_string(),
                current: *current,
                attempted: LifecycleState::Persisted,
            }),
        }
    }

    pub fn state(&self, id: &str) -> Option<LifecycleState> {
        self.lock().get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn counts(&self) -> StateCounts {
        self.lock()
            .values()
            .fold(StateCounts::default(), |mut counts, state| {
                match state {
                    LifecycleState::Discovered => counts.discovered += 1,
                    LifecycleState::Fetched => counts.fetched += 1,
                    LifecycleState::Persisted => counts.persisted += 1,
                }
                counts
            })
    }

    /// Point-in-time copy of every identifier and its stage, sorted by identifier
    pub fn snapshot(&self) -> Vec<(Identifier, LifecycleState)> {
        let mut entries: Vec<_> = self
            .lock()
            .iter()
            .map(|(id, state)| (id.clone(), *state))
            .collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Log the full snapshot, used right before a fatal error is surfaced
    pub fn dump(&self) {
        let snapshot = self.snapshot();
        error!(entries = snapshot.len(), counts = ?self.counts(), "Tracker state dump");
        for (id, state) in snapshot {
            error!(roll = %id, state = state.as_str(), "Tracker entry");
        }
    }
}
