// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Shared snapshot of the latest known controller state.
//!
//! The ingestion loop is the only writer; every scrape reads through [`StateStore::snapshot`].
//! A single mutex guards everything so a reader never sees half of an update. The lock is held
//! only for map updates and copies: no I/O, parsing or logging happens under it.

use crate::errors::{FailureCategory, StoreError};
use crate::reading::{BlowerReading, PidState, ProbeKind, ProbeReading};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

/// How the store is fed. Only polling keeps attempt counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestionMode {
    /// Readings merge into the maps one record at a time and are never expired
    Streaming,
    /// Each successful fetch replaces the maps wholesale
    Polling,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeState {
    pub id: String,
    pub kind: ProbeKind,
    pub temperature: f64,
    pub name: Option<String>,
    pub blower: Option<String>,
    pub target: Option<f64>,
    pub pid: Option<PidState>,
    pub collection_count: u64,
    /// Seconds since the UNIX epoch
    pub last_updated: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlowerState {
    pub id: String,
    pub name: Option<String>,
    pub on: bool,
}

/// Polling attempt counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttemptCounters {
    pub total: u64,
    pub failed: u64,
}

/// Point-in-time copy of the store, safe to use without further locking.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub probes: Vec<ProbeState>,
    pub blowers: Vec<BlowerState>,
    pub failures: BTreeMap<FailureCategory, u64>,
    /// Present only in polling mode
    pub attempts: Option<AttemptCounters>,
}

impl Snapshot {
    pub fn probe(&self, id: &str) -> Option<&ProbeState> {
        self.probes.iter().find(|p| p.id == id)
    }

    pub fn failures(&self, category: FailureCategory) -> u64 {
        self.failures.get(&category).copied().unwrap_or_default()
    }
}

#[derive(Debug, Default)]
struct State {
    probes: HashMap<String, ProbeState>,
    blowers: HashMap<String, BlowerState>,
    /// Survives wholesale replacement so per-probe counts never go backwards
    collections: HashMap<String, u64>,
    /// Last kind seen per id, survives wholesale replacement
    kinds: HashMap<String, ProbeKind>,
    failures: BTreeMap<FailureCategory, u64>,
    attempts: AttemptCounters,
}

impl State {
    /// Records `reading.kind` for its id. A change from the previously seen kind is counted and
    /// returned, but never blocks the reading.
    fn track_kind(&mut self, reading: &ProbeReading) -> Option<StoreError> {
        let previous = self.kinds.insert(reading.id.clone(), reading.kind)?;
        if previous == reading.kind {
            return None;
        }
        let change = StoreError::KindMismatch {
            id: reading.id.clone(),
            existing: previous,
            incoming: reading.kind,
        };
        self.bump_failure(change.category());
        Some(change)
    }

    fn bump_collection(&mut self, id: &str) -> u64 {
        let count = self.collections.entry(id.to_string()).or_default();
        *count += 1;
        *count
    }

    fn bump_failure(&mut self, category: FailureCategory) {
        *self.failures.entry(category).or_default() += 1;
    }

    fn probe_state(reading: ProbeReading, collection_count: u64, now: f64) -> ProbeState {
        ProbeState {
            id: reading.id,
            kind: reading.kind,
            temperature: reading.temperature,
            name: reading.name,
            blower: reading.blower,
            target: reading.target,
            pid: reading.pid,
            collection_count,
            last_updated: now,
        }
    }
}

/// Outcome of [`StateStore::record_reading`].
#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    pub collection_count: u64,
    /// Set when the reading switched the probe to a different kind
    pub kind_change: Option<StoreError>,
}

/// Lock-guarded latest-value-per-entity store with monotonic counters.
#[derive(Debug)]
pub struct StateStore {
    mode: IngestionMode,
    state: Mutex<State>,
}

impl StateStore {
    pub fn new(mode: IngestionMode) -> Self {
        Self {
            mode,
            state: Mutex::new(State::default()),
        }
    }

    pub fn mode(&self) -> IngestionMode {
        self.mode
    }

    // Mutations below only start after every fallible check, so a poisoned lock still guards
    // consistent state.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies one successfully parsed reading, creating the probe on first sight.
    ///
    /// The device decides a probe's kind. A reading whose kind differs from the last one seen
    /// for its id still replaces the probe; the change is counted under
    /// [`FailureCategory::KindMismatch`] and reported in [`Recorded::kind_change`].
    pub fn record_reading(&self, reading: ProbeReading) -> Recorded {
        let now = unix_now();
        let mut state = self.lock();
        let kind_change = state.track_kind(&reading);
        let collection_count = state.bump_collection(&reading.id);
        let id = reading.id.clone();
        state
            .probes
            .insert(id, State::probe_state(reading, collection_count, now));
        Recorded {
            collection_count,
            kind_change,
        }
    }

    pub fn record_failure(&self, category: FailureCategory) {
        self.lock().bump_failure(category);
    }

    /// Counts one polling attempt, successful or not.
    pub fn record_attempt(&self) {
        self.lock().attempts.total += 1;
    }

    /// Counts a failed polling attempt. The entity maps are left as they were.
    pub fn record_failed_attempt(&self, category: FailureCategory) {
        let mut state = self.lock();
        state.attempts.failed += 1;
        state.bump_failure(category);
    }

    /// Swaps in a complete polled state. Entities missing from `sensors`/`blowers` disappear.
    ///
    /// Every sensor is applied. Sensors whose kind changed since the last time their id was seen
    /// are counted under [`FailureCategory::KindMismatch`] and returned.
    pub fn replace_all(
        &self,
        sensors: Vec<ProbeReading>,
        blowers: Vec<BlowerReading>,
    ) -> Vec<StoreError> {
        let now = unix_now();
        let blowers: HashMap<String, BlowerState> = blowers
            .into_iter()
            .map(|b| {
                (
                    b.id.clone(),
                    BlowerState {
                        id: b.id,
                        name: b.name,
                        on: b.on,
                    },
                )
            })
            .collect();

        let mut kind_changes = Vec::new();
        let mut state = self.lock();
        let mut probes = HashMap::with_capacity(sensors.len());
        for reading in sensors {
            kind_changes.extend(state.track_kind(&reading));
            let count = state.bump_collection(&reading.id);
            probes.insert(reading.id.clone(), State::probe_state(reading, count, now));
        }
        state.probes = probes;
        state.blowers = blowers;
        kind_changes
    }

    pub fn snapshot(&self) -> Snapshot {
        let state = self.lock();
        Snapshot {
            probes: state.probes.values().cloned().collect(),
            blowers: state.blowers.values().cloned().collect(),
            failures: state.failures.clone(),
            attempts: match self.mode {
                IngestionMode::Polling => Some(state.attempts),
                IngestionMode::Streaming => None,
            },
        }
    }
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}
