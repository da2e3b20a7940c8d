//! Single authoritative state store for the console.
//!
//! The store is constructed once at process start and injected
//! (`Arc<StateStore>`) into whichever components need it. It is the only
//! writer of instrument, test-run, and results state; every mutation is
//! applied under one lock and therefore atomic with respect to readers.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use shared::domain::{
    ConnectionState, Instrument, InstrumentConfig, InstrumentUpdate, StepReport,
};

/// History keeps the most recent runs only, newest first.
const TEST_HISTORY_CAP: usize = 50;

/// A step outcome as stored client-side: the backend report plus the
/// client-assigned identity stamped at insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct TestResult {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub step_name: String,
    pub step_number: Option<u32>,
    pub start_time: String,
    pub passed: bool,
    pub measurements: BTreeMap<String, f64>,
    pub error: Option<String>,
    pub duration: f64,
}

impl TestResult {
    fn from_report(report: StepReport) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            step_name: report.step_name,
            step_number: report.step_number,
            start_time: report.start_time,
            passed: report.passed,
            measurements: report.measurements,
            error: report.error,
            duration: report.duration,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestRun {
    pub running: bool,
    pub current_test_id: Option<String>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestStatistics {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub pass_rate: f64,
}

impl TestStatistics {
    fn over(results: &[TestResult]) -> Self {
        let total = results.len();
        let passed = results.iter().filter(|r| r.passed).count();
        let failed = total - passed;
        let pass_rate = if total > 0 {
            passed as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        Self {
            total,
            passed,
            failed,
            pass_rate,
        }
    }
}

/// Summary of a finished run, kept in the bounded history ring.
#[derive(Debug, Clone, PartialEq)]
pub struct TestHistoryEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub test_id: Option<String>,
    pub statistics: TestStatistics,
}

impl TestHistoryEntry {
    pub fn finished(test_id: Option<String>, statistics: TestStatistics) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            test_id,
            statistics,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppState {
    pub instruments: BTreeMap<String, Instrument>,
    pub test_results: Vec<TestResult>,
    pub test_run: TestRun,
    pub test_history: VecDeque<TestHistoryEntry>,
    pub connection: ConnectionState,
    pub last_update: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Observer {
    id: SubscriptionId,
    notify: Box<dyn FnMut(&AppState) + Send>,
}

struct Inner {
    state: AppState,
    observers: Vec<Observer>,
    next_observer: u64,
}

pub struct StateStore {
    inner: Mutex<Inner>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: AppState::default(),
                observers: Vec::new(),
                next_observer: 0,
            }),
        }
    }

    fn mutate(&self, apply: impl FnOnce(&mut AppState)) {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Inner {
            state, observers, ..
        } = &mut *inner;
        apply(state);
        for observer in observers.iter_mut() {
            (observer.notify)(state);
        }
    }

    /// Run a closure against the current state. The state passed in is
    /// never partially mutated: every mutation completes before any read.
    pub fn read<R>(&self, f: impl FnOnce(&AppState) -> R) -> R {
        let inner = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&inner.state)
    }

    pub fn snapshot(&self) -> AppState {
        self.read(Clone::clone)
    }

    /// Register an observer over a slice of state. The callback fires only
    /// when the selected value differs from the previously selected value,
    /// not on every mutation. Callbacks run synchronously inside the
    /// mutation and must not call back into the store.
    pub fn subscribe<T, S, F>(&self, selector: S, mut callback: F) -> SubscriptionId
    where
        T: PartialEq + Send + 'static,
        S: Fn(&AppState) -> T + Send + 'static,
        F: FnMut(&T) + Send + 'static,
    {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let id = SubscriptionId(inner.next_observer);
        inner.next_observer += 1;
        let mut previous = selector(&inner.state);
        inner.observers.push(Observer {
            id,
            notify: Box::new(move |state| {
                let selected = selector(state);
                if selected != previous {
                    callback(&selected);
                    previous = selected;
                }
            }),
        });
        id
    }

    /// Cancel a subscription. Returns false when the handle was already
    /// cancelled.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let before = inner.observers.len();
        inner.observers.retain(|observer| observer.id != id);
        inner.observers.len() != before
    }

    /// Merge a status push into the named instrument, creating the entry
    /// when the backend reports a name the console has not seen.
    pub fn update_instrument(&self, name: &str, update: InstrumentUpdate) {
        self.mutate(|state| {
            state
                .instruments
                .entry(name.to_string())
                .or_insert_with(|| Instrument::offline(name))
                .apply(update);
            state.last_update = Some(Utc::now());
        });
    }

    /// Explicit add action: registers the instrument as disconnected with
    /// the given config until the backend reports otherwise.
    pub fn add_instrument(&self, name: &str, config: InstrumentConfig) {
        self.mutate(|state| {
            state
                .instruments
                .insert(name.to_string(), Instrument::with_config(name, config));
            state.last_update = Some(Utc::now());
        });
    }

    pub fn remove_instrument(&self, name: &str) -> bool {
        let mut removed = false;
        self.mutate(|state| {
            removed = state.instruments.remove(name).is_some();
            if removed {
                state.last_update = Some(Utc::now());
            }
        });
        removed
    }

    /// Flip the run flag. Starting a run clears the active results and any
    /// stale error; stopping leaves results in place for inspection.
    pub fn set_test_running(&self, running: bool, test_id: Option<String>) {
        self.mutate(|state| {
            state.test_run.running = running;
            state.test_run.current_test_id = test_id;
            if running {
                state.test_results.clear();
                state.test_run.last_error = None;
            }
        });
    }

    /// Terminal failure of the active run, recorded as one atomic mutation.
    pub fn fail_test_run(&self, error: String) {
        self.mutate(|state| {
            state.test_run.running = false;
            state.test_run.current_test_id = None;
            state.test_run.last_error = Some(error);
        });
    }

    /// Append a step outcome, stamping the client-assigned id and
    /// timestamp at insertion.
    pub fn add_test_result(&self, report: StepReport) {
        self.mutate(|state| {
            state.test_results.push(TestResult::from_report(report));
        });
    }

    pub fn clear_test_results(&self) {
        self.mutate(|state| state.test_results.clear());
    }

    pub fn save_test_to_history(&self, entry: TestHistoryEntry) {
        self.mutate(|state| {
            state.test_history.push_front(entry);
            state.test_history.truncate(TEST_HISTORY_CAP);
        });
    }

    pub fn set_connection_status(&self, connection: ConnectionState) {
        self.mutate(|state| {
            state.connection = connection;
            state.last_update = Some(Utc::now());
        });
    }

    pub fn instrument(&self, name: &str) -> Option<Instrument> {
        self.read(|state| state.instruments.get(name).cloned())
    }

    pub fn connected_instruments(&self) -> Vec<Instrument> {
        self.read(|state| {
            state
                .instruments
                .values()
                .filter(|instrument| instrument.connected)
                .cloned()
                .collect()
        })
    }

    /// Derived on demand from the results list, never stored, so the
    /// counts cannot drift from the results themselves.
    pub fn test_statistics(&self) -> TestStatistics {
        self.read(|state| TestStatistics::over(&state.test_results))
    }
}
