//! The observable application store.
//!
//! `StateStore` is the only owner of [`AppState`]. Every setter mutates in
//! place, then synchronously notifies the subscribers of one [`Topic`].
//! Subscribers get `&AppState` and cannot reach back into the store.

use crate::clock::Clock;
use crate::config::StoreConfig;
use crate::state::{
    AppState, CacheEntry, Group, GroupFilters, MetricsPatch, SortKey, UiError, View,
};
use chrono::Duration;
use persistence::{open, seal, shallow_merge, StorageBackend};
use pool_core::{KpiKey, KpiSet, Simulation, SimulationRecord};
use pool_econ::SimulationState;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

/// Slice of state a subscriber listens to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Topic {
    Simulation,
    Groups,
    Metrics,
    Ui,
    Filters,
    Kpis,
    Analysis,
}

impl Topic {
    pub const ALL: [Topic; 7] = [
        Topic::Simulation,
        Topic::Groups,
        Topic::Metrics,
        Topic::Ui,
        Topic::Filters,
        Topic::Kpis,
        Topic::Analysis,
    ];
}

pub type Callback = Box<dyn Fn(&AppState)>;

/// Handle returned by [`StateStore::subscribe`].
#[derive(Debug, PartialEq, Eq)]
#[must_use = "dropping the handle leaves no way to unsubscribe"]
pub struct Subscription {
    topic: Topic,
    id: u64,
}

/// What [`StateStore::cleanup`] removed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Cleanup {
    pub history_pruned: usize,
    pub cache_evicted: usize,
}

pub struct StateStore {
    state: AppState,
    config: StoreConfig,
    backend: Box<dyn StorageBackend>,
    clock: Box<dyn Clock>,
    listeners: HashMap<Topic, BTreeMap<u64, Callback>>,
    next_id: u64,
}

impl StateStore {
    /// Build the store and restore whatever the backend holds under the
    /// configured key. Anything unreadable falls back to defaults.
    pub fn init(
        config: StoreConfig,
        backend: Box<dyn StorageBackend>,
        clock: Box<dyn Clock>,
    ) -> Self {
        let state = restore(backend.as_ref(), &config.storage_key);
        Self {
            state,
            config,
            backend,
            clock,
            listeners: HashMap::new(),
            next_id: 0,
        }
    }

    /// Flush to the backend. Returns whether the write was accepted.
    pub fn teardown(&self) -> bool {
        info!(key = %self.config.storage_key, "flushing state");
        self.persist()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn history(&self) -> &[SimulationRecord] {
        &self.state.simulation.history
    }

    // ---- observers ----

    pub fn subscribe(
        &mut self,
        topic: Topic,
        callback: impl Fn(&AppState) + 'static,
    ) -> Subscription {
        let id = self.next_id;
        self.next_id += 1;
        self.listeners
            .entry(topic)
            .or_default()
            .insert(id, Box::new(callback));
        Subscription { topic, id }
    }

    /// Returns false if the subscription was already gone.
    pub fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        self.listeners
            .get_mut(&subscription.topic)
            .and_then(|m| m.remove(&subscription.id))
            .is_some()
    }

    /// Call the subscribers of `topic`, or of every topic when `None`.
    pub fn notify(&self, topic: Option<Topic>) {
        let topics: &[Topic] = match &topic {
            Some(t) => std::slice::from_ref(t),
            None => &Topic::ALL,
        };
        for t in topics {
            if let Some(callbacks) = self.listeners.get(t) {
                for cb in callbacks.values() {
                    cb(&self.state);
                }
            }
        }
    }

    // ---- simulation ----

    /// Make `sim` current and append it, timestamped, to the history.
    pub fn set_simulation(&mut self, sim: Simulation) {
        let record = SimulationRecord::stamp(sim.clone(), self.clock.now());
        self.state.simulation.current = Some(sim);
        self.state.simulation.history.push(record);
        self.notify(Some(Topic::Simulation));
    }

    /// Make a past record current again. History is left untouched.
    pub fn restore_from_history(&mut self, index: usize) -> bool {
        let Some(record) = self.state.simulation.history.get(index) else {
            return false;
        };
        self.state.simulation.current = Some(Simulation {
            input: record.input.clone(),
            output: record.output.clone(),
        });
        self.notify(Some(Topic::Simulation));
        true
    }

    /// Copy the current simulation into the saved list.
    pub fn save_current(&mut self) -> bool {
        let Some(current) = self.state.simulation.current.clone() else {
            return false;
        };
        self.state.simulation.saved.push(current);
        self.notify(Some(Topic::Simulation));
        true
    }

    pub fn export_history(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.state.simulation.history)
    }

    // ---- metrics, kpis, projection ----

    pub fn set_metrics(&mut self, patch: MetricsPatch) {
        self.state.metrics.merge(patch);
        self.notify(Some(Topic::Metrics));
    }

    pub fn set_kpis(&mut self, kpis: KpiSet) {
        self.state.kpis = kpis;
        self.notify(Some(Topic::Kpis));
    }

    pub fn update_kpi(&mut self, key: KpiKey, value: f64) -> Option<f64> {
        let trend = pool_econ::update_kpi(&mut self.state.kpis, key, value)?;
        self.notify(Some(Topic::Kpis));
        Some(trend)
    }

    pub fn set_projection(&mut self, projection: SimulationState) {
        self.state.projection = Some(projection);
        self.notify(Some(Topic::Analysis));
    }

    // ---- groups and filters ----

    pub fn set_groups(&mut self, groups: Vec<Group>) {
        self.state.groups.active = groups;
        self.apply_filters();
        self.notify(Some(Topic::Groups));
    }

    /// Select a group by id, or clear the selection. Unknown ids are refused.
    pub fn select_group(&mut self, id: Option<&str>) -> bool {
        if let Some(id) = id {
            if !self.state.groups.active.iter().any(|g| g.id == id) {
                return false;
            }
        }
        self.state.groups.selected = id.map(str::to_string);
        self.notify(Some(Topic::Groups));
        true
    }

    pub fn set_filters(&mut self, patch: GroupFilters) {
        self.state.ui.filters.merge(patch);
        self.apply_filters();
        self.notify(Some(Topic::Filters));
    }

    pub fn clear_filters(&mut self) {
        self.state.ui.filters = GroupFilters::default();
        self.apply_filters();
        self.notify(Some(Topic::Filters));
    }

    pub fn set_sort(&mut self, sort_by: Option<SortKey>) {
        self.state.ui.sort_by = sort_by;
        self.apply_filters();
        self.notify(Some(Topic::Filters));
    }

    fn apply_filters(&mut self) {
        let filters = &self.state.ui.filters;
        let mut filtered: Vec<Group> = self
            .state
            .groups
            .active
            .iter()
            .filter(|g| filters.matches(g))
            .cloned()
            .collect();
        if let Some(key) = self.state.ui.sort_by {
            key.sort(&mut filtered);
        }
        self.state.groups.filtered = filtered;
    }

    // ---- ui ----

    pub fn set_loading(&mut self, loading: bool) {
        self.state.ui.loading = loading;
        self.notify(Some(Topic::Ui));
    }

    pub fn set_error(&mut self, error: Option<UiError>) {
        self.state.ui.error = error;
        self.notify(Some(Topic::Ui));
    }

    pub fn set_view(&mut self, view: View) {
        self.state.ui.current_view = view;
        self.notify(Some(Topic::Ui));
    }

    // ---- cache ----

    pub fn set_cache_item(&mut self, key: impl Into<String>, value: Value, ttl_seconds: u64) {
        let now = self.clock.now();
        self.state.cache.entries.insert(
            key.into(),
            CacheEntry {
                value,
                timestamp: now,
                ttl_seconds,
            },
        );
        self.state.cache.last_update = Some(now);
    }

    pub fn set_cache_item_default(&mut self, key: impl Into<String>, value: Value) {
        let ttl = self.config.default_cache_ttl_secs;
        self.set_cache_item(key, value, ttl);
    }

    /// Live value for `key`; an expired entry is evicted and reads as `None`.
    pub fn get_cache_item(&mut self, key: &str) -> Option<Value> {
        let now = self.clock.now();
        let expired = self.state.cache.entries.get(key)?.is_expired(now);
        if expired {
            self.state.cache.entries.remove(key);
            debug!(key, "cache entry expired");
            return None;
        }
        self.state.cache.entries.get(key).map(|e| e.value.clone())
    }

    // ---- housekeeping ----

    /// Drop history older than the retention window and expired cache entries.
    pub fn cleanup(&mut self) -> Cleanup {
        let now = self.clock.now();
        let max_age = Duration::days(self.config.history_retention_days.clamp(0, 36_500));
        let before = self.state.simulation.history.len();
        self.state
            .simulation
            .history
            .retain(|r| now - r.timestamp < max_age);
        let history_pruned = before - self.state.simulation.history.len();

        let before = self.state.cache.entries.len();
        self.state.cache.entries.retain(|_, e| !e.is_expired(now));
        let cache_evicted = before - self.state.cache.entries.len();

        info!(history_pruned, cache_evicted, "state cleanup");
        Cleanup {
            history_pruned,
            cache_evicted,
        }
    }

    /// Back to defaults, KPI seeds included. Subscriptions survive.
    pub fn reset(&mut self) {
        self.state = AppState::default();
        self.notify(None);
    }

    // ---- persistence ----

    /// Snapshot the state into the backend. Failures are logged, not raised.
    pub fn persist(&self) -> bool {
        let payload = match serde_json::to_value(&self.state) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "state snapshot failed");
                return false;
            }
        };
        let blob = match seal(payload, self.clock.now()) {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "state snapshot failed");
                return false;
            }
        };
        let ok = self.backend.set(&self.config.storage_key, blob);
        if ok {
            debug!(key = %self.config.storage_key, "state persisted");
        } else {
            warn!(key = %self.config.storage_key, "storage backend rejected state");
        }
        ok
    }
}

fn restore(backend: &dyn StorageBackend, key: &str) -> AppState {
    let Some(blob) = backend.get(key) else {
        debug!(key, "no persisted state");
        return AppState::default();
    };
    let payload = match open(blob) {
        Ok(p) => p,
        Err(e) => {
            warn!(key, error = %e, "ignoring persisted state");
            return AppState::default();
        }
    };
    let defaults = match serde_json::to_value(AppState::default()) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "cannot serialize default state");
            return AppState::default();
        }
    };
    match serde_json::from_value::<AppState>(shallow_merge(defaults, payload)) {
        Ok(mut state) => {
            // KPIs are only ever reset, never dropped
            let reseeded = state.kpis.fill_missing();
            if reseeded > 0 {
                debug!(key, reseeded, "missing KPIs reseeded");
            }
            info!(key, "persisted state restored");
            state
        }
        Err(e) => {
            warn!(key, error = %e, "ignoring persisted state");
            AppState::default()
        }
    }
}
