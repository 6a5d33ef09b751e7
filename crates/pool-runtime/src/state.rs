//! Application state owned by the [`StateStore`](crate::StateStore).
//!
//! Every section defaults, so a persisted blob missing a section still
//! deserializes.

use chrono::{DateTime, Utc};
use pool_core::rules::ValidationReport;
use pool_core::{GroupProfile, KpiSet, Simulation, SimulationRecord};
use pool_econ::{Efficiency, Exposure, MetricsSnapshot, SimulationState};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppState {
    pub simulation: SimulationSlot,
    pub groups: GroupsState,
    pub ui: UiState,
    pub metrics: MetricsState,
    pub kpis: KpiSet,
    /// Latest accepted projection.
    pub projection: Option<SimulationState>,
    pub cache: CacheState,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSlot {
    pub current: Option<Simulation>,
    /// Append-only.
    pub history: Vec<SimulationRecord>,
    pub saved: Vec<Simulation>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    Forming,
    Active,
    Closed,
}

/// A consórcio group as listed to the user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,
    pub administrator: String,
    pub status: GroupStatus,
    pub credit_value: Decimal,
    pub term_months: u32,
    pub profile: GroupProfile,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupsState {
    pub active: Vec<Group>,
    pub filtered: Vec<Group>,
    /// Id of the selected group.
    pub selected: Option<String>,
}

/// Group filters. `None` matches everything.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupFilters {
    pub administrator: Option<String>,
    pub status: Option<GroupStatus>,
    pub term_months: Option<u32>,
    pub min_credit: Option<Decimal>,
    pub max_credit: Option<Decimal>,
}

impl GroupFilters {
    /// Overlay the filters set in `patch`; unset ones are kept.
    pub fn merge(&mut self, patch: GroupFilters) {
        if patch.administrator.is_some() {
            self.administrator = patch.administrator;
        }
        if patch.status.is_some() {
            self.status = patch.status;
        }
        if patch.term_months.is_some() {
            self.term_months = patch.term_months;
        }
        if patch.min_credit.is_some() {
            self.min_credit = patch.min_credit;
        }
        if patch.max_credit.is_some() {
            self.max_credit = patch.max_credit;
        }
    }

    pub fn matches(&self, group: &Group) -> bool {
        self.administrator
            .as_ref()
            .map_or(true, |a| *a == group.administrator)
            && self.status.map_or(true, |s| s == group.status)
            && self.term_months.map_or(true, |t| t == group.term_months)
            && self.min_credit.map_or(true, |m| group.credit_value >= m)
            && self.max_credit.map_or(true, |m| group.credit_value <= m)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    Credit,
    Term,
    Participants,
}

impl SortKey {
    pub fn sort(self, groups: &mut [Group]) {
        match self {
            SortKey::Credit => groups.sort_by(|a, b| a.credit_value.cmp(&b.credit_value)),
            SortKey::Term => groups.sort_by_key(|g| g.term_months),
            SortKey::Participants => groups.sort_by_key(|g| g.profile.participants),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    #[default]
    Dashboard,
    Simulator,
    Groups,
    Analysis,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

/// Error shown to the user. Validation failures carry the full report.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UiError {
    pub message: String,
    pub report: Option<ValidationReport>,
}

impl UiError {
    pub fn notice(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            report: None,
        }
    }

    pub fn validation(report: ValidationReport) -> Self {
        Self {
            message: "Please correct the highlighted fields".to_string(),
            report: Some(report),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiState {
    pub current_view: View,
    pub loading: bool,
    pub error: Option<UiError>,
    pub filters: GroupFilters,
    pub sort_by: Option<SortKey>,
    pub theme: Theme,
}

/// Latest headline metrics; `None` until a simulation has run.
///
/// Also used as a patch for [`StateStore::set_metrics`](crate::StateStore::set_metrics):
/// fields left `None` keep their current value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsState {
    pub pc_ratio: Option<f64>,
    pub roe: Option<f64>,
    pub exposure: Option<Exposure>,
    pub efficiency: Option<Efficiency>,
}

pub type MetricsPatch = MetricsState;

impl MetricsState {
    pub fn merge(&mut self, patch: MetricsPatch) {
        if patch.pc_ratio.is_some() {
            self.pc_ratio = patch.pc_ratio;
        }
        if patch.roe.is_some() {
            self.roe = patch.roe;
        }
        if patch.exposure.is_some() {
            self.exposure = patch.exposure;
        }
        if patch.efficiency.is_some() {
            self.efficiency = patch.efficiency;
        }
    }
}

impl From<&MetricsSnapshot> for MetricsState {
    fn from(m: &MetricsSnapshot) -> Self {
        Self {
            pc_ratio: Some(m.pc_ratio),
            roe: Some(m.roe),
            exposure: Some(m.exposure.clone()),
            efficiency: Some(m.efficiency.clone()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub value: Value,
    pub timestamp: DateTime<Utc>,
    pub ttl_seconds: u64,
}

impl CacheEntry {
    /// Expired once strictly more than `ttl_seconds` have passed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let age_ms = (now - self.timestamp).num_milliseconds();
        let ttl_ms = i64::try_from(self.ttl_seconds.saturating_mul(1000)).unwrap_or(i64::MAX);
        age_ms > ttl_ms
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheState {
    pub last_update: Option<DateTime<Utc>>,
    pub entries: BTreeMap<String, CacheEntry>,
}
