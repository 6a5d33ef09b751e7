#![deny(warnings)]

//! Application runtime: the observable state store, its persistence and
//! auto-save, and the pipeline that turns a simulation request into stored
//! results.

pub mod autosave;
pub mod clock;
pub mod config;
pub mod pipeline;
pub mod state;
pub mod store;

pub use autosave::spawn_autosave;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AppConfig, AppConfigError, StoreConfig};
pub use pipeline::{Pipeline, SubmitError, Submission, ENGINE_FAILURE_NOTICE};
pub use state::{
    AppState, CacheEntry, Group, GroupFilters, GroupStatus, MetricsPatch, MetricsState, SortKey,
    Theme, UiError, UiState, View,
};
pub use store::{Callback, Cleanup, StateStore, Subscription, Topic};
