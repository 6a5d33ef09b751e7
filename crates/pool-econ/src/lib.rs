#![deny(warnings)]

//! Simulation engine for consórcio pools.
//!
//! This crate derives everything downstream consumers see from a validated
//! [`pool_core::PoolConfig`]:
//! - Month-by-month cash flow with bid tranches and idle-capital yield
//! - The entry / execution / exit timeline with its events
//! - Headline metrics through swappable [`MetricModel`] strategies
//! - KPI trend tracking against the previous values

pub mod cashflow;
pub mod engine;
pub mod metrics;
pub mod timeline;
pub mod trend;

pub use cashflow::{generate_cash_flow, tranche_schedule};
pub use engine::{build_state, quote, EngineError, PoolParams, SimulationState};
pub use metrics::{
    compute_metrics, pc_ratio, yield_coverage, DegenerateConfigError, Efficiency, Exposure,
    MetricModel, MetricModelKind, MetricsSnapshot, ProjectedModel, ReferenceModel, YieldCoverage,
};
pub use timeline::derive_timeline;
pub use trend::{apply_snapshot, trend, update_kpi};
