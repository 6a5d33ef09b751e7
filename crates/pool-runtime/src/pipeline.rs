//! Submission pipeline: request in, validated projection stored.

use crate::config::AppConfig;
use crate::state::{MetricsState, UiError};
use crate::store::StateStore;
use pool_core::rules::{
    validate_fields, validate_simulation_input, BusinessFacts, ValidationReport, ValidationRules,
};
use pool_core::{GroupProfile, Simulation, SimulationInput};
use pool_econ::{
    apply_snapshot, build_state, quote, EngineError, MetricModel, PoolParams, SimulationState,
};
use thiserror::Error;
use tracing::{debug, error, info};

/// Shown to the user when the engine fails on input that passed field validation.
pub const ENGINE_FAILURE_NOTICE: &str =
    "The simulation could not be computed for these parameters. Please review them and try again.";

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("simulation input rejected: {0}")]
    Validation(ValidationReport),
    #[error("simulation could not be computed")]
    Engine(#[source] EngineError),
}

/// An accepted submission.
#[derive(Clone, Debug, PartialEq)]
pub struct Submission {
    pub simulation: Simulation,
    pub projection: SimulationState,
    /// The projection came from the cache.
    pub cached: bool,
}

pub struct Pipeline {
    rules: ValidationRules,
    params: PoolParams,
    model: Box<dyn MetricModel>,
}

impl Pipeline {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_model(config.validation.clone(), config.pool.clone(), config.model.model())
    }

    pub fn with_model(
        rules: ValidationRules,
        params: PoolParams,
        model: Box<dyn MetricModel>,
    ) -> Self {
        Self {
            rules,
            params,
            model,
        }
    }

    pub fn rules(&self) -> &ValidationRules {
        &self.rules
    }

    /// Validate, project and record one simulation request.
    ///
    /// Field rules run first and the engine only sees input that passes
    /// them. Business rules run against the projection. The store is only
    /// touched for the UI flags unless the request is accepted; then the
    /// projection is cached, KPIs, metrics and history are updated and the
    /// state is persisted.
    pub fn submit(
        &self,
        store: &mut StateStore,
        input: &SimulationInput,
        group: &GroupProfile,
    ) -> Result<Submission, SubmitError> {
        store.set_loading(true);
        let result = self.run(store, input, group);
        store.set_loading(false);
        result
    }

    fn run(
        &self,
        store: &mut StateStore,
        input: &SimulationInput,
        group: &GroupProfile,
    ) -> Result<Submission, SubmitError> {
        let field_errors = validate_fields(input, &self.rules);
        if !field_errors.is_empty() {
            return Err(reject(store, ValidationReport::from_errors(field_errors)));
        }

        let key = cache_key(input);
        let cached = store
            .get_cache_item(&key)
            .and_then(|v| serde_json::from_value::<SimulationState>(v).ok());
        let hit = cached.is_some();
        let projection = match cached {
            Some(p) => {
                debug!(%key, "projection cache hit");
                p
            }
            None => match self.project(input) {
                Ok(p) => p,
                Err(e) => {
                    error!(error = %e, ?input, "simulation engine failed");
                    store.set_error(Some(UiError::notice(ENGINE_FAILURE_NOTICE)));
                    return Err(SubmitError::Engine(e));
                }
            },
        };

        let facts = BusinessFacts {
            monthly_installment: projection.config.total_monthly_installment,
            net_credit: projection.config.net_credit(),
            exposure: projection.metrics.exposure.current,
            group: group.clone(),
        };
        let report = validate_simulation_input(input, &facts, &self.rules);
        if !report.is_valid {
            return Err(reject(store, report));
        }

        if !hit {
            match serde_json::to_value(&projection) {
                Ok(v) => store.set_cache_item_default(key, v),
                Err(e) => debug!(error = %e, "projection not cached"),
            }
        }
        store.set_error(None);
        let mut kpis = store.state().kpis.clone();
        apply_snapshot(&mut kpis, &projection.metrics);
        store.set_kpis(kpis);
        store.set_projection(projection.clone());
        store.set_metrics(MetricsState::from(&projection.metrics));
        let simulation = Simulation {
            input: input.clone(),
            output: quote(input),
        };
        store.set_simulation(simulation.clone());
        store.persist();
        info!(
            credit = %input.credit_value,
            term = input.term_months,
            pc_ratio = projection.metrics.pc_ratio,
            cached = hit,
            "simulation accepted"
        );
        Ok(Submission {
            simulation,
            projection,
            cached: hit,
        })
    }

    fn project(&self, input: &SimulationInput) -> Result<SimulationState, EngineError> {
        let config = self.params.derive(input)?;
        build_state(&config, self.model.as_ref())
    }
}

fn reject(store: &mut StateStore, report: ValidationReport) -> SubmitError {
    info!(errors = report.errors.len(), "simulation rejected");
    store.set_error(Some(UiError::validation(report.clone())));
    SubmitError::Validation(report)
}

fn cache_key(input: &SimulationInput) -> String {
    format!(
        "projection:{}:{}:{}",
        input.credit_value.normalize(),
        input.term_months,
        input.down_payment_pct.normalize()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::StoreConfig;
    use crate::store::Topic;
    use persistence::{MemoryStorage, StorageBackend};
    use pool_core::rules::RuleField;
    use pool_core::{KpiKey, KpiSet};
    use rust_decimal::Decimal;
    use std::cell::Cell;
    use std::rc::Rc;

    fn input(credit: i64, term: u32, bid: i64) -> SimulationInput {
        SimulationInput {
            credit_value: Decimal::new(credit, 0),
            term_months: term,
            down_payment_pct: Decimal::new(bid, 0),
        }
    }

    fn store(backend: &MemoryStorage) -> StateStore {
        StateStore::init(
            StoreConfig::default(),
            Box::new(backend.clone()),
            Box::new(ManualClock::default()),
        )
    }

    fn healthy_group() -> GroupProfile {
        GroupProfile::uniform(200, Decimal::new(500_000, 0))
    }

    #[test]
    fn accepted_submission_updates_store() {
        let backend = MemoryStorage::new();
        let mut store = store(&backend);
        let kpi_calls = Rc::new(Cell::new(0));
        let k = kpi_calls.clone();
        let _sub = store.subscribe(Topic::Kpis, move |_| k.set(k.get() + 1));

        let pipeline = Pipeline::new(&AppConfig::default());
        let sub = pipeline
            .submit(&mut store, &input(10_000_000, 48, 30), &healthy_group())
            .unwrap();
        assert!(!sub.cached);
        assert!((sub.projection.metrics.pc_ratio - 38_500.0 / 7_000_000.0).abs() < 1e-12);
        assert_eq!(sub.projection.metrics.exposure.current, 0.33);

        let st = store.state();
        assert_eq!(st.simulation.history.len(), 1);
        assert_eq!(st.simulation.current.as_ref(), Some(&sub.simulation));
        assert_eq!(st.metrics.exposure.as_ref().map(|e| e.current), Some(0.33));
        assert!(st.projection.is_some());
        assert!(!st.ui.loading);
        assert_eq!(st.ui.error, None);
        let pc = st.kpis.get(KpiKey::PcRatio).unwrap();
        assert_eq!(pc.previous_value, 0.0055);
        assert_eq!(kpi_calls.get(), 1);
        assert!(backend.get("app_state").is_some());
    }

    #[test]
    fn second_submission_hits_cache() {
        let backend = MemoryStorage::new();
        let mut store = store(&backend);
        let pipeline = Pipeline::new(&AppConfig::default());
        let first = pipeline
            .submit(&mut store, &input(1_000_000, 120, 30), &healthy_group())
            .unwrap();
        let second = pipeline
            .submit(&mut store, &input(1_000_000, 120, 30), &healthy_group())
            .unwrap();
        assert!(second.cached);
        assert_eq!(first.projection, second.projection);
        assert_eq!(store.history().len(), 2);
    }

    /// The parts of the state a rejected request must leave alone.
    fn outcome_slices(store: &StateStore) -> (KpiSet, MetricsState, Option<SimulationState>, usize) {
        let st = store.state();
        (
            st.kpis.clone(),
            st.metrics.clone(),
            st.projection.clone(),
            st.cache.entries.len(),
        )
    }

    #[test]
    fn business_rejection_reports_every_violation_and_mutates_nothing() {
        let backend = MemoryStorage::new();
        let mut store = store(&backend);
        let mut config = AppConfig::default();
        config.validation.business.max_pc_ratio = 0.001;
        config.validation.business.max_exposure = 0.30;
        let pipeline = Pipeline::new(&config);
        let before = outcome_slices(&store);

        let err = pipeline
            .submit(&mut store, &input(10_000_000, 48, 30), &healthy_group())
            .unwrap_err();
        let SubmitError::Validation(report) = err else {
            panic!("expected a validation error");
        };
        assert!(report.has(RuleField::PcRatio));
        assert!(report.has(RuleField::Exposure));
        assert_eq!(report.errors.len(), 2);

        let st = store.state();
        assert!(st.simulation.history.is_empty());
        assert_eq!(
            st.ui.error.as_ref().and_then(|e| e.report.as_ref()),
            Some(&report)
        );
        assert_eq!(outcome_slices(&store), before);
        assert!(store.state().cache.entries.is_empty());
        assert!(backend.get("app_state").is_none());
    }

    #[test]
    fn rejection_after_acceptance_keeps_accepted_results() {
        let mut store = store(&MemoryStorage::new());
        let pipeline = Pipeline::new(&AppConfig::default());
        pipeline
            .submit(&mut store, &input(1_000_000, 120, 30), &healthy_group())
            .unwrap();
        let accepted = outcome_slices(&store);
        assert_eq!(accepted.3, 1);

        let err = pipeline
            .submit(
                &mut store,
                &input(2_000_000, 120, 30),
                &GroupProfile::uniform(10, Decimal::new(100_000, 0)),
            )
            .unwrap_err();
        assert!(matches!(err, SubmitError::Validation(_)));
        assert_eq!(outcome_slices(&store), accepted);
        assert_eq!(store.history().len(), 1);
    }

    #[test]
    fn field_errors_stop_before_the_engine() {
        let mut store = store(&MemoryStorage::new());
        let pipeline = Pipeline::new(&AppConfig::default());
        let before = outcome_slices(&store);
        let huge = SimulationInput {
            credit_value: Decimal::from_i128_with_scale(79_000_000_000_000_000_000_000_000_000, 0),
            term_months: 240,
            down_payment_pct: Decimal::new(70, 0),
        };
        let err = pipeline
            .submit(&mut store, &huge, &healthy_group())
            .unwrap_err();
        let SubmitError::Validation(report) = err else {
            panic!("expected a validation error");
        };
        assert!(report.has(RuleField::Credit));
        assert!(!report.has(RuleField::PcRatio));
        assert_eq!(outcome_slices(&store), before);
        assert!(store.state().cache.entries.is_empty());
        assert!(!store.state().ui.loading);

        let err = pipeline
            .submit(&mut store, &input(1_005_000, 50, 30), &healthy_group())
            .unwrap_err();
        assert!(
            matches!(err, SubmitError::Validation(r) if r.has(RuleField::Credit) && r.has(RuleField::Term))
        );
        assert!(store.state().cache.entries.is_empty());
    }

    #[test]
    fn small_group_is_rejected() {
        let mut store = store(&MemoryStorage::new());
        let pipeline = Pipeline::new(&AppConfig::default());
        let err = pipeline
            .submit(
                &mut store,
                &input(1_000_000, 120, 30),
                &GroupProfile::uniform(10, Decimal::new(100_000, 0)),
            )
            .unwrap_err();
        assert!(matches!(err, SubmitError::Validation(r) if r.has(RuleField::Participants)));
    }

    #[test]
    fn out_of_range_bid_becomes_field_errors() {
        let mut store = store(&MemoryStorage::new());
        let pipeline = Pipeline::new(&AppConfig::default());
        let err = pipeline
            .submit(&mut store, &input(1_000_000, 120, 150), &healthy_group())
            .unwrap_err();
        assert!(matches!(err, SubmitError::Validation(r) if r.has(RuleField::DownPayment)));
    }

    #[test]
    fn engine_failure_sets_generic_notice() {
        let mut store = store(&MemoryStorage::new());
        let mut config = AppConfig::default();
        config.validation.down_payment.max = Decimal::new(100, 0);
        let pipeline = Pipeline::new(&config);
        let err = pipeline
            .submit(&mut store, &input(1_000_000, 120, 100), &healthy_group())
            .unwrap_err();
        assert!(matches!(err, SubmitError::Engine(EngineError::Degenerate(_))));
        let ui_err = store.state().ui.error.clone().unwrap();
        assert_eq!(ui_err.message, ENGINE_FAILURE_NOTICE);
        assert_eq!(ui_err.report, None);
        assert!(store.history().is_empty());
        assert!(store.state().cache.entries.is_empty());
        assert_eq!(store.state().projection, None);
    }

    #[test]
    fn cache_key_ignores_decimal_scale() {
        let a = input(1_000_000, 120, 30);
        let mut b = a.clone();
        b.credit_value = Decimal::new(100_000_000, 2);
        assert_eq!(cache_key(&a), cache_key(&b));
    }
}
