//! Engine entry point: validated config in, full projection out.

use crate::cashflow::generate_cash_flow;
use crate::metrics::{compute_metrics, DegenerateConfigError, MetricModel, MetricsSnapshot};
use crate::timeline::derive_timeline;
use pool_core::{
    reference_tranches, validate_pool_config, CashFlowEntry, ConfigError, PhasePlan, PoolConfig,
    SimulationInput, SimulationOutput, TimelinePhase, Tranche,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Failure of a `build_state` run. Nothing is partially produced.
#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    #[error("invalid pool configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("degenerate pool configuration: {0}")]
    Degenerate(#[from] DegenerateConfigError),
}

/// Everything derived from one pool configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationState {
    pub config: PoolConfig,
    pub timeline: Vec<TimelinePhase>,
    pub cash_flow: Vec<CashFlowEntry>,
    pub metrics: MetricsSnapshot,
}

/// Validate `config` and derive its timeline, cash flow and metrics.
pub fn build_state(
    config: &PoolConfig,
    model: &dyn MetricModel,
) -> Result<SimulationState, EngineError> {
    validate_pool_config(config)?;
    let cash_flow = generate_cash_flow(config)?;
    let timeline = derive_timeline(config)?;
    let metrics = compute_metrics(config, &cash_flow, model)?;
    info!(
        model = model.name(),
        months = cash_flow.len(),
        pc_ratio = metrics.pc_ratio,
        "pool projection built"
    );
    Ok(SimulationState {
        config: config.clone(),
        timeline,
        cash_flow,
        metrics,
    })
}

/// Pool-wide parameters used to turn a user request into a [`PoolConfig`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolParams {
    pub quota_count: u32,
    /// Monthly installment as a share of the quota value.
    pub installment_rate: Decimal,
    pub admin_fee_annual: Decimal,
    pub reference_yield_annual: Decimal,
    pub tranches: Vec<Tranche>,
    pub phase_plan: PhasePlan,
}

impl Default for PoolParams {
    fn default() -> Self {
        Self {
            quota_count: 5,
            // 38_500 per R$ 10MM quota
            installment_rate: Decimal::new(385, 5),
            admin_fee_annual: Decimal::new(12, 3),
            reference_yield_annual: Decimal::new(86, 3),
            tranches: reference_tranches(),
            phase_plan: PhasePlan::default(),
        }
    }
}

impl PoolParams {
    /// Build and validate the pool configuration for a simulation request.
    pub fn derive(&self, input: &SimulationInput) -> Result<PoolConfig, ConfigError> {
        if self.quota_count == 0 {
            return Err(ConfigError::ZeroQuotas);
        }
        let quotas = Decimal::from(self.quota_count);
        let quota_value = input.credit_value / quotas;
        let per_quota = quota_value
            .checked_mul(self.installment_rate)
            .ok_or(ConfigError::Overflow("installment per quota"))?;
        let total_monthly_installment = per_quota
            .checked_mul(quotas)
            .ok_or(ConfigError::Overflow("total installment"))?;
        let bid_percentage = input.down_payment_pct / Decimal::new(100, 0);
        let total_bid_value = input
            .credit_value
            .checked_mul(bid_percentage)
            .ok_or(ConfigError::Overflow("total bid value"))?;
        let config = PoolConfig {
            total_credit: input.credit_value,
            quota_count: self.quota_count,
            quota_value,
            monthly_installment_per_quota: per_quota,
            total_monthly_installment,
            term_months: input.term_months,
            admin_fee_annual: self.admin_fee_annual,
            bid_percentage,
            total_bid_value,
            reference_yield_annual: self.reference_yield_annual,
            average_idle_balance: total_bid_value,
            tranches: self.tranches.clone(),
            phase_plan: self.phase_plan.clone(),
        };
        validate_pool_config(&config)?;
        Ok(config)
    }
}

/// Plain installment quote: the credit net of the bid spread over the term.
pub fn quote(input: &SimulationInput) -> SimulationOutput {
    let financed = input.credit_value
        * (Decimal::ONE - input.down_payment_pct / Decimal::new(100, 0));
    let term = Decimal::from(input.term_months);
    let installment = financed
        .checked_div(term)
        .unwrap_or(Decimal::ZERO)
        .round_dp(2);
    let total_paid = installment * term;
    SimulationOutput {
        installment,
        total_paid,
        total_savings: input.credit_value - total_paid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{MetricModelKind, ProjectedModel, ReferenceModel};

    fn input(credit: i64, term: u32, bid: i64) -> SimulationInput {
        SimulationInput {
            credit_value: Decimal::new(credit, 0),
            term_months: term,
            down_payment_pct: Decimal::new(bid, 0),
        }
    }

    #[test]
    fn end_to_end_reference_scenario() {
        let cfg = PoolParams::default()
            .derive(&input(10_000_000, 48, 30))
            .unwrap();
        assert_eq!(cfg.total_monthly_installment, Decimal::new(38_500, 0));
        assert_eq!(cfg.net_credit(), Decimal::new(7_000_000, 0));
        let state = build_state(&cfg, &ReferenceModel).unwrap();
        assert!((state.metrics.pc_ratio - 38_500.0 / 7_000_000.0).abs() < 1e-12);
        assert_eq!(state.metrics.exposure.current, 0.33);
        assert_eq!(state.cash_flow.len(), 48);
        assert_eq!(state.timeline.len(), 3);
    }

    #[test]
    fn reference_config_builds_with_both_models() {
        let cfg = PoolConfig::reference();
        assert!(build_state(&cfg, &ReferenceModel).is_ok());
        assert!(build_state(&cfg, &ProjectedModel).is_ok());
    }

    #[test]
    fn config_errors_abort_the_run() {
        let mut cfg = PoolConfig::reference();
        cfg.tranches[0].month = 60;
        assert!(matches!(
            build_state(&cfg, &ReferenceModel),
            Err(EngineError::Config(ConfigError::TrancheMonthOutOfRange { .. }))
        ));
    }

    #[test]
    fn runaway_scenario_fails_instead_of_panicking() {
        let credit = Decimal::MAX / Decimal::from(10);
        let installment = credit / Decimal::from(10);
        let cfg = PoolConfig {
            total_credit: credit,
            quota_count: 1,
            quota_value: credit,
            monthly_installment_per_quota: installment,
            total_monthly_installment: installment,
            term_months: 240,
            bid_percentage: Decimal::ZERO,
            total_bid_value: Decimal::ZERO,
            reference_yield_annual: Decimal::ZERO,
            average_idle_balance: Decimal::ZERO,
            ..PoolConfig::reference()
        };
        for model in [MetricModelKind::Reference, MetricModelKind::Projected] {
            assert!(matches!(
                build_state(&cfg, model.model().as_ref()),
                Err(EngineError::Config(ConfigError::Overflow(_)))
            ));
        }
    }

    #[test]
    fn oversized_installment_rate_fails_derive() {
        let params = PoolParams {
            installment_rate: Decimal::MAX,
            ..PoolParams::default()
        };
        assert_eq!(
            params.derive(&input(10_000_000, 48, 30)),
            Err(ConfigError::Overflow("installment per quota"))
        );
    }

    #[test]
    fn full_bid_is_degenerate() {
        let cfg = PoolParams::default()
            .derive(&input(1_000_000, 48, 100))
            .unwrap();
        assert!(matches!(
            build_state(&cfg, &ReferenceModel),
            Err(EngineError::Degenerate(_))
        ));
    }

    #[test]
    fn derive_rejects_bid_above_hundred_percent() {
        assert!(matches!(
            PoolParams::default().derive(&input(1_000_000, 48, 150)),
            Err(ConfigError::BidPercentageOutOfRange(_))
        ));
    }

    #[test]
    fn quote_spreads_financed_credit() {
        let out = quote(&input(1_200_000, 120, 20));
        assert_eq!(out.installment, Decimal::new(8_000, 0));
        assert_eq!(out.total_paid, Decimal::new(960_000, 0));
        assert_eq!(out.total_savings, Decimal::new(240_000, 0));
        let zero = quote(&input(1_200_000, 0, 20));
        assert_eq!(zero.installment, Decimal::ZERO);
    }
}
