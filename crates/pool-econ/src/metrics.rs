//! Headline metrics for a projected pool.
//!
//! The P/C ratio is fixed by definition. ROE, exposure and efficiency come
//! from a [`MetricModel`] so the formulas can change without touching the
//! engine.

use crate::engine::EngineError;
use pool_core::{checked_sum, CashFlowEntry, ConfigError, PoolConfig};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The bid consumes the whole credit, or leaves too little of it, so the
/// P/C ratio is undefined.
#[derive(Debug, Error, PartialEq)]
#[error("net credit {net_credit} is not positive (credit {total_credit}, bid {total_bid_value})")]
pub struct DegenerateConfigError {
    pub total_credit: Decimal,
    pub total_bid_value: Decimal,
    pub net_credit: Decimal,
}

/// Exposure of capital over the timeline.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Exposure {
    pub current: f64,
    pub min: f64,
    pub max: f64,
}

/// Efficiency indices.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Efficiency {
    pub operational: f64,
    pub financial: f64,
    pub combined: f64,
}

/// How much of the installments the idle-capital yield pays for.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct YieldCoverage {
    pub average_idle_balance: Decimal,
    pub accumulated_yield: Decimal,
    /// accumulated yield / (pool installment * term).
    pub installment_coverage: f64,
}

/// All metrics derived from one projection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub pc_ratio: f64,
    pub roe: f64,
    pub exposure: Exposure,
    pub efficiency: Efficiency,
    pub coverage: YieldCoverage,
}

/// Strategy for the model-dependent metrics.
pub trait MetricModel {
    fn name(&self) -> &'static str;
    fn roe(&self, config: &PoolConfig, cash_flow: &[CashFlowEntry]) -> Result<f64, ConfigError>;
    fn exposure(
        &self,
        config: &PoolConfig,
        cash_flow: &[CashFlowEntry],
    ) -> Result<Exposure, ConfigError>;
    fn efficiency(
        &self,
        config: &PoolConfig,
        cash_flow: &[CashFlowEntry],
    ) -> Result<Efficiency, ConfigError>;
}

/// Seeded values of the reference thesis, independent of the projection.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReferenceModel;

impl MetricModel for ReferenceModel {
    fn name(&self) -> &'static str {
        "reference"
    }

    fn roe(&self, _config: &PoolConfig, _cash_flow: &[CashFlowEntry]) -> Result<f64, ConfigError> {
        Ok(0.24)
    }

    fn exposure(
        &self,
        _config: &PoolConfig,
        _cash_flow: &[CashFlowEntry],
    ) -> Result<Exposure, ConfigError> {
        Ok(Exposure {
            current: 0.33,
            min: 0.30,
            max: 0.35,
        })
    }

    fn efficiency(
        &self,
        _config: &PoolConfig,
        _cash_flow: &[CashFlowEntry],
    ) -> Result<Efficiency, ConfigError> {
        Ok(Efficiency {
            operational: 0.92,
            financial: 0.88,
            combined: 0.90,
        })
    }
}

/// Metrics computed from the projected cash flow.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProjectedModel;

impl MetricModel for ProjectedModel {
    fn name(&self) -> &'static str {
        "projected"
    }

    /// Annualized (yield + credit - outflow) / outflow.
    fn roe(&self, config: &PoolConfig, cash_flow: &[CashFlowEntry]) -> Result<f64, ConfigError> {
        let overflow = || ConfigError::Overflow("return on equity");
        let outflow = checked_sum(cash_flow.iter().map(|e| e.outflow)).ok_or_else(overflow)?;
        let inflow = checked_sum(cash_flow.iter().map(|e| e.inflow)).ok_or_else(overflow)?;
        if outflow <= Decimal::ZERO || config.term_months == 0 {
            return Ok(0.0);
        }
        let gain = inflow
            .checked_add(config.total_credit)
            .and_then(|g| g.checked_sub(outflow))
            .ok_or_else(overflow)?;
        let years = Decimal::from(config.term_months) / Decimal::from(12);
        gain.checked_div(outflow)
            .and_then(|r| r.checked_div(years))
            .map(to_f64)
            .ok_or_else(overflow)
    }

    /// Uncovered cumulative deficit as a share of the credit, month by month.
    fn exposure(
        &self,
        config: &PoolConfig,
        cash_flow: &[CashFlowEntry],
    ) -> Result<Exposure, ConfigError> {
        if config.total_credit <= Decimal::ZERO || cash_flow.is_empty() {
            return Ok(Exposure::default());
        }
        let series = cash_flow
            .iter()
            .map(|e| {
                (-e.cumulative_balance)
                    .max(Decimal::ZERO)
                    .checked_div(config.total_credit)
                    .map(to_f64)
                    .ok_or(ConfigError::Overflow("exposure"))
            })
            .collect::<Result<Vec<f64>, _>>()?;
        Ok(Exposure {
            current: series.last().copied().unwrap_or(0.0),
            min: series.iter().copied().fold(f64::INFINITY, f64::min),
            max: series.iter().copied().fold(0.0, f64::max),
        })
    }

    fn efficiency(
        &self,
        config: &PoolConfig,
        cash_flow: &[CashFlowEntry],
    ) -> Result<Efficiency, ConfigError> {
        let years = Decimal::from(config.term_months) / Decimal::from(12);
        let fees = config
            .admin_fee_annual
            .checked_mul(years)
            .ok_or(ConfigError::Overflow("administration fees"))?;
        let operational = to_f64(Decimal::ONE - fees).clamp(0.0, 1.0);
        let financial = yield_coverage(config, cash_flow)?.installment_coverage;
        Ok(Efficiency {
            operational,
            financial,
            combined: (operational + financial) / 2.0,
        })
    }
}

/// Configurable choice of metric model.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricModelKind {
    #[default]
    Reference,
    Projected,
}

impl MetricModelKind {
    pub fn model(self) -> Box<dyn MetricModel> {
        match self {
            MetricModelKind::Reference => Box::new(ReferenceModel),
            MetricModelKind::Projected => Box::new(ProjectedModel),
        }
    }
}

fn to_f64(d: Decimal) -> f64 {
    d.to_f64().unwrap_or(0.0)
}

/// Installment over net credit (credit minus bid).
///
/// Example:
/// let r = pc_ratio(&PoolConfig::reference()).unwrap();
/// assert!((r - 192_500.0 / 35_000_000.0).abs() < 1e-12);
pub fn pc_ratio(config: &PoolConfig) -> Result<f64, DegenerateConfigError> {
    let net_credit = config.net_credit();
    if net_credit <= Decimal::ZERO {
        return Err(DegenerateConfigError {
            total_credit: config.total_credit,
            total_bid_value: config.total_bid_value,
            net_credit,
        });
    }
    config
        .total_monthly_installment
        .checked_div(net_credit)
        .map(to_f64)
        .ok_or(DegenerateConfigError {
            total_credit: config.total_credit,
            total_bid_value: config.total_bid_value,
            net_credit,
        })
}

/// Yield earned by idle capital against the installments it has to cover.
pub fn yield_coverage(
    config: &PoolConfig,
    cash_flow: &[CashFlowEntry],
) -> Result<YieldCoverage, ConfigError> {
    let overflow = || ConfigError::Overflow("yield coverage");
    let accumulated_yield = checked_sum(cash_flow.iter().map(|e| e.inflow)).ok_or_else(overflow)?;
    let installments = config
        .total_monthly_installment
        .checked_mul(Decimal::from(cash_flow.len() as u64))
        .ok_or_else(overflow)?;
    let installment_coverage = if installments > Decimal::ZERO {
        accumulated_yield
            .checked_div(installments)
            .map(to_f64)
            .ok_or_else(overflow)?
    } else {
        0.0
    };
    Ok(YieldCoverage {
        average_idle_balance: config.average_idle_balance,
        accumulated_yield,
        installment_coverage,
    })
}

/// Compute the full metrics snapshot for a projection.
pub fn compute_metrics(
    config: &PoolConfig,
    cash_flow: &[CashFlowEntry],
    model: &dyn MetricModel,
) -> Result<MetricsSnapshot, EngineError> {
    Ok(MetricsSnapshot {
        pc_ratio: pc_ratio(config)?,
        roe: model.roe(config, cash_flow)?,
        exposure: model.exposure(config, cash_flow)?,
        efficiency: model.efficiency(config, cash_flow)?,
        coverage: yield_coverage(config, cash_flow)?,
    })
}
