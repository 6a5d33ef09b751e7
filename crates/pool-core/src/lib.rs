#![deny(warnings)]

//! Core domain models and invariants for the consórcio pool simulator.
//!
//! This crate defines the serializable types shared by the engine and the
//! state store, with validation helpers to guarantee the pool invariants.

pub mod format;
pub mod rules;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use thiserror::Error;

/// Tolerance for monetary invariants: one cent.
pub fn money_tolerance() -> Decimal {
    Decimal::new(1, 2)
}

/// Tolerance for the tranche fraction sum.
pub fn fraction_tolerance() -> Decimal {
    Decimal::new(1, 6)
}

/// Sum of `values`, or `None` once it leaves the `Decimal` range.
pub fn checked_sum(values: impl IntoIterator<Item = Decimal>) -> Option<Decimal> {
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(v))
}

/// One bid disbursement: `fraction` of the total bid value paid at `month`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tranche {
    /// Month of the disbursement, 1-based.
    pub month: u32,
    /// Share of the total bid value, in [0, 1].
    pub fraction: Decimal,
}

/// The 40/40/20 disbursement at months 1, 4 and 7 of the reference thesis.
pub fn reference_tranches() -> Vec<Tranche> {
    vec![
        Tranche {
            month: 1,
            fraction: Decimal::new(40, 2),
        },
        Tranche {
            month: 4,
            fraction: Decimal::new(40, 2),
        },
        Tranche {
            month: 7,
            fraction: Decimal::new(20, 2),
        },
    ]
}

/// Boundaries used to split the term into entry, execution and exit phases.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhasePlan {
    /// Months after the last tranche that still belong to the entry phase.
    pub entry_buffer_months: u32,
    /// Length of the exit phase, counted back from the end of the term.
    pub exit_window_months: u32,
    /// The exit process starts this many months before the end of the term.
    pub exit_preparation_months: u32,
    /// Period of the index correction milestones.
    pub correction_period_months: u32,
}

impl Default for PhasePlan {
    fn default() -> Self {
        Self {
            entry_buffer_months: 2,
            exit_window_months: 12,
            exit_preparation_months: 6,
            correction_period_months: 12,
        }
    }
}

/// Pool configuration; immutable for the duration of one simulation run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Total credit of the pool.
    pub total_credit: Decimal,
    /// Number of quotas the credit is split into (>= 1).
    pub quota_count: u32,
    /// Credit per quota; `quota_value * quota_count == total_credit`.
    pub quota_value: Decimal,
    /// Monthly installment paid for each quota.
    pub monthly_installment_per_quota: Decimal,
    /// Monthly installment of the whole pool.
    pub total_monthly_installment: Decimal,
    /// Projection horizon in months.
    pub term_months: u32,
    /// Annual administration fee (0.012 = 1.2% a.a.).
    pub admin_fee_annual: Decimal,
    /// Bid as a fraction of the total credit, in [0, 1].
    pub bid_percentage: Decimal,
    /// Total value paid in bids.
    pub total_bid_value: Decimal,
    /// Annual yield earned by idle capital (0.086 = 8.60% a.a.).
    pub reference_yield_annual: Decimal,
    /// Average undeployed capital earning the reference yield.
    pub average_idle_balance: Decimal,
    /// Bid disbursement schedule; fractions sum to 1.
    pub tranches: Vec<Tranche>,
    /// Phase boundaries for the timeline.
    #[serde(default)]
    pub phase_plan: PhasePlan,
}

impl PoolConfig {
    /// The seeded reference thesis: R$ 50MM in five R$ 10MM quotas over 48 months.
    pub fn reference() -> Self {
        Self {
            total_credit: Decimal::new(50_000_000, 0),
            quota_count: 5,
            quota_value: Decimal::new(10_000_000, 0),
            monthly_installment_per_quota: Decimal::new(38_500, 0),
            total_monthly_installment: Decimal::new(192_500, 0),
            term_months: 48,
            admin_fee_annual: Decimal::new(12, 3),
            bid_percentage: Decimal::new(30, 2),
            total_bid_value: Decimal::new(15_000_000, 0),
            reference_yield_annual: Decimal::new(86, 3),
            average_idle_balance: Decimal::new(15_000_000, 0),
            tranches: reference_tranches(),
            phase_plan: PhasePlan::default(),
        }
    }

    /// Credit obtained after paying the bid.
    pub fn net_credit(&self) -> Decimal {
        self.total_credit - self.total_bid_value
    }

    /// Yield earned each month by the idle balance.
    pub fn monthly_yield(&self) -> Result<Decimal, ConfigError> {
        self.average_idle_balance
            .checked_mul(self.reference_yield_annual)
            .map(|annual| annual / Decimal::from(12))
            .ok_or(ConfigError::Overflow("monthly yield"))
    }

    /// Latest month with a scheduled tranche.
    pub fn last_tranche_month(&self) -> Option<u32> {
        self.tranches.iter().map(|t| t.month).max()
    }
}

/// Phase of the investment timeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    /// Bids are disbursed and quotas contemplated.
    Entry,
    /// Credit is deployed and corrected periodically.
    Execution,
    /// Positions are unwound.
    Exit,
}

impl PhaseKind {
    /// Display name of the phase.
    pub fn label(self) -> &'static str {
        match self {
            PhaseKind::Entry => "Entry",
            PhaseKind::Execution => "Execution",
            PhaseKind::Exit => "Exit",
        }
    }
}

/// Kind of a timeline event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Bid,
    Milestone,
    Exit,
}

/// A dated event owned by one phase.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub month: u32,
    pub kind: EventKind,
    /// Quotas involved, for bid events.
    pub quantity: Option<u32>,
    pub detail: String,
}

/// A contiguous block of months with its events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimelinePhase {
    pub kind: PhaseKind,
    pub name: String,
    pub start_month: u32,
    pub end_month: u32,
    pub events: Vec<TimelineEvent>,
}

impl TimelinePhase {
    /// Whether `month` falls inside the phase.
    pub fn contains(&self, month: u32) -> bool {
        (self.start_month..=self.end_month).contains(&month)
    }
}

/// Projected cash movement for one month.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CashFlowEntry {
    pub month: u32,
    pub inflow: Decimal,
    pub outflow: Decimal,
    /// `inflow - outflow`.
    pub net_balance: Decimal,
    /// Running sum of `net_balance` up to and including this month.
    pub cumulative_balance: Decimal,
}

/// Raw simulation request as submitted by a user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationInput {
    pub credit_value: Decimal,
    pub term_months: u32,
    /// Bid as a percentage of the credit, 0–100.
    pub down_payment_pct: Decimal,
}

/// Quote returned for a simulation request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationOutput {
    pub installment: Decimal,
    pub total_paid: Decimal,
    pub total_savings: Decimal,
}

/// An accepted simulation before it is timestamped into the history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Simulation {
    pub input: SimulationInput,
    pub output: SimulationOutput,
}

/// Immutable history entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationRecord {
    pub input: SimulationInput,
    pub output: SimulationOutput,
    pub timestamp: DateTime<Utc>,
}

impl SimulationRecord {
    pub fn stamp(sim: Simulation, timestamp: DateTime<Utc>) -> Self {
        Self {
            input: sim.input,
            output: sim.output,
            timestamp,
        }
    }
}

/// Participants of a consórcio group, as seen by the business rules.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupProfile {
    pub participants: u32,
    /// Credit held by each participant.
    pub participant_credits: Vec<Decimal>,
}

impl GroupProfile {
    /// A group of `participants` holding the same credit each.
    pub fn uniform(participants: u32, credit: Decimal) -> Self {
        Self {
            participants,
            participant_credits: vec![credit; participants as usize],
        }
    }
}

/// Key of a headline KPI.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KpiKey {
    PcRatio,
    Roe,
    Exposure,
    Efficiency,
}

impl KpiKey {
    pub const ALL: [KpiKey; 4] = [
        KpiKey::PcRatio,
        KpiKey::Roe,
        KpiKey::Exposure,
        KpiKey::Efficiency,
    ];
}

/// How a KPI value is rendered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KpiFormat {
    Percentage,
    Currency,
}

impl KpiFormat {
    /// Render `value` for display.
    pub fn render(self, value: f64) -> String {
        match self {
            KpiFormat::Percentage => format::format_percentage(value, 2),
            KpiFormat::Currency => format::format_currency_f64(value),
        }
    }
}

/// Headline indicator with its trend against the previous value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Kpi {
    pub key: KpiKey,
    pub label: String,
    pub value: f64,
    pub previous_value: f64,
    /// `(value - previous_value) / previous_value`, 0 when undefined.
    pub trend: f64,
    pub format: KpiFormat,
    pub icon: String,
    pub description: String,
}

impl Kpi {
    /// Seed a KPI with a known trend; the previous value is back-computed.
    pub fn seeded(
        key: KpiKey,
        label: &str,
        value: f64,
        trend: f64,
        format: KpiFormat,
        icon: &str,
        description: &str,
    ) -> Self {
        let previous_value = if (1.0 + trend) != 0.0 {
            value / (1.0 + trend)
        } else {
            value
        };
        Self {
            key,
            label: label.to_string(),
            value,
            previous_value,
            trend,
            format,
            icon: icon.to_string(),
            description: description.to_string(),
        }
    }

    pub fn display_value(&self) -> String {
        self.format.render(self.value)
    }

    /// Trend as a signed percentage, e.g. "-2.0%".
    pub fn display_trend(&self) -> String {
        format::format_percentage(self.trend, 1)
    }
}

/// The KPI set, keyed by [`KpiKey`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KpiSet(pub BTreeMap<KpiKey, Kpi>);

impl KpiSet {
    /// KPIs with the reference seed values.
    pub fn seeded() -> Self {
        let kpis = [
            Kpi::seeded(
                KpiKey::PcRatio,
                "P/C Ratio",
                0.0055,
                -0.02,
                KpiFormat::Percentage,
                "chart-line",
                "Monthly installment over net credit",
            ),
            Kpi::seeded(
                KpiKey::Roe,
                "Projected ROE",
                0.24,
                0.05,
                KpiFormat::Percentage,
                "chart-pie",
                "Annualized return on equity",
            ),
            Kpi::seeded(
                KpiKey::Exposure,
                "Maximum Exposure",
                0.33,
                -0.01,
                KpiFormat::Percentage,
                "shield",
                "Maximum capital exposure",
            ),
            Kpi::seeded(
                KpiKey::Efficiency,
                "Efficiency",
                0.92,
                0.03,
                KpiFormat::Percentage,
                "bolt",
                "Operational efficiency index",
            ),
        ];
        Self(kpis.into_iter().map(|k| (k.key, k)).collect())
    }

    pub fn get(&self, key: KpiKey) -> Option<&Kpi> {
        self.0.get(&key)
    }

    pub fn get_mut(&mut self, key: KpiKey) -> Option<&mut Kpi> {
        self.0.get_mut(&key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Kpi> {
        self.0.values()
    }

    /// Put back the seeded entry for every missing key. Returns how many were added.
    pub fn fill_missing(&mut self) -> usize {
        let mut added = 0;
        for (key, kpi) in Self::seeded().0 {
            if let Entry::Vacant(slot) = self.0.entry(key) {
                slot.insert(kpi);
                added += 1;
            }
        }
        added
    }
}

impl Default for KpiSet {
    fn default() -> Self {
        Self::seeded()
    }
}

/// Malformed pool configuration; fatal to the simulation run.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("term must be at least one month")]
    ZeroTerm,
    #[error("quota count must be at least one")]
    ZeroQuotas,
    #[error("negative value in field {0}")]
    NegativeValue(&'static str),
    #[error("quota value {quota_value} x {quota_count} does not match total credit {total_credit}")]
    QuotaMismatch {
        quota_value: Decimal,
        quota_count: u32,
        total_credit: Decimal,
    },
    #[error("total installment {total} does not match {per_quota} x {quota_count}")]
    InstallmentMismatch {
        total: Decimal,
        per_quota: Decimal,
        quota_count: u32,
    },
    #[error("bid percentage {0} is outside [0, 1]")]
    BidPercentageOutOfRange(Decimal),
    #[error("total bid value {total_bid_value} does not match {bid_percentage} of the credit")]
    BidValueMismatch {
        total_bid_value: Decimal,
        bid_percentage: Decimal,
    },
    #[error("tranche fractions sum to {0}, expected 1")]
    TrancheFractionSum(Decimal),
    #[error("tranche fraction {0} is negative")]
    NegativeTranche(Decimal),
    #[error("tranche month {month} is outside [1, {term_months}]")]
    TrancheMonthOutOfRange { month: u32, term_months: u32 },
    #[error("phase plan does not fit a {term_months}-month term: {reason}")]
    PhaseBoundaries {
        term_months: u32,
        reason: &'static str,
    },
    #[error("{0} is outside the representable decimal range")]
    Overflow(&'static str),
}

/// Validate a tranche schedule against the term.
pub fn validate_tranches(tranches: &[Tranche], term_months: u32) -> Result<(), ConfigError> {
    let mut sum = Decimal::ZERO;
    for t in tranches {
        if t.fraction < Decimal::ZERO {
            return Err(ConfigError::NegativeTranche(t.fraction));
        }
        if t.month < 1 || t.month > term_months {
            return Err(ConfigError::TrancheMonthOutOfRange {
                month: t.month,
                term_months,
            });
        }
        sum = sum
            .checked_add(t.fraction)
            .ok_or(ConfigError::Overflow("tranche fractions"))?;
    }
    if (sum - Decimal::ONE).abs() > fraction_tolerance() {
        return Err(ConfigError::TrancheFractionSum(sum));
    }
    Ok(())
}

/// Month boundaries `(entry_end, exit_start)` for a plan; execution lies in between.
pub fn phase_boundaries(
    plan: &PhasePlan,
    last_tranche_month: u32,
    term_months: u32,
) -> Result<(u32, u32), ConfigError> {
    let err = |reason| ConfigError::PhaseBoundaries {
        term_months,
        reason,
    };
    if plan.exit_window_months == 0 || plan.exit_window_months >= term_months {
        return Err(err("exit window must be shorter than the term"));
    }
    if plan.exit_preparation_months >= plan.exit_window_months {
        return Err(err("exit preparation must fall inside the exit window"));
    }
    if plan.correction_period_months == 0 {
        return Err(err("correction period must be at least one month"));
    }
    let entry_end = last_tranche_month.saturating_add(plan.entry_buffer_months);
    let exit_start = term_months - plan.exit_window_months + 1;
    // execution needs at least one month
    if entry_end.saturating_add(2) > exit_start {
        return Err(err("entry phase overlaps the exit window"));
    }
    Ok((entry_end, exit_start))
}

/// Validate every invariant of a pool configuration.
pub fn validate_pool_config(config: &PoolConfig) -> Result<(), ConfigError> {
    if config.term_months == 0 {
        return Err(ConfigError::ZeroTerm);
    }
    if config.quota_count == 0 {
        return Err(ConfigError::ZeroQuotas);
    }
    let money = [
        ("total_credit", config.total_credit),
        ("quota_value", config.quota_value),
        (
            "monthly_installment_per_quota",
            config.monthly_installment_per_quota,
        ),
        ("total_monthly_installment", config.total_monthly_installment),
        ("admin_fee_annual", config.admin_fee_annual),
        ("total_bid_value", config.total_bid_value),
        ("reference_yield_annual", config.reference_yield_annual),
        ("average_idle_balance", config.average_idle_balance),
    ];
    for (field, value) in money {
        if value < Decimal::ZERO {
            return Err(ConfigError::NegativeValue(field));
        }
    }
    let quotas = Decimal::from(config.quota_count);
    let scaled = |value: Decimal, by: Decimal, field: &'static str| {
        value.checked_mul(by).ok_or(ConfigError::Overflow(field))
    };
    if (scaled(config.quota_value, quotas, "quota value x quota count")? - config.total_credit)
        .abs()
        > money_tolerance()
    {
        return Err(ConfigError::QuotaMismatch {
            quota_value: config.quota_value,
            quota_count: config.quota_count,
            total_credit: config.total_credit,
        });
    }
    let installments = scaled(
        config.monthly_installment_per_quota,
        quotas,
        "installment x quota count",
    )?;
    if (installments - config.total_monthly_installment).abs() > money_tolerance() {
        return Err(ConfigError::InstallmentMismatch {
            total: config.total_monthly_installment,
            per_quota: config.monthly_installment_per_quota,
            quota_count: config.quota_count,
        });
    }
    if config.bid_percentage < Decimal::ZERO || config.bid_percentage > Decimal::ONE {
        return Err(ConfigError::BidPercentageOutOfRange(config.bid_percentage));
    }
    let bid = scaled(config.total_credit, config.bid_percentage, "total bid value")?;
    if (bid - config.total_bid_value).abs() > money_tolerance() {
        return Err(ConfigError::BidValueMismatch {
            total_bid_value: config.total_bid_value,
            bid_percentage: config.bid_percentage,
        });
    }
    validate_tranches(&config.tranches, config.term_months)?;
    let last = config.last_tranche_month().unwrap_or(1);
    phase_boundaries(&config.phase_plan, last, config.term_months)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn reference_config_is_valid() {
        let cfg = PoolConfig::reference();
        validate_pool_config(&cfg).unwrap();
        assert_eq!(cfg.net_credit(), Decimal::new(35_000_000, 0));
        // 15MM * 8.6% / 12
        assert_eq!(cfg.monthly_yield(), Ok(Decimal::new(107_500, 0)));
    }

    #[test]
    fn tranche_sum_must_be_one() {
        let mut cfg = PoolConfig::reference();
        cfg.tranches[2].fraction = Decimal::new(10, 2);
        assert_eq!(
            validate_pool_config(&cfg),
            Err(ConfigError::TrancheFractionSum(Decimal::new(90, 2)))
        );
    }

    #[test]
    fn tranche_sum_within_tolerance_passes() {
        let tranches = vec![
            Tranche {
                month: 1,
                fraction: Decimal::new(3333333, 7),
            },
            Tranche {
                month: 2,
                fraction: Decimal::new(3333333, 7),
            },
            Tranche {
                month: 3,
                fraction: Decimal::new(3333334, 7),
            },
        ];
        assert!(validate_tranches(&tranches, 12).is_ok());
    }

    #[test]
    fn tranche_month_outside_term() {
        let mut cfg = PoolConfig::reference();
        cfg.tranches[2].month = 49;
        assert_eq!(
            validate_pool_config(&cfg),
            Err(ConfigError::TrancheMonthOutOfRange {
                month: 49,
                term_months: 48
            })
        );
        cfg.tranches[2].month = 0;
        assert!(matches!(
            validate_pool_config(&cfg),
            Err(ConfigError::TrancheMonthOutOfRange { month: 0, .. })
        ));
    }

    #[test]
    fn installment_mismatch_detected() {
        let mut cfg = PoolConfig::reference();
        cfg.total_monthly_installment = Decimal::new(200_000, 0);
        assert!(matches!(
            validate_pool_config(&cfg),
            Err(ConfigError::InstallmentMismatch { .. })
        ));
    }

    #[test]
    fn bid_percentage_bounds() {
        let mut cfg = PoolConfig::reference();
        cfg.bid_percentage = Decimal::new(11, 1);
        assert_eq!(
            validate_pool_config(&cfg),
            Err(ConfigError::BidPercentageOutOfRange(Decimal::new(11, 1)))
        );
    }

    #[test]
    fn oversized_amounts_are_config_errors() {
        let mut cfg = PoolConfig::reference();
        cfg.quota_value = Decimal::MAX;
        assert_eq!(
            validate_pool_config(&cfg),
            Err(ConfigError::Overflow("quota value x quota count"))
        );

        let mut cfg = PoolConfig::reference();
        cfg.average_idle_balance = Decimal::MAX;
        assert_eq!(cfg.monthly_yield(), Err(ConfigError::Overflow("monthly yield")));

        let huge = vec![
            Tranche {
                month: 1,
                fraction: Decimal::MAX,
            },
            Tranche {
                month: 2,
                fraction: Decimal::MAX,
            },
        ];
        assert_eq!(
            validate_tranches(&huge, 48),
            Err(ConfigError::Overflow("tranche fractions"))
        );
        assert_eq!(checked_sum([Decimal::MAX, Decimal::ONE]), None);
        assert_eq!(checked_sum([Decimal::ONE, Decimal::ONE]), Some(Decimal::new(2, 0)));
    }

    #[test]
    fn reference_phase_boundaries() {
        let cfg = PoolConfig::reference();
        let (entry_end, exit_start) = phase_boundaries(&cfg.phase_plan, 7, 48).unwrap();
        assert_eq!(entry_end, 9);
        assert_eq!(exit_start, 37);
    }

    #[test]
    fn short_term_rejects_phase_plan() {
        let plan = PhasePlan::default();
        assert!(matches!(
            phase_boundaries(&plan, 7, 12),
            Err(ConfigError::PhaseBoundaries { .. })
        ));
        assert!(matches!(
            phase_boundaries(&plan, 7, 20),
            Err(ConfigError::PhaseBoundaries { .. })
        ));
        assert!(phase_boundaries(&plan, 7, 22).is_ok());
    }

    #[test]
    fn kpi_seeds_back_compute_previous_value() {
        let kpis = KpiSet::seeded();
        let roe = kpis.get(KpiKey::Roe).unwrap();
        assert!((roe.previous_value * 1.05 - 0.24).abs() < 1e-12);
        assert_eq!(kpis.iter().count(), 4);
        assert_eq!(roe.display_value(), "24.00%");
        assert_eq!(roe.display_trend(), "5.0%");
    }

    #[test]
    fn fill_missing_restores_seeded_keys_only() {
        let mut kpis = KpiSet::seeded();
        kpis.0.remove(&KpiKey::Exposure);
        kpis.0.remove(&KpiKey::Efficiency);
        if let Some(roe) = kpis.get_mut(KpiKey::Roe) {
            roe.value = 0.5;
        }
        assert_eq!(kpis.fill_missing(), 2);
        assert_eq!(kpis.iter().count(), 4);
        assert_eq!(kpis.get(KpiKey::Roe).unwrap().value, 0.5);
        assert_eq!(kpis.get(KpiKey::Exposure), KpiSet::seeded().get(KpiKey::Exposure));
        assert_eq!(kpis.fill_missing(), 0);
    }

    #[test]
    fn pool_config_yaml_roundtrip() {
        let cfg = PoolConfig::reference();
        let s = serde_yaml::to_string(&cfg).unwrap();
        let back: PoolConfig = serde_yaml::from_str(&s).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn kpi_set_json_uses_snake_case_keys() {
        let json = serde_json::to_value(KpiSet::seeded()).unwrap();
        assert!(json.get("pc_ratio").is_some());
        let back: KpiSet = serde_json::from_value(json).unwrap();
        assert_eq!(back, KpiSet::seeded());
    }

    proptest! {
        #[test]
        fn consistent_quota_split_validates(quotas in 1u32..50, per_quota in 1i64..1_000_000) {
            let mut cfg = PoolConfig::reference();
            cfg.quota_count = quotas;
            cfg.quota_value = Decimal::new(per_quota * 100, 0);
            cfg.total_credit = cfg.quota_value * Decimal::from(quotas);
            cfg.monthly_installment_per_quota = Decimal::new(per_quota, 0);
            cfg.total_monthly_installment = Decimal::new(per_quota, 0) * Decimal::from(quotas);
            cfg.total_bid_value = cfg.total_credit * cfg.bid_percentage;
            prop_assert!(validate_pool_config(&cfg).is_ok());
        }

        #[test]
        fn quota_mismatch_is_rejected(extra in 1i64..1_000_000) {
            let mut cfg = PoolConfig::reference();
            cfg.total_credit += Decimal::new(extra, 0);
            prop_assert!(matches!(
                validate_pool_config(&cfg),
                Err(ConfigError::QuotaMismatch { .. })
            ), "expected ConfigError::QuotaMismatch");
        }
    }
}
