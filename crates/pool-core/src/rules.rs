//! Validation rules for simulation inputs and group business ratios.
//!
//! Every check here is a pure predicate. Violations are collected into a
//! [`ValidationReport`]; nothing short-circuits and nothing fails.

use crate::format::{format_currency, format_percentage};
use crate::{checked_sum, GroupProfile, SimulationInput};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Inclusive money range with a step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MoneyRange {
    pub min: Decimal,
    pub max: Decimal,
    pub step: Decimal,
}

/// Inclusive month range with a step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TermRange {
    pub min: u32,
    pub max: u32,
    pub step: u32,
}

/// Inclusive percentage range (0–100 scale).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PercentRange {
    pub min: Decimal,
    pub max: Decimal,
}

/// Business ceilings applied to a derived pool and its group.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusinessLimits {
    /// Ceiling for installment over net credit.
    pub max_pc_ratio: f64,
    /// Ceiling for capital exposure.
    pub max_exposure: f64,
    pub min_participants: u32,
    pub max_participants: u32,
    /// No participant may hold more than this multiple of the average credit.
    pub max_concentration: Decimal,
}

impl Default for BusinessLimits {
    fn default() -> Self {
        Self {
            max_pc_ratio: 0.01,
            max_exposure: 0.35,
            min_participants: 100,
            max_participants: 5000,
            max_concentration: Decimal::new(2, 0),
        }
    }
}

/// All configurable limits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationRules {
    pub credit: MoneyRange,
    pub term: TermRange,
    pub down_payment: PercentRange,
    pub business: BusinessLimits,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            credit: MoneyRange {
                min: Decimal::new(200_000, 0),
                max: Decimal::new(10_000_000, 0),
                step: Decimal::new(10_000, 0),
            },
            term: TermRange {
                min: 24,
                max: 240,
                step: 12,
            },
            down_payment: PercentRange {
                min: Decimal::new(20, 0),
                max: Decimal::new(70, 0),
            },
            business: BusinessLimits::default(),
        }
    }
}

/// The field or rule a violation refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleField {
    Credit,
    Term,
    DownPayment,
    PcRatio,
    Exposure,
    Participants,
    CreditDistribution,
}

impl fmt::Display for RuleField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RuleField::Credit => "credit",
            RuleField::Term => "term",
            RuleField::DownPayment => "down_payment",
            RuleField::PcRatio => "pc_ratio",
            RuleField::Exposure => "exposure",
            RuleField::Participants => "participants",
            RuleField::CreditDistribution => "credit_distribution",
        };
        f.write_str(s)
    }
}

/// One violated rule.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: RuleField,
    pub message: String,
}

impl FieldError {
    fn new(field: RuleField, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Outcome of a validation pass.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<FieldError>,
}

impl ValidationReport {
    pub fn from_errors(errors: Vec<FieldError>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }

    /// Whether a violation for `field` was reported.
    pub fn has(&self, field: RuleField) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid {
            return f.write_str("valid");
        }
        for (i, e) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", e.field, e.message)?;
        }
        Ok(())
    }
}

/// Figures the business rules are evaluated against.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BusinessFacts {
    pub monthly_installment: Decimal,
    /// Credit after the bid.
    pub net_credit: Decimal,
    pub exposure: f64,
    pub group: GroupProfile,
}

impl BusinessFacts {
    /// Installment over net credit; `None` when the net credit is not positive.
    pub fn pc_ratio(&self) -> Option<f64> {
        if self.net_credit <= Decimal::ZERO {
            return None;
        }
        self.monthly_installment.checked_div(self.net_credit)?.to_f64()
    }
}

/// Range and step checks on the raw input.
pub fn validate_fields(input: &SimulationInput, rules: &ValidationRules) -> Vec<FieldError> {
    let mut errors = Vec::new();

    let c = &rules.credit;
    let on_step = c.step <= Decimal::ZERO || (input.credit_value % c.step).is_zero();
    if input.credit_value < c.min || input.credit_value > c.max || !on_step {
        errors.push(FieldError::new(
            RuleField::Credit,
            format!(
                "credit must be between {} and {} in steps of {}",
                format_currency(c.min),
                format_currency(c.max),
                format_currency(c.step)
            ),
        ));
    }

    let t = &rules.term;
    let on_step = t.step == 0 || input.term_months % t.step == 0;
    if input.term_months < t.min || input.term_months > t.max || !on_step {
        errors.push(FieldError::new(
            RuleField::Term,
            format!(
                "term must be between {} and {} months in steps of {}",
                t.min, t.max, t.step
            ),
        ));
    }

    let d = &rules.down_payment;
    if input.down_payment_pct < d.min || input.down_payment_pct > d.max {
        errors.push(FieldError::new(
            RuleField::DownPayment,
            format!("bid must be between {}% and {}%", d.min, d.max),
        ));
    }

    errors
}

fn participants_error(participants: u32, limits: &BusinessLimits) -> Option<FieldError> {
    if (limits.min_participants..=limits.max_participants).contains(&participants) {
        return None;
    }
    Some(FieldError::new(
        RuleField::Participants,
        format!(
            "participants must be between {} and {}",
            limits.min_participants, limits.max_participants
        ),
    ))
}

/// Participant count and credit concentration checks.
pub fn validate_group_rules(group: &GroupProfile, limits: &BusinessLimits) -> Vec<FieldError> {
    let mut errors = Vec::new();
    errors.extend(participants_error(group.participants, limits));
    if !is_distribution_balanced(&group.participant_credits, limits.max_concentration) {
        errors.push(FieldError::new(
            RuleField::CreditDistribution,
            format!(
                "no participant may hold more than {}x the average credit",
                limits.max_concentration
            ),
        ));
    }
    errors
}

/// Whether every credit is at most `max_multiple` times the average.
pub fn is_distribution_balanced(credits: &[Decimal], max_multiple: Decimal) -> bool {
    if credits.is_empty() {
        return false;
    }
    let n = Decimal::from(credits.len() as u64);
    let average = match checked_sum(credits.iter().copied()) {
        Some(total) => total / n,
        None => checked_sum(credits.iter().map(|c| *c / n)).unwrap_or(Decimal::MAX),
    };
    match average.checked_mul(max_multiple) {
        Some(ceiling) => credits.iter().all(|c| *c <= ceiling),
        // a ceiling past the decimal range bounds nothing
        None => max_multiple > Decimal::ZERO,
    }
}

/// Ratio ceilings plus the group rules.
pub fn validate_business(facts: &BusinessFacts, limits: &BusinessLimits) -> Vec<FieldError> {
    let mut errors = Vec::new();
    match facts.pc_ratio() {
        Some(ratio) if ratio <= limits.max_pc_ratio => {}
        Some(ratio) => errors.push(FieldError::new(
            RuleField::PcRatio,
            format!(
                "installment/credit ratio {} exceeds the {} ceiling",
                format_percentage(ratio, 2),
                format_percentage(limits.max_pc_ratio, 2)
            ),
        )),
        None => errors.push(FieldError::new(
            RuleField::PcRatio,
            "net credit must be positive to compute the installment/credit ratio",
        )),
    }
    // NaN exposure fails as well
    if !(facts.exposure <= limits.max_exposure) {
        errors.push(FieldError::new(
            RuleField::Exposure,
            format!(
                "exposure {} is above the {} limit",
                format_percentage(facts.exposure, 1),
                format_percentage(limits.max_exposure, 1)
            ),
        ));
    }
    errors.extend(validate_group_rules(&facts.group, limits));
    errors
}

/// Field rules and business rules together; all violations are reported.
pub fn validate_simulation_input(
    input: &SimulationInput,
    facts: &BusinessFacts,
    rules: &ValidationRules,
) -> ValidationReport {
    let mut errors = validate_fields(input, rules);
    errors.extend(validate_business(facts, &rules.business));
    let report = ValidationReport::from_errors(errors);
    debug!(valid = report.is_valid, errors = report.errors.len(), "validated simulation input");
    report
}

/// Build a group of `participants` each holding `credit`.
///
/// The participant count is checked before anything is allocated, so an
/// out-of-range count costs nothing.
pub fn uniform_group(
    participants: u32,
    credit: Decimal,
    limits: &BusinessLimits,
) -> Result<GroupProfile, ValidationReport> {
    match participants_error(participants, limits) {
        Some(err) => Err(ValidationReport::from_errors(vec![err])),
        None => Ok(GroupProfile::uniform(participants, credit)),
    }
}

/// Validate a group on its own.
pub fn validate_group(group: &GroupProfile, rules: &ValidationRules) -> ValidationReport {
    ValidationReport::from_errors(validate_group_rules(group, &rules.business))
}
