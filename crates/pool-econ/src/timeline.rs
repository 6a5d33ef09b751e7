//! Timeline derivation: entry, execution and exit phases with their events.

use pool_core::{
    phase_boundaries, validate_tranches, ConfigError, EventKind, PhaseKind, PoolConfig,
    TimelineEvent, TimelinePhase,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Partition `1..=term_months` into the three phases and attach events.
pub fn derive_timeline(config: &PoolConfig) -> Result<Vec<TimelinePhase>, ConfigError> {
    validate_tranches(&config.tranches, config.term_months)?;
    let plan = &config.phase_plan;
    let last_tranche = config.last_tranche_month().unwrap_or(1);
    let (entry_end, exit_start) = phase_boundaries(plan, last_tranche, config.term_months)?;

    let entry = phase(PhaseKind::Entry, 1, entry_end, bid_events(config));
    let execution = phase(
        PhaseKind::Execution,
        entry_end + 1,
        exit_start - 1,
        correction_events(entry_end + 1, exit_start - 1, plan.correction_period_months),
    );
    let term = config.term_months;
    let exit = phase(
        PhaseKind::Exit,
        exit_start,
        term,
        vec![
            TimelineEvent {
                month: term - plan.exit_preparation_months,
                kind: EventKind::Exit,
                quantity: None,
                detail: "Exit process starts".to_string(),
            },
            TimelineEvent {
                month: term,
                kind: EventKind::Exit,
                quantity: None,
                detail: "Cycle completion".to_string(),
            },
        ],
    );
    Ok(vec![entry, execution, exit])
}

fn phase(kind: PhaseKind, start: u32, end: u32, events: Vec<TimelineEvent>) -> TimelinePhase {
    TimelinePhase {
        kind,
        name: kind.label().to_string(),
        start_month: start,
        end_month: end,
        events,
    }
}

/// One bid event per tranche, contemplating quotas in proportion to its fraction.
fn bid_events(config: &PoolConfig) -> Vec<TimelineEvent> {
    let mut tranches: Vec<_> = config.tranches.iter().collect();
    tranches.sort_by_key(|t| t.month);
    let quotas = Decimal::from(config.quota_count);
    let mut remaining = config.quota_count;
    let mut next_quota = 1;
    let last = tranches.len().saturating_sub(1);
    tranches
        .iter()
        .enumerate()
        .map(|(i, t)| {
            let count = if i == last {
                remaining
            } else {
                (t.fraction * quotas)
                    .round()
                    .to_u32()
                    .unwrap_or(0)
                    .min(remaining)
            };
            let event = TimelineEvent {
                month: t.month,
                kind: EventKind::Bid,
                quantity: Some(count),
                detail: contemplation_detail(next_quota, count),
            };
            remaining -= count;
            next_quota += count;
            event
        })
        .collect()
}

fn contemplation_detail(first: u32, count: u32) -> String {
    match count {
        0 => "No quotas contemplated".to_string(),
        1 => format!("Contemplation of quota {first}"),
        2 => format!("Contemplation of quotas {first} and {}", first + 1),
        _ => format!("Contemplation of quotas {first} to {}", first + count - 1),
    }
}

/// Index correction milestones at every multiple of `period` inside `[start, end]`.
fn correction_events(start: u32, end: u32, period: u32) -> Vec<TimelineEvent> {
    (start..=end)
        .filter(|m| m % period == 0)
        .map(|month| TimelineEvent {
            month,
            kind: EventKind::Milestone,
            quantity: None,
            detail: format!("Index correction #{}", month / period),
        })
        .collect()
}
