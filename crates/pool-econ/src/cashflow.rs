//! Cash-flow projection.

use pool_core::{validate_tranches, CashFlowEntry, ConfigError, PoolConfig};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Bid amount disbursed in each month that has a tranche.
///
/// The last tranche takes whatever the earlier ones left, so the amounts
/// always add up to `total_bid_value` exactly.
pub fn tranche_schedule(config: &PoolConfig) -> Result<BTreeMap<u32, Decimal>, ConfigError> {
    validate_tranches(&config.tranches, config.term_months)?;
    let mut schedule = BTreeMap::new();
    let mut allocated = Decimal::ZERO;
    let last = config.tranches.len().saturating_sub(1);
    let overflow = || ConfigError::Overflow("tranche schedule");
    for (i, t) in config.tranches.iter().enumerate() {
        let amount = if i == last {
            config.total_bid_value.checked_sub(allocated)
        } else {
            config.total_bid_value.checked_mul(t.fraction)
        }
        .ok_or_else(overflow)?;
        allocated = allocated.checked_add(amount).ok_or_else(overflow)?;
        let slot = schedule.entry(t.month).or_insert(Decimal::ZERO);
        *slot = slot.checked_add(amount).ok_or_else(overflow)?;
    }
    Ok(schedule)
}

/// Project one [`CashFlowEntry`] per month of the term.
///
/// outflow = pool installment + tranche due that month;
/// inflow = idle balance * annual yield / 12.
///
/// Amounts that leave the `Decimal` range fail with [`ConfigError::Overflow`].
///
/// Example:
/// let flow = generate_cash_flow(&PoolConfig::reference()).unwrap();
/// assert_eq!(flow.len(), 48);
pub fn generate_cash_flow(config: &PoolConfig) -> Result<Vec<CashFlowEntry>, ConfigError> {
    let schedule = tranche_schedule(config)?;
    let inflow = config.monthly_yield()?;
    let mut entries = Vec::with_capacity(config.term_months as usize);
    let mut cumulative = Decimal::ZERO;
    for month in 1..=config.term_months {
        let bid = schedule.get(&month).copied().unwrap_or(Decimal::ZERO);
        let outflow = config
            .total_monthly_installment
            .checked_add(bid)
            .ok_or(ConfigError::Overflow("monthly outflow"))?;
        let net_balance = inflow
            .checked_sub(outflow)
            .ok_or(ConfigError::Overflow("net balance"))?;
        cumulative = cumulative
            .checked_add(net_balance)
            .ok_or(ConfigError::Overflow("cumulative balance"))?;
        entries.push(CashFlowEntry {
            month,
            inflow,
            outflow,
            net_balance,
            cumulative_balance: cumulative,
        });
    }
    Ok(entries)
}
