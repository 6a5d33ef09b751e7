#![deny(warnings)]

//! Headless CLI: run one pool simulation and print its projection.

use anyhow::{anyhow, bail, Context, Result};
use persistence::{default_state_dir, FileStorage};
use pool_core::format::{compact_currency, format_currency, format_percentage};
use pool_core::rules::{uniform_group, ValidationReport};
use pool_core::{checked_sum, PoolConfig, SimulationInput};
use pool_econ::{build_state, SimulationState};
use pool_runtime::{spawn_autosave, AppConfig, Pipeline, StateStore, SubmitError, SystemClock};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::cell::RefCell;
use std::fs;
use std::rc::Rc;
use tokio::task::LocalSet;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default)]
struct Args {
    config: Option<String>,
    scenario: Option<String>,
    credit: Option<Decimal>,
    term: Option<u32>,
    bid: Option<Decimal>,
    participants: Option<u32>,
    state_dir: Option<String>,
    version: bool,
}

fn parse_args() -> Result<Args> {
    let mut args = Args::default();
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        let mut value = || it.next().with_context(|| format!("{arg} needs a value"));
        match arg.as_str() {
            "--config" => args.config = Some(value()?),
            "--scenario" => args.scenario = Some(value()?),
            "--credit" => args.credit = Some(value()?.parse().context("--credit")?),
            "--term" => args.term = Some(value()?.parse().context("--term")?),
            "--bid" => args.bid = Some(value()?.parse().context("--bid")?),
            "--participants" => args.participants = Some(value()?.parse().context("--participants")?),
            "--state-dir" => args.state_dir = Some(value()?),
            "--version" | "-V" => args.version = true,
            other => bail!("unknown argument: {other}"),
        }
    }
    Ok(args)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::DEBUG)
        .init();

    let args = parse_args()?;
    if args.version {
        println!("cli {} ({})", env!("CARGO_PKG_VERSION"), env!("GIT_SHA"));
        return Ok(());
    }
    info!(?args, "starting CLI");

    let config = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    let state_dir = args
        .state_dir
        .clone()
        .unwrap_or_else(|| default_state_dir().to_string());
    let store = Rc::new(RefCell::new(StateStore::init(
        config.store.clone(),
        Box::new(FileStorage::new(&state_dir)),
        Box::new(SystemClock),
    )));
    store.borrow_mut().cleanup();

    let outcome = LocalSet::new()
        .run_until(async {
            let autosave = config.store.autosave_period().map(|period| {
                info!(?period, "auto-save enabled");
                spawn_autosave(Rc::clone(&store), period)
            });
            let outcome = match &args.scenario {
                Some(path) => run_scenario(&mut store.borrow_mut(), &config, path),
                None => run_request(&mut store.borrow_mut(), &config, &args),
            };
            if let Some(timer) = autosave {
                timer.abort();
            }
            outcome
        })
        .await;
    store.borrow().teardown();
    outcome
}

fn rejected(report: &ValidationReport) -> anyhow::Error {
    for e in &report.errors {
        eprintln!("  {:<20} {}", e.field.to_string(), e.message);
    }
    anyhow!("simulation rejected with {} error(s)", report.errors.len())
}

/// A full pool configuration from YAML, projected without request validation.
fn run_scenario(store: &mut StateStore, config: &AppConfig, path: &str) -> Result<()> {
    let text = fs::read_to_string(path).with_context(|| format!("reading scenario {path}"))?;
    let pool: PoolConfig =
        serde_yaml::from_str(&text).with_context(|| format!("parsing scenario {path}"))?;
    let model = config.model.model();
    let projection = build_state(&pool, model.as_ref())?;
    print_projection(&projection);
    store.set_projection(projection);
    Ok(())
}

fn run_request(store: &mut StateStore, config: &AppConfig, args: &Args) -> Result<()> {
    let input = SimulationInput {
        credit_value: args.credit.unwrap_or(Decimal::new(1_000_000, 0)),
        term_months: args.term.unwrap_or(120),
        down_payment_pct: args.bid.unwrap_or(Decimal::new(30, 0)),
    };
    let participants = args.participants.unwrap_or(200);
    let group = uniform_group(participants, input.credit_value, &config.validation.business)
        .map_err(|report| rejected(&report))?;

    let pipeline = Pipeline::new(config);
    let submission = match pipeline.submit(store, &input, &group) {
        Ok(s) => s,
        Err(SubmitError::Validation(report)) => return Err(rejected(&report)),
        Err(e) => return Err(e.into()),
    };

    let out = &submission.simulation.output;
    println!(
        "Quote | credit: {} | term: {} months | bid: {}%",
        format_currency(input.credit_value),
        input.term_months,
        input.down_payment_pct
    );
    println!(
        "      | installment: {} | total paid: {} | savings: {}{}",
        format_currency(out.installment),
        format_currency(out.total_paid),
        format_currency(out.total_savings),
        if submission.cached { " (cached)" } else { "" }
    );
    println!("KPIs");
    for kpi in store.state().kpis.iter() {
        println!(
            "  {:<22} {:>12}  trend {:>7}",
            kpi.label,
            kpi.display_value(),
            kpi.display_trend()
        );
    }
    print_projection(&submission.projection);
    Ok(())
}

fn print_projection(p: &SimulationState) {
    let m = &p.metrics;
    println!(
        "Metrics | P/C: {} | ROE: {} | exposure: {} ({}..{}) | efficiency: {} | yield coverage: {}",
        format_percentage(m.pc_ratio, 2),
        format_percentage(m.roe, 1),
        format_percentage(m.exposure.current, 1),
        format_percentage(m.exposure.min, 1),
        format_percentage(m.exposure.max, 1),
        format_percentage(m.efficiency.combined, 1),
        format_percentage(m.coverage.installment_coverage, 1),
    );

    println!("Timeline");
    for phase in &p.timeline {
        println!("  {:<10} months {:>3}-{:<3}", phase.name, phase.start_month, phase.end_month);
        for e in &phase.events {
            println!("    m{:<4} {}", e.month, e.detail);
        }
    }

    let total = |amounts: Option<Decimal>| {
        amounts
            .and_then(|d| d.to_f64())
            .map_or_else(|| "-".to_string(), compact_currency)
    };
    let inflow = total(checked_sum(p.cash_flow.iter().map(|e| e.inflow)));
    let outflow = total(checked_sum(p.cash_flow.iter().map(|e| e.outflow)));
    let trough = p
        .cash_flow
        .iter()
        .min_by_key(|e| e.cumulative_balance)
        .map(|e| (e.month, e.cumulative_balance));
    let closing = p
        .cash_flow
        .last()
        .map(|e| e.cumulative_balance)
        .unwrap_or(Decimal::ZERO);
    println!(
        "Cash flow | {} months | in: {} | out: {} | closing balance: {}",
        p.cash_flow.len(),
        inflow,
        outflow,
        format_currency(closing)
    );
    if let Some((month, balance)) = trough {
        println!("          | lowest balance {} at month {}", format_currency(balance), month);
    }
}
