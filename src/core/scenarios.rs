use log::{debug, info};
use rayon::prelude::*;

use super::engine::simulate;
use super::error::ConfigError;
use super::series::{ReturnSeries, SeriesStore};
use super::types::{
    ScenarioKey, ScenarioPlan, ScenarioResults, SimulationRequest, SimulationResult, SweepSummary,
};

/// Runs every (starting year, investment type) pair in `plan`.
///
/// Investment types are resolved before anything runs, so an unknown name
/// fails the whole plan. Runs are independent and execute on the rayon pool;
/// results are merged by key.
pub fn run_scenarios(
    store: &SeriesStore,
    plan: &ScenarioPlan,
) -> Result<ScenarioResults, ConfigError> {
    if plan.horizon == 0 {
        return Err(ConfigError::ZeroHorizon);
    }
    let resolved = resolve_types(store, &plan.investment_types)?;
    let jobs: Vec<(i32, &ReturnSeries)> = plan
        .starting_years
        .iter()
        .flat_map(|&year| resolved.iter().map(move |&series| (year, series)))
        .collect();
    info!(
        "running {} scenarios ({} starting years x {} investment types, {} year horizon)",
        jobs.len(),
        plan.starting_years.len(),
        resolved.len(),
        plan.horizon
    );

    jobs.into_par_iter()
        .map(|(starting_year, series)| -> Result<_, ConfigError> {
            let result = run_one(store, plan, series, store.offset_for_year(starting_year))?;
            debug!(
                "{} from {starting_year}: terminal balance {}",
                series.name(),
                result.terminal_balance
            );
            let key = ScenarioKey {
                starting_year,
                investment_type: series.name().to_string(),
            };
            Ok((key, result))
        })
        .collect()
}

/// Runs every recorded starting year for each investment type in `plan`.
///
/// `plan.starting_years` is ignored: the sweep covers offsets
/// `0..len(returns)` of each series, i.e. every historical start the data
/// supports. Summaries come back in the order the types were requested.
pub fn sweep_starting_years(
    store: &SeriesStore,
    plan: &ScenarioPlan,
) -> Result<Vec<SweepSummary>, ConfigError> {
    if plan.horizon == 0 {
        return Err(ConfigError::ZeroHorizon);
    }
    let resolved = resolve_types(store, &plan.investment_types)?;
    info!(
        "sweeping all starting years for {} investment types",
        resolved.len()
    );

    resolved
        .into_iter()
        .map(|series| -> Result<SweepSummary, ConfigError> {
            let mut outcomes = (0..series.years() as i64)
                .into_par_iter()
                .map(|offset| {
                    run_one(store, plan, series, offset)
                        .map(|result| (store.year_for_offset(offset), result))
                })
                .collect::<Result<Vec<_>, _>>()?;
            outcomes.sort_by_key(|(year, _)| *year);
            Ok(summarize(series.name(), &outcomes))
        })
        .collect()
}

fn resolve_types<'s>(
    store: &'s SeriesStore,
    names: &[String],
) -> Result<Vec<&'s ReturnSeries>, ConfigError> {
    names.iter().map(|name| store.returns(name)).collect()
}

fn run_one(
    store: &SeriesStore,
    plan: &ScenarioPlan,
    series: &ReturnSeries,
    starting_year_offset: i64,
) -> Result<SimulationResult, ConfigError> {
    simulate(&SimulationRequest {
        starting_balance: plan.starting_balance,
        annual_withdrawal: plan.annual_withdrawal,
        starting_year_offset,
        horizon: plan.horizon,
        returns: series.as_slice(),
        inflation: store.inflation().as_slice(),
    })
}

fn summarize(investment_type: &str, outcomes: &[(i32, SimulationResult)]) -> SweepSummary {
    let runs = outcomes.len() as u32;
    let depleted_runs = outcomes.iter().filter(|(_, r)| r.is_depleted()).count() as u32;
    let success_rate = if runs == 0 {
        0.0
    } else {
        f64::from(runs - depleted_runs) / f64::from(runs)
    };

    let mut terminals = outcomes
        .iter()
        .map(|(_, r)| r.terminal_balance)
        .collect::<Vec<_>>();
    terminals.sort_unstable();
    let median_terminal_balance = terminals.get(terminals.len() / 2).copied().unwrap_or(0);

    // Earliest year wins ties: outcomes are sorted by year and min_by_key keeps the first.
    let (worst_starting_year, worst_terminal_balance) = outcomes
        .iter()
        .min_by_key(|(_, r)| r.terminal_balance)
        .map(|(year, r)| (*year, r.terminal_balance))
        .unwrap_or((0, 0));

    SweepSummary {
        investment_type: investment_type.to_string(),
        runs,
        depleted_runs,
        success_rate,
        median_terminal_balance,
        worst_starting_year,
        worst_terminal_balance,
    }
}
