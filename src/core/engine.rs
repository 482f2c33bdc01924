use super::error::ConfigError;
use super::series::value_at;
use super::types::{Rate, SimulationRequest, SimulationResult};

#[derive(Debug, Clone, Copy)]
struct YearStep {
    withdrawal: u64,
    end_balance: u64,
}

/// Runs one withdrawal plan through a rotation of historical years.
///
/// Each year withdraws first, then applies that year's return to what is
/// left. The first withdrawal is taken as given; later ones are escalated by
/// the inflation of the year they are taken in. Every monetary step truncates
/// toward zero, and because rates are fixed-point the only rounding is that
/// truncation. A balance that reaches zero stays at zero.
pub fn simulate(request: &SimulationRequest<'_>) -> Result<SimulationResult, ConfigError> {
    if request.returns.is_empty() {
        return Err(ConfigError::EmptySeries {
            name: "returns".to_string(),
        });
    }
    if request.inflation.is_empty() {
        return Err(ConfigError::EmptySeries {
            name: "inflation".to_string(),
        });
    }
    if request.horizon == 0 {
        return Err(ConfigError::ZeroHorizon);
    }

    let horizon = request.horizon as usize;
    let mut trajectory = Vec::with_capacity(horizon);
    let mut withdrawals = Vec::with_capacity(horizon);
    let mut depleted_year = None;

    let mut balance = request.starting_balance;
    let mut withdrawal = request.annual_withdrawal;

    // Reduce per series before stepping so offsets near i64::MAX cannot overflow.
    let returns_start = wrapped_start(request.returns, request.starting_year_offset);
    let inflation_start = wrapped_start(request.inflation, request.starting_year_offset);

    for year_index in 0..request.horizon {
        let step_offset = i64::from(year_index);
        let growth = value_at(request.returns, returns_start + step_offset).unwrap_or(Rate::ZERO);
        let inflation =
            value_at(request.inflation, inflation_start + step_offset).unwrap_or(Rate::ZERO);

        if year_index > 0 {
            withdrawal = escalate_withdrawal(withdrawal, inflation);
        }
        let step = run_year(balance, withdrawal, growth);

        balance = step.end_balance;
        if balance == 0 && depleted_year.is_none() {
            depleted_year = Some(year_index);
        }
        trajectory.push(step.end_balance);
        withdrawals.push(step.withdrawal);
    }

    Ok(SimulationResult {
        terminal_balance: balance,
        depleted_year,
        trajectory,
        withdrawals,
    })
}

fn wrapped_start(values: &[Rate], offset: i64) -> i64 {
    offset.rem_euclid(values.len() as i64)
}

fn escalate_withdrawal(previous: u64, inflation: Rate) -> u64 {
    to_money(inflation.grow(i128::from(previous)))
}

fn run_year(balance: u64, withdrawal: u64, growth: Rate) -> YearStep {
    let remaining = i128::from(balance) - i128::from(withdrawal);
    // Growth is never applied to a non-positive remainder; a return below
    // -100% would otherwise turn a shortfall back into a balance.
    let end_balance = if remaining <= 0 {
        0
    } else {
        to_money(growth.grow(remaining))
    };
    YearStep {
        withdrawal,
        end_balance,
    }
}

/// Floors at zero and saturates at `u64::MAX`.
fn to_money(amount: i128) -> u64 {
    if amount <= 0 {
        0
    } else {
        u64::try_from(amount).unwrap_or(u64::MAX)
    }
}
