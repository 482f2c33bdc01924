use std::collections::BTreeMap;

use serde::Serialize;

pub const DEFAULT_HORIZON: u32 = 30;

/// Annual return or inflation as a fixed-point count of hundred-thousandths.
///
/// `0.0734` (7.34%) is stored as `7340`. Five decimal places is the precision
/// series files are rounded to on load, so every rate the engine sees is
/// exact and growth can be applied with integer arithmetic.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Rate(i64);

impl Rate {
    pub const SCALE: i64 = 100_000;
    pub const ZERO: Rate = Rate(0);

    pub const fn from_scaled(scaled: i64) -> Self {
        Self(scaled)
    }

    /// Rounds half away from zero to five decimal places.
    pub fn from_decimal(value: f64) -> Self {
        Self((value * Self::SCALE as f64).round() as i64)
    }

    /// `7.34` percent becomes `0.07340`.
    pub fn from_percent(value: f64) -> Self {
        Self((value * (Self::SCALE / 100) as f64).round() as i64)
    }

    pub const fn scaled(self) -> i64 {
        self.0
    }

    pub fn as_decimal(self) -> f64 {
        self.0 as f64 / Self::SCALE as f64
    }

    /// `trunc(amount * (1 + self))`, exact until the final truncation.
    pub fn grow(self, amount: i128) -> i128 {
        amount * i128::from(Self::SCALE + self.0) / i128::from(Self::SCALE)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum InvestmentType {
    Bonds,
    Stocks,
    SbBlend,
    SbcBlend,
}

impl InvestmentType {
    pub const ALL: [InvestmentType; 4] = [
        InvestmentType::Bonds,
        InvestmentType::Stocks,
        InvestmentType::SbBlend,
        InvestmentType::SbcBlend,
    ];

    pub fn name(self) -> &'static str {
        match self {
            InvestmentType::Bonds => "bonds",
            InvestmentType::Stocks => "stocks",
            InvestmentType::SbBlend => "sb_blend",
            InvestmentType::SbcBlend => "sbc_blend",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            InvestmentType::Bonds => "10-yr Treasury Bond",
            InvestmentType::Stocks => "S&P 500",
            InvestmentType::SbBlend => "50% S&P 500/50% TBond",
            InvestmentType::SbcBlend => "40% S&P 500/50% TBond/10% Cash",
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            InvestmentType::Bonds => "10-yr_TBond_returns_1926-2013_pct.txt",
            InvestmentType::Stocks => "SP500_returns_1926-2013_pct.txt",
            InvestmentType::SbBlend => "S-B_blend_1926-2013_pct.txt",
            InvestmentType::SbcBlend => "S-B-C_blend_1926-2013_pct.txt",
        }
    }
}

pub const INFLATION_FILE_NAME: &str = "annual_infl_rate_1926-2013_pct.txt";

#[derive(Debug, Clone, Copy)]
pub struct SimulationRequest<'a> {
    pub starting_balance: u64,
    /// First-year withdrawal in today's money.
    pub annual_withdrawal: u64,
    /// Index of the first simulated year; wraps modulo each series length.
    pub starting_year_offset: i64,
    pub horizon: u32,
    pub returns: &'a [Rate],
    pub inflation: &'a [Rate],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    pub terminal_balance: u64,
    /// Year index of the first zero balance, if the account ran dry.
    pub depleted_year: Option<u32>,
    pub trajectory: Vec<u64>,
    pub withdrawals: Vec<u64>,
}

impl SimulationResult {
    pub fn is_depleted(&self) -> bool {
        self.depleted_year.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct ScenarioPlan {
    pub starting_balance: u64,
    pub annual_withdrawal: u64,
    pub horizon: u32,
    pub starting_years: Vec<i32>,
    pub investment_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScenarioKey {
    pub starting_year: i32,
    pub investment_type: String,
}

pub type ScenarioResults = BTreeMap<ScenarioKey, SimulationResult>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepSummary {
    pub investment_type: String,
    pub runs: u32,
    pub depleted_runs: u32,
    pub success_rate: f64,
    pub median_terminal_balance: u64,
    pub worst_starting_year: i32,
    pub worst_terminal_balance: u64,
}
