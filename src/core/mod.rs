mod engine;
mod error;
mod scenarios;
mod series;
mod types;

pub use engine::simulate;
pub use error::{ConfigError, SeriesError};
pub use scenarios::{run_scenarios, sweep_starting_years};
pub use series::{ReturnSeries, SeriesStore, load_series, parse_series, value_at};
pub use types::{
    DEFAULT_HORIZON, INFLATION_FILE_NAME, InvestmentType, Rate, ScenarioKey, ScenarioPlan,
    ScenarioResults, SimulationRequest, SimulationResult, SweepSummary,
};
