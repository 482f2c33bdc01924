use axum::{
    Router,
    extract::{Json, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::core::{
    ConfigError, DEFAULT_HORIZON, InvestmentType, ScenarioPlan, SeriesStore, SimulationResult,
    SweepSummary, run_scenarios, sweep_starting_years,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliInvestmentType {
    Bonds,
    Stocks,
    #[value(name = "sb_blend", alias = "sb-blend")]
    SbBlend,
    #[value(name = "sbc_blend", alias = "sbc-blend")]
    SbcBlend,
}

impl From<CliInvestmentType> for InvestmentType {
    fn from(value: CliInvestmentType) -> Self {
        match value {
            CliInvestmentType::Bonds => InvestmentType::Bonds,
            CliInvestmentType::Stocks => InvestmentType::Stocks,
            CliInvestmentType::SbBlend => InvestmentType::SbBlend,
            CliInvestmentType::SbcBlend => InvestmentType::SbcBlend,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ApiInvestmentType {
    Bonds,
    Stocks,
    #[serde(alias = "sb-blend", alias = "sbBlend")]
    SbBlend,
    #[serde(alias = "sbc-blend", alias = "sbcBlend")]
    SbcBlend,
}

impl From<ApiInvestmentType> for CliInvestmentType {
    fn from(value: ApiInvestmentType) -> Self {
        match value {
            ApiInvestmentType::Bonds => CliInvestmentType::Bonds,
            ApiInvestmentType::Stocks => CliInvestmentType::Stocks,
            ApiInvestmentType::SbBlend => CliInvestmentType::SbBlend,
            ApiInvestmentType::SbcBlend => CliInvestmentType::SbcBlend,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "nest-egg",
    about = "Historical-rotation retirement withdrawal simulator (bonds, stocks and blends)"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Simulate each starting year against each investment type
    Run {
        #[command(flatten)]
        data: DataArgs,
        #[command(flatten)]
        plan: PlanArgs,
        #[arg(long, help = "Print the full result set as JSON")]
        json: bool,
    },
    /// Simulate every recorded starting year and summarize depletion per investment type
    Sweep {
        #[command(flatten)]
        data: DataArgs,
        #[command(flatten)]
        plan: PlanArgs,
        #[arg(long, help = "Print the summaries as JSON")]
        json: bool,
    },
    /// Serve the simulator over HTTP
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
        #[command(flatten)]
        data: DataArgs,
    },
}

#[derive(Args, Debug, Clone)]
struct DataArgs {
    #[arg(
        long,
        default_value = "data",
        help = "Directory holding the percent-per-line return and inflation files"
    )]
    data_dir: PathBuf,
    #[arg(
        long,
        default_value_t = 0,
        help = "Calendar year of the first line in every series file; 0 indexes series by the raw year"
    )]
    origin_year: i32,
}

#[derive(Args, Debug, Clone)]
struct PlanArgs {
    #[arg(
        long,
        default_value_t = 2_000_000,
        help = "Starting value of investments"
    )]
    start_value: u64,
    #[arg(
        long,
        default_value_t = 80_000,
        help = "Annual pre-tax withdrawal (today's money)"
    )]
    withdrawal: u64,
    #[arg(long, default_value_t = DEFAULT_HORIZON, help = "Years to fund through")]
    horizon: u32,
    #[arg(
        long = "start-year",
        default_values_t = [1980, 1981],
        help = "Calendar year the plan starts in; repeat for several"
    )]
    start_years: Vec<i32>,
    #[arg(
        long = "investment-type",
        value_enum,
        help = "Investment type to simulate; repeat for several, defaults to all"
    )]
    investment_types: Vec<CliInvestmentType>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulatePayload {
    start_value: Option<u64>,
    withdrawal: Option<u64>,
    horizon: Option<u32>,
    start_years: Option<Vec<i32>>,
    investment_types: Option<Vec<ApiInvestmentType>>,
}

/// Query-string form of [`SimulatePayload`]; lists are comma separated.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulateQuery {
    start_value: Option<u64>,
    withdrawal: Option<u64>,
    horizon: Option<u32>,
    start_years: Option<String>,
    investment_types: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScenarioResponse {
    starting_year: i32,
    investment_type: String,
    #[serde(flatten)]
    result: SimulationResult,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulateResponse {
    start_value: u64,
    withdrawal: u64,
    horizon: u32,
    origin_year: i32,
    scenarios: Vec<ScenarioResponse>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SweepResponse {
    start_value: u64,
    withdrawal: u64,
    horizon: u32,
    origin_year: i32,
    summaries: Vec<SweepSummary>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn build_plan(args: PlanArgs) -> Result<ScenarioPlan, String> {
    if args.start_value == 0 {
        return Err("--start-value must be > 0".to_string());
    }

    if args.horizon == 0 {
        return Err("--horizon must be > 0".to_string());
    }

    let investment_types = if args.investment_types.is_empty() {
        InvestmentType::ALL.to_vec()
    } else {
        let mut types = Vec::with_capacity(args.investment_types.len());
        for t in args.investment_types {
            let t = InvestmentType::from(t);
            if !types.contains(&t) {
                types.push(t);
            }
        }
        types
    };

    Ok(ScenarioPlan {
        starting_balance: args.start_value,
        annual_withdrawal: args.withdrawal,
        horizon: args.horizon,
        starting_years: args.start_years,
        investment_types: investment_types
            .into_iter()
            .map(|t| t.name().to_string())
            .collect(),
    })
}

/// Only `run` and `/api/simulate` need starting years; the sweep covers them all.
fn require_start_years(plan: &ScenarioPlan) -> Result<(), String> {
    if plan.starting_years.is_empty() {
        return Err("at least one --start-year is required".to_string());
    }
    Ok(())
}

fn load_store(data: &DataArgs) -> Result<SeriesStore, String> {
    SeriesStore::load_dir(&data.data_dir, data.origin_year)
        .map_err(|e| format!("{e}\nTerminating program."))
}

/// Dispatches a parsed command line. Errors are meant for stderr.
pub async fn run_cli(cli: Cli) -> Result<(), String> {
    match cli.command {
        Command::Run { data, plan, json } => {
            let plan = build_plan(plan)?;
            require_start_years(&plan)?;
            let store = load_store(&data)?;
            let response = build_simulate_response(&store, &plan).map_err(|e| e.to_string())?;
            if json {
                println!("{}", to_json(&response)?);
            } else {
                print!("{}", render_simulate_report(&response));
            }
            Ok(())
        }
        Command::Sweep { data, plan, json } => {
            let plan = build_plan(plan)?;
            let store = load_store(&data)?;
            let response = build_sweep_response(&store, &plan).map_err(|e| e.to_string())?;
            if json {
                println!("{}", to_json(&response)?);
            } else {
                print!("{}", render_sweep_report(&response));
            }
            Ok(())
        }
        Command::Serve { port, data } => {
            let store = load_store(&data)?;
            run_http_server(port, store)
                .await
                .map_err(|e| format!("Server error: {e}"))
        }
    }
}

fn to_json<T: Serialize>(body: &T) -> Result<String, String> {
    serde_json::to_string_pretty(body).map_err(|e| format!("failed to encode JSON: {e}"))
}

fn build_simulate_response(
    store: &SeriesStore,
    plan: &ScenarioPlan,
) -> Result<SimulateResponse, ConfigError> {
    let results = run_scenarios(store, plan)?;
    let scenarios = results
        .into_iter()
        .map(|(key, result)| ScenarioResponse {
            starting_year: key.starting_year,
            investment_type: key.investment_type,
            result,
        })
        .collect();

    Ok(SimulateResponse {
        start_value: plan.starting_balance,
        withdrawal: plan.annual_withdrawal,
        horizon: plan.horizon,
        origin_year: store.origin_year(),
        scenarios,
    })
}

fn build_sweep_response(
    store: &SeriesStore,
    plan: &ScenarioPlan,
) -> Result<SweepResponse, ConfigError> {
    Ok(SweepResponse {
        start_value: plan.starting_balance,
        withdrawal: plan.annual_withdrawal,
        horizon: plan.horizon,
        origin_year: store.origin_year(),
        summaries: sweep_starting_years(store, plan)?,
    })
}

fn render_simulate_report(response: &SimulateResponse) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "\nStarting value: ${}\n",
        format_money(response.start_value)
    ));
    out.push_str(&format!(
        "Annual withdrawal: ${}\n",
        format_money(response.withdrawal)
    ));

    let mut current_year = None;
    for scenario in &response.scenarios {
        if current_year != Some(scenario.starting_year) {
            current_year = Some(scenario.starting_year);
            out.push_str(&format!(
                "\nFinal outcomes starting from {} ({} years):\n",
                scenario.starting_year, response.horizon
            ));
        }
        let depleted = match scenario.result.depleted_year {
            Some(idx) => format!(
                " (depleted in {})",
                i64::from(scenario.starting_year) + i64::from(idx)
            ),
            None => String::new(),
        };
        out.push_str(&format!(
            "${} with {} investment{}\n",
            format_money(scenario.result.terminal_balance),
            scenario.investment_type,
            depleted
        ));
    }
    out
}

fn render_sweep_report(response: &SweepResponse) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "\nStarting value: ${}\nAnnual withdrawal: ${}\nHorizon: {} years\n\n",
        format_money(response.start_value),
        format_money(response.withdrawal),
        response.horizon
    ));
    for s in &response.summaries {
        out.push_str(&format!(
            "{:>9}: {:>5.1}% of {} starts survived, median end ${}, worst start {} (${})\n",
            s.investment_type,
            s.success_rate * 100.0,
            s.runs,
            format_money(s.median_terminal_balance),
            s.worst_starting_year,
            format_money(s.worst_terminal_balance)
        ));
    }
    out
}

fn format_money(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

type SharedStore = Arc<SeriesStore>;

pub async fn run_http_server(port: u16, store: SeriesStore) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = router(Arc::new(store));

    let listener = TcpListener::bind(addr).await?;
    info!("nest-egg HTTP API listening on http://{addr}");
    info!("Local access: http://127.0.0.1:{port}/api/simulate");

    axum::serve(listener, app).await
}

fn router(store: SharedStore) -> Router {
    Router::new()
        .route(
            "/api/simulate",
            get(simulate_get_handler).post(simulate_post_handler),
        )
        .route("/api/sweep", get(sweep_get_handler).post(sweep_post_handler))
        .fallback(not_found_handler)
        .with_state(store)
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn simulate_get_handler(
    State(store): State<SharedStore>,
    Query(query): Query<SimulateQuery>,
) -> Response {
    match payload_from_query(query) {
        Ok(payload) => simulate_handler_impl(store, payload).await,
        Err(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
    }
}

async fn simulate_post_handler(
    State(store): State<SharedStore>,
    Json(payload): Json<SimulatePayload>,
) -> Response {
    simulate_handler_impl(store, payload).await
}

async fn sweep_get_handler(
    State(store): State<SharedStore>,
    Query(query): Query<SimulateQuery>,
) -> Response {
    match payload_from_query(query) {
        Ok(payload) => sweep_handler_impl(store, payload).await,
        Err(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
    }
}

async fn sweep_post_handler(
    State(store): State<SharedStore>,
    Json(payload): Json<SimulatePayload>,
) -> Response {
    sweep_handler_impl(store, payload).await
}

async fn simulate_handler_impl(store: SharedStore, payload: SimulatePayload) -> Response {
    let plan = match plan_from_payload(payload)
        .and_then(|plan| require_start_years(&plan).map(|()| plan))
    {
        Ok(plan) => plan,
        Err(msg) => {
            warn!("rejected simulate request: {msg}");
            return error_response(StatusCode::BAD_REQUEST, &msg);
        }
    };

    let outcome =
        tokio::task::spawn_blocking(move || build_simulate_response(&store, &plan)).await;
    match outcome {
        Ok(Ok(response)) => json_response(StatusCode::OK, response),
        Ok(Err(e)) => error_response(StatusCode::BAD_REQUEST, &e.to_string()),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

async fn sweep_handler_impl(store: SharedStore, payload: SimulatePayload) -> Response {
    let plan = match plan_from_payload(payload) {
        Ok(plan) => plan,
        Err(msg) => {
            warn!("rejected sweep request: {msg}");
            return error_response(StatusCode::BAD_REQUEST, &msg);
        }
    };

    let outcome = tokio::task::spawn_blocking(move || build_sweep_response(&store, &plan)).await;
    match outcome {
        Ok(Ok(response)) => json_response(StatusCode::OK, response),
        Ok(Err(e)) => error_response(StatusCode::BAD_REQUEST, &e.to_string()),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
fn plan_from_json(json: &str) -> Result<ScenarioPlan, String> {
    let payload = serde_json::from_str::<SimulatePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    plan_from_payload(payload)
}

fn payload_from_query(query: SimulateQuery) -> Result<SimulatePayload, String> {
    let start_years = query
        .start_years
        .map(|list| {
            split_list(&list)
                .map(|year| {
                    year.parse::<i32>()
                        .map_err(|_| format!("startYears: `{year}` is not a year"))
                })
                .collect::<Result<Vec<_>, _>>()
        })
        .transpose()?;

    let investment_types = query
        .investment_types
        .map(|list| {
            split_list(&list)
                .map(|name| {
                    serde_json::from_value::<ApiInvestmentType>(serde_json::Value::String(
                        name.to_string(),
                    ))
                    .map_err(|_| format!("investmentTypes: unknown investment type `{name}`"))
                })
                .collect::<Result<Vec<_>, _>>()
        })
        .transpose()?;

    Ok(SimulatePayload {
        start_value: query.start_value,
        withdrawal: query.withdrawal,
        horizon: query.horizon,
        start_years,
        investment_types,
    })
}

fn split_list(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn plan_from_payload(payload: SimulatePayload) -> Result<ScenarioPlan, String> {
    let mut args = default_plan_args();

    if let Some(v) = payload.start_value {
        args.start_value = v;
    }
    if let Some(v) = payload.withdrawal {
        args.withdrawal = v;
    }
    if let Some(v) = payload.horizon {
        args.horizon = v;
    }
    if let Some(v) = payload.start_years {
        args.start_years = v;
    }
    if let Some(v) = payload.investment_types {
        args.investment_types = v.into_iter().map(CliInvestmentType::from).collect();
    }

    build_plan(args)
}

fn default_plan_args() -> PlanArgs {
    PlanArgs {
        start_value: 2_000_000,
        withdrawal: 80_000,
        horizon: DEFAULT_HORIZON,
        start_years: vec![1980, 1981],
        investment_types: Vec::new(),
    }
}
