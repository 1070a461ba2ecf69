//! Per-tool argument parsing and query dispatch.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};

use super::HandlerError;
use crate::query::drivers::{DEFAULT_COMBINED_DRIVERS, DEFAULT_TOP_DRIVERS};
use crate::query::historical::DEFAULT_MOVING_AVERAGE_WINDOW;
use crate::query::negotiation::PriceDirection;
use crate::query::recommendations::{DEFAULT_MONTHS_AHEAD, DEFAULT_QUANTITY};
use crate::query::{date_arg, optional_range, QueryEngine, QueryError};

pub(super) type Handler = fn(&QueryEngine, Value) -> Result<Value, HandlerError>;

pub(super) const DEFAULT_TOP_N: u32 = DEFAULT_TOP_DRIVERS as u32;
pub(super) const DEFAULT_COMBINED_N: u32 = DEFAULT_COMBINED_DRIVERS as u32;
pub(super) const DEFAULT_WINDOW: u32 = DEFAULT_MOVING_AVERAGE_WINDOW as u32;
pub(super) const DEFAULT_HORIZON: u32 = DEFAULT_MONTHS_AHEAD;
pub(super) const DEFAULT_UNITS: u32 = DEFAULT_QUANTITY;

/// Date words that mean "latest" for history.
const HISTORICAL_DATE_KEYWORDS: &[&str] = &["latest", "current", "now"];
/// Date words that mean "use the horizon" for forecasts.
const FORECAST_DATE_KEYWORDS: &[&str] = &["latest", "next", "soon"];

pub(super) fn lookup(name: &str) -> Option<Handler> {
    let handler: Handler = match name {
        "query_historical_data" => query_historical_data,
        "query_forecast_data" => query_forecast_data,
        "analyze_market_drivers" => analyze_market_drivers,
        "compare_commodities" => compare_commodities,
        "recommend_forward_buy" => recommend_forward_buy,
        "calculate_impact_analysis" => calculate_impact_analysis,
        "analyze_multi_commodity_scenario" => analyze_multi_commodity_scenario,
        "recommend_production_sequencing" => recommend_production_sequencing,
        "generate_negotiation_talking_points" => generate_negotiation_talking_points,
        "validate_supplier_claim" => validate_supplier_claim,
        "identify_driver_arguments" => identify_driver_arguments,
        "analyze_price_history" => analyze_price_history,
        "analyze_forecast_distribution" => analyze_forecast_distribution,
        "analyze_commodity_relationships" => analyze_commodity_relationships,
        _ => return None,
    };
    Some(handler)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse<T: DeserializeOwned>(args: Value) -> Result<T, HandlerError> {
    serde_json::from_value(args).map_err(|e| HandlerError::Args(e.to_string()))
}

/// `head` fields first, then the serialized `body` flattened in.
fn merge(head: Value, body: impl Serialize) -> Result<Value, HandlerError> {
    let mut out = match head {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    match serde_json::to_value(body)? {
        Value::Object(fields) => out.extend(fields),
        other => {
            out.insert("result".into(), other);
        }
    }
    Ok(Value::Object(out))
}

fn plain(body: impl Serialize) -> Result<Value, HandlerError> {
    Ok(serde_json::to_value(body)?)
}

/// Drop blank dates and the given keywords.
fn explicit_date(date: Option<String>, keywords: &[&str]) -> Option<String> {
    date.filter(|d| {
        let d = d.trim().to_ascii_lowercase();
        !d.is_empty() && !keywords.contains(&d.as_str())
    })
}

fn names(list: &[String]) -> Vec<&str> {
    list.iter().map(String::as_str).collect()
}

fn required_date(date: Option<String>, keywords: &[&str], analysis: &str) -> Result<String, QueryError> {
    explicit_date(date, keywords)
        .ok_or_else(|| QueryError::invalid_argument("date", format!("a YYYY-MM-DD date is required for {analysis}")))
}

fn default_one() -> u32 {
    1
}

fn default_horizon() -> u32 {
    DEFAULT_MONTHS_AHEAD
}

fn default_quantity() -> u32 {
    DEFAULT_QUANTITY
}

fn default_top_n() -> usize {
    DEFAULT_TOP_DRIVERS
}

fn default_direction() -> String {
    "increase".to_string()
}

/// Signed horizons; anything below 1 clamps to 0, which the engine reports
/// as out of range.
fn horizon<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let months = i64::deserialize(deserializer)?;
    Ok(u32::try_from(months.max(0)).unwrap_or(u32::MAX))
}

fn optional_horizon<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    let months = Option::<i64>::deserialize(deserializer)?;
    Ok(months.map(|m| u32::try_from(m.max(0)).unwrap_or(u32::MAX)))
}

// ---------------------------------------------------------------------------
// Composite tools
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct HistoricalArgs {
    dataset_name: String,
    date: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
}

fn query_historical_data(engine: &QueryEngine, args: Value) -> Result<Value, HandlerError> {
    let args: HistoricalArgs = parse(args)?;
    let dataset = args.dataset_name.as_str();

    if let (Some(start), Some(end)) = (&args.start_date, &args.end_date) {
        let values = engine.values_by_range(dataset, date_arg(start)?, date_arg(end)?)?;
        return Ok(json!({
            "query_type": "range",
            "dataset": dataset,
            "start_date": start,
            "end_date": end,
            "values": values,
            "count": values.len(),
        }));
    }

    match explicit_date(args.date, HISTORICAL_DATE_KEYWORDS) {
        Some(date) => {
            let observation = engine.value_by_date(dataset, date_arg(&date)?)?;
            merge(json!({ "query_type": "specific_date", "dataset": dataset }), observation)
        }
        None => {
            let observation = engine.latest_value(dataset)?;
            merge(json!({ "query_type": "latest", "dataset": dataset }), observation)
        }
    }
}

#[derive(Debug, Deserialize)]
struct ForecastArgs {
    dataset_name: String,
    #[serde(default = "default_one", deserialize_with = "horizon")]
    months_ahead: u32,
    date: Option<String>,
}

fn query_forecast_data(engine: &QueryEngine, args: Value) -> Result<Value, HandlerError> {
    let args: ForecastArgs = parse(args)?;
    let dataset = args.dataset_name.as_str();

    match explicit_date(args.date, FORECAST_DATE_KEYWORDS) {
        Some(date) => {
            let point = engine.get_forecast_by_date(dataset, date_arg(&date)?)?;
            merge(json!({ "query_type": "specific_date", "dataset": dataset }), point)
        }
        None => {
            let point = engine.get_forecast(dataset, args.months_ahead)?;
            merge(
                json!({ "query_type": "months_ahead", "dataset": dataset, "months_ahead": args.months_ahead }),
                point,
            )
        }
    }
}

#[derive(Debug, Deserialize)]
struct DriversArgs {
    dataset_name: String,
    #[serde(default = "default_top_n")]
    top_n: usize,
    driver_name: Option<String>,
}

fn analyze_market_drivers(engine: &QueryEngine, args: Value) -> Result<Value, HandlerError> {
    let args: DriversArgs = parse(args)?;
    let dataset = args.dataset_name.as_str();

    if let Some(name) = args.driver_name.as_deref().filter(|n| !n.trim().is_empty()) {
        let details = engine.get_driver_details(dataset, name)?;
        return merge(json!({ "query_type": "driver_details", "dataset": dataset }), details);
    }

    let drivers = engine.get_top_drivers(dataset, args.top_n)?;
    Ok(json!({
        "query_type": "top_drivers",
        "dataset": dataset,
        "top_n": args.top_n,
        "drivers": drivers,
    }))
}

#[derive(Debug, Deserialize)]
struct DatasetListArgs {
    dataset_names: Vec<String>,
}

fn compare_commodities(engine: &QueryEngine, args: Value) -> Result<Value, HandlerError> {
    let args: DatasetListArgs = parse(args)?;
    let comparison = engine.compare_datasets(&names(&args.dataset_names))?;
    merge(json!({ "query_type": "multi_commodity_comparison" }), comparison)
}

#[derive(Debug, Deserialize)]
struct PurchaseArgs {
    dataset_name: String,
    #[serde(default = "default_horizon", deserialize_with = "horizon")]
    months_ahead: u32,
    #[serde(default = "default_quantity")]
    quantity: u32,
}

fn recommend_forward_buy(engine: &QueryEngine, args: Value) -> Result<Value, HandlerError> {
    let args: PurchaseArgs = parse(args)?;
    plain(engine.recommend_forward_buy(&args.dataset_name, args.months_ahead, args.quantity)?)
}

fn calculate_impact_analysis(engine: &QueryEngine, args: Value) -> Result<Value, HandlerError> {
    let args: PurchaseArgs = parse(args)?;
    plain(engine.calculate_impact_analysis(&args.dataset_name, args.months_ahead, args.quantity)?)
}

#[derive(Debug, Deserialize)]
struct ScenarioArgs {
    dataset_names: Vec<String>,
    #[serde(default = "default_horizon", deserialize_with = "horizon")]
    months_ahead: u32,
    #[serde(default = "default_quantity")]
    quantity: u32,
}

fn analyze_multi_commodity_scenario(engine: &QueryEngine, args: Value) -> Result<Value, HandlerError> {
    let args: ScenarioArgs = parse(args)?;
    plain(engine.analyze_multi_commodity_scenario(&names(&args.dataset_names), args.months_ahead, args.quantity)?)
}

#[derive(Debug, Deserialize)]
struct SequencingArgs {
    dataset_names: Vec<String>,
    #[serde(default = "default_horizon", deserialize_with = "horizon")]
    months_ahead: u32,
}

fn recommend_production_sequencing(engine: &QueryEngine, args: Value) -> Result<Value, HandlerError> {
    let args: SequencingArgs = parse(args)?;
    plain(engine.recommend_production_sequencing(&names(&args.dataset_names), args.months_ahead)?)
}

#[derive(Debug, Deserialize)]
struct HorizonArgs {
    dataset_name: String,
    #[serde(default = "default_horizon", deserialize_with = "horizon")]
    months_ahead: u32,
}

fn generate_negotiation_talking_points(engine: &QueryEngine, args: Value) -> Result<Value, HandlerError> {
    let args: HorizonArgs = parse(args)?;
    plain(engine.generate_negotiation_talking_points(&args.dataset_name, args.months_ahead)?)
}

#[derive(Debug, Deserialize)]
struct ClaimArgs {
    dataset_name: String,
    claimed_price: f64,
    #[serde(default = "default_horizon", deserialize_with = "horizon")]
    months_ahead: u32,
}

fn validate_supplier_claim(engine: &QueryEngine, args: Value) -> Result<Value, HandlerError> {
    let args: ClaimArgs = parse(args)?;
    plain(engine.validate_supplier_claim(&args.dataset_name, args.claimed_price, args.months_ahead)?)
}

#[derive(Debug, Deserialize)]
struct DirectionArgs {
    dataset_name: String,
    #[serde(default = "default_direction")]
    price_direction: String,
}

fn identify_driver_arguments(engine: &QueryEngine, args: Value) -> Result<Value, HandlerError> {
    let args: DirectionArgs = parse(args)?;
    let direction: PriceDirection = args.price_direction.parse()?;
    plain(engine.identify_driver_arguments(&args.dataset_name, direction)?)
}

// ---------------------------------------------------------------------------
// Analytic tools
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum PriceAnalysis {
    PercentageChange,
    TrendDirection,
    PeakValley,
    Peak,
    Valley,
    MovingAverage,
    TrendLine,
}

#[derive(Debug, Deserialize)]
struct PriceHistoryArgs {
    dataset_name: String,
    analysis: PriceAnalysis,
    start_date: Option<String>,
    end_date: Option<String>,
    window_size: Option<usize>,
}

fn analyze_price_history(engine: &QueryEngine, args: Value) -> Result<Value, HandlerError> {
    let args: PriceHistoryArgs = parse(args)?;
    let dataset = args.dataset_name.as_str();
    let head = json!({ "query_type": args.analysis, "dataset": dataset });
    let range = optional_range(args.start_date.as_deref(), args.end_date.as_deref())?;

    match args.analysis {
        PriceAnalysis::PercentageChange | PriceAnalysis::TrendDirection => {
            let Some(range) = range else {
                return Err(QueryError::invalid_argument("start_date", "start_date and end_date are both required").into());
            };
            if matches!(args.analysis, PriceAnalysis::TrendDirection) {
                let trend = engine.get_trend_direction(dataset, range.start, range.end)?;
                merge(head, json!({ "start_date": range.start, "end_date": range.end, "trend_direction": trend }))
            } else {
                merge(head, engine.calculate_percentage_change(dataset, range.start, range.end)?)
            }
        }
        PriceAnalysis::PeakValley => merge(head, engine.find_peak_and_valley(dataset, range)?),
        PriceAnalysis::Peak => merge(head, engine.find_peak(dataset, range)?),
        PriceAnalysis::Valley => merge(head, engine.find_valley(dataset, range)?),
        PriceAnalysis::MovingAverage => {
            let window = args.window_size.unwrap_or(DEFAULT_MOVING_AVERAGE_WINDOW);
            let points = engine.calculate_moving_average(dataset, window, range)?;
            merge(head, json!({ "window_size": window, "points": points, "count": points.len() }))
        }
        PriceAnalysis::TrendLine => merge(head, engine.calculate_trend_line(dataset, range)?),
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ForecastAnalysis {
    Quantile,
    ConfidenceInterval,
    Quantiles,
    AllForecasts,
    CurrentVsForecast,
    ForecastTrend,
}

#[derive(Debug, Deserialize)]
struct DistributionArgs {
    dataset_name: String,
    analysis: ForecastAnalysis,
    date: Option<String>,
    quantile: Option<f64>,
    confidence_level: Option<u32>,
    #[serde(default, deserialize_with = "optional_horizon")]
    months_ahead: Option<u32>,
}

fn analyze_forecast_distribution(engine: &QueryEngine, args: Value) -> Result<Value, HandlerError> {
    let args: DistributionArgs = parse(args)?;
    let dataset = args.dataset_name.as_str();
    let head = json!({ "query_type": args.analysis, "dataset": dataset });

    match args.analysis {
        ForecastAnalysis::Quantile => {
            let date = required_date(args.date, FORECAST_DATE_KEYWORDS, "quantile")?;
            let quantile = args.quantile.unwrap_or(0.5);
            merge(head, engine.get_quantile_forecast(dataset, date_arg(&date)?, quantile)?)
        }
        ForecastAnalysis::ConfidenceInterval => {
            let date = required_date(args.date, FORECAST_DATE_KEYWORDS, "confidence_interval")?;
            let level = args.confidence_level.unwrap_or(80);
            merge(head, engine.get_confidence_interval(dataset, date_arg(&date)?, level)?)
        }
        ForecastAnalysis::Quantiles => {
            let months = args.months_ahead.unwrap_or(1);
            merge(head, engine.get_forecast_with_quantiles(dataset, months)?)
        }
        ForecastAnalysis::AllForecasts => {
            let forecasts = engine.get_all_forecasts(dataset)?;
            merge(head, json!({ "forecasts": forecasts, "count": forecasts.len() }))
        }
        ForecastAnalysis::CurrentVsForecast => merge(head, engine.compare_current_to_forecast(dataset)?),
        ForecastAnalysis::ForecastTrend => {
            let months = args.months_ahead.unwrap_or(DEFAULT_MONTHS_AHEAD);
            merge(head, engine.analyze_forecast_trend(dataset, months)?)
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum RelationshipAnalysis {
    Correlation,
    Timing,
    Strategy,
    CombinedDrivers,
}

#[derive(Debug, Deserialize)]
struct RelationshipArgs {
    analysis: RelationshipAnalysis,
    dataset_names: Vec<String>,
    top_n: Option<usize>,
}

fn analyze_commodity_relationships(engine: &QueryEngine, args: Value) -> Result<Value, HandlerError> {
    let args: RelationshipArgs = parse(args)?;
    let head = json!({ "query_type": args.analysis });
    let datasets = names(&args.dataset_names);

    match (args.analysis, datasets.as_slice()) {
        (RelationshipAnalysis::Correlation, [a, b]) => merge(head, engine.calculate_correlation(a, b)?),
        (RelationshipAnalysis::Timing, [a, b]) => merge(head, engine.analyze_timing_relationships(a, b)?),
        (RelationshipAnalysis::Correlation | RelationshipAnalysis::Timing, _) => {
            Err(QueryError::invalid_argument("dataset_names", "exactly two datasets are required").into())
        }
        (RelationshipAnalysis::Strategy, _) => merge(head, engine.analyze_multi_commodity_strategy(&datasets)?),
        (RelationshipAnalysis::CombinedDrivers, [dataset]) => {
            let top_n = args.top_n.unwrap_or(DEFAULT_COMBINED_DRIVERS);
            merge(
                json!({ "query_type": args.analysis, "dataset": dataset }),
                engine.analyze_drivers_combined(dataset, top_n)?,
            )
        }
        (RelationshipAnalysis::CombinedDrivers, _) => {
            Err(QueryError::invalid_argument("dataset_names", "exactly one dataset is required").into())
        }
    }
}
