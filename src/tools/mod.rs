//! Tool adapter: exposes the query engine as named JSON tools.
//!
//! Every tool takes a JSON object of arguments and returns a JSON object.
//! Successful calls carry `success: true`. Recoverable failures (unknown
//! dataset, bad date, out-of-range horizon, malformed arguments) come back
//! as the uniform `{success: false, error, message, ...}` payload so the
//! agent can relay them. Only a corrupt source file is a hard error.

mod handlers;

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::query::{EngineError, QueryEngine, QueryError};
use crate::types::{DataError, DatasetName};

/// Name, description, and JSON-schema parameters of one tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

/// Hard tool failures. Everything recoverable is a payload instead.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("tool '{tool}' hit corrupt source data")]
    Data {
        tool: String,
        #[source]
        source: DataError,
    },

    #[error("tool '{tool}' produced an unserializable result")]
    Serialize {
        tool: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Internal failure of a single handler, before it is turned into a
/// payload or a `ToolError`.
#[derive(Debug)]
pub(crate) enum HandlerError {
    Query(QueryError),
    Data(DataError),
    Args(String),
    Json(serde_json::Error),
}

impl From<QueryError> for HandlerError {
    fn from(e: QueryError) -> Self {
        HandlerError::Query(e)
    }
}

impl From<EngineError> for HandlerError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Query(e) => HandlerError::Query(e),
            EngineError::Data(e) => HandlerError::Data(e),
        }
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(e: serde_json::Error) -> Self {
        HandlerError::Json(e)
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

fn dataset_param() -> Value {
    json!({
        "type": "string",
        "enum": DatasetName::names(),
        "description": "Dataset name: energy_futures, cotton_price, or cotton_export"
    })
}

fn dataset_list_param() -> Value {
    json!({
        "type": "array",
        "items": dataset_param(),
        "description": "Dataset names, e.g. [\"cotton_price\", \"energy_futures\"]"
    })
}

fn date_param(description: &str) -> Value {
    json!({ "type": "string", "description": description })
}

fn integer_param(description: &str, default: u32) -> Value {
    json!({ "type": "integer", "minimum": 0, "default": default, "description": description })
}

fn object(properties: Value, required: &[&str]) -> Value {
    json!({ "type": "object", "properties": properties, "required": required })
}

/// Every tool the agent can call, in presentation order.
pub fn list_tools() -> Vec<ToolInfo> {
    vec![
        ToolInfo {
            name: "query_historical_data",
            description: "Get historical commodity prices: latest value, a specific date, or a date range.",
            parameters: object(
                json!({
                    "dataset_name": dataset_param(),
                    "date": date_param("Specific date (YYYY-MM-DD). 'latest', 'current', or 'now' mean the latest value."),
                    "start_date": date_param("Range start (YYYY-MM-DD); requires end_date"),
                    "end_date": date_param("Range end (YYYY-MM-DD); requires start_date"),
                }),
                &["dataset_name"],
            ),
        },
        ToolInfo {
            name: "query_forecast_data",
            description: "Get future price forecasts for a commodity, by months ahead or by date.",
            parameters: object(
                json!({
                    "dataset_name": dataset_param(),
                    "months_ahead": integer_param("Forecast horizon in months", 1),
                    "date": date_param("Forecast date (YYYY-MM-DD). 'latest', 'next', or 'soon' mean use months_ahead."),
                }),
                &["dataset_name"],
            ),
        },
        ToolInfo {
            name: "analyze_market_drivers",
            description: "Analyze which market drivers affect a commodity's price: top drivers or one driver's details.",
            parameters: object(
                json!({
                    "dataset_name": dataset_param(),
                    "top_n": integer_param("How many top drivers to return", handlers::DEFAULT_TOP_N),
                    "driver_name": { "type": "string", "description": "Exact driver name for a detailed view" },
                }),
                &["dataset_name"],
            ),
        },
        ToolInfo {
            name: "compare_commodities",
            description: "Align the history of several commodities on their common dates.",
            parameters: object(json!({ "dataset_names": dataset_list_param() }), &["dataset_names"]),
        },
        ToolInfo {
            name: "recommend_forward_buy",
            description: "Buy now, wait, monitor, or hedge: a forward-buy recommendation with quantified savings and rationale.",
            parameters: object(
                json!({
                    "dataset_name": dataset_param(),
                    "months_ahead": integer_param("Planning horizon in months", handlers::DEFAULT_HORIZON),
                    "quantity": integer_param("Purchase quantity in units", handlers::DEFAULT_UNITS),
                }),
                &["dataset_name"],
            ),
        },
        ToolInfo {
            name: "calculate_impact_analysis",
            description: "Best, expected, and worst case cost scenarios from the forecast confidence bands.",
            parameters: object(
                json!({
                    "dataset_name": dataset_param(),
                    "months_ahead": integer_param("Planning horizon in months", handlers::DEFAULT_HORIZON),
                    "quantity": integer_param("Purchase quantity in units", handlers::DEFAULT_UNITS),
                }),
                &["dataset_name"],
            ),
        },
        ToolInfo {
            name: "analyze_multi_commodity_scenario",
            description: "Forward-buy recommendations for several commodities, prioritized by urgency, with correlations.",
            parameters: object(
                json!({
                    "dataset_names": dataset_list_param(),
                    "months_ahead": integer_param("Planning horizon in months", handlers::DEFAULT_HORIZON),
                    "quantity": integer_param("Purchase quantity per commodity", handlers::DEFAULT_UNITS),
                }),
                &["dataset_names"],
            ),
        },
        ToolInfo {
            name: "recommend_production_sequencing",
            description: "Order production runs by input-cost outlook so favorable commodities are used first.",
            parameters: object(
                json!({
                    "dataset_names": dataset_list_param(),
                    "months_ahead": integer_param("Planning horizon in months", handlers::DEFAULT_HORIZON),
                }),
                &["dataset_names"],
            ),
        },
        ToolInfo {
            name: "generate_negotiation_talking_points",
            description: "Data-backed supplier negotiation talking points with citations.",
            parameters: object(
                json!({
                    "dataset_name": dataset_param(),
                    "months_ahead": integer_param("Planning horizon in months", handlers::DEFAULT_HORIZON),
                }),
                &["dataset_name"],
            ),
        },
        ToolInfo {
            name: "validate_supplier_claim",
            description: "Check a supplier's quoted price against the forecast median and confidence bands.",
            parameters: object(
                json!({
                    "dataset_name": dataset_param(),
                    "claimed_price": { "type": "number", "description": "The supplier's quoted price" },
                    "months_ahead": integer_param("Horizon the quote refers to", handlers::DEFAULT_HORIZON),
                }),
                &["dataset_name", "claimed_price"],
            ),
        },
        ToolInfo {
            name: "identify_driver_arguments",
            description: "Split market drivers into those supporting and those contradicting a price move.",
            parameters: object(
                json!({
                    "dataset_name": dataset_param(),
                    "price_direction": {
                        "type": "string",
                        "enum": ["increase", "decrease"],
                        "default": "increase",
                        "description": "The price move under discussion"
                    },
                }),
                &["dataset_name"],
            ),
        },
        ToolInfo {
            name: "analyze_price_history",
            description: "Historical analytics: percentage change, trend direction, peak/valley, moving average, or trend line.",
            parameters: object(
                json!({
                    "dataset_name": dataset_param(),
                    "analysis": {
                        "type": "string",
                        "enum": ["percentage_change", "trend_direction", "peak_valley", "peak", "valley", "moving_average", "trend_line"]
                    },
                    "start_date": date_param("Range start (YYYY-MM-DD); required for percentage_change and trend_direction"),
                    "end_date": date_param("Range end (YYYY-MM-DD); required for percentage_change and trend_direction"),
                    "window_size": integer_param("Moving-average window in observations", handlers::DEFAULT_WINDOW),
                }),
                &["dataset_name", "analysis"],
            ),
        },
        ToolInfo {
            name: "analyze_forecast_distribution",
            description: "Forecast distribution: a quantile, a confidence interval, all bands at a horizon, the full median path, current vs forecast, or the forecast trend.",
            parameters: object(
                json!({
                    "dataset_name": dataset_param(),
                    "analysis": {
                        "type": "string",
                        "enum": ["quantile", "confidence_interval", "quantiles", "all_forecasts", "current_vs_forecast", "forecast_trend"]
                    },
                    "date": date_param("Forecast date (YYYY-MM-DD); required for quantile and confidence_interval"),
                    "quantile": { "type": "number", "default": 0.5, "description": "Quantile level, e.g. 0.1, 0.5, 0.9" },
                    "confidence_level": { "type": "integer", "enum": [80, 90], "default": 80 },
                    "months_ahead": { "type": "integer", "minimum": 0, "description": "Horizon for quantiles and forecast_trend" },
                }),
                &["dataset_name", "analysis"],
            ),
        },
        ToolInfo {
            name: "analyze_commodity_relationships",
            description: "Cross-commodity analytics: correlation, driver timing, multi-commodity strategy, or combined driver effect.",
            parameters: object(
                json!({
                    "analysis": {
                        "type": "string",
                        "enum": ["correlation", "timing", "strategy", "combined_drivers"]
                    },
                    "dataset_names": dataset_list_param(),
                    "top_n": integer_param("Drivers considered for combined_drivers", handlers::DEFAULT_COMBINED_N),
                }),
                &["analysis", "dataset_names"],
            ),
        },
    ]
}

/// Look up one tool's definition.
pub fn find_tool(name: &str) -> Option<ToolInfo> {
    list_tools().into_iter().find(|t| t.name == name)
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Run one tool against the engine.
///
/// Returns the success or recoverable-error payload; `Err` only for
/// corrupt source data.
pub fn call(engine: &QueryEngine, name: &str, args: Value) -> Result<Value, ToolError> {
    let Some(handler) = handlers::lookup(name) else {
        warn!(tool = name, "Unknown tool requested");
        return Ok(json!({
            "success": false,
            "error": "unknown_tool",
            "message": format!("Tool '{name}' does not exist"),
            "available_tools": list_tools().iter().map(|t| t.name).collect::<Vec<_>>(),
        }));
    };

    let args = if args.is_null() { json!({}) } else { args };
    debug!(tool = name, %args, "Dispatching tool call");

    match handler(engine, args) {
        Ok(value) => Ok(with_success(value)),
        Err(HandlerError::Query(e)) => {
            debug!(tool = name, error = %e.kind(), "Tool returned a recoverable error");
            Ok(e.payload())
        }
        Err(HandlerError::Args(reason)) => Ok(json!({
            "success": false,
            "error": "invalid_arguments",
            "message": format!("Invalid arguments for {name}: {reason}"),
        })),
        Err(HandlerError::Data(source)) => Err(ToolError::Data {
            tool: name.to_string(),
            source,
        }),
        Err(HandlerError::Json(source)) => Err(ToolError::Serialize {
            tool: name.to_string(),
            source,
        }),
    }
}

fn with_success(value: Value) -> Value {
    let mut out = Map::new();
    out.insert("success".into(), Value::Bool(true));
    match value {
        Value::Object(fields) => out.extend(fields),
        other => {
            out.insert("result".into(), other);
        }
    }
    Value::Object(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
