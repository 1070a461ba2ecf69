//! Analytical query engine.
//!
//! `QueryEngine` owns the `DataLoader` (and through it the data root)
//! and exposes every query as a method. Each method returns
//! `QueryResult<T>`: a typed success payload, a recoverable
//! `QueryError` the caller renders as a structured hint, or a fatal
//! `DataError` when a source file is corrupt.

pub mod comparative;
pub mod drivers;
pub mod forecast;
pub mod historical;
pub mod negotiation;
pub mod recommendations;

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::data::{DataLoader, DriverRecord, ForecastSeries, HistoricalSeries};
use crate::types::{parse_date, DataError, DateRange, DatasetName};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Recoverable, user-facing query failures.
///
/// Serialized (via [`QueryError::payload`]) as
/// `{success: false, error: <kind>, message, ...hints}`.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum QueryError {
    #[error("Dataset '{dataset}' not found. Available datasets: {}", available_datasets.join(", "))]
    DatasetNotFound {
        dataset: String,
        available_datasets: Vec<String>,
        alternatives: Vec<String>,
    },

    #[error("'{date}' is not a valid date. Use the YYYY-MM-DD format.")]
    InvalidDate { date: String },

    #[error("{}", date_out_of_range_message(*date, *available_range, *suggested_date))]
    DateOutOfRange {
        date: NaiveDate,
        available_range: DateRange,
        #[serde(skip_serializing_if = "Option::is_none")]
        suggested_date: Option<NaiveDate>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        alternatives: Vec<String>,
    },

    #[error("No data found for date {date}. Data is available from {available_range}.")]
    DateNotFound {
        date: NaiveDate,
        available_range: DateRange,
    },

    #[error("Requested range ({requested_range}) is outside available data ({available_range}).")]
    DateRangeOutOfBounds {
        requested_range: DateRange,
        available_range: DateRange,
        suggested_range: DateRange,
    },

    #[error("No observations between {requested_range}. Data is available from {available_range}.")]
    NoDataInRange {
        requested_range: DateRange,
        available_range: DateRange,
    },

    #[error("Forecast for {months_ahead} months ahead is not available. Forecasts cover {min_months} to {max_horizon} months.")]
    ForecastOutOfRange {
        months_ahead: u32,
        min_months: u32,
        max_horizon: usize,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        alternatives: Vec<String>,
    },

    #[error("No forecast available for {date}. Forecasts are available from {available_range}.")]
    DateOutOfForecastRange {
        date: NaiveDate,
        available_range: DateRange,
    },

    #[error("No forecast found for date {date}. Available range: {available_range}.")]
    DateNotInForecast {
        date: NaiveDate,
        available_range: DateRange,
    },

    #[error("Quantile {quantile} not available. Available quantiles: {}", available_quantiles.join(", "))]
    QuantileNotAvailable {
        quantile: f64,
        available_quantiles: Vec<String>,
    },

    #[error("Confidence level {confidence_level}% not supported. Available levels: 80%, 90%")]
    InvalidConfidenceLevel {
        confidence_level: u32,
        available_levels: Vec<u32>,
    },

    #[error("Driver '{driver_name}' not found. Available drivers: {}", available_drivers.join(", "))]
    DriverNotFound {
        driver_name: String,
        available_drivers: Vec<String>,
    },

    #[error("Not enough data: {reason}")]
    InsufficientData { reason: String },

    #[error("Invalid {argument}: {reason}")]
    InvalidArgument { argument: String, reason: String },
}

fn date_out_of_range_message(date: NaiveDate, range: DateRange, suggested: Option<NaiveDate>) -> String {
    match suggested {
        Some(s) if date < range.start => format!(
            "The date {date} is before available data range ({range}). Would you like data from {s} instead?"
        ),
        Some(s) => format!(
            "The date {date} is after available data range ({range}). Would you like data from {s} instead?"
        ),
        None => format!("One or both dates are outside available range ({range})."),
    }
}

impl QueryError {
    /// The uniform error payload handed to the agent.
    pub fn payload(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({}));
        if let Value::Object(map) = &mut value {
            map.insert("success".into(), Value::Bool(false));
            map.insert("message".into(), Value::String(self.to_string()));
        }
        value
    }

    /// Kind string, e.g. `"dataset_not_found"`.
    pub fn kind(&self) -> String {
        serde_json::to_value(self)
            .ok()
            .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_default()
    }

    fn dataset_not_found(dataset: &str, alternatives: Vec<String>) -> Self {
        QueryError::DatasetNotFound {
            dataset: dataset.to_string(),
            available_datasets: DatasetName::names(),
            alternatives,
        }
    }

    pub(crate) fn invalid_argument(argument: &str, reason: impl Into<String>) -> Self {
        QueryError::InvalidArgument {
            argument: argument.to_string(),
            reason: reason.into(),
        }
    }
}

/// Either a recoverable query error or a fatal load error.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Data(#[from] DataError),
}

impl EngineError {
    /// The recoverable half, if this is one.
    pub fn as_query(&self) -> Option<&QueryError> {
        match self {
            EngineError::Query(e) => Some(e),
            EngineError::Data(_) => None,
        }
    }
}

pub type QueryResult<T> = std::result::Result<T, EngineError>;

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Which follow-up questions to suggest when a dataset is unknown.
#[derive(Debug, Clone, Copy)]
enum Suggestions {
    History,
    Forecast,
}

impl Suggestions {
    fn questions(self) -> Vec<String> {
        let list: &[&str] = match self {
            Suggestions::History => &[
                "What's the latest energy_futures price?",
                "Show me cotton_price trends",
                "Compare energy_futures and cotton_price",
            ],
            Suggestions::Forecast => &[
                "What's the energy_futures forecast for next month?",
                "Show me cotton_price forecast",
                "Compare current and forecast prices for energy_futures",
            ],
        };
        list.iter().map(|s| s.to_string()).collect()
    }
}

/// Query context: one loader (and cache) shared by every query.
pub struct QueryEngine {
    loader: DataLoader,
}

impl QueryEngine {
    pub fn new(loader: DataLoader) -> Self {
        Self { loader }
    }

    pub fn loader(&self) -> &DataLoader {
        &self.loader
    }

    fn historical(&self, dataset: &str) -> QueryResult<Arc<HistoricalSeries>> {
        self.loader
            .load_historical(dataset)?
            .ok_or_else(|| QueryError::dataset_not_found(dataset, Suggestions::History.questions()).into())
    }

    fn forecast_series(&self, dataset: &str) -> QueryResult<Arc<ForecastSeries>> {
        self.loader
            .load_forecast(dataset)?
            .ok_or_else(|| QueryError::dataset_not_found(dataset, Suggestions::Forecast.questions()).into())
    }

    fn drivers(&self, dataset: &str) -> QueryResult<Arc<Vec<DriverRecord>>> {
        self.loader
            .load_drivers_parsed(dataset)?
            .ok_or_else(|| QueryError::dataset_not_found(dataset, Vec::new()).into())
    }
}

/// Parse a date argument, or fail with `invalid_date`.
pub fn date_arg(value: &str) -> Result<NaiveDate, QueryError> {
    parse_date(value).ok_or_else(|| QueryError::InvalidDate {
        date: value.to_string(),
    })
}

/// Parse an optional `(start, end)` pair into a range. Both bounds are
/// required for filtering; a lone bound is ignored.
pub fn optional_range(start: Option<&str>, end: Option<&str>) -> Result<Option<DateRange>, QueryError> {
    match (start, end) {
        (Some(s), Some(e)) => Ok(Some(DateRange::new(date_arg(s)?, date_arg(e)?))),
        _ => Ok(None),
    }
}

/// Percentage change from `from` to `to`.
pub(crate) fn pct_change(from: f64, to: f64) -> f64 {
    (to - from) / from * 100.0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
