//! Shared types for the procurement agent.
//!
//! The dataset registry, the small enums every query layer agrees on,
//! and the load-time error taxonomy. Query-level (recoverable) errors
//! live in `query` because they carry query context.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Date format used by every on-disk file and every tool argument.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse a `YYYY-MM-DD` string.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).ok()
}

/// Round to a fixed number of decimal places.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

// ---------------------------------------------------------------------------
// Dataset registry
// ---------------------------------------------------------------------------

/// Canonical commodity dataset names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetName {
    EnergyFutures,
    CottonPrice,
    CottonExport,
}

impl DatasetName {
    /// All registered datasets, in registry order.
    pub const ALL: &'static [DatasetName] = &[
        DatasetName::EnergyFutures,
        DatasetName::CottonPrice,
        DatasetName::CottonExport,
    ];

    /// The canonical name used in tool arguments and cache keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetName::EnergyFutures => "energy_futures",
            DatasetName::CottonPrice => "cotton_price",
            DatasetName::CottonExport => "cotton_export",
        }
    }

    /// On-disk folder under the data root.
    pub fn folder(&self) -> &'static str {
        match self {
            DatasetName::EnergyFutures => "#1181-Dataset_Germany Energy Futures, Settlement Price",
            DatasetName::CottonPrice => "#1597-Dataset_Pima Cotton Price",
            DatasetName::CottonExport => "#1616-Dataset_Pima Cotton Export Quantity",
        }
    }

    /// Exact-match registry lookup.
    pub fn lookup(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|d| d.as_str() == name)
    }

    /// Canonical names of every registered dataset.
    pub fn names() -> Vec<String> {
        Self::ALL.iter().map(|d| d.as_str().to_string()).collect()
    }
}

impl fmt::Display for DatasetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DatasetName {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::lookup(s.trim()).ok_or_else(|| anyhow::anyhow!("Unknown dataset: {s}"))
    }
}

// ---------------------------------------------------------------------------
// Shared enums
// ---------------------------------------------------------------------------

/// Sign classification used throughout: `> 0`, `< 0`, otherwise stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

impl TrendDirection {
    pub fn from_change(change: f64) -> Self {
        if change > 0.0 {
            TrendDirection::Increasing
        } else if change < 0.0 {
            TrendDirection::Decreasing
        } else {
            TrendDirection::Stable
        }
    }
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrendDirection::Increasing => write!(f, "increasing"),
            TrendDirection::Decreasing => write!(f, "decreasing"),
            TrendDirection::Stable => write!(f, "stable"),
        }
    }
}

/// Direction of a driver's effect on price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Positive,
    Negative,
}

impl Direction {
    /// Non-negative mean direction statistics count as positive.
    pub fn from_mean(mean: f64) -> Self {
        if mean >= 0.0 {
            Direction::Positive
        } else {
            Direction::Negative
        }
    }

    pub fn explanation(&self) -> &'static str {
        match self {
            Direction::Positive => "When this driver increases, prices tend to increase",
            Direction::Negative => "When this driver increases, prices tend to decrease",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Positive => write!(f, "positive"),
            Direction::Negative => write!(f, "negative"),
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "positive" => Ok(Direction::Positive),
            "negative" => Ok(Direction::Negative),
            other => Err(ValidationError::InvalidDirection(other.to_string())),
        }
    }
}

/// Inclusive calendar range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Rejected model construction.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid period format: {0}. Expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Invalid value for {field}: {value}. Expected a finite number")]
    NonNumeric { field: String, value: String },

    #[error("forecast_series cannot be empty")]
    EmptyForecast,

    #[error("quantile_forecast must include '0.5' (median) quantile")]
    MissingMedian,

    #[error("Quantile {quantile} has {actual} values, expected {expected} to match forecast_series")]
    LengthMismatch {
        quantile: String,
        actual: usize,
        expected: usize,
    },

    #[error("Importance score {score} is outside valid range [{min}, {max}]")]
    ImportanceOutOfRange { score: f64, min: f64, max: f64 },

    #[error("Invalid direction: {0}. Expected 'positive' or 'negative'")]
    InvalidDirection(String),
}

/// Load-time failure: the source file exists but is unusable.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read CSV file {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Failed to parse JSON file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("CSV file {path} missing required columns: {columns:?}")]
    MissingColumns { path: PathBuf, columns: Vec<String> },

    #[error("JSON file {path} missing required field: {field}")]
    MissingField { path: PathBuf, field: String },

    #[error("File {path} contains no observations")]
    Empty { path: PathBuf },

    #[error("Invalid data in {path}: {source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: ValidationError,
    },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
