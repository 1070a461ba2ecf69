//! Validated value objects for the three on-disk data kinds.
//!
//! Every constructor checks its invariants and returns a
//! `ValidationError` instead of storing bad data.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::types::{parse_date, DateRange, Direction, ValidationError};

/// Median quantile label. Always present in a `ForecastSeries`.
pub const MEDIAN: &str = "0.5";

// ---------------------------------------------------------------------------
// Historical
// ---------------------------------------------------------------------------

/// One row of `historical_data.csv`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HistoricalObservation {
    #[serde(rename = "date")]
    pub period: NaiveDate,
    pub value: f64,
}

impl HistoricalObservation {
    pub fn new(period: &str, value: f64) -> Result<Self, ValidationError> {
        let period = parse_date(period).ok_or_else(|| ValidationError::InvalidDate(period.to_string()))?;
        if !value.is_finite() {
            return Err(ValidationError::NonNumeric {
                field: "Value".into(),
                value: value.to_string(),
            });
        }
        Ok(Self { period, value })
    }

    /// Build from raw CSV cells.
    pub fn parse(period: &str, value: &str) -> Result<Self, ValidationError> {
        let parsed = value.trim().parse::<f64>().map_err(|_| ValidationError::NonNumeric {
            field: "Value".into(),
            value: value.to_string(),
        })?;
        Self::new(period, parsed)
    }
}

/// A dataset's full history, ascending by period.
///
/// Duplicate periods are kept as-is; lookups return the first match.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalSeries {
    observations: Vec<HistoricalObservation>,
}

impl HistoricalSeries {
    pub fn new(mut observations: Vec<HistoricalObservation>) -> Self {
        observations.sort_by_key(|o| o.period);
        Self { observations }
    }

    pub fn observations(&self) -> &[HistoricalObservation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn latest(&self) -> Option<&HistoricalObservation> {
        self.observations.last()
    }

    /// First and last observed periods.
    pub fn range(&self) -> Option<DateRange> {
        match (self.observations.first(), self.observations.last()) {
            (Some(first), Some(last)) => Some(DateRange::new(first.period, last.period)),
            _ => None,
        }
    }

    pub fn find(&self, date: NaiveDate) -> Option<&HistoricalObservation> {
        self.observations.iter().find(|o| o.period == date)
    }

    /// Observations inside an inclusive range (all of them when `None`).
    pub fn within(&self, range: Option<DateRange>) -> Vec<HistoricalObservation> {
        match range {
            Some(r) => self.observations.iter().filter(|o| r.contains(o.period)).copied().collect(),
            None => self.observations.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Forecast
// ---------------------------------------------------------------------------

/// Quantile forecast bands over an ascending list of future dates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastSeries {
    forecast_series: Vec<NaiveDate>,
    quantile_forecast: BTreeMap<String, Vec<f64>>,
    metadata: Option<serde_json::Value>,
}

impl ForecastSeries {
    pub fn new(
        dates: &[String],
        quantile_forecast: BTreeMap<String, Vec<f64>>,
        metadata: Option<serde_json::Value>,
    ) -> Result<Self, ValidationError> {
        if dates.is_empty() {
            return Err(ValidationError::EmptyForecast);
        }

        let forecast_series = dates
            .iter()
            .map(|d| parse_date(d).ok_or_else(|| ValidationError::InvalidDate(d.clone())))
            .collect::<Result<Vec<_>, _>>()?;

        if !quantile_forecast.contains_key(MEDIAN) {
            return Err(ValidationError::MissingMedian);
        }

        let expected = forecast_series.len();
        for (quantile, values) in &quantile_forecast {
            if values.len() != expected {
                return Err(ValidationError::LengthMismatch {
                    quantile: quantile.clone(),
                    actual: values.len(),
                    expected,
                });
            }
        }

        Ok(Self {
            forecast_series,
            quantile_forecast,
            metadata,
        })
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.forecast_series
    }

    pub fn horizon(&self) -> usize {
        self.forecast_series.len()
    }

    pub fn metadata(&self) -> Option<&serde_json::Value> {
        self.metadata.as_ref()
    }

    /// First and last forecast dates.
    pub fn window(&self) -> DateRange {
        // Non-empty by construction.
        let first = self.forecast_series[0];
        let last = self.forecast_series[self.forecast_series.len() - 1];
        DateRange::new(first, last)
    }

    pub fn median(&self) -> &[f64] {
        self.quantile_forecast.get(MEDIAN).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Band by numeric level, tolerant of label formatting ("0.1" vs "0.10").
    pub fn quantile(&self, level: f64) -> Option<&[f64]> {
        self.quantile_forecast
            .iter()
            .find(|(label, _)| {
                label
                    .parse::<f64>()
                    .map(|q| (q - level).abs() < 1e-9)
                    .unwrap_or(false)
            })
            .map(|(_, values)| values.as_slice())
    }

    /// Quantile labels, sorted numerically.
    pub fn quantile_labels(&self) -> Vec<String> {
        let mut labels: Vec<(f64, String)> = self
            .quantile_forecast
            .keys()
            .map(|k| (k.parse::<f64>().unwrap_or(f64::MAX), k.clone()))
            .collect();
        labels.sort_by(|a, b| a.0.total_cmp(&b.0));
        labels.into_iter().map(|(_, k)| k).collect()
    }

    /// All bands at a 0-based index, keyed by label.
    pub fn bands_at(&self, index: usize) -> BTreeMap<String, f64> {
        self.quantile_forecast
            .iter()
            .filter_map(|(label, values)| values.get(index).map(|v| (label.clone(), *v)))
            .collect()
    }

    pub fn index_of(&self, date: NaiveDate) -> Option<usize> {
        self.forecast_series.iter().position(|d| *d == date)
    }
}

// ---------------------------------------------------------------------------
// Drivers
// ---------------------------------------------------------------------------

/// Mean/max/min summary of a per-period statistic.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct StatSummary {
    pub mean: f64,
    pub max: f64,
    pub min: f64,
}

/// A market driver with importance, direction, correlation, and lag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriverRecord {
    pub driver_name: String,
    pub importance_score: f64,
    pub importance_max: f64,
    pub importance_min: f64,
    pub direction: Direction,
    pub pearson_correlation: Option<StatSummary>,
    pub granger_causality: Option<StatSummary>,
    /// Lag as written in the source, e.g. "6 to 12 month(s)".
    pub lag: Option<String>,
    pub lag_periods: Option<u32>,
    pub normalized_series: Option<Vec<f64>>,
}

impl DriverRecord {
    pub fn new(
        driver_name: impl Into<String>,
        importance_score: f64,
        importance_max: f64,
        importance_min: f64,
        direction: &str,
    ) -> Result<Self, ValidationError> {
        for (field, value) in [
            ("importance_score", importance_score),
            ("importance_max", importance_max),
            ("importance_min", importance_min),
        ] {
            if !value.is_finite() {
                return Err(ValidationError::NonNumeric {
                    field: field.into(),
                    value: value.to_string(),
                });
            }
        }

        if !(importance_min <= importance_score && importance_score <= importance_max) {
            return Err(ValidationError::ImportanceOutOfRange {
                score: importance_score,
                min: importance_min,
                max: importance_max,
            });
        }

        Ok(Self {
            driver_name: driver_name.into(),
            importance_score,
            importance_max,
            importance_min,
            direction: direction.parse()?,
            pearson_correlation: None,
            granger_causality: None,
            lag: None,
            lag_periods: None,
            normalized_series: None,
        })
    }

    pub fn with_pearson(mut self, stats: Option<StatSummary>) -> Self {
        self.pearson_correlation = stats;
        self
    }

    pub fn with_granger(mut self, stats: Option<StatSummary>) -> Self {
        self.granger_causality = stats;
        self
    }

    pub fn with_lag(mut self, lag: Option<String>) -> Self {
        self.lag_periods = lag.as_deref().and_then(parse_lag_months);
        self.lag = lag;
        self
    }

    pub fn with_normalized_series(mut self, series: Option<Vec<f64>>) -> Self {
        self.normalized_series = series;
        self
    }

    pub fn lag_explanation(&self) -> String {
        match &self.lag {
            Some(lag) => format!("Impact occurs {lag} after driver changes"),
            None => "Lag information not available".to_string(),
        }
    }
}

/// First integer in a month-denominated lag string ("6 to 12 month(s)" -> 6).
pub fn parse_lag_months(lag: &str) -> Option<u32> {
    if !lag.contains("month") {
        return None;
    }
    let digits: String = lag
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
