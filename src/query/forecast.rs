//! Forecast queries over the quantile bands.
//!
//! Horizons are 1-indexed: `months_ahead = 1` is the first forecast date.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

use super::{pct_change, QueryEngine, QueryError, QueryResult};
use crate::data::ForecastSeries;
use crate::types::{round_to, TrendDirection};

/// Supported confidence levels and their quantile pairs.
pub const CONFIDENCE_LEVELS: &[(u32, f64, f64)] = &[(80, 0.15, 0.85), (90, 0.05, 0.95)];

const MEDIAN_LEVEL: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub forecast_value: f64,
}

/// Every band at one horizon.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuantileSnapshot {
    pub date: NaiveDate,
    pub months_ahead: u32,
    pub quantiles: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QuantileForecast {
    pub date: NaiveDate,
    pub quantile: f64,
    pub forecast_value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConfidenceInterval {
    pub date: NaiveDate,
    pub confidence_level: u32,
    pub lower_bound: f64,
    pub median: f64,
    pub upper_bound: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentVsForecast {
    pub current_date: NaiveDate,
    pub current_value: f64,
    pub forecast_date: NaiveDate,
    pub forecast_value: f64,
    pub difference: f64,
    pub percentage_change: f64,
    pub trend_direction: TrendDirection,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastTrend {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub start_value: f64,
    pub end_value: f64,
    pub months_analyzed: u32,
    pub average_monthly_change: f64,
    pub trend_direction: TrendDirection,
    pub monthly_changes: Vec<f64>,
}

impl QueryEngine {
    /// Median forecast `months_ahead` periods out.
    pub fn get_forecast(&self, dataset: &str, months_ahead: u32) -> QueryResult<ForecastPoint> {
        let forecast = self.forecast_series(dataset)?;
        let index = horizon_index(&forecast, months_ahead, 1).map_err(|e| match e {
            QueryError::ForecastOutOfRange {
                months_ahead,
                min_months,
                max_horizon,
                ..
            } => QueryError::ForecastOutOfRange {
                months_ahead,
                min_months,
                max_horizon,
                alternatives: vec![
                    format!("What's the {dataset} forecast for {max_horizon} months ahead?"),
                    format!("Show me the {dataset} forecast for next month"),
                    format!("What's the {dataset} trend over the next 3 months?"),
                ],
            },
            other => other,
        })?;
        Ok(point(&forecast, index))
    }

    pub fn get_forecast_with_quantiles(&self, dataset: &str, months_ahead: u32) -> QueryResult<QuantileSnapshot> {
        let forecast = self.forecast_series(dataset)?;
        let index = horizon_index(&forecast, months_ahead, 1)?;
        Ok(QuantileSnapshot {
            date: forecast.dates()[index],
            months_ahead,
            quantiles: forecast.bands_at(index),
        })
    }

    /// Median forecast on an exact forecast date.
    pub fn get_forecast_by_date(&self, dataset: &str, date: NaiveDate) -> QueryResult<ForecastPoint> {
        let forecast = self.forecast_series(dataset)?;
        let index = locate(&forecast, date)?;
        Ok(point(&forecast, index))
    }

    /// The full median path.
    pub fn get_all_forecasts(&self, dataset: &str) -> QueryResult<Vec<ForecastPoint>> {
        let forecast = self.forecast_series(dataset)?;
        Ok((0..forecast.horizon()).map(|i| point(&forecast, i)).collect())
    }

    pub fn get_quantile_forecast(&self, dataset: &str, date: NaiveDate, quantile: f64) -> QueryResult<QuantileForecast> {
        let forecast = self.forecast_series(dataset)?;
        let band = forecast
            .quantile(quantile)
            .ok_or_else(|| QueryError::QuantileNotAvailable {
                quantile,
                available_quantiles: forecast.quantile_labels(),
            })?;
        let index = locate(&forecast, date)?;
        Ok(QuantileForecast {
            date,
            quantile,
            forecast_value: band[index],
        })
    }

    /// 80% maps to (0.15, 0.85), 90% to (0.05, 0.95). Nothing else.
    pub fn get_confidence_interval(
        &self,
        dataset: &str,
        date: NaiveDate,
        confidence_level: u32,
    ) -> QueryResult<ConfidenceInterval> {
        let Some(&(_, lower_q, upper_q)) = CONFIDENCE_LEVELS.iter().find(|(level, _, _)| *level == confidence_level)
        else {
            return Err(QueryError::InvalidConfidenceLevel {
                confidence_level,
                available_levels: CONFIDENCE_LEVELS.iter().map(|(level, _, _)| *level).collect(),
            }
            .into());
        };

        let lower = self.get_quantile_forecast(dataset, date, lower_q)?;
        let upper = self.get_quantile_forecast(dataset, date, upper_q)?;
        let median = self.get_quantile_forecast(dataset, date, MEDIAN_LEVEL)?;

        Ok(ConfidenceInterval {
            date,
            confidence_level,
            lower_bound: lower.forecast_value,
            median: median.forecast_value,
            upper_bound: upper.forecast_value,
        })
    }

    /// Latest observation against the 1-month-ahead median.
    pub fn compare_current_to_forecast(&self, dataset: &str) -> QueryResult<CurrentVsForecast> {
        let current = self.latest_value(dataset)?;
        let forecast = self.get_forecast(dataset, 1)?;

        if current.value == 0.0 {
            return Err(QueryError::invalid_argument("current_value", "latest value is zero").into());
        }

        let percentage_change = round_to(pct_change(current.value, forecast.forecast_value), 2);
        Ok(CurrentVsForecast {
            current_date: current.period,
            current_value: current.value,
            forecast_date: forecast.date,
            forecast_value: forecast.forecast_value,
            difference: round_to(forecast.forecast_value - current.value, 2),
            percentage_change,
            trend_direction: TrendDirection::from_change(percentage_change),
        })
    }

    /// Month-over-month changes across the first `months_ahead` medians.
    pub fn analyze_forecast_trend(&self, dataset: &str, months_ahead: u32) -> QueryResult<ForecastTrend> {
        let forecast = self.forecast_series(dataset)?;
        let last = horizon_index(&forecast, months_ahead, 2)?;
        let values = &forecast.median()[..=last];
        let dates = &forecast.dates()[..=last];

        let monthly_changes: Vec<f64> = values
            .windows(2)
            .map(|w| round_to(pct_change(w[0], w[1]), 2))
            .collect();
        let average_monthly_change = round_to(
            monthly_changes.iter().sum::<f64>() / monthly_changes.len() as f64,
            2,
        );

        Ok(ForecastTrend {
            start_date: dates[0],
            end_date: dates[last],
            start_value: values[0],
            end_value: values[last],
            months_analyzed: months_ahead,
            average_monthly_change,
            trend_direction: TrendDirection::from_change(average_monthly_change),
            monthly_changes,
        })
    }
}

fn point(forecast: &ForecastSeries, index: usize) -> ForecastPoint {
    ForecastPoint {
        date: forecast.dates()[index],
        forecast_value: forecast.median()[index],
    }
}

/// 0-based index for a 1-based horizon in `[min_months, horizon]`.
fn horizon_index(forecast: &ForecastSeries, months_ahead: u32, min_months: u32) -> Result<usize, QueryError> {
    let max_horizon = forecast.horizon();
    if months_ahead < min_months || months_ahead as usize > max_horizon {
        return Err(QueryError::ForecastOutOfRange {
            months_ahead,
            min_months,
            max_horizon,
            alternatives: Vec::new(),
        });
    }
    Ok(months_ahead as usize - 1)
}

fn locate(forecast: &ForecastSeries, date: NaiveDate) -> Result<usize, QueryError> {
    let window = forecast.window();
    if !window.contains(date) {
        return Err(QueryError::DateOutOfForecastRange {
            date,
            available_range: window,
        });
    }
    forecast.index_of(date).ok_or(QueryError::DateNotInForecast {
        date,
        available_range: window,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
