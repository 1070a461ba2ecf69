//! Historical queries: point and range lookups, change, extremes,
//! smoothing, and linear trend.

use chrono::NaiveDate;
use serde::Serialize;

use super::{pct_change, QueryEngine, QueryError, QueryResult};
use crate::data::HistoricalObservation;
use crate::types::{round_to, DateRange, TrendDirection};

pub const DEFAULT_MOVING_AVERAGE_WINDOW: usize = 7;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PercentageChange {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub start_value: f64,
    pub end_value: f64,
    pub percentage_change: f64,
    pub trend_direction: TrendDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtremeKind {
    Peak,
    Valley,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Extreme {
    pub date: NaiveDate,
    pub value: f64,
    #[serde(rename = "type")]
    pub kind: ExtremeKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PeakAndValley {
    pub peak: Extreme,
    pub valley: Extreme,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MovingAveragePoint {
    pub date: NaiveDate,
    pub moving_average: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrendLine {
    pub slope: f64,
    pub intercept: f64,
    pub trend_direction: TrendDirection,
}

impl QueryEngine {
    /// Most recent observation.
    pub fn latest_value(&self, dataset: &str) -> QueryResult<HistoricalObservation> {
        let series = self.historical(dataset)?;
        // Loaded series are never empty.
        series.latest().copied().ok_or_else(|| {
            QueryError::InsufficientData {
                reason: format!("{dataset} has no observations"),
            }
            .into()
        })
    }

    /// Exact-date lookup with a boundary suggestion when out of range.
    pub fn value_by_date(&self, dataset: &str, date: NaiveDate) -> QueryResult<HistoricalObservation> {
        let series = self.historical(dataset)?;
        let range = observed_range(series.observations(), dataset)?;

        if date < range.start || date > range.end {
            let (suggested, alternatives) = if date < range.start {
                (
                    range.start,
                    vec![
                        format!("What's the {dataset} price on {}?", range.start),
                        format!("Show me the latest {dataset} price"),
                        format!("What's the {dataset} trend from {} to {}?", range.start, range.end),
                    ],
                )
            } else {
                (
                    range.end,
                    vec![
                        format!("What's the {dataset} price on {}?", range.end),
                        format!("Show me the latest {dataset} price"),
                        format!("What's the {dataset} forecast for the next 3 months?"),
                    ],
                )
            };
            return Err(QueryError::DateOutOfRange {
                date,
                available_range: range,
                suggested_date: Some(suggested),
                alternatives,
            }
            .into());
        }

        series.find(date).copied().ok_or_else(|| {
            QueryError::DateNotFound {
                date,
                available_range: range,
            }
            .into()
        })
    }

    /// Inclusive range filter. An in-bounds range with no rows is an
    /// empty list, not an error.
    pub fn values_by_range(
        &self,
        dataset: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> QueryResult<Vec<HistoricalObservation>> {
        let series = self.historical(dataset)?;
        let range = observed_range(series.observations(), dataset)?;

        if start < range.start || end > range.end {
            return Err(QueryError::DateRangeOutOfBounds {
                requested_range: DateRange::new(start, end),
                available_range: range,
                suggested_range: DateRange::new(start.max(range.start), end.min(range.end)),
            }
            .into());
        }

        Ok(series.within(Some(DateRange::new(start, end))))
    }

    pub fn calculate_percentage_change(
        &self,
        dataset: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> QueryResult<PercentageChange> {
        let series = self.historical(dataset)?;
        let range = observed_range(series.observations(), dataset)?;

        if start < range.start || end > range.end {
            return Err(QueryError::DateOutOfRange {
                date: if start < range.start { start } else { end },
                available_range: range,
                suggested_date: None,
                alternatives: Vec::new(),
            }
            .into());
        }

        let lookup = |date: NaiveDate| {
            series.find(date).map(|o| o.value).ok_or(QueryError::DateNotFound {
                date,
                available_range: range,
            })
        };
        let start_value = lookup(start)?;
        let end_value = lookup(end)?;

        if start_value == 0.0 {
            return Err(QueryError::invalid_argument(
                "start_date",
                format!("value on {start} is zero, percentage change is undefined"),
            )
            .into());
        }

        let percentage_change = round_to(pct_change(start_value, end_value), 2);
        Ok(PercentageChange {
            start_date: start,
            end_date: end,
            start_value,
            end_value,
            percentage_change,
            trend_direction: TrendDirection::from_change(percentage_change),
        })
    }

    pub fn get_trend_direction(&self, dataset: &str, start: NaiveDate, end: NaiveDate) -> QueryResult<TrendDirection> {
        Ok(self.calculate_percentage_change(dataset, start, end)?.trend_direction)
    }

    pub fn find_peak(&self, dataset: &str, range: Option<DateRange>) -> QueryResult<Extreme> {
        self.extreme(dataset, range, ExtremeKind::Peak)
    }

    pub fn find_valley(&self, dataset: &str, range: Option<DateRange>) -> QueryResult<Extreme> {
        self.extreme(dataset, range, ExtremeKind::Valley)
    }

    pub fn find_peak_and_valley(&self, dataset: &str, range: Option<DateRange>) -> QueryResult<PeakAndValley> {
        Ok(PeakAndValley {
            peak: self.find_peak(dataset, range)?,
            valley: self.find_valley(dataset, range)?,
        })
    }

    /// Rolling mean over `window` consecutive observations. Positions
    /// without a full window are dropped.
    pub fn calculate_moving_average(
        &self,
        dataset: &str,
        window: usize,
        range: Option<DateRange>,
    ) -> QueryResult<Vec<MovingAveragePoint>> {
        if window == 0 {
            return Err(QueryError::invalid_argument("window_size", "must be at least 1").into());
        }
        let observations = self.filtered(dataset, range)?;

        Ok(observations
            .windows(window)
            .map(|w| {
                let mean = w.iter().map(|o| o.value).sum::<f64>() / window as f64;
                MovingAveragePoint {
                    date: w[window - 1].period,
                    moving_average: round_to(mean, 2),
                }
            })
            .collect())
    }

    /// Least-squares fit of value against a 0-based index.
    pub fn calculate_trend_line(&self, dataset: &str, range: Option<DateRange>) -> QueryResult<TrendLine> {
        let observations = self.filtered(dataset, range)?;
        let values: Vec<f64> = observations.iter().map(|o| o.value).collect();

        let (slope, intercept) = least_squares(&values).ok_or_else(|| QueryError::InsufficientData {
            reason: format!("a trend line needs at least 2 observations, found {}", values.len()),
        })?;

        Ok(TrendLine {
            slope: round_to(slope, 4),
            intercept: round_to(intercept, 2),
            trend_direction: TrendDirection::from_change(slope),
        })
    }

    // -- Internals -------------------------------------------------------

    fn extreme(&self, dataset: &str, range: Option<DateRange>, kind: ExtremeKind) -> QueryResult<Extreme> {
        let observations = self.filtered(dataset, range)?;
        // First occurrence wins on ties.
        let mut best = observations[0];
        for obs in &observations[1..] {
            let better = match kind {
                ExtremeKind::Peak => obs.value > best.value,
                ExtremeKind::Valley => obs.value < best.value,
            };
            if better {
                best = *obs;
            }
        }
        Ok(Extreme {
            date: best.period,
            value: best.value,
            kind,
        })
    }

    /// Observations inside `range`; fails when nothing is left.
    fn filtered(&self, dataset: &str, range: Option<DateRange>) -> QueryResult<Vec<HistoricalObservation>> {
        let series = self.historical(dataset)?;
        let observations = series.within(range);
        if observations.is_empty() {
            let available = observed_range(series.observations(), dataset)?;
            return Err(QueryError::NoDataInRange {
                requested_range: range.unwrap_or(available),
                available_range: available,
            }
            .into());
        }
        Ok(observations)
    }
}

fn observed_range(observations: &[HistoricalObservation], dataset: &str) -> Result<DateRange, QueryError> {
    match (observations.first(), observations.last()) {
        (Some(first), Some(last)) => Ok(DateRange::new(first.period, last.period)),
        _ => Err(QueryError::InsufficientData {
            reason: format!("{dataset} has no observations"),
        }),
    }
}

/// `(slope, intercept)` for `y` against `0..n`, or `None` with fewer
/// than two points.
pub(crate) fn least_squares(y: &[f64]) -> Option<(f64, f64)> {
    let n = y.len();
    if n < 2 {
        return None;
    }
    let n_f = n as f64;
    let mean_x = (n_f - 1.0) / 2.0;
    let mean_y = y.iter().sum::<f64>() / n_f;

    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (i, v) in y.iter().enumerate() {
        let dx = i as f64 - mean_x;
        sxy += dx * (v - mean_y);
        sxx += dx * dx;
    }

    let slope = sxy / sxx;
    Some((slope, mean_y - slope * mean_x))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
