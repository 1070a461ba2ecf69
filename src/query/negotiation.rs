//! Supplier negotiation support.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::drivers::{DriverSummary, DEFAULT_COMBINED_DRIVERS};
use super::recommendations::PriceTrend;
use super::{pct_change, QueryEngine, QueryError, QueryResult};
use crate::types::{round_to, Direction};

const DRIVER_POINTS: usize = 3;
const MAX_ARGUMENTS: usize = 5;
/// Half-width of the "aligned" band around the median, as a fraction.
const ALIGNED_BAND: f64 = 0.02;

/// Low/high band preference for claim validation.
const LOW_BANDS: [f64; 3] = [0.1, 0.05, 0.15];
const HIGH_BANDS: [f64; 3] = [0.9, 0.95, 0.85];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PointType {
    Fact,
    SupportingIncrease,
    ContradictingIncrease,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TalkingPoint {
    pub point: String,
    #[serde(rename = "type")]
    pub kind: PointType,
    pub citation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketContext {
    pub current_price: f64,
    pub forecast_price: f64,
    pub price_trend: PriceTrend,
    pub top_drivers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TalkingPoints {
    pub dataset: String,
    pub talking_points: Vec<TalkingPoint>,
    pub market_context: MarketContext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimClassification {
    AboveForecastRange,
    BelowForecastRange,
    AboveForecast,
    BelowForecast,
    AlignedWithForecast,
}

impl ClaimClassification {
    pub fn verdict(&self) -> &'static str {
        match self {
            ClaimClassification::AboveForecastRange => "Challenge this claim - significantly above forecast",
            ClaimClassification::BelowForecastRange => "Excellent deal - below forecast range",
            ClaimClassification::AboveForecast => "Negotiate down - above expected forecast",
            ClaimClassification::BelowForecast => "Good deal - below expected forecast",
            ClaimClassification::AlignedWithForecast => "Reasonable - aligned with forecast",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ForecastRange {
    pub low: f64,
    pub high: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClaimValidation {
    pub dataset: String,
    pub claimed_price: f64,
    pub forecast_median: f64,
    pub forecast_range: ForecastRange,
    pub difference_abs: f64,
    pub difference_pct: f64,
    pub classification: ClaimClassification,
    pub verdict: String,
    pub current_price: f64,
    pub forecast_date: NaiveDate,
}

/// The price move a negotiator wants to argue for or against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceDirection {
    Increase,
    Decrease,
}

impl PriceDirection {
    fn supported_by(&self, driver: Direction) -> bool {
        matches!(
            (self, driver),
            (PriceDirection::Increase, Direction::Positive) | (PriceDirection::Decrease, Direction::Negative)
        )
    }
}

impl std::str::FromStr for PriceDirection {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "increase" => Ok(PriceDirection::Increase),
            "decrease" => Ok(PriceDirection::Decrease),
            other => Err(QueryError::invalid_argument(
                "price_direction",
                format!("'{other}' is not one of: increase, decrease"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Bullish,
    Bearish,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArgumentBalance {
    pub supporting_count: usize,
    pub contradicting_count: usize,
    pub net_sentiment: Sentiment,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriverArguments {
    pub dataset: String,
    pub price_direction: PriceDirection,
    pub supporting_drivers: Vec<DriverSummary>,
    pub contradicting_drivers: Vec<DriverSummary>,
    pub balance: ArgumentBalance,
}

impl QueryEngine {
    /// Current price, forecast move, and the top three drivers, each
    /// with a data citation.
    pub fn generate_negotiation_talking_points(&self, dataset: &str, months_ahead: u32) -> QueryResult<TalkingPoints> {
        let current = self.latest_value(dataset)?;
        let forecast = self.get_forecast(dataset, months_ahead)?;
        let drivers = self.drivers(dataset)?;
        if current.value == 0.0 {
            return Err(QueryError::invalid_argument("dataset_name", format!("latest {dataset} value is zero")).into());
        }

        let pct = pct_change(current.value, forecast.forecast_value);
        let mut points = vec![TalkingPoint {
            point: format!("Current market price is ${:.2} as of {}", current.value, current.period),
            kind: PointType::Fact,
            citation: format!("Historical data: {dataset}"),
        }];

        points.push(if pct > 0.0 {
            TalkingPoint {
                point: format!(
                    "Forecast shows {pct:.1}% increase to ${:.2} by {}",
                    forecast.forecast_value, forecast.date
                ),
                kind: PointType::SupportingIncrease,
                citation: format!("Forecast data: {dataset}"),
            }
        } else {
            TalkingPoint {
                point: format!(
                    "Forecast shows {:.1}% decrease to ${:.2} by {}",
                    pct.abs(),
                    forecast.forecast_value,
                    forecast.date
                ),
                kind: PointType::ContradictingIncrease,
                citation: format!("Forecast data: {dataset}"),
            }
        });

        let top: Vec<_> = drivers.iter().take(DRIVER_POINTS).collect();
        for driver in &top {
            let kind = match driver.direction {
                Direction::Positive => PointType::SupportingIncrease,
                Direction::Negative => PointType::ContradictingIncrease,
            };
            points.push(TalkingPoint {
                point: format!(
                    "{} ({:.1}% importance) shows {} correlation",
                    driver.driver_name, driver.importance_score, driver.direction
                ),
                kind,
                citation: format!("Driver analysis: {dataset}"),
            });
        }

        Ok(TalkingPoints {
            dataset: dataset.to_string(),
            talking_points: points,
            market_context: MarketContext {
                current_price: current.value,
                forecast_price: forecast.forecast_value,
                price_trend: if pct > 0.0 { PriceTrend::Rising } else { PriceTrend::Falling },
                top_drivers: top.iter().map(|d| d.driver_name.clone()).collect(),
            },
        })
    }

    /// Compare a quoted price against the forecast median and bands.
    pub fn validate_supplier_claim(
        &self,
        dataset: &str,
        claimed_price: f64,
        months_ahead: u32,
    ) -> QueryResult<ClaimValidation> {
        if !claimed_price.is_finite() {
            return Err(QueryError::invalid_argument("claimed_price", "must be a finite number").into());
        }

        let current = self.latest_value(dataset)?;
        let snapshot = self.get_forecast_with_quantiles(dataset, months_ahead)?;

        let pick = |levels: &[f64]| -> Result<f64, QueryError> {
            levels
                .iter()
                .find_map(|level| band(&snapshot.quantiles, *level))
                .ok_or_else(|| QueryError::QuantileNotAvailable {
                    quantile: levels[0],
                    available_quantiles: snapshot.quantiles.keys().cloned().collect(),
                })
        };
        let median = pick(&[0.5][..])?;
        let low = pick(&LOW_BANDS[..])?;
        let high = pick(&HIGH_BANDS[..])?;

        if median == 0.0 {
            return Err(QueryError::invalid_argument("dataset_name", "forecast median is zero").into());
        }

        let classification = if claimed_price > high {
            ClaimClassification::AboveForecastRange
        } else if claimed_price < low {
            ClaimClassification::BelowForecastRange
        } else if claimed_price > median * (1.0 + ALIGNED_BAND) {
            ClaimClassification::AboveForecast
        } else if claimed_price < median * (1.0 - ALIGNED_BAND) {
            ClaimClassification::BelowForecast
        } else {
            ClaimClassification::AlignedWithForecast
        };

        Ok(ClaimValidation {
            dataset: dataset.to_string(),
            claimed_price,
            forecast_median: round_to(median, 2),
            forecast_range: ForecastRange {
                low: round_to(low, 2),
                high: round_to(high, 2),
            },
            difference_abs: round_to(claimed_price - median, 2),
            difference_pct: round_to(pct_change(median, claimed_price), 2),
            classification,
            verdict: classification.verdict().to_string(),
            current_price: current.value,
            forecast_date: snapshot.date,
        })
    }

    /// Split the top drivers into those that support and those that
    /// contradict a stated price move.
    pub fn identify_driver_arguments(&self, dataset: &str, direction: PriceDirection) -> QueryResult<DriverArguments> {
        let drivers = self.drivers(dataset)?;

        let (supporting, contradicting): (Vec<_>, Vec<_>) = drivers
            .iter()
            .take(DEFAULT_COMBINED_DRIVERS)
            .partition(|d| direction.supported_by(d.direction));

        let balance = ArgumentBalance {
            supporting_count: supporting.len(),
            contradicting_count: contradicting.len(),
            net_sentiment: if supporting.len() > contradicting.len() {
                Sentiment::Bullish
            } else {
                Sentiment::Bearish
            },
        };

        let summarize = |list: Vec<&crate::data::DriverRecord>| -> Vec<DriverSummary> {
            list.into_iter().take(MAX_ARGUMENTS).map(DriverSummary::from).collect()
        };

        Ok(DriverArguments {
            dataset: dataset.to_string(),
            price_direction: direction,
            supporting_drivers: summarize(supporting),
            contradicting_drivers: summarize(contradicting),
            balance,
        })
    }
}

fn band(quantiles: &BTreeMap<String, f64>, level: f64) -> Option<f64> {
    quantiles
        .iter()
        .find(|(label, _)| label.parse::<f64>().map(|q| (q - level).abs() < 1e-9).unwrap_or(false))
        .map(|(_, v)| *v)
}
