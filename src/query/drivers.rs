//! Market driver ranking and classification.

use serde::Serialize;

use super::{QueryEngine, QueryError, QueryResult};
use crate::data::{DriverRecord, StatSummary};
use crate::types::{round_to, Direction};

pub const DEFAULT_TOP_DRIVERS: usize = 5;
pub const DEFAULT_COMBINED_DRIVERS: usize = 10;

/// One side must outweigh the other by this factor to call a direction.
const NET_EFFECT_MARGIN: f64 = 1.2;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriverSummary {
    pub name: String,
    pub importance_mean: f64,
    pub importance_max: f64,
    pub importance_min: f64,
}

impl From<&DriverRecord> for DriverSummary {
    fn from(d: &DriverRecord) -> Self {
        Self {
            name: d.driver_name.clone(),
            importance_mean: d.importance_score,
            importance_max: d.importance_max,
            importance_min: d.importance_min,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriverDetails {
    pub name: String,
    pub direction: Direction,
    pub direction_explanation: String,
    pub pearson_correlation: StatSummary,
    pub granger_causality: StatSummary,
    pub lag: Option<String>,
    pub lag_explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriverSignal {
    pub name: String,
    pub importance: f64,
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NetEffect {
    Increase,
    Decrease,
    Mixed,
}

impl NetEffect {
    pub fn explanation(&self) -> &'static str {
        match self {
            NetEffect::Increase => "Drivers strongly support price increases",
            NetEffect::Decrease => "Drivers strongly support price decreases",
            NetEffect::Mixed => "Drivers show mixed signals with no clear direction",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CombinedDrivers {
    pub drivers_supporting_increase: Vec<DriverSignal>,
    pub drivers_supporting_decrease: Vec<DriverSignal>,
    pub total_importance_increase: f64,
    pub total_importance_decrease: f64,
    pub net_effect: NetEffect,
    pub net_explanation: String,
    pub total_drivers_analyzed: usize,
}

impl QueryEngine {
    /// Highest-importance drivers first; at most `top_n`.
    pub fn get_top_drivers(&self, dataset: &str, top_n: usize) -> QueryResult<Vec<DriverSummary>> {
        let drivers = self.drivers(dataset)?;
        Ok(drivers.iter().take(top_n).map(DriverSummary::from).collect())
    }

    pub fn get_driver_details(&self, dataset: &str, driver_name: &str) -> QueryResult<DriverDetails> {
        let drivers = self.drivers(dataset)?;
        let Some(driver) = drivers.iter().find(|d| d.driver_name == driver_name) else {
            return Err(QueryError::DriverNotFound {
                driver_name: driver_name.to_string(),
                available_drivers: drivers.iter().map(|d| d.driver_name.clone()).collect(),
            }
            .into());
        };

        Ok(DriverDetails {
            name: driver.driver_name.clone(),
            direction: driver.direction,
            direction_explanation: driver.direction.explanation().to_string(),
            pearson_correlation: driver.pearson_correlation.unwrap_or_default(),
            granger_causality: driver.granger_causality.unwrap_or_default(),
            lag: driver.lag.clone(),
            lag_explanation: driver.lag_explanation(),
        })
    }

    /// Net direction of the top drivers, weighted by importance.
    pub fn analyze_drivers_combined(&self, dataset: &str, top_n: usize) -> QueryResult<CombinedDrivers> {
        let drivers = self.drivers(dataset)?;
        let top: Vec<&DriverRecord> = drivers.iter().take(top_n).collect();

        let (positive, negative): (Vec<DriverSignal>, Vec<DriverSignal>) = top
            .iter()
            .map(|d| DriverSignal {
                name: d.driver_name.clone(),
                importance: d.importance_score,
                direction: d.direction,
            })
            .partition(|s| s.direction == Direction::Positive);

        let positive_total: f64 = positive.iter().map(|s| s.importance).sum();
        let negative_total: f64 = negative.iter().map(|s| s.importance).sum();
        let net_effect = classify_net_effect(positive_total, negative_total);

        Ok(CombinedDrivers {
            drivers_supporting_increase: positive,
            drivers_supporting_decrease: negative,
            total_importance_increase: round_to(positive_total, 2),
            total_importance_decrease: round_to(negative_total, 2),
            net_effect,
            net_explanation: net_effect.explanation().to_string(),
            total_drivers_analyzed: top.len(),
        })
    }
}

fn classify_net_effect(positive: f64, negative: f64) -> NetEffect {
    if positive > negative * NET_EFFECT_MARGIN {
        NetEffect::Increase
    } else if negative > positive * NET_EFFECT_MARGIN {
        NetEffect::Decrease
    } else {
        NetEffect::Mixed
    }
}
