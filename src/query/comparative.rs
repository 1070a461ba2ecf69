//! Cross-dataset comparison: alignment, correlation, lag timing, and
//! a multi-commodity synthesis.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use super::drivers::DEFAULT_TOP_DRIVERS;
use super::{EngineError, QueryEngine, QueryError, QueryResult};
use crate::data::DriverRecord;
use crate::types::{round_to, DateRange};

/// A lead needs at least this many months of average lag advantage.
const LEAD_MARGIN_MONTHS: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlignedRecord {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub values: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetComparison {
    pub datasets: Vec<String>,
    pub common_date_range: Option<DateRange>,
    pub aligned_data: Vec<AlignedRecord>,
    pub total_aligned_records: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationDirection {
    Positive,
    Negative,
    None,
}

impl CorrelationDirection {
    fn label(&self) -> &'static str {
        match self {
            CorrelationDirection::Positive => "positive",
            CorrelationDirection::Negative => "negative",
            CorrelationDirection::None => "none",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strength {
    Strong,
    Moderate,
    Weak,
}

impl Strength {
    fn label(&self) -> &'static str {
        match self {
            Strength::Strong => "strong",
            Strength::Moderate => "moderate",
            Strength::Weak => "weak",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Correlation {
    pub dataset1: String,
    pub dataset2: String,
    pub correlation_coefficient: f64,
    pub direction: CorrelationDirection,
    pub strength: Strength,
    pub interpretation: String,
    pub data_points_used: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictiveValue {
    High,
    Moderate,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimingInsight {
    pub driver: String,
    pub dataset1_lag: u32,
    pub dataset2_lag: u32,
    pub interpretation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimingAnalysis {
    pub dataset1: String,
    pub dataset2: String,
    pub common_drivers: Vec<String>,
    /// A dataset name, or `"similar"`.
    pub lead_commodity: String,
    pub average_lag_months: f64,
    pub timing_insights: Vec<TimingInsight>,
    pub predictive_value: PredictiveValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommodityProfile {
    pub latest_value: f64,
    pub top_drivers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossCommodityInsights {
    pub shared_drivers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MultiCommodityStrategy {
    pub commodities_analyzed: Vec<String>,
    pub individual_analysis: BTreeMap<String, CommodityProfile>,
    pub cross_commodity_insights: CrossCommodityInsights,
    pub strategic_recommendations: Vec<String>,
}

impl QueryEngine {
    /// One record per date present in every dataset, ascending.
    pub fn compare_datasets(&self, datasets: &[&str]) -> QueryResult<DatasetComparison> {
        if datasets.is_empty() {
            return Err(QueryError::invalid_argument("dataset_names", "at least one dataset is required").into());
        }

        let series = datasets
            .iter()
            .map(|name| self.historical(name))
            .collect::<QueryResult<Vec<_>>>()?;

        let mut common: BTreeSet<NaiveDate> = series[0].observations().iter().map(|o| o.period).collect();
        for s in &series[1..] {
            let dates: BTreeSet<NaiveDate> = s.observations().iter().map(|o| o.period).collect();
            common = common.intersection(&dates).copied().collect();
        }

        let aligned_data: Vec<AlignedRecord> = common
            .iter()
            .map(|date| AlignedRecord {
                date: *date,
                values: datasets
                    .iter()
                    .zip(&series)
                    .filter_map(|(name, s)| s.find(*date).map(|o| (name.to_string(), o.value)))
                    .collect(),
            })
            .collect();

        let common_date_range = match (common.first(), common.last()) {
            (Some(first), Some(last)) => Some(DateRange::new(*first, *last)),
            _ => None,
        };

        Ok(DatasetComparison {
            datasets: datasets.iter().map(|s| s.to_string()).collect(),
            common_date_range,
            total_aligned_records: aligned_data.len(),
            aligned_data,
        })
    }

    /// Pearson correlation over the aligned history of two datasets.
    pub fn calculate_correlation(&self, dataset1: &str, dataset2: &str) -> QueryResult<Correlation> {
        let comparison = self.compare_datasets(&[dataset1, dataset2])?;
        let (xs, ys): (Vec<f64>, Vec<f64>) = comparison
            .aligned_data
            .iter()
            .filter_map(|r| Some((*r.values.get(dataset1)?, *r.values.get(dataset2)?)))
            .unzip();

        let r = pearson(&xs, &ys).ok_or_else(|| QueryError::InsufficientData {
            reason: format!(
                "correlation between {dataset1} and {dataset2} needs at least 2 overlapping, non-constant observations (found {})",
                xs.len()
            ),
        })?;

        let direction = if r > 0.1 {
            CorrelationDirection::Positive
        } else if r < -0.1 {
            CorrelationDirection::Negative
        } else {
            CorrelationDirection::None
        };

        let strength = if r.abs() >= 0.7 {
            Strength::Strong
        } else if r.abs() >= 0.3 {
            Strength::Moderate
        } else {
            Strength::Weak
        };

        let interpretation = match direction {
            CorrelationDirection::Positive => format!(
                "{} positive correlation - when {dataset1} rises, {dataset2} tends to rise",
                capitalize(strength.label())
            ),
            CorrelationDirection::Negative => format!(
                "{} negative correlation - when {dataset1} rises, {dataset2} tends to fall",
                capitalize(strength.label())
            ),
            CorrelationDirection::None => {
                format!("No meaningful correlation - {dataset1} and {dataset2} move independently")
            }
        };

        Ok(Correlation {
            dataset1: dataset1.to_string(),
            dataset2: dataset2.to_string(),
            correlation_coefficient: round_to(r, 2),
            direction,
            strength,
            interpretation,
            data_points_used: xs.len(),
        })
    }

    /// Compare driver lags shared by two datasets. A missing lag counts
    /// as zero months.
    pub fn analyze_timing_relationships(&self, dataset1: &str, dataset2: &str) -> QueryResult<TimingAnalysis> {
        let drivers1 = self.drivers(dataset1)?;
        let drivers2 = self.drivers(dataset2)?;

        let lags1 = lag_table(&drivers1);
        let lags2 = lag_table(&drivers2);
        let common_drivers: Vec<String> = lags1
            .keys()
            .filter(|name| lags2.contains_key(*name))
            .cloned()
            .collect();

        let mut timing_insights = Vec::with_capacity(common_drivers.len());
        let (mut sum1, mut sum2, mut sum_diff) = (0.0, 0.0, 0.0);
        for driver in &common_drivers {
            let lag1 = lags1[driver];
            let lag2 = lags2[driver];
            sum1 += lag1 as f64;
            sum2 += lag2 as f64;
            sum_diff += (lag1 as f64 - lag2 as f64).abs();

            let interpretation = if lag1 < lag2 {
                format!("{dataset1} responds after {lag1} months, {dataset2} follows after {lag2} months")
            } else if lag2 < lag1 {
                format!("{dataset2} responds after {lag2} months, {dataset1} follows after {lag1} months")
            } else {
                format!("Both respond after {lag1} months to {driver}")
            };
            timing_insights.push(TimingInsight {
                driver: driver.clone(),
                dataset1_lag: lag1,
                dataset2_lag: lag2,
                interpretation,
            });
        }

        let n = common_drivers.len().max(1) as f64;
        let (avg1, avg2, avg_diff) = (sum1 / n, sum2 / n, sum_diff / n);

        let lead_commodity = if avg1 < avg2 - LEAD_MARGIN_MONTHS {
            dataset1.to_string()
        } else if avg2 < avg1 - LEAD_MARGIN_MONTHS {
            dataset2.to_string()
        } else {
            "similar".to_string()
        };

        let predictive_value = if avg_diff >= 3.0 {
            PredictiveValue::High
        } else if avg_diff >= 1.0 {
            PredictiveValue::Moderate
        } else {
            PredictiveValue::Low
        };

        Ok(TimingAnalysis {
            dataset1: dataset1.to_string(),
            dataset2: dataset2.to_string(),
            common_drivers,
            lead_commodity,
            average_lag_months: round_to(avg_diff, 1),
            timing_insights,
            predictive_value,
        })
    }

    /// Latest value and top drivers per commodity, plus shared drivers
    /// and strategy lines.
    pub fn analyze_multi_commodity_strategy(&self, datasets: &[&str]) -> QueryResult<MultiCommodityStrategy> {
        if datasets.is_empty() {
            return Err(QueryError::invalid_argument("dataset_names", "at least one dataset is required").into());
        }

        let mut individual_analysis = BTreeMap::new();
        let mut driver_lists: Vec<Vec<String>> = Vec::new();
        for name in datasets {
            let latest = self.latest_value(name)?;
            let top_drivers: Vec<String> = self
                .get_top_drivers(name, DEFAULT_TOP_DRIVERS)?
                .into_iter()
                .map(|d| d.name)
                .collect();
            driver_lists.push(top_drivers.clone());
            individual_analysis.insert(
                name.to_string(),
                CommodityProfile {
                    latest_value: latest.value,
                    top_drivers,
                },
            );
        }

        // Keep the first commodity's ranking order.
        let shared_drivers: Vec<String> = if datasets.len() >= 2 {
            driver_lists[0]
                .iter()
                .filter(|name| driver_lists[1..].iter().all(|list| list.contains(name)))
                .cloned()
                .collect()
        } else {
            Vec::new()
        };

        let mut recommendations = Vec::new();
        if !shared_drivers.is_empty() {
            let shown: Vec<&str> = shared_drivers.iter().take(3).map(String::as_str).collect();
            recommendations.push(format!(
                "Monitor {} shared market drivers affecting all commodities: {}",
                shared_drivers.len(),
                shown.join(", ")
            ));
        }
        for name in datasets {
            if let Some(profile) = individual_analysis.get(*name) {
                recommendations.push(format!(
                    "{name}: Current value {:.2}, influenced by {} key drivers",
                    profile.latest_value,
                    profile.top_drivers.len()
                ));
            }
        }

        if let [first, second] = datasets {
            match self.calculate_correlation(first, second) {
                Ok(corr) => recommendations.push(format!(
                    "Correlation: {} {} relationship between {first} and {second}",
                    corr.strength.label(),
                    corr.direction.label()
                )),
                Err(EngineError::Query(_)) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(MultiCommodityStrategy {
            commodities_analyzed: datasets.iter().map(|s| s.to_string()).collect(),
            individual_analysis,
            cross_commodity_insights: CrossCommodityInsights { shared_drivers },
            strategic_recommendations: recommendations,
        })
    }
}

/// Lag in months per driver name, sorted by name.
fn lag_table(drivers: &[DriverRecord]) -> BTreeMap<String, u32> {
    let mut table = BTreeMap::new();
    for d in drivers {
        table
            .entry(d.driver_name.clone())
            .or_insert_with(|| d.lag_periods.unwrap_or(0));
    }
    table
}

/// Pearson coefficient, or `None` for fewer than two points or a
/// constant series.
pub(crate) fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return None;
    }
    let mean_x = xs[..n].iter().sum::<f64>() / n as f64;
    let mean_y = ys[..n].iter().sum::<f64>() / n as f64;

    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in xs[..n].iter().zip(&ys[..n]) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }

    if sxx == 0.0 || syy == 0.0 {
        return None;
    }
    Some(sxy / (sxx * syy).sqrt())
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
