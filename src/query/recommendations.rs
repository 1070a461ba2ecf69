//! Procurement recommendations built on the historical and forecast
//! queries: forward-buy timing, scenario impact, multi-commodity
//! prioritization, and production sequencing.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

use super::comparative::Correlation;
use super::{pct_change, EngineError, QueryEngine, QueryError, QueryResult};
use crate::types::round_to;

pub const DEFAULT_MONTHS_AHEAD: u32 = 3;
pub const DEFAULT_QUANTITY: u32 = 1000;

/// Percent move beyond which a direction is called.
const ACTION_THRESHOLD_PCT: f64 = 2.0;
/// Moves inside `(HEDGE_FLOOR_PCT, ACTION_THRESHOLD_PCT]` become a hedge.
const HEDGE_FLOOR_PCT: f64 = 0.5;
/// Moves larger than this add one urgency point.
const URGENCY_BONUS_PCT: f64 = 5.0;
const CORRELATION_INSIGHT_THRESHOLD: f64 = 0.5;

// ---------------------------------------------------------------------------
// Forward buy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuyDecision {
    BuyNow,
    Wait,
    Monitor,
    Hedge,
}

impl BuyDecision {
    /// Classify a forecast percent change.
    pub fn from_change(pct: f64) -> Self {
        if pct.abs() > HEDGE_FLOOR_PCT && pct.abs() <= ACTION_THRESHOLD_PCT {
            BuyDecision::Hedge
        } else if pct > ACTION_THRESHOLD_PCT {
            BuyDecision::BuyNow
        } else if pct < -ACTION_THRESHOLD_PCT {
            BuyDecision::Wait
        } else {
            BuyDecision::Monitor
        }
    }

    pub fn urgency(&self) -> u32 {
        match self {
            BuyDecision::BuyNow => 3,
            BuyDecision::Wait => 2,
            BuyDecision::Monitor | BuyDecision::Hedge => 1,
        }
    }

    fn action(&self) -> &'static str {
        match self {
            BuyDecision::BuyNow => "buying now",
            BuyDecision::Wait => "waiting",
            BuyDecision::Monitor => "monitoring",
            BuyDecision::Hedge => "hedging",
        }
    }

    fn rationale(&self, pct: f64) -> String {
        match self {
            BuyDecision::BuyNow => format!("Price expected to rise {pct:.1}%. Buy now to lock in lower price."),
            BuyDecision::Wait => format!("Price expected to fall {:.1}%. Wait for lower prices.", pct.abs()),
            BuyDecision::Monitor => "Price stable. No urgency to act. Monitor for changes.".to_string(),
            BuyDecision::Hedge => "Price movement uncertain. Consider buying 50-70% now, wait on rest.".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForwardBuy {
    pub recommendation: BuyDecision,
    pub current_price: f64,
    pub current_date: NaiveDate,
    pub forecast_price: f64,
    pub forecast_date: NaiveDate,
    pub price_change_pct: f64,
    pub price_change_abs: f64,
    pub savings: f64,
    pub rationale: String,
    pub action: String,
    pub quantity: u32,
}

// ---------------------------------------------------------------------------
// Impact analysis
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceTrend {
    Rising,
    Falling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    BestCase,
    Expected,
    WorstCase,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioImpact {
    pub scenario: Scenario,
    pub forecast_price: f64,
    pub price_change_abs: f64,
    pub price_change_pct: f64,
    pub total_impact: f64,
    pub impact_per_unit: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConfidenceRange {
    pub min: f64,
    pub median: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImpactAnalysis {
    pub dataset: String,
    pub current_price: f64,
    pub current_date: NaiveDate,
    pub forecast_date: NaiveDate,
    pub months_ahead: u32,
    pub quantity: u32,
    pub price_direction: PriceTrend,
    pub best_case: ScenarioImpact,
    pub expected: ScenarioImpact,
    pub worst_case: ScenarioImpact,
    pub confidence_range: ConfidenceRange,
}

// ---------------------------------------------------------------------------
// Multi-commodity scenario
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrioritizedAction {
    pub dataset: String,
    pub recommendation: BuyDecision,
    pub urgency_score: u32,
    pub price_change_pct: f64,
    pub savings: f64,
    pub rationale: String,
    pub current_price: f64,
    pub forecast_price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MultiCommodityScenario {
    pub datasets_analyzed: Vec<String>,
    pub months_ahead: u32,
    pub individual_recommendations: BTreeMap<String, ForwardBuy>,
    pub prioritized_actions: Vec<PrioritizedAction>,
    pub correlations: Vec<Correlation>,
    pub insights: Vec<String>,
    pub total_potential_savings: f64,
}

// ---------------------------------------------------------------------------
// Production sequencing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Favorability {
    Favorable,
    ModeratelyFavorable,
    Unfavorable,
}

impl Favorability {
    pub fn from_change(pct: f64) -> Self {
        if pct <= 0.0 {
            Favorability::Favorable
        } else if pct <= ACTION_THRESHOLD_PCT {
            Favorability::ModeratelyFavorable
        } else {
            Favorability::Unfavorable
        }
    }

    pub fn priority(&self) -> u32 {
        match self {
            Favorability::Favorable => 1,
            Favorability::ModeratelyFavorable => 2,
            Favorability::Unfavorable => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommodityOutlook {
    pub dataset: String,
    pub current_price: f64,
    pub forecast_price: f64,
    pub price_change_pct: f64,
    pub favorability: Favorability,
    pub priority: u32,
    pub current_date: NaiveDate,
    pub forecast_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SequenceStep {
    pub sequence_order: usize,
    pub dataset: String,
    pub recommendation: String,
    pub favorability: Favorability,
    pub price_trend: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CostImpactSummary {
    pub favorable_trend: f64,
    pub unfavorable_trend: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductionSequence {
    pub datasets_analyzed: Vec<String>,
    pub months_ahead: u32,
    pub commodity_analysis: Vec<CommodityOutlook>,
    pub recommended_sequence: Vec<SequenceStep>,
    pub favorable_commodities: Vec<String>,
    pub unfavorable_commodities: Vec<String>,
    pub insights: Vec<String>,
    pub cost_impact_summary: CostImpactSummary,
}

impl QueryEngine {
    /// Buy now, wait, hedge, or monitor, from latest value vs. forecast.
    pub fn recommend_forward_buy(&self, dataset: &str, months_ahead: u32, quantity: u32) -> QueryResult<ForwardBuy> {
        let current = self.latest_value(dataset)?;
        let forecast = self.get_forecast(dataset, months_ahead)?;
        nonzero_price(dataset, current.value)?;

        let change = forecast.forecast_value - current.value;
        let pct = pct_change(current.value, forecast.forecast_value);
        let decision = BuyDecision::from_change(pct);

        // Savings use the cent-rounded unit change.
        let unit_change = round_to(change, 2);
        let savings = match decision {
            BuyDecision::BuyNow | BuyDecision::Wait => unit_change.abs() * f64::from(quantity),
            BuyDecision::Monitor | BuyDecision::Hedge => 0.0,
        };

        Ok(ForwardBuy {
            recommendation: decision,
            current_price: round_to(current.value, 2),
            current_date: current.period,
            forecast_price: round_to(forecast.forecast_value, 2),
            forecast_date: forecast.date,
            price_change_pct: round_to(pct, 2),
            price_change_abs: unit_change,
            savings,
            rationale: decision.rationale(pct),
            action: decision.action().to_string(),
            quantity,
        })
    }

    /// Best, expected, and worst case from the 0.1/0.5/0.9 bands, with
    /// best and worst relative to a buyer.
    pub fn calculate_impact_analysis(
        &self,
        dataset: &str,
        months_ahead: u32,
        quantity: u32,
    ) -> QueryResult<ImpactAnalysis> {
        let current = self.latest_value(dataset)?;
        let snapshot = self.get_forecast_with_quantiles(dataset, months_ahead)?;
        nonzero_price(dataset, current.value)?;

        let band = |level: f64| -> Result<f64, QueryError> {
            snapshot
                .quantiles
                .iter()
                .find(|(label, _)| label.parse::<f64>().map(|q| (q - level).abs() < 1e-9).unwrap_or(false))
                .map(|(_, v)| *v)
                .ok_or_else(|| QueryError::QuantileNotAvailable {
                    quantile: level,
                    available_quantiles: snapshot.quantiles.keys().cloned().collect(),
                })
        };
        let low = band(0.1)?;
        let median = band(0.5)?;
        let high = band(0.9)?;

        let price_direction = if median > current.value {
            PriceTrend::Rising
        } else {
            PriceTrend::Falling
        };
        let (best, worst) = match price_direction {
            PriceTrend::Rising => (low, high),
            PriceTrend::Falling => (high, low),
        };

        let scenario = |scenario: Scenario, price: f64| {
            let change = price - current.value;
            ScenarioImpact {
                scenario,
                forecast_price: round_to(price, 2),
                price_change_abs: round_to(change, 2),
                price_change_pct: round_to(pct_change(current.value, price), 2),
                total_impact: round_to(change * f64::from(quantity), 2),
                impact_per_unit: round_to(change, 2),
            }
        };

        Ok(ImpactAnalysis {
            dataset: dataset.to_string(),
            current_price: round_to(current.value, 2),
            current_date: current.period,
            forecast_date: snapshot.date,
            months_ahead,
            quantity,
            price_direction,
            best_case: scenario(Scenario::BestCase, best),
            expected: scenario(Scenario::Expected, median),
            worst_case: scenario(Scenario::WorstCase, worst),
            confidence_range: ConfidenceRange {
                min: round_to(low, 2),
                median: round_to(median, 2),
                max: round_to(high, 2),
            },
        })
    }

    /// Forward-buy per commodity, ranked by urgency.
    pub fn analyze_multi_commodity_scenario(
        &self,
        datasets: &[&str],
        months_ahead: u32,
        quantity: u32,
    ) -> QueryResult<MultiCommodityScenario> {
        if datasets.is_empty() {
            return Err(QueryError::invalid_argument("dataset_names", "at least one dataset is required").into());
        }

        let mut individual = BTreeMap::new();
        let mut prioritized = Vec::with_capacity(datasets.len());
        for name in datasets {
            let rec = self.recommend_forward_buy(name, months_ahead, quantity)?;
            let mut urgency = rec.recommendation.urgency();
            if rec.price_change_pct.abs() > URGENCY_BONUS_PCT {
                urgency += 1;
            }
            prioritized.push(PrioritizedAction {
                dataset: name.to_string(),
                recommendation: rec.recommendation,
                urgency_score: urgency,
                price_change_pct: rec.price_change_pct,
                savings: rec.savings,
                rationale: rec.rationale.clone(),
                current_price: rec.current_price,
                forecast_price: rec.forecast_price,
            });
            individual.insert(name.to_string(), rec);
        }
        prioritized.sort_by(|a, b| b.urgency_score.cmp(&a.urgency_score));

        let mut correlations = Vec::new();
        for (i, a) in datasets.iter().enumerate() {
            for b in &datasets[i + 1..] {
                match self.calculate_correlation(a, b) {
                    Ok(corr) => correlations.push(corr),
                    Err(EngineError::Query(_)) => {}
                    Err(e) => return Err(e),
                }
            }
        }

        let mut insights = Vec::new();
        for corr in &correlations {
            let r = corr.correlation_coefficient;
            if r.abs() > CORRELATION_INSIGHT_THRESHOLD {
                let (direction, movement) = if r > 0.0 {
                    ("positive", "together")
                } else {
                    ("negative", "opposite")
                };
                insights.push(format!(
                    "{} and {} show {direction} correlation ({r:.2}). Price movements tend to move {movement}.",
                    corr.dataset1, corr.dataset2
                ));
            }
        }

        let buy_count = prioritized.iter().filter(|p| p.recommendation == BuyDecision::BuyNow).count();
        let wait_count = prioritized.iter().filter(|p| p.recommendation == BuyDecision::Wait).count();
        if buy_count > 0 && wait_count > 0 {
            insights.push(format!(
                "Mixed signals: {buy_count} commodity(ies) rising, {wait_count} falling. Consider staggered procurement strategy."
            ));
        }

        let total_potential_savings = round_to(prioritized.iter().map(|p| p.savings).sum(), 2);

        Ok(MultiCommodityScenario {
            datasets_analyzed: datasets.iter().map(|s| s.to_string()).collect(),
            months_ahead,
            individual_recommendations: individual,
            prioritized_actions: prioritized,
            correlations,
            insights,
            total_potential_savings,
        })
    }

    /// Order production by input-cost outlook: falling prices first.
    pub fn recommend_production_sequencing(
        &self,
        datasets: &[&str],
        months_ahead: u32,
    ) -> QueryResult<ProductionSequence> {
        if datasets.is_empty() {
            return Err(QueryError::invalid_argument("dataset_names", "at least one dataset is required").into());
        }

        let mut analysis = Vec::with_capacity(datasets.len());
        for name in datasets {
            let current = self.latest_value(name)?;
            let forecast = self.get_forecast(name, months_ahead)?;
            nonzero_price(name, current.value)?;

            let pct = pct_change(current.value, forecast.forecast_value);
            let favorability = Favorability::from_change(pct);
            analysis.push(CommodityOutlook {
                dataset: name.to_string(),
                current_price: round_to(current.value, 2),
                forecast_price: round_to(forecast.forecast_value, 2),
                price_change_pct: round_to(pct, 2),
                favorability,
                priority: favorability.priority(),
                current_date: current.period,
                forecast_date: forecast.date,
            });
        }
        analysis.sort_by_key(|c| c.priority);

        let mut sequence = Vec::with_capacity(analysis.len());
        let mut favorable = Vec::new();
        let mut unfavorable = Vec::new();
        let (mut favorable_trend, mut unfavorable_trend) = (0.0, 0.0);

        for (i, c) in analysis.iter().enumerate() {
            let recommendation = match c.favorability {
                Favorability::Favorable => format!(
                    "Prioritize production using {} (prices falling {:.1}%)",
                    c.dataset,
                    c.price_change_pct.abs()
                ),
                Favorability::ModeratelyFavorable => {
                    format!("Schedule production using {} normally (prices stable)", c.dataset)
                }
                Favorability::Unfavorable => format!(
                    "Delay production using {} if possible (prices rising {:.1}%)",
                    c.dataset, c.price_change_pct
                ),
            };
            match c.favorability {
                Favorability::Unfavorable => {
                    unfavorable.push(c.dataset.clone());
                    unfavorable_trend += c.price_change_pct;
                }
                _ => {
                    favorable.push(c.dataset.clone());
                    favorable_trend += c.price_change_pct;
                }
            }
            sequence.push(SequenceStep {
                sequence_order: i + 1,
                dataset: c.dataset.clone(),
                recommendation,
                favorability: c.favorability,
                price_trend: c.price_change_pct,
            });
        }

        let mut insights = Vec::new();
        if !favorable.is_empty() {
            insights.push(format!(
                "Prioritize production using {} to take advantage of favorable price trends.",
                favorable.join(", ")
            ));
        }
        if !unfavorable.is_empty() {
            insights.push(format!(
                "Consider delaying production using {} as prices are expected to rise.",
                unfavorable.join(", ")
            ));
        }
        if favorable_trend < 0.0 && !favorable.is_empty() {
            insights.push(format!(
                "Overall favorable conditions: average price decrease of {:.1}% for prioritized commodities.",
                (favorable_trend / favorable.len() as f64).abs()
            ));
        }

        Ok(ProductionSequence {
            datasets_analyzed: datasets.iter().map(|s| s.to_string()).collect(),
            months_ahead,
            commodity_analysis: analysis,
            recommended_sequence: sequence,
            favorable_commodities: favorable,
            unfavorable_commodities: unfavorable,
            insights,
            cost_impact_summary: CostImpactSummary {
                favorable_trend: round_to(favorable_trend, 2),
                unfavorable_trend: round_to(unfavorable_trend, 2),
            },
        })
    }
}

fn nonzero_price(dataset: &str, price: f64) -> Result<(), QueryError> {
    if price == 0.0 {
        return Err(QueryError::invalid_argument(
            "dataset_name",
            format!("latest {dataset} value is zero, percentage change is undefined"),
        ));
    }
    Ok(())
}
