//! Loader and query-engine behaviour against on-disk data.

use std::sync::Arc;

use procurement_agent::query::comparative::PredictiveValue;
use procurement_agent::query::recommendations::{BuyDecision, PriceTrend};
use procurement_agent::query::{EngineError, QueryError};
use procurement_agent::types::{parse_date, DatasetName, TrendDirection};

use crate::fixtures::DataRoot;

fn date(s: &str) -> chrono::NaiveDate {
    parse_date(s).unwrap()
}

#[test]
fn test_every_registered_dataset_loads_sorted() {
    let fx = DataRoot::populated();
    let loader = fx.loader();
    for ds in DatasetName::ALL {
        let series = loader.load_historical(ds.as_str()).unwrap().unwrap();
        assert!(!series.is_empty());
        assert!(series.observations().windows(2).all(|w| w[0].period <= w[1].period));
    }
    assert!(loader.load_historical("gold").unwrap().is_none());
    assert!(loader.load_forecast("Energy_Futures").unwrap().is_none());
    assert!(loader.load_drivers_parsed("").unwrap().is_none());
}

#[test]
fn test_loader_returns_cached_instances() {
    let fx = DataRoot::populated();
    let loader = fx.loader();

    let a = loader.load_historical("cotton_price").unwrap().unwrap();
    let b = loader.load_historical("cotton_price").unwrap().unwrap();
    assert!(Arc::ptr_eq(&a, &b));

    let a = loader.load_forecast("cotton_price").unwrap().unwrap();
    let b = loader.load_forecast("cotton_price").unwrap().unwrap();
    assert!(Arc::ptr_eq(&a, &b));

    let a = loader.load_drivers_parsed("cotton_price").unwrap().unwrap();
    let b = loader.load_drivers_parsed("cotton_price").unwrap().unwrap();
    assert!(Arc::ptr_eq(&a, &b));
}

#[test]
fn test_forecast_bands_match_series_length() {
    let fx = DataRoot::populated();
    let loader = fx.loader();
    for ds in DatasetName::ALL {
        let forecast = loader.load_forecast(ds.as_str()).unwrap().unwrap();
        assert!(forecast.quantile(0.5).is_some());
        for label in forecast.quantile_labels() {
            let level: f64 = label.parse().unwrap();
            assert_eq!(forecast.quantile(level).unwrap().len(), forecast.horizon());
        }
    }
}

#[test]
fn test_forecast_without_median_is_fatal() {
    let fx = DataRoot::populated();
    fx.forecast(DatasetName::CottonPrice, &["2024-05-01"], &[("0.1", &[70.0]), ("0.9", &[90.0])]);
    let err = fx.engine().get_forecast("cotton_price", 1).unwrap_err();
    assert!(matches!(err, EngineError::Data(_)));
}

#[test]
fn test_percentage_change_concrete() {
    let fx = DataRoot::populated();
    let change = fx
        .engine()
        .calculate_percentage_change("energy_futures", date("2024-01-01"), date("2024-02-01"))
        .unwrap();
    assert_eq!(change.percentage_change, 10.0);
    assert_eq!(change.trend_direction, TrendDirection::Increasing);
}

#[test]
fn test_forecast_horizon_concrete() {
    let fx = DataRoot::populated();
    let engine = fx.engine();

    let point = engine.get_forecast("energy_futures", 2).unwrap();
    assert_eq!(point.date, date("2024-06-01"));
    assert_eq!(point.forecast_value, 110.0);

    let err = engine.get_forecast("energy_futures", 5).unwrap_err();
    match err.as_query() {
        Some(QueryError::ForecastOutOfRange { max_horizon, .. }) => assert_eq!(*max_horizon, 3),
        other => panic!("unexpected {other:?}"),
    }
    let payload = err.as_query().unwrap().payload();
    assert_eq!(payload["success"], false);
    assert_eq!(payload["error"], "forecast_out_of_range");
}

#[test]
fn test_unsupported_confidence_level_payload() {
    let fx = DataRoot::populated();
    let err = fx
        .engine()
        .get_confidence_interval("energy_futures", date("2024-05-01"), 95)
        .unwrap_err();
    let payload = err.as_query().unwrap().payload();
    assert_eq!(payload["success"], false);
    assert_eq!(payload["error"], "invalid_confidence_level");
    assert_eq!(payload["available_levels"], serde_json::json!([80, 90]));
}

#[test]
fn test_timing_lead_commodity() {
    let fx = DataRoot::populated();
    let timing = fx
        .engine()
        .analyze_timing_relationships("cotton_price", "cotton_export")
        .unwrap();
    assert_eq!(timing.common_drivers, vec!["Demand Index"]);
    assert_eq!(timing.lead_commodity, "cotton_price");
    assert_eq!(timing.average_lag_months, 4.0);
    assert_eq!(timing.predictive_value, PredictiveValue::High);
}

#[test]
fn test_impact_scenarios_are_ordered() {
    let fx = DataRoot::populated();
    let engine = fx.engine();

    let rising = engine.calculate_impact_analysis("energy_futures", 3, 1000).unwrap();
    assert_eq!(rising.price_direction, PriceTrend::Rising);
    assert!(rising.best_case.forecast_price <= rising.expected.forecast_price);
    assert!(rising.expected.forecast_price <= rising.worst_case.forecast_price);

    let falling = engine.calculate_impact_analysis("cotton_price", 3, 1000).unwrap();
    assert_eq!(falling.price_direction, PriceTrend::Falling);
    assert!(falling.best_case.forecast_price >= falling.expected.forecast_price);
    assert!(falling.expected.forecast_price >= falling.worst_case.forecast_price);
}

#[test]
fn test_forward_buy_savings_scale_with_quantity() {
    let fx = DataRoot::populated();
    let engine = fx.engine();
    let one = engine.recommend_forward_buy("energy_futures", 3, 1000).unwrap();
    let two = engine.recommend_forward_buy("energy_futures", 3, 2000).unwrap();
    assert_eq!(one.recommendation, BuyDecision::BuyNow);
    assert!(one.savings > 0.0);
    assert_eq!(two.savings, 2.0 * one.savings);
}

#[test]
fn test_peak_never_below_valley() {
    let fx = DataRoot::populated();
    let engine = fx.engine();
    let ranges = [
        (None, None),
        (Some("2024-01-01"), Some("2024-01-01")),
        (Some("2024-02-01"), Some("2024-04-01")),
        (Some("2023-01-01"), Some("2024-03-15")),
    ];
    for ds in DatasetName::ALL {
        for (start, end) in ranges {
            let range = procurement_agent::query::optional_range(start, end).unwrap();
            let pv = engine.find_peak_and_valley(ds.as_str(), range).unwrap();
            assert!(pv.peak.value >= pv.valley.value);
        }
    }
}

#[test]
fn test_trend_direction_agrees_with_percentage_change() {
    let fx = DataRoot::populated();
    let engine = fx.engine();
    let dates = ["2024-01-01", "2024-02-01", "2024-03-01", "2024-04-01"];
    for ds in DatasetName::ALL {
        for start in dates {
            for end in dates {
                let change = engine
                    .calculate_percentage_change(ds.as_str(), date(start), date(end))
                    .unwrap();
                let trend = engine.get_trend_direction(ds.as_str(), date(start), date(end)).unwrap();
                assert_eq!(trend, TrendDirection::from_change(change.percentage_change));
            }
        }
    }
}

#[test]
fn test_top_drivers_skip_malformed_entries() {
    let fx = DataRoot::populated();
    let top = fx.engine().get_top_drivers("cotton_price", 10).unwrap();
    let names: Vec<_> = top.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["Rainfall", "Demand Index"]);

    for n in 0..4 {
        let top = fx.engine().get_top_drivers("energy_futures", n).unwrap();
        assert!(top.len() <= n);
        assert!(top.windows(2).all(|w| w[0].importance_mean >= w[1].importance_mean));
    }
}

#[test]
fn test_missing_data_root_degrades_to_not_found() {
    let fx = DataRoot::empty();
    let err = fx.engine().latest_value("energy_futures").unwrap_err();
    assert_eq!(err.as_query().unwrap().kind(), "dataset_not_found");
    assert!(fx.path().exists());
}
