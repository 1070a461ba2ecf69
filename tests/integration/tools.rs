//! The tool adapter end to end: JSON arguments in, JSON payloads out.

use serde_json::{json, Value};

use procurement_agent::tools::{self, ToolError};
use procurement_agent::types::DatasetName;

use crate::fixtures::DataRoot;

fn call(fx: &DataRoot, name: &str, args: Value) -> Value {
    tools::call(&fx.engine(), name, args).unwrap()
}

#[test]
fn test_every_tool_answers_with_a_payload() {
    let fx = DataRoot::populated();
    let calls = [
        ("query_historical_data", json!({"dataset_name": "energy_futures"})),
        ("query_forecast_data", json!({"dataset_name": "energy_futures", "months_ahead": 3})),
        ("analyze_market_drivers", json!({"dataset_name": "energy_futures"})),
        ("compare_commodities", json!({"dataset_names": ["energy_futures", "cotton_price"]})),
        ("recommend_forward_buy", json!({"dataset_name": "cotton_export"})),
        ("calculate_impact_analysis", json!({"dataset_name": "cotton_price"})),
        ("analyze_multi_commodity_scenario", json!({"dataset_names": ["energy_futures", "cotton_price", "cotton_export"]})),
        ("recommend_production_sequencing", json!({"dataset_names": ["energy_futures", "cotton_price"]})),
        ("generate_negotiation_talking_points", json!({"dataset_name": "energy_futures"})),
        ("validate_supplier_claim", json!({"dataset_name": "energy_futures", "claimed_price": 130.0})),
        ("identify_driver_arguments", json!({"dataset_name": "energy_futures", "price_direction": "Decrease"})),
        ("analyze_price_history", json!({"dataset_name": "cotton_price", "analysis": "trend_line"})),
        ("analyze_forecast_distribution", json!({"dataset_name": "cotton_price", "analysis": "forecast_trend"})),
        ("analyze_commodity_relationships", json!({"analysis": "timing", "dataset_names": ["cotton_price", "cotton_export"]})),
    ];
    assert_eq!(calls.len(), tools::list_tools().len());

    for (name, args) in calls {
        let out = call(&fx, name, args);
        assert_eq!(out["success"], true, "{name} failed: {out}");
    }
}

#[test]
fn test_compare_commodities_aligns_common_dates() {
    let fx = DataRoot::populated();
    let out = call(&fx, "compare_commodities", json!({"dataset_names": ["energy_futures", "cotton_export"]}));
    assert_eq!(out["query_type"], "multi_commodity_comparison");
    assert_eq!(out["total_aligned_records"], 4);
    assert_eq!(out["aligned_data"][0]["date"], "2024-01-01");
    assert_eq!(out["aligned_data"][0]["energy_futures"], 100.0);
    assert_eq!(out["aligned_data"][0]["cotton_export"], 500.0);
}

#[test]
fn test_supplier_claim_above_forecast() {
    let fx = DataRoot::populated();
    let out = call(
        &fx,
        "validate_supplier_claim",
        json!({"dataset_name": "energy_futures", "claimed_price": 140.0, "months_ahead": 3}),
    );
    assert_eq!(out["success"], true);
    assert_eq!(out["forecast_median"], 115.0);
    assert_eq!(out["classification"], "above_forecast_range");
}

#[test]
fn test_unknown_dataset_lists_alternatives() {
    let fx = DataRoot::populated();
    let out = call(&fx, "query_forecast_data", json!({"dataset_name": "wheat"}));
    assert_eq!(out["success"], false);
    assert_eq!(out["error"], "dataset_not_found");
    assert_eq!(out["available_datasets"], json!(DatasetName::names()));
    assert!(out["message"].as_str().unwrap().contains("wheat"));
}

#[test]
fn test_historical_range_out_of_bounds_suggests_clamp() {
    let fx = DataRoot::populated();
    let out = call(
        &fx,
        "query_historical_data",
        json!({"dataset_name": "cotton_price", "start_date": "2023-06-01", "end_date": "2024-02-01"}),
    );
    assert_eq!(out["error"], "date_range_out_of_bounds");
    assert_eq!(out["suggested_range"]["start"], "2024-01-01");
    assert_eq!(out["suggested_range"]["end"], "2024-02-01");
}

#[test]
fn test_corrupt_csv_is_a_hard_error() {
    let fx = DataRoot::populated();
    fx.write(DatasetName::CottonExport, "historical_data.csv", "Period,Value\n2024-01-01,lots\n");
    let err = tools::call(&fx.engine(), "query_historical_data", json!({"dataset_name": "cotton_export"})).unwrap_err();
    match err {
        ToolError::Data { tool, .. } => assert_eq!(tool, "query_historical_data"),
        other => panic!("unexpected {other:?}"),
    }
}
