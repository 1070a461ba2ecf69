//! On-disk fixture datasets for unit tests.

use serde_json::{json, Value};
use std::path::PathBuf;

use super::DataLoader;
use crate::query::QueryEngine;
use crate::types::DatasetName;

/// A temporary data root, removed on drop.
pub struct Fixture {
    root: PathBuf,
}

impl Fixture {
    /// An empty data root.
    pub fn empty() -> Self {
        let mut root = std::env::temp_dir();
        root.push(format!("procurement_fixture_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&root).unwrap();
        Self { root }
    }

    /// All three datasets with the standard history, forecasts, and drivers.
    pub fn standard() -> Self {
        let fx = Self::empty();

        fx.write_historical(
            "energy_futures",
            &[
                ("2024-01-01", 100.0),
                ("2024-02-01", 110.0),
                ("2024-03-01", 105.0),
                ("2024-04-01", 120.0),
                ("2024-05-01", 115.0),
                ("2024-06-01", 130.0),
            ],
        );
        fx.write_historical(
            "cotton_price",
            &[
                ("2024-01-01", 50.0),
                ("2024-02-01", 52.0),
                ("2024-03-01", 51.0),
                ("2024-04-01", 55.0),
                ("2024-05-01", 54.0),
                ("2024-06-01", 58.0),
            ],
        );
        fx.write_historical(
            "cotton_export",
            &[
                ("2024-03-01", 1000.0),
                ("2024-04-01", 900.0),
                ("2024-05-01", 950.0),
                ("2024-06-01", 800.0),
                ("2024-07-01", 850.0),
                ("2024-08-01", 700.0),
            ],
        );

        let dates = ["2024-07-01", "2024-08-01", "2024-09-01"];
        fx.write_forecast(
            "energy_futures",
            &dates,
            &[
                ("0.05", [115.0, 112.0, 114.0]),
                ("0.1", [120.0, 118.0, 121.0]),
                ("0.15", [122.0, 121.0, 124.0]),
                ("0.5", [135.0, 140.0, 150.0]),
                ("0.85", [145.0, 152.0, 165.0]),
                ("0.9", [150.0, 158.0, 170.0]),
                ("0.95", [155.0, 165.0, 180.0]),
            ],
        );
        fx.write_forecast(
            "cotton_price",
            &dates,
            &[
                ("0.05", [50.0, 48.0, 45.0]),
                ("0.5", [57.0, 56.0, 54.0]),
                ("0.95", [62.0, 63.0, 64.0]),
            ],
        );
        fx.write_forecast(
            "cotton_export",
            &["2024-09-01", "2024-10-01", "2024-11-01"],
            &[
                ("0.1", [680.0, 690.0, 695.0]),
                ("0.5", [705.0, 708.0, 710.0]),
                ("0.9", [730.0, 735.0, 740.0]),
            ],
        );

        fx.write_drivers(
            "energy_futures",
            json!({
                "driver_1": driver("Demand Index", (30.0, 40.0, 20.0), 0.6, Some("2 month(s)")),
                "driver_2": driver("Gas Storage", (25.0, 30.0, 20.0), -0.4, Some("1 month(s)")),
                "driver_3": driver("Carbon Price", (20.0, 25.0, 15.0), 0.2, Some("6 to 12 month(s)")),
                "driver_4": driver("Broken Driver", (50.0, 10.0, 5.0), 0.1, None),
                "driver_5": driver("Wind Output", (10.0, 12.0, 8.0), -0.3, None),
                "target_energy": {"driver_name": "Energy Futures", "normalized_series": {"2024-01-01": 0.5}}
            }),
        );
        fx.write_drivers(
            "cotton_price",
            json!({
                "driver_1": driver("Demand Index", (15.0, 20.0, 10.0), 0.5, Some("6 month(s)")),
                "driver_2": driver("Weather Index", (35.0, 40.0, 30.0), -0.2, Some("3 month(s)")),
                "driver_3": driver("Gas Storage", (5.0, 6.0, 4.0), 0.1, None),
                "target_cotton": {"driver_name": "Pima Cotton"}
            }),
        );
        fx.write_drivers(
            "cotton_export",
            json!({
                "driver_1": driver("Freight Rates", (12.0, 14.0, 10.0), -0.1, Some("4 month(s)")),
                "driver_2": driver("Demand Index", (8.0, 9.0, 7.0), 0.3, Some("2 month(s)"))
            }),
        );

        fx
    }

    pub fn loader(&self) -> DataLoader {
        DataLoader::new(&self.root)
    }

    pub fn engine(&self) -> QueryEngine {
        QueryEngine::new(self.loader())
    }

    pub fn write_raw(&self, dataset: &str, file: &str, contents: &str) {
        let folder = DatasetName::lookup(dataset).unwrap().folder();
        let dir = self.root.join(folder);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(file), contents).unwrap();
    }

    pub fn remove(&self, dataset: &str, file: &str) {
        let folder = DatasetName::lookup(dataset).unwrap().folder();
        std::fs::remove_file(self.root.join(folder).join(file)).unwrap();
    }

    pub fn write_historical(&self, dataset: &str, rows: &[(&str, f64)]) {
        let mut csv = String::from("Period,Value\n");
        for (period, value) in rows {
            csv.push_str(&format!("{period},{value}\n"));
        }
        self.write_raw(dataset, "historical_data.csv", &csv);
    }

    pub fn write_forecast<const N: usize>(&self, dataset: &str, dates: &[&str; N], bands: &[(&str, [f64; N])]) {
        let mut series = serde_json::Map::new();
        for (i, date) in dates.iter().enumerate() {
            let quantiles: serde_json::Map<String, Value> =
                bands.iter().map(|(q, values)| (q.to_string(), json!(values[i]))).collect();
            series.insert(date.to_string(), json!({ "quantile_forecast": quantiles }));
        }
        let doc = json!({
            "forecast_start": dates[0],
            "forecast_end": dates[N - 1],
            "forecast_horizon": N,
            "forecast_series": series,
        });
        self.write_raw(dataset, "forecast.json", &doc.to_string());
    }

    pub fn write_drivers(&self, dataset: &str, doc: Value) {
        self.write_raw(dataset, "drivers.json", &doc.to_string());
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

/// A `drivers.json` entry.
pub fn driver(name: &str, importance: (f64, f64, f64), direction: f64, lag: Option<&str>) -> Value {
    let mut entry = json!({
        "driver_name": name,
        "importance": {"overall": {"mean": importance.0, "max": importance.1, "min": importance.2}},
        "direction": {"overall": {"mean": direction}},
        "pearson_correlation": {"overall": {"mean": 0.7, "max": 0.9, "min": 0.5}},
        "granger_correlation": {"overall": {"mean": 0.02, "max": 0.05, "min": 0.01}},
        "normalized_series": {"2024-01-01": 0.1, "2024-02-01": 0.3}
    });
    if let Some(lag) = lag {
        entry["overall_lag"] = json!(lag);
    }
    entry
}
