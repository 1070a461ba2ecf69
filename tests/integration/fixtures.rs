//! Fixture data roots written to disk.

use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};

use procurement_agent::data::DataLoader;
use procurement_agent::query::QueryEngine;
use procurement_agent::types::DatasetName;

/// A temporary data root, removed on drop.
pub struct DataRoot {
    root: PathBuf,
}

impl DataRoot {
    pub fn empty() -> Self {
        let root = std::env::temp_dir().join(format!("procurement_it_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&root).unwrap();
        Self { root }
    }

    /// All three datasets.
    ///
    /// energy_futures: 100 -> 110 over Jan/Feb 2024, latest 112 on
    /// 2024-04-01, forecast medians 105/110/115 for May..Jul.
    /// cotton_price and cotton_export share "Demand Index" with lags of
    /// 2 and 6 months.
    pub fn populated() -> Self {
        let fx = Self::empty();

        fx.historical(
            DatasetName::EnergyFutures,
            &[("2024-01-01", 100.0), ("2024-02-01", 110.0), ("2024-03-01", 108.0), ("2024-04-01", 112.0)],
        );
        fx.forecast(
            DatasetName::EnergyFutures,
            &["2024-05-01", "2024-06-01", "2024-07-01"],
            &[
                ("0.05", &[96.0, 97.0, 98.0]),
                ("0.1", &[98.0, 100.0, 102.0]),
                ("0.15", &[100.0, 103.0, 106.0]),
                ("0.5", &[105.0, 110.0, 115.0]),
                ("0.85", &[110.0, 117.0, 124.0]),
                ("0.9", &[112.0, 120.0, 128.0]),
                ("0.95", &[115.0, 124.0, 133.0]),
            ],
        );
        fx.drivers(
            DatasetName::EnergyFutures,
            json!({
                "d1": driver("Industrial Output", (40.0, 45.0, 35.0), 0.8, Some("1 month(s)")),
                "d2": driver("Gas Storage", (30.0, 35.0, 25.0), -0.5, Some("2 month(s)")),
                "d3": driver("Demand Index", (10.0, 12.0, 8.0), 0.3, Some("3 month(s)")),
                "target_energy": {"driver_name": "Germany Energy Futures"}
            }),
        );

        fx.historical(
            DatasetName::CottonPrice,
            &[("2024-01-01", 80.0), ("2024-02-01", 84.0), ("2024-03-01", 83.0), ("2024-04-01", 86.0)],
        );
        fx.forecast(
            DatasetName::CottonPrice,
            &["2024-05-01", "2024-06-01", "2024-07-01"],
            &[
                ("0.1", &[78.0, 75.0, 72.0]),
                ("0.5", &[84.0, 82.0, 80.0]),
                ("0.9", &[90.0, 89.0, 88.0]),
            ],
        );
        fx.drivers(
            DatasetName::CottonPrice,
            json!({
                "d1": driver("Demand Index", (25.0, 30.0, 20.0), 0.4, Some("2 month(s)")),
                "d2": driver("Rainfall", (35.0, 40.0, 30.0), -0.6, Some("1 month(s)")),
                "d3": {"driver_name": "Half Written"},
                "d4": driver("Out Of Bounds", (50.0, 10.0, 5.0), 0.1, None)
            }),
        );

        fx.historical(
            DatasetName::CottonExport,
            &[("2024-01-01", 500.0), ("2024-02-01", 520.0), ("2024-03-01", 510.0), ("2024-04-01", 530.0)],
        );
        fx.forecast(
            DatasetName::CottonExport,
            &["2024-05-01", "2024-06-01", "2024-07-01"],
            &[
                ("0.1", &[500.0, 505.0, 510.0]),
                ("0.5", &[531.0, 532.0, 533.0]),
                ("0.9", &[560.0, 565.0, 570.0]),
            ],
        );
        fx.drivers(
            DatasetName::CottonExport,
            json!({
                "d1": driver("Demand Index", (20.0, 22.0, 18.0), 0.2, Some("6 month(s)")),
                "d2": driver("Freight Rates", (15.0, 18.0, 12.0), -0.1, None)
            }),
        );

        fx
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn loader(&self) -> DataLoader {
        DataLoader::new(&self.root)
    }

    pub fn engine(&self) -> QueryEngine {
        QueryEngine::new(self.loader())
    }

    pub fn write(&self, dataset: DatasetName, file: &str, contents: &str) {
        let dir = self.root.join(dataset.folder());
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(file), contents).unwrap();
    }

    pub fn historical(&self, dataset: DatasetName, rows: &[(&str, f64)]) {
        let mut csv = String::from("Period,Value\n");
        for (period, value) in rows {
            csv.push_str(&format!("{period},{value}\n"));
        }
        self.write(dataset, "historical_data.csv", &csv);
    }

    pub fn forecast(&self, dataset: DatasetName, dates: &[&str], bands: &[(&str, &[f64])]) {
        let mut series = Map::new();
        for (i, date) in dates.iter().enumerate() {
            let quantiles: Map<String, Value> = bands.iter().map(|(q, v)| (q.to_string(), json!(v[i]))).collect();
            series.insert(date.to_string(), json!({ "quantile_forecast": quantiles }));
        }
        let doc = json!({
            "forecast_start": dates[0],
            "forecast_end": dates[dates.len() - 1],
            "forecast_horizon": dates.len(),
            "forecast_series": series,
        });
        self.write(dataset, "forecast.json", &doc.to_string());
    }

    pub fn drivers(&self, dataset: DatasetName, doc: Value) {
        self.write(dataset, "drivers.json", &doc.to_string());
    }
}

impl Drop for DataRoot {
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
        "pearson_correlation": {"overall": {"mean": 0.6, "max": 0.8, "min": 0.4}},
        "granger_correlation": {"overall": {"mean": 0.03, "max": 0.06, "min": 0.01}},
        "normalized_series": {"2024-01-01": 0.2, "2024-02-01": 0.4}
    });
    if let Some(lag) = lag {
        entry["overall_lag"] = json!(lag);
    }
    entry
}
