//! Unified loader for historical, forecast, and driver files.
//!
//! Resolves a dataset name through the registry, reads the file under
//! the data root, validates it into model types, and caches the result
//! for the lifetime of the loader. Repeated calls hand back the same
//! `Arc`, never a copy.
//!
//! Unknown names and missing files return `Ok(None)` so callers can
//! degrade gracefully. Files that exist but are malformed are hard
//! `DataError`s.

use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

use super::models::{
    DriverRecord, ForecastSeries, HistoricalObservation, HistoricalSeries, StatSummary, MEDIAN,
};
use crate::types::{DataError, DatasetName, Direction, ValidationError};

const HISTORICAL_FILE: &str = "historical_data.csv";
const FORECAST_FILE: &str = "forecast.json";
const DRIVERS_FILE: &str = "drivers.json";

const PERIOD_COLUMN: &str = "Period";
const VALUE_COLUMN: &str = "Value";

/// Raw `drivers.json` content, in file order.
pub type RawDrivers = Map<String, Value>;

#[derive(Clone)]
enum CacheEntry {
    Historical(Arc<HistoricalSeries>),
    Forecast(Arc<ForecastSeries>),
    Drivers(Arc<Vec<DriverRecord>>),
}

/// Loads and caches dataset files under a single data root.
pub struct DataLoader {
    root: PathBuf,
    cache: RwLock<HashMap<String, CacheEntry>>,
    drivers_cache: RwLock<HashMap<String, Arc<RawDrivers>>>,
}

impl DataLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: RwLock::new(HashMap::new()),
            drivers_cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of populated cache entries (both caches).
    pub fn cached_entries(&self) -> usize {
        let parsed = self.cache.read().unwrap_or_else(PoisonError::into_inner).len();
        let raw = self.drivers_cache.read().unwrap_or_else(PoisonError::into_inner).len();
        parsed + raw
    }

    // -- Historical ------------------------------------------------------

    /// Load `historical_data.csv` for a dataset.
    pub fn load_historical(&self, dataset_name: &str) -> Result<Option<Arc<HistoricalSeries>>, DataError> {
        let key = format!("{dataset_name}_historical");
        if let Some(CacheEntry::Historical(series)) = self.cached(&key) {
            debug!(dataset = dataset_name, "Historical data served from cache");
            return Ok(Some(series));
        }

        let Some(path) = self.resolve(dataset_name, HISTORICAL_FILE) else {
            return Ok(None);
        };

        let series = Arc::new(read_historical(&path)?);
        info!(dataset = dataset_name, records = series.len(), "Loaded historical data");
        self.store(key, CacheEntry::Historical(series.clone()));
        Ok(Some(series))
    }

    // -- Forecast --------------------------------------------------------

    /// Load `forecast.json` for a dataset.
    pub fn load_forecast(&self, dataset_name: &str) -> Result<Option<Arc<ForecastSeries>>, DataError> {
        let key = format!("{dataset_name}_forecast");
        if let Some(CacheEntry::Forecast(forecast)) = self.cached(&key) {
            debug!(dataset = dataset_name, "Forecast data served from cache");
            return Ok(Some(forecast));
        }

        let Some(path) = self.resolve(dataset_name, FORECAST_FILE) else {
            return Ok(None);
        };

        let forecast = Arc::new(read_forecast(&path)?);
        info!(dataset = dataset_name, periods = forecast.horizon(), "Loaded forecast data");
        self.store(key, CacheEntry::Forecast(forecast.clone()));
        Ok(Some(forecast))
    }

    // -- Drivers ---------------------------------------------------------

    /// Load the raw `drivers.json` map for a dataset.
    pub fn load_drivers(&self, dataset_name: &str) -> Result<Option<Arc<RawDrivers>>, DataError> {
        if let Some(raw) = self
            .drivers_cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(dataset_name)
        {
            return Ok(Some(raw.clone()));
        }

        let Some(path) = self.resolve(dataset_name, DRIVERS_FILE) else {
            return Ok(None);
        };

        let contents = read_file(&path)?;
        let raw: RawDrivers = serde_json::from_str(&contents).map_err(|source| DataError::Json {
            path: path.clone(),
            source,
        })?;

        let raw = Arc::new(raw);
        self.drivers_cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(dataset_name.to_string(), raw.clone());
        Ok(Some(raw))
    }

    /// Load parsed drivers, sorted by descending importance.
    ///
    /// `target*` entries describe the predicted series itself and are
    /// dropped. Entries that fail validation are skipped with a warning.
    pub fn load_drivers_parsed(&self, dataset_name: &str) -> Result<Option<Arc<Vec<DriverRecord>>>, DataError> {
        let key = format!("{dataset_name}_drivers_parsed");
        if let Some(CacheEntry::Drivers(drivers)) = self.cached(&key) {
            debug!(dataset = dataset_name, "Driver data served from cache");
            return Ok(Some(drivers));
        }

        let Some(raw) = self.load_drivers(dataset_name)? else {
            return Ok(None);
        };

        let mut drivers = Vec::new();
        for (driver_id, info) in raw.iter() {
            if driver_id.starts_with("target") {
                continue;
            }
            match parse_driver(driver_id, info) {
                Ok(Some(driver)) => drivers.push(driver),
                Ok(None) => debug!(dataset = dataset_name, driver_id, "Entry has no importance data"),
                Err(e) => warn!(dataset = dataset_name, driver_id, error = %e, "Skipping invalid driver"),
            }
        }

        // Stable: equal scores keep file order.
        drivers.sort_by(|a, b| b.importance_score.total_cmp(&a.importance_score));

        let drivers = Arc::new(drivers);
        info!(dataset = dataset_name, drivers = drivers.len(), "Loaded driver data");
        self.store(key, CacheEntry::Drivers(drivers.clone()));
        Ok(Some(drivers))
    }

    // -- Internals -------------------------------------------------------

    fn resolve(&self, dataset_name: &str, file: &str) -> Option<PathBuf> {
        let Some(dataset) = DatasetName::lookup(dataset_name) else {
            warn!(dataset = dataset_name, "Dataset not found in registry");
            return None;
        };

        let path = self.root.join(dataset.folder()).join(file);
        if !path.exists() {
            warn!(path = %path.display(), "Data file not found");
            return None;
        }
        Some(path)
    }

    fn cached(&self, key: &str) -> Option<CacheEntry> {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn store(&self, key: String, entry: CacheEntry) {
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, entry);
    }
}

// ---------------------------------------------------------------------------
// File parsing
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, DataError> {
    std::fs::read_to_string(path).map_err(|source| DataError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_historical(path: &Path) -> Result<HistoricalSeries, DataError> {
    let csv_err = |source| DataError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(csv_err)?;

    let headers = reader.headers().map_err(csv_err)?.clone();
    let column = |name: &str| headers.iter().position(|h| h == name);

    let (period_idx, value_idx) = match (column(PERIOD_COLUMN), column(VALUE_COLUMN)) {
        (Some(p), Some(v)) => (p, v),
        (p, v) => {
            let mut columns = Vec::new();
            if p.is_none() {
                columns.push(PERIOD_COLUMN.to_string());
            }
            if v.is_none() {
                columns.push(VALUE_COLUMN.to_string());
            }
            return Err(DataError::MissingColumns {
                path: path.to_path_buf(),
                columns,
            });
        }
    };

    let mut observations = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        let period = record.get(period_idx).unwrap_or_default();
        let value = record.get(value_idx).unwrap_or_default();
        let obs = HistoricalObservation::parse(period, value).map_err(|source| DataError::Invalid {
            path: path.to_path_buf(),
            source,
        })?;
        observations.push(obs);
    }

    if observations.is_empty() {
        return Err(DataError::Empty {
            path: path.to_path_buf(),
        });
    }

    Ok(HistoricalSeries::new(observations))
}

fn read_forecast(path: &Path) -> Result<ForecastSeries, DataError> {
    let invalid = |source| DataError::Invalid {
        path: path.to_path_buf(),
        source,
    };

    let contents = read_file(path)?;
    let data: Value = serde_json::from_str(&contents).map_err(|source| DataError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    let series = data
        .get("forecast_series")
        .and_then(Value::as_object)
        .ok_or_else(|| DataError::MissingField {
            path: path.to_path_buf(),
            field: "forecast_series".into(),
        })?;

    let mut dates: Vec<String> = series.keys().cloned().collect();
    dates.sort();

    let mut quantiles: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for date in &dates {
        let Some(bands) = series[date].get("quantile_forecast").and_then(Value::as_object) else {
            continue;
        };
        for (quantile, value) in bands {
            let value = value.as_f64().ok_or_else(|| {
                invalid(ValidationError::NonNumeric {
                    field: format!("quantile {quantile} on {date}"),
                    value: value.to_string(),
                })
            })?;
            quantiles.entry(quantile.clone()).or_default().push(value);
        }
    }

    if !quantiles.contains_key(MEDIAN) {
        return Err(invalid(ValidationError::MissingMedian));
    }

    let metadata = serde_json::json!({
        "forecast_start": data.get("forecast_start"),
        "forecast_end": data.get("forecast_end"),
        "forecast_horizon": data.get("forecast_horizon"),
    });

    ForecastSeries::new(&dates, quantiles, Some(metadata)).map_err(invalid)
}

/// Parse one driver entry. `Ok(None)` when it carries no importance data.
fn parse_driver(driver_id: &str, info: &Value) -> Result<Option<DriverRecord>, ValidationError> {
    let Some(importance) = info.get("importance").map(|v| overall(Some(v))) else {
        return Ok(None);
    };

    let name = info
        .get("driver_name")
        .and_then(Value::as_str)
        .unwrap_or(driver_id);

    let number = |field: &str| -> Result<f64, ValidationError> {
        importance
            .and_then(|o| o.get(field))
            .and_then(Value::as_f64)
            .ok_or_else(|| ValidationError::NonNumeric {
                field: format!("importance.{field}"),
                value: importance
                    .and_then(|o| o.get(field))
                    .map(Value::to_string)
                    .unwrap_or_else(|| "missing".into()),
            })
    };

    // Missing or null direction counts as positive.
    let direction_mean = overall(info.get("direction"))
        .and_then(|o| o.get("mean"))
        .and_then(Value::as_f64)
        .unwrap_or(1.0);
    let direction = Direction::from_mean(direction_mean);

    let lag = info
        .get("overall_lag")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string);

    let normalized = info
        .get("normalized_series")
        .and_then(Value::as_object)
        .filter(|m| !m.is_empty())
        .map(|m| m.values().filter_map(Value::as_f64).collect());

    let driver = DriverRecord::new(
        name,
        number("mean")?,
        number("max")?,
        number("min")?,
        &direction.to_string(),
    )?
    .with_pearson(stat_summary(info.get("pearson_correlation")))
    .with_granger(stat_summary(info.get("granger_correlation")))
    .with_lag(lag)
    .with_normalized_series(normalized);

    Ok(Some(driver))
}

fn overall(value: Option<&Value>) -> Option<&Map<String, Value>> {
    value?.get("overall")?.as_object()
}

fn stat_summary(value: Option<&Value>) -> Option<StatSummary> {
    let o = overall(value)?;
    let field = |name: &str| o.get(name).and_then(Value::as_f64).unwrap_or(0.0);
    Some(StatSummary {
        mean: field("mean"),
        max: field("max"),
        min: field("min"),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
