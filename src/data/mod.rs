//! Data layer: validated models and the caching file loader.

pub mod loader;
pub mod models;

#[cfg(test)]
pub(crate) mod fixtures;

pub use loader::{DataLoader, RawDrivers};
pub use models::{DriverRecord, ForecastSeries, HistoricalObservation, HistoricalSeries, StatSummary};
