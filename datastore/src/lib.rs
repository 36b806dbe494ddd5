//! Storage and computation layer for the district report snapshot pipeline.
//!
//! Holds the raw CSV cache, the CSV parser and per-batch validators, the
//! Borda-count ranking engine, the program-year time-series store, and the
//! snapshot store that persists the manifest-plus-files layout every build
//! publishes.

pub mod csv_parser;
pub mod district_filter;
pub mod integrity;
pub mod ranking_engine;
pub mod raw_cache;
pub mod snapshot_store;
pub mod time_series_store;

pub use raw_cache::RawCsvCache;
pub use snapshot_store::SnapshotStore;
pub use time_series_store::TimeSeriesStore;
