pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use adapters::{HttpFetcher, LocalStorage};
#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::Settings;
pub use crate::core::analysis::{analyze, AnalysisParams, AnalysisRequest};
pub use crate::core::cache::DatasetCache;
pub use crate::core::cleaner::{clean, Cleaner, CleanerOptions};
pub use crate::core::loader::{DataLoader, DataOrigin, LoadReport};
pub use crate::core::summary::{summarize, DataSummary};
pub use crate::core::transform::{aggregate_by_period, derive_metrics, Aggregation, Period};
pub use domain::metric::{MetricKind, MetricResult, MetricValue};
pub use domain::model::{Column, Dataset, DateRange, Record};
pub use utils::error::{EpiError, Result};
