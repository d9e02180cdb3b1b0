pub mod analysis;
pub mod cache;
pub mod cleaner;
pub mod loader;
pub mod metrics;
pub mod schema;
pub mod summary;
pub mod synthetic;
pub mod transform;

pub use crate::domain::model::{Column, Dataset, Record};
pub use crate::domain::ports::{ConfigProvider, DataFetcher, Storage};
pub use crate::utils::error::Result;
