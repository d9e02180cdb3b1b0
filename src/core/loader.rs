use crate::core::cache::DatasetCache;
use crate::core::cleaner::{Cleaner, CleaningReport};
use crate::core::synthetic::{synthetic_dataset, SyntheticOptions, SYNTHETIC_SOURCE};
use crate::domain::model::Dataset;
use crate::domain::ports::{ConfigProvider, DataFetcher, Storage};
use crate::utils::error::{EpiError, Result};
use serde::Serialize;

/// Where a loaded dataset came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataOrigin {
    Cache,
    Primary,
    Fallback,
    StaleCache,
    Synthetic,
}

#[derive(Debug, Clone)]
pub struct LoadReport {
    pub dataset: Dataset,
    pub origin: DataOrigin,
    pub source: String,
    /// Present only when the dataset was cleaned during this load.
    pub cleaning: Option<CleaningReport>,
}

/// Cache, fetch and clean, in that order.
///
/// A fresh cache entry short-circuits the network. Otherwise the sources are
/// fetched, the result is cleaned and written back. When every source is
/// unavailable an expired entry is served, then generated data if enabled.
pub struct DataLoader<F: DataFetcher, S: Storage, C: ConfigProvider> {
    fetcher: F,
    cache: DatasetCache<S>,
    config: C,
}

impl<F: DataFetcher, S: Storage, C: ConfigProvider> DataLoader<F, S, C> {
    pub fn new(fetcher: F, cache: DatasetCache<S>, config: C) -> Self {
        Self {
            fetcher,
            cache,
            config,
        }
    }

    pub fn cache(&self) -> &DatasetCache<S> {
        &self.cache
    }

    pub fn config(&self) -> &C {
        &self.config
    }

    /// The cleaned dataset; `force_download` skips a fresh cache entry.
    pub async fn load_data(&self, force_download: bool) -> Result<Dataset> {
        Ok(self.load(force_download).await?.dataset)
    }

    pub async fn load(&self, force_download: bool) -> Result<LoadReport> {
        let key = self.config.cache_key();

        if self.config.cache_enabled() && !force_download {
            if let Some(entry) = self.cache.fresh_entry(key, self.config.cache_ttl()).await {
                tracing::info!(
                    "Using cached dataset '{}' from {} ({} rows)",
                    key,
                    entry.source,
                    entry.dataset.len()
                );
                return Ok(LoadReport {
                    dataset: entry.dataset,
                    origin: DataOrigin::Cache,
                    source: entry.source,
                    cleaning: None,
                });
            }
        } else if force_download {
            tracing::info!("Forced download, skipping cache lookup");
        }

        let primary = self.config.primary_url();
        let fetched = match self.fetcher.fetch(primary, self.config.fallback_url()).await {
            Ok(fetched) => fetched,
            Err(e @ EpiError::DataUnavailable { .. }) => return self.recover(e).await,
            Err(e) => return Err(e),
        };

        let origin = if fetched.source == primary {
            DataOrigin::Primary
        } else {
            DataOrigin::Fallback
        };
        if fetched.skipped_rows > 0 {
            tracing::warn!(
                "Skipped {} malformed rows from {}",
                fetched.skipped_rows,
                fetched.source
            );
        }

        let cleaner = Cleaner::new(self.config.cleaner_options());
        let (dataset, report) = cleaner.clean_with_report(fetched.dataset);

        if self.config.cache_enabled() {
            if let Err(e) = self.cache.put(key, &dataset, &fetched.source).await {
                tracing::warn!("Could not write cache entry '{}': {}", key, e);
            }
        }

        Ok(LoadReport {
            dataset,
            origin,
            source: fetched.source,
            cleaning: Some(report),
        })
    }

    async fn recover(&self, error: EpiError) -> Result<LoadReport> {
        if self.config.cache_enabled() {
            if let Some(entry) = self.cache.entry(self.config.cache_key()).await {
                tracing::warn!(
                    "All sources unavailable; serving stale cache from {} fetched at {}",
                    entry.source,
                    entry.fetched_at
                );
                return Ok(LoadReport {
                    dataset: entry.dataset,
                    origin: DataOrigin::StaleCache,
                    source: entry.source,
                    cleaning: None,
                });
            }
        }

        if self.config.synthetic_fallback() {
            tracing::warn!("All sources unavailable; falling back to synthetic data");
            let cleaner = Cleaner::new(self.config.cleaner_options());
            let (dataset, report) =
                cleaner.clean_with_report(synthetic_dataset(&SyntheticOptions::default()));
            return Ok(LoadReport {
                dataset,
                origin: DataOrigin::Synthetic,
                source: SYNTHETIC_SOURCE.to_string(),
                cleaning: Some(report),
            });
        }

        Err(error)
    }
}
