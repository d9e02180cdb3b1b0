pub mod toml_config;

pub use toml_config::{LogFormat, Settings};

#[cfg(feature = "cli")]
mod cli {
    use super::Settings;
    use crate::core::analysis::AnalysisParams;
    use crate::core::transform::{Aggregation, Period};
    use crate::domain::metric::MetricKind;
    use crate::domain::model::{Column, DateRange};
    use crate::utils::error::Result;
    use chrono::NaiveDate;
    use clap::Parser;
    use std::path::PathBuf;

    #[derive(Debug, Clone, Parser)]
    #[command(name = "epi")]
    #[command(about = "Load, clean and analyse epidemiological CSV data")]
    pub struct CliConfig {
        #[arg(short, long, help = "TOML settings file")]
        pub config: Option<PathBuf>,

        #[arg(long, help = "Primary source: http(s) URL, file:// URL or CSV path")]
        pub source: Option<String>,

        #[arg(long, help = "Fallback source tried when the primary fails")]
        pub fallback: Option<String>,

        #[arg(long)]
        pub cache_dir: Option<PathBuf>,

        #[arg(long)]
        pub ttl_hours: Option<u64>,

        #[arg(long, help = "Ignore a fresh cache entry and download again")]
        pub force_download: bool,

        #[arg(long, help = "Neither read nor write the cache")]
        pub no_cache: bool,

        #[arg(long, help = "Use generated data when every source fails")]
        pub synthetic_fallback: bool,

        #[arg(short, long, default_value = "mortality")]
        pub metric: MetricKind,

        #[arg(long, value_delimiter = ',')]
        pub country: Vec<String>,

        #[arg(long)]
        pub column: Option<Column>,

        #[arg(long)]
        pub window: Option<usize>,

        #[arg(long)]
        pub z_threshold: Option<f64>,

        #[arg(long, help = "First day included (YYYY-MM-DD)")]
        pub from: Option<NaiveDate>,

        #[arg(long, help = "Last day included (YYYY-MM-DD)")]
        pub to: Option<NaiveDate>,

        #[arg(long, help = "Aggregate to week or month before analysis")]
        pub period: Option<Period>,

        #[arg(long, default_value = "sum", help = "sum, mean or max")]
        pub aggregation: Aggregation,

        #[arg(long, help = "Print a dataset summary instead of a metric")]
        pub summary: bool,

        #[arg(long, help = "Enable verbose output")]
        pub verbose: bool,
    }

    impl CliConfig {
        /// Flags win over the file and the environment.
        pub fn apply_to(&self, settings: &mut Settings) {
            if let Some(source) = &self.source {
                settings.source.primary_url = source.clone();
            }
            if let Some(fallback) = &self.fallback {
                settings.source.fallback_url = Some(fallback.clone());
            }
            if let Some(dir) = &self.cache_dir {
                settings.cache.dir = dir.clone();
            }
            if let Some(ttl) = self.ttl_hours {
                settings.cache.ttl_hours = ttl;
            }
            if self.no_cache {
                settings.cache.enabled = false;
            }
            if self.synthetic_fallback {
                settings.source.synthetic_fallback = true;
            }
        }

        pub fn analysis_params(&self, settings: &Settings) -> Result<AnalysisParams> {
            let mut params = settings.analysis_params();
            if let Some(column) = self.column {
                params.column = column;
            }
            if let Some(window) = self.window {
                params.window_days = window;
            }
            if let Some(z) = self.z_threshold {
                params.z_threshold = z;
            }
            params.range = DateRange::new(self.from, self.to)?;
            Ok(params)
        }
    }

}

#[cfg(feature = "cli")]
pub use cli::CliConfig;
