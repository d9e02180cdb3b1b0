use crate::core::analysis::AnalysisParams;
use crate::core::cleaner::CleanerOptions;
use crate::core::metrics::{DEFAULT_TREND_EPSILON_PCT, DEFAULT_WINDOW_DAYS, DEFAULT_Z_THRESHOLD};
use crate::domain::model::Column;
use crate::domain::ports::ConfigProvider;
use crate::utils::error::{EpiError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_PRIMARY_URL: &str = "https://covid.ourworldindata.org/data/owid-covid-data.csv";
pub const DEFAULT_FALLBACK_URL: &str =
    "https://raw.githubusercontent.com/owid/covid-19-data/master/public/data/owid-covid-data.csv";

/// Everything the loader, the cleaner and the CLI can be tuned with.
///
/// Every section is optional in the file; missing keys take the defaults
/// below.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub source: SourceSettings,
    pub cache: CacheSettings,
    pub cleaning: CleanerOptions,
    pub metrics: MetricsSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    pub primary_url: String,
    pub fallback_url: Option<String>,
    pub timeout_seconds: u64,
    /// Serve generated data when no source and no cache entry is usable.
    pub synthetic_fallback: bool,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            primary_url: DEFAULT_PRIMARY_URL.to_string(),
            fallback_url: Some(DEFAULT_FALLBACK_URL.to_string()),
            timeout_seconds: 60,
            synthetic_fallback: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    pub dir: PathBuf,
    pub ttl_hours: u64,
    pub key: String,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from("data/cache"),
            ttl_hours: 24,
            key: "owid_covid".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    pub z_threshold: f64,
    pub trend_epsilon_pct: f64,
    pub growth_smoothing_days: usize,
    pub default_window_days: usize,
    pub default_column: Column,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            z_threshold: DEFAULT_Z_THRESHOLD,
            trend_epsilon_pct: DEFAULT_TREND_EPSILON_PCT,
            growth_smoothing_days: 1,
            default_window_days: DEFAULT_WINDOW_DAYS,
            default_column: Column::NewCases,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

impl Settings {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(EpiError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// Parses TOML after replacing `${VAR}` with the environment value.
    /// Unset variables are left as written.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| EpiError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = regex::Regex::new(r"\$\{([^}]+)\}").map_err(|e| {
            EpiError::ConfigValidationError {
                field: "toml_parsing".to_string(),
                message: e.to_string(),
            }
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.into_owned())
    }

    /// Applies `EPI_CACHE_DIR`, `EPI_CACHE_TTL_HOURS`, `EPI_PRIMARY_URL` and
    /// `EPI_FALLBACK_URL` from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("EPI_CACHE_DIR") {
            self.cache.dir = PathBuf::from(dir);
        }
        if let Some(ttl) = lookup("EPI_CACHE_TTL_HOURS") {
            self.cache.ttl_hours =
                ttl.trim()
                    .parse()
                    .map_err(|_| EpiError::InvalidConfigValueError {
                        field: "EPI_CACHE_TTL_HOURS".to_string(),
                        value: ttl.clone(),
                        reason: "expected a whole number of hours".to_string(),
                    })?;
        }
        if let Some(url) = lookup("EPI_PRIMARY_URL") {
            self.source.primary_url = url;
        }
        if let Some(url) = lookup("EPI_FALLBACK_URL") {
            self.source.fallback_url = if url.trim().is_empty() {
                None
            } else {
                Some(url)
            };
        }
        Ok(())
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.source.timeout_seconds)
    }

    /// Defaults for metric requests that don't set their own knobs.
    pub fn analysis_params(&self) -> AnalysisParams {
        AnalysisParams {
            column: self.metrics.default_column,
            window_days: self.metrics.default_window_days,
            smoothing_days: self.metrics.growth_smoothing_days,
            z_threshold: self.metrics.z_threshold,
            epsilon_pct: self.metrics.trend_epsilon_pct,
            ..AnalysisParams::default()
        }
    }

    pub fn validate_config(&self) -> Result<()> {
        validation::validate_source("source.primary_url", &self.source.primary_url)?;
        if let Some(fallback) = &self.source.fallback_url {
            validation::validate_source("source.fallback_url", fallback)?;
        }
        validation::validate_positive_number(
            "source.timeout_seconds",
            self.source.timeout_seconds as usize,
            1,
        )?;

        if self.cache.enabled {
            validation::validate_path("cache.dir", &self.cache.dir.to_string_lossy())?;
            validation::validate_non_empty_string("cache.key", &self.cache.key)?;
        }

        validation::validate_positive_number(
            "metrics.default_window_days",
            self.metrics.default_window_days,
            2,
        )?;
        validation::validate_positive_number(
            "metrics.growth_smoothing_days",
            self.metrics.growth_smoothing_days,
            1,
        )?;
        if !(self.metrics.z_threshold.is_finite() && self.metrics.z_threshold > 0.0) {
            return Err(EpiError::InvalidConfigValueError {
                field: "metrics.z_threshold".to_string(),
                value: self.metrics.z_threshold.to_string(),
                reason: "must be a positive number".to_string(),
            });
        }
        validation::validate_range(
            "metrics.trend_epsilon_pct",
            self.metrics.trend_epsilon_pct,
            0.0,
            100.0,
        )?;

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(EpiError::InvalidConfigValueError {
                field: "logging.level".to_string(),
                value: self.logging.level.clone(),
                reason: format!("Valid levels: {}", valid_levels.join(", ")),
            });
        }

        Ok(())
    }
}

impl ConfigProvider for Settings {
    fn primary_url(&self) -> &str {
        &self.source.primary_url
    }

    fn fallback_url(&self) -> Option<&str> {
        self.source.fallback_url.as_deref()
    }

    fn cache_enabled(&self) -> bool {
        self.cache.enabled
    }

    fn cache_key(&self) -> &str {
        &self.cache.key
    }

    fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.cache.ttl_hours.min(i64::MAX as u64 / 3600) as i64)
    }

    fn synthetic_fallback(&self) -> bool {
        self.source.synthetic_fallback
    }

    fn cleaner_options(&self) -> CleanerOptions {
        self.cleaning
    }
}

impl Validate for Settings {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
