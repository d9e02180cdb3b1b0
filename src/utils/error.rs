use thiserror::Error;

#[derive(Error, Debug)]
pub enum EpiError {
    #[error("Data unavailable: every source failed ({})", .attempts.join("; "))]
    DataUnavailable { attempts: Vec<String> },

    #[error("Schema error in {source_id}: missing required columns {}", .missing.join(", "))]
    SchemaError {
        source_id: String,
        missing: Vec<String>,
    },

    #[error("Country not found: {country}")]
    CountryNotFound { country: String },

    #[error("Insufficient data for {country}: need {needed} observations, found {available}")]
    InsufficientData {
        country: String,
        needed: usize,
        available: usize,
    },

    #[error("Cache entry '{key}' is corrupt: {reason}")]
    CacheCorrupt { key: String, reason: String },

    #[error("Metric {metric} is undefined: {reason}")]
    UndefinedMetric { metric: String, reason: String },

    #[error("Unknown column: {name}")]
    UnknownColumn { name: String },

    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Configuration error in {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Source,
    Data,
    Analysis,
    Configuration,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl EpiError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            EpiError::DataUnavailable { .. } | EpiError::HttpError(_) => ErrorCategory::Source,
            EpiError::SchemaError { .. } | EpiError::CsvError(_) | EpiError::CacheCorrupt { .. } => {
                ErrorCategory::Data
            }
            EpiError::CountryNotFound { .. }
            | EpiError::InsufficientData { .. }
            | EpiError::UndefinedMetric { .. }
            | EpiError::UnknownColumn { .. }
            | EpiError::InvalidParameter { .. } => ErrorCategory::Analysis,
            EpiError::ConfigValidationError { .. }
            | EpiError::InvalidConfigValueError { .. } => ErrorCategory::Configuration,
            EpiError::IoError(_) | EpiError::SerializationError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            // Always absorbed by the loader, only surfaces from direct cache reads.
            EpiError::CacheCorrupt { .. } => ErrorSeverity::Low,
            EpiError::DataUnavailable { .. } | EpiError::HttpError(_) => ErrorSeverity::Medium,
            EpiError::SchemaError { .. }
            | EpiError::CsvError(_)
            | EpiError::CountryNotFound { .. }
            | EpiError::InsufficientData { .. }
            | EpiError::UndefinedMetric { .. }
            | EpiError::UnknownColumn { .. }
            | EpiError::InvalidParameter { .. }
            | EpiError::ConfigValidationError { .. }
            | EpiError::InvalidConfigValueError { .. } => ErrorSeverity::High,
            EpiError::IoError(_) | EpiError::SerializationError(_) => ErrorSeverity::Critical,
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            EpiError::DataUnavailable { .. } => {
                "Could not download the dataset from any configured source".to_string()
            }
            EpiError::SchemaError { missing, .. } => {
                format!("The dataset is missing required columns: {}", missing.join(", "))
            }
            EpiError::CountryNotFound { country } => {
                format!("No data for '{}' in the dataset", country)
            }
            EpiError::InsufficientData {
                country,
                needed,
                available,
            } => format!(
                "Not enough data for '{}' ({} of {} observations)",
                country, available, needed
            ),
            EpiError::UndefinedMetric { metric, reason } => {
                format!("Cannot compute {}: {}", metric, reason)
            }
            _ => self.to_string(),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Source => {
                "Check your network connection or point source.primary_url at a reachable CSV"
            }
            ErrorCategory::Data => "Verify the CSV has the date, location and case/death columns",
            ErrorCategory::Analysis => {
                "Check the country name, column and window size against the loaded data"
            }
            ErrorCategory::Configuration => "Fix the configuration file or command-line flags",
            ErrorCategory::System => "Check file permissions and free disk space for the cache dir",
        }
    }
}

pub type Result<T> = std::result::Result<T, EpiError>;
