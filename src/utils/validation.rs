use crate::utils::error::{EpiError, Result};
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(EpiError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: "URL cannot be empty".to_string(),
        });
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" | "file" => Ok(()),
            scheme => Err(EpiError::InvalidConfigValueError {
                field: field_name.to_string(),
                value: url_str.to_string(),
                reason: format!("Unsupported URL scheme: {}", scheme),
            }),
        },
        Err(e) => Err(EpiError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: format!("Invalid URL format: {}", e),
        }),
    }
}

/// A data source is either a URL or a local CSV path.
pub fn validate_source(field_name: &str, source: &str) -> Result<()> {
    if source.contains("://") {
        validate_url(field_name, source)
    } else {
        validate_path(field_name, source)
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.trim().is_empty() {
        return Err(EpiError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(EpiError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

pub fn validate_positive_number(field_name: &str, value: usize, min_value: usize) -> Result<()> {
    if value < min_value {
        return Err(EpiError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be at least {}", min_value),
        });
    }
    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(EpiError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(EpiError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("source.primary_url", "https://example.com/data.csv").is_ok());
        assert!(validate_url("source.primary_url", "http://example.com").is_ok());
        assert!(validate_url("source.primary_url", "file:///tmp/data.csv").is_ok());
        assert!(validate_url("source.primary_url", "").is_err());
        assert!(validate_url("source.primary_url", "invalid-url").is_err());
        assert!(validate_url("source.primary_url", "ftp://example.com").is_err());
    }

    #[test]
    fn test_validate_source_accepts_paths() {
        assert!(validate_source("source.fallback_url", "data/raw/covid.csv").is_ok());
        assert!(validate_source("source.fallback_url", "  ").is_err());
        assert!(validate_source("source.fallback_url", "gopher://x").is_err());
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range("metrics.z_threshold", 3.0, 0.1, 100.0).is_ok());
        assert!(validate_range("metrics.z_threshold", 0.0, 0.1, 100.0).is_err());
    }

    #[test]
    fn test_validate_positive_number() {
        assert!(validate_positive_number("metrics.default_window_days", 7, 2).is_ok());
        assert!(validate_positive_number("metrics.default_window_days", 1, 2).is_err());
    }
}
