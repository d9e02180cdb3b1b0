use crate::domain::model::{Column, DateRange};
use crate::utils::error::{EpiError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Mortality,
    Cfr,
    Growth,
    Peaks,
    Anomalies,
    Trend,
    Compare,
    DailyAverage,
    Ranking,
    Derived,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Mortality => "mortality",
            MetricKind::Cfr => "cfr",
            MetricKind::Growth => "growth",
            MetricKind::Peaks => "peaks",
            MetricKind::Anomalies => "anomalies",
            MetricKind::Trend => "trend",
            MetricKind::Compare => "compare",
            MetricKind::DailyAverage => "daily_average",
            MetricKind::Ranking => "ranking",
            MetricKind::Derived => "derived",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = EpiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mortality" | "mortality_rate" => Ok(MetricKind::Mortality),
            "cfr" | "case_fatality_rate" => Ok(MetricKind::Cfr),
            "growth" | "growth_rate" => Ok(MetricKind::Growth),
            "peaks" => Ok(MetricKind::Peaks),
            "anomalies" => Ok(MetricKind::Anomalies),
            "trend" => Ok(MetricKind::Trend),
            "compare" => Ok(MetricKind::Compare),
            "daily_average" | "average" => Ok(MetricKind::DailyAverage),
            "ranking" | "totals" | "total_by_country" => Ok(MetricKind::Ranking),
            "derived" | "derived_metrics" => Ok(MetricKind::Derived),
            other => Err(EpiError::InvalidParameter {
                name: "metric".to_string(),
                reason: format!(
                    "unknown metric '{}' (expected mortality, cfr, growth, peaks, anomalies, trend, compare, daily_average, ranking or derived)",
                    other
                ),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    pub date: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub date: NaiveDate,
    pub value: f64,
    pub z_score: f64,
}

/// One point of a smoothed daily series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub date: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryTotal {
    pub location: String,
    pub value: f64,
}

/// Per-row ratios; `None` where the inputs are missing or the ratio is
/// undefined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedRow {
    pub location: String,
    pub date: NaiveDate,
    pub mortality_rate: Option<f64>,
    pub case_fatality_rate: Option<f64>,
    pub growth_rate_7d: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSummary {
    pub trend: TrendDirection,
    /// Percent change of the rolling average; `None` when it starts from zero.
    pub change: Option<f64>,
    pub current_value: f64,
    pub rolling_avg: f64,
    pub as_of_date: NaiveDate,
}

/// Per-country outcome of a comparison. Failures are markers, not aborts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CountryComparison {
    Ok { mortality_rate: f64 },
    NotFound,
    Unavailable { reason: String },
}

impl CountryComparison {
    pub fn rate(&self) -> Option<f64> {
        match self {
            CountryComparison::Ok { mortality_rate } => Some(*mortality_rate),
            _ => None,
        }
    }
}

/// Output-only: series-shaped variants are not distinguishable when read back.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    Scalar(f64),
    Peaks(Vec<Peak>),
    Anomalies(Vec<Anomaly>),
    Trend(TrendSummary),
    Comparison(BTreeMap<String, CountryComparison>),
    Series(Vec<SeriesPoint>),
    Ranking(Vec<CountryTotal>),
    Derived(Vec<DerivedRow>),
}

/// A computed value tagged with what it was computed over. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricResult {
    pub metric: MetricKind,
    pub countries: Vec<String>,
    pub column: Option<Column>,
    pub range: DateRange,
    pub value: MetricValue,
}

impl MetricResult {
    pub fn scalar(&self) -> Option<f64> {
        match self.value {
            MetricValue::Scalar(v) => Some(v),
            _ => None,
        }
    }
}
