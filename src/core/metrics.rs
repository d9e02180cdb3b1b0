//! Stateless metric functions over a cleaned dataset.
//!
//! Every function first scopes the data to one country (and optionally a date
//! range). A country absent from the data is `CountryNotFound`; a country
//! present but with too few usable observations is `InsufficientData`. No
//! function reports a made-up zero in place of a failure.

use crate::domain::metric::{Anomaly, CountryComparison, Peak, TrendDirection, TrendSummary};
use crate::domain::model::{Column, DateRange, Dataset, Record};
use crate::utils::error::{EpiError, Result};
use chrono::NaiveDate;
use std::collections::BTreeMap;

pub const DEFAULT_Z_THRESHOLD: f64 = 3.0;
pub const DEFAULT_TREND_EPSILON_PCT: f64 = 1.0;
pub const DEFAULT_WINDOW_DAYS: usize = 7;

fn country_rows<'a>(data: &'a Dataset, country: &str, range: &DateRange) -> Result<Vec<&'a Record>> {
    if !data.contains_location(country) {
        return Err(EpiError::CountryNotFound {
            country: country.to_string(),
        });
    }
    let rows = data.country_series(country, range);
    if rows.is_empty() {
        return Err(insufficient(country, 1, 0));
    }
    Ok(rows)
}

/// Chronological (date, value) pairs of `column`, skipping missing values.
fn column_series(
    data: &Dataset,
    country: &str,
    column: Column,
    range: &DateRange,
) -> Result<Vec<(NaiveDate, f64)>> {
    Ok(country_rows(data, country, range)?
        .into_iter()
        .filter_map(|r| Some((r.date?, r.get(column)?)))
        .collect())
}

fn insufficient(country: &str, needed: usize, available: usize) -> EpiError {
    EpiError::InsufficientData {
        country: country.to_string(),
        needed,
        available,
    }
}

fn invalid(name: &str, reason: impl Into<String>) -> EpiError {
    EpiError::InvalidParameter {
        name: name.to_string(),
        reason: reason.into(),
    }
}

fn death_ratio(metric: &str, deaths: f64, cases: f64) -> Result<f64> {
    if cases <= 0.0 {
        return Err(EpiError::UndefinedMetric {
            metric: metric.to_string(),
            reason: "no cases recorded".to_string(),
        });
    }
    if deaths > cases {
        return Err(EpiError::UndefinedMetric {
            metric: metric.to_string(),
            reason: format!("deaths ({}) exceed cases ({})", deaths, cases),
        });
    }
    Ok(deaths / cases * 100.0)
}

/// Cumulative deaths over cumulative cases, in percent, at the latest date in
/// `range` where both totals are known.
pub fn mortality_rate(data: &Dataset, country: &str, range: &DateRange) -> Result<f64> {
    let rows = country_rows(data, country, range)?;
    let (date, cases, deaths) = rows
        .iter()
        .rev()
        .find_map(|r| Some((r.date?, r.total_cases?, r.total_deaths?)))
        .ok_or_else(|| insufficient(country, 1, 0))?;

    let rate = death_ratio("mortality_rate", deaths, cases)?;
    tracing::debug!(
        "Mortality rate for {} as of {}: {:.2}% ({} deaths / {} cases)",
        country,
        date,
        rate,
        deaths,
        cases
    );
    Ok(rate)
}

/// New deaths over new cases summed across `range`, in percent. Days missing
/// either value are left out.
pub fn case_fatality_rate(data: &Dataset, country: &str, range: &DateRange) -> Result<f64> {
    let rows = country_rows(data, country, range)?;
    let (observed, cases, deaths) = rows
        .iter()
        .filter_map(|r| Some((r.new_cases?, r.new_deaths?)))
        .fold((0usize, 0.0, 0.0), |(n, c, d), (cases, deaths)| {
            (n + 1, c + cases, d + deaths)
        });
    if observed == 0 {
        return Err(insufficient(country, 1, 0));
    }

    let cfr = death_ratio("case_fatality_rate", deaths, cases)?;
    tracing::debug!("CFR for {} over {} days: {:.2}%", country, observed, cfr);
    Ok(cfr)
}

/// Trailing rolling mean; the first `window - 1` points average what exists.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    let mut out = Vec::with_capacity(values.len());
    let mut sum = 0.0;
    for (i, v) in values.iter().enumerate() {
        sum += v;
        if i >= window {
            sum -= values[i - window];
        }
        out.push(sum / (i + 1).min(window) as f64);
    }
    out
}

fn percent_change(metric: &str, start: f64, end: f64) -> Result<f64> {
    if start == 0.0 {
        if end == 0.0 {
            return Ok(0.0);
        }
        return Err(EpiError::UndefinedMetric {
            metric: metric.to_string(),
            reason: "series starts from zero".to_string(),
        });
    }
    Ok((end - start) / start * 100.0)
}

/// Percent change of the smoothed `column` between the first and last of the
/// latest `window_days` observations inside `range`. `smoothing_days = 1` compares raw values.
pub fn growth_rate(
    data: &Dataset,
    country: &str,
    column: Column,
    range: &DateRange,
    window_days: usize,
    smoothing_days: usize,
) -> Result<f64> {
    if window_days < 2 {
        return Err(invalid("window_days", "growth needs a window of at least 2 days"));
    }
    if smoothing_days == 0 {
        return Err(invalid("smoothing_days", "must be at least 1"));
    }

    let series = column_series(data, country, column, range)?;
    if series.len() < window_days {
        return Err(insufficient(country, window_days, series.len()));
    }

    let values: Vec<f64> = series.iter().map(|&(_, v)| v).collect();
    let smoothed = rolling_mean(&values, smoothing_days);
    let n = smoothed.len();
    let growth = percent_change("growth_rate", smoothed[n - window_days], smoothed[n - 1])?;

    tracing::debug!(
        "Growth of {} for {} over {} days: {:.2}%",
        column,
        country,
        window_days,
        growth
    );
    Ok(growth)
}

/// Rolling `window`-day average of `column`, one point per observation.
pub fn daily_average(
    data: &Dataset,
    country: &str,
    column: Column,
    range: &DateRange,
    window: usize,
) -> Result<Vec<(NaiveDate, f64)>> {
    if window == 0 {
        return Err(invalid("window", "must be at least 1"));
    }
    let series = column_series(data, country, column, range)?;
    let values: Vec<f64> = series.iter().map(|&(_, v)| v).collect();
    Ok(series
        .iter()
        .map(|&(d, _)| d)
        .zip(rolling_mean(&values, window))
        .collect())
}

/// Local maxima of one country's series, produced lazily and in date order.
/// Iterating again starts over.
#[derive(Debug, Clone, PartialEq)]
pub struct PeakSeries {
    series: Vec<(NaiveDate, f64)>,
}

impl PeakSeries {
    pub fn new(series: Vec<(NaiveDate, f64)>) -> Self {
        Self { series }
    }

    pub fn iter(&self) -> PeakIter<'_> {
        PeakIter {
            series: &self.series,
            pos: 1,
        }
    }
}

impl<'a> IntoIterator for &'a PeakSeries {
    type Item = Peak;
    type IntoIter = PeakIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[derive(Debug, Clone)]
pub struct PeakIter<'a> {
    series: &'a [(NaiveDate, f64)],
    pos: usize,
}

impl Iterator for PeakIter<'_> {
    type Item = Peak;

    fn next(&mut self) -> Option<Peak> {
        while self.pos + 1 < self.series.len() {
            let i = self.pos;
            self.pos += 1;
            let (date, value) = self.series[i];
            if value > self.series[i - 1].1 && value > self.series[i + 1].1 {
                return Some(Peak { date, value });
            }
        }
        None
    }
}

/// Points strictly greater than both neighbours. Endpoints and plateaus never
/// qualify.
pub fn detect_peaks(
    data: &Dataset,
    country: &str,
    column: Column,
    range: &DateRange,
) -> Result<PeakSeries> {
    let series = column_series(data, country, column, range)?;
    Ok(PeakSeries::new(series))
}

/// Points whose z-score against the country's series within `range` exceeds
/// `z_threshold` in absolute value. Uses the sample standard deviation.
pub fn detect_anomalies(
    data: &Dataset,
    country: &str,
    column: Column,
    range: &DateRange,
    z_threshold: f64,
) -> Result<Vec<Anomaly>> {
    if !(z_threshold.is_finite() && z_threshold > 0.0) {
        return Err(invalid("z_threshold", "must be a positive number"));
    }
    let series = column_series(data, country, column, range)?;
    if series.len() < 2 {
        return Err(insufficient(country, 2, series.len()));
    }

    let n = series.len() as f64;
    let mean = series.iter().map(|&(_, v)| v).sum::<f64>() / n;
    let variance = series.iter().map(|&(_, v)| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let std_dev = variance.sqrt();
    if std_dev == 0.0 {
        return Ok(Vec::new());
    }

    let anomalies: Vec<Anomaly> = series
        .into_iter()
        .map(|(date, value)| Anomaly {
            date,
            value,
            z_score: (value - mean) / std_dev,
        })
        .filter(|a| a.z_score.abs() > z_threshold)
        .collect();

    tracing::debug!(
        "{} anomalies in {} for {} (threshold {})",
        anomalies.len(),
        column,
        country,
        z_threshold
    );
    Ok(anomalies)
}

/// Compares the `window_days` rolling average at the latest observation with
/// the one `window_days` observations earlier. Changes smaller than
/// `epsilon_pct` percent are `Stable`.
pub fn trend(
    data: &Dataset,
    country: &str,
    column: Column,
    range: &DateRange,
    window_days: usize,
    epsilon_pct: f64,
) -> Result<TrendSummary> {
    if window_days == 0 {
        return Err(invalid("window_days", "must be at least 1"));
    }
    if !(epsilon_pct.is_finite() && epsilon_pct >= 0.0) {
        return Err(invalid("epsilon_pct", "must be a non-negative number"));
    }

    let series = column_series(data, country, column, range)?;
    let needed = window_days + 1;
    if series.len() < needed {
        return Err(insufficient(country, needed, series.len()));
    }

    let values: Vec<f64> = series.iter().map(|&(_, v)| v).collect();
    let averages = rolling_mean(&values, window_days);
    let last = averages.len() - 1;
    let (start, end) = (averages[last - window_days], averages[last]);

    let change = percent_change("trend", start, end).ok();
    let direction = match change {
        Some(c) if c.abs() < epsilon_pct => TrendDirection::Stable,
        Some(c) if c > 0.0 => TrendDirection::Increasing,
        Some(_) => TrendDirection::Decreasing,
        None if end > start => TrendDirection::Increasing,
        None => TrendDirection::Decreasing,
    };

    Ok(TrendSummary {
        trend: direction,
        change,
        current_value: values[last],
        rolling_avg: end,
        as_of_date: series[last].0,
    })
}

/// Mortality rate per requested country. Failures become per-country markers.
pub fn compare<I>(data: &Dataset, countries: I) -> BTreeMap<String, CountryComparison>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    countries
        .into_iter()
        .map(|country| {
            let country = country.as_ref();
            let outcome = match mortality_rate(data, country, &DateRange::all()) {
                Ok(mortality_rate) => CountryComparison::Ok { mortality_rate },
                Err(EpiError::CountryNotFound { .. }) => CountryComparison::NotFound,
                Err(e) => CountryComparison::Unavailable {
                    reason: e.to_string(),
                },
            };
            (country.to_string(), outcome)
        })
        .collect()
}

/// Highest value of `column` per location within `range`, largest first.
/// For cumulative columns this is the running total at the end of the range.
pub fn totals_by_country(data: &Dataset, column: Column, range: &DateRange) -> Vec<(String, f64)> {
    let mut totals: BTreeMap<&str, f64> = BTreeMap::new();
    let in_range = data
        .iter()
        .filter(|r| r.date.map_or(range.is_unbounded(), |d| range.contains(d)));
    for record in in_range {
        if let Some(v) = record.get(column) {
            totals
                .entry(record.location.as_str())
                .and_modify(|max| *max = max.max(v))
                .or_insert(v);
        }
    }
    let mut ranked: Vec<(String, f64)> = totals
        .into_iter()
        .map(|(location, v)| (location.to_string(), v))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked
}
