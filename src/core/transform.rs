//! Reshaping of a cleaned dataset: calendar aggregation and per-row derived
//! ratios.

use crate::domain::metric::DerivedRow;
use crate::domain::model::{Column, DateRange, Dataset, Record};
use crate::utils::error::{EpiError, Result};
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Lag of `growth_rate_7d`, in observations.
pub const GROWTH_LAG: usize = 7;

/// Calendar bucket, labelled by its first day (Monday for weeks).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Week,
    Month,
}

impl Period {
    pub fn start_of(&self, date: NaiveDate) -> NaiveDate {
        match self {
            Period::Week => date - Duration::days(date.weekday().num_days_from_monday() as i64),
            Period::Month => date.with_day(1).unwrap_or(date),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Period::Week => "week",
            Period::Month => "month",
        })
    }
}

impl FromStr for Period {
    type Err = EpiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "week" | "weekly" | "w" => Ok(Period::Week),
            "month" | "monthly" | "m" => Ok(Period::Month),
            other => Err(EpiError::InvalidParameter {
                name: "period".to_string(),
                reason: format!("unknown period '{}' (expected week or month)", other),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    #[default]
    Sum,
    Mean,
    Max,
}

impl Aggregation {
    /// `None` when no value is known.
    pub fn apply(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        Some(match self {
            Aggregation::Sum => values.iter().sum(),
            Aggregation::Mean => values.iter().sum::<f64>() / values.len() as f64,
            Aggregation::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        })
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Aggregation::Sum => "sum",
            Aggregation::Mean => "mean",
            Aggregation::Max => "max",
        })
    }
}

impl FromStr for Aggregation {
    type Err = EpiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sum" => Ok(Aggregation::Sum),
            "mean" | "avg" => Ok(Aggregation::Mean),
            "max" => Ok(Aggregation::Max),
            other => Err(EpiError::InvalidParameter {
                name: "aggregation".to_string(),
                reason: format!("unknown aggregation '{}' (expected sum, mean or max)", other),
            }),
        }
    }
}

/// One row per (location, period), dated at the period start. Each column is
/// aggregated over its known values only. Undated rows are dropped.
pub fn aggregate_by_period(data: &Dataset, period: Period, aggregation: Aggregation) -> Dataset {
    let mut buckets: BTreeMap<(&str, NaiveDate), Vec<&Record>> = BTreeMap::new();
    for record in data {
        let Some(date) = record.date else { continue };
        buckets
            .entry((record.location.as_str(), period.start_of(date)))
            .or_default()
            .push(record);
    }

    let records: Vec<Record> = buckets
        .into_iter()
        .map(|((location, start), rows)| {
            let mut out = Record::new(location, start);
            for column in Column::ALL {
                let values: Vec<f64> = rows.iter().filter_map(|r| r.get(column)).collect();
                out.set(column, aggregation.apply(&values));
            }
            out
        })
        .collect();

    tracing::info!(
        "Aggregated {} rows into {} {}ly rows ({})",
        data.len(),
        records.len(),
        period,
        aggregation
    );
    Dataset::new(records)
}

fn percent(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    let value = numerator? / denominator? * 100.0;
    value.is_finite().then_some(value)
}

/// Mortality, CFR and lagged growth for each dated row of `country` within
/// `range`. Growth looks back over the whole series, not just `range`.
pub fn derive_country(data: &Dataset, country: &str, range: &DateRange) -> Result<Vec<DerivedRow>> {
    if !data.contains_location(country) {
        return Err(EpiError::CountryNotFound {
            country: country.to_string(),
        });
    }

    let rows = data.country_series(country, &DateRange::all());
    Ok(rows
        .iter()
        .enumerate()
        .filter_map(|(i, r)| {
            let date = r.date?;
            if !range.contains(date) {
                return None;
            }
            let growth_rate_7d = i
                .checked_sub(GROWTH_LAG)
                .and_then(|j| {
                    let prev = rows[j].total_cases?;
                    percent(r.total_cases.map(|cur| cur - prev), Some(prev))
                });
            Some(DerivedRow {
                location: r.location.clone(),
                date,
                mortality_rate: percent(r.total_deaths, r.total_cases),
                case_fatality_rate: percent(r.new_deaths, r.new_cases),
                growth_rate_7d,
            })
        })
        .collect())
}

/// [`derive_country`] for every location, in (location, date) order.
pub fn derive_metrics(data: &Dataset) -> Vec<DerivedRow> {
    data.locations()
        .into_iter()
        .flat_map(|location| {
            derive_country(data, location, &DateRange::all()).unwrap_or_default()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn daily(location: &str, start: &str, new_cases: &[f64]) -> Vec<Record> {
        let mut total = 0.0;
        new_cases
            .iter()
            .enumerate()
            .map(|(i, &n)| {
                total += n;
                Record::new(location, date(start) + Duration::days(i as i64))
                    .with(Column::NewCases, n)
                    .with(Column::TotalCases, total)
                    .with(Column::NewDeaths, 1.0)
                    .with(Column::TotalDeaths, (i + 1) as f64)
            })
            .collect()
    }

    #[test]
    fn test_period_starts() {
        // 2020-03-04 is a Wednesday.
        assert_eq!(Period::Week.start_of(date("2020-03-04")), date("2020-03-02"));
        assert_eq!(Period::Week.start_of(date("2020-03-02")), date("2020-03-02"));
        assert_eq!(Period::Month.start_of(date("2020-03-31")), date("2020-03-01"));
        assert_eq!("monthly".parse::<Period>().unwrap(), Period::Month);
        assert!("fortnight".parse::<Period>().is_err());
    }

    #[test]
    fn test_weekly_sum_per_location() {
        // Monday 2020-03-02 through Sunday 2020-03-15: two full weeks.
        let mut rows = daily("France", "2020-03-02", &[1.0; 14]);
        rows.extend(daily("Spain", "2020-03-02", &[2.0; 7]));
        let weekly = aggregate_by_period(&Dataset::new(rows), Period::Week, Aggregation::Sum);

        let keys: Vec<_> = weekly
            .iter()
            .map(|r| (r.location.as_str(), r.date.unwrap(), r.new_cases))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("France", date("2020-03-02"), Some(7.0)),
                ("France", date("2020-03-09"), Some(7.0)),
                ("Spain", date("2020-03-02"), Some(14.0)),
            ]
        );
        assert_eq!(weekly.records()[0].hosp_patients, None);
    }

    #[test]
    fn test_monthly_max_and_mean() {
        let rows = daily("Italy", "2020-03-30", &[1.0, 3.0, 5.0]);
        let data = Dataset::new(rows);

        let max = aggregate_by_period(&data, Period::Month, Aggregation::Max);
        assert_eq!(max.len(), 2);
        assert_eq!(max.records()[0].date, Some(date("2020-03-01")));
        assert_eq!(max.records()[0].total_cases, Some(4.0));
        assert_eq!(max.records()[1].total_cases, Some(9.0));

        let mean = aggregate_by_period(&data, Period::Month, Aggregation::Mean);
        assert_eq!(mean.records()[0].new_cases, Some(2.0));
    }

    #[test]
    fn test_derived_rows() {
        let data = Dataset::new(daily("France", "2020-03-01", &[10.0; 9]));
        let rows = derive_country(&data, "France", &DateRange::all()).unwrap();

        assert_eq!(rows.len(), 9);
        assert_eq!(rows[0].mortality_rate, Some(10.0));
        assert_eq!(rows[0].case_fatality_rate, Some(10.0));
        assert_eq!(rows[6].growth_rate_7d, None);
        // total 80 against 10 seven rows earlier.
        assert_eq!(rows[7].growth_rate_7d, Some(700.0));

        let last_day = DateRange::new(Some(date("2020-03-09")), None).unwrap();
        let scoped = derive_country(&data, "France", &last_day).unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].growth_rate_7d, Some(350.0));
    }

    #[test]
    fn test_derived_ratios_skip_zero_denominators() {
        let data = Dataset::new(vec![Record::new("Chad", date("2020-03-01"))
            .with(Column::TotalCases, 0.0)
            .with(Column::TotalDeaths, 0.0)
            .with(Column::NewCases, 0.0)
            .with(Column::NewDeaths, 0.0)]);
        let rows = derive_metrics(&data);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].mortality_rate, None);
        assert_eq!(rows[0].case_fatality_rate, None);
        assert!(matches!(
            derive_country(&data, "Atlantis", &DateRange::all()),
            Err(EpiError::CountryNotFound { .. })
        ));
    }
}
