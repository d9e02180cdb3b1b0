use crate::core::metrics::{
    self, DEFAULT_TREND_EPSILON_PCT, DEFAULT_WINDOW_DAYS, DEFAULT_Z_THRESHOLD,
};
use crate::core::transform;
use crate::domain::metric::{CountryTotal, MetricKind, MetricResult, MetricValue, SeriesPoint};
use crate::domain::model::{Column, DateRange, Dataset};
use crate::utils::error::{EpiError, Result};
use std::collections::BTreeSet;

/// Metric-specific knobs shared by every request kind.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisParams {
    pub column: Column,
    pub window_days: usize,
    pub smoothing_days: usize,
    pub z_threshold: f64,
    pub epsilon_pct: f64,
    pub range: DateRange,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            column: Column::NewCases,
            window_days: DEFAULT_WINDOW_DAYS,
            smoothing_days: 1,
            z_threshold: DEFAULT_Z_THRESHOLD,
            epsilon_pct: DEFAULT_TREND_EPSILON_PCT,
            range: DateRange::all(),
        }
    }
}

/// One metric over one country (or a set of countries), scoped to `range`.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisRequest {
    Mortality {
        country: String,
        range: DateRange,
    },
    Cfr {
        country: String,
        range: DateRange,
    },
    Growth {
        country: String,
        column: Column,
        range: DateRange,
        window_days: usize,
        smoothing_days: usize,
    },
    DailyAverage {
        country: String,
        column: Column,
        range: DateRange,
        window_days: usize,
    },
    Peaks {
        country: String,
        column: Column,
        range: DateRange,
    },
    Anomalies {
        country: String,
        column: Column,
        range: DateRange,
        z_threshold: f64,
    },
    Trend {
        country: String,
        column: Column,
        range: DateRange,
        window_days: usize,
        epsilon_pct: f64,
    },
    Compare {
        countries: BTreeSet<String>,
    },
    Derived {
        country: String,
        range: DateRange,
    },
    /// Every location when `countries` is empty.
    Ranking {
        countries: BTreeSet<String>,
        column: Column,
        range: DateRange,
    },
}

impl AnalysisRequest {
    /// Builds a request from a metric name and country list, as the CLI and
    /// other callers that deal in loose arguments do.
    pub fn build(kind: MetricKind, countries: &[String], params: &AnalysisParams) -> Result<Self> {
        let single = || match countries {
            [one] => Ok(one.clone()),
            _ => Err(EpiError::InvalidParameter {
                name: "country".to_string(),
                reason: format!("{} needs exactly one country, got {}", kind, countries.len()),
            }),
        };
        let range = params.range;
        let column = params.column;

        Ok(match kind {
            MetricKind::Compare => {
                if countries.is_empty() {
                    return Err(EpiError::InvalidParameter {
                        name: "countries".to_string(),
                        reason: "compare needs at least one country".to_string(),
                    });
                }
                AnalysisRequest::Compare {
                    countries: countries.iter().cloned().collect(),
                }
            }
            MetricKind::Ranking => AnalysisRequest::Ranking {
                countries: countries.iter().cloned().collect(),
                column,
                range,
            },
            MetricKind::Derived => AnalysisRequest::Derived {
                country: single()?,
                range,
            },
            MetricKind::Mortality => AnalysisRequest::Mortality {
                country: single()?,
                range,
            },
            MetricKind::Cfr => AnalysisRequest::Cfr {
                country: single()?,
                range,
            },
            MetricKind::Growth => AnalysisRequest::Growth {
                country: single()?,
                column,
                range,
                window_days: params.window_days,
                smoothing_days: params.smoothing_days,
            },
            MetricKind::DailyAverage => AnalysisRequest::DailyAverage {
                country: single()?,
                column,
                range,
                window_days: params.window_days,
            },
            MetricKind::Peaks => AnalysisRequest::Peaks {
                country: single()?,
                column,
                range,
            },
            MetricKind::Anomalies => AnalysisRequest::Anomalies {
                country: single()?,
                column,
                range,
                z_threshold: params.z_threshold,
            },
            MetricKind::Trend => AnalysisRequest::Trend {
                country: single()?,
                column,
                range,
                window_days: params.window_days,
                epsilon_pct: params.epsilon_pct,
            },
        })
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            AnalysisRequest::Mortality { .. } => MetricKind::Mortality,
            AnalysisRequest::Cfr { .. } => MetricKind::Cfr,
            AnalysisRequest::Growth { .. } => MetricKind::Growth,
            AnalysisRequest::DailyAverage { .. } => MetricKind::DailyAverage,
            AnalysisRequest::Peaks { .. } => MetricKind::Peaks,
            AnalysisRequest::Anomalies { .. } => MetricKind::Anomalies,
            AnalysisRequest::Trend { .. } => MetricKind::Trend,
            AnalysisRequest::Compare { .. } => MetricKind::Compare,
            AnalysisRequest::Ranking { .. } => MetricKind::Ranking,
            AnalysisRequest::Derived { .. } => MetricKind::Derived,
        }
    }
}

/// Runs one metric over `data` and tags the value with what it covered.
pub fn analyze(data: &Dataset, request: &AnalysisRequest) -> Result<MetricResult> {
    let kind = request.kind();
    let (countries, column, range, value) = match request {
        AnalysisRequest::Mortality { country, range } => (
            vec![country.clone()],
            None,
            *range,
            MetricValue::Scalar(metrics::mortality_rate(data, country, range)?),
        ),
        AnalysisRequest::Cfr { country, range } => (
            vec![country.clone()],
            None,
            *range,
            MetricValue::Scalar(metrics::case_fatality_rate(data, country, range)?),
        ),
        AnalysisRequest::Growth {
            country,
            column,
            range,
            window_days,
            smoothing_days,
        } => (
            vec![country.clone()],
            Some(*column),
            *range,
            MetricValue::Scalar(metrics::growth_rate(
                data,
                country,
                *column,
                range,
                *window_days,
                *smoothing_days,
            )?),
        ),
        AnalysisRequest::DailyAverage {
            country,
            column,
            range,
            window_days,
        } => {
            let points = metrics::daily_average(data, country, *column, range, *window_days)?
                .into_iter()
                .map(|(date, value)| SeriesPoint { date, value })
                .collect();
            (
                vec![country.clone()],
                Some(*column),
                *range,
                MetricValue::Series(points),
            )
        }
        AnalysisRequest::Peaks {
            country,
            column,
            range,
        } => (
            vec![country.clone()],
            Some(*column),
            *range,
            MetricValue::Peaks(
                metrics::detect_peaks(data, country, *column, range)?
                    .iter()
                    .collect(),
            ),
        ),
        AnalysisRequest::Anomalies {
            country,
            column,
            range,
            z_threshold,
        } => (
            vec![country.clone()],
            Some(*column),
            *range,
            MetricValue::Anomalies(metrics::detect_anomalies(
                data,
                country,
                *column,
                range,
                *z_threshold,
            )?),
        ),
        AnalysisRequest::Trend {
            country,
            column,
            range,
            window_days,
            epsilon_pct,
        } => (
            vec![country.clone()],
            Some(*column),
            *range,
            MetricValue::Trend(metrics::trend(
                data,
                country,
                *column,
                range,
                *window_days,
                *epsilon_pct,
            )?),
        ),
        AnalysisRequest::Derived { country, range } => (
            vec![country.clone()],
            None,
            *range,
            MetricValue::Derived(transform::derive_country(data, country, range)?),
        ),
        AnalysisRequest::Compare { countries } => (
            countries.iter().cloned().collect(),
            None,
            DateRange::all(),
            MetricValue::Comparison(metrics::compare(data, countries)),
        ),
        AnalysisRequest::Ranking {
            countries,
            column,
            range,
        } => {
            let ranking = metrics::totals_by_country(data, *column, range)
                .into_iter()
                .filter(|(location, _)| countries.is_empty() || countries.contains(location))
                .map(|(location, value)| CountryTotal { location, value })
                .collect();
            (
                countries.iter().cloned().collect(),
                Some(*column),
                *range,
                MetricValue::Ranking(ranking),
            )
        }
    };

    if countries.is_empty() {
        tracing::info!("Computed {} for all locations", kind);
    } else {
        tracing::info!("Computed {} for {}", kind, countries.join(", "));
    }
    Ok(MetricResult {
        metric: kind,
        countries,
        column,
        range,
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::metric::CountryComparison;
    use crate::domain::model::Record;
    use chrono::{Duration, NaiveDate};

    fn data() -> Dataset {
        let start = NaiveDate::from_ymd_opt(2020, 3, 1).unwrap();
        [100.0, 150.0, 225.0]
            .iter()
            .enumerate()
            .map(|(i, &new_cases)| {
                Record::new("France", start + Duration::days(i as i64))
                    .with(Column::NewCases, new_cases)
                    .with(Column::NewDeaths, 1.0)
                    .with(Column::TotalCases, 1000.0 + i as f64 * 100.0)
                    .with(Column::TotalDeaths, 10.0)
            })
            .collect()
    }

    #[test]
    fn test_analyze_growth_is_tagged() {
        let request = AnalysisRequest::build(
            MetricKind::Growth,
            &["France".to_string()],
            &AnalysisParams {
                window_days: 3,
                ..Default::default()
            },
        )
        .unwrap();
        let result = analyze(&data(), &request).unwrap();

        assert_eq!(result.metric, MetricKind::Growth);
        assert_eq!(result.countries, vec!["France"]);
        assert_eq!(result.column, Some(Column::NewCases));
        assert!((result.scalar().unwrap() - 125.0).abs() < 1e-9);
    }

    #[test]
    fn test_analyze_compare_never_aborts() {
        let request = AnalysisRequest::build(
            MetricKind::Compare,
            &["France".to_string(), "Atlantis".to_string()],
            &AnalysisParams::default(),
        )
        .unwrap();
        let result = analyze(&data(), &request).unwrap();

        match result.value {
            MetricValue::Comparison(table) => {
                assert!(table["France"].rate().is_some());
                assert_eq!(table["Atlantis"], CountryComparison::NotFound);
            }
            other => panic!("expected comparison, got {:?}", other),
        }
    }

    #[test]
    fn test_single_country_metrics_reject_country_lists() {
        let countries = vec!["France".to_string(), "Spain".to_string()];
        assert!(matches!(
            AnalysisRequest::build(MetricKind::Trend, &countries, &AnalysisParams::default()),
            Err(EpiError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_range_reaches_series_metrics() {
        let params = AnalysisParams {
            window_days: 3,
            range: DateRange::new(None, NaiveDate::from_ymd_opt(2020, 3, 2)).unwrap(),
            ..Default::default()
        };
        let request =
            AnalysisRequest::build(MetricKind::Growth, &["France".to_string()], &params).unwrap();
        assert!(matches!(
            analyze(&data(), &request),
            Err(EpiError::InsufficientData { .. })
        ));

        let params = AnalysisParams {
            window_days: 2,
            ..params
        };
        let request =
            AnalysisRequest::build(MetricKind::Growth, &["France".to_string()], &params).unwrap();
        let result = analyze(&data(), &request).unwrap();
        assert_eq!(result.range, params.range);
        assert!((result.scalar().unwrap() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_daily_average_and_ranking_requests() {
        let params = AnalysisParams {
            window_days: 2,
            ..Default::default()
        };
        let request =
            AnalysisRequest::build(MetricKind::DailyAverage, &["France".to_string()], &params)
                .unwrap();
        match analyze(&data(), &request).unwrap().value {
            MetricValue::Series(points) => {
                let values: Vec<f64> = points.iter().map(|p| p.value).collect();
                assert_eq!(values, vec![100.0, 125.0, 187.5]);
            }
            other => panic!("expected a series, got {:?}", other),
        }

        let params = AnalysisParams {
            column: Column::TotalCases,
            ..Default::default()
        };
        let request = AnalysisRequest::build(MetricKind::Ranking, &[], &params).unwrap();
        match analyze(&data(), &request).unwrap().value {
            MetricValue::Ranking(ranking) => {
                assert_eq!(ranking.len(), 1);
                assert_eq!(ranking[0].location, "France");
                assert_eq!(ranking[0].value, 1200.0);
            }
            other => panic!("expected a ranking, got {:?}", other),
        }
    }

    #[test]
    fn test_derived_request_is_scoped() {
        let params = AnalysisParams {
            range: DateRange::new(NaiveDate::from_ymd_opt(2020, 3, 2), None).unwrap(),
            ..Default::default()
        };
        let request =
            AnalysisRequest::build(MetricKind::Derived, &["France".to_string()], &params).unwrap();
        match analyze(&data(), &request).unwrap().value {
            MetricValue::Derived(rows) => {
                assert_eq!(rows.len(), 2);
                assert_eq!(rows[0].mortality_rate, Some(10.0 / 1100.0 * 100.0));
                assert_eq!(rows[1].growth_rate_7d, None);
            }
            other => panic!("expected derived rows, got {:?}", other),
        }
    }

    #[test]
    fn test_analyze_propagates_country_not_found() {
        let request = AnalysisRequest::Mortality {
            country: "Atlantis".to_string(),
            range: DateRange::all(),
        };
        assert!(matches!(
            analyze(&data(), &request),
            Err(EpiError::CountryNotFound { .. })
        ));
    }
}
