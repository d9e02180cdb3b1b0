//! Deterministic sample data for demos and for the last-resort fallback when
//! no source and no cache entry is usable.

use crate::domain::model::{Column, Dataset, Record};
use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const SYNTHETIC_SOURCE: &str = "synthetic";

const COUNTRIES: [&str; 10] = [
    "France",
    "Germany",
    "Italy",
    "Spain",
    "United Kingdom",
    "United States",
    "Canada",
    "Australia",
    "Japan",
    "Brazil",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyntheticOptions {
    pub countries: usize,
    pub days: usize,
    pub seed: u64,
}

impl Default for SyntheticOptions {
    fn default() -> Self {
        Self {
            countries: COUNTRIES.len(),
            days: 365,
            seed: 42,
        }
    }
}

/// Exponential case growth per country starting 2020-01-01, with deaths drawn
/// from a per-country fatality ratio. Same seed, same dataset.
pub fn synthetic_dataset(options: &SyntheticOptions) -> Dataset {
    let mut rng = StdRng::seed_from_u64(options.seed);
    let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or_default();
    let mut records = Vec::with_capacity(options.countries.min(COUNTRIES.len()) * options.days);

    for country in COUNTRIES.iter().take(options.countries) {
        let base_cases = rng.gen_range(100..1000) as f64;
        let growth: f64 = rng.gen_range(1.01..1.05);
        let fatality: f64 = rng.gen_range(0.01..0.03);

        let mut previous_total = 0.0;
        let mut total_deaths = 0.0;
        for day in 0..options.days {
            let total_cases = (base_cases * growth.powi(day as i32)).floor();
            let new_cases = total_cases - previous_total;
            let new_deaths = (new_cases * fatality * rng.gen_range(0.8..1.2)).round();
            total_deaths += new_deaths;
            previous_total = total_cases;

            records.push(
                Record::new(*country, start + Duration::days(day as i64))
                    .with(Column::TotalCases, total_cases)
                    .with(Column::TotalDeaths, total_deaths)
                    .with(Column::NewCases, new_cases)
                    .with(Column::NewDeaths, new_deaths),
            );
        }
    }

    tracing::info!(
        "Generated synthetic dataset: {} countries, {} days, {} rows",
        options.countries.min(COUNTRIES.len()),
        options.days,
        records.len()
    );
    Dataset::new(records)
}
