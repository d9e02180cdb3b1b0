//! Declared CSV schema and the lenient text-to-record parser.
//!
//! Required: `date`, `location`, `total_cases`, `total_deaths`, `new_cases`,
//! `new_deaths`. Optional: `people_vaccinated`, `new_vaccinations`,
//! `total_tests`, `hosp_patients`. Any other column is ignored.

use crate::domain::model::{Column, Dataset, Record};
use crate::utils::error::{EpiError, Result};
use chrono::NaiveDate;
use csv::{ReaderBuilder, Trim};
use std::collections::HashMap;

pub const DATE_COLUMN: &str = "date";
pub const LOCATION_COLUMN: &str = "location";

/// Column positions resolved from a CSV header row.
#[derive(Debug, Clone)]
pub struct HeaderLayout {
    date: usize,
    location: usize,
    numeric: Vec<(Column, usize)>,
}

impl HeaderLayout {
    pub fn resolve<'a, I>(source_id: &str, headers: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let positions: HashMap<String, usize> = headers
            .into_iter()
            .enumerate()
            .map(|(i, h)| (h.trim().to_ascii_lowercase(), i))
            .collect();

        let known = |name: &str| positions.contains_key(name);
        if !known(DATE_COLUMN)
            && !known(LOCATION_COLUMN)
            && !Column::ALL.iter().any(|c| known(c.as_str()))
        {
            return Err(EpiError::DataUnavailable {
                attempts: vec![format!("{}: content is not a recognisable CSV dataset", source_id)],
            });
        }

        let mut missing = Vec::new();
        for name in [DATE_COLUMN, LOCATION_COLUMN]
            .into_iter()
            .chain(Column::REQUIRED.iter().map(|c| c.as_str()))
        {
            if !known(name) {
                missing.push(name.to_string());
            }
        }
        if !missing.is_empty() {
            return Err(EpiError::SchemaError {
                source_id: source_id.to_string(),
                missing,
            });
        }

        let numeric: Vec<(Column, usize)> = Column::ALL
            .into_iter()
            .filter_map(|c| positions.get(c.as_str()).map(|&i| (c, i)))
            .collect();

        let ignored = positions.len() - numeric.len() - 2;
        if ignored > 0 {
            tracing::debug!("{}: ignoring {} columns outside the schema", source_id, ignored);
        }

        Ok(Self {
            date: positions[DATE_COLUMN],
            location: positions[LOCATION_COLUMN],
            numeric,
        })
    }

    fn read_record(&self, row: &csv::StringRecord) -> Record {
        let location = row.get(self.location).unwrap_or_default().trim().to_string();
        let date = row.get(self.date).and_then(parse_date);
        let mut record = Record {
            location,
            date,
            total_cases: None,
            total_deaths: None,
            new_cases: None,
            new_deaths: None,
            people_vaccinated: None,
            new_vaccinations: None,
            total_tests: None,
            hosp_patients: None,
        };
        for &(column, idx) in &self.numeric {
            record.set(column, row.get(idx).and_then(parse_number));
        }
        record
    }
}

/// Outcome of parsing one CSV payload.
#[derive(Debug, Clone)]
pub struct ParsedCsv {
    pub dataset: Dataset,
    pub skipped_rows: usize,
}

pub fn parse_csv(source_id: &str, bytes: &[u8]) -> Result<ParsedCsv> {
    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .trim(Trim::All)
        .from_reader(bytes);

    let headers = rdr.headers()?.clone();
    let layout = HeaderLayout::resolve(source_id, headers.iter())?;

    let mut records = Vec::new();
    let mut skipped_rows = 0usize;
    for result in rdr.records() {
        match result {
            Ok(row) => records.push(layout.read_record(&row)),
            Err(e) => {
                tracing::debug!("{}: skipping malformed row: {}", source_id, e);
                skipped_rows += 1;
            }
        }
    }

    tracing::debug!(
        "{}: parsed {} rows ({} skipped)",
        source_id,
        records.len(),
        skipped_rows
    );

    Ok(ParsedCsv {
        dataset: Dataset::new(records),
        skipped_rows,
    })
}

/// Accepts `YYYY-MM-DD`, optionally followed by a time part.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    let day = match text.get(..10) {
        Some(prefix) if text.len() == 10 => prefix,
        Some(prefix) if matches!(text.as_bytes().get(10), Some(b'T') | Some(b' ')) => prefix,
        _ => return None,
    };
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

/// Empty or unparsable cells are missing. Non-finite values are kept and
/// left to the cleaner's numeric coercion.
pub fn parse_number(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    text.parse::<f64>().ok()
}
