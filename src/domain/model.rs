use crate::utils::error::{EpiError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Numeric columns of the declared schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    TotalCases,
    TotalDeaths,
    NewCases,
    NewDeaths,
    PeopleVaccinated,
    NewVaccinations,
    TotalTests,
    HospPatients,
}

impl Column {
    pub const ALL: [Column; 8] = [
        Column::TotalCases,
        Column::TotalDeaths,
        Column::NewCases,
        Column::NewDeaths,
        Column::PeopleVaccinated,
        Column::NewVaccinations,
        Column::TotalTests,
        Column::HospPatients,
    ];

    pub const REQUIRED: [Column; 4] = [
        Column::TotalCases,
        Column::TotalDeaths,
        Column::NewCases,
        Column::NewDeaths,
    ];

    /// Cumulative counts whose negative values invalidate a row.
    pub const CUMULATIVE: [Column; 2] = [Column::TotalCases, Column::TotalDeaths];

    pub fn as_str(&self) -> &'static str {
        match self {
            Column::TotalCases => "total_cases",
            Column::TotalDeaths => "total_deaths",
            Column::NewCases => "new_cases",
            Column::NewDeaths => "new_deaths",
            Column::PeopleVaccinated => "people_vaccinated",
            Column::NewVaccinations => "new_vaccinations",
            Column::TotalTests => "total_tests",
            Column::HospPatients => "hosp_patients",
        }
    }

    pub fn is_required(&self) -> bool {
        Self::REQUIRED.contains(self)
    }

    pub fn is_cumulative(&self) -> bool {
        Self::CUMULATIVE.contains(self)
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Column {
    type Err = EpiError;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().to_ascii_lowercase();
        Column::ALL
            .into_iter()
            .find(|c| c.as_str() == name)
            .ok_or(EpiError::UnknownColumn { name })
    }
}

/// One (location, date) observation.
///
/// `date` is `None` when the source text could not be read as a date; the
/// cleaner drops such rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub location: String,
    pub date: Option<NaiveDate>,
    pub total_cases: Option<f64>,
    pub total_deaths: Option<f64>,
    pub new_cases: Option<f64>,
    pub new_deaths: Option<f64>,
    #[serde(default)]
    pub people_vaccinated: Option<f64>,
    #[serde(default)]
    pub new_vaccinations: Option<f64>,
    #[serde(default)]
    pub total_tests: Option<f64>,
    #[serde(default)]
    pub hosp_patients: Option<f64>,
}

impl Record {
    pub fn new(location: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            location: location.into(),
            date: Some(date),
            total_cases: None,
            total_deaths: None,
            new_cases: None,
            new_deaths: None,
            people_vaccinated: None,
            new_vaccinations: None,
            total_tests: None,
            hosp_patients: None,
        }
    }

    /// Builder-style setter, mostly for tests and the synthetic generator.
    pub fn with(mut self, column: Column, value: f64) -> Self {
        self.set(column, Some(value));
        self
    }

    pub fn get(&self, column: Column) -> Option<f64> {
        match column {
            Column::TotalCases => self.total_cases,
            Column::TotalDeaths => self.total_deaths,
            Column::NewCases => self.new_cases,
            Column::NewDeaths => self.new_deaths,
            Column::PeopleVaccinated => self.people_vaccinated,
            Column::NewVaccinations => self.new_vaccinations,
            Column::TotalTests => self.total_tests,
            Column::HospPatients => self.hosp_patients,
        }
    }

    pub fn set(&mut self, column: Column, value: Option<f64>) {
        let slot = match column {
            Column::TotalCases => &mut self.total_cases,
            Column::TotalDeaths => &mut self.total_deaths,
            Column::NewCases => &mut self.new_cases,
            Column::NewDeaths => &mut self.new_deaths,
            Column::PeopleVaccinated => &mut self.people_vaccinated,
            Column::NewVaccinations => &mut self.new_vaccinations,
            Column::TotalTests => &mut self.total_tests,
            Column::HospPatients => &mut self.hosp_patients,
        };
        *slot = value;
    }

    /// Bitwise identity of the whole row, used for exact-duplicate detection.
    pub(crate) fn fingerprint(&self) -> (String, Option<NaiveDate>, [Option<u64>; 8]) {
        let mut bits = [None; 8];
        for (slot, column) in bits.iter_mut().zip(Column::ALL) {
            *slot = self.get(column).map(f64::to_bits);
        }
        (self.location.clone(), self.date, bits)
    }
}

/// Inclusive date window; open on either side when a bound is `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Self> {
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(EpiError::InvalidParameter {
                    name: "date_range".to_string(),
                    reason: format!("start {} is after end {}", s, e),
                });
            }
        }
        Ok(Self { start, end })
    }

    pub fn all() -> Self {
        Self::default()
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |s| date >= s) && self.end.map_or(true, |e| date <= e)
    }
}

/// Ordered collection of records, owned by whichever stage holds it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dataset {
    records: Vec<Record>,
}

impl Dataset {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    pub fn locations(&self) -> BTreeSet<&str> {
        self.records.iter().map(|r| r.location.as_str()).collect()
    }

    pub fn contains_location(&self, location: &str) -> bool {
        self.records.iter().any(|r| r.location == location)
    }

    /// Dated rows of one location within `range`, in chronological order.
    pub fn country_series(&self, country: &str, range: &DateRange) -> Vec<&Record> {
        let mut rows: Vec<&Record> = self
            .records
            .iter()
            .filter(|r| r.location == country)
            .filter(|r| r.date.is_some_and(|d| range.contains(d)))
            .collect();
        rows.sort_by_key(|r| r.date);
        rows
    }

    pub fn date_bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        let mut dates = self.records.iter().filter_map(|r| r.date);
        let first = dates.next()?;
        Some(dates.fold((first, first), |(lo, hi), d| (lo.min(d), hi.max(d))))
    }
}

impl FromIterator<Record> for Dataset {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Dataset {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Snapshot persisted by the dataset cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub source: String,
    pub fetched_at: DateTime<Utc>,
    pub dataset: Dataset,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_column_parsing() {
        assert_eq!("new_cases".parse::<Column>().unwrap(), Column::NewCases);
        assert_eq!(" Total_Deaths ".parse::<Column>().unwrap(), Column::TotalDeaths);
        assert!(matches!(
            "population".parse::<Column>(),
            Err(EpiError::UnknownColumn { .. })
        ));
    }

    #[test]
    fn test_date_range_rejects_inverted_bounds() {
        assert!(DateRange::new(Some(date("2020-03-02")), Some(date("2020-03-01"))).is_err());
        let range = DateRange::new(Some(date("2020-03-01")), None).unwrap();
        assert!(range.contains(date("2021-01-01")));
        assert!(!range.contains(date("2020-02-29")));
    }

    #[test]
    fn test_country_series_is_chronological() {
        let data: Dataset = vec![
            Record::new("France", date("2020-03-03")).with(Column::NewCases, 3.0),
            Record::new("Spain", date("2020-03-01")).with(Column::NewCases, 9.0),
            Record::new("France", date("2020-03-01")).with(Column::NewCases, 1.0),
        ]
        .into_iter()
        .collect();

        let series = data.country_series("France", &DateRange::all());
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].new_cases, Some(1.0));
        assert_eq!(series[1].new_cases, Some(3.0));
        assert_eq!(
            data.date_bounds(),
            Some((date("2020-03-01"), date("2020-03-03")))
        );
    }
}
