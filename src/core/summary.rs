use crate::domain::model::{Column, Dataset};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// Shape and quality overview of a dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataSummary {
    pub rows: usize,
    pub locations: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub undated_rows: usize,
    pub duplicate_keys: usize,
    /// Only columns with at least one missing value are listed.
    pub missing_values: BTreeMap<Column, usize>,
}

pub fn summarize(data: &Dataset) -> DataSummary {
    let mut missing_values = BTreeMap::new();
    let mut seen = HashSet::with_capacity(data.len());
    let mut duplicate_keys = 0;
    let mut undated_rows = 0;

    for record in data {
        match record.date {
            Some(date) => {
                if !seen.insert((record.location.as_str(), date)) {
                    duplicate_keys += 1;
                }
            }
            None => undated_rows += 1,
        }
        for column in Column::ALL {
            if record.get(column).is_none() {
                *missing_values.entry(column).or_insert(0) += 1;
            }
        }
    }

    let bounds = data.date_bounds();
    DataSummary {
        rows: data.len(),
        locations: data.locations().len(),
        first_date: bounds.map(|(first, _)| first),
        last_date: bounds.map(|(_, last)| last),
        undated_rows,
        duplicate_keys,
        missing_values,
    }
}
