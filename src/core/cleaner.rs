use crate::domain::model::{Column, Dataset, Record};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Toggles for the individual cleaning steps. All enabled by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanerOptions {
    pub drop_duplicates: bool,
    pub coerce_dates: bool,
    pub coerce_numeric: bool,
    pub fill_missing: bool,
    pub reject_negative_cumulative: bool,
}

impl Default for CleanerOptions {
    fn default() -> Self {
        Self {
            drop_duplicates: true,
            coerce_dates: true,
            coerce_numeric: true,
            fill_missing: true,
            reject_negative_cumulative: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleaningReport {
    pub rows_in: usize,
    pub duplicates_removed: usize,
    pub invalid_dates_removed: usize,
    pub empty_locations_removed: usize,
    pub values_coerced: usize,
    pub key_collisions_merged: usize,
    pub values_filled: usize,
    pub negative_rows_removed: usize,
    pub rows_out: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Cleaner {
    options: CleanerOptions,
}

impl Cleaner {
    pub fn new(options: CleanerOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CleanerOptions {
        &self.options
    }

    pub fn clean(&self, raw: Dataset) -> Dataset {
        self.clean_with_report(raw).0
    }

    /// Runs the enabled steps in order. The output is sorted by
    /// (location, date) and depends on nothing but the input.
    pub fn clean_with_report(&self, raw: Dataset) -> (Dataset, CleaningReport) {
        let mut report = CleaningReport {
            rows_in: raw.len(),
            ..Default::default()
        };
        let mut records = raw.into_records();

        if self.options.drop_duplicates {
            let before = records.len();
            let mut seen = HashSet::with_capacity(before);
            records.retain(|r| seen.insert(r.fingerprint()));
            report.duplicates_removed = before - records.len();
        }

        let before = records.len();
        records.retain(|r| !r.location.is_empty());
        report.empty_locations_removed = before - records.len();

        if self.options.coerce_dates {
            let before = records.len();
            records.retain(|r| r.date.is_some());
            report.invalid_dates_removed = before - records.len();
        }

        if self.options.coerce_numeric {
            report.values_coerced = records.iter_mut().map(coerce_numeric).sum();
        }

        records.sort_by(|a, b| a.location.cmp(&b.location).then(a.date.cmp(&b.date)));
        report.key_collisions_merged = collapse_keys(&mut records);

        // Rejected rows must not anchor the fill of their neighbours.
        if self.options.reject_negative_cumulative {
            let before = records.len();
            records.retain(|r| {
                Column::CUMULATIVE
                    .iter()
                    .all(|&c| r.get(c).map_or(true, |v| v >= 0.0))
            });
            report.negative_rows_removed = before - records.len();
        }

        if self.options.fill_missing {
            report.values_filled = fill_missing(&mut records);
        }

        report.rows_out = records.len();
        tracing::info!(
            "Cleaning completed: {} rows in, {} rows out ({} duplicates, {} bad dates, {} negative)",
            report.rows_in,
            report.rows_out,
            report.duplicates_removed,
            report.invalid_dates_removed,
            report.negative_rows_removed
        );
        tracing::debug!("Cleaning report: {:?}", report);

        (Dataset::new(records), report)
    }
}

/// Cleans with every step enabled.
pub fn clean(raw: Dataset) -> Dataset {
    Cleaner::default().clean(raw)
}

/// Non-finite values become missing everywhere; negative values become
/// missing outside the cumulative columns, which are judged later.
fn coerce_numeric(record: &mut Record) -> usize {
    let mut coerced = 0;
    for column in Column::ALL {
        if let Some(v) = record.get(column) {
            if !v.is_finite() || (v < 0.0 && !column.is_cumulative()) {
                record.set(column, None);
                coerced += 1;
            }
        }
    }
    coerced
}

/// Keeps the last row of each dated (location, date) key. Expects sorted input.
fn collapse_keys(records: &mut Vec<Record>) -> usize {
    let before = records.len();
    let mut out: Vec<Record> = Vec::with_capacity(before);
    for record in records.drain(..) {
        let same_key = record.date.is_some()
            && out
                .last()
                .is_some_and(|prev| prev.date == record.date && prev.location == record.location);
        if same_key {
            if let Some(prev) = out.last_mut() {
                *prev = record;
            }
        } else {
            out.push(record);
        }
    }
    *records = out;
    before - records.len()
}

/// Fills each location's series column by column. Expects sorted input.
fn fill_missing(records: &mut [Record]) -> usize {
    let mut filled = 0;
    let mut start = 0;
    while start < records.len() {
        let end = records[start..]
            .iter()
            .position(|r| r.location != records[start].location)
            .map_or(records.len(), |offset| start + offset);

        let group = &mut records[start..end];
        for column in Column::ALL {
            let mut series: Vec<Option<f64>> = group.iter().map(|r| r.get(column)).collect();
            let n = fill_series(&mut series);
            if n > 0 {
                for (record, value) in group.iter_mut().zip(series) {
                    record.set(column, value);
                }
                filled += n;
            }
        }
        start = end;
    }
    filled
}

/// Interior gaps are interpolated linearly by position, trailing gaps take
/// the last known value, leading gaps stay missing.
pub(crate) fn fill_series(series: &mut [Option<f64>]) -> usize {
    let mut filled = 0;
    let mut last_known: Option<(usize, f64)> = None;

    for i in 0..series.len() {
        let Some(current) = series[i] else { continue };
        if let Some((j, prev)) = last_known {
            let span = (i - j) as f64;
            for (k, slot) in series.iter_mut().enumerate().take(i).skip(j + 1) {
                *slot = Some(prev + (current - prev) * (k - j) as f64 / span);
                filled += 1;
            }
        }
        last_known = Some((i, current));
    }

    if let Some((j, value)) = last_known {
        for slot in series.iter_mut().skip(j + 1) {
            *slot = Some(value);
            filled += 1;
        }
    }
    filled
}
