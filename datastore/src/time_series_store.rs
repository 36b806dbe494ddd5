//! Persists and queries per-district program-year indexes (spec §4.8).

use std::path::PathBuf;

use anyhow::{Context, Error};
use chrono::NaiveDate;
use district_report_types::time_series::{parse_program_year, program_year_for, DataPoint, ProgramYearIndex};
use district_report_types::DistrictId;
use district_report_tools::fs::replace_file;

pub struct TimeSeriesStore {
    base: PathBuf,
}

impl TimeSeriesStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        TimeSeriesStore { base: base.into() }
    }

    fn index_path(&self, district_id: &DistrictId, program_year: &str) -> PathBuf {
        self.base
            .join(format!("district_{district_id}"))
            .join(format!("{program_year}.json"))
    }

    /// Reads and validates a program year's index file. Any read error
    /// other than "file not found" is logged and treated as absent (spec
    /// §4.8: "never an exception across this interface").
    pub fn get_program_year_data(
        &self,
        district_id: &DistrictId,
        program_year: &str,
    ) -> Option<ProgramYearIndex> {
        if parse_program_year(program_year).is_none() {
            return None;
        }
        let path = self.index_path(district_id, program_year);
        match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(index) => Some(index),
                Err(err) => {
                    log::warn!("corrupt time-series index {:?}: {err}", path);
                    None
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => {
                log::warn!("unable to read time-series index {:?}: {err}", path);
                None
            }
        }
    }

    /// Upserts `point` into the program-year index containing `date`,
    /// creating the index if absent, and writes it atomically.
    pub fn upsert_data_point(&self, district_id: &DistrictId, date: NaiveDate, point: DataPoint) -> Result<(), Error> {
        let program_year = program_year_for(date);
        let mut index = self
            .get_program_year_data(district_id, &program_year)
            .or_else(|| ProgramYearIndex::new_empty(&program_year))
            .ok_or_else(|| anyhow::anyhow!("invalid program year {program_year}"))?;

        index.upsert(point);

        let path = self.index_path(district_id, &program_year);
        if let Some(parent) = path.parent() {
            district_report_tools::fs::ensure_dir_exists(parent)?;
        }
        let data = serde_json::to_vec_pretty(&index)?;
        replace_file(&path, &data).with_context(|| format!("unable to write {:?}", path))
    }

    /// Enumerates every program year overlapping `[start, end]`, reads each
    /// available file (missing files contribute nothing), concatenates, and
    /// returns the result filtered to `[start, end]` and sorted ascending by
    /// date without duplicates (spec §4.8, scenario E).
    pub fn get_trend_data(&self, district_id: &DistrictId, start: NaiveDate, end: NaiveDate) -> Vec<DataPoint> {
        if start > end {
            return Vec::new();
        }

        let mut points: Vec<DataPoint> = Vec::new();
        let mut seen_dates = std::collections::BTreeSet::new();

        for program_year in overlapping_program_years(start, end) {
            if let Some(index) = self.get_program_year_data(district_id, &program_year) {
                for point in index.data_points {
                    if point.date.as_str() >= start.format("%Y-%m-%d").to_string().as_str()
                        && point.date.as_str() <= end.format("%Y-%m-%d").to_string().as_str()
                        && seen_dates.insert(point.date.clone())
                    {
                        points.push(point);
                    }
                }
            }
        }

        points.sort_by(|a, b| a.date.cmp(&b.date));
        points
    }
}

fn overlapping_program_years(start: NaiveDate, end: NaiveDate) -> Vec<String> {
    let mut years = Vec::new();
    let mut current = program_year_for(start);
    loop {
        years.push(current.clone());
        if current == program_year_for(end) {
            break;
        }
        let (start_year, _) = parse_program_year(&current).unwrap();
        current = format!("{}-{}", start_year + 1, start_year + 2);
    }
    years
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn point(date: &str, score: i64) -> DataPoint {
        DataPoint {
            date: date.to_string(),
            aggregate_score: score,
            clubs_rank: 1,
            payments_rank: 1,
            distinguished_rank: 1,
            membership_total: 0,
            club_count: 0,
            distinguished_count: 0,
        }
    }

    #[test]
    fn scenario_e_range_query_across_two_program_years() {
        let dir = tempfile::tempdir().unwrap();
        let store = TimeSeriesStore::new(dir.path());
        let id = DistrictId::from_str("61").unwrap();

        store
            .upsert_data_point(&id, NaiveDate::from_ymd_opt(2024, 6, 15).unwrap(), point("2024-06-15", 10))
            .unwrap();
        store
            .upsert_data_point(&id, NaiveDate::from_ymd_opt(2024, 7, 3).unwrap(), point("2024-07-03", 20))
            .unwrap();

        let trend = store.get_trend_data(
            &id,
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 7, 31).unwrap(),
        );

        assert_eq!(trend.len(), 2);
        assert_eq!(trend[0].date, "2024-06-15");
        assert_eq!(trend[1].date, "2024-07-03");
    }

    #[test]
    fn missing_program_year_contributes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = TimeSeriesStore::new(dir.path());
        let id = DistrictId::from_str("1").unwrap();
        let trend = store.get_trend_data(
            &id,
            NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2020, 12, 31).unwrap(),
        );
        assert!(trend.is_empty());
    }
}
