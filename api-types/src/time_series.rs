//! Program-year time-series index types (spec §3, §4.8, GLOSSARY).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One date's worth of ranking/aggregate data, the minimal record needed to
/// plot rank and score trends (GLOSSARY: "DataPoint").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub date: String,
    pub aggregate_score: i64,
    pub clubs_rank: usize,
    pub payments_rank: usize,
    pub distinguished_rank: usize,
    pub membership_total: i64,
    pub club_count: i64,
    pub distinguished_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramYearIndex {
    pub program_year: String,
    pub start_date: String,
    pub end_date: String,
    pub data_points: Vec<DataPoint>,
    pub last_updated: chrono::DateTime<chrono::Utc>,
}

/// Computes the `YYYY-YYYY` program year a date falls in (GLOSSARY: "July 1
/// through June 30").
pub fn program_year_for(date: NaiveDate) -> String {
    let year = date.format("%Y").to_string().parse::<i32>().unwrap();
    let month = date.format("%m").to_string().parse::<u32>().unwrap();
    if month >= 7 {
        format!("{}-{}", year, year + 1)
    } else {
        format!("{}-{}", year - 1, year)
    }
}

/// The inclusive start/end dates of a program year (spec §3:
/// "start = Y-07-01, end = (Y+1)-06-30").
pub fn program_year_bounds(program_year: &str) -> Option<(NaiveDate, NaiveDate)> {
    let (start_year, end_year) = parse_program_year(program_year)?;
    let start = NaiveDate::from_ymd_opt(start_year, 7, 1)?;
    let end = NaiveDate::from_ymd_opt(end_year, 6, 30)?;
    Some((start, end))
}

/// Parses a `^\d{4}-\d{4}$` program year string, requiring end = start + 1
/// (spec §4.8: `getProgramYearData` validation rule).
pub fn parse_program_year(program_year: &str) -> Option<(i32, i32)> {
    let (start_str, end_str) = program_year.split_once('-')?;
    if start_str.len() != 4 || end_str.len() != 4 {
        return None;
    }
    let start: i32 = start_str.parse().ok()?;
    let end: i32 = end_str.parse().ok()?;
    if end != start + 1 {
        return None;
    }
    Some((start, end))
}

impl ProgramYearIndex {
    pub fn new_empty(program_year: &str) -> Option<Self> {
        let (start, end) = program_year_bounds(program_year)?;
        Some(ProgramYearIndex {
            program_year: program_year.to_string(),
            start_date: start.format("%Y-%m-%d").to_string(),
            end_date: end.format("%Y-%m-%d").to_string(),
            data_points: Vec::new(),
            last_updated: chrono::Utc::now(),
        })
    }

    /// Inserts or replaces the DataPoint for `point.date`, keeping
    /// `data_points` sorted ascending by date (spec §4.8: "upsert the
    /// DataPoint keyed by date ... insert in sorted order otherwise").
    pub fn upsert(&mut self, point: DataPoint) {
        match self.data_points.binary_search_by(|p| p.date.cmp(&point.date)) {
            Ok(idx) => self.data_points[idx] = point,
            Err(idx) => self.data_points.insert(idx, point),
        }
        self.last_updated = chrono::Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn program_year_splits_on_july() {
        assert_eq!(
            program_year_for(NaiveDate::from_ymd_opt(2026, 7, 1).unwrap()),
            "2026-2027"
        );
        assert_eq!(
            program_year_for(NaiveDate::from_ymd_opt(2026, 6, 30).unwrap()),
            "2025-2026"
        );
    }

    #[test]
    fn program_year_bounds_match_rule() {
        let (start, end) = program_year_bounds("2024-2025").unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 7, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2025, 6, 30).unwrap());
    }

    #[test]
    fn parse_program_year_rejects_non_consecutive() {
        assert!(parse_program_year("2024-2026").is_none());
        assert!(parse_program_year("2024-2025").is_some());
    }

    #[test]
    fn upsert_keeps_sorted_and_replaces() {
        let mut idx = ProgramYearIndex::new_empty("2024-2025").unwrap();
        let p = |date: &str, score| DataPoint {
            date: date.to_string(),
            aggregate_score: score,
            clubs_rank: 1,
            payments_rank: 1,
            distinguished_rank: 1,
            membership_total: 0,
            club_count: 0,
            distinguished_count: 0,
        };
        idx.upsert(p("2024-09-01", 1));
        idx.upsert(p("2024-07-01", 2));
        idx.upsert(p("2024-09-01", 3));
        assert_eq!(idx.data_points.len(), 2);
        assert_eq!(idx.data_points[0].date, "2024-07-01");
        assert_eq!(idx.data_points[1].aggregate_score, 3);
    }
}
