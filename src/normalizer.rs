//! Turns filtered CSV records into the validated [`DistrictStatistics`]
//! shape the Builder persists (spec §4.6 step 2) — grounded on the
//! teacher's `pbs-datastore::manifest` style of deriving a typed summary
//! from loosely-typed inputs, generalized from a backup manifest to one
//! district's membership/club/education rollup.
//!
//! The upstream dashboard's exact column names aren't pinned down by the
//! specification (only the resulting [`DistrictStatistics`] shape is), so
//! each field below tries a short list of historically-observed header
//! spellings and falls back to a neutral default. See DESIGN.md for the
//! Open Question this resolves.

use chrono::NaiveDate;
use district_report_types::report::CsvValue;
use district_report_types::statistics::{
    ClosingPeriodInfo, ClubHealth, ClubMembership, DistrictStatistics, EducationAward,
    EducationSummary, MembershipSummary, TopClub,
};
use district_report_types::{CsvRecord, DistrictId};

fn field<'a>(record: &'a CsvRecord, candidates: &[&str]) -> Option<&'a CsvValue> {
    candidates.iter().find_map(|key| record.get(*key))
}

fn numeric_field(record: &CsvRecord, candidates: &[&str]) -> f64 {
    field(record, candidates).and_then(CsvValue::as_f64).unwrap_or(0.0)
}

/// Like [`numeric_field`], but a field that is absent or explicitly null
/// becomes NaN rather than zero, so it ranks last per spec §4.7's edge
/// case instead of silently tying with real zero values.
pub fn percent_field(record: &CsvRecord, candidates: &[&str]) -> f64 {
    match field(record, candidates) {
        Some(CsvValue::Number(n)) => *n,
        _ => f64::NAN,
    }
}

fn text_field(record: &CsvRecord, candidates: &[&str]) -> String {
    match field(record, candidates) {
        Some(CsvValue::Text(s)) => s.clone(),
        Some(CsvValue::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

const CLUB_NUMBER_KEYS: &[&str] = &["Club Number", "Club No", "Club No.", "CLUB"];
const CLUB_NAME_KEYS: &[&str] = &["Club Name", "CLUBNAME"];
const ACTIVE_MEMBERS_KEYS: &[&str] = &["Active Members", "Membership"];
const MEMBER_BASE_KEYS: &[&str] = &["Mem. Base", "Membership Base", "Mem Base"];
const CLUB_STATUS_KEYS: &[&str] = &["Club Status", "Status"];
const DISTINGUISHED_STATUS_KEYS: &[&str] = &["Club Distinguished Status", "Distinguished Status"];
const EDUCATION_AWARDS_KEYS: &[&str] = &["Education Awards", "CC", "Total Education Awards"];

fn club_health(status: &str, distinguished: &str) -> (bool, bool, bool, bool) {
    let status = status.to_lowercase();
    let distinguished = distinguished.to_lowercase();
    let suspended = status.contains("suspend");
    let ineligible = status.contains("ineligible");
    let low = status.contains("low");
    let is_distinguished = !distinguished.is_empty() && distinguished != "not distinguished";
    (suspended, ineligible, low, is_distinguished)
}

/// Stamps `logicalDate`/`collectionDate` by comparing the report's
/// self-reported "as of" date against the cache date (spec §4.6 step 2,
/// GLOSSARY "Closing period"). Absent an "as of" field, the two dates are
/// assumed equal (no closing-period reprocessing detected).
pub struct ClosingPeriodDetector;

impl ClosingPeriodDetector {
    pub fn detect(district_records: &[CsvRecord], cache_date: &str) -> ClosingPeriodInfo {
        let as_of = district_records
            .iter()
            .find_map(|r| field(r, &["As Of", "AS OF", "As of Date"]))
            .and_then(CsvValue::as_str)
            .and_then(|s| NaiveDate::parse_from_str(s.trim(), "%m/%d/%Y").ok());

        let cache = NaiveDate::parse_from_str(cache_date, "%Y-%m-%d").ok();

        match (as_of, cache) {
            (Some(logical), Some(collection)) if logical < collection => ClosingPeriodInfo {
                is_closing_period_data: true,
                collection_date: cache_date.to_string(),
                logical_date: logical.format("%Y-%m-%d").to_string(),
            },
            _ => ClosingPeriodInfo {
                is_closing_period_data: false,
                collection_date: cache_date.to_string(),
                logical_date: cache_date.to_string(),
            },
        }
    }
}

/// Builds [`DistrictStatistics`] from one district's three filtered report
/// batches (spec §4.6 step 2).
pub struct DataNormalizer;

impl DataNormalizer {
    pub fn normalize(
        district_id: DistrictId,
        cache_date: &str,
        district_records: &[CsvRecord],
        club_records: &[CsvRecord],
    ) -> DistrictStatistics {
        let closing_period = ClosingPeriodDetector::detect(district_records, cache_date);

        let mut by_club = Vec::with_capacity(club_records.len());
        let mut total = 0i64;
        let mut base_total = 0i64;
        let mut clubs = ClubHealth::default();
        let mut education = EducationSummary::default();
        let mut top_clubs: Vec<TopClub> = Vec::new();

        for record in club_records {
            let members = numeric_field(record, ACTIVE_MEMBERS_KEYS) as i64;
            let base = numeric_field(record, MEMBER_BASE_KEYS) as i64;
            let change = members - base;
            total += members;
            base_total += base;

            by_club.push(ClubMembership {
                club_number: text_field(record, CLUB_NUMBER_KEYS),
                club_name: text_field(record, CLUB_NAME_KEYS),
                members,
                change,
            });

            clubs.total += 1;
            let status = text_field(record, CLUB_STATUS_KEYS);
            let distinguished = text_field(record, DISTINGUISHED_STATUS_KEYS);
            let (suspended, ineligible, low, is_distinguished) = club_health(&status, &distinguished);
            if suspended {
                clubs.suspended += 1;
            } else if ineligible {
                clubs.ineligible += 1;
            } else {
                clubs.active += 1;
            }
            if low {
                clubs.low += 1;
            }
            if is_distinguished {
                clubs.distinguished += 1;
                match distinguished.to_lowercase().as_str() {
                    s if s.contains("president") => clubs.presidents_distinguished += 1,
                    s if s.contains("select") => clubs.select_distinguished += 1,
                    _ => {}
                }
            }

            let awards = numeric_field(record, EDUCATION_AWARDS_KEYS) as i64;
            if awards > 0 {
                education.total_awards += awards;
                top_clubs.push(TopClub {
                    club_number: text_field(record, CLUB_NUMBER_KEYS),
                    club_name: text_field(record, CLUB_NAME_KEYS),
                    awards,
                });
            }
        }

        top_clubs.sort_by_key(|c| std::cmp::Reverse(c.awards));
        top_clubs.truncate(10);
        education.top_clubs = top_clubs;
        if education.total_awards > 0 {
            education.by_type.push(EducationAward {
                award_type: "total".to_string(),
                count: education.total_awards,
            });
        }

        let change = total - base_total;
        let change_percent = if base_total != 0 {
            (change as f64 / base_total as f64) * 100.0
        } else {
            0.0
        };

        DistrictStatistics {
            district_id,
            as_of_date: closing_period.logical_date.clone(),
            membership: MembershipSummary {
                total,
                change,
                change_percent,
                by_club,
            },
            clubs,
            education,
            closing_period,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use district_report_types::report::CsvValue;
    use std::str::FromStr;

    fn club(number: &str, members: f64, base: f64, status: &str, distinguished: &str) -> CsvRecord {
        let mut r = CsvRecord::new();
        r.insert("Club Number".into(), CsvValue::Text(number.into()));
        r.insert("Active Members".into(), CsvValue::Number(members));
        r.insert("Mem. Base".into(), CsvValue::Number(base));
        r.insert("Club Status".into(), CsvValue::Text(status.into()));
        r.insert("Club Distinguished Status".into(), CsvValue::Text(distinguished.into()));
        r
    }

    #[test]
    fn rolls_up_membership_and_club_health() {
        let clubs = vec![
            club("1", 20.0, 18.0, "Active", "Distinguished"),
            club("2", 10.0, 12.0, "Suspended", ""),
        ];
        let stats = DataNormalizer::normalize(DistrictId::from_str("42").unwrap(), "2024-07-01", &[], &clubs);

        assert_eq!(stats.membership.total, 30);
        assert_eq!(stats.membership.change, 0);
        assert_eq!(stats.clubs.total, 2);
        assert_eq!(stats.clubs.active, 1);
        assert_eq!(stats.clubs.suspended, 1);
        assert_eq!(stats.clubs.distinguished, 1);
        assert!(!stats.closing_period.is_closing_period_data);
    }

    #[test]
    fn detects_closing_period_from_as_of_date() {
        let mut district = CsvRecord::new();
        district.insert("As Of".into(), CsvValue::Text("6/30/2024".into()));
        let info = ClosingPeriodDetector::detect(&[district], "2024-07-02");
        assert!(info.is_closing_period_data);
        assert_eq!(info.logical_date, "2024-06-30");
        assert_eq!(info.collection_date, "2024-07-02");
    }
}
