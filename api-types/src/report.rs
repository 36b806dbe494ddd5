//! Report kinds and the typed CSV record shape they parse into.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The four report shapes published by the upstream dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportKind {
    AllDistricts,
    DistrictPerformance,
    DivisionPerformance,
    ClubPerformance,
}

impl ReportKind {
    pub fn file_name(self) -> &'static str {
        match self {
            ReportKind::AllDistricts => "all-districts.csv",
            ReportKind::DistrictPerformance => "district-performance.csv",
            ReportKind::DivisionPerformance => "division-performance.csv",
            ReportKind::ClubPerformance => "club-performance.csv",
        }
    }

    pub fn is_per_district(self) -> bool {
        !matches!(self, ReportKind::AllDistricts)
    }

    /// The three per-district kinds, in the order the cache and builder
    /// fetch and write them.
    pub const PER_DISTRICT: [ReportKind; 3] = [
        ReportKind::DistrictPerformance,
        ReportKind::DivisionPerformance,
        ReportKind::ClubPerformance,
    ];
}

/// One field value in a parsed CSV row.
///
/// `REGION` is always kept as [`CsvValue::Text`] to preserve leading zeros;
/// everything else that parses as a finite number becomes
/// [`CsvValue::Number`], the empty string becomes [`CsvValue::Null`], and
/// anything else stays text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CsvValue {
    Number(f64),
    Text(String),
    Null,
}

impl CsvValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CsvValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CsvValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// One row of a parsed report, keyed by header.
///
/// A `BTreeMap` keeps header order irrelevant to equality/serialization
/// (spec §9: "keyed containers with insertion-order irrelevance") while
/// still giving deterministic iteration for tests and debug output.
pub type CsvRecord = BTreeMap<String, CsvValue>;

/// Reads the district id out of a raw record, checking both the
/// upstream's historical `DISTRICT` and `District` header spellings.
///
/// Purely-numeric district ids (e.g. "42") go through the same
/// text-or-number coercion as any other field, so a raw record may carry the
/// id as [`CsvValue::Number`]; this renders it back to its canonical integer
/// string form for validation.
pub fn record_district_id(record: &CsvRecord) -> Option<String> {
    let value = record.get("DISTRICT").or_else(|| record.get("District"))?;
    match value {
        CsvValue::Text(s) => Some(s.clone()),
        CsvValue::Number(n) if n.fract() == 0.0 => Some(format!("{}", *n as i64)),
        CsvValue::Number(n) => Some(n.to_string()),
        CsvValue::Null => None,
    }
}
