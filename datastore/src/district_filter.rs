//! Filters malformed district ids out of raw records before they reach any
//! artifact (spec §4.2). Rejection is warnings-only; it never fails the
//! pipeline.

use std::collections::BTreeMap;

use district_report_types::district::DistrictIdError;
use district_report_types::report::record_district_id;
use district_report_types::{CsvRecord, DistrictId};

pub struct RejectedRecord {
    pub district_id: String,
    pub reason: String,
}

pub struct FilterResult {
    pub valid: Vec<(DistrictId, CsvRecord)>,
    pub rejected: Vec<RejectedRecord>,
    /// Count of rejections per reason kind, for the batch summary.
    pub reason_counts: BTreeMap<&'static str, usize>,
}

fn reason_kind(err: &DistrictIdError) -> &'static str {
    match err {
        DistrictIdError::Empty => "empty",
        DistrictIdError::AsOfDate(_) => "as_of_date",
        DistrictIdError::NotAlphanumeric(_) => "not_alphanumeric",
    }
}

/// Partitions raw records by district id validity, reading the id from
/// whichever of `DISTRICT`/`District` is present.
pub fn filter_records(records: Vec<CsvRecord>) -> FilterResult {
    let mut valid = Vec::new();
    let mut rejected = Vec::new();
    let mut reason_counts = BTreeMap::new();

    for record in records {
        let raw_id = record_district_id(&record).unwrap_or_default();
        match DistrictId::parse(&raw_id) {
            Ok(id) => valid.push((id, record)),
            Err(err) => {
                *reason_counts.entry(reason_kind(&err)).or_insert(0) += 1;
                rejected.push(RejectedRecord {
                    district_id: raw_id,
                    reason: err.to_string(),
                });
            }
        }
    }

    FilterResult {
        valid,
        rejected,
        reason_counts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use district_report_types::report::CsvValue;

    fn record(id: &str) -> CsvRecord {
        let mut r = CsvRecord::new();
        r.insert("DISTRICT".to_string(), CsvValue::Text(id.to_string()));
        r
    }

    #[test]
    fn rejects_as_of_date_and_keeps_valid_ids() {
        let records = vec![record("42"), record("As of 1/20/2026"), record("7-B")];
        let result = filter_records(records);
        assert_eq!(result.valid.len(), 1);
        assert_eq!(result.valid[0].0.as_str(), "42");
        assert_eq!(result.rejected.len(), 2);
        assert_eq!(result.reason_counts.get("as_of_date"), Some(&1));
        assert_eq!(result.reason_counts.get("not_alphanumeric"), Some(&1));
    }
}
