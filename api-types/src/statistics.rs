//! The validated, normalized per-district structure the builder produces
//! and the serving layer reads back (spec §3, `DistrictStatistics`).

use serde::{Deserialize, Serialize};

use crate::district::DistrictId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClubMembership {
    pub club_number: String,
    pub club_name: String,
    pub members: i64,
    pub change: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembershipSummary {
    pub total: i64,
    pub change: i64,
    pub change_percent: f64,
    pub by_club: Vec<ClubMembership>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClubHealth {
    pub total: i64,
    pub active: i64,
    pub suspended: i64,
    pub ineligible: i64,
    pub low: i64,
    pub distinguished: i64,
    pub select_distinguished: i64,
    pub presidents_distinguished: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EducationAward {
    pub award_type: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopClub {
    pub club_number: String,
    pub club_name: String,
    pub awards: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EducationSummary {
    pub total_awards: i64,
    pub by_type: Vec<EducationAward>,
    pub top_clubs: Vec<TopClub>,
}

/// Marks whether a district's data for a date reflects the upstream's
/// month-end closing period reprocessing (spec §4.6, GLOSSARY).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosingPeriodInfo {
    pub is_closing_period_data: bool,
    /// The date the data was actually collected (the cache date).
    pub collection_date: String,
    /// The date the upstream report claims to be "as of".
    pub logical_date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistrictStatistics {
    pub district_id: DistrictId,
    pub as_of_date: String,
    pub membership: MembershipSummary,
    pub clubs: ClubHealth,
    pub education: EducationSummary,
    pub closing_period: ClosingPeriodInfo,
}
