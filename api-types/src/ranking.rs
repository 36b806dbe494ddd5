//! Per-district output of the Borda-count ranking engine (spec §4.7).

use serde::{Deserialize, Serialize};

use crate::district::DistrictId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingRow {
    pub district_id: DistrictId,
    pub club_growth_percent: f64,
    pub payment_growth_percent: f64,
    pub distinguished_percent: f64,

    pub club_growth_rank: usize,
    pub payment_growth_rank: usize,
    pub distinguished_rank: usize,

    pub club_growth_points: i64,
    pub payment_growth_points: i64,
    pub distinguished_points: i64,

    pub aggregate_score: i64,
}
