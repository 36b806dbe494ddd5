//! Borda-count ranking across three percentage categories (spec §4.7).

use district_report_types::RankingRow;

struct InputRow {
    district_id: district_report_types::DistrictId,
    club_growth_percent: f64,
    payment_growth_percent: f64,
    distinguished_percent: f64,
}

pub struct RankingInput {
    pub district_id: district_report_types::DistrictId,
    pub club_growth_percent: f64,
    pub payment_growth_percent: f64,
    pub distinguished_percent: f64,
}

/// NaN/null values rank last regardless of sort direction (spec §4.7 edge
/// case: "treat as -Infinity").
fn normalize(value: f64) -> f64 {
    if value.is_nan() {
        f64::NEG_INFINITY
    } else {
        value
    }
}

/// Competition ranking over `values` (already normalized), returning the
/// 1-based rank of each original index: ties share a rank and the next rank
/// skips by the tie group's size.
fn competition_ranks(values: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[b].partial_cmp(&values[a]).unwrap());

    let mut ranks = vec![0usize; values.len()];
    let mut i = 0;
    while i < order.len() {
        let rank = i + 1;
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        for idx in &order[i..=j] {
            ranks[*idx] = rank;
        }
        i = j + 1;
    }
    ranks
}

fn borda_points(rank: usize, n: usize) -> i64 {
    (n as i64) - (rank as i64) + 1
}

/// Computes ranks, Borda points, and aggregate score for every district,
/// in input order (spec §3 `RankingRow`, §4.7).
pub fn compute_rankings(input: Vec<RankingInput>) -> Vec<RankingRow> {
    let n = input.len();
    let rows: Vec<InputRow> = input
        .into_iter()
        .map(|r| InputRow {
            district_id: r.district_id,
            club_growth_percent: r.club_growth_percent,
            payment_growth_percent: r.payment_growth_percent,
            distinguished_percent: r.distinguished_percent,
        })
        .collect();

    let club_values: Vec<f64> = rows.iter().map(|r| normalize(r.club_growth_percent)).collect();
    let payment_values: Vec<f64> = rows.iter().map(|r| normalize(r.payment_growth_percent)).collect();
    let distinguished_values: Vec<f64> = rows.iter().map(|r| normalize(r.distinguished_percent)).collect();

    let club_ranks = competition_ranks(&club_values);
    let payment_ranks = competition_ranks(&payment_values);
    let distinguished_ranks = competition_ranks(&distinguished_values);

    rows.into_iter()
        .enumerate()
        .map(|(i, row)| {
            let club_growth_rank = club_ranks[i];
            let payment_growth_rank = payment_ranks[i];
            let distinguished_rank = distinguished_ranks[i];

            let club_growth_points = borda_points(club_growth_rank, n);
            let payment_growth_points = borda_points(payment_growth_rank, n);
            let distinguished_points = borda_points(distinguished_rank, n);

            RankingRow {
                district_id: row.district_id,
                club_growth_percent: row.club_growth_percent,
                payment_growth_percent: row.payment_growth_percent,
                distinguished_percent: row.distinguished_percent,
                club_growth_rank,
                payment_growth_rank,
                distinguished_rank,
                club_growth_points,
                payment_growth_points,
                distinguished_points,
                aggregate_score: club_growth_points + payment_growth_points + distinguished_points,
            }
        })
        .collect()
}

/// Orders rows by `aggregateScore` descending, stable on ties (spec §4.7:
/// "ties in the final ordering are allowed and left stable in input order").
pub fn order_by_aggregate_score(mut rows: Vec<RankingRow>) -> Vec<RankingRow> {
    rows.sort_by(|a, b| b.aggregate_score.cmp(&a.aggregate_score));
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn row(id: &str, club: f64, payment: f64, distinguished: f64) -> RankingInput {
        RankingInput {
            district_id: district_report_types::DistrictId::from_str(id).unwrap(),
            club_growth_percent: club,
            payment_growth_percent: payment,
            distinguished_percent: distinguished,
        }
    }

    #[test]
    fn scenario_a_three_districts() {
        let input = vec![
            row("1", 5.0, 10.0, 20.0),
            row("2", 5.0, 8.0, 30.0),
            row("3", 3.0, 12.0, 40.0),
        ];
        let rankings = compute_rankings(input);

        assert_eq!(rankings[0].club_growth_rank, 1);
        assert_eq!(rankings[1].club_growth_rank, 1);
        assert_eq!(rankings[2].club_growth_rank, 3);

        assert_eq!(rankings[0].payment_growth_rank, 2);
        assert_eq!(rankings[1].payment_growth_rank, 3);
        assert_eq!(rankings[2].payment_growth_rank, 1);

        assert_eq!(rankings[0].distinguished_rank, 3);
        assert_eq!(rankings[1].distinguished_rank, 2);
        assert_eq!(rankings[2].distinguished_rank, 1);

        assert_eq!(rankings[0].aggregate_score, 6);
        assert_eq!(rankings[1].aggregate_score, 6);
        assert_eq!(rankings[2].aggregate_score, 7);

        let ordered = order_by_aggregate_score(rankings);
        assert_eq!(ordered[0].district_id.as_str(), "3");
        assert_eq!(ordered[1].district_id.as_str(), "1");
        assert_eq!(ordered[2].district_id.as_str(), "2");
    }

    #[test]
    fn nan_values_rank_last() {
        let input = vec![row("1", f64::NAN, 1.0, 1.0), row("2", 5.0, 1.0, 1.0)];
        let rankings = compute_rankings(input);
        assert_eq!(rankings[0].club_growth_rank, 2);
        assert_eq!(rankings[1].club_growth_rank, 1);
    }
}
