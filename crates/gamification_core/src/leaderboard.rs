//! Ranked queries over user points records.
//!
//! Both functions sort or scan the full set of records on every call.

use uuid::Uuid;

use crate::domain::{Tier, UserPointsRecord, UserRank};

/// The top `limit` records, optionally restricted to a tier, highest total
/// first. Equal totals keep their storage order.
pub fn top_records(
    mut records: Vec<UserPointsRecord>,
    limit: usize,
    tier: Option<Tier>,
) -> Vec<UserPointsRecord> {
    if let Some(tier) = tier {
        records.retain(|r| r.tier == tier);
    }
    records.sort_by(|a, b| b.total_points.total_cmp(&a.total_points));
    records.truncate(limit);
    records
}

/// Rank is one plus the number of users with a strictly higher total.
pub fn rank_of(records: &[UserPointsRecord], user_id: Uuid) -> Option<UserRank> {
    let me = records.iter().find(|r| r.user_id == user_id)?;
    let above = records
        .iter()
        .filter(|r| r.total_points > me.total_points)
        .count() as u64;
    let rank = above + 1;
    let total_users = records.len() as u64;
    let percentile = ((1.0 - rank as f64 / total_users as f64) * 100.0).round() as i64;

    Some(UserRank {
        user_id,
        rank,
        percentile,
        total_users,
        total_points: me.total_points,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PointValues;
    use chrono::Utc;

    fn record(total: f64) -> UserPointsRecord {
        let values = PointValues::default();
        let mut r = UserPointsRecord::new(Uuid::new_v4(), &values, Utc::now());
        r.total_points = total;
        r.refresh_derived(&values);
        r
    }

    #[test]
    fn sorts_descending_and_truncates() {
        let records = vec![record(10.0), record(30.0), record(20.0)];
        let top = top_records(records, 2, None);
        let totals: Vec<f64> = top.iter().map(|r| r.total_points).collect();
        assert_eq!(totals, vec![30.0, 20.0]);
    }

    #[test]
    fn limit_larger_than_population() {
        let top = top_records(vec![record(1.0), record(2.0)], 10, None);
        assert_eq!(top.len(), 2);
    }

    #[test]
    fn ties_keep_storage_order() {
        let records = vec![record(5.0), record(5.0), record(9.0)];
        let ids: Vec<Uuid> = records.iter().map(|r| r.user_id).collect();
        let top = top_records(records, 3, None);
        assert_eq!(
            top.iter().map(|r| r.user_id).collect::<Vec<_>>(),
            vec![ids[2], ids[0], ids[1]]
        );
    }

    #[test]
    fn tier_filter() {
        let records = vec![record(10.0), record(5_000_000.0), record(30.0)];
        let silver_or_better = records[1].tier;
        assert_ne!(silver_or_better, Tier::Bronze);

        let bronze = top_records(records.clone(), 10, Some(Tier::Bronze));
        assert_eq!(bronze.len(), 2);
        assert!(bronze.iter().all(|r| r.tier == Tier::Bronze));
        assert_eq!(top_records(records, 10, Some(silver_or_better)).len(), 1);
    }

    #[test]
    fn rank_and_percentile() {
        let records = vec![record(10.0), record(30.0), record(20.0), record(30.0)];

        let top = rank_of(&records, records[1].user_id).unwrap();
        assert_eq!(top.rank, 1);
        assert_eq!(top.percentile, 75);

        let tied = rank_of(&records, records[3].user_id).unwrap();
        assert_eq!(tied.rank, 1);

        let last = rank_of(&records, records[0].user_id).unwrap();
        assert_eq!(last.rank, 4);
        assert_eq!(last.percentile, 0);
        assert_eq!(last.total_users, 4);

        assert!(rank_of(&records, Uuid::new_v4()).is_none());
    }
}
