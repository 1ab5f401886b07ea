//! Age-based retention purge for page-group aggregates.

use rusqlite::params;

use crate::{MonthStamp, ProfileDb, ReqprofResult};

impl ProfileDb {
    /// Delete page groups older than `cutoff_months` calendar months before
    /// `now`. Buckets in the cutoff month itself are kept.
    ///
    /// `None` means retention is unconfigured and the run is a deliberate
    /// no-op. Deletes happen in id batches of `batch_size`, each batch its
    /// own transaction, so repeated or interrupted runs only ever leave
    /// fewer rows behind. Running twice with the same arguments deletes
    /// nothing the second time.
    pub fn purge_page_groups(
        &self,
        cutoff_months: Option<u32>,
        now: i64,
        batch_size: usize,
    ) -> ReqprofResult<usize> {
        let Some(months) = cutoff_months else {
            tracing::debug!("page group retention is unconfigured, skipping purge");
            return Ok(0);
        };

        let cutoff = MonthStamp::from_timestamp(now, self.offset).minus_months(months);
        let ids = {
            let mut stmt = self
                .conn
                .prepare("SELECT id FROM page_groups WHERE month < ?1")?;
            stmt.query_map(params![cutoff.as_u32()], |row| row.get::<_, i64>(0))?
                .collect::<Result<Vec<_>, _>>()?
        };
        let deleted = self.delete_page_groups_by_id(&ids, batch_size)?;
        if deleted > 0 {
            tracing::info!("purged {deleted} page group rows older than {cutoff}");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::UtcOffset;

    // 2024-03-10T12:00:00Z
    const NOW: i64 = 1_710_072_000;

    fn test_db() -> ProfileDb {
        ProfileDb::open_in_memory(UtcOffset::UTC).expect("db")
    }

    fn seed_monthly_buckets(db: &ProfileDb, months_back: u32) {
        let now_month = MonthStamp::from_timestamp(NOW, UtcOffset::UTC);
        for back in 0..months_back {
            let month = now_month.minus_months(back);
            db.conn
                .execute(
                    "INSERT INTO page_groups (name, month, fuzzycount, fuzzydurationcounts, fuzzydurationsum)
                     VALUES (?1, ?2, 0, '', 0)",
                    params![format!("group-{back}"), month.as_u32()],
                )
                .expect("seed bucket");
        }
    }

    fn count_buckets(db: &ProfileDb) -> i64 {
        db.conn
            .query_row("SELECT COUNT(*) FROM page_groups", [], |row| row.get(0))
            .expect("count")
    }

    #[test]
    fn unconfigured_cutoff_is_a_noop() {
        let db = test_db();
        seed_monthly_buckets(&db, 8);

        let deleted = db.purge_page_groups(None, NOW, 1000).expect("purge");
        assert_eq!(deleted, 0);
        assert_eq!(count_buckets(&db), 8);
    }

    #[test]
    fn cutoff_keeps_current_month_through_cutoff_month() {
        let db = test_db();
        seed_monthly_buckets(&db, 8);

        let deleted = db.purge_page_groups(Some(4), NOW, 1000).expect("purge");
        assert_eq!(deleted, 3);
        assert_eq!(count_buckets(&db), 5);

        let cutoff = MonthStamp::from_timestamp(NOW, UtcOffset::UTC).minus_months(4);
        let oldest: i64 = db
            .conn
            .query_row("SELECT MIN(month) FROM page_groups", [], |row| row.get(0))
            .expect("oldest");
        assert!(oldest as u32 >= cutoff.as_u32());
    }

    #[test]
    fn purge_is_idempotent() {
        let db = test_db();
        seed_monthly_buckets(&db, 8);

        assert_eq!(db.purge_page_groups(Some(4), NOW, 1000).expect("purge"), 3);
        assert_eq!(
            db.purge_page_groups(Some(4), NOW, 1000).expect("second purge"),
            0
        );
    }

    #[test]
    fn purge_honors_small_batch_sizes() {
        let db = test_db();
        seed_monthly_buckets(&db, 12);

        let deleted = db.purge_page_groups(Some(2), NOW, 3).expect("purge");
        assert_eq!(deleted, 9);
        assert_eq!(count_buckets(&db), 3);
    }

    #[test]
    fn fold_after_purge_recreates_the_bucket() {
        let db = test_db();
        seed_monthly_buckets(&db, 8);
        db.purge_page_groups(Some(0), NOW, 1000).expect("purge");
        assert_eq!(count_buckets(&db), 1);

        db.fold("late-arrival", NOW, 10).expect("fold");
        let month = MonthStamp::from_timestamp(NOW, UtcOffset::UTC);
        assert!(
            db.find_page_group("late-arrival", month)
                .expect("find")
                .is_some()
        );
    }
}
