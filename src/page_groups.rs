//! Month-bucketed page-group aggregates: fold, lookup, and repair.

use rusqlite::{OptionalExtension, Row, params};
use serde::Serialize;

use crate::{DurationHistogram, MonthStamp, ProfileDb, ReqprofError, ReqprofResult};

/// Stored width of the page group name column.
pub const MAX_NAME_CHARS: usize = 255;

/// One persisted `(name, month)` aggregate. Uniqueness of
/// `(lower(name), month)` is enforced by an index; duplicates only occur in
/// databases predating it and are handled by [`ProfileDb::repair_page_groups`].
#[derive(Debug, Clone, Serialize)]
pub struct PageGroupRow {
    pub id: i64,
    pub name: String,
    pub month: MonthStamp,
    pub fuzzycount: u64,
    pub histogram: DurationHistogram,
    pub fuzzydurationsum: u64,
}

impl PageGroupRow {
    /// Approximate mean duration for the month, derived without retaining
    /// raw samples.
    pub fn approx_mean(&self) -> Option<u64> {
        (self.fuzzycount > 0).then(|| self.fuzzydurationsum / self.fuzzycount)
    }
}

/// Outcome of a page-group repair pass.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RepairSummary {
    pub oversized_removed: usize,
    pub duplicates_removed: usize,
}

impl ProfileDb {
    /// Fold one `(name, timestamp, duration)` observation into its page
    /// group, creating the row on first use. Names wider than the stored
    /// column are truncated, consistently with lookup.
    ///
    /// Folds into the same key are serialized by the enclosing transaction;
    /// an insert losing a race to a concurrent fold retries once against the
    /// now-existing row.
    pub fn fold(&self, name: &str, timestamp: i64, duration: u64) -> ReqprofResult<()> {
        let name = clamp_name(name);
        let month = MonthStamp::from_timestamp(timestamp, self.offset);
        match self.fold_once(&name, month, duration) {
            Err(ReqprofError::Storage(rusqlite::Error::SqliteFailure(err, _)))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                tracing::debug!("fold raced a concurrent insert for {name:?} {month}, retrying");
                self.fold_once(&name, month, duration)
            }
            other => other,
        }
    }

    fn fold_once(&self, name: &str, month: MonthStamp, duration: u64) -> ReqprofResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        let existing = tx
            .query_row(
                "SELECT id, fuzzycount, fuzzydurationcounts, fuzzydurationsum
                   FROM page_groups
                  WHERE lower(name) = lower(?1) AND month = ?2
                  ORDER BY id LIMIT 1",
                params![name, month.as_u32()],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                },
            )
            .optional()?;

        match existing {
            Some((id, count, payload, sum)) => {
                let mut histogram = DurationHistogram::decode(&payload);
                histogram.record(duration);
                tx.execute(
                    "UPDATE page_groups
                        SET fuzzycount = ?1, fuzzydurationcounts = ?2, fuzzydurationsum = ?3
                      WHERE id = ?4",
                    params![
                        count.saturating_add(1),
                        histogram.encode()?,
                        sum.saturating_add(duration as i64),
                        id
                    ],
                )?;
            }
            None => {
                let mut histogram = DurationHistogram::new();
                histogram.record(duration);
                tx.execute(
                    "INSERT INTO page_groups
                        (name, month, fuzzycount, fuzzydurationcounts, fuzzydurationsum)
                     VALUES (?1, ?2, 1, ?3, ?4)",
                    params![name, month.as_u32(), histogram.encode()?, duration as i64],
                )?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Exact case-insensitive lookup; absence is not an error.
    pub fn find_page_group(
        &self,
        name: &str,
        month: MonthStamp,
    ) -> ReqprofResult<Option<PageGroupRow>> {
        let name = clamp_name(name);
        let row = self
            .conn
            .query_row(
                "SELECT id, name, month, fuzzycount, fuzzydurationcounts, fuzzydurationsum
                   FROM page_groups
                  WHERE lower(name) = lower(?1) AND month = ?2
                  ORDER BY id LIMIT 1",
                params![&name[..], month.as_u32()],
                page_group_from_row,
            )
            .optional()?;
        Ok(row)
    }

    /// All monthly rows for a page group, oldest first.
    pub fn page_group_trend(&self, name: &str) -> ReqprofResult<Vec<PageGroupRow>> {
        let name = clamp_name(name);
        let mut stmt = self.conn.prepare(
            "SELECT id, name, month, fuzzycount, fuzzydurationcounts, fuzzydurationsum
               FROM page_groups
              WHERE lower(name) = lower(?1)
              ORDER BY month ASC, id ASC",
        )?;
        let rows = stmt
            .query_map(params![&name[..]], page_group_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Remove rows violating the `(lower(name), month)` uniqueness
    /// invariant, keeping the lowest-id row of each duplicate group.
    /// Duplicates are pruned, not merged: their histograms are treated as
    /// redundant data from before the constraint existed.
    pub fn dedupe_page_groups(&self, batch_size: usize) -> ReqprofResult<usize> {
        // Cheap precheck: compare the expected distinct-group count against
        // the row count before scanning for ids to remove.
        let distinct: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM (SELECT MIN(id) FROM page_groups GROUP BY lower(name), month)",
            [],
            |row| row.get(0),
        )?;
        let total: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM page_groups", [], |row| row.get(0))?;
        if distinct == total {
            return Ok(0);
        }

        let ids = {
            let mut stmt = self.conn.prepare(
                "SELECT id FROM page_groups
                  WHERE id NOT IN (
                      SELECT MIN(id) FROM page_groups GROUP BY lower(name), month
                  )",
            )?;
            stmt.query_map([], |row| row.get::<_, i64>(0))?
                .collect::<Result<Vec<_>, _>>()?
        };
        let removed = self.delete_page_groups_by_id(&ids, batch_size)?;
        if removed > 0 {
            tracing::warn!("removed {removed} duplicate page group rows");
        }
        Ok(removed)
    }

    /// Drop legacy rows whose name exceeds the stored column width; new
    /// folds truncate instead, so these only exist in old databases.
    pub fn drop_oversized_page_groups(&self, batch_size: usize) -> ReqprofResult<usize> {
        let ids = {
            let mut stmt = self
                .conn
                .prepare("SELECT id FROM page_groups WHERE length(name) > ?1")?;
            stmt.query_map(params![MAX_NAME_CHARS as i64], |row| row.get::<_, i64>(0))?
                .collect::<Result<Vec<_>, _>>()?
        };
        let removed = self.delete_page_groups_by_id(&ids, batch_size)?;
        if removed > 0 {
            tracing::warn!("removed {removed} page group rows with oversized names");
        }
        Ok(removed)
    }

    /// Full repair pass: oversized names first, then duplicates.
    pub fn repair_page_groups(&self, batch_size: usize) -> ReqprofResult<RepairSummary> {
        let oversized_removed = self.drop_oversized_page_groups(batch_size)?;
        let duplicates_removed = self.dedupe_page_groups(batch_size)?;
        Ok(RepairSummary {
            oversized_removed,
            duplicates_removed,
        })
    }
}

fn page_group_from_row(row: &Row<'_>) -> rusqlite::Result<PageGroupRow> {
    let payload: String = row.get(4)?;
    Ok(PageGroupRow {
        id: row.get(0)?,
        name: row.get(1)?,
        month: MonthStamp::from_raw(row.get::<_, i64>(2)?.max(0) as u32),
        fuzzycount: row.get::<_, i64>(3)?.max(0) as u64,
        histogram: DurationHistogram::decode(&payload),
        fuzzydurationsum: row.get::<_, i64>(5)?.max(0) as u64,
    })
}

fn clamp_name(name: &str) -> std::borrow::Cow<'_, str> {
    if name.chars().count() <= MAX_NAME_CHARS {
        std::borrow::Cow::Borrowed(name)
    } else {
        std::borrow::Cow::Owned(name.chars().take(MAX_NAME_CHARS).collect())
    }
}
