//! SQLite-backed profile store: schema, sample ingestion, shared helpers.

use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};

use std::path::Path;

use time::UtcOffset;

use crate::{ReqprofError, ReqprofResult};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS profile_samples (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    request TEXT NOT NULL,
    scriptgroup TEXT,
    scripttype TEXT,
    reason TEXT,
    responsecode INTEGER,
    userid INTEGER,
    courseid INTEGER,
    duration INTEGER NOT NULL,
    lockheld INTEGER,
    lockwait INTEGER,
    created INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_samples_request ON profile_samples(request);
CREATE INDEX IF NOT EXISTS idx_samples_created ON profile_samples(created);

CREATE TABLE IF NOT EXISTS page_groups (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    month INTEGER NOT NULL,
    fuzzycount INTEGER NOT NULL DEFAULT 0,
    fuzzydurationcounts TEXT NOT NULL DEFAULT '',
    fuzzydurationsum INTEGER NOT NULL DEFAULT 0
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_page_group_identity
    ON page_groups(lower(name), month);
"#;

/// One completed request/script execution, as fed to the store.
///
/// Durations and lock times are milliseconds; `created` is unix seconds.
/// Response code, user and course ids are dimensions usable only as filter
/// predicates, never aggregated beyond count/min/max.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSample {
    pub request: String,
    pub scriptgroup: Option<String>,
    pub scripttype: Option<String>,
    pub reason: Option<String>,
    pub responsecode: Option<i64>,
    pub userid: Option<i64>,
    pub courseid: Option<i64>,
    pub duration: i64,
    pub lockheld: Option<i64>,
    pub lockwait: Option<i64>,
    pub created: i64,
}

/// Handle on the profile database. The reference offset for month bucketing
/// is pinned at open time; no conversion re-derives it.
pub struct ProfileDb {
    pub(crate) conn: Connection,
    pub(crate) offset: UtcOffset,
}

impl ProfileDb {
    pub fn open_at<P: AsRef<Path>>(path: P, offset: UtcOffset) -> ReqprofResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn, offset })
    }

    pub fn open_in_memory(offset: UtcOffset) -> ReqprofResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn, offset })
    }

    pub fn reference_offset(&self) -> UtcOffset {
        self.offset
    }

    /// Persist one sample row, returning its id.
    pub fn insert_sample(&self, sample: &ProfileSample) -> ReqprofResult<i64> {
        if sample.duration < 0 {
            return Err(ReqprofError::InvalidArgument(format!(
                "sample duration must be non-negative, got {}",
                sample.duration
            )));
        }
        for (field, value) in [("lockheld", sample.lockheld), ("lockwait", sample.lockwait)] {
            if value.is_some_and(|v| v < 0) {
                return Err(ReqprofError::InvalidArgument(format!(
                    "sample {field} must be null or non-negative"
                )));
            }
        }

        self.conn.execute(
            "INSERT INTO profile_samples
                (request, scriptgroup, scripttype, reason, responsecode, userid, courseid,
                 duration, lockheld, lockwait, created)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                &sample.request,
                &sample.scriptgroup,
                &sample.scripttype,
                &sample.reason,
                sample.responsecode,
                sample.userid,
                sample.courseid,
                sample.duration,
                sample.lockheld,
                sample.lockwait,
                sample.created,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Delete page-group rows by id in fixed-size batches, one transaction
    /// per batch. Returns the number of rows removed.
    pub(crate) fn delete_page_groups_by_id(
        &self,
        ids: &[i64],
        batch_size: usize,
    ) -> ReqprofResult<usize> {
        let batch_size = batch_size.max(1);
        let mut removed = 0;
        for chunk in ids.chunks(batch_size) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!("DELETE FROM page_groups WHERE id IN ({placeholders})");
            let tx = self.conn.unchecked_transaction()?;
            removed += tx.execute(&sql, rusqlite::params_from_iter(chunk.iter()))?;
            tx.commit()?;
            tracing::debug!("deleted batch of {} page group rows", chunk.len());
        }
        Ok(removed)
    }
}

pub fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(request: &str) -> ProfileSample {
        ProfileSample {
            request: request.to_string(),
            scriptgroup: Some(request.to_string()),
            scripttype: None,
            reason: None,
            responsecode: Some(200),
            userid: Some(3),
            courseid: None,
            duration: 120,
            lockheld: Some(15),
            lockwait: None,
            created: 1_700_000_000,
        }
    }

    #[test]
    fn insert_assigns_increasing_ids() {
        let db = ProfileDb::open_in_memory(UtcOffset::UTC).expect("db");
        let a = db.insert_sample(&sample("index.php")).expect("insert");
        let b = db.insert_sample(&sample("view.php")).expect("insert");
        assert!(b > a);
    }

    #[test]
    fn negative_duration_is_rejected() {
        let db = ProfileDb::open_in_memory(UtcOffset::UTC).expect("db");
        let mut s = sample("index.php");
        s.duration = -1;
        let err = db.insert_sample(&s).expect_err("must fail");
        assert!(matches!(err, ReqprofError::InvalidArgument(_)));
    }

    #[test]
    fn negative_lockheld_is_rejected() {
        let db = ProfileDb::open_in_memory(UtcOffset::UTC).expect("db");
        let mut s = sample("index.php");
        s.lockheld = Some(-5);
        let err = db.insert_sample(&s).expect_err("must fail");
        assert!(matches!(err, ReqprofError::InvalidArgument(_)));
    }

    #[test]
    fn open_at_creates_parent_directories() {
        let dir = std::env::temp_dir().join(format!("reqprof-store-{}", uuid::Uuid::new_v4()));
        let db_path = dir.join("nested").join("profiles.db");
        let db = ProfileDb::open_at(&db_path, UtcOffset::UTC).expect("db");
        db.insert_sample(&sample("index.php")).expect("insert");
        assert!(db_path.exists());
    }
}
