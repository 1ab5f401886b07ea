//! Sample ingestion (`reqprof record`).

use clap::Args;

use crate::{Config, MonthStamp, ProfileSample, ReqprofResult, unix_now};

#[derive(Debug, Args)]
pub struct RecordArgs {
    /// Request or script identifier, e.g. "index.php" or a task name.
    pub request: String,

    /// Execution duration in milliseconds.
    #[arg(long)]
    pub duration: i64,

    /// Script grouping key, typically the owning component.
    #[arg(long = "script-group")]
    pub scriptgroup: Option<String>,

    /// Script kind, e.g. "web", "cli", "task".
    #[arg(long = "script-type")]
    pub scripttype: Option<String>,

    /// Why this execution was sampled.
    #[arg(long)]
    pub reason: Option<String>,

    /// HTTP-style response code, if any.
    #[arg(long = "response-code")]
    pub responsecode: Option<i64>,

    #[arg(long = "user-id")]
    pub userid: Option<i64>,

    #[arg(long = "course-id")]
    pub courseid: Option<i64>,

    /// Milliseconds any lock was held during the execution.
    #[arg(long = "lock-held")]
    pub lockheld: Option<i64>,

    /// Milliseconds spent waiting to acquire a lock.
    #[arg(long = "lock-wait")]
    pub lockwait: Option<i64>,

    /// Unix seconds the execution completed; defaults to now.
    #[arg(long)]
    pub created: Option<i64>,
}

/// Insert one sample and fold it into the monthly page-group aggregate for
/// its request name.
pub fn record_command(config: &Config, args: &RecordArgs) -> ReqprofResult<serde_json::Value> {
    let db = super::open_db(config)?;
    let created = args.created.unwrap_or_else(unix_now);
    let sample = ProfileSample {
        request: args.request.clone(),
        scriptgroup: args.scriptgroup.clone(),
        scripttype: args.scripttype.clone(),
        reason: args.reason.clone(),
        responsecode: args.responsecode,
        userid: args.userid,
        courseid: args.courseid,
        duration: args.duration,
        lockheld: args.lockheld,
        lockwait: args.lockwait,
        created,
    };
    let id = db.insert_sample(&sample)?;
    db.fold(&args.request, created, args.duration.max(0) as u64)?;

    let month = MonthStamp::from_timestamp(created, db.reference_offset());
    let group_count = db
        .find_page_group(&args.request, month)?
        .map(|row| row.fuzzycount)
        .unwrap_or(0);
    Ok(serde_json::json!({
        "schemaVersion": "reqprof.record.v1",
        "id": id,
        "request": args.request,
        "month": month.to_string(),
        "groupCount": group_count,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;

    fn temp_config() -> Config {
        Config {
            base_dir: std::env::temp_dir().join(format!("reqprof-record-{}", uuid::Uuid::new_v4())),
            ..Config::default()
        }
    }

    fn args(request: &str) -> RecordArgs {
        RecordArgs {
            request: request.to_string(),
            duration: 120,
            scriptgroup: None,
            scripttype: Some("web".to_string()),
            reason: None,
            responsecode: Some(200),
            userid: None,
            courseid: None,
            lockheld: Some(10),
            lockwait: None,
            created: Some(1_710_072_000),
        }
    }

    #[test]
    fn record_inserts_and_folds() {
        let config = temp_config();
        let out = record_command(&config, &args("index.php")).expect("record");
        assert_eq!(out["schemaVersion"], "reqprof.record.v1");
        assert_eq!(out["month"], "2024-03");
        assert_eq!(out["groupCount"], 1);

        let again = record_command(&config, &args("index.php")).expect("record");
        assert_eq!(again["groupCount"], 2);
    }

    #[test]
    fn record_rejects_negative_duration() {
        let config = temp_config();
        let mut bad = args("index.php");
        bad.duration = -7;
        assert!(record_command(&config, &bad).is_err());
    }
}
