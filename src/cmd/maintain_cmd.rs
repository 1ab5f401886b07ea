//! Store maintenance (`reqprof maintain ...`).

use clap::Subcommand;

use crate::{Config, ReqprofResult, unix_now};

#[derive(Debug, Subcommand)]
pub enum MaintainCommand {
    /// Purge page groups older than the retention window.
    Purge {
        /// Override the configured retention window, in months.
        #[arg(long = "cutoff-months")]
        cutoff_months: Option<u32>,
        /// Reference time as unix seconds; defaults to now.
        #[arg(long)]
        now: Option<i64>,
    },
    /// Remove page-group rows that violate the identity invariant.
    Repair,
}

pub fn maintain_command(
    config: &Config,
    command: &MaintainCommand,
) -> ReqprofResult<serde_json::Value> {
    let db = super::open_db(config)?;
    match command {
        MaintainCommand::Purge { cutoff_months, now } => {
            let cutoff = cutoff_months.or(config.retention_months);
            let at = now.unwrap_or_else(unix_now);
            let deleted = db.purge_page_groups(cutoff, at, config.purge_batch_size)?;
            Ok(serde_json::json!({
                "schemaVersion": "reqprof.maintain_purge.v1",
                "cutoffMonths": cutoff,
                "deleted": deleted,
            }))
        }
        MaintainCommand::Repair => {
            let summary = db.repair_page_groups(config.purge_batch_size)?;
            Ok(serde_json::json!({
                "schemaVersion": "reqprof.maintain_repair.v1",
                "oversizedRemoved": summary.oversized_removed,
                "duplicatesRemoved": summary.duplicates_removed,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;

    fn temp_config() -> Config {
        Config {
            base_dir: std::env::temp_dir()
                .join(format!("reqprof-maintain-{}", uuid::Uuid::new_v4())),
            ..Config::default()
        }
    }

    // 2024-03-10T12:00:00Z
    const NOW: i64 = 1_710_072_000;

    fn seed(config: &Config, months_back: u32) {
        let db = super::super::open_db(config).expect("db");
        for back in 0..months_back {
            // Roughly one month apart; exact day does not matter.
            let at = NOW - i64::from(back) * 31 * 86_400;
            db.fold("seed", at, 10).expect("fold");
        }
    }

    #[test]
    fn purge_without_retention_config_deletes_nothing() {
        let config = temp_config();
        seed(&config, 6);
        let out = maintain_command(
            &config,
            &MaintainCommand::Purge {
                cutoff_months: None,
                now: Some(NOW),
            },
        )
        .expect("purge");
        assert_eq!(out["deleted"], 0);
        assert!(out["cutoffMonths"].is_null());
    }

    #[test]
    fn purge_uses_configured_retention_when_no_override() {
        let mut config = temp_config();
        config.retention_months = Some(2);
        seed(&config, 6);
        let out = maintain_command(
            &config,
            &MaintainCommand::Purge {
                cutoff_months: None,
                now: Some(NOW),
            },
        )
        .expect("purge");
        assert_eq!(out["cutoffMonths"], 2);
        assert!(out["deleted"].as_u64().expect("deleted") > 0);
    }

    #[test]
    fn repair_reports_zero_on_a_healthy_store() {
        let config = temp_config();
        seed(&config, 3);
        let out = maintain_command(&config, &MaintainCommand::Repair).expect("repair");
        assert_eq!(out["oversizedRemoved"], 0);
        assert_eq!(out["duplicatesRemoved"], 0);
    }
}
