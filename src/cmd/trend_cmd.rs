//! Month-over-month page-group trends (`reqprof trend ...`).

use clap::Subcommand;

use crate::{Config, ReqprofResult, unix_now};

#[derive(Debug, Subcommand)]
pub enum TrendCommand {
    /// Fold one observation into its monthly page group without storing a
    /// sample row.
    Fold {
        /// Page group name.
        name: String,
        /// Duration in milliseconds.
        #[arg(long)]
        duration: u64,
        /// Unix seconds of the observation; defaults to now.
        #[arg(long)]
        timestamp: Option<i64>,
    },
    /// Show the monthly history for a page group, oldest first.
    Show {
        /// Page group name (case-insensitive).
        name: String,
    },
}

pub fn trend_command(config: &Config, command: &TrendCommand) -> ReqprofResult<serde_json::Value> {
    let db = super::open_db(config)?;
    match command {
        TrendCommand::Fold {
            name,
            duration,
            timestamp,
        } => {
            let at = timestamp.unwrap_or_else(unix_now);
            db.fold(name, at, *duration)?;
            Ok(serde_json::json!({
                "schemaVersion": "reqprof.trend_fold.v1",
                "name": name,
                "duration": duration,
            }))
        }
        TrendCommand::Show { name } => {
            let rows = db.page_group_trend(name)?;
            let months = rows
                .iter()
                .map(|row| {
                    serde_json::json!({
                        "month": row.month.to_string(),
                        "count": row.fuzzycount,
                        "durationSum": row.fuzzydurationsum,
                        "approxMean": row.approx_mean(),
                        "histogram": row.histogram,
                    })
                })
                .collect::<Vec<_>>();
            Ok(serde_json::json!({
                "schemaVersion": "reqprof.trend.v1",
                "name": name,
                "months": months,
            }))
        }
    }
}
