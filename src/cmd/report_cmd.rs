//! Aggregate and detail reports (`reqprof report ...`).

use clap::Subcommand;

use crate::{
    Config, Dimension, FilterSet, GroupSortColumn, GroupedQuery, ReqprofError, ReqprofResult,
    SampleQuery, SampleSortColumn, SortDirection,
};

#[derive(Debug, Subcommand)]
pub enum ReportCommand {
    /// Aggregate statistics per group key.
    Grouped {
        /// Dimension to group samples by.
        #[arg(long = "group-by", default_value = "scriptgroup")]
        group_by: Dimension,
        /// Repeatable `field=value` predicate, e.g. `--filter scripttype=web`.
        #[arg(long = "filter", value_name = "FIELD=VALUE")]
        filters: Vec<String>,
        /// Keep only groups whose max lock-held time (ms) exceeds this.
        #[arg(long)]
        threshold: Option<i64>,
        #[arg(long, default_value = "max_lockheld")]
        sort: GroupSortColumn,
        #[arg(long, default_value = "desc")]
        direction: SortDirection,
        #[arg(long, default_value_t = 0)]
        page: u64,
        /// Rows per page; 0 returns everything.
        #[arg(long = "page-size", default_value_t = 0)]
        page_size: u64,
    },
    /// Individual sample rows.
    Samples {
        #[arg(long = "filter", value_name = "FIELD=VALUE")]
        filters: Vec<String>,
        #[arg(long, default_value = "lockheld")]
        sort: SampleSortColumn,
        #[arg(long, default_value = "desc")]
        direction: SortDirection,
        #[arg(long, default_value_t = 0)]
        page: u64,
        #[arg(long = "page-size", default_value_t = 0)]
        page_size: u64,
    },
}

pub fn report_command(config: &Config, command: &ReportCommand) -> ReqprofResult<serde_json::Value> {
    let db = super::open_db(config)?;
    match command {
        ReportCommand::Grouped {
            group_by,
            filters,
            threshold,
            sort,
            direction,
            page,
            page_size,
        } => {
            let query = GroupedQuery {
                filters: parse_filters(filters)?,
                group_by: *group_by,
                threshold: *threshold,
                sort: *sort,
                direction: *direction,
                page: *page,
                page_size: *page_size,
            };
            let (rows, total) = query.execute(&db)?;
            Ok(serde_json::json!({
                "schemaVersion": "reqprof.report_grouped.v1",
                "groupBy": group_by,
                "page": page,
                "pageSize": page_size,
                "totalRequests": total,
                "rows": rows,
            }))
        }
        ReportCommand::Samples {
            filters,
            sort,
            direction,
            page,
            page_size,
        } => {
            let query = SampleQuery {
                filters: parse_filters(filters)?,
                sort: *sort,
                direction: *direction,
                page: *page,
                page_size: *page_size,
            };
            let (rows, total) = query.execute(&db)?;
            Ok(serde_json::json!({
                "schemaVersion": "reqprof.report_samples.v1",
                "page": page,
                "pageSize": page_size,
                "totalSamples": total,
                "rows": rows,
            }))
        }
    }
}

/// Parse repeated `field=value` CLI predicates into a validated filter set.
fn parse_filters(raw: &[String]) -> ReqprofResult<FilterSet> {
    let mut filters = FilterSet::new();
    for entry in raw {
        let (field, value) = entry.split_once('=').ok_or_else(|| {
            ReqprofError::InvalidArgument(format!(
                "filter {entry:?} must use the form field=value"
            ))
        })?;
        filters.add(field.trim(), value)?;
    }
    Ok(filters)
}
