//! Declarative filter/group-by report queries over the sample store.
//!
//! Callers describe a report as data (filters, one group-by dimension, an
//! optional lock-held threshold, sort and pagination) and the builder
//! translates it to parameterized SQL. Identifiers only ever come from the
//! closed allow-lists below; filter values and thresholds are always bound
//! as parameters, never interpolated.

use rusqlite::types::Value as SqlValue;
use serde::Serialize;

use std::collections::BTreeMap;

use crate::{ProfileDb, ReqprofError, ReqprofResult};

/// Allow-listed sample dimensions usable as filters or the group-by key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Request,
    ScriptGroup,
    ScriptType,
    Reason,
    ResponseCode,
    UserId,
    CourseId,
}

impl Dimension {
    pub fn parse(name: &str) -> ReqprofResult<Self> {
        match name {
            "request" => Ok(Self::Request),
            "scriptgroup" => Ok(Self::ScriptGroup),
            "scripttype" => Ok(Self::ScriptType),
            "reason" => Ok(Self::Reason),
            "responsecode" => Ok(Self::ResponseCode),
            "userid" => Ok(Self::UserId),
            "courseid" => Ok(Self::CourseId),
            other => Err(ReqprofError::InvalidArgument(format!(
                "unknown report field {other:?} (expected one of: request, scriptgroup, \
                 scripttype, reason, responsecode, userid, courseid)"
            ))),
        }
    }

    fn column(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::ScriptGroup => "scriptgroup",
            Self::ScriptType => "scripttype",
            Self::Reason => "reason",
            Self::ResponseCode => "responsecode",
            Self::UserId => "userid",
            Self::CourseId => "courseid",
        }
    }
}

impl clap::ValueEnum for Dimension {
    fn value_variants<'a>() -> &'a [Self] {
        &[
            Self::Request,
            Self::ScriptGroup,
            Self::ScriptType,
            Self::Reason,
            Self::ResponseCode,
            Self::UserId,
            Self::CourseId,
        ]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(clap::builder::PossibleValue::new(self.column()))
    }
}

/// Filter predicates: ANDed across fields, ORed within a field's values.
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    entries: BTreeMap<Dimension, Vec<String>>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a `field = value` predicate, validating the field name against
    /// the dimension allow-list before anything reaches the store.
    pub fn add(&mut self, field: &str, value: impl Into<String>) -> ReqprofResult<()> {
        self.add_dimension(Dimension::parse(field)?, value);
        Ok(())
    }

    pub fn add_dimension(&mut self, dimension: Dimension, value: impl Into<String>) {
        self.entries.entry(dimension).or_default().push(value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// WHERE clause text plus its bound values. An empty set matches all
    /// samples.
    fn where_clause(&self) -> (String, Vec<SqlValue>) {
        if self.entries.is_empty() {
            return ("1 = 1".to_string(), Vec::new());
        }

        let mut clauses = Vec::with_capacity(self.entries.len());
        let mut params = Vec::new();
        for (dimension, values) in &self.entries {
            let placeholders = vec!["?"; values.len()].join(", ");
            clauses.push(format!("{} IN ({placeholders})", dimension.column()));
            params.extend(values.iter().map(|v| SqlValue::Text(v.clone())));
        }
        (clauses.join(" AND "), params)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    fn keyword(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl clap::ValueEnum for SortDirection {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Asc, Self::Desc]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(match self {
            Self::Asc => clap::builder::PossibleValue::new("asc"),
            Self::Desc => clap::builder::PossibleValue::new("desc"),
        })
    }
}

/// Output columns of the grouped report, usable as the sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupSortColumn {
    GroupKey,
    RequestCount,
    MinDuration,
    MaxDuration,
    MinLockHeld,
    MaxLockHeld,
    MinCreated,
    MaxCreated,
}

impl GroupSortColumn {
    fn column(self) -> &'static str {
        match self {
            Self::GroupKey => "group_key",
            Self::RequestCount => "request_count",
            Self::MinDuration => "min_duration",
            Self::MaxDuration => "max_duration",
            Self::MinLockHeld => "min_lockheld",
            Self::MaxLockHeld => "max_lockheld",
            Self::MinCreated => "min_created",
            Self::MaxCreated => "max_created",
        }
    }
}

impl clap::ValueEnum for GroupSortColumn {
    fn value_variants<'a>() -> &'a [Self] {
        &[
            Self::GroupKey,
            Self::RequestCount,
            Self::MinDuration,
            Self::MaxDuration,
            Self::MinLockHeld,
            Self::MaxLockHeld,
            Self::MinCreated,
            Self::MaxCreated,
        ]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(clap::builder::PossibleValue::new(match self {
            Self::GroupKey => "group_key",
            Self::RequestCount => "request_count",
            Self::MinDuration => "min_duration",
            Self::MaxDuration => "max_duration",
            Self::MinLockHeld => "min_lockheld",
            Self::MaxLockHeld => "max_lockheld",
            Self::MinCreated => "min_created",
            Self::MaxCreated => "max_created",
        }))
    }
}

/// One grouped report row: the group key plus aggregate statistics.
#[derive(Debug, Clone, Serialize)]
pub struct GroupedStatsRow {
    pub group_key: String,
    pub request_count: u64,
    pub min_duration: i64,
    pub max_duration: i64,
    pub min_lockheld: Option<i64>,
    pub max_lockheld: Option<i64>,
    pub min_created: i64,
    pub max_created: i64,
}

/// A grouped aggregate report request.
///
/// `threshold` keeps only groups whose maximum lock-held time exceeds it,
/// applied after grouping; zero or unset disables it. Samples with a NULL
/// group-by value are never reported. Pagination is offset-based over the
/// grouped rows with the group key as a stable tiebreaker; `page_size` 0
/// means unbounded.
#[derive(Debug, Clone)]
pub struct GroupedQuery {
    pub filters: FilterSet,
    pub group_by: Dimension,
    pub threshold: Option<i64>,
    pub sort: GroupSortColumn,
    pub direction: SortDirection,
    pub page: u64,
    pub page_size: u64,
}

impl GroupedQuery {
    pub fn new(group_by: Dimension) -> Self {
        Self {
            filters: FilterSet::new(),
            group_by,
            threshold: None,
            sort: GroupSortColumn::MaxLockHeld,
            direction: SortDirection::Desc,
            page: 0,
            page_size: 0,
        }
    }

    /// Run the query, returning the page of grouped rows plus the total
    /// number of distinct requests matching the filters. The total is
    /// independent of the group-by choice: it reports how many underlying
    /// requests matched, not how many groups.
    pub fn execute(&self, db: &ProfileDb) -> ReqprofResult<(Vec<GroupedStatsRow>, u64)> {
        let (filter_sql, filter_params) = self.filters.where_clause();

        let total: i64 = db.conn.query_row(
            &format!("SELECT COUNT(DISTINCT request) FROM profile_samples WHERE {filter_sql}"),
            rusqlite::params_from_iter(filter_params.iter()),
            |row| row.get(0),
        )?;

        let group_col = self.group_by.column();
        let mut params = filter_params;
        let mut sql = format!(
            "SELECT {group_col} AS group_key,
                    COUNT(request) AS request_count,
                    MIN(duration) AS min_duration,
                    MAX(duration) AS max_duration,
                    MIN(lockheld) AS min_lockheld,
                    MAX(lockheld) AS max_lockheld,
                    MIN(created) AS min_created,
                    MAX(created) AS max_created
               FROM profile_samples
              WHERE {filter_sql} AND {group_col} IS NOT NULL
              GROUP BY {group_col}"
        );
        if let Some(threshold) = self.threshold
            && threshold > 0
        {
            sql.push_str(" HAVING MAX(lockheld) > ?");
            params.push(SqlValue::Integer(threshold));
        }
        sql.push_str(&format!(
            " ORDER BY {} {}",
            self.sort.column(),
            self.direction.keyword()
        ));
        if self.sort != GroupSortColumn::GroupKey {
            sql.push_str(", group_key ASC");
        }
        sql.push_str(" LIMIT ? OFFSET ?");
        params.push(SqlValue::Integer(limit_for(self.page_size)));
        params.push(SqlValue::Integer((self.page * self.page_size) as i64));

        let mut stmt = db.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(params.iter()), |row| {
                Ok(GroupedStatsRow {
                    group_key: key_to_string(row.get::<_, SqlValue>(0)?),
                    request_count: row.get::<_, i64>(1)?.max(0) as u64,
                    min_duration: row.get(2)?,
                    max_duration: row.get(3)?,
                    min_lockheld: row.get(4)?,
                    max_lockheld: row.get(5)?,
                    min_created: row.get(6)?,
                    max_created: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((rows, total.max(0) as u64))
    }
}

/// Sortable columns of the per-request detail report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleSortColumn {
    Request,
    ResponseCode,
    Duration,
    LockHeld,
    LockWait,
    Created,
}

impl SampleSortColumn {
    fn column(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::ResponseCode => "responsecode",
            Self::Duration => "duration",
            Self::LockHeld => "lockheld",
            Self::LockWait => "lockwait",
            Self::Created => "created",
        }
    }
}

impl clap::ValueEnum for SampleSortColumn {
    fn value_variants<'a>() -> &'a [Self] {
        &[
            Self::Request,
            Self::ResponseCode,
            Self::Duration,
            Self::LockHeld,
            Self::LockWait,
            Self::Created,
        ]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(clap::builder::PossibleValue::new(self.column()))
    }
}

/// One per-request detail row.
#[derive(Debug, Clone, Serialize)]
pub struct SampleRow {
    pub id: i64,
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

/// A per-request detail report: filtered, sorted, paginated sample rows.
/// The row id is the stable pagination tiebreaker; `page_size` 0 means
/// unbounded.
#[derive(Debug, Clone)]
pub struct SampleQuery {
    pub filters: FilterSet,
    pub sort: SampleSortColumn,
    pub direction: SortDirection,
    pub page: u64,
    pub page_size: u64,
}

impl SampleQuery {
    pub fn new() -> Self {
        Self {
            filters: FilterSet::new(),
            sort: SampleSortColumn::LockHeld,
            direction: SortDirection::Desc,
            page: 0,
            page_size: 0,
        }
    }

    pub fn execute(&self, db: &ProfileDb) -> ReqprofResult<(Vec<SampleRow>, u64)> {
        let (filter_sql, filter_params) = self.filters.where_clause();

        let total: i64 = db.conn.query_row(
            &format!("SELECT COUNT(*) FROM profile_samples WHERE {filter_sql}"),
            rusqlite::params_from_iter(filter_params.iter()),
            |row| row.get(0),
        )?;

        let mut params = filter_params;
        let sql = format!(
            "SELECT id, request, scriptgroup, scripttype, reason, responsecode, userid,
                    courseid, duration, lockheld, lockwait, created
               FROM profile_samples
              WHERE {filter_sql}
              ORDER BY {} {}, id ASC
              LIMIT ? OFFSET ?",
            self.sort.column(),
            self.direction.keyword()
        );
        params.push(SqlValue::Integer(limit_for(self.page_size)));
        params.push(SqlValue::Integer((self.page * self.page_size) as i64));

        let mut stmt = db.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(params.iter()), |row| {
                Ok(SampleRow {
                    id: row.get(0)?,
                    request: row.get(1)?,
                    scriptgroup: row.get(2)?,
                    scripttype: row.get(3)?,
                    reason: row.get(4)?,
                    responsecode: row.get(5)?,
                    userid: row.get(6)?,
                    courseid: row.get(7)?,
                    duration: row.get(8)?,
                    lockheld: row.get(9)?,
                    lockwait: row.get(10)?,
                    created: row.get(11)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((rows, total.max(0) as u64))
    }
}

impl Default for SampleQuery {
    fn default() -> Self {
        Self::new()
    }
}

fn limit_for(page_size: u64) -> i64 {
    if page_size == 0 {
        -1
    } else {
        page_size as i64
    }
}

fn key_to_string(value: SqlValue) -> String {
    match value {
        SqlValue::Text(s) => s,
        SqlValue::Integer(i) => i.to_string(),
        SqlValue::Real(f) => f.to_string(),
        SqlValue::Blob(_) | SqlValue::Null => String::new(),
    }
}
