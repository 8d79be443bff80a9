//! Parameterized statements against the backing tables.
//!
//! Every statement carries its SQL text, the positional arguments bound to
//! its `?` placeholders, and a [`Plan`] describing the same query in
//! structured form. Values are never interpolated into the SQL; only the
//! configured table names are.
//!
//! The trace search is composed by [`PREDICATE_BUILDERS`], applied in a fixed
//! order. The index table is sorted by `(service, timestamp)`, so the search
//! always ends with `ORDER BY service DESC, timestamp DESC LIMIT ?`, which
//! lets the store stop scanning once the limit is met.

use crate::models::{TraceId, TraceQueryParameters};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Timestamp format bound to `toDateTime64(?, 6, 'UTC')`.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Suffix of every trace search.
const SEARCH_SUFFIX: &str = " ORDER BY service DESC, timestamp DESC LIMIT ?";

/// A positional argument bound to a `?` placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlArg {
    /// A string value.
    String(String),
    /// A signed integer value.
    Int(i64),
    /// An unsigned integer value.
    UInt(u64),
}

/// One filter clause of a trace search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// `service = ?`
    Service(String),
    /// `operation = ?`
    Operation(String),
    /// `timestamp >= ?`
    StartTimeMin(DateTime<Utc>),
    /// `timestamp <= ?`
    StartTimeMax(DateTime<Utc>),
    /// `durationUs >= ?`
    DurationMin(i64),
    /// `durationUs <= ?`
    DurationMax(i64),
    /// `has(tags, ?)` with a `key=value` entry.
    Tag(String),
}

impl Predicate {
    /// Returns the SQL clause, with one `?` placeholder.
    #[must_use]
    pub fn clause(&self) -> &'static str {
        match self {
            Self::Service(_) => "service = ?",
            Self::Operation(_) => "operation = ?",
            Self::StartTimeMin(_) => "timestamp >= toDateTime64(?, 6, 'UTC')",
            Self::StartTimeMax(_) => "timestamp <= toDateTime64(?, 6, 'UTC')",
            Self::DurationMin(_) => "durationUs >= ?",
            Self::DurationMax(_) => "durationUs <= ?",
            Self::Tag(_) => "has(tags, ?)",
        }
    }

    /// Returns the argument bound to the clause's placeholder.
    #[must_use]
    pub fn arg(&self) -> SqlArg {
        match self {
            Self::Service(v) | Self::Operation(v) | Self::Tag(v) => SqlArg::String(v.clone()),
            Self::StartTimeMin(t) | Self::StartTimeMax(t) => {
                SqlArg::String(t.format(TIMESTAMP_FORMAT).to_string())
            }
            Self::DurationMin(us) | Self::DurationMax(us) => SqlArg::Int(*us),
        }
    }
}

/// Appends the predicates one parameter contributes.
pub type PredicateBuilder = fn(&TraceQueryParameters, &mut Vec<Predicate>);

/// The trace search predicates, in the order they appear in the statement.
pub const PREDICATE_BUILDERS: [PredicateBuilder; 7] = [
    service_predicate,
    operation_predicate,
    start_time_min_predicate,
    start_time_max_predicate,
    duration_min_predicate,
    duration_max_predicate,
    tag_predicates,
];

fn service_predicate(params: &TraceQueryParameters, predicates: &mut Vec<Predicate>) {
    predicates.push(Predicate::Service(params.service_name.clone()));
}

fn operation_predicate(params: &TraceQueryParameters, predicates: &mut Vec<Predicate>) {
    if let Some(operation) = params.operation_name.as_deref().filter(|op| !op.is_empty()) {
        predicates.push(Predicate::Operation(operation.to_string()));
    }
}

fn start_time_min_predicate(params: &TraceQueryParameters, predicates: &mut Vec<Predicate>) {
    if let Some(start) = params.start_time_min {
        predicates.push(Predicate::StartTimeMin(start));
    }
}

fn start_time_max_predicate(params: &TraceQueryParameters, predicates: &mut Vec<Predicate>) {
    if let Some(end) = params.start_time_max {
        predicates.push(Predicate::StartTimeMax(end));
    }
}

fn micros(duration: Duration) -> i64 {
    i64::try_from(duration.as_micros()).unwrap_or(i64::MAX)
}

fn duration_min_predicate(params: &TraceQueryParameters, predicates: &mut Vec<Predicate>) {
    if let Some(min) = params.duration_min.filter(|d| !d.is_zero()) {
        predicates.push(Predicate::DurationMin(micros(min)));
    }
}

fn duration_max_predicate(params: &TraceQueryParameters, predicates: &mut Vec<Predicate>) {
    if let Some(max) = params.duration_max.filter(|d| !d.is_zero()) {
        predicates.push(Predicate::DurationMax(micros(max)));
    }
}

// Tags are matched as flat `key=value` strings, so a value containing `=`
// can collide with a different key/value split.
fn tag_predicates(params: &TraceQueryParameters, predicates: &mut Vec<Predicate>) {
    predicates.extend(
        params
            .tags
            .iter()
            .map(|(key, value)| Predicate::Tag(format!("{key}={value}"))),
    );
}

/// Structured description of what a statement reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    /// Distinct trace IDs from the index table matching all predicates.
    FindTraceIds {
        /// Index table name.
        table: String,
        /// Filters in statement order.
        predicates: Vec<Predicate>,
        /// Maximum number of trace IDs.
        limit: u32,
    },
    /// Span payloads from the span table for a set of trace IDs.
    FetchSpans {
        /// Span table name.
        table: String,
        /// Requested trace IDs in their stored string form.
        trace_ids: Vec<String>,
    },
    /// Distinct services from the operations table.
    Services {
        /// Operations table name.
        table: String,
    },
    /// Distinct operations of one service from the operations table.
    Operations {
        /// Operations table name.
        table: String,
        /// The service to list.
        service: String,
    },
}

/// A parameterized `SELECT` with its bound arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    sql: String,
    args: Vec<SqlArg>,
    plan: Plan,
}

impl Statement {
    /// Builds the trace ID search over the index table.
    ///
    /// # Example
    ///
    /// ```
    /// use shared::models::TraceQueryParameters;
    /// use shared::storage::{SqlArg, Statement};
    ///
    /// let statement = Statement::find_trace_ids(
    ///     "jaeger_index_local",
    ///     &TraceQueryParameters::new("api").with_operation("GET /"),
    /// );
    ///
    /// assert_eq!(
    ///     statement.sql(),
    ///     "SELECT DISTINCT traceID FROM jaeger_index_local WHERE service = ? \
    ///      AND operation = ? ORDER BY service DESC, timestamp DESC LIMIT ?"
    /// );
    /// assert_eq!(statement.args().len(), 3);
    /// assert_eq!(statement.args()[2], SqlArg::UInt(20));
    /// ```
    #[must_use]
    pub fn find_trace_ids(table: &str, params: &TraceQueryParameters) -> Self {
        let mut predicates = Vec::new();
        for build in PREDICATE_BUILDERS {
            build(params, &mut predicates);
        }

        let clauses: Vec<&str> = predicates.iter().map(Predicate::clause).collect();
        let sql = format!(
            "SELECT DISTINCT traceID FROM {table} WHERE {}{SEARCH_SUFFIX}",
            clauses.join(" AND ")
        );

        let mut args: Vec<SqlArg> = predicates.iter().map(Predicate::arg).collect();
        args.push(SqlArg::UInt(u64::from(params.num_traces)));

        Self {
            sql,
            args,
            plan: Plan::FindTraceIds {
                table: table.to_string(),
                predicates,
                limit: params.num_traces,
            },
        }
    }

    /// Builds the batch payload fetch with one placeholder per trace ID.
    ///
    /// `trace_ids` must not be empty.
    #[must_use]
    pub fn fetch_spans(table: &str, trace_ids: &[TraceId]) -> Self {
        let trace_ids: Vec<String> = trace_ids.iter().map(ToString::to_string).collect();
        let placeholders = vec!["?"; trace_ids.len()].join(", ");

        Self {
            sql: format!("SELECT model FROM {table} WHERE traceID IN ({placeholders})"),
            args: trace_ids.iter().cloned().map(SqlArg::String).collect(),
            plan: Plan::FetchSpans {
                table: table.to_string(),
                trace_ids,
            },
        }
    }

    /// Builds the distinct service listing.
    #[must_use]
    pub fn services(table: &str) -> Self {
        Self {
            sql: format!("SELECT service FROM {table} GROUP BY service"),
            args: Vec::new(),
            plan: Plan::Services {
                table: table.to_string(),
            },
        }
    }

    /// Builds the distinct operation listing for one service.
    #[must_use]
    pub fn operations(table: &str, service: &str) -> Self {
        Self {
            sql: format!("SELECT operation FROM {table} WHERE service = ? GROUP BY operation"),
            args: vec![SqlArg::String(service.to_string())],
            plan: Plan::Operations {
                table: table.to_string(),
                service: service.to_string(),
            },
        }
    }

    /// Returns the SQL text.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Returns the positional arguments.
    #[must_use]
    pub fn args(&self) -> &[SqlArg] {
        &self.args
    }

    /// Returns the structured plan.
    #[must_use]
    pub fn plan(&self) -> &Plan {
        &self.plan
    }
}
