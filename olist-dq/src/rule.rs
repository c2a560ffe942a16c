//! Data-quality rules and the predicates they are built from.
//!
//! A [`DqRule`] is a named, categorized measurement compiled to one SQL
//! query. Predicates render to SQLite boolean expressions, so every rule can
//! be inspected (`DqRule::sql`) and tested on its own.

use crate::timeliness::LeadTimeDistribution;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Quality dimension a rule belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Completeness,
    Uniqueness,
    Validity,
    Consistency,
    Timeliness,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Completeness,
        Category::Uniqueness,
        Category::Validity,
        Category::Consistency,
        Category::Timeliness,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Completeness => "completeness",
            Category::Uniqueness => "uniqueness",
            Category::Validity => "validity",
            Category::Consistency => "consistency",
            Category::Timeliness => "timeliness",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value produced by one rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MetricValue {
    /// Percentage in `[0, 100]`, rounded to 2 decimals.
    Percent(f64),
    /// Non-negative duplicate count.
    Count(i64),
    Distribution(LeadTimeDistribution),
    /// Empty input or a failed evaluation.
    Undefined,
}

impl MetricValue {
    /// Scalar view used for tables and charts.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Percent(p) => Some(*p),
            MetricValue::Count(c) => Some(*c as f64),
            MetricValue::Distribution(d) => Some(d.summary.median),
            MetricValue::Undefined => None,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, MetricValue::Undefined)
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Percent(p) => write!(f, "{p:.2}%"),
            MetricValue::Count(c) => write!(f, "{c}"),
            MetricValue::Distribution(d) => write!(
                f,
                "n={} min={} max={} mean={:.2} median={:.1}",
                d.summary.count, d.summary.min, d.summary.max, d.summary.mean, d.summary.median
            ),
            MetricValue::Undefined => f.write_str("undefined"),
        }
    }
}

/// One named rule outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleResult {
    pub category: Category,
    pub name: String,
    pub value: MetricValue,
}

/// Row-level boolean condition, rendered as a SQLite expression.
///
/// Column operands are trusted SQL expressions from the rule catalog;
/// literal values are quoted.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    NotNull(String),
    /// Parses as an SQLite date or timestamp.
    IsDate(String),
    GreaterThan { column: String, bound: f64 },
    AtLeast { column: String, bound: f64 },
    InSet { column: String, values: Vec<String> },
    Equals { column: String, value: String },
    /// Every column is null or strictly positive.
    PositiveOrNull(Vec<String>),
    /// Passes when `when` does not hold.
    Implies {
        when: Box<Predicate>,
        then: Box<Predicate>,
    },
    /// `later` is on or after `earlier`, compared as instants.
    NotBefore { later: String, earlier: String },
    WithinTolerance {
        left: String,
        right: String,
        tolerance: f64,
    },
    And(Vec<Predicate>),
}

impl Predicate {
    pub fn not_null(column: impl Into<String>) -> Self {
        Self::NotNull(column.into())
    }

    pub fn is_date(column: impl Into<String>) -> Self {
        Self::IsDate(column.into())
    }

    pub fn greater_than(column: impl Into<String>, bound: f64) -> Self {
        Self::GreaterThan {
            column: column.into(),
            bound,
        }
    }

    pub fn at_least(column: impl Into<String>, bound: f64) -> Self {
        Self::AtLeast {
            column: column.into(),
            bound,
        }
    }

    pub fn in_set<S: AsRef<str>>(column: impl Into<String>, values: &[S]) -> Self {
        Self::InSet {
            column: column.into(),
            values: values.iter().map(|v| v.as_ref().to_string()).collect(),
        }
    }

    pub fn equals(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Equals {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn implies(when: Predicate, then: Predicate) -> Self {
        Self::Implies {
            when: Box::new(when),
            then: Box::new(then),
        }
    }

    pub fn not_before(later: impl Into<String>, earlier: impl Into<String>) -> Self {
        Self::NotBefore {
            later: later.into(),
            earlier: earlier.into(),
        }
    }

    /// Render as a SQLite expression. Null operands make the expression
    /// null, which counts as failing everywhere except an `Implies` antecedent.
    pub fn to_sql(&self) -> String {
        match self {
            Predicate::NotNull(c) => format!("{c} IS NOT NULL"),
            Predicate::IsDate(c) => format!("date({c}) IS NOT NULL"),
            Predicate::GreaterThan { column, bound } => format!("{column} > {bound:?}"),
            Predicate::AtLeast { column, bound } => format!("{column} >= {bound:?}"),
            Predicate::InSet { column, values } => {
                let list = values.iter().map(|v| quote(v)).collect::<Vec<_>>();
                format!("{column} IN ({})", list.join(", "))
            }
            Predicate::Equals { column, value } => format!("{column} = {}", quote(value)),
            Predicate::PositiveOrNull(columns) => columns
                .iter()
                .map(|c| format!("COALESCE({c}, 1) > 0"))
                .collect::<Vec<_>>()
                .join(" AND "),
            Predicate::Implies { when, then } => format!(
                "CASE WHEN {} THEN ({}) ELSE 1 END",
                when.to_sql(),
                then.to_sql()
            ),
            Predicate::NotBefore { later, earlier } => {
                format!("julianday({later}) >= julianday({earlier})")
            }
            Predicate::WithinTolerance {
                left,
                right,
                tolerance,
            } => format!("abs({left} - {right}) <= {tolerance:?}"),
            Predicate::And(parts) => parts
                .iter()
                .map(|p| format!("({})", p.to_sql()))
                .collect::<Vec<_>>()
                .join(" AND "),
        }
    }
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Rows a rule scans: a FROM clause plus an optional filter.
#[derive(Debug, Clone, PartialEq)]
pub struct RowSet {
    pub from: String,
    pub filter: Option<Predicate>,
}

impl RowSet {
    pub fn table(from: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            filter: None,
        }
    }

    pub fn filtered(mut self, filter: Predicate) -> Self {
        self.filter = Some(filter);
        self
    }

    fn to_sql(&self) -> String {
        match &self.filter {
            Some(p) => format!("FROM {} WHERE {}", self.from, p.to_sql()),
            None => format!("FROM {}", self.from),
        }
    }
}

/// Shape of a rule's measurement.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleKind {
    /// Percentage of rows in `rows` satisfying `predicate`.
    Fraction { rows: RowSet, predicate: Predicate },
    /// Total rows minus distinct non-null key tuples.
    Duplicates { table: String, key: Vec<String> },
    /// Whole days from `start` to `end`, over rows where both dates parse.
    LeadTime {
        table: String,
        start: String,
        end: String,
        bins: usize,
    },
}

/// A named, categorized quality rule.
#[derive(Debug, Clone, PartialEq)]
pub struct DqRule {
    pub category: Category,
    pub name: String,
    pub kind: RuleKind,
}

impl DqRule {
    pub fn new(category: Category, name: impl Into<String>, kind: RuleKind) -> Self {
        Self {
            category,
            name: name.into(),
            kind,
        }
    }

    /// Compile the rule to its single SQL query.
    pub fn sql(&self) -> String {
        match &self.kind {
            RuleKind::Fraction { rows, predicate } => format!(
                "SELECT COALESCE(SUM(CASE WHEN {} THEN 1 ELSE 0 END), 0), COUNT(*) {}",
                predicate.to_sql(),
                rows.to_sql()
            ),
            RuleKind::Duplicates { table, key } => {
                let cols = key.join(", ");
                let present = key
                    .iter()
                    .map(|c| format!("{c} IS NOT NULL"))
                    .collect::<Vec<_>>()
                    .join(" AND ");
                format!(
                    "SELECT COUNT(*) - (SELECT COUNT(*) FROM (SELECT DISTINCT {cols} FROM {table} WHERE {present})) FROM {table}"
                )
            }
            RuleKind::LeadTime {
                table, start, end, ..
            } => format!(
                "SELECT CAST(julianday(date({end})) - julianday(date({start})) AS INTEGER) \
                 FROM {table} WHERE date({end}) IS NOT NULL AND date({start}) IS NOT NULL \
                 ORDER BY rowid"
            ),
        }
    }

    /// Evaluate against a connection, degrading any failure to `Undefined`.
    pub fn evaluate(&self, conn: &Connection) -> RuleResult {
        let value = match self.try_evaluate(conn) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(
                    category = %self.category,
                    rule = %self.name,
                    error = %e,
                    "Rule evaluation failed"
                );
                MetricValue::Undefined
            }
        };
        self.result(value)
    }

    pub(crate) fn result(&self, value: MetricValue) -> RuleResult {
        RuleResult {
            category: self.category,
            name: self.name.clone(),
            value,
        }
    }

    fn try_evaluate(&self, conn: &Connection) -> rusqlite::Result<MetricValue> {
        let sql = self.sql();
        match &self.kind {
            RuleKind::Fraction { .. } => {
                let (passing, total): (i64, i64) =
                    conn.query_row(&sql, [], |r| Ok((r.get(0)?, r.get(1)?)))?;
                Ok(fraction(passing, total))
            }
            RuleKind::Duplicates { .. } => {
                let duplicates: i64 = conn.query_row(&sql, [], |r| r.get(0))?;
                Ok(MetricValue::Count(duplicates))
            }
            RuleKind::LeadTime { bins, .. } => {
                let mut stmt = conn.prepare(&sql)?;
                let lead_times = stmt
                    .query_map([], |r| r.get::<_, i64>(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(LeadTimeDistribution::from_lead_times(lead_times, *bins)
                    .map_or(MetricValue::Undefined, MetricValue::Distribution))
            }
        }
    }
}

/// `100 * passing / total`, rounded to 2 decimals; undefined for no rows.
pub fn fraction(passing: i64, total: i64) -> MetricValue {
    if total <= 0 {
        return MetricValue::Undefined;
    }
    MetricValue::Percent(round2(100.0 * passing as f64 / total as f64))
}

/// Round half away from zero to 2 decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
