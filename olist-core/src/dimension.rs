//! Dimension resolver: upserts natural-key entities into surrogate-keyed
//! dimension tables.
//!
//! Staging rows are read in input order and collapsed to one candidate per
//! natural key (per column, the last non-null value seen wins). Candidates
//! are then merged into the warehouse with [`MergePolicy::FillGaps`]: a newer
//! non-null value replaces the stored one, and a later null never erases a
//! known attribute. Surrogate keys are
//! assigned by the table on first insert and never change afterwards.

use crate::error::Result;
use crate::store::row_count;
use crate::upsert::{MergePolicy, UpsertStatement};
use chrono::{Datelike, NaiveDate};
use rusqlite::types::Value;
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Declarative description of a natural-key dimension.
#[derive(Debug, Clone, Copy)]
pub struct DimensionSpec {
    pub name: &'static str,
    pub table: &'static str,
    pub natural_key: &'static str,
    /// Warehouse columns, natural key first.
    pub columns: &'static [&'static str],
    /// Query yielding `columns` from staging, ordered by input position.
    pub source: &'static str,
}

impl DimensionSpec {
    pub fn upsert(&self) -> UpsertStatement<'_> {
        UpsertStatement {
            table: self.table,
            columns: self.columns,
            conflict_target: std::slice::from_ref(&self.natural_key),
            policy: MergePolicy::FillGaps,
        }
    }
}

pub const CUSTOMER: DimensionSpec = DimensionSpec {
    name: "customer",
    table: "dw_dim_customer",
    natural_key: "customer_id",
    columns: &["customer_id", "customer_unique_id", "zip_prefix", "city", "state"],
    source: "SELECT customer_id, customer_unique_id, customer_zip_code_prefix, customer_city, customer_state
             FROM stg_raw_customers
             ORDER BY rowid",
};

pub const SELLER: DimensionSpec = DimensionSpec {
    name: "seller",
    table: "dw_dim_seller",
    natural_key: "seller_id",
    columns: &["seller_id", "zip_prefix", "city", "state"],
    source: "SELECT seller_id, seller_zip_code_prefix, seller_city, seller_state
             FROM stg_raw_sellers
             ORDER BY rowid",
};

pub const PRODUCT: DimensionSpec = DimensionSpec {
    name: "product",
    table: "dw_dim_product",
    natural_key: "product_id",
    columns: &[
        "product_id",
        "category_name",
        "category_name_en",
        "weight_g",
        "length_cm",
        "height_cm",
        "width_cm",
    ],
    source: "SELECT p.product_id, p.product_category_name, t.product_category_name_english,
                    p.product_weight_g, p.product_length_cm, p.product_height_cm, p.product_width_cm
             FROM stg_raw_products p
             LEFT JOIN stg_raw_category_translation t
               ON t.product_category_name = p.product_category_name
             ORDER BY p.rowid, t.rowid",
};

/// Natural-key dimensions, resolved after the date dimension.
pub const DIMENSIONS: &[DimensionSpec] = &[CUSTOMER, SELLER, PRODUCT];

/// Every staging timestamp that can be referenced by a fact or a report.
pub const DATE_SOURCE: &str = "
SELECT d FROM (
    SELECT date(order_purchase_timestamp) AS d FROM stg_raw_orders
    UNION SELECT date(order_approved_at) FROM stg_raw_orders
    UNION SELECT date(order_delivered_customer_date) FROM stg_raw_orders
    UNION SELECT date(order_estimated_delivery_date) FROM stg_raw_orders
    UNION SELECT date(shipping_limit_date) FROM stg_raw_order_items
    UNION SELECT date(review_creation_date) FROM stg_raw_reviews
    UNION SELECT date(review_answer_timestamp) FROM stg_raw_reviews
)
WHERE d IS NOT NULL
ORDER BY d";

/// Outcome of resolving one dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionStats {
    pub dimension: String,
    pub source_rows: usize,
    pub distinct_keys: usize,
    pub skipped_null_keys: usize,
    /// Natural keys seen for the first time in this run.
    pub inserted: usize,
}

/// Staging rows collapsed to one candidate per natural key.
///
/// The natural key is the first value of each row. Keys keep their first-seen
/// order; within a key, each column takes the last non-null value seen.
#[derive(Debug, Default)]
pub struct CandidateSet {
    index: HashMap<String, usize>,
    rows: Vec<Vec<Value>>,
    source_rows: usize,
    skipped_null_keys: usize,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: Vec<Value>) {
        self.source_rows += 1;
        let Some(key) = row.first().and_then(key_text) else {
            self.skipped_null_keys += 1;
            return;
        };
        match self.index.get(&key) {
            Some(&pos) => {
                for (slot, incoming) in self.rows[pos].iter_mut().zip(row) {
                    if incoming != Value::Null {
                        *slot = incoming;
                    }
                }
            }
            None => {
                self.index.insert(key, self.rows.len());
                self.rows.push(row);
            }
        }
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn skipped_null_keys(&self) -> usize {
        self.skipped_null_keys
    }
}

fn key_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Text(s) if s.is_empty() => None,
        Value::Text(s) => Some(s.clone()),
        Value::Integer(i) => Some(i.to_string()),
        Value::Real(f) => Some(f.to_string()),
        Value::Blob(b) => Some(String::from_utf8_lossy(b).into_owned()),
    }
}

fn collect_candidates(conn: &Connection, spec: &DimensionSpec) -> Result<CandidateSet> {
    let mut stmt = conn.prepare(spec.source)?;
    let width = spec.columns.len();
    let mut rows = stmt.query([])?;
    let mut candidates = CandidateSet::new();
    while let Some(row) = rows.next()? {
        let values = (0..width)
            .map(|i| row.get::<_, Value>(i))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        candidates.push(values);
    }
    Ok(candidates)
}

/// Upsert one natural-key dimension from the current staging snapshot.
///
/// Runs in its own transaction: either every candidate is merged or none is.
pub fn resolve_dimension(conn: &mut Connection, spec: &DimensionSpec) -> Result<DimensionStats> {
    let tx = conn.transaction()?;
    let candidates = collect_candidates(&tx, spec)?;
    let before = row_count(&tx, spec.table)?;
    {
        let mut stmt = tx.prepare(&spec.upsert().values_sql())?;
        for row in candidates.rows() {
            stmt.execute(rusqlite::params_from_iter(row.iter()))?;
        }
    }
    let after = row_count(&tx, spec.table)?;
    tx.commit()?;

    if candidates.skipped_null_keys() > 0 {
        tracing::warn!(
            dimension = spec.name,
            skipped = candidates.skipped_null_keys(),
            "Staging rows without natural key skipped"
        );
    }
    let stats = DimensionStats {
        dimension: spec.name.to_string(),
        source_rows: candidates.source_rows,
        distinct_keys: candidates.len(),
        skipped_null_keys: candidates.skipped_null_keys(),
        inserted: usize::try_from(after - before).unwrap_or_default(),
    };
    tracing::info!(
        dimension = spec.name,
        keys = stats.distinct_keys,
        inserted = stats.inserted,
        "Dimension resolved"
    );
    Ok(stats)
}

/// Calendar attributes of a date-dimension row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRow {
    pub date_id: String,
    pub year: i32,
    pub quarter: u32,
    pub month: u32,
    pub day: u32,
    /// ISO-8601 week number.
    pub week: u32,
    /// Day of week, Sunday = 0.
    pub dow: u32,
}

impl DateRow {
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            date_id: date.format("%Y-%m-%d").to_string(),
            year: date.year(),
            quarter: (date.month() - 1) / 3 + 1,
            month: date.month(),
            day: date.day(),
            week: date.iso_week().week(),
            dow: date.weekday().num_days_from_sunday(),
        }
    }
}

const DATE_COLUMNS: &[&str] = &["date_id", "year", "quarter", "month", "day", "week", "dow"];

/// Insert every calendar date referenced by staging into the date dimension.
///
/// Attributes are pure functions of the date, so conflicts are ignored.
pub fn resolve_dates(conn: &mut Connection) -> Result<DimensionStats> {
    let tx = conn.transaction()?;
    let dates = {
        let mut stmt = tx.prepare(DATE_SOURCE)?;
        stmt.query_map([], |r| r.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?
    };

    let upsert = UpsertStatement {
        table: "dw_dim_date",
        columns: DATE_COLUMNS,
        conflict_target: &["date_id"],
        policy: MergePolicy::Ignore,
    };
    let mut inserted = 0;
    let mut skipped = 0;
    {
        let mut stmt = tx.prepare(&upsert.values_sql())?;
        for raw in &dates {
            let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") else {
                skipped += 1;
                continue;
            };
            let row = DateRow::from_date(date);
            inserted += stmt.execute(params![
                row.date_id,
                row.year,
                row.quarter,
                row.month,
                row.day,
                row.week,
                row.dow
            ])?;
        }
    }
    tx.commit()?;

    tracing::info!(dates = dates.len(), inserted, "Date dimension resolved");
    Ok(DimensionStats {
        dimension: "date".to_string(),
        source_rows: dates.len(),
        distinct_keys: dates.len() - skipped,
        skipped_null_keys: skipped,
        inserted,
    })
}

/// Resolve the date dimension and then every natural-key dimension.
pub fn resolve_all(conn: &mut Connection) -> Result<Vec<DimensionStats>> {
    let mut stats = vec![resolve_dates(conn)?];
    for spec in DIMENSIONS {
        stats.push(resolve_dimension(conn, spec)?);
    }
    Ok(stats)
}
