//! Staging loader: full reload of the raw extracts into `stg_*` tables.
//!
//! Every run replaces the previous staging snapshot. All extracts are checked
//! for existence before anything is truncated, and the whole reload happens in
//! one transaction, so a missing or malformed extract leaves the prior snapshot
//! untouched.

use crate::config::WarehouseConfig;
use crate::error::{EtlError, Result};
use rusqlite::Connection;
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// SQLite column affinity of a staging column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affinity {
    Text,
    Integer,
    Real,
}

impl Affinity {
    fn sql(self) -> &'static str {
        match self {
            Affinity::Text => "TEXT",
            Affinity::Integer => "INTEGER",
            Affinity::Real => "REAL",
        }
    }
}

/// A column of a staging relation.
#[derive(Debug, Clone, Copy)]
pub struct StagingColumn {
    pub name: &'static str,
    pub affinity: Affinity,
}

const fn text(name: &'static str) -> StagingColumn {
    StagingColumn {
        name,
        affinity: Affinity::Text,
    }
}

const fn integer(name: &'static str) -> StagingColumn {
    StagingColumn {
        name,
        affinity: Affinity::Integer,
    }
}

const fn real(name: &'static str) -> StagingColumn {
    StagingColumn {
        name,
        affinity: Affinity::Real,
    }
}

/// A staging relation mirroring one external extract column-for-column.
#[derive(Debug, Clone, Copy)]
pub struct StagingTable {
    /// Logical source name, also the key in the `sources` config map.
    pub source: &'static str,
    /// Physical table name.
    pub table: &'static str,
    pub default_file: &'static str,
    pub columns: &'static [StagingColumn],
}

impl StagingTable {
    pub fn create_sql(&self) -> String {
        let cols = self
            .columns
            .iter()
            .map(|c| format!("    {} {}", c.name, c.affinity.sql()))
            .collect::<Vec<_>>()
            .join(",\n");
        format!("CREATE TABLE IF NOT EXISTS {} (\n{}\n);", self.table, cols)
    }

    fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }
}

pub const RAW_CUSTOMERS: StagingTable = StagingTable {
    source: "raw_customers",
    table: "stg_raw_customers",
    default_file: "olist_customers_dataset.csv",
    columns: &[
        text("customer_id"),
        text("customer_unique_id"),
        text("customer_zip_code_prefix"),
        text("customer_city"),
        text("customer_state"),
    ],
};

pub const RAW_ORDERS: StagingTable = StagingTable {
    source: "raw_orders",
    table: "stg_raw_orders",
    default_file: "olist_orders_dataset.csv",
    columns: &[
        text("order_id"),
        text("customer_id"),
        text("order_status"),
        text("order_purchase_timestamp"),
        text("order_approved_at"),
        text("order_delivered_carrier_date"),
        text("order_delivered_customer_date"),
        text("order_estimated_delivery_date"),
    ],
};

pub const RAW_ORDER_ITEMS: StagingTable = StagingTable {
    source: "raw_order_items",
    table: "stg_raw_order_items",
    default_file: "olist_order_items_dataset.csv",
    columns: &[
        text("order_id"),
        integer("order_item_id"),
        text("product_id"),
        text("seller_id"),
        text("shipping_limit_date"),
        real("price"),
        real("freight_value"),
    ],
};

pub const RAW_PRODUCTS: StagingTable = StagingTable {
    source: "raw_products",
    table: "stg_raw_products",
    default_file: "olist_products_dataset.csv",
    columns: &[
        text("product_id"),
        text("product_category_name"),
        // Column names as spelled in the upstream extract.
        integer("product_name_lenght"),
        integer("product_description_lenght"),
        integer("product_photos_qty"),
        real("product_weight_g"),
        real("product_length_cm"),
        real("product_height_cm"),
        real("product_width_cm"),
    ],
};

pub const RAW_SELLERS: StagingTable = StagingTable {
    source: "raw_sellers",
    table: "stg_raw_sellers",
    default_file: "olist_sellers_dataset.csv",
    columns: &[
        text("seller_id"),
        text("seller_zip_code_prefix"),
        text("seller_city"),
        text("seller_state"),
    ],
};

pub const RAW_PAYMENTS: StagingTable = StagingTable {
    source: "raw_payments",
    table: "stg_raw_payments",
    default_file: "olist_order_payments_dataset.csv",
    columns: &[
        text("order_id"),
        integer("payment_sequential"),
        text("payment_type"),
        integer("payment_installments"),
        real("payment_value"),
    ],
};

pub const RAW_REVIEWS: StagingTable = StagingTable {
    source: "raw_reviews",
    table: "stg_raw_reviews",
    default_file: "olist_order_reviews_dataset.csv",
    columns: &[
        text("review_id"),
        text("order_id"),
        integer("review_score"),
        text("review_comment_title"),
        text("review_comment_message"),
        text("review_creation_date"),
        text("review_answer_timestamp"),
    ],
};

pub const RAW_CATEGORY_TRANSLATION: StagingTable = StagingTable {
    source: "raw_category_translation",
    table: "stg_raw_category_translation",
    default_file: "product_category_name_translation.csv",
    columns: &[
        text("product_category_name"),
        text("product_category_name_english"),
    ],
};

/// All staging relations, in load order.
pub const STAGING_TABLES: &[StagingTable] = &[
    RAW_CUSTOMERS,
    RAW_ORDERS,
    RAW_ORDER_ITEMS,
    RAW_PRODUCTS,
    RAW_SELLERS,
    RAW_PAYMENTS,
    RAW_REVIEWS,
    RAW_CATEGORY_TRANSLATION,
];

/// Outcome of loading one extract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadedSource {
    pub table: String,
    pub path: PathBuf,
    pub rows: usize,
    /// SHA-256 of the extract file, for lineage.
    pub sha256: String,
}

/// Outcome of a full staging reload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StagingReport {
    pub sources: Vec<LoadedSource>,
}

impl StagingReport {
    pub fn total_rows(&self) -> usize {
        self.sources.iter().map(|s| s.rows).sum()
    }
}

/// Replace the staging snapshot with the extracts found under the configured data dir.
pub fn load_staging(conn: &mut Connection, config: &WarehouseConfig) -> Result<StagingReport> {
    let plan = STAGING_TABLES
        .iter()
        .map(|t| (t, config.source_path(t)))
        .collect::<Vec<_>>();

    for (table, path) in &plan {
        if !path.is_file() {
            return Err(EtlError::SourceNotFound {
                table: table.source.to_string(),
                path: path.clone(),
            });
        }
    }

    let tx = conn.transaction()?;
    let mut report = StagingReport::default();
    for (table, path) in plan {
        tx.execute(&format!("DELETE FROM {}", table.table), [])?;
        let rows = copy_csv(&tx, table, &path)?;
        let sha256 = hash_file(&path)?;
        tracing::info!(table = table.table, rows, path = %path.display(), "Staging table loaded");
        report.sources.push(LoadedSource {
            table: table.table.to_string(),
            path,
            rows,
            sha256,
        });
    }
    tx.commit()?;

    tracing::info!(
        tables = report.sources.len(),
        rows = report.total_rows(),
        "Staging reload complete"
    );
    Ok(report)
}

/// Append the rows of one CSV extract (with header row) to a staging table.
///
/// Columns are matched by header name; table columns absent from the extract
/// load as NULL, and empty fields load as NULL.
pub fn copy_csv(conn: &Connection, table: &StagingTable, path: &Path) -> Result<usize> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| EtlError::csv(table.source, e))?;

    let headers = reader
        .headers()
        .map_err(|e| EtlError::csv(table.source, e))?
        .iter()
        .map(str::to_string)
        .collect::<Vec<_>>();
    if let Some(unknown) = headers.iter().find(|h| !table.has_column(h)) {
        return Err(EtlError::UnknownColumn {
            table: table.source.to_string(),
            column: unknown.clone(),
        });
    }

    let placeholders = vec!["?"; headers.len()].join(", ");
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table.table,
        headers.join(", "),
        placeholders
    );
    let mut stmt = conn.prepare(&sql)?;

    let mut rows = 0;
    for record in reader.records() {
        let record = record.map_err(|e| EtlError::csv(table.source, e))?;
        let values = record.iter().map(field_value).collect::<Vec<_>>();
        stmt.execute(rusqlite::params_from_iter(values))?;
        rows += 1;
    }
    Ok(rows)
}

fn field_value(field: &str) -> Value {
    if field.is_empty() {
        Value::Null
    } else {
        Value::Text(field.to_string())
    }
}

fn hash_file(path: &Path) -> Result<String> {
    let content = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&content);
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_create_sql() {
        let sql = RAW_SELLERS.create_sql();
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS stg_raw_sellers"));
        assert!(sql.contains("seller_zip_code_prefix TEXT"));
    }

    #[test]
    fn test_copy_csv_empty_fields_are_null() {
        let dir = TempDir::new().unwrap();
        let path = write(
            dir.path(),
            "items.csv",
            "order_id,order_item_id,product_id,seller_id,shipping_limit_date,price,freight_value\n\
             o1,1,p1,s1,2018-01-01 10:00:00,59.90,\n",
        );
        let conn = store::open_in_memory().unwrap();
        let rows = copy_csv(&conn, &RAW_ORDER_ITEMS, &path).unwrap();
        assert_eq!(rows, 1);

        let (item_id, price, freight): (i64, f64, Option<f64>) = conn
            .query_row(
                "SELECT order_item_id, price, freight_value FROM stg_raw_order_items",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        assert_eq!(item_id, 1);
        assert!((price - 59.90).abs() < 1e-9);
        assert_eq!(freight, None);
    }

    #[test]
    fn test_copy_csv_quoted_fields() {
        let dir = TempDir::new().unwrap();
        let path = write(
            dir.path(),
            "reviews.csv",
            "review_id,order_id,review_score,review_comment_title,review_comment_message,review_creation_date,review_answer_timestamp\n\
             r1,o1,5,,\"chegou antes, muito bom\",2018-01-10 00:00:00,2018-01-11 12:00:00\n",
        );
        let conn = store::open_in_memory().unwrap();
        copy_csv(&conn, &RAW_REVIEWS, &path).unwrap();
        let message: String = conn
            .query_row(
                "SELECT review_comment_message FROM stg_raw_reviews",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(message, "chegou antes, muito bom");
    }

    #[test]
    fn test_copy_csv_unknown_column() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "sellers.csv", "seller_id,seller_country\ns1,BR\n");
        let conn = store::open_in_memory().unwrap();
        let err = copy_csv(&conn, &RAW_SELLERS, &path).unwrap_err();
        assert!(matches!(err, EtlError::UnknownColumn { ref column, .. } if column == "seller_country"));
    }

    #[test]
    fn test_load_staging_missing_source_keeps_previous_snapshot() {
        let dir = TempDir::new().unwrap();
        let mut config = WarehouseConfig::default();
        config.data_dir = dir.path().to_path_buf();

        let mut conn = store::open_in_memory().unwrap();
        conn.execute(
            "INSERT INTO stg_raw_sellers (seller_id) VALUES ('s-previous')",
            [],
        )
        .unwrap();

        let err = load_staging(&mut conn, &config).unwrap_err();
        assert!(err.is_source_not_found());

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM stg_raw_sellers", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
