//! Warehouse store: SQLite connection setup and schema.
//!
//! Two logical namespaces share one database file: the staging area
//! (`stg_*`, generated from [`STAGING_TABLES`]) and the warehouse area
//! (`dw_*`). Natural-key uniqueness is declared here explicitly because the
//! upserts in [`crate::upsert`] use it as their conflict target.

use crate::error::Result;
use crate::staging::STAGING_TABLES;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::time::Duration;

/// Warehouse DDL. Every statement is idempotent.
pub const WAREHOUSE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS dw_dim_date (
    date_id TEXT PRIMARY KEY,
    year    INTEGER NOT NULL,
    quarter INTEGER NOT NULL,
    month   INTEGER NOT NULL,
    day     INTEGER NOT NULL,
    week    INTEGER NOT NULL,
    dow     INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS dw_dim_customer (
    customer_sk        INTEGER PRIMARY KEY AUTOINCREMENT,
    customer_id        TEXT NOT NULL,
    customer_unique_id TEXT,
    zip_prefix         TEXT,
    city               TEXT,
    state              TEXT,
    CONSTRAINT uq_dim_customer_nk UNIQUE (customer_id)
);

CREATE TABLE IF NOT EXISTS dw_dim_seller (
    seller_sk  INTEGER PRIMARY KEY AUTOINCREMENT,
    seller_id  TEXT NOT NULL,
    zip_prefix TEXT,
    city       TEXT,
    state      TEXT,
    CONSTRAINT uq_dim_seller_nk UNIQUE (seller_id)
);

CREATE TABLE IF NOT EXISTS dw_dim_product (
    product_sk       INTEGER PRIMARY KEY AUTOINCREMENT,
    product_id       TEXT NOT NULL,
    category_name    TEXT,
    category_name_en TEXT,
    weight_g         REAL,
    length_cm        REAL,
    height_cm        REAL,
    width_cm         REAL,
    CONSTRAINT uq_dim_product_nk UNIQUE (product_id)
);

CREATE TABLE IF NOT EXISTS dw_fact_order_item (
    order_item_sk              INTEGER PRIMARY KEY AUTOINCREMENT,
    order_id                   TEXT NOT NULL,
    order_item_id              INTEGER NOT NULL,
    customer_sk                INTEGER NOT NULL REFERENCES dw_dim_customer (customer_sk),
    seller_sk                  INTEGER NOT NULL REFERENCES dw_dim_seller (seller_sk),
    product_sk                 INTEGER NOT NULL REFERENCES dw_dim_product (product_sk),
    purchase_date_id           TEXT REFERENCES dw_dim_date (date_id),
    approved_date_id           TEXT REFERENCES dw_dim_date (date_id),
    shipping_limit_date_id     TEXT REFERENCES dw_dim_date (date_id),
    delivered_customer_date_id TEXT REFERENCES dw_dim_date (date_id),
    estimated_delivery_date_id TEXT REFERENCES dw_dim_date (date_id),
    order_status               TEXT,
    price                      REAL,
    freight_value              REAL,
    CONSTRAINT uq_fact_order_item_nk UNIQUE (order_id, order_item_id)
);

CREATE TABLE IF NOT EXISTS dw_fact_payment (
    payment_sk           INTEGER PRIMARY KEY AUTOINCREMENT,
    order_id             TEXT NOT NULL,
    payment_sequential   INTEGER NOT NULL,
    payment_type         TEXT,
    payment_installments INTEGER,
    payment_value        REAL,
    purchase_date_id     TEXT REFERENCES dw_dim_date (date_id),
    CONSTRAINT uq_fact_payment_nk UNIQUE (order_id, payment_sequential)
);
"#;

/// Open (creating if needed) the warehouse file and apply the schema.
pub fn open(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(path)?;
    conn.busy_timeout(busy_timeout)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    configure(&conn)?;
    apply_schema(&conn)?;
    tracing::debug!(path = %path.display(), "Warehouse store opened");
    Ok(conn)
}

/// Open an isolated in-memory store with the full schema.
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    configure(&conn)?;
    apply_schema(&conn)?;
    Ok(conn)
}

/// Open an existing warehouse file for reading only.
///
/// Used by concurrent rule evaluation; every reader gets its own connection.
pub fn open_read_only(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.busy_timeout(busy_timeout)?;
    Ok(conn)
}

fn configure(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

/// Create staging and warehouse tables if they don't exist.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    let staging = STAGING_TABLES
        .iter()
        .map(|t| t.create_sql())
        .collect::<Vec<_>>()
        .join("\n");
    conn.execute_batch(&staging)?;
    conn.execute_batch(WAREHOUSE_SCHEMA)?;
    Ok(())
}

/// Row count of a table.
pub fn row_count(conn: &Connection, table: &str) -> Result<i64> {
    let count = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))?;
    Ok(count)
}
