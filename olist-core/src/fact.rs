//! Fact builder: order line items and payments.
//!
//! Fact rows come from inner joins of staging against staging and the
//! resolved dimensions. A staging row whose parent order, customer, seller
//! or product (or its dimension row) is missing simply drops out of the
//! join; that is expected and not reported as an error. Upserts use
//! [`MergePolicy::LastWriteWins`]: a reload replaces measures, status and
//! references of an existing fact instead of inserting a duplicate.
//!
//! Timestamps are truncated to the calendar date before the date-dimension
//! lookup. The lookup is a left join, so a null or unparseable timestamp
//! yields a null date reference.

use crate::error::Result;
use crate::store::row_count;
use crate::upsert::{MergePolicy, UpsertStatement};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

/// Declarative description of a fact table load.
#[derive(Debug, Clone, Copy)]
pub struct FactSpec {
    pub name: &'static str,
    pub table: &'static str,
    /// Staging table driving the join, one fact per row.
    pub driving_table: &'static str,
    pub columns: &'static [&'static str],
    pub conflict_target: &'static [&'static str],
    /// SELECT producing `columns`, ordered by staging input position.
    pub select: &'static str,
}

impl FactSpec {
    pub fn upsert(&self) -> UpsertStatement<'static> {
        UpsertStatement {
            table: self.table,
            columns: self.columns,
            conflict_target: self.conflict_target,
            policy: MergePolicy::LastWriteWins,
        }
    }

    pub fn sql(&self) -> String {
        self.upsert().select_sql(self.select)
    }
}

pub const ORDER_ITEM: FactSpec = FactSpec {
    name: "order_item",
    table: "dw_fact_order_item",
    driving_table: "stg_raw_order_items",
    columns: &[
        "order_id",
        "order_item_id",
        "customer_sk",
        "seller_sk",
        "product_sk",
        "purchase_date_id",
        "approved_date_id",
        "shipping_limit_date_id",
        "delivered_customer_date_id",
        "estimated_delivery_date_id",
        "order_status",
        "price",
        "freight_value",
    ],
    conflict_target: &["order_id", "order_item_id"],
    select: "
SELECT i.order_id, i.order_item_id,
       dc.customer_sk, ds.seller_sk, dp.product_sk,
       d_purchase.date_id, d_approved.date_id, d_limit.date_id,
       d_delivered.date_id, d_estimated.date_id,
       o.order_status, i.price, i.freight_value
FROM stg_raw_order_items i
JOIN stg_raw_orders o    ON o.order_id = i.order_id
JOIN stg_raw_customers c ON c.customer_id = o.customer_id
JOIN stg_raw_sellers s   ON s.seller_id = i.seller_id
JOIN stg_raw_products p  ON p.product_id = i.product_id
JOIN dw_dim_customer dc  ON dc.customer_id = c.customer_id
JOIN dw_dim_seller ds    ON ds.seller_id = s.seller_id
JOIN dw_dim_product dp   ON dp.product_id = p.product_id
LEFT JOIN dw_dim_date d_purchase  ON d_purchase.date_id = date(o.order_purchase_timestamp)
LEFT JOIN dw_dim_date d_approved  ON d_approved.date_id = date(o.order_approved_at)
LEFT JOIN dw_dim_date d_limit     ON d_limit.date_id = date(i.shipping_limit_date)
LEFT JOIN dw_dim_date d_delivered ON d_delivered.date_id = date(o.order_delivered_customer_date)
LEFT JOIN dw_dim_date d_estimated ON d_estimated.date_id = date(o.order_estimated_delivery_date)
WHERE i.order_item_id IS NOT NULL
ORDER BY i.rowid, o.rowid, c.rowid, s.rowid, p.rowid",
};

pub const PAYMENT: FactSpec = FactSpec {
    name: "payment",
    table: "dw_fact_payment",
    driving_table: "stg_raw_payments",
    columns: &[
        "order_id",
        "payment_sequential",
        "payment_type",
        "payment_installments",
        "payment_value",
        "purchase_date_id",
    ],
    conflict_target: &["order_id", "payment_sequential"],
    select: "
SELECT p.order_id, p.payment_sequential, p.payment_type,
       p.payment_installments, p.payment_value, d_purchase.date_id
FROM stg_raw_payments p
JOIN stg_raw_orders o ON o.order_id = p.order_id
LEFT JOIN dw_dim_date d_purchase ON d_purchase.date_id = date(o.order_purchase_timestamp)
WHERE p.payment_sequential IS NOT NULL
ORDER BY p.rowid, o.rowid",
};

/// Fact loads, in dependency order.
pub const FACTS: &[FactSpec] = &[ORDER_ITEM, PAYMENT];

/// Outcome of one fact load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactStats {
    pub fact: String,
    pub source_rows: usize,
    /// Rows surviving the inner joins.
    pub joined_rows: usize,
    /// Fact rows inserted or updated.
    pub written: usize,
}

/// Build one fact table from the current staging snapshot and dimensions.
///
/// Runs in its own transaction.
pub fn build_facts(conn: &mut Connection, spec: &FactSpec) -> Result<FactStats> {
    let tx = conn.transaction()?;
    let source_rows = row_count(&tx, spec.driving_table)?;
    let joined_rows: i64 = tx.query_row(
        &format!("SELECT COUNT(*) FROM ({})", spec.select),
        [],
        |r| r.get(0),
    )?;
    let written = tx.execute(&spec.sql(), [])?;
    tx.commit()?;

    let stats = FactStats {
        fact: spec.name.to_string(),
        source_rows: usize::try_from(source_rows).unwrap_or_default(),
        joined_rows: usize::try_from(joined_rows).unwrap_or_default(),
        written,
    };
    tracing::info!(
        fact = spec.name,
        source_rows = stats.source_rows,
        joined_rows = stats.joined_rows,
        written = stats.written,
        "Fact table built"
    );
    Ok(stats)
}

/// Build every fact table. Dimensions must already be resolved.
pub fn build_all(conn: &mut Connection) -> Result<Vec<FactStats>> {
    FACTS.iter().map(|spec| build_facts(conn, spec)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension;
    use crate::store;
    use pretty_assertions::assert_eq;

    fn seed(conn: &Connection) {
        conn.execute_batch(
            "INSERT INTO stg_raw_customers (customer_id, customer_state) VALUES ('c1', 'SP');
             INSERT INTO stg_raw_sellers (seller_id, seller_state) VALUES ('s1', 'MG');
             INSERT INTO stg_raw_products (product_id) VALUES ('p1');
             INSERT INTO stg_raw_orders (order_id, customer_id, order_status, order_purchase_timestamp, order_delivered_customer_date)
                 VALUES ('o1', 'c1', 'shipped', '2018-03-01 10:00:00', NULL);
             INSERT INTO stg_raw_order_items (order_id, order_item_id, product_id, seller_id, shipping_limit_date, price, freight_value)
                 VALUES ('o1', 1, 'p1', 's1', '2018-03-03 10:00:00', 100.0, 10.0);
             INSERT INTO stg_raw_payments (order_id, payment_sequential, payment_type, payment_installments, payment_value)
                 VALUES ('o1', 1, 'credit_card', 2, 110.0);",
        )
        .unwrap();
    }

    fn load(conn: &mut Connection) {
        dimension::resolve_all(conn).unwrap();
        build_all(conn).unwrap();
    }

    fn item(conn: &Connection) -> (String, f64, Option<String>, Option<String>) {
        conn.query_row(
            "SELECT order_status, price, purchase_date_id, delivered_customer_date_id FROM dw_fact_order_item",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .unwrap()
    }

    #[test]
    fn test_builds_items_with_date_references() {
        let mut conn = store::open_in_memory().unwrap();
        seed(&conn);
        load(&mut conn);

        assert_eq!(
            item(&conn),
            ("shipped".into(), 100.0, Some("2018-03-01".into()), None)
        );
        assert_eq!(store::row_count(&conn, "dw_fact_payment").unwrap(), 1);
    }

    #[test]
    fn test_reload_updates_status_and_measures() {
        let mut conn = store::open_in_memory().unwrap();
        seed(&conn);
        load(&mut conn);

        conn.execute_batch(
            "UPDATE stg_raw_orders SET order_status = 'delivered',
                 order_delivered_customer_date = '2018-03-09 15:00:00';
             UPDATE stg_raw_order_items SET price = 95.5;
             UPDATE stg_raw_payments SET payment_value = 105.5;",
        )
        .unwrap();
        load(&mut conn);

        assert_eq!(store::row_count(&conn, "dw_fact_order_item").unwrap(), 1);
        assert_eq!(
            item(&conn),
            (
                "delivered".into(),
                95.5,
                Some("2018-03-01".into()),
                Some("2018-03-09".into())
            )
        );
        let value: f64 = conn
            .query_row("SELECT payment_value FROM dw_fact_payment", [], |r| r.get(0))
            .unwrap();
        assert_eq!(value, 105.5);
    }

    #[test]
    fn test_missing_product_is_excluded_without_error() {
        let mut conn = store::open_in_memory().unwrap();
        seed(&conn);
        conn.execute(
            "INSERT INTO stg_raw_order_items (order_id, order_item_id, product_id, seller_id, price)
             VALUES ('o1', 2, 'p-missing', 's1', 50.0)",
            [],
        )
        .unwrap();
        dimension::resolve_all(&mut conn).unwrap();
        let stats = build_facts(&mut conn, &ORDER_ITEM).unwrap();

        assert_eq!(stats.source_rows, 2);
        assert_eq!(stats.joined_rows, 1);
        let ids: Vec<i64> = conn
            .prepare("SELECT order_item_id FROM dw_fact_order_item")
            .unwrap()
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        assert_eq!(ids, vec![1]);
    }

    #[test]
    fn test_payment_without_order_is_excluded() {
        let mut conn = store::open_in_memory().unwrap();
        seed(&conn);
        conn.execute(
            "INSERT INTO stg_raw_payments (order_id, payment_sequential, payment_value) VALUES ('o-missing', 1, 9.0)",
            [],
        )
        .unwrap();
        load(&mut conn);
        assert_eq!(store::row_count(&conn, "dw_fact_payment").unwrap(), 1);
    }

    #[test]
    fn test_duplicate_staging_fact_last_row_wins() {
        let mut conn = store::open_in_memory().unwrap();
        seed(&conn);
        conn.execute(
            "INSERT INTO stg_raw_order_items (order_id, order_item_id, product_id, seller_id, price, freight_value)
             VALUES ('o1', 1, 'p1', 's1', 80.0, 8.0)",
            [],
        )
        .unwrap();
        load(&mut conn);

        assert_eq!(store::row_count(&conn, "dw_fact_order_item").unwrap(), 1);
        assert_eq!(item(&conn).1, 80.0);
    }

    #[test]
    fn test_unparseable_timestamp_yields_null_reference() {
        let mut conn = store::open_in_memory().unwrap();
        seed(&conn);
        conn.execute(
            "UPDATE stg_raw_orders SET order_purchase_timestamp = 'unknown'",
            [],
        )
        .unwrap();
        load(&mut conn);
        assert_eq!(item(&conn).2, None);
    }
}
