//! End-to-end pipeline tests against CSV fixtures in a temporary data dir.

use olist_core::config::WarehouseConfig;
use olist_core::{EtlError, pipeline, store};
use pretty_assertions::assert_eq;
use rusqlite::Connection;
use std::path::Path;
use tempfile::TempDir;

const CUSTOMERS: &str = "\
customer_id,customer_unique_id,customer_zip_code_prefix,customer_city,customer_state
c1,u1,01310,sao paulo,SP
c2,u2,20040,rio de janeiro,RJ
";

const SELLERS: &str = "\
seller_id,seller_zip_code_prefix,seller_city,seller_state
s1,30110,belo horizonte,MG
";

const PRODUCTS: &str = "\
product_id,product_category_name,product_name_lenght,product_description_lenght,product_photos_qty,product_weight_g,product_length_cm,product_height_cm,product_width_cm
p1,beleza_saude,40,287,1,225,16,10,14
p2,,,,,,,,
";

const ORDERS: &str = "\
order_id,customer_id,order_status,order_purchase_timestamp,order_approved_at,order_delivered_carrier_date,order_delivered_customer_date,order_estimated_delivery_date
o1,c1,shipped,2017-10-02 10:56:33,2017-10-02 11:07:15,2017-10-04 19:55:00,,2017-10-18 00:00:00
o2,c2,delivered,2018-07-24 20:41:37,2018-07-26 03:24:27,2018-07-26 14:31:00,2018-08-07 15:27:45,2018-08-13 00:00:00
";

const ORDER_ITEMS: &str = "\
order_id,order_item_id,product_id,seller_id,shipping_limit_date,price,freight_value
o1,1,p1,s1,2017-10-06 11:07:15,29.99,8.72
o2,1,p2,s1,2018-07-30 03:24:27,118.70,22.76
o2,2,p-unknown,s1,2018-07-30 03:24:27,10.00,1.00
";

const PAYMENTS: &str = "\
order_id,payment_sequential,payment_type,payment_installments,payment_value
o1,1,credit_card,1,38.71
o2,1,boleto,1,141.46
";

const REVIEWS: &str = "\
review_id,order_id,review_score,review_comment_title,review_comment_message,review_creation_date,review_answer_timestamp
r1,o2,4,,\"Muito bom, recomendo\",2018-08-08 00:00:00,2018-08-08 18:37:50
";

const TRANSLATION: &str = "\
product_category_name,product_category_name_english
beleza_saude,health_beauty
";

fn write_extracts(dir: &Path, orders: &str) {
    let files = [
        ("olist_customers_dataset.csv", CUSTOMERS),
        ("olist_sellers_dataset.csv", SELLERS),
        ("olist_products_dataset.csv", PRODUCTS),
        ("olist_orders_dataset.csv", orders),
        ("olist_order_items_dataset.csv", ORDER_ITEMS),
        ("olist_order_payments_dataset.csv", PAYMENTS),
        ("olist_order_reviews_dataset.csv", REVIEWS),
        ("product_category_name_translation.csv", TRANSLATION),
    ];
    for (name, content) in files {
        std::fs::write(dir.join(name), content).unwrap();
    }
}

fn config_for(dir: &Path) -> WarehouseConfig {
    WarehouseConfig {
        data_dir: dir.to_path_buf(),
        ..WarehouseConfig::default()
    }
}

fn statuses(conn: &Connection) -> Vec<(String, i64, String)> {
    conn.prepare(
        "SELECT order_id, order_item_id, order_status FROM dw_fact_order_item ORDER BY order_id, order_item_id",
    )
    .unwrap()
    .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
    .unwrap()
    .collect::<rusqlite::Result<Vec<_>>>()
    .unwrap()
}

#[test]
fn full_run_builds_star_schema() {
    let dir = TempDir::new().unwrap();
    write_extracts(dir.path(), ORDERS);
    let mut conn = store::open_in_memory().unwrap();

    let report = pipeline::run(&mut conn, &config_for(dir.path())).unwrap();

    let staging = report.staging.as_ref().unwrap();
    assert_eq!(staging.sources.len(), 8);
    assert_eq!(staging.total_rows(), 14);
    assert!(staging.sources.iter().all(|s| s.sha256.len() == 64));

    // The item pointing at an unknown product is silently excluded.
    assert_eq!(
        statuses(&conn),
        vec![
            ("o1".into(), 1, "shipped".into()),
            ("o2".into(), 1, "delivered".into()),
        ]
    );
    let items = report.facts.iter().find(|f| f.fact == "order_item").unwrap();
    assert_eq!((items.source_rows, items.joined_rows), (3, 2));

    let translated: Option<String> = conn
        .query_row(
            "SELECT category_name_en FROM dw_dim_product WHERE product_id = 'p1'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(translated.as_deref(), Some("health_beauty"));

    // Review dates feed the date dimension too.
    let review_day: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM dw_dim_date WHERE date_id = '2018-08-08'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(review_day, 1);
}

#[test]
fn rerun_with_status_change_updates_in_place() {
    let dir = TempDir::new().unwrap();
    write_extracts(dir.path(), ORDERS);
    let config = config_for(dir.path());
    let mut conn = store::open_in_memory().unwrap();
    pipeline::run(&mut conn, &config).unwrap();

    let customer_sks_before: Vec<i64> = conn
        .prepare("SELECT customer_sk FROM dw_dim_customer ORDER BY customer_id")
        .unwrap()
        .query_map([], |r| r.get(0))
        .unwrap()
        .collect::<rusqlite::Result<_>>()
        .unwrap();

    let delivered = ORDERS.replace(
        "o1,c1,shipped,2017-10-02 10:56:33,2017-10-02 11:07:15,2017-10-04 19:55:00,,",
        "o1,c1,delivered,2017-10-02 10:56:33,2017-10-02 11:07:15,2017-10-04 19:55:00,2017-10-10 21:25:13,",
    );
    write_extracts(dir.path(), &delivered);
    pipeline::run(&mut conn, &config).unwrap();

    assert_eq!(
        statuses(&conn),
        vec![
            ("o1".into(), 1, "delivered".into()),
            ("o2".into(), 1, "delivered".into()),
        ]
    );
    let delivered_ref: Option<String> = conn
        .query_row(
            "SELECT delivered_customer_date_id FROM dw_fact_order_item WHERE order_id = 'o1'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(delivered_ref.as_deref(), Some("2017-10-10"));

    let customer_sks_after: Vec<i64> = conn
        .prepare("SELECT customer_sk FROM dw_dim_customer ORDER BY customer_id")
        .unwrap()
        .query_map([], |r| r.get(0))
        .unwrap()
        .collect::<rusqlite::Result<_>>()
        .unwrap();
    assert_eq!(customer_sks_before, customer_sks_after);
}

#[test]
fn staging_is_replaced_not_appended() {
    let dir = TempDir::new().unwrap();
    write_extracts(dir.path(), ORDERS);
    let config = config_for(dir.path());
    let mut conn = store::open_in_memory().unwrap();

    pipeline::ingest(&mut conn, &config).unwrap();
    pipeline::ingest(&mut conn, &config).unwrap();

    assert_eq!(store::row_count(&conn, "stg_raw_orders").unwrap(), 2);
    assert_eq!(store::row_count(&conn, "stg_raw_order_items").unwrap(), 3);
}

#[test]
fn missing_extract_is_fatal() {
    let dir = TempDir::new().unwrap();
    write_extracts(dir.path(), ORDERS);
    std::fs::remove_file(dir.path().join("olist_order_payments_dataset.csv")).unwrap();
    let mut conn = store::open_in_memory().unwrap();

    let err = pipeline::run(&mut conn, &config_for(dir.path())).unwrap_err();
    match err {
        EtlError::SourceNotFound { table, path } => {
            assert_eq!(table, "raw_payments");
            assert!(path.ends_with("olist_order_payments_dataset.csv"));
        }
        other => panic!("expected SourceNotFound, got {other}"),
    }
    assert_eq!(store::row_count(&conn, "stg_raw_customers").unwrap(), 0);
}

#[test]
fn load_staging_midload_failure_keeps_previous_snapshot() {
    let dir = TempDir::new().unwrap();
    write_extracts(dir.path(), ORDERS);
    let config = config_for(dir.path());
    let mut conn = store::open_in_memory().unwrap();
    pipeline::ingest(&mut conn, &config).unwrap();

    // The translation extract is loaded last, after every other table was cleared.
    std::fs::write(
        dir.path().join("olist_customers_dataset.csv"),
        "customer_id,customer_unique_id,customer_zip_code_prefix,customer_city,customer_state\nc9,u9,69005,manaus,AM\n",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("product_category_name_translation.csv"),
        "bogus_col\nx\n",
    )
    .unwrap();

    let err = pipeline::ingest(&mut conn, &config).unwrap_err();
    match err {
        EtlError::UnknownColumn { table, column } => {
            assert_eq!(table, "raw_category_translation");
            assert_eq!(column, "bogus_col");
        }
        other => panic!("expected UnknownColumn, got {other}"),
    }

    let customers: Vec<String> = conn
        .prepare("SELECT customer_id FROM stg_raw_customers ORDER BY customer_id")
        .unwrap()
        .query_map([], |r| r.get(0))
        .unwrap()
        .collect::<rusqlite::Result<_>>()
        .unwrap();
    assert_eq!(customers, vec!["c1".to_string(), "c2".to_string()]);
    assert_eq!(store::row_count(&conn, "stg_raw_order_items").unwrap(), 3);
    assert_eq!(
        store::row_count(&conn, "stg_raw_category_translation").unwrap(),
        1
    );
}
