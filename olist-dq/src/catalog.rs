//! The fixed rule catalog for the Olist warehouse.
//!
//! Completeness is measured on the warehouse tables; the remaining
//! categories inspect the staging snapshot. Within completeness, validity
//! and consistency the rules are listed in name order.

use crate::rule::{Category, DqRule, Predicate, RowSet, RuleKind};
use olist_core::config::MonitoringConfig;

/// Valid two-letter Brazilian federative unit codes.
pub const BRAZILIAN_STATES: [&str; 27] = [
    "AC", "AL", "AP", "AM", "BA", "CE", "DF", "ES", "GO", "MA", "MT", "MS", "MG", "PA", "PB", "PR",
    "PE", "PI", "RJ", "RN", "RS", "RO", "RR", "SC", "SP", "SE", "TO",
];

/// Build the full catalog, grouped by category.
pub fn catalog(config: &MonitoringConfig) -> Vec<DqRule> {
    let mut rules = completeness();
    rules.extend(uniqueness());
    rules.extend(validity());
    rules.extend(consistency(config.payment_tolerance));
    rules.extend(timeliness(config.histogram_bins));
    rules
}

fn completeness() -> Vec<DqRule> {
    [
        ("dim_customer", "city"),
        ("dim_customer", "state"),
        ("dim_product", "category_name"),
        ("fact_order_item", "freight_value"),
        ("fact_order_item", "price"),
        ("fact_order_item", "purchase_date_id"),
    ]
    .into_iter()
    .map(|(entity, column)| {
        DqRule::new(
            Category::Completeness,
            format!("{entity}.{column}"),
            RuleKind::Fraction {
                rows: RowSet::table(format!("dw_{entity}")),
                predicate: Predicate::not_null(column),
            },
        )
    })
    .collect()
}

fn uniqueness() -> Vec<DqRule> {
    let keys: [(&str, &[&str]); 6] = [
        ("raw_orders", &["order_id"]),
        ("raw_customers", &["customer_id"]),
        ("raw_sellers", &["seller_id"]),
        ("raw_products", &["product_id"]),
        ("raw_order_items", &["order_id", "order_item_id"]),
        ("raw_payments", &["order_id", "payment_sequential"]),
    ];
    keys.into_iter()
        .map(|(entity, key)| {
            let name = match key {
                [single] => format!("{entity}.{single}"),
                _ => format!("{entity}({})", key.join(",")),
            };
            DqRule::new(
                Category::Uniqueness,
                name,
                RuleKind::Duplicates {
                    table: format!("stg_{entity}"),
                    key: key.iter().map(|c| c.to_string()).collect(),
                },
            )
        })
        .collect()
}

fn validity() -> Vec<DqRule> {
    let rule = |name: &str, table: &str, predicate: Predicate| {
        DqRule::new(
            Category::Validity,
            name,
            RuleKind::Fraction {
                rows: RowSet::table(table),
                predicate,
            },
        )
    };
    vec![
        rule(
            "customer_state in UF",
            "stg_raw_customers",
            Predicate::in_set("customer_state", &BRAZILIAN_STATES),
        ),
        rule(
            "dims>0 (produto)",
            "stg_raw_products",
            Predicate::PositiveOrNull(
                [
                    "product_weight_g",
                    "product_length_cm",
                    "product_height_cm",
                    "product_width_cm",
                ]
                .map(String::from)
                .to_vec(),
            ),
        ),
        rule(
            "freight>=0",
            "stg_raw_order_items",
            Predicate::at_least("freight_value", 0.0),
        ),
        rule(
            "price>0",
            "stg_raw_order_items",
            Predicate::greater_than("price", 0.0),
        ),
        rule(
            "seller_state in UF",
            "stg_raw_sellers",
            Predicate::in_set("seller_state", &BRAZILIAN_STATES),
        ),
    ]
}

fn consistency(payment_tolerance: f64) -> Vec<DqRule> {
    let rule = |name: &str, rows: RowSet, predicate: Predicate| {
        DqRule::new(
            Category::Consistency,
            name,
            RuleKind::Fraction { rows, predicate },
        )
    };
    let delivered = || Predicate::equals("order_status", "delivered");

    vec![
        rule(
            "delivered_after_purchase",
            RowSet::table("stg_raw_orders"),
            Predicate::implies(
                delivered(),
                Predicate::not_before("order_delivered_customer_date", "order_purchase_timestamp"),
            ),
        ),
        rule(
            "delivered_has_date",
            RowSet::table("stg_raw_orders"),
            Predicate::implies(
                delivered(),
                Predicate::not_null("order_delivered_customer_date"),
            ),
        ),
        rule(
            "shipping_limit_after_purchase",
            RowSet::table("stg_raw_order_items i JOIN stg_raw_orders o ON o.order_id = i.order_id"),
            Predicate::not_before("i.shipping_limit_date", "o.order_purchase_timestamp"),
        ),
        rule(
            "sum(payments)≈sum(items)",
            RowSet::table(
                "(SELECT order_id, SUM(payment_value) AS total FROM stg_raw_payments GROUP BY order_id) payments \
                 JOIN (SELECT order_id, SUM(price + freight_value) AS total FROM stg_raw_order_items GROUP BY order_id) items \
                 USING (order_id)",
            ),
            Predicate::WithinTolerance {
                left: "payments.total".into(),
                right: "items.total".into(),
                tolerance: payment_tolerance,
            },
        ),
    ]
}

fn timeliness(bins: usize) -> Vec<DqRule> {
    vec![
        DqRule::new(
            Category::Timeliness,
            "lead_time_days",
            RuleKind::LeadTime {
                table: "stg_raw_orders".into(),
                start: "order_purchase_timestamp".into(),
                end: "order_delivered_customer_date".into(),
                bins,
            },
        ),
        DqRule::new(
            Category::Timeliness,
            "on_time_delivery_rate",
            RuleKind::Fraction {
                rows: RowSet::table("stg_raw_orders").filtered(Predicate::And(vec![
                    Predicate::is_date("order_delivered_customer_date"),
                    Predicate::is_date("order_estimated_delivery_date"),
                ])),
                predicate: Predicate::not_before(
                    "order_estimated_delivery_date",
                    "order_delivered_customer_date",
                ),
            },
        ),
    ]
}
