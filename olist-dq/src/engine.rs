//! Rule engine: evaluates a catalog sequentially or concurrently.
//!
//! The sequential path runs every rule inside one read transaction on the
//! caller's connection. The concurrent path gives each rule its own
//! read-only connection on a blocking thread; results are put back in
//! catalog order, so both paths produce the same report.

use crate::rule::{Category, DqRule, MetricValue, RuleResult};
use chrono::{DateTime, Utc};
use olist_core::store;
use rusqlite::{Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinSet;
use uuid::Uuid;

/// Outcome of one monitoring run, one result per rule in catalog order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DqReport {
    pub run_id: Uuid,
    pub evaluated_at: DateTime<Utc>,
    pub results: Vec<RuleResult>,
}

impl DqReport {
    fn new(results: Vec<RuleResult>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            evaluated_at: Utc::now(),
            results,
        }
    }

    pub fn by_category(&self, category: Category) -> impl Iterator<Item = &RuleResult> {
        self.results.iter().filter(move |r| r.category == category)
    }

    pub fn get(&self, name: &str) -> Option<&RuleResult> {
        self.results.iter().find(|r| r.name == name)
    }

    pub fn undefined_count(&self) -> usize {
        self.results.iter().filter(|r| r.value.is_undefined()).count()
    }
}

/// Evaluate every rule on one connection inside a single read transaction.
pub fn evaluate(conn: &mut Connection, rules: &[DqRule]) -> crate::Result<DqReport> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
    let results = rules.iter().map(|rule| rule.evaluate(&tx)).collect();
    tx.finish()?;

    let report = DqReport::new(results);
    log_summary(&report);
    Ok(report)
}

/// Evaluate every rule concurrently, each on its own read-only connection.
///
/// A rule whose connection cannot be opened or whose task panics yields
/// `Undefined`; the batch itself never fails.
pub async fn evaluate_concurrent(
    db_path: &Path,
    busy_timeout: Duration,
    rules: Vec<DqRule>,
) -> DqReport {
    let mut slots: Vec<Option<RuleResult>> = vec![None; rules.len()];
    let mut tasks: JoinSet<(usize, RuleResult)> = JoinSet::new();

    for (idx, rule) in rules.iter().cloned().enumerate() {
        let path: PathBuf = db_path.to_path_buf();
        tasks.spawn_blocking(move || (idx, evaluate_isolated(&path, busy_timeout, &rule)));
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((idx, result)) => slots[idx] = Some(result),
            Err(e) => tracing::warn!(error = %e, "Rule task failed"),
        }
    }

    let results = rules
        .iter()
        .zip(slots)
        .map(|(rule, slot)| slot.unwrap_or_else(|| rule.result(MetricValue::Undefined)))
        .collect();
    let report = DqReport::new(results);
    log_summary(&report);
    report
}

fn evaluate_isolated(path: &Path, busy_timeout: Duration, rule: &DqRule) -> RuleResult {
    let snapshot = store::open_read_only(path, busy_timeout).and_then(|mut conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
        let result = rule.evaluate(&tx);
        tx.finish()?;
        Ok(result)
    });
    match snapshot {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!(rule = %rule.name, error = %e, "Could not open read snapshot");
            rule.result(MetricValue::Undefined)
        }
    }
}

fn log_summary(report: &DqReport) {
    tracing::info!(
        run_id = %report.run_id,
        rules = report.results.len(),
        undefined = report.undefined_count(),
        "Data-quality rules evaluated"
    );
}
