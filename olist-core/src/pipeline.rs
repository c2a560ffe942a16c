//! ETL pipeline orchestration.
//!
//! Staging reload, then dimensions, then facts. Dimensions must exist before
//! facts reference them, so the order is fixed. Each step commits on its
//! own; a failing step stops the run and surfaces to the caller.

use crate::config::WarehouseConfig;
use crate::dimension::{self, DimensionStats};
use crate::error::Result;
use crate::fact::{self, FactStats};
use crate::staging::{self, StagingReport};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Summary of one pipeline invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staging: Option<StagingReport>,
    pub dimensions: Vec<DimensionStats>,
    pub facts: Vec<FactStats>,
}

impl PipelineReport {
    fn start() -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            started_at: now,
            finished_at: now,
            staging: None,
            dimensions: Vec::new(),
            facts: Vec::new(),
        }
    }
}

/// Reload staging only.
pub fn ingest(conn: &mut Connection, config: &WarehouseConfig) -> Result<PipelineReport> {
    let mut report = PipelineReport::start();
    let span = tracing::info_span!("ingest", run_id = %report.run_id);
    let _enter = span.enter();

    report.staging = Some(staging::load_staging(conn, config)?);
    report.finished_at = Utc::now();
    Ok(report)
}

/// Transform the current staging snapshot into dimensions and facts.
pub fn transform_load(conn: &mut Connection) -> Result<PipelineReport> {
    let mut report = PipelineReport::start();
    let span = tracing::info_span!("transform", run_id = %report.run_id);
    let _enter = span.enter();

    transform_into(conn, &mut report)?;
    report.finished_at = Utc::now();
    Ok(report)
}

/// Full run: staging reload followed by transform and load.
pub fn run(conn: &mut Connection, config: &WarehouseConfig) -> Result<PipelineReport> {
    let mut report = PipelineReport::start();
    let span = tracing::info_span!("pipeline", run_id = %report.run_id);
    let _enter = span.enter();

    report.staging = Some(staging::load_staging(conn, config)?);
    transform_into(conn, &mut report)?;
    report.finished_at = Utc::now();
    tracing::info!(
        elapsed_ms = (report.finished_at - report.started_at).num_milliseconds(),
        "Pipeline complete"
    );
    Ok(report)
}

fn transform_into(conn: &mut Connection, report: &mut PipelineReport) -> Result<()> {
    report.dimensions = dimension::resolve_all(conn)?;
    report.facts = fact::build_all(conn)?;
    Ok(())
}
