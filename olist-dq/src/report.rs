//! Report emitter: per-category CSV tables and chart descriptors.
//!
//! Layout under the output directory:
//! - `csv/`: `completeness.csv`, `uniqueness.csv`, `validity.csv`,
//!   `consistency.csv`, `timeliness_leadtime.csv`, `timeliness_ontime.csv`
//! - `plots/`: one [`ChartSpec`] JSON per table, numbered `01` to `06`
//!
//! Undefined values become empty CSV cells and `null` chart values. Every
//! file is rendered in memory and replaced atomically.

use crate::engine::DqReport;
use crate::error::Result;
use crate::rule::{Category, MetricValue, RuleResult};
use olist_core::persistence::atomic_write;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Bar,
    Histogram,
}

/// Renderer-agnostic chart description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub title: String,
    pub kind: ChartKind,
    pub labels: Vec<String>,
    pub values: Vec<Option<f64>>,
}

impl ChartSpec {
    fn bar<'a>(title: &str, results: impl Iterator<Item = &'a RuleResult>) -> Self {
        let (labels, values) = results.map(|r| (r.name.clone(), r.value.as_f64())).unzip();
        Self {
            title: title.to_string(),
            kind: ChartKind::Bar,
            labels,
            values,
        }
    }
}

/// Files written by [`write_report`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct EmittedFiles {
    pub csv: Vec<PathBuf>,
    pub charts: Vec<PathBuf>,
}

struct Table {
    file: &'static str,
    category: Category,
    header: [&'static str; 2],
    chart_file: &'static str,
    chart_title: &'static str,
}

const TABLES: [Table; 4] = [
    Table {
        file: "completeness.csv",
        category: Category::Completeness,
        header: ["feature", "completeness_pct"],
        chart_file: "01_completeness.json",
        chart_title: "Completeness (%) per critical column",
    },
    Table {
        file: "uniqueness.csv",
        category: Category::Uniqueness,
        header: ["entity", "duplicates"],
        chart_file: "02_uniqueness.json",
        chart_title: "Duplicates per natural key (staging)",
    },
    Table {
        file: "validity.csv",
        category: Category::Validity,
        header: ["rule", "pass_pct"],
        chart_file: "03_validity.json",
        chart_title: "Validity: % of rows passing",
    },
    Table {
        file: "consistency.csv",
        category: Category::Consistency,
        header: ["rule", "pass_pct"],
        chart_file: "04_consistency.json",
        chart_title: "Consistency: % of rows passing",
    },
];

pub const LEAD_TIME_RULE: &str = "lead_time_days";
pub const ON_TIME_RULE: &str = "on_time_delivery_rate";

/// Write every CSV table and chart descriptor for a report.
pub fn write_report(report: &DqReport, output_dir: &Path) -> Result<EmittedFiles> {
    let csv_dir = output_dir.join("csv");
    let plots_dir = output_dir.join("plots");
    std::fs::create_dir_all(&csv_dir)?;
    std::fs::create_dir_all(&plots_dir)?;

    let mut emitted = EmittedFiles::default();

    for table in &TABLES {
        let rows = report
            .by_category(table.category)
            .map(|r| vec![r.name.clone(), cell(&r.value)])
            .collect::<Vec<_>>();
        emitted
            .csv
            .push(write_csv(&csv_dir, table.file, &table.header, &rows)?);

        let chart = ChartSpec::bar(table.chart_title, report.by_category(table.category));
        emitted
            .charts
            .push(write_chart(&plots_dir, table.chart_file, &chart)?);
    }

    let lead = report.get(LEAD_TIME_RULE).map(|r| &r.value);
    let rows: Vec<Vec<String>> = match lead {
        Some(MetricValue::Distribution(d)) => {
            d.lead_times.iter().map(|days| vec![days.to_string()]).collect()
        }
        _ => Vec::new(),
    };
    emitted.csv.push(write_csv(
        &csv_dir,
        "timeliness_leadtime.csv",
        &["lead_time_days"],
        &rows,
    )?);

    let histogram = match lead {
        Some(MetricValue::Distribution(d)) => ChartSpec {
            title: "Lead time distribution (days)".into(),
            kind: ChartKind::Histogram,
            labels: d
                .histogram
                .iter()
                .map(|b| format!("{:.1}-{:.1}", b.lower, b.upper))
                .collect(),
            values: d.histogram.iter().map(|b| Some(b.count as f64)).collect(),
        },
        _ => ChartSpec {
            title: "Lead time distribution (days)".into(),
            kind: ChartKind::Histogram,
            labels: Vec::new(),
            values: Vec::new(),
        },
    };
    emitted.charts.push(write_chart(
        &plots_dir,
        "05_timeliness_lead_hist.json",
        &histogram,
    )?);

    let on_time = report
        .get(ON_TIME_RULE)
        .map_or(MetricValue::Undefined, |r| r.value.clone());
    emitted.csv.push(write_csv(
        &csv_dir,
        "timeliness_ontime.csv",
        &["ontime_pct"],
        &[vec![cell(&on_time)]],
    )?);

    let chart = ChartSpec {
        title: "Timeliness: % of on-time deliveries".into(),
        kind: ChartKind::Bar,
        labels: vec![ON_TIME_RULE.to_string()],
        values: vec![on_time.as_f64()],
    };
    emitted
        .charts
        .push(write_chart(&plots_dir, "06_timeliness_on_time.json", &chart)?);

    tracing::info!(
        output_dir = %output_dir.display(),
        csv = emitted.csv.len(),
        charts = emitted.charts.len(),
        "Data-quality report written"
    );
    Ok(emitted)
}

fn write_csv(dir: &Path, file: &str, header: &[&str], rows: &[Vec<String>]) -> Result<PathBuf> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(header)?;
    for row in rows {
        writer.write_record(row)?;
    }
    let data = writer.into_inner().map_err(|e| e.into_error())?;
    let path = dir.join(file);
    atomic_write(&path, &data)?;
    Ok(path)
}

fn write_chart(dir: &Path, file: &str, chart: &ChartSpec) -> Result<PathBuf> {
    let data = serde_json::to_vec_pretty(chart)?;
    let path = dir.join(file);
    atomic_write(&path, &data)?;
    Ok(path)
}

fn cell(value: &MetricValue) -> String {
    match value {
        MetricValue::Percent(p) => format!("{p:.2}"),
        MetricValue::Count(c) => c.to_string(),
        MetricValue::Distribution(d) => format!("{:.2}", d.summary.median),
        MetricValue::Undefined => String::new(),
    }
}
