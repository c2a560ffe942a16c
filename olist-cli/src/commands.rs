//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use olist_core::config::{WORKSPACE_CONFIG_FILE, WarehouseConfig};
use olist_core::{PipelineReport, pipeline, store};
use olist_dq::DqReport;
use std::path::PathBuf;
use std::time::Duration;

/// Global options shared by every subcommand.
#[derive(Debug, Clone)]
pub struct Options {
    pub workspace: PathBuf,
    pub config: Option<PathBuf>,
    pub json: bool,
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Ingest,
    Transform,
    Run,
}

/// Handle a CLI subcommand.
pub async fn handle_command(command: Commands, options: &Options) -> anyhow::Result<()> {
    match command {
        Commands::Ingest => handle_pipeline(Step::Ingest, options).await,
        Commands::Transform => handle_pipeline(Step::Transform, options).await,
        Commands::Run => handle_pipeline(Step::Run, options).await,
        Commands::Monitor { output, sequential } => {
            handle_monitor(output, sequential, options).await
        }
        Commands::Config { action } => handle_config(action, options),
    }
}

fn load(options: &Options) -> anyhow::Result<WarehouseConfig> {
    let config =
        olist_core::config::load_config(Some(&options.workspace), options.config.as_deref())?;
    tracing::debug!(workspace = %options.workspace.display(), "Configuration loaded");
    Ok(config.resolve_paths(&options.workspace))
}

fn busy_timeout(config: &WarehouseConfig) -> Duration {
    Duration::from_millis(config.database.busy_timeout_ms)
}

async fn handle_pipeline(step: Step, options: &Options) -> anyhow::Result<()> {
    let config = load(options)?;
    let database = config.database.path.clone();
    let result = tokio::task::spawn_blocking(move || -> olist_core::Result<PipelineReport> {
        let mut conn = store::open(&config.database.path, busy_timeout(&config))?;
        match step {
            Step::Ingest => pipeline::ingest(&mut conn, &config),
            Step::Transform => pipeline::transform_load(&mut conn),
            Step::Run => pipeline::run(&mut conn, &config),
        }
    })
    .await?;
    let report = match result {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(
                step = ?step,
                database = %database.display(),
                error = %e,
                "Pipeline step failed"
            );
            return Err(e.into());
        }
    };
    tracing::info!(
        step = ?step,
        run_id = %report.run_id,
        dimensions = report.dimensions.len(),
        facts = report.facts.len(),
        "Pipeline step finished"
    );

    if options.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_pipeline(&report);
    }
    Ok(())
}

fn print_pipeline(report: &PipelineReport) {
    if let Some(staging) = &report.staging {
        for source in &staging.sources {
            println!(
                "  staging    {:<28} {:>8} rows  sha256:{}",
                source.table,
                source.rows,
                &source.sha256[..12.min(source.sha256.len())]
            );
        }
    }
    for dim in &report.dimensions {
        println!(
            "  dimension  {:<28} {:>8} keys  ({} skipped, {} new)",
            dim.dimension, dim.distinct_keys, dim.skipped_null_keys, dim.inserted
        );
    }
    for fact in &report.facts {
        println!(
            "  fact       {:<28} {:>8} rows  ({} of {} staging rows joined)",
            fact.fact, fact.written, fact.joined_rows, fact.source_rows
        );
    }
    println!(
        "Run {} finished in {} ms",
        report.run_id,
        (report.finished_at - report.started_at).num_milliseconds()
    );
}

async fn handle_monitor(
    output: Option<PathBuf>,
    sequential: bool,
    options: &Options,
) -> anyhow::Result<()> {
    let config = load(options)?;
    let busy = busy_timeout(&config);
    let db_path = config.database.path.clone();
    let rules = olist_dq::catalog(&config.monitoring);

    let report: DqReport = if config.monitoring.concurrent && !sequential {
        // Holding a connection keeps the WAL files in place for the readers.
        let _writer = store::open(&db_path, busy)?;
        olist_dq::evaluate_concurrent(&db_path, busy, rules).await
    } else {
        tokio::task::spawn_blocking(move || -> olist_dq::Result<DqReport> {
            let mut conn = store::open(&db_path, busy)?;
            olist_dq::evaluate(&mut conn, &rules)
        })
        .await??
    };

    let output_dir = match output {
        Some(dir) if dir.is_relative() => options.workspace.join(dir),
        Some(dir) => dir,
        None => config.monitoring.output_dir.clone(),
    };
    let emitted = olist_dq::write_report(&report, &output_dir)?;
    tracing::info!(
        run_id = %report.run_id,
        undefined = report.undefined_count(),
        tables = emitted.csv.len(),
        charts = emitted.charts.len(),
        output_dir = %output_dir.display(),
        "Monitor finished"
    );

    if options.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for result in &report.results {
            println!(
                "  {:<13} {:<42} {}",
                result.category.as_str(),
                result.name,
                result.value
            );
        }
        println!(
            "Wrote {} tables and {} charts to {}",
            emitted.csv.len(),
            emitted.charts.len(),
            output_dir.display()
        );
    }
    Ok(())
}

fn handle_config(action: ConfigAction, options: &Options) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = options.workspace.join(WORKSPACE_CONFIG_FILE);
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }
            let toml_str = toml::to_string_pretty(&WarehouseConfig::default())?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let config = load(options)?;
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}
