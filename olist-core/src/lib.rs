//! # Olist Core
//!
//! Batch ETL for the Olist e-commerce warehouse: full staging reload from CSV
//! extracts, fill-gap dimension upserts and last-write-wins fact upserts into
//! a SQLite star schema. The connection is always passed in explicitly.

pub mod config;
pub mod dimension;
pub mod error;
pub mod fact;
pub mod persistence;
pub mod pipeline;
pub mod staging;
pub mod store;
pub mod upsert;

// Re-export commonly used types at the crate root.
pub use config::{WarehouseConfig, load_config};
pub use dimension::{DimensionSpec, DimensionStats};
pub use error::{EtlError, Result};
pub use fact::{FactSpec, FactStats};
pub use pipeline::PipelineReport;
pub use staging::{STAGING_TABLES, StagingReport, StagingTable};
pub use upsert::{MergePolicy, UpsertStatement};
