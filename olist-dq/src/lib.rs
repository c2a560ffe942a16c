//! # Olist DQ
//!
//! Data-quality monitoring for the Olist warehouse. A fixed catalog of
//! independent rules (completeness, uniqueness, validity, consistency,
//! timeliness) is evaluated against the store, then written out as CSV
//! tables and chart descriptors.

pub mod catalog;
pub mod engine;
pub mod error;
pub mod report;
pub mod rule;
pub mod timeliness;

pub use catalog::{BRAZILIAN_STATES, catalog};
pub use engine::{DqReport, evaluate, evaluate_concurrent};
pub use error::{DqError, Result};
pub use report::{ChartKind, ChartSpec, EmittedFiles, write_report};
pub use rule::{Category, DqRule, MetricValue, Predicate, RowSet, RuleKind, RuleResult};
pub use timeliness::{HistogramBin, LeadTimeDistribution, LeadTimeSummary};
