//! # Sales Query Engine
//!
//! A library that loads a table of sales transactions, pre-aggregates it, and answers
//! short natural-language questions about it with plain-text reports.
//!
//! ## Core Concepts
//!
//! - **Normalization**: Spreadsheet headers are mapped onto canonical columns through an alias table; fiscal years, dates and amounts are parsed leniently
//! - **Aggregation Cache**: Per-entity statistics, pairwise and fixed triple dimension tables, and per-fiscal-year comparisons are built once per load
//! - **Classification**: An ordered list of keyword and live-name rules routes each query to one handler; the first match wins
//! - **Sub-intents**: Inside a handler, a fixed vocabulary picks the kind of answer (top-N, growth, dependency, benchmark, ...)
//! - **Text Contract**: `process_query` always returns text; failures are reported with an `"Error: "` prefix
//!
//! ## Example
//!
//! ```rust,ignore
//! use sales_query_engine::*;
//!
//! let rows = vec![
//!     TransactionRow::new(100.0, 20.0)
//!         .with(EntityType::Partner, "A")
//!         .with(EntityType::Region, "North")
//!         .with_year(FiscalYear::new(2022)),
//!     TransactionRow::new(200.0, 50.0)
//!         .with(EntityType::Partner, "A")
//!         .with(EntityType::Region, "South")
//!         .with_year(FiscalYear::new(2023)),
//! ];
//!
//! let assistant = load(rows, EngineConfig::default());
//! println!("{}", process_query(&assistant, "growth for partner A in 2023"));
//! ```

pub mod assistant;
pub mod cache;
pub mod classifier;
pub mod config;
pub mod error;
pub mod handlers;
pub mod ingestion;
pub mod intent;
pub mod metrics;
pub mod normalizer;
pub mod query;
pub mod render;
pub mod schema;
pub mod stats;
pub mod utils;

pub use assistant::{DatasetStatus, SalesAssistant, SharedAssistant, Suggestions, ERROR_PREFIX};
pub use cache::{CacheBuilder, ComboKey, DimensionComboTable, SalesCache};
pub use classifier::{Classification, Classifier, NameIndex, Route, Rule, SpecialCommand, Stage};
pub use config::EngineConfig;
pub use error::{Result, SalesQueryError};
pub use ingestion::*;
pub use intent::{QuerySpec, SubIntent};
pub use metrics::{format_crores, format_percent, growth_percent, margin_percent, Growth, Metric};
pub use normalizer::{normalize_headers, normalize_table, NormalizeStats, NormalizedTable};
pub use query::QueryText;
pub use schema::*;
pub use stats::{Breakdown, EntityStatsRecord, Totals, YearComparison, YearlyStats};
pub use utils::*;

/// Builds a new assistant over `rows`.
pub fn load(rows: Vec<schema::TransactionRow>, config: EngineConfig) -> SalesAssistant {
    SalesAssistant::load(rows, config)
}

/// Answers one query against a loaded assistant. Never panics and never fails; errors
/// come back as text starting with [`ERROR_PREFIX`].
pub fn process_query(assistant: &SalesAssistant, query: &str) -> String {
    assistant.process_query(query)
}
