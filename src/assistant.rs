//! The query boundary: a loaded dataset, the classifier, and the text contract.
//!
//! [`SalesAssistant::process_query`] always returns text. Handler errors become a
//! message starting with [`ERROR_PREFIX`]; nothing escapes as a panic or `Err`.

use crate::cache::{CacheBuilder, SalesCache};
use crate::classifier::{Classification, Classifier, NameIndex, Route};
use crate::config::EngineConfig;
use crate::error::{Result, SalesQueryError};
use crate::handlers::{dataset, entity, pair, HandlerContext};
use crate::ingestion::RawTable;
use crate::normalizer::{normalize_table, NormalizedTable};
use crate::query::QueryText;
use crate::schema::TransactionRow;
use log::{debug, info, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

/// Marker that starts every error answer.
pub const ERROR_PREFIX: &str = "Error: ";

const NO_DATA: &str = "No data loaded. Please upload a file first.";
const READY: &str = "Ready for queries!";
const WAITING: &str = "Waiting for file upload...";

/// What is loaded, in the shape of the upload status payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DatasetStatus {
    pub data_loaded: bool,
    pub rows: usize,
    /// Number of recognised canonical columns.
    pub columns: usize,
    pub years: Vec<String>,
    pub message: String,
}

impl DatasetStatus {
    fn waiting() -> Self {
        Self {
            data_loaded: false,
            rows: 0,
            columns: 0,
            years: Vec::new(),
            message: WAITING.to_string(),
        }
    }
}

/// Example questions, grouped the way a client shows them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Suggestions {
    pub basic: Vec<String>,
    pub comparisons: Vec<String>,
    pub partners: Vec<String>,
    pub oems: Vec<String>,
    pub verticals: Vec<String>,
    pub customers: Vec<String>,
}

impl Default for Suggestions {
    fn default() -> Self {
        let group = |texts: &[&str]| texts.iter().map(|text| text.to_string()).collect();
        Self {
            basic: group(&[
                "What's the total revenue?",
                "Show me top regions",
                "How many transactions do we have?",
            ]),
            comparisons: group(&[
                "Compare sales between years",
                "What's the revenue growth year over year?",
            ]),
            partners: group(&[
                "Show top partners by revenue",
                "Show regional performance for a partner",
            ]),
            oems: group(&[
                "Show top OEMs by margin",
                "Show regional performance for an OEM",
            ]),
            verticals: group(&[
                "Show top verticals by revenue",
                "Show regional performance for a vertical",
            ]),
            customers: group(&[
                "Show top customers by revenue",
                "Show regional performance for a customer",
            ]),
        }
    }
}

impl Suggestions {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        [
            &self.basic,
            &self.comparisons,
            &self.partners,
            &self.oems,
            &self.verticals,
            &self.customers,
        ]
        .into_iter()
        .flatten()
        .map(String::as_str)
    }
}

/// One immutable generation of loaded data, ready to answer queries.
#[derive(Debug)]
pub struct SalesAssistant {
    cache: SalesCache,
    names: NameIndex,
    classifier: Classifier,
    config: EngineConfig,
}

impl SalesAssistant {
    /// Builds every aggregate for `rows`. Columns are inferred from the values present.
    pub fn load(rows: Vec<TransactionRow>, config: EngineConfig) -> Self {
        Self::build(NormalizedTable::from_rows(rows), config)
    }

    /// Normalizes a raw table (header aliases, fiscal years, amounts) and builds from it.
    pub fn load_table(table: &RawTable, config: EngineConfig) -> Self {
        Self::build(normalize_table(table), config)
    }

    pub fn from_csv_path(path: impl AsRef<Path>, config: EngineConfig) -> Result<Self> {
        let table = RawTable::from_csv_path(path)?;
        Ok(Self::load_table(&table, config))
    }

    fn build(table: NormalizedTable, config: EngineConfig) -> Self {
        let cache = CacheBuilder::new(config.include_triple_combos).build(table);
        let names = NameIndex::from_cache(&cache);
        info!(
            "Sales assistant ready: {} rows, {} columns, fiscal years [{}]",
            cache.rows().len(),
            cache.columns().len(),
            cache.yearly().labels().join(", ")
        );
        Self {
            cache,
            names,
            classifier: Classifier::default(),
            config,
        }
    }

    pub fn cache(&self) -> &SalesCache {
        &self.cache
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn classify(&self, query: &str) -> Option<Classification> {
        self.classifier.classify(&QueryText::new(query), &self.names)
    }

    /// Answers `query`, turning any failure into text starting with [`ERROR_PREFIX`].
    pub fn process_query(&self, query: &str) -> String {
        match panic::catch_unwind(AssertUnwindSafe(|| self.try_process_query(query))) {
            Ok(Ok(answer)) => answer,
            Ok(Err(error)) => {
                debug!("Query '{}' failed: {}", query.trim(), error);
                format!("{}{}", ERROR_PREFIX, error)
            }
            Err(_) => {
                warn!("Handler panicked while answering '{}'", query.trim());
                let error = SalesQueryError::Internal("the query could not be answered".into());
                format!("{}{}", ERROR_PREFIX, error)
            }
        }
    }

    pub fn try_process_query(&self, query: &str) -> Result<String> {
        let text = QueryText::new(query);
        if text.is_empty() {
            return Err(SalesQueryError::EmptyQuery);
        }

        let classification = self
            .classifier
            .classify(&text, &self.names)
            .ok_or_else(|| SalesQueryError::Unclassified(query.trim().to_string()))?;

        let ctx = HandlerContext {
            cache: &self.cache,
            names: &self.names,
            config: &self.config,
            query: &text,
        };
        match classification.route {
            Route::Special(command) => dataset::run_command(&ctx, command),
            _ if self.cache.is_empty() => Err(SalesQueryError::EmptyDataset),
            Route::Entity(kind) => entity::handle(&ctx, kind),
            Route::Pair { role, entity } => pair::handle(&ctx, role, entity),
            Route::Dataset => dataset::handle(&ctx),
        }
    }

    pub fn status(&self) -> DatasetStatus {
        DatasetStatus {
            data_loaded: true,
            rows: self.cache.rows().len(),
            columns: self.cache.columns().len(),
            years: self.cache.yearly().labels(),
            message: READY.to_string(),
        }
    }

    pub fn suggestions(&self) -> Suggestions {
        Suggestions::default()
    }
}

/// The currently loaded [`SalesAssistant`], swapped whole on every reload.
///
/// Queries clone the `Arc` and release the lock before answering, so a reload never
/// waits on a slow query and a query never sees a half-built dataset.
#[derive(Debug, Default)]
pub struct SharedAssistant {
    current: RwLock<Option<Arc<SalesAssistant>>>,
}

impl SharedAssistant {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Arc<SalesAssistant>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.current().is_some()
    }

    /// Installs `assistant`, returning the generation it replaced.
    pub fn replace(&self, assistant: SalesAssistant) -> Option<Arc<SalesAssistant>> {
        let next = Arc::new(assistant);
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        current.replace(next)
    }

    pub fn reload(&self, rows: Vec<TransactionRow>, config: EngineConfig) {
        self.replace(SalesAssistant::load(rows, config));
    }

    pub fn reload_table(&self, table: &RawTable, config: EngineConfig) {
        self.replace(SalesAssistant::load_table(table, config));
    }

    pub fn process_query(&self, query: &str) -> String {
        match self.current() {
            Some(assistant) => assistant.process_query(query),
            None => format!("{}{}", ERROR_PREFIX, NO_DATA),
        }
    }

    pub fn status(&self) -> DatasetStatus {
        self.current()
            .map_or_else(DatasetStatus::waiting, |assistant| assistant.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EntityType, FiscalYear};

    fn assistant() -> SalesAssistant {
        let rows = vec![
            TransactionRow::new(100.0, 20.0)
                .with(EntityType::Partner, "Acme")
                .with(EntityType::Region, "North")
                .with_year(FiscalYear::new(2022)),
            TransactionRow::new(200.0, 50.0)
                .with(EntityType::Partner, "Acme")
                .with(EntityType::Region, "South")
                .with_year(FiscalYear::new(2023)),
        ];
        SalesAssistant::load(rows, EngineConfig::default())
    }

    #[test]
    fn test_empty_query() {
        assert_eq!(assistant().process_query("   "), "Error: No query provided");
    }

    #[test]
    fn test_unclassified_query() {
        let answer = assistant().process_query("tell me a joke");
        assert!(answer.starts_with("Error: Sorry, I could not process that query"));
    }

    #[test]
    fn test_empty_dataset_still_answers_help() {
        let empty = SalesAssistant::load(Vec::new(), EngineConfig::default());
        assert!(!empty.process_query("help").starts_with(ERROR_PREFIX));
        assert_eq!(
            empty.process_query("total revenue"),
            "Error: The loaded dataset contains no transactions"
        );
    }

    #[test]
    fn test_status() {
        let status = assistant().status();
        assert!(status.data_loaded);
        assert_eq!(status.rows, 2);
        assert_eq!(status.years, vec!["2022-23", "2023-24"]);
        assert_eq!(status.message, "Ready for queries!");
    }

    #[test]
    fn test_shared_assistant_before_and_after_load() {
        let shared = SharedAssistant::new();
        assert_eq!(
            shared.process_query("total revenue"),
            "Error: No data loaded. Please upload a file first."
        );
        assert_eq!(shared.status().message, "Waiting for file upload...");

        shared.replace(assistant());
        assert!(shared.is_loaded());
        assert!(shared.process_query("total revenue").contains("₹300.00"));
    }
}
