use crate::error::{Result, SalesQueryError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tunables for answering queries. Every field has a default, so `{}` is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct EngineConfig {
    #[schemars(description = "How many items a ranking shows when the query gives no number")]
    pub default_top_n: usize,

    #[schemars(description = "Upper bound for an explicit 'top N' in a query")]
    pub max_top_n: usize,

    #[schemars(
        description = "How many valid names to suggest when a named entity cannot be found"
    )]
    pub sample_names: usize,

    #[schemars(
        description = "How many of the largest contributors are summed in a concentration answer"
    )]
    pub concentration_top_k: usize,

    #[schemars(description = "Maximum number of names printed by a list answer")]
    pub list_limit: usize,

    #[schemars(
        description = "Similarity (0.0 to 1.0, Jaro-Winkler) above which a misspelt name is accepted as a match"
    )]
    pub fuzzy_match_threshold: f64,

    #[schemars(
        description = "Whether the fixed three-dimension combination tables are precomputed on load"
    )]
    pub include_triple_combos: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_top_n: 5,
            max_top_n: 50,
            sample_names: 5,
            concentration_top_k: 3,
            list_limit: 25,
            fuzzy_match_threshold: 0.92,
            include_triple_combos: true,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_top_n == 0 {
            return Err(SalesQueryError::InvalidConfig(
                "default_top_n must be at least 1".to_string(),
            ));
        }
        if self.max_top_n < self.default_top_n {
            return Err(SalesQueryError::InvalidConfig(format!(
                "max_top_n ({}) is smaller than default_top_n ({})",
                self.max_top_n, self.default_top_n
            )));
        }
        if self.sample_names == 0 || self.concentration_top_k == 0 || self.list_limit == 0 {
            return Err(SalesQueryError::InvalidConfig(
                "sample_names, concentration_top_k and list_limit must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.fuzzy_match_threshold) {
            return Err(SalesQueryError::InvalidConfig(format!(
                "fuzzy_match_threshold must be between 0 and 1, got {}",
                self.fuzzy_match_threshold
            )));
        }
        Ok(())
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(EngineConfig)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}
