use thiserror::Error;

#[derive(Error, Debug)]
pub enum SalesQueryError {
    #[error("No {entity} named '{name}' was found. Try one of: {}", .samples.join(", "))]
    EntityNotFound {
        entity: String,
        name: String,
        samples: Vec<String>,
    },

    #[error("Please name a specific {entity}. For example: {}", .samples.join(", "))]
    MissingEntityName { entity: String, samples: Vec<String> },

    #[error("No data for fiscal year {year}. Available years: {}", .available.join(", "))]
    YearNotFound { year: String, available: Vec<String> },

    #[error("Not enough yearly history for {subject}: at least two fiscal years are needed")]
    InsufficientYears { subject: String },

    #[error("The loaded dataset has no '{0}' column")]
    MissingColumn(String),

    #[error("The loaded dataset contains no transactions")]
    EmptyDataset,

    #[error("No query provided")]
    EmptyQuery,

    #[error("Sorry, I could not process that query: '{0}'. Try asking about partners, OEMs, regions, verticals, customers, channels or a named business head / manager / champ.")]
    Unclassified(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Internal error while answering the query: {0}")]
    Internal(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SalesQueryError>;
