use coretypes::BoxError;

#[derive(Debug, thiserror::Error)]
pub enum MetadataBuildError {
    #[error("Failed to fetch catalog for schema '{schema}': {source}")]
    CatalogFetch {
        schema: String,
        #[source]
        source: BoxError,
    },

    #[error("Logical table '{table}' found on multiple data sources in schema '{schema}'")]
    DuplicateLogicalTable { schema: String, table: String },

    #[error("Rules for schema '{rules}' can't be used to build schema '{schema}'")]
    SchemaMismatch { schema: String, rules: String },

    #[error("Missing schema: {0}")]
    MissingSchema(String),

    #[error("Invalid catalog: {0}")]
    InvalidCatalog(String),
}

pub type Result<T, E = MetadataBuildError> = std::result::Result<T, E>;
