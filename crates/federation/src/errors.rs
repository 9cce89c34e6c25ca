use coretypes::BoxError;
use router::errors::RouteResolutionError;
use rulestore::types::DataNode;
use schemameta::errors::MetadataBuildError;

/// A statement couldn't be planned for federated execution.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("Statement has no tables")]
    EmptyFrom,

    #[error("Table name or alias '{0}' specified more than once")]
    DuplicateReference(String),

    #[error("Unknown table qualifier: {0}")]
    UnknownQualifier(String),

    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Ambiguous column: {0}")]
    AmbiguousColumn(String),

    #[error("Unsupported join predicate: {0}")]
    UnsupportedJoin(String),

    #[error("Column '{0}' must appear in GROUP BY or be used in an aggregate")]
    NotGrouped(String),

    #[error("Invalid aggregate: {0}")]
    InvalidAggregate(String),
}

/// Failure of a single physical sub-query.
#[derive(Debug, thiserror::Error)]
#[error("Failed to execute sub-query on '{target}': {source}")]
pub struct FederationExecutionError {
    pub target: DataNode,
    #[source]
    pub source: BoxError,
}

#[derive(Debug, thiserror::Error)]
pub enum FederationError {
    #[error(transparent)]
    Route(#[from] RouteResolutionError),

    #[error(transparent)]
    Metadata(#[from] MetadataBuildError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Execution(#[from] FederationExecutionError),

    #[error("Federated execution cancelled")]
    Cancelled,

    #[error("Aggregate: {0}")]
    Aggregate(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T, E = FederationError> = std::result::Result<T, E>;

#[allow(unused_macros)]
macro_rules! internal {
    ($($arg:tt)*) => {
        crate::errors::FederationError::Internal(std::format!($($arg)*))
    };
}
pub(crate) use internal;
