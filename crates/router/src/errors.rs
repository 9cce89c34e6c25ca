#[derive(Debug, thiserror::Error)]
pub enum RouteResolutionError {
    #[error("Unknown table '{table}' in schema '{schema}'")]
    UnknownTable { schema: String, table: String },

    #[error("Missing schema: {0}")]
    MissingSchema(String),

    #[error("Missing sharding algorithm '{algorithm}' for table '{table}'")]
    MissingAlgorithm { table: String, algorithm: String },

    #[error("Sharding strategy: {0}")]
    Strategy(String),

    #[error("Shard index {index} out of range for table '{table}' with {count} shards")]
    ShardOutOfRange {
        table: String,
        index: usize,
        count: usize,
    },
}

pub type Result<T, E = RouteResolutionError> = std::result::Result<T, E>;

#[allow(unused_macros)]
macro_rules! strategy_err {
    ($($arg:tt)*) => {
        crate::errors::RouteResolutionError::Strategy(std::format!($($arg)*))
    };
}
pub(crate) use strategy_err;
