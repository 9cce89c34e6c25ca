#[derive(Debug, thiserror::Error)]
pub enum CommonError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T, E = CommonError> = std::result::Result<T, E>;
