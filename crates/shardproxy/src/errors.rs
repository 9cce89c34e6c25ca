use common::errors::CommonError;
use federation::errors::FederationError;
use router::errors::RouteResolutionError;
use rulestore::bus::BusError;
use rulestore::errors::RuleStoreError;
use schemameta::errors::MetadataBuildError;

#[derive(Debug, thiserror::Error)]
pub enum ShardProxyError {
    #[error(transparent)]
    RuleStore(#[from] RuleStoreError),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Metadata(#[from] MetadataBuildError),

    #[error(transparent)]
    Route(#[from] RouteResolutionError),

    #[error(transparent)]
    Federation(#[from] FederationError),

    #[error(transparent)]
    Config(#[from] CommonError),
}

pub type Result<T, E = ShardProxyError> = std::result::Result<T, E>;
