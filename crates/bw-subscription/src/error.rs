use std::io;
use std::path::PathBuf;

/// Failure to download a filter list.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status} from {url}")]
    UnexpectedStatus { url: String, status: u16 },
}

/// Errors of the subscription layer.
#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
    #[error("cannot read {path}: {source}")]
    CacheRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{0} is not an Adblock filter list")]
    Format(String),
    #[error("cannot load subscription: {0}")]
    Network(#[from] FetchError),
    #[error("cannot write {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("subscription \"{0}\" cannot be edited")]
    ReadOnly(String),
    #[error("rule \"{0}\" is already in the list")]
    DuplicateFilter(String),
    #[error("rule offset {offset} out of range (subscription has {len} rules)")]
    OffsetOutOfRange { offset: usize, len: usize },
    #[error("subscription \"{0}\" cannot be removed")]
    NotRemovable(String),
    #[error("unknown subscription {0}")]
    UnknownSubscription(u32),
    #[error("invalid subscription url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Errors reading or writing the engine configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot access config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T, E = SubscriptionError> = std::result::Result<T, E>;
