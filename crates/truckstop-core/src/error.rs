use thiserror::Error;

/// Failure reported by a [`DistanceProvider`](crate::distance::DistanceProvider)
/// for a single origin/destination pair.
///
/// Carries the upstream diagnostic (transport error, missing credentials,
/// empty route result) as a human-readable message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ProviderError {
    pub message: String,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors surfaced by the search components to their callers.
#[derive(Error, Debug)]
pub enum NearbyError {
    /// Caller-supplied values failed validation. No external call was made.
    #[error("{0}")]
    InvalidArgument(String),

    /// The record store could not be reached.
    #[error("record store unavailable: {0}")]
    UpstreamUnavailable(String),

    /// A distance lookup failed while the abort failure policy is active.
    #[error("distance provider failed: {0}")]
    Provider(#[from] ProviderError),

    /// The invocation was cancelled before every lookup settled.
    #[error("search cancelled")]
    Cancelled,
}

impl NearbyError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Wrap a store failure, keeping the whole `anyhow` context chain.
    pub fn upstream(err: anyhow::Error) -> Self {
        Self::UpstreamUnavailable(format!("{:#}", err))
    }
}

pub type Result<T> = std::result::Result<T, NearbyError>;
