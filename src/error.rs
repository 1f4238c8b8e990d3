use crate::model::ResourceKind;
use std::time::Duration;
use thiserror::Error;

/// Failure reported by a data source call.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error("request to {endpoint} failed: {message}")]
    Transport { endpoint: String, message: String },
    #[error("{endpoint} returned {status}: {detail}")]
    Remote {
        endpoint: String,
        status: u16,
        detail: String,
    },
    #[error("unexpected payload from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },
    #[error("{kind} {id} not found")]
    NotFound { kind: ResourceKind, id: String },
    #[error("{kind} does not support {operation}")]
    Unsupported {
        kind: ResourceKind,
        operation: &'static str,
    },
    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("background worker stopped before returning a result")]
    WorkerLost,
}

impl SourceError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Remote { status: 401, .. })
    }
}

/// The dashboard's error taxonomy; every variant except `FatalBootstrap`
/// is recovered inside the render loop.
#[derive(Debug, Error)]
pub enum DashError {
    #[error("{class} refresh failed: {source}")]
    TransientFetch {
        class: &'static str,
        #[source]
        source: SourceError,
    },
    #[error("No results for {query}; keeping the previous filter")]
    EmptyResultRejection { query: String },
    #[error("{action} failed for {target}: {source}")]
    ActionFailure {
        action: String,
        target: String,
        #[source]
        source: SourceError,
    },
    #[error("{0}")]
    FatalBootstrap(String),
}
