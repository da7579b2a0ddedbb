//! Error type for connector operations.

use thiserror::Error;

/// Errors a connector can return to the dispatcher core.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// The request was structurally invalid and will never succeed.
    #[error("connector rejected request: {0}")]
    Rejected(String),

    /// The upstream chain or node is temporarily unreachable.
    #[error("connector unavailable: {0}")]
    Unavailable(String),

    /// Any other connector-internal failure.
    #[error("{0}")]
    Internal(String),
}

/// Result type alias for connector operations.
pub type ConnectorResult<T> = std::result::Result<T, ConnectorError>;
