/*!
 * Error types for the product service clients
 */

use product_connect::ClientError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FATAL: i32 = 1;
pub const EXIT_NOT_FOUND: i32 = 2;
pub const EXIT_UNAVAILABLE: i32 = 3;

/// Failure to load or validate configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Outcome of a catalog lookup, matched exhaustively by consumers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("product not found")]
    NotFound,

    #[error("permission denied")]
    PermissionDenied,

    #[error("invalid request: {0}")]
    InvalidArgument(String),

    /// The product service could not be reached in time, or the breaker is open
    #[error("product service unavailable: {0}")]
    Unavailable(String),

    #[error("internal error")]
    Internal,
}

impl CatalogError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CatalogError::NotFound => EXIT_NOT_FOUND,
            CatalogError::Unavailable(_) => EXIT_UNAVAILABLE,
            CatalogError::PermissionDenied
            | CatalogError::InvalidArgument(_)
            | CatalogError::Internal => EXIT_FATAL,
        }
    }
}

impl From<ClientError> for CatalogError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::NotFound => CatalogError::NotFound,
            ClientError::PermissionDenied => CatalogError::PermissionDenied,
            ClientError::InvalidArgument(msg) => CatalogError::InvalidArgument(msg),
            ClientError::Resilience(e) => CatalogError::Unavailable(e.to_string()),
            ClientError::Internal => CatalogError::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use product_core_resilience::ResilienceError;

    #[test]
    fn test_client_error_mapping() {
        assert_eq!(
            CatalogError::from(ClientError::NotFound),
            CatalogError::NotFound
        );
        assert_eq!(
            CatalogError::from(ClientError::Resilience(ResilienceError::CircuitOpen(
                "FindByProductID".into()
            ))),
            CatalogError::Unavailable("circuit breaker is open for FindByProductID".into())
        );
        assert_eq!(CatalogError::NotFound.exit_code(), EXIT_NOT_FOUND);
        assert_eq!(CatalogError::Internal.exit_code(), EXIT_FATAL);
    }
}
