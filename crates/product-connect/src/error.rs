//! Error types for the product-connect crate

use product_core_resilience::ResilienceError;
use thiserror::Error;

/// Domain-level failure of a product client call.
///
/// Transport details are logged where the translation happens and are not
/// carried here, except for resilience failures which propagate unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("product not found")]
    NotFound,

    #[error("permission denied")]
    PermissionDenied,

    #[error("internal error")]
    Internal,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Resilience(#[from] ResilienceError),
}

/// Failure of one HTTP attempt, before domain translation
#[derive(Error, Debug)]
pub enum HttpError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("API call failed with response: {0}")]
    Rejected(String),

    #[error("failed to decode response body: {0}")]
    Decode(String),
}
