/*!
 * Product Service - resilient clients for the product microservice
 *
 * Consumer-side library and CLI for reaching the product service with:
 * - Pooled gRPC channels and HTTP clients
 * - Per-call timeout with deadline propagation
 * - Bounded retry with exponential backoff
 * - Per-method circuit breaking
 * - Caller identification on every attempt
 * - TOML configuration and structured logging
 */

pub mod catalog;
pub mod clients;
pub mod config;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use catalog::{CatalogPage, ProductCatalog};
pub use clients::{grpc_client, http_client};
pub use config::{GrpcSettings, HttpSettings, LogLevel, ServiceConfig};
pub use error::{CatalogError, ConfigError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
    }
}
