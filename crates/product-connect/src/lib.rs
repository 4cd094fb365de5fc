//! Product Connect: Typed clients for calling the product service
//!
//! This crate provides the client-side facades other services use to reach the
//! product service over gRPC or HTTP. Every call is pooled and runs through
//! [`product_core_resilience::ResilientCaller`] (timeout, optional circuit
//! breaker, bounded retry) with caller identification attached.
//!
//! # Architecture
//!
//! - **GrpcProductClient**: pooled tonic stubs for `pb.product_service.ProductService`
//! - **HttpProductClient**: pooled `reqwest` clients for the REST routes
//! - **ProductClient**: the transport-agnostic trait both implement
//!
//! # Example
//!
//! ```rust,no_run
//! use product_connect::{HttpClientFactory, HttpProductClient, ProductClient};
//! use product_core_resilience::{CallContext, CallPolicy, PoolConfig, ResilientCaller};
//!
//! async fn example() -> Result<(), product_connect::ClientError> {
//!     let client = HttpProductClient::with_factory(
//!         "http://10.0.0.5:8080",
//!         HttpClientFactory::default(),
//!         PoolConfig::default(),
//!         ResilientCaller::new(CallPolicy::default()),
//!     )?;
//!
//!     let product = client.find_by_product_id(&CallContext::new(), 42).await?;
//!     println!("{} in stock", product.stock);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod error;
pub mod grpc;
pub mod http;
pub mod metadata;
pub mod model;

pub use client::ProductClient;
pub use error::{ClientError, HttpError};
pub use grpc::{ChannelFactory, GrpcProductClient, ProductRpc};
pub use http::{HttpClientFactory, HttpProductClient};
pub use metadata::BasicAuth;
pub use model::{Product, SearchResult};
