//! Transport-agnostic client interface

use crate::error::ClientError;
use crate::model::{Product, SearchResult};
use async_trait::async_trait;
use product_core_resilience::CallContext;

/// Operations other services use to reach the product service.
///
/// Implemented by [`GrpcProductClient`](crate::GrpcProductClient) and
/// [`HttpProductClient`](crate::HttpProductClient), so consumers can be wired
/// to either transport.
#[async_trait]
pub trait ProductClient: Send + Sync {
    async fn find_by_product_id(&self, ctx: &CallContext, id: i64) -> Result<Product, ClientError>;

    async fn search_all_products(
        &self,
        ctx: &CallContext,
        query: &str,
    ) -> Result<SearchResult, ClientError>;
}
