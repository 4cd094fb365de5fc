/*!
 * Product catalog: the consumer-side usecase built on a ProductClient
 */

use crate::error::CatalogError;
use futures::stream::{self, StreamExt};
use product_connect::{Product, ProductClient};
use product_core_resilience::CallContext;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Default number of lookups in flight for a multi-id fetch
pub const DEFAULT_CONCURRENCY: usize = 8;

/// One page of search results, in the order the service ranked them
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogPage {
    pub products: Vec<Product>,
    /// Total matches reported by the service
    pub count: i64,
}

pub struct ProductCatalog {
    client: Arc<dyn ProductClient>,
    concurrency: usize,
}

impl ProductCatalog {
    pub fn new(client: Arc<dyn ProductClient>) -> Self {
        Self {
            client,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Bound the fan-out of [`find_all_by_ids`](Self::find_all_by_ids); at least 1
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub async fn find_by_id(&self, ctx: &CallContext, id: i64) -> Result<Product, CatalogError> {
        Ok(self.client.find_by_product_id(ctx, id).await?)
    }

    /// Fetch each id with at most `concurrency` lookups in flight.
    ///
    /// Results keep the input order. Ids that fail are logged and skipped.
    pub async fn find_all_by_ids(&self, ctx: &CallContext, ids: &[i64]) -> Vec<Product> {
        let results: Vec<_> = stream::iter(ids.iter().copied())
            .map(|id| async move { (id, self.client.find_by_product_id(ctx, id).await) })
            .buffered(self.concurrency)
            .collect()
            .await;

        results
            .into_iter()
            .filter_map(|(id, result)| match result {
                Ok(product) => Some(product),
                Err(e) => {
                    warn!(id, error = %e, "Skipping product that failed to load");
                    None
                }
            })
            .collect()
    }

    /// Resolve a free-text query to full products
    pub async fn search(&self, ctx: &CallContext, query: &str) -> Result<CatalogPage, CatalogError> {
        let result = self.client.search_all_products(ctx, query).await?;
        debug!(query, count = result.count, ids = result.ids.len(), "Search returned");
        if result.ids.is_empty() {
            return Err(CatalogError::NotFound);
        }

        let products = self.find_all_by_ids(ctx, &result.ids).await;
        if products.is_empty() {
            return Err(CatalogError::NotFound);
        }
        Ok(CatalogPage {
            products,
            count: result.count,
        })
    }
}
