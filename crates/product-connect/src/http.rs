//! HTTP facade for the product service REST API
//!
//! Routes:
//! - `GET {base}/products/{id}` → `{"success": bool, "data": Product}`
//! - `GET {base}/products?query=..` → `{"count": n, "ids": [..]}`

use crate::client::ProductClient;
use crate::error::{ClientError, HttpError};
use crate::metadata::CALLER_HEADER;
use crate::model::{Product, SearchResult};
use async_trait::async_trait;
use product_core_resilience::{
    CallContext, CallError, ConnectionFactory, ConnectionPool, ErrorClass, PoolConfig,
    ResilienceError, ResilientCaller,
};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// Breaker keys, one per route
pub const GET_PRODUCT: &str = "GET /products/{id}";
pub const SEARCH_PRODUCTS: &str = "GET /products";

/// Builds `reqwest` clients with a fixed timeout and keep-alive pool size
#[derive(Debug, Clone)]
pub struct HttpClientFactory {
    timeout: Duration,
    max_idle_per_host: usize,
}

impl HttpClientFactory {
    pub fn new(timeout: Duration, max_idle_per_host: usize) -> Self {
        Self {
            timeout,
            max_idle_per_host,
        }
    }
}

impl Default for HttpClientFactory {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), 200)
    }
}

#[async_trait]
impl ConnectionFactory<reqwest::Client> for HttpClientFactory {
    async fn create(&self) -> Result<reqwest::Client, ResilienceError> {
        debug!(timeout = ?self.timeout, "Building HTTP client");
        reqwest::Client::builder()
            .timeout(self.timeout)
            .pool_max_idle_per_host(self.max_idle_per_host)
            .build()
            .map_err(|e| ResilienceError::ConnectionSetup(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    data: Option<T>,
}

fn decode_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, HttpError> {
    serde_json::from_slice(body).map_err(|e| HttpError::Decode(e.to_string()))
}

fn decode_envelope<T: DeserializeOwned>(body: &[u8]) -> Result<T, HttpError> {
    let envelope: Envelope<T> = decode_json(body)?;
    match envelope {
        Envelope {
            success: true,
            data: Some(data),
        } => Ok(data),
        _ => Err(HttpError::Rejected(String::from_utf8_lossy(body).into_owned())),
    }
}

/// Transport failures and gateway errors are retried; everything else is final
pub fn classify_http(err: &HttpError) -> ErrorClass {
    match err {
        HttpError::Transport(e) if e.is_builder() => ErrorClass::Terminal,
        HttpError::Transport(_) => ErrorClass::Retryable,
        // bad gateway, service unavailable, gateway timeout
        HttpError::Status {
            status: 502 | 503 | 504,
            ..
        } => ErrorClass::Retryable,
        HttpError::Status { .. } => ErrorClass::Terminal,
        HttpError::Rejected(_) | HttpError::Decode(_) => ErrorClass::Terminal,
    }
}

fn translate(method: &str, err: CallError<HttpError>) -> ClientError {
    match err {
        CallError::Resilience(e) => ClientError::Resilience(e),
        CallError::Failed(HttpError::Status { status: 404, .. }) => ClientError::NotFound,
        CallError::Failed(HttpError::Status { status: 403, .. }) => ClientError::PermissionDenied,
        CallError::Failed(HttpError::Status { status: 400, body }) => {
            ClientError::InvalidArgument(body)
        }
        CallError::Failed(e) => {
            error!(method, error = %e, "Product service call failed");
            ClientError::Internal
        }
    }
}

/// Pooled, resilient REST client for the product service
#[derive(Debug, Clone)]
pub struct HttpProductClient {
    base_url: Url,
    pool: ConnectionPool<reqwest::Client>,
    caller: ResilientCaller,
}

impl HttpProductClient {
    pub fn new(
        base_url: &str,
        pool: ConnectionPool<reqwest::Client>,
        caller: ResilientCaller,
    ) -> Result<Self, ClientError> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| ClientError::InvalidArgument(format!("base URL {}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidArgument(format!(
                "base URL {} cannot carry a path",
                base_url
            )));
        }
        // Treat the base as a directory so joins append rather than replace
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            base_url,
            pool,
            caller,
        })
    }

    /// Build a client with its own pool of `reqwest` clients
    pub fn with_factory(
        base_url: &str,
        factory: HttpClientFactory,
        pool: PoolConfig,
        caller: ResilientCaller,
    ) -> Result<Self, ClientError> {
        let pool = ConnectionPool::new(Arc::new(factory), pool)?;
        Self::new(base_url, pool, caller)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn pool(&self) -> &ConnectionPool<reqwest::Client> {
        &self.pool
    }

    pub fn caller(&self) -> &ResilientCaller {
        &self.caller
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.base_url
            .join(path)
            .map_err(|e| ClientError::InvalidArgument(format!("path {}: {}", path, e)))
    }

    pub async fn find_by_product_id(
        &self,
        ctx: &CallContext,
        id: i64,
    ) -> Result<Product, ClientError> {
        let url = self.endpoint(&format!("products/{}", id))?;
        self.get(ctx, GET_PRODUCT, url, decode_envelope::<Product>)
            .await
    }

    pub async fn find_product_ids_by_query(
        &self,
        ctx: &CallContext,
        query: &str,
    ) -> Result<SearchResult, ClientError> {
        let mut url = self.endpoint("products")?;
        url.query_pairs_mut().append_pair("query", query);
        self.get(ctx, SEARCH_PRODUCTS, url, decode_json::<SearchResult>)
            .await
    }

    async fn get<T>(
        &self,
        ctx: &CallContext,
        method: &'static str,
        url: Url,
        decode: fn(&[u8]) -> Result<T, HttpError>,
    ) -> Result<T, ClientError> {
        let mut conn = self.pool.acquire(ctx).await?;

        let result = self
            .caller
            .invoke(ctx, method, classify_http, |attempt: &CallContext| {
                let mut request = conn
                    .get(url.clone())
                    .header(CALLER_HEADER, attempt.caller());
                if let Some(remaining) = attempt.remaining() {
                    request = request.timeout(remaining);
                }
                async move {
                    let response = request.send().await?;
                    let status = response.status();
                    let body = response.bytes().await?;
                    if !status.is_success() {
                        return Err(HttpError::Status {
                            status: status.as_u16(),
                            body: String::from_utf8_lossy(&body).into_owned(),
                        });
                    }
                    decode(&body)
                }
            })
            .await;

        if let Err(CallError::Failed(e)) = &result {
            if classify_http(e) == ErrorClass::Retryable {
                conn.mark_unhealthy();
            }
        }
        drop(conn);

        result.map_err(|e| translate(method, e))
    }
}

#[async_trait]
impl ProductClient for HttpProductClient {
    async fn find_by_product_id(&self, ctx: &CallContext, id: i64) -> Result<Product, ClientError> {
        HttpProductClient::find_by_product_id(self, ctx, id).await
    }

    async fn search_all_products(
        &self,
        ctx: &CallContext,
        query: &str,
    ) -> Result<SearchResult, ClientError> {
        self.find_product_ids_by_query(ctx, query).await
    }
}
