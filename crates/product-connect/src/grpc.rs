//! gRPC facade for `pb.product_service.ProductService`
//!
//! Each method acquires a pooled stub, then runs the unary RPC through the
//! [`ResilientCaller`]. Every attempt carries the caller identity, optional
//! basic-auth credentials and a `grpc-timeout` derived from what is left of
//! the call budget.

use crate::client::ProductClient;
use crate::error::ClientError;
use crate::metadata::{self, BasicAuth};
use crate::model::{Product, SearchResult};
use async_trait::async_trait;
use product_core_resilience::{
    CallContext, CallError, ConnectionFactory, ConnectionPool, ErrorClass, PoolConfig,
    ResilienceError, ResilientCaller,
};
use product_proto as pb;
use product_proto::product_service_client::ProductServiceClient;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tonic::transport::{Channel, Endpoint};
use tonic::{Code, Request, Status};
use tracing::{debug, error};

/// Breaker keys, one per remote method
pub const FIND_BY_PRODUCT_ID: &str = "FindByProductID";
pub const SEARCH_ALL_PRODUCTS: &str = "SearchAllProducts";
pub const FIND_ALL_PRODUCTS_BY_IDS: &str = "FindAllProductsByIDs";

/// The unary stub surface the facade needs.
///
/// Implemented for the generated [`ProductServiceClient`]; tests substitute an
/// in-memory fake.
#[async_trait]
pub trait ProductRpc: Clone + Send + Sync + 'static {
    async fn find_by_product_id(
        &mut self,
        request: Request<pb::FindByIdRequest>,
    ) -> Result<pb::Product, Status>;

    async fn search_all_products(
        &mut self,
        request: Request<pb::ProductSearchRequest>,
    ) -> Result<pb::SearchResponse, Status>;

    async fn find_all_products_by_ids(
        &mut self,
        request: Request<pb::FindByIDsRequest>,
    ) -> Result<pb::Products, Status>;
}

#[async_trait]
impl ProductRpc for ProductServiceClient<Channel> {
    async fn find_by_product_id(
        &mut self,
        request: Request<pb::FindByIdRequest>,
    ) -> Result<pb::Product, Status> {
        ProductServiceClient::<Channel>::find_by_product_id(self, request)
            .await
            .map(tonic::Response::into_inner)
    }

    async fn search_all_products(
        &mut self,
        request: Request<pb::ProductSearchRequest>,
    ) -> Result<pb::SearchResponse, Status> {
        ProductServiceClient::<Channel>::search_all_products(self, request)
            .await
            .map(tonic::Response::into_inner)
    }

    async fn find_all_products_by_ids(
        &mut self,
        request: Request<pb::FindByIDsRequest>,
    ) -> Result<pb::Products, Status> {
        // Generated name for `FindAllProductsByIDs`
        ProductServiceClient::<Channel>::find_all_products_by_i_ds(self, request)
            .await
            .map(tonic::Response::into_inner)
    }
}

/// Opens one channel to the product service per pooled connection.
///
/// Channels connect lazily on their first request, so an unreachable backend
/// surfaces as `UNAVAILABLE` inside the attempt where the retry loop, the call
/// timeout and the circuit breaker all see it.
#[derive(Debug, Clone)]
pub struct ChannelFactory {
    endpoint: Endpoint,
}

impl ChannelFactory {
    pub fn new(target: &str, connect_timeout: Duration) -> Result<Self, ClientError> {
        let endpoint = Endpoint::from_shared(target.to_string())
            .map_err(|e| ClientError::InvalidArgument(format!("gRPC target {}: {}", target, e)))?
            .connect_timeout(connect_timeout);
        Ok(Self { endpoint })
    }
}

#[async_trait]
impl ConnectionFactory<ProductServiceClient<Channel>> for ChannelFactory {
    async fn create(&self) -> Result<ProductServiceClient<Channel>, ResilienceError> {
        debug!(endpoint = %self.endpoint.uri(), "Opening channel to product service");
        Ok(ProductServiceClient::new(self.endpoint.connect_lazy()))
    }
}

/// Only an unavailable backend is worth another attempt
pub fn classify_status(status: &Status) -> ErrorClass {
    match status.code() {
        Code::Unavailable => ErrorClass::Retryable,
        _ => ErrorClass::Terminal,
    }
}

fn translate(method: &str, err: CallError<Status>) -> ClientError {
    match err {
        CallError::Resilience(e) => ClientError::Resilience(e),
        CallError::Failed(status) => match status.code() {
            Code::NotFound => ClientError::NotFound,
            Code::PermissionDenied => ClientError::PermissionDenied,
            Code::InvalidArgument => ClientError::InvalidArgument(status.message().to_string()),
            Code::DeadlineExceeded => ClientError::Resilience(ResilienceError::DeadlineExceeded),
            _ => {
                error!(method, error = %status, "Product service call failed");
                ClientError::Internal
            }
        },
    }
}

/// Pooled, resilient gRPC client for the product service.
///
/// Cheap to clone; clones share the pool and circuit breakers.
///
/// # Example
///
/// ```rust,no_run
/// use product_connect::GrpcProductClient;
/// use product_core_resilience::{CallContext, CallPolicy, PoolConfig, ResilientCaller};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), product_connect::ClientError> {
/// let client = GrpcProductClient::from_target(
///     "http://10.0.0.5:50051",
///     Duration::from_secs(5),
///     PoolConfig::default(),
///     ResilientCaller::new(CallPolicy::default()),
/// )?;
///
/// let product = client.find_by_product_id(&CallContext::new(), 42).await?;
/// println!("{}", product.name);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct GrpcProductClient<C: ProductRpc = ProductServiceClient<Channel>> {
    pool: ConnectionPool<C>,
    caller: ResilientCaller,
    auth: Option<BasicAuth>,
}

impl GrpcProductClient<ProductServiceClient<Channel>> {
    /// Build a client whose pool dials `target` on demand
    pub fn from_target(
        target: &str,
        connect_timeout: Duration,
        pool: PoolConfig,
        caller: ResilientCaller,
    ) -> Result<Self, ClientError> {
        let factory = ChannelFactory::new(target, connect_timeout)?;
        let pool = ConnectionPool::new(Arc::new(factory), pool)?;
        Ok(Self::new(pool, caller))
    }
}

impl<C: ProductRpc> GrpcProductClient<C> {
    pub fn new(pool: ConnectionPool<C>, caller: ResilientCaller) -> Self {
        Self {
            pool,
            caller,
            auth: None,
        }
    }

    /// Send `authorization: Basic ...` with every call
    pub fn with_basic_auth(mut self, auth: BasicAuth) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn pool(&self) -> &ConnectionPool<C> {
        &self.pool
    }

    pub fn caller(&self) -> &ResilientCaller {
        &self.caller
    }

    pub async fn find_by_product_id(
        &self,
        ctx: &CallContext,
        id: i64,
    ) -> Result<Product, ClientError> {
        let product = self
            .unary(
                ctx,
                FIND_BY_PRODUCT_ID,
                pb::FindByIdRequest { id },
                |mut client: C, request| async move { client.find_by_product_id(request).await },
            )
            .await?;
        Ok(product.into())
    }

    pub async fn search_all_products(
        &self,
        ctx: &CallContext,
        query: &str,
    ) -> Result<SearchResult, ClientError> {
        let message = pb::ProductSearchRequest {
            query: query.to_string(),
            ..Default::default()
        };
        let response = self
            .unary(
                ctx,
                SEARCH_ALL_PRODUCTS,
                message,
                |mut client: C, request| async move { client.search_all_products(request).await },
            )
            .await?;
        Ok(response.into())
    }

    pub async fn find_all_products_by_ids(
        &self,
        ctx: &CallContext,
        ids: &[i64],
    ) -> Result<Vec<Product>, ClientError> {
        let message = pb::FindByIDsRequest { ids: ids.to_vec() };
        let response = self
            .unary(
                ctx,
                FIND_ALL_PRODUCTS_BY_IDS,
                message,
                |mut client: C, request| async move {
                    client.find_all_products_by_ids(request).await
                },
            )
            .await?;
        Ok(response.products.into_iter().map(Product::from).collect())
    }

    async fn unary<Req, Resp, F, Fut>(
        &self,
        ctx: &CallContext,
        method: &'static str,
        message: Req,
        call: F,
    ) -> Result<Resp, ClientError>
    where
        Req: Clone,
        F: Fn(C, Request<Req>) -> Fut,
        Fut: Future<Output = Result<Resp, Status>>,
    {
        let mut conn = self.pool.acquire(ctx).await?;

        let result = self
            .caller
            .invoke(ctx, method, classify_status, |attempt: &CallContext| {
                let mut request = Request::new(message.clone());
                if let Some(remaining) = attempt.remaining() {
                    request.set_timeout(remaining);
                }
                metadata::attach_grpc(&mut request, attempt.caller(), self.auth.as_ref());
                call((*conn).clone(), request)
            })
            .await;

        if let Err(CallError::Failed(status)) = &result {
            if classify_status(status) == ErrorClass::Retryable {
                conn.mark_unhealthy();
            }
        }
        drop(conn);

        result.map_err(|e| translate(method, e))
    }
}

#[async_trait]
impl<C: ProductRpc> ProductClient for GrpcProductClient<C> {
    async fn find_by_product_id(&self, ctx: &CallContext, id: i64) -> Result<Product, ClientError> {
        GrpcProductClient::find_by_product_id(self, ctx, id).await
    }

    async fn search_all_products(
        &self,
        ctx: &CallContext,
        query: &str,
    ) -> Result<SearchResult, ClientError> {
        GrpcProductClient::search_all_products(self, ctx, query).await
    }
}
