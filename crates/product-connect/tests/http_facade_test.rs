//! Integration tests for HttpProductClient
//!
//! Each test starts a real axum server on an ephemeral port and drives the
//! facade against it, so pooling, retries, timeouts and headers all go
//! through a genuine HTTP stack.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use product_connect::{ClientError, HttpClientFactory, HttpProductClient, ProductClient};
use product_core_resilience::{
    CallContext, CallPolicy, CircuitBreakerConfig, CircuitBreakerRegistry, PoolConfig,
    ResilienceError, ResilientCaller,
};
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Default)]
struct Backend {
    hits: AtomicU32,
    /// Respond 503 to this many requests before answering normally
    unavailable_for: AtomicU32,
    callers: Mutex<Vec<String>>,
    queries: Mutex<Vec<String>>,
}

impl Backend {
    fn hit(&self, headers: &HeaderMap) -> bool {
        self.hits.fetch_add(1, Ordering::SeqCst);
        if let Some(caller) = headers.get("x-caller").and_then(|v| v.to_str().ok()) {
            self.callers.lock().unwrap().push(caller.to_string());
        }
        self.unavailable_for
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn hits(&self) -> u32 {
        self.hits.load(Ordering::SeqCst)
    }
}

async fn find_product(
    State(backend): State<Arc<Backend>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if backend.hit(&headers) {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"success": false})));
    }
    match id {
        999 => (StatusCode::NOT_FOUND, Json(json!({"success": false}))),
        403 => (StatusCode::FORBIDDEN, Json(json!({"success": false}))),
        500 => (StatusCode::OK, Json(json!({"success": false}))),
        1000 => {
            tokio::time::sleep(Duration::from_secs(5)).await;
            (StatusCode::OK, Json(json!({"success": true, "data": {"id": id}})))
        }
        _ => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "id": id,
                    "name": "Standing Desk",
                    "price": 499.0,
                    "stock": 12,
                    "created_at": "2024-03-01T10:00:00Z"
                }
            })),
        ),
    }
}

async fn search_products(
    State(backend): State<Arc<Backend>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    backend.hit(&headers);
    let query = params.get("query").cloned().unwrap_or_default();
    backend.queries.lock().unwrap().push(query);
    Json(json!({"count": 3, "ids": [7, 3, 11]}))
}

async fn start_backend(backend: Arc<Backend>) -> SocketAddr {
    let app = Router::new()
        .route("/products", get(search_products))
        .route("/products/:id", get(find_product))
        .with_state(backend);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn client_for(addr: SocketAddr, caller: ResilientCaller) -> HttpProductClient {
    HttpProductClient::with_factory(
        &format!("http://{}", addr),
        HttpClientFactory::default(),
        PoolConfig::default(),
        caller,
    )
    .unwrap()
}

fn policy(retry_count: u32) -> CallPolicy {
    CallPolicy {
        timeout: Duration::from_secs(2),
        retry_count,
        retry_interval: Duration::from_millis(10),
        use_circuit_breaker: false,
    }
}

#[tokio::test]
async fn test_find_retries_until_backend_recovers() {
    let backend = Arc::new(Backend::default());
    backend.unavailable_for.store(2, Ordering::SeqCst);
    let addr = start_backend(backend.clone()).await;
    let client = client_for(addr, ResilientCaller::new(policy(3)));

    let start = Instant::now();
    let product = client
        .find_by_product_id(&CallContext::new(), 42)
        .await
        .unwrap();

    assert_eq!(product.id, 42);
    assert_eq!(product.name, "Standing Desk");
    assert_eq!(backend.hits(), 3);
    assert!(start.elapsed() >= Duration::from_millis(30));
}

#[tokio::test]
async fn test_not_found_is_terminal() {
    let backend = Arc::new(Backend::default());
    let addr = start_backend(backend.clone()).await;
    let client = client_for(addr, ResilientCaller::new(policy(3)));

    let err = client
        .find_by_product_id(&CallContext::new(), 999)
        .await
        .unwrap_err();

    assert_eq!(err, ClientError::NotFound);
    assert_eq!(backend.hits(), 1);
}

#[tokio::test]
async fn test_error_taxonomy() {
    let backend = Arc::new(Backend::default());
    let addr = start_backend(backend.clone()).await;
    let client = client_for(addr, ResilientCaller::new(policy(0)));
    let ctx = CallContext::new();

    assert_eq!(
        client.find_by_product_id(&ctx, 403).await.unwrap_err(),
        ClientError::PermissionDenied
    );
    // `success: false` envelope
    assert_eq!(
        client.find_by_product_id(&ctx, 500).await.unwrap_err(),
        ClientError::Internal
    );
}

#[tokio::test]
async fn test_caller_header_sent() {
    let backend = Arc::new(Backend::default());
    let addr = start_backend(backend.clone()).await;
    let client = client_for(addr, ResilientCaller::new(policy(0)));

    let ctx = CallContext::new().with_caller("orders::place_order");
    client.find_by_product_id(&ctx, 1).await.unwrap();

    // Default caller is the creation site of the context
    client
        .find_by_product_id(&CallContext::new(), 2)
        .await
        .unwrap();

    let callers = backend.callers.lock().unwrap();
    assert_eq!(callers[0], "orders::place_order");
    assert!(callers[1].contains("http_facade_test.rs"), "{}", callers[1]);
}

#[tokio::test]
async fn test_search_query_is_encoded() {
    let backend = Arc::new(Backend::default());
    let addr = start_backend(backend.clone()).await;
    let client = client_for(addr, ResilientCaller::new(policy(0)));

    let result = client
        .search_all_products(&CallContext::new(), "red & blue=50%")
        .await
        .unwrap();

    assert_eq!(result.ids, vec![7, 3, 11]);
    assert_eq!(result.count, 3);
    assert_eq!(backend.queries.lock().unwrap()[0], "red & blue=50%");
}

#[tokio::test]
async fn test_timeout_surfaces_deadline_exceeded() {
    let backend = Arc::new(Backend::default());
    let addr = start_backend(backend.clone()).await;
    let client = client_for(
        addr,
        ResilientCaller::new(CallPolicy {
            timeout: Duration::from_millis(150),
            ..policy(3)
        }),
    );

    let start = Instant::now();
    let err = client
        .find_by_product_id(&CallContext::new(), 1000)
        .await
        .unwrap_err();

    assert_eq!(err, ClientError::Resilience(ResilienceError::DeadlineExceeded));
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_breaker_fails_fast_on_unavailable_backend() {
    let backend = Arc::new(Backend::default());
    backend.unavailable_for.store(u32::MAX, Ordering::SeqCst);
    let addr = start_backend(backend.clone()).await;

    let breakers = CircuitBreakerRegistry::new(CircuitBreakerConfig {
        failure_threshold: 2,
        cooldown: Duration::from_secs(60),
        ..Default::default()
    });
    let caller = ResilientCaller::with_breakers(
        CallPolicy {
            use_circuit_breaker: true,
            ..policy(0)
        },
        breakers,
    );
    let client = client_for(addr, caller);
    let ctx = CallContext::new();

    for _ in 0..2 {
        assert_eq!(
            client.find_by_product_id(&ctx, 1).await.unwrap_err(),
            ClientError::Internal
        );
    }

    let err = client.find_by_product_id(&ctx, 1).await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Resilience(ResilienceError::CircuitOpen(_))
    ));
    assert_eq!(backend.hits(), 2);
}

#[tokio::test]
async fn test_client_errors_do_not_trip_breaker() {
    let backend = Arc::new(Backend::default());
    let addr = start_backend(backend.clone()).await;

    let breakers = CircuitBreakerRegistry::new(CircuitBreakerConfig {
        failure_threshold: 1,
        ..Default::default()
    });
    let caller = ResilientCaller::with_breakers(
        CallPolicy {
            use_circuit_breaker: true,
            ..policy(0)
        },
        breakers,
    );
    let client = client_for(addr, caller);
    let ctx = CallContext::new();

    for _ in 0..3 {
        assert_eq!(
            client.find_by_product_id(&ctx, 999).await.unwrap_err(),
            ClientError::NotFound
        );
    }
    assert_eq!(backend.hits(), 3);
    client.find_by_product_id(&ctx, 1).await.unwrap();
}
