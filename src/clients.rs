/*!
 * Builds the transport facades from configuration
 */

use crate::config::{BreakerSettings, CallSettings, GrpcSettings, HttpSettings};
use product_connect::{ClientError, GrpcProductClient, HttpClientFactory, HttpProductClient};
use product_core_resilience::{CircuitBreakerRegistry, ResilientCaller};
use tracing::info;

fn resilient_caller(call: &CallSettings, breaker: &BreakerSettings) -> ResilientCaller {
    ResilientCaller::with_breakers(
        call.to_call_policy(),
        CircuitBreakerRegistry::new(breaker.to_breaker_config()),
    )
}

/// gRPC facade with its own channel pool and breaker registry
pub fn grpc_client(settings: &GrpcSettings) -> Result<GrpcProductClient, ClientError> {
    let mut client = GrpcProductClient::from_target(
        &settings.target,
        settings.connect_timeout(),
        settings.pool.to_pool_config(),
        resilient_caller(&settings.call, &settings.breaker),
    )?;
    if let Some(auth) = settings.basic_auth() {
        info!(username = auth.username(), "Using basic auth for gRPC calls");
        client = client.with_basic_auth(auth);
    }
    info!(target = %settings.target, "gRPC product client ready");
    Ok(client)
}

/// HTTP facade with its own pool of `reqwest` clients
pub fn http_client(settings: &HttpSettings) -> Result<HttpProductClient, ClientError> {
    let client = HttpProductClient::with_factory(
        &settings.base_url,
        HttpClientFactory::new(settings.request_timeout(), settings.max_idle_per_host),
        settings.pool.to_pool_config(),
        resilient_caller(&settings.call, &settings.breaker),
    )?;
    info!(base_url = %client.base_url(), "HTTP product client ready");
    Ok(client)
}
