//! Binary entry point: loads configuration, materializes connectors from
//! the external loader, and runs the remote session and thin HTTP front
//! end side by side until either a shutdown signal or the HTTP server
//! exits.

use std::sync::Arc;

use connector_host::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    init_tracing(&config)?;

    let registry = Registry::new_with_resilience(
        connector_host::cache::TtlCache::new(
            config.cache.capacity,
            std::time::Duration::from_millis(config.cache.default_ttl_ms),
        ),
        connector_host::breaker::BreakerConfig::from(&config.breaker),
        connector_host::facade::CacheTtls::from(&config.cache),
    );

    connector_host::loader::load_connectors(&registry, &config.loader).await?;
    tracing::info!(count = registry.ids().len(), "connectors loaded");

    let session_client = connector_host::session::SessionClient::new(config.session.clone(), registry.clone())?;
    let session_handle = tokio::spawn(Arc::clone(&session_client).run());

    let jwt_auth = connector_host::middleware::JwtAuth::new(&config.auth)?;
    let router = connector_host::http::router(registry, jwt_auth);
    let server = Server::new(config.clone());

    let serve_result = server.serve(router).await;

    session_client.shutdown();
    let _ = session_handle.await;
    shutdown_tracing();

    serve_result
}
