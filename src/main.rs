use std::net::SocketAddr;
use std::sync::Arc;

use text_enhancer::core::gate::{router, CredentialPolicy, IngressGate};
use text_enhancer::core::rate_limit::{run_purge_task, FixedWindowRateLimiter};
use text_enhancer::utils::{logger, validation::Validate};
use text_enhancer::{ConfigProvider, EnhancementProxy, ServerConfig};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = match ServerConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load configuration: {}", e);
            eprintln!("💡 {}", e.recovery_suggestion());
            std::process::exit(1);
        }
    };

    logger::init_logger(config.verbose, config.log_format);

    tracing::info!("Starting text-enhancer");
    if config.verbose {
        tracing::debug!("Server config: {:?}", config);
    }

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        std::process::exit(1);
    }

    let limiter = Arc::new(FixedWindowRateLimiter::with_system_clock(
        config.window_duration(),
        config.max_requests_per_window(),
    ));
    tokio::spawn(run_purge_task(limiter.clone(), config.window_duration()));

    let proxy = EnhancementProxy::from_config(&config)?;
    let credentials = CredentialPolicy::from_config(&config)?;

    tracing::info!(
        "Rate limit: {} requests per {}s per client, credential mode: {}, upstream schema: {}",
        config.max_requests_per_window(),
        config.window_duration_seconds,
        config.credential_mode(),
        config.upstream_schema()
    );

    let gate = IngressGate::new(Arc::new(proxy), limiter, credentials)
        .with_trust_proxy(config.trust_proxy());
    let app = router(Arc::new(gate));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.listen_port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Text enhancement API running on port {}", config.listen_port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
