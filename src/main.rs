use merchant_paygate::api::{self, AppState};
use merchant_paygate::config::AppConfig;
use merchant_paygate::database::in_memory::{InMemoryMerchantStore, InMemoryOrderStore};
use merchant_paygate::database::repository::{MerchantStore, OrderStore};
use merchant_paygate::health::HealthChecker;
use merchant_paygate::logging::init_tracing;
use merchant_paygate::middleware::logging::{make_request_span, UuidRequestId};
use merchant_paygate::payments::webhook::verifier_for;
use merchant_paygate::payments::{PaymentHttpClient, ProcessorClient, TokenCache};
use merchant_paygate::services::{MerchantRegistry, OrderLifecycle, PaymentService};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

type Stores = (Arc<dyn MerchantStore>, Arc<dyn OrderStore>);

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

fn in_memory_stores() -> Stores {
    let merchants = InMemoryMerchantStore::new();
    let orders = InMemoryOrderStore::with_merchants(merchants.clone());
    (Arc::new(merchants), Arc::new(orders))
}

#[cfg(feature = "database")]
async fn build_stores(config: &AppConfig) -> anyhow::Result<Stores> {
    use merchant_paygate::database::merchant_repository::MerchantRepository;
    use merchant_paygate::database::order_repository::OrderRepository;
    use merchant_paygate::database::{init_pool_from_config, run_migrations};

    let Some(db_config) = &config.database else {
        info!("Skipping database initialization (SKIP_EXTERNALS=true), using in-memory stores");
        return Ok(in_memory_stores());
    };

    info!("Initializing database connection pool...");
    let pool = init_pool_from_config(db_config).await.map_err(|e| {
        error!("Failed to initialize database pool: {}", e);
        anyhow::anyhow!("database pool: {}", e)
    })?;
    run_migrations(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("migrations: {}", e))?;
    info!(
        max_connections = pool.options().get_max_connections(),
        "Database connection pool initialized"
    );

    Ok((
        Arc::new(MerchantRepository::new(pool.clone())),
        Arc::new(OrderRepository::new(pool)),
    ))
}

#[cfg(not(feature = "database"))]
async fn build_stores(config: &AppConfig) -> anyhow::Result<Stores> {
    if config.database.is_some() {
        anyhow::bail!("built without the `database` feature; set SKIP_EXTERNALS=true");
    }
    Ok(in_memory_stores())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    config.validate()?;
    init_tracing(&config.logging);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        processor = %config.processor.base_url,
        token_policy = ?config.gateway.token_policy,
        verify_webhook_signatures = config.gateway.verify_webhook_signatures,
        "Starting merchant payment gateway"
    );

    let (merchant_store, order_store) = build_stores(&config).await?;

    let transport = PaymentHttpClient::new(
        config.processor.timeout(),
        config.processor.accept_invalid_certs,
    )
    .map_err(|e| anyhow::anyhow!("http client: {}", e))?;
    let client = ProcessorClient::new(config.processor.clone(), Arc::new(transport));
    let tokens = TokenCache::new(
        client.clone(),
        merchant_store.clone(),
        config.gateway.token_policy,
    );

    let payments = PaymentService::new(
        MerchantRegistry::new(merchant_store.clone()),
        OrderLifecycle::new(order_store),
        client,
        tokens,
        verifier_for(config.gateway.verify_webhook_signatures),
    );
    let state = AppState {
        payments,
        health: HealthChecker::new(merchant_store),
        public_base_url: config.server.public_base_url.clone(),
    };

    let app = api::router(state).layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
            .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
            .layer(PropagateRequestIdLayer::x_request_id()),
    );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to address {}: {}", addr, e);
        e
    })?;

    info!(address = %addr, "Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}
