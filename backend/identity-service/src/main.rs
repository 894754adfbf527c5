/// Identity Service Main Entry Point
///
/// Wires the identity core to its production stores:
/// - PostgreSQL connection pool (users, roles, permissions)
/// - Redis connection manager (token revocation)
/// - RS256 token issuer
///
/// The administrative gRPC listener only carries the standard health service.
use anyhow::{Context, Result};
use identity_service::{
    config::Settings,
    db::{PgPermissionResolver, PgUserRepository},
    metrics::IdentityMetrics,
    security::RedisRevocationStore,
    IdentityService,
};
use redis_utils::RedisPool;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tonic::transport::Server;
use tonic_health::ServingStatus;
use tracing::{info, warn};

const HEALTH_SERVICE_NAME: &str = "identity.IdentityService";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "identity_service=info,info".into()),
        )
        .with_target(false)
        .json()
        .init();

    info!("Starting Identity Service");

    // Load configuration
    let settings = Settings::load().context("Failed to load configuration")?;
    info!("Configuration loaded successfully");

    // Initialize JWT issuer (RS256)
    let issuer = settings.jwt.build_issuer()?;
    info!(can_sign = issuer.can_sign(), "JWT issuer initialized");

    // Initialize database connection pool
    let db_pool = PgPoolOptions::new()
        .max_connections(settings.database.max_connections)
        .acquire_timeout(Duration::from_secs(settings.database.acquire_timeout))
        .connect(&settings.database.url)
        .await
        .context("Failed to connect to PostgreSQL")?;

    info!(
        "Database pool initialized with {} max connections",
        settings.database.max_connections
    );

    // Run database migrations
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .context("Failed to run database migrations")?;
    info!("Database migrations completed");

    // Initialize Redis connection pool
    let redis_pool = RedisPool::connect(&settings.redis.url)
        .await
        .context("Failed to connect to Redis")?;
    info!("Redis connection manager initialized");

    let metrics = IdentityMetrics::new().context("Failed to build metrics")?;
    metrics.register(prometheus::default_registry());

    let operation_timeout = settings.server.operation_timeout();
    let identity = IdentityService::new(
        Arc::new(PgUserRepository::new(db_pool.clone())),
        Arc::new(issuer),
    )
    .with_roles(Arc::new(PgPermissionResolver::new(db_pool.clone())))
    .with_revocations(Arc::new(RedisRevocationStore::new(
        redis_pool.manager(),
        operation_timeout,
    )))
    .with_metrics(metrics)
    .with_default_role(settings.rbac.default_role.clone())
    .with_operation_timeout(operation_timeout);

    if !identity.issuer().can_sign() {
        warn!("Running without a JWT private key; registration and login will be refused");
    }

    let (mut health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_service_status(HEALTH_SERVICE_NAME, ServingStatus::Serving)
        .await;

    let addr = format!("{}:{}", settings.server.host, settings.server.admin_grpc_port)
        .parse()
        .context("Invalid server address")?;

    info!("Starting admin gRPC server on {}", addr);

    Server::builder()
        .add_service(health_service)
        .serve_with_shutdown(addr, shutdown_signal())
        .await
        .context("gRPC server error")?;

    health_reporter
        .set_service_status(HEALTH_SERVICE_NAME, ServingStatus::NotServing)
        .await;
    db_pool.close().await;

    info!("Identity service shutdown complete");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
