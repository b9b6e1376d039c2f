/// Identity Core Main Entry Point
///
/// Starts the HTTP API with:
/// - PostgreSQL identity store (migrations applied at startup)
/// - Redis challenge store for OTP codes
/// - SMS gateway behind a circuit breaker (log-only when unconfigured)
use anyhow::{Context, Result};
use identity_core::{
    adapters::{sms::gateway_from_settings, RedisChallengeStore},
    config::Settings,
    db::PgIdentityStore,
    http::{start_http_server, AppState},
    security::TotpGenerator,
    services::{AuthorizationEngine, LoginService, OtpAuthenticator, SecondFactorManager},
    RequestGate, TokenIssuer,
};
use redis_utils::RedisPool;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "identity_core=info,info".into()),
        )
        .with_target(false)
        .json()
        .init();

    info!("Starting Identity Core");

    // Load configuration
    let settings = Settings::load().context("Failed to load configuration")?;
    info!("Configuration loaded successfully");

    // Signing key lives only inside the issuer
    let tokens = Arc::new(
        TokenIssuer::new(&settings.jwt.secret, settings.jwt.lifetimes())
            .context("Failed to initialize token issuer")?,
    );

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

    let identity_store = Arc::new(PgIdentityStore::new(db_pool));
    let challenges = Arc::new(RedisChallengeStore::new(redis_pool.manager()));
    let gateway = gateway_from_settings(&settings.sms).context("Failed to build SMS gateway")?;

    let otp = OtpAuthenticator::new(challenges.clone(), gateway, &settings.otp);
    let second_factor = SecondFactorManager::new(
        identity_store.clone(),
        TotpGenerator::new(settings.totp.issuer.clone()),
        settings.authz.store_timeout(),
    );
    let login = LoginService::new(
        otp,
        second_factor,
        identity_store.clone(),
        challenges,
        tokens.clone(),
        settings.authz.store_timeout(),
    );
    let authz = AuthorizationEngine::new(identity_store, settings.authz.store_timeout());
    let gate = RequestGate::new(tokens, authz);

    start_http_server(
        AppState { login, gate },
        &settings.server.host,
        settings.server.port,
        shutdown_signal(),
    )
    .await
    .context("HTTP server error")?;

    info!("Identity core shutdown complete");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to install SIGTERM handler: {}", err);
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

    info!("Shutting down gracefully...");
}
