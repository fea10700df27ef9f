use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Duration;
use tokio::signal;

use identity_service::{
    build_router,
    config::AppConfig,
    db,
    observability::init_tracing,
    services::{
        AuthService, PermissionCache, PgStore, RoleAggregator, ServiceError, SingleUseTokens,
        SmtpEmailService, TokenCodec,
    },
    utils::password::{HashCost, PasswordPolicy},
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), ServiceError> {
    dotenvy::dotenv().ok();

    // Fail fast on bad configuration (including short token secrets).
    let config = AppConfig::from_env()?;

    init_tracing(&config.log_level);

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "starting identity service"
    );

    let pool = db::create_pool(&config.database).await?;
    db::run_migrations(&pool).await?;

    let store = Arc::new(PgStore::new(pool));
    let codec = TokenCodec::new(&config.token)?;
    let email = Arc::new(SmtpEmailService::new(&config.smtp)?);

    let aggregator = Arc::new(RoleAggregator::new(store.clone()));
    let permissions = Arc::new(PermissionCache::new(
        aggregator,
        Duration::seconds(config.cache.permission_ttl_seconds),
    ));

    let ledger = SingleUseTokens::new(
        store.clone(),
        Duration::minutes(config.token.reset_token_ttl_minutes),
        Duration::hours(config.token.setup_token_ttl_hours),
    );

    let auth = AuthService::new(
        store.clone(),
        codec.clone(),
        ledger,
        email.clone(),
        permissions.clone(),
        PasswordPolicy::default(),
        HashCost::default(),
        config.frontend_base_url.clone(),
    );

    let state = AppState {
        config: config.clone(),
        store,
        codec,
        email,
        permissions,
        auth,
    };

    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(address = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received SIGINT, shutting down");
        },
        _ = terminate => {
            tracing::info!("received SIGTERM, shutting down");
        },
    }
}
