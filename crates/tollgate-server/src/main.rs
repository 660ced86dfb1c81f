//! Tollgate Server Binary
//!
//! Runs the anonymous-token issuance and redemption server.

use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use tollgate_server::{
    api::auth, create_router, AppState, CachedIssuerStore, DbConfig, IssuerStore, Ledger,
    PostgresStore, RedemptionLedger, RedisLedger, RotationController, ServerConfig, ServerMetrics,
};

#[tokio::main]
async fn main() {
    // Initialize logging
    let log_level = env::var("TOLLGATE_LOG_LEVEL")
        .unwrap_or_else(|_| "info".into())
        .parse()
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    // Configuration
    let config = match env::var("TOLLGATE_CONFIG") {
        Ok(path) => ServerConfig::load(&path).expect("Failed to load config file"),
        Err(_) => ServerConfig::default(),
    };
    let db_config =
        DbConfig::load(config.db_config_path.as_deref()).expect("Failed to load db config");
    assert!(
        !db_config.connection_uri.is_empty(),
        "DATABASE_URL must be set"
    );

    let metrics = ServerMetrics::new().expect("Failed to register metrics");

    // Storage backends; unreachable databases are fatal at startup.
    let postgres = PostgresStore::new(&db_config.connection_uri, db_config.max_connection)
        .await
        .expect("Failed to connect to PostgreSQL");
    let redis = RedisLedger::new(&db_config.redis_uri)
        .await
        .expect("Failed to connect to Redis");

    let cache_ttl = db_config
        .caching
        .enabled
        .then(|| Duration::from_secs(db_config.caching.expiration_sec))
        .filter(|ttl| !ttl.is_zero());

    let issuers: Arc<dyn IssuerStore> = match cache_ttl {
        Some(ttl) => Arc::new(CachedIssuerStore::new(postgres.clone(), ttl)),
        None => Arc::new(postgres.clone()),
    };

    let mut ledger = Ledger::new(Arc::new(postgres), Arc::new(redis));
    if let Some(ttl) = cache_ttl {
        ledger = ledger.with_cache(ttl);
    }
    let ledger: Arc<dyn RedemptionLedger> = Arc::new(ledger);

    // Rotation controller; ticks every minute, retries failed phases.
    let controller = RotationController::new(
        issuers.clone(),
        metrics.clone(),
        db_config.expiration_window,
        db_config.renewal_window,
        tollgate_server::rotation::DEFAULT_PERIOD,
    );
    controller.spawn();

    info!(
        port = config.listen_port,
        expiration_window = db_config.expiration_window,
        renewal_window = db_config.renewal_window,
        caching = db_config.caching.enabled,
        "Starting tollgate server"
    );

    // Create application state
    let state = Arc::new(AppState {
        issuers,
        ledger,
        metrics,
        admission_tokens: auth::admission_tokens_from_env(),
        default_max_tokens: config.max_tokens,
    });

    // Build router
    let app = create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.listen_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    info!(addr = %addr, "Tollgate listening");

    axum::serve(listener, app).await.expect("Server error");
}
