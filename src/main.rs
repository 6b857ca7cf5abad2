use social_portal::{
    AppState,
    config::{AppConfig, Env},
    create_router,
    erasure::{ErasureEngine, ErasureStoreState, PgErasureStore},
    repository::{PostgresRepository, RepositoryState},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Entry point: configuration, logging, database, erasure engine, then the
/// HTTP server.
#[tokio::main]
async fn main() {
    // 1. Configuration & Environment Loading (Fail-Fast)
    dotenv::dotenv().ok();

    // 2. Logging Filter Setup
    // RUST_LOG wins; otherwise sensible defaults for local development.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "social_portal=debug,tower_http=info,sqlx=warn".into());

    // 3. Initialize Logging based on Environment
    // Resolved before AppConfig::load so its warnings about malformed
    // variables already go through the subscriber.
    match Env::from_env() {
        Env::Production => {
            // PROD: JSON lines for the log aggregator.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        Env::Local => {
            // LOCAL: Pretty print output for human readability.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    // 4. Load Application Configuration (panics on missing required vars)
    let config = AppConfig::load();
    tracing::info!("Application starting in {:?} mode", config.env);
    tracing::info!(
        batch_size = config.erasure.batch_size,
        batch_delay_ms = config.erasure.batch_delay.as_millis() as u64,
        tx_timeout_secs = config.erasure.transaction_timeout.as_secs(),
        soft_delete_checkpoint = config.erasure.soft_delete_checkpoint,
        "erasure engine configured"
    );

    // 5. Database Initialization (Postgres)
    // Pool size comes from DATABASE_MAX_CONNECTIONS; each erasure holds one
    // connection for its whole transaction.
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

    // Schema is embedded at compile time and applied before serving.
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("FATAL: Failed to apply database migrations.");

    // 6. Repository Layer (user lookups for the auth extractor)
    let repo = Arc::new(PostgresRepository::new(pool.clone())) as RepositoryState;

    // 7. Erasure Engine
    // Shares the pool with the repository; the store is the only writer.
    let store = Arc::new(PgErasureStore::new(pool)) as ErasureStoreState;
    let erasure = ErasureEngine::new(store, config.erasure.clone());

    // 8. Unified State Assembly
    let bind_addr = config.bind_addr.clone();
    let app_state = AppState {
        repo,
        erasure,
        config,
    };

    // 9. Router and Server Startup
    let app = create_router(app_state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .expect("FATAL: Failed to bind the HTTP listener. Check BIND_ADDR.");

    tracing::info!("Listening on {}", bind_addr);
    tracing::info!("API Documentation (Swagger UI) available at: http://{}/swagger-ui", bind_addr);

    axum::serve(listener, app)
        .await
        .expect("FATAL: HTTP server terminated unexpectedly.");
}
