use inkpost::{
    AppState, Views,
    auth::ensure_admin,
    config::{AppConfig, Env},
    create_router,
    repository::{PostgresRepository, RepositoryState},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Startup order: configuration, logging, database and schema, admin seed,
/// templates, then the HTTP server. Any failure before serving aborts the process.
#[tokio::main]
async fn main() {
    // 1. Configuration (fail-fast on missing secrets)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging: RUST_LOG wins, otherwise sensible local defaults.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "inkpost=debug,tower_http=info".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 3. Database (Postgres) and idempotent schema creation.
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

    let postgres = PostgresRepository::new(pool);
    postgres
        .init_schema()
        .await
        .expect("FATAL: Failed to create database schema.");
    let repo = Arc::new(postgres) as RepositoryState;

    // 4. Seed administrator, when configured.
    if let Some(seed) = &config.admin {
        ensure_admin(repo.as_ref(), seed)
            .await
            .expect("FATAL: Failed to seed the administrator account.");
    }

    // 5. Templates are compiled once; a broken template stops startup.
    let views = Arc::new(Views::new().expect("FATAL: Failed to compile templates."));

    let bind_addr = config.bind_addr.clone();
    let app_state = AppState {
        repo,
        config,
        views,
    };

    // 6. Router and server.
    let app = create_router(app_state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .expect("FATAL: Failed to bind the HTTP listener.");

    tracing::info!("Listening on {}", bind_addr);

    axum::serve(listener, app)
        .await
        .expect("FATAL: HTTP server terminated unexpectedly.");
}
