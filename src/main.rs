mod config;
mod db;
mod dtos;
mod error;
mod handler;
mod middleware;
mod models;
mod routes;
mod service;
mod utils;

use std::{str::FromStr, sync::Arc, time::Duration};

use axum::http::{header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE}, HeaderValue, Method};
use config::Config;
use crate::db::db::DBClient;
use dotenv::dotenv;
use routes::create_router;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::filter::LevelFilter;

use service::{deal_service::DealService, presence_service::PresenceService};

#[derive(Clone)]
pub struct AppState {
    pub env: Config,
    pub db_client: Arc<DBClient>,
    // Services
    pub deal_service: Arc<DealService>,
    pub presence_service: Arc<PresenceService>,
}

impl AppState {
    pub fn new(db_client: DBClient, config: Config) -> Self {
        let db_client_arc = Arc::new(db_client);

        let deal_service = Arc::new(DealService::new(
            db_client_arc.clone(),
            chrono::Duration::minutes(config.offer_window_minutes),
            Duration::from_millis(config.lock_timeout_ms),
        ));

        let presence_service = Arc::new(PresenceService::new(
            db_client_arc.redis_client.clone(),
            Duration::from_secs(config.typing_ttl_seconds),
        ));

        Self {
            env: config,
            db_client: db_client_arc,
            deal_service,
            presence_service,
        }
    }
}

#[tokio::main]
async fn main() {
    dotenv().ok();

    let config = Config::init();

    let level = LevelFilter::from_str(&config.log_level).unwrap_or(LevelFilter::DEBUG);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .init();

    let pool = match PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
    {
        Ok(pool) => {
            tracing::info!(
                "Connection to the database is successful (max connections: {})",
                config.db_max_connections
            );
            pool
        }
        Err(err) => {
            tracing::error!("Failed to connect to the database: {:?}", err);
            std::process::exit(1);
        }
    };

    if let Err(err) = sqlx::migrate!().run(&pool).await {
        tracing::error!("Failed to run database migrations: {:?}", err);
        std::process::exit(1);
    }

    let db_client = match &config.redis_url {
        Some(redis_url) => {
            let client = DBClient::with_redis(pool, redis_url).await;
            if !client.is_redis_available() {
                tracing::warn!("Redis unavailable, typing presence kept in memory");
            }
            client
        }
        None => {
            tracing::info!("Redis not configured, typing presence kept in memory (set REDIS_URL to enable)");
            DBClient::new(pool)
        }
    };

    let allowed_origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_headers([AUTHORIZATION, ACCEPT, CONTENT_TYPE])
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE]);

    let app_state = Arc::new(AppState::new(db_client, config.clone()));

    let app = create_router(app_state).layer(cors);

    let listener = match tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!("Failed to bind port {}: {}", config.port, err);
            std::process::exit(1);
        }
    };

    tracing::info!("Server is running on http://localhost:{}", config.port);

    if let Err(err) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", err);
    }
}
