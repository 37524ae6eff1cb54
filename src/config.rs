// config.rs
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub port: u16,
    pub redis_url: Option<String>,
    pub db_max_connections: u32,
    pub cors_origins: Vec<String>,
    pub log_level: String,
    // Deal negotiation settings
    pub offer_window_minutes: i64,
    pub lock_timeout_ms: u64,
    // Presence
    pub typing_ttl_seconds: u64,
}

impl Config {
    pub fn init() -> Config {
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let jwt_secret = std::env::var("JWT_SECRET_KEY").expect("JWT_SECRET_KEY must be set");

        let redis_url = std::env::var("REDIS_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let cors_origins = std::env::var("CORS_ORIGINS")
            .map(|origins| parse_list(&origins))
            .unwrap_or_else(|_| vec![
                "http://localhost:5173".to_string(),
                "http://localhost:8000".to_string(),
            ]);

        let log_level = std::env::var("LOG_LEVEL")
            .unwrap_or_else(|_| "debug".to_string());

        Config {
            database_url,
            jwt_secret,
            port: env_or("PORT", 8000),
            redis_url,
            db_max_connections: env_or("DB_MAX_CONNECTIONS", 20),
            cors_origins,
            log_level,
            offer_window_minutes: env_or("OFFER_WINDOW_MINUTES", 15),
            lock_timeout_ms: env_or("LOCK_TIMEOUT_MS", 5000),
            typing_ttl_seconds: env_or("TYPING_TTL_SECONDS", 5),
        }
    }
}

/// Reads an optional numeric setting, falling back to the default when missing or malformed.
fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .map(|item| item.to_string())
        .collect()
}
