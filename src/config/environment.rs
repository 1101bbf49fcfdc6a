use std::env;
use std::time::Duration;

pub const DEFAULT_MARKET_API_URL: &str =
    "https://www.simcompanies.com/api/v3/market/{server_type}/{product_type}/";

/// Environment configuration
/// Loads and validates environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub db_max_connections: u32,
    pub market_api_url: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| "DATABASE_URL must be set".to_string())?;

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:5000".to_string());

        let db_max_connections = parse_var("DB_MAX_CONNECTIONS", 10)?;

        let market_api_url =
            env::var("MARKET_API_URL").unwrap_or_else(|_| DEFAULT_MARKET_API_URL.to_string());
        if !market_api_url.contains("{server_type}") || !market_api_url.contains("{product_type}") {
            return Err(
                "MARKET_API_URL must contain {server_type} and {product_type} placeholders"
                    .to_string(),
            );
        }

        let connect_timeout = Duration::from_secs(parse_var("COLLECTOR_CONNECT_TIMEOUT_SECS", 3)?);
        let read_timeout = Duration::from_secs(parse_var("COLLECTOR_READ_TIMEOUT_SECS", 5)?);

        Ok(Self {
            database_url,
            bind_addr,
            db_max_connections,
            market_api_url,
            connect_timeout,
            read_timeout,
        })
    }
}

/// Reads an optional numeric variable, falling back to `default` when unset.
pub(crate) fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, String> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| format!("{} must be a valid number, got '{}'", name, raw)),
        Err(_) => Ok(default),
    }
}
