use crate::store::WriteMode;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub http_host: String,
    pub http_port: u16,
    pub max_connections: u32,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub write_mode: WriteMode,
    pub statement_timeout: Duration,
    pub producer_timeout: Duration,
    /// Period of the background producer run, `None` when disabled
    pub run_interval: Option<Duration>,
    pub yts_base_url: String,
    pub yts_page_limit: u32,
    /// Page cap per catalog run, `None` means "until an empty page"
    pub yts_max_pages: Option<u32>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        // Build database_url from individual fields or use DATABASE_URL if provided
        let database_url = if let Ok(url) = env::var("DATABASE_URL") {
            url
        } else {
            let db_host = env::var("DB_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
            let db_port = env::var("DB_PORT").unwrap_or_else(|_| "5432".to_string());
            let db_name = env::var("DB_NAME").unwrap_or_else(|_| "homemanager".to_string());
            let db_user = env::var("DB_USER").unwrap_or_else(|_| "postgres".to_string());
            let db_password = env::var("DB_PASSWORD").unwrap_or_else(|_| "postgres".to_string());

            // URL-encode password to handle special characters
            let encoded_password = urlencoding::encode(&db_password);

            format!("postgres://{}:{}@{}:{}/{}", db_user, encoded_password, db_host, db_port, db_name)
        };

        let http_host = env::var("HTTP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let http_port = parse_or("HTTP_PORT", 8080);
        let max_connections = parse_or("MAX_CONNECTIONS", 8);

        let data_dir = env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./__data"));

        let log_dir = env::var("LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./__logs"));

        let write_mode = match env::var("WRITE_MODE") {
            Ok(raw) => raw.parse()?,
            Err(_) => WriteMode::default(),
        };

        let statement_timeout_secs: u64 = parse_or("STATEMENT_TIMEOUT_SECS", 30);
        let producer_timeout_secs: u64 = parse_or("PRODUCER_TIMEOUT_SECS", 600);
        let run_interval_secs: u64 = parse_or("RUN_INTERVAL_SECS", 0);

        let yts_base_url =
            env::var("YTS_BASE_URL").unwrap_or_else(|_| "https://yts.am/api/v2/".to_string());
        let yts_page_limit = parse_or("YTS_PAGE_LIMIT", 50);
        let yts_max_pages: u32 = parse_or("YTS_MAX_PAGES", 0);

        Ok(Config {
            database_url,
            http_host,
            http_port,
            max_connections,
            data_dir,
            log_dir,
            write_mode,
            statement_timeout: Duration::from_secs(statement_timeout_secs),
            producer_timeout: Duration::from_secs(producer_timeout_secs),
            run_interval: (run_interval_secs > 0).then(|| Duration::from_secs(run_interval_secs)),
            yts_base_url,
            yts_page_limit,
            yts_max_pages: (yts_max_pages > 0).then_some(yts_max_pages),
        })
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr = format!("{}:{}", self.http_host, self.http_port);
        addr.parse().map_err(|e| anyhow::anyhow!("Invalid socket address: {}", e))
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}
