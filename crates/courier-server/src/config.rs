use std::path::PathBuf;

use anyhow::{Context, Result};

/// All runtime configuration, read from the environment once at startup and
/// handed to component constructors. Business logic never looks at env vars.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub blob_url: String,
    pub staging_dir: PathBuf,
    pub max_file_bytes: u64,
    pub max_files: usize,
    pub allowed_mime: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let host = var_or("COURIER_HOST", "0.0.0.0");
        let port: u16 = var_or("COURIER_PORT", "3000")
            .parse()
            .context("COURIER_PORT must be a port number")?;
        let db_path = PathBuf::from(var_or("COURIER_DB_PATH", "courier.db"));
        let jwt_secret = var_or("COURIER_JWT_SECRET", "dev-secret-change-me");
        let token_ttl_hours: i64 = var_or("COURIER_TOKEN_TTL_HOURS", "168")
            .parse()
            .context("COURIER_TOKEN_TTL_HOURS must be an integer")?;
        let blob_url = var_or("COURIER_BLOB_URL", "http://127.0.0.1:4100");
        let staging_dir = PathBuf::from(var_or("COURIER_STAGING_DIR", "./tmp/staging"));
        let max_file_bytes: u64 = var_or("COURIER_MAX_FILE_BYTES", "5242880")
            .parse()
            .context("COURIER_MAX_FILE_BYTES must be an integer")?;
        let allowed_mime: Vec<String> = var_or("COURIER_ALLOWED_MIME", "image")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            host,
            port,
            db_path,
            jwt_secret,
            token_ttl_hours,
            blob_url,
            staging_dir,
            max_file_bytes,
            max_files: 10,
            allowed_mime,
        })
    }
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.into())
}
