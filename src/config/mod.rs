use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::crypto::generate_secret;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub uploads: UploadConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Maximum number of pooled SQLite connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret for access tokens. Generated at startup when absent.
    #[serde(default)]
    pub access_token_secret: Option<String>,
    /// HMAC secret for refresh tokens. Generated at startup when absent.
    #[serde(default)]
    pub refresh_token_secret: Option<String>,
    #[serde(default = "default_access_token_ttl")]
    pub access_token_ttl_minutes: i64,
    #[serde(default = "default_refresh_token_ttl")]
    pub refresh_token_ttl_minutes: i64,
    /// Mark session cookies `Secure` (required when `same_site = "none"`)
    #[serde(default = "default_cookie_secure")]
    pub cookie_secure: bool,
    #[serde(default = "default_cookie_same_site")]
    pub cookie_same_site: CookieSameSite,
    /// Optional cookie domain, e.g. ".onrender.com"
    #[serde(default)]
    pub cookie_domain: Option<String>,
    /// Admin account created at startup if it does not exist yet
    #[serde(default)]
    pub admin_email: Option<String>,
    #[serde(default)]
    pub admin_password: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_token_secret: None,
            refresh_token_secret: None,
            access_token_ttl_minutes: default_access_token_ttl(),
            refresh_token_ttl_minutes: default_refresh_token_ttl(),
            cookie_secure: default_cookie_secure(),
            cookie_same_site: default_cookie_same_site(),
            cookie_domain: None,
            admin_email: None,
            admin_password: None,
        }
    }
}

fn default_access_token_ttl() -> i64 {
    15
}

fn default_refresh_token_ttl() -> i64 {
    2 * 24 * 60
}

fn default_cookie_secure() -> bool {
    true
}

fn default_cookie_same_site() -> CookieSameSite {
    CookieSameSite::None
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CookieSameSite {
    Strict,
    Lax,
    None,
}

impl AuthConfig {
    /// Fill in missing token secrets with random ones.
    ///
    /// Tokens signed with a generated secret stop validating after a restart.
    pub fn ensure_secrets(&mut self) {
        if self.access_token_secret.as_deref().map_or(true, str::is_empty) {
            warn!("No access token secret configured, generating a temporary one");
            self.access_token_secret = Some(generate_secret());
        }
        if self.refresh_token_secret.as_deref().map_or(true, str::is_empty) {
            warn!("No refresh token secret configured, generating a temporary one");
            self.refresh_token_secret = Some(generate_secret());
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
        }
    }
}

fn default_allowed_origins() -> Vec<String> {
    vec![
        "https://wildcatsexpress.onrender.com".to_string(),
        "http://localhost:5173".to_string(),
    ]
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    /// Directory uploaded menu images are written to (default: ./data/images)
    #[serde(default = "default_upload_dir")]
    pub dir: PathBuf,
    /// Maximum accepted image size in bytes (default: 5 MiB)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            dir: default_upload_dir(),
            max_file_size: default_max_file_size(),
        }
    }
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("./data/images")
}

fn default_max_file_size() -> usize {
    5 * 1024 * 1024
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventsConfig {
    /// Events buffered per subscriber before a slow client starts skipping
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_channel_capacity() -> usize {
    256
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str(&content).with_context(|| "Failed to parse configuration file")?
        } else {
            info!("No config file found, using defaults");
            Config::default()
        };

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply environment overrides on top of file/default values.
    ///
    /// `lookup` is injected so tests don't have to mutate the process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid PORT value: {}", port))?;
        }
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(dir) = lookup("DATA_DIR") {
            self.server.data_dir = PathBuf::from(dir);
        }
        if let Some(secret) = lookup("ACCESS_TOKEN_SECRET") {
            self.auth.access_token_secret = Some(secret);
        }
        if let Some(secret) = lookup("REFRESH_TOKEN_SECRET") {
            self.auth.refresh_token_secret = Some(secret);
        }
        if let Some(email) = lookup("ADMIN_EMAIL") {
            self.auth.admin_email = Some(email);
        }
        if let Some(password) = lookup("ADMIN_PASSWORD") {
            self.auth.admin_password = Some(password);
        }
        if let Some(origins) = lookup("ALLOWED_ORIGINS") {
            self.cors.allowed_origins = origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }
        Ok(())
    }

    pub fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            cors: CorsConfig::default(),
            uploads: UploadConfig::default(),
            events: EventsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
