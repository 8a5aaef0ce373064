//! Server configuration management

use crate::error::{ApiError, Result};
use relman::SiteId;
use serde::{Deserialize, Serialize};

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to bind to
    pub port: u16,

    /// SQLite connection string
    pub database_url: String,

    /// Path of the package registry TOML file
    pub packages_path: String,

    /// Site used when a request names none
    pub default_site: SiteId,

    /// Trusted header carrying the authenticated username
    pub auth_header: String,

    /// CORS allowed origins
    pub cors_origins: Vec<String>,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| ApiError::Config("Invalid PORT value".to_string()))?,
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./data/relman.db".to_string()),
            packages_path: std::env::var("RELMAN_PACKAGES")
                .unwrap_or_else(|_| "./packages.toml".to_string()),
            default_site: std::env::var("DEFAULT_SITE_ID")
                .unwrap_or_else(|_| "1".to_string())
                .parse()
                .map(SiteId)
                .map_err(|_| ApiError::Config("Invalid DEFAULT_SITE_ID value".to_string()))?,
            auth_header: std::env::var("AUTH_HEADER")
                .unwrap_or_else(|_| "x-remote-user".to_string())
                .to_lowercase(),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        })
    }

    /// Whether any origin may call the API
    pub fn allows_any_origin(&self) -> bool {
        self.cors_origins.is_empty() || self.cors_origins.iter().any(|o| o == "*")
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            database_url: "sqlite:./data/relman.db".to_string(),
            packages_path: "./packages.toml".to_string(),
            default_site: SiteId(1),
            auth_header: "x-remote-user".to_string(),
            cors_origins: vec!["*".to_string()],
        }
    }
}
