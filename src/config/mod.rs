use std::env;
use std::path::Path;

use crate::error::{AppError, AppResult};

/// Default MongoDB connection string.
pub const DEFAULT_MONGODB_URI: &str = "mongodb://localhost:27017";
/// Default database name.
pub const DEFAULT_DB_NAME: &str = "financial_ai_agent_db";

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

/// Database configuration
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseConfig {
    pub uri: String,
    pub name: String,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database = DatabaseConfig {
            uri: env::var("MONGODB_URI").unwrap_or_else(|_| DEFAULT_MONGODB_URI.to_string()),
            name: env::var("DB_NAME").unwrap_or_else(|_| DEFAULT_DB_NAME.to_string()),
        };

        if database.uri.trim().is_empty() {
            return Err(AppError::Config {
                message: "MONGODB_URI must not be empty".to_string(),
            });
        }
        if database.name.trim().is_empty() {
            return Err(AppError::Config {
                message: "DB_NAME must not be empty".to_string(),
            });
        }

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        Ok(Config { database, logging })
    }

    /// Contents of the `.env.example` template.
    pub fn env_template() -> String {
        format!(
            "# MongoDB Connection Settings\n\
             MONGODB_URI={DEFAULT_MONGODB_URI}\n\
             DB_NAME={DEFAULT_DB_NAME}\n\
             \n\
             # Logging\n\
             LOG_LEVEL=info\n\
             LOG_FORMAT=pretty\n"
        )
    }

    /// Write the `.env.example` template to `path`.
    pub fn write_env_example(path: &Path) -> AppResult<()> {
        std::fs::write(path, Self::env_template())?;
        Ok(())
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            uri: DEFAULT_MONGODB_URI.to_string(),
            name: DEFAULT_DB_NAME.to_string(),
        }
    }
}
