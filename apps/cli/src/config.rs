//! Environment-backed configuration for a sync run.
//!
//! Every option can be set as a flag or an environment variable; missing
//! required settings abort the run before any row is touched.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use promosync_client::Authenticator;
use promosync_core::errors::{Error, Result};
use promosync_core::retry::RetryPolicy;
use promosync_storage_mysql::DatabaseSettings;

/// Sync pro-plan customers with recent engagement to the Iterable API.
#[derive(Debug, Parser)]
#[command(name = "promosync", version)]
pub struct Cli {
    /// Database host
    #[arg(long, env = "DB_HOST")]
    pub db_host: String,

    /// Database port
    #[arg(long, env = "DB_PORT", default_value_t = 3306)]
    pub db_port: u16,

    /// Database user
    #[arg(long, env = "DB_USER")]
    pub db_user: String,

    /// Database password
    #[arg(long, env = "DB_PASSWORD", hide_env_values = true)]
    pub db_password: String,

    /// Database name
    #[arg(long, env = "DB_NAME")]
    pub db_name: String,

    /// Static API key; required unless --use-jwt is set
    #[arg(long, env = "ITERABLE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Authenticate with a signed bearer token instead of the static key
    #[arg(long, env = "ITERABLE_USE_JWT")]
    pub use_jwt: bool,

    /// Signing secret for --use-jwt
    #[arg(long, env = "ITERABLE_JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    /// Signed-token lifetime in seconds
    #[arg(long, env = "ITERABLE_JWT_TTL_SECS", default_value_t = 3600)]
    pub jwt_ttl_secs: i64,

    /// API base URL
    #[arg(
        long,
        env = "ITERABLE_API_BASE_URL",
        default_value = "https://api.iterable.com"
    )]
    pub api_base_url: String,

    /// Log level used when RUST_LOG is unset
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Directory for the rotating log file
    #[arg(long, env = "LOG_DIR", default_value = "logs")]
    pub log_dir: PathBuf,

    /// Maximum attempts per API call
    #[arg(long, env = "RETRY_MAX_ATTEMPTS", default_value_t = 3)]
    pub retry_max_attempts: u32,

    /// Multiplier applied to the backoff after each failed attempt
    #[arg(long, env = "RETRY_BACKOFF_FACTOR", default_value_t = 2.0)]
    pub retry_backoff_factor: f64,

    /// Backoff before the second attempt, in milliseconds
    #[arg(long, env = "RETRY_INITIAL_BACKOFF_MS", default_value_t = 1000)]
    pub retry_initial_backoff_ms: u64,

    /// Directory for the CSV and results artifacts
    #[arg(long, env = "OUTPUT_DIR", default_value = ".")]
    pub output_dir: PathBuf,
}

impl Cli {
    pub fn database_settings(&self) -> DatabaseSettings {
        DatabaseSettings {
            host: self.db_host.clone(),
            port: self.db_port,
            user: self.db_user.clone(),
            password: self.db_password.clone(),
            database: self.db_name.clone(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts,
            initial_backoff: Duration::from_millis(self.retry_initial_backoff_ms),
            backoff_factor: self.retry_backoff_factor,
            ..RetryPolicy::default()
        }
    }

    /// Build the authenticator, failing fast on inconsistent settings.
    pub fn authenticator(&self) -> Result<Authenticator> {
        if self.use_jwt {
            let secret = self.jwt_secret.clone().unwrap_or_default();
            return Authenticator::signed_token(secret, self.jwt_ttl_secs)
                .map_err(|e| Error::config(e.to_string()));
        }
        match self.api_key.as_deref() {
            Some(key) if !key.is_empty() => Ok(Authenticator::api_key(key)),
            _ => Err(Error::config(
                "ITERABLE_API_KEY is required unless --use-jwt is set",
            )),
        }
    }
}
