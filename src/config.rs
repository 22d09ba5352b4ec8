use anyhow::{Context, Result};
use clap::Parser;
use reqwest::Url;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::relay::AllowList;

/// Minimum JWT signing secret length in bytes
const MIN_JWT_SECRET_LEN: usize = 32;

/// Longest access token lifetime accepted, in seconds (one year)
const MAX_ACCESS_TOKEN_TTL: u64 = 365 * 24 * 60 * 60;

/// SSO server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Server host address
    #[arg(short = 'H', long, env = "SSO_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Server port
    #[arg(short, long, env = "SSO_PORT", default_value = "8000")]
    pub port: u16,

    /// Path to the SQLite database
    #[arg(short = 'd', long, env = "SSO_DB_FILE", default_value = "sso.sqlite3")]
    pub db_file: String,

    /// Secret used to sign access tokens
    #[arg(short = 's', long, env = "SSO_JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    /// Access token lifetime in seconds
    #[arg(long, env = "SSO_ACCESS_TOKEN_TTL", default_value = "3600")]
    pub access_token_ttl: u64,

    /// Directory with the relay page and other static assets
    #[arg(long, env = "SSO_STATIC_DIR")]
    pub static_dir: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    // Server settings
    pub server_host: String,
    pub server_port: u16,

    // Storage
    pub db_file: PathBuf,
    pub static_dir: Option<PathBuf>,

    // Tokens
    pub jwt_secret: String,
    pub access_token_ttl: u64,

    pub log_level: String,
}

impl Config {
    /// Load configuration with priority: CLI > ENV > .env > defaults
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_args(CliArgs::parse())
    }

    pub fn from_args(args: CliArgs) -> Result<Self> {
        Ok(Config {
            server_host: args.host,
            server_port: args.port,
            db_file: expand_tilde(&args.db_file),
            static_dir: args.static_dir.as_deref().map(expand_tilde),
            jwt_secret: args
                .jwt_secret
                .context("SSO_JWT_SECRET is required (use -s or set SSO_JWT_SECRET env var)")?,
            access_token_ttl: args.access_token_ttl,
            log_level: args.log_level,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.jwt_secret.len() < MIN_JWT_SECRET_LEN {
            anyhow::bail!(
                "SSO_JWT_SECRET must be at least {} bytes long",
                MIN_JWT_SECRET_LEN
            );
        }

        if self.access_token_ttl == 0 {
            anyhow::bail!("SSO_ACCESS_TOKEN_TTL must be greater than zero");
        }

        if self.access_token_ttl > MAX_ACCESS_TOKEN_TTL {
            anyhow::bail!(
                "SSO_ACCESS_TOKEN_TTL must be at most {} seconds",
                MAX_ACCESS_TOKEN_TTL
            );
        }

        if let Some(dir) = &self.static_dir {
            if !dir.is_dir() {
                anyhow::bail!("SSO_STATIC_DIR is not a directory: {}", dir.display());
            }
        }

        Ok(())
    }
}

/// Relay settings
#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub allowed_origins: AllowList,
    /// Base URL of the SSO backend
    pub backend_url: Url,
    /// Token request timeout in seconds
    pub request_timeout: u64,
}

#[derive(Deserialize)]
struct RawRelayConfig {
    #[serde(default)]
    allowed_origins: Vec<String>,
    backend_url: String,
    #[serde(default = "default_request_timeout")]
    request_timeout: u64,
}

fn default_request_timeout() -> u64 {
    30
}

impl RelayConfig {
    /// Load from an optional file (TOML, JSON, ...) overlaid by `RELAY_*`
    /// environment variables. `RELAY_ALLOWED_ORIGINS` is comma-separated.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    fn load_with_env(path: Option<&Path>, env: Option<HashMap<String, String>>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("RELAY")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("allowed_origins")
                .source(env),
        );

        let raw: RawRelayConfig = builder
            .build()
            .context("Failed to read relay configuration")?
            .try_deserialize()
            .context("Invalid relay configuration")?;

        Self::from_raw(raw)
    }

    fn from_raw(raw: RawRelayConfig) -> Result<Self> {
        let allowed_origins =
            AllowList::parse(&raw.allowed_origins).context("Invalid allowed_origins entry")?;
        if allowed_origins.is_empty() {
            tracing::warn!("Relay allow-list is empty; every message will be dropped");
        }

        let backend_url = Url::parse(&raw.backend_url)
            .with_context(|| format!("Invalid backend_url: {}", raw.backend_url))?;

        if raw.request_timeout == 0 {
            anyhow::bail!("request_timeout must be greater than zero");
        }

        Ok(Self {
            allowed_origins,
            backend_url,
            request_timeout: raw.request_timeout,
        })
    }
}

/// Expand tilde (~) in file paths to user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
