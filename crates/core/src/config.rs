//! Service configuration.
//!
//! Every setting can be passed as a flag or through a `VESTWATCH_*`
//! environment variable; [`ConfigArgs`] resolves both into a [`ServiceConfig`].

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

use crate::admission::DEFAULT_EXPECTED_MINT;
use crate::refresh::DEFAULT_REFRESH_CONCURRENCY;

pub const DEFAULT_LISTEN: &str = "127.0.0.1:3000";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://vestwatch.db?mode=rwc";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

/// Resolved configuration consumed by the library.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address the HTTP server binds to.
    pub listen: SocketAddr,
    /// SQLite connection URL.
    pub database_url: String,
    /// Base URL of the chain indexing service.
    pub indexer_url: String,
    /// Prefix for client-side fetches; empty means same origin.
    pub base_url: String,
    /// Mint every admitted stream must be denominated in.
    pub expected_mint: String,
    /// When set, refresh requests must carry `?key=<refresh_key>`.
    pub refresh_key: Option<String>,
    /// Indexer lookups in flight at once during a refresh.
    pub refresh_concurrency: usize,
    /// Timeout for each indexer request.
    pub http_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 3000)),
            database_url: DEFAULT_DATABASE_URL.to_string(),
            indexer_url: String::new(),
            base_url: String::new(),
            expected_mint: DEFAULT_EXPECTED_MINT.to_string(),
            refresh_key: None,
            refresh_concurrency: DEFAULT_REFRESH_CONCURRENCY,
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }
}

/// Command line and environment settings.
#[derive(Parser, Debug, Clone)]
#[command(name = "vestwatch", version, about)]
pub struct ConfigArgs {
    #[arg(long, env = "VESTWATCH_LISTEN", default_value = DEFAULT_LISTEN)]
    pub listen: SocketAddr,

    #[arg(long, env = "VESTWATCH_DATABASE_URL", default_value = DEFAULT_DATABASE_URL)]
    pub database_url: String,

    #[arg(long, env = "VESTWATCH_INDEXER_URL")]
    pub indexer_url: String,

    #[arg(long, env = "VESTWATCH_BASE_URL", default_value = "")]
    pub base_url: String,

    #[arg(long, env = "VESTWATCH_EXPECTED_MINT", default_value = DEFAULT_EXPECTED_MINT)]
    pub expected_mint: String,

    #[arg(long, env = "VESTWATCH_REFRESH_KEY")]
    pub refresh_key: Option<String>,

    #[arg(
        long,
        env = "VESTWATCH_REFRESH_CONCURRENCY",
        default_value_t = DEFAULT_REFRESH_CONCURRENCY
    )]
    pub refresh_concurrency: usize,

    #[arg(long, env = "VESTWATCH_HTTP_TIMEOUT_SECS", default_value_t = DEFAULT_HTTP_TIMEOUT_SECS)]
    pub http_timeout_secs: u64,

    /// Default log filter; `RUST_LOG` takes precedence.
    #[arg(long, env = "VESTWATCH_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, env = "VESTWATCH_LOG_JSON")]
    pub log_json: bool,
}

impl ConfigArgs {
    pub fn into_config(self) -> ServiceConfig {
        let refresh_key = self
            .refresh_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        ServiceConfig {
            listen: self.listen,
            database_url: self.database_url,
            indexer_url: self.indexer_url.trim().to_string(),
            base_url: self.base_url.trim().trim_end_matches('/').to_string(),
            expected_mint: self.expected_mint.trim().to_string(),
            refresh_key,
            refresh_concurrency: self.refresh_concurrency.max(1),
            http_timeout: Duration::from_secs(self.http_timeout_secs),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
