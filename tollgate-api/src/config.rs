/// Configuration management for the API server
///
/// Loaded from environment variables (and `.env` in development).
///
/// # Environment Variables
///
/// - `API_HOST`: Host to bind to (default: 0.0.0.0)
/// - `API_PORT`: Port to bind to (default: 8080)
/// - `CORS_ORIGINS`: Comma-separated allowed origins, `*` for permissive (default: `*`)
/// - `PRODUCTION`: Enables HSTS and other production-only behaviour (default: false)
/// - `TRUSTED_PROXIES`: Comma-separated proxy IPs whose `X-Forwarded-For` is honored (default: none)
/// - `DATABASE_URL`: PostgreSQL connection string (optional; in-memory store when unset)
/// - `DATABASE_MAX_CONNECTIONS`: Pool size (default: 10)
/// - `REDIS_URL`: Redis URL for rate-limit counters (optional; in-memory when unset)
/// - `SESSION_SECRET`: HMAC key for session tokens, at least 32 characters (required)
/// - `AUDIT_RETENTION_DAYS`: Audit retention horizon (default: 90)
/// - `AUDIT_MAX_PAGE_SIZE`: Audit query page-size ceiling (default: 100)
/// - `INVITE_RATE_LIMIT` / `INVITE_RATE_WINDOW_SECS`: Team invites (default: 10 per 3600s)
/// - `LOGIN_RATE_LIMIT` / `LOGIN_RATE_WINDOW_SECS`: Failed sign-ins per IP (default: 5 per 900s)
///
/// # Example
///
/// ```no_run
/// use tollgate_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use std::env;
use std::net::IpAddr;
use std::str::FromStr;

use tollgate_shared::gate::GateConfig;
use tollgate_shared::ratelimit::redis::RedisConfig;
use tollgate_shared::store::postgres::DatabaseConfig;

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,

    /// `None` selects the in-memory store
    pub database: Option<DatabaseConfig>,

    /// `None` selects in-memory rate-limit counters
    pub redis: Option<RedisConfig>,

    pub session: SessionConfig,

    pub limits: GateConfig,

    pub audit_retention_days: u32,
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub production: bool,

    /// Peers allowed to report the client address via `X-Forwarded-For`
    pub trusted_proxies: Vec<IpAddr>,
}

/// Session token configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// HMAC key for session tokens; must be at least 32 bytes.
    /// Generate with: `openssl rand -hex 32`
    pub secret: String,
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if `SESSION_SECRET` is missing or too short, or a
    /// numeric variable does not parse.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let host = env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = parse_var("API_PORT", 8080u16)?;

        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let production = parse_var("PRODUCTION", false)?;
        let trusted_proxies = parse_proxies(&env::var("TRUSTED_PROXIES").unwrap_or_default())?;

        let secret = env::var("SESSION_SECRET")
            .map_err(|_| anyhow::anyhow!("SESSION_SECRET environment variable is required"))?;
        if secret.len() < 32 {
            anyhow::bail!("SESSION_SECRET must be at least 32 characters long");
        }

        let defaults = GateConfig::default();
        let limits = GateConfig {
            invite_limit: parse_var("INVITE_RATE_LIMIT", defaults.invite_limit)?,
            invite_window_secs: parse_var("INVITE_RATE_WINDOW_SECS", defaults.invite_window_secs)?,
            login_limit: parse_var("LOGIN_RATE_LIMIT", defaults.login_limit)?,
            login_window_secs: parse_var("LOGIN_RATE_WINDOW_SECS", defaults.login_window_secs)?,
            audit_max_page_size: parse_var("AUDIT_MAX_PAGE_SIZE", defaults.audit_max_page_size)?,
        };

        Ok(Self {
            api: ApiConfig {
                host,
                port,
                cors_origins,
                production,
                trusted_proxies,
            },
            database: DatabaseConfig::from_env(),
            redis: RedisConfig::from_env(),
            session: SessionConfig { secret },
            limits,
            audit_retention_days: parse_var("AUDIT_RETENTION_DAYS", 90u32)?,
        })
    }

    /// Configuration for tests: in-memory backends and default limits
    pub fn for_testing(session_secret: &str) -> Self {
        Self {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                cors_origins: vec!["*".to_string()],
                production: false,
                trusted_proxies: Vec::new(),
            },
            database: None,
            redis: None,
            session: SessionConfig {
                secret: session_secret.to_string(),
            },
            limits: GateConfig::default(),
            audit_retention_days: 90,
        }
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}

fn parse_var<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid value for {name}: {e}")),
        Err(_) => Ok(default),
    }
}

fn parse_proxies(raw: &str) -> anyhow::Result<Vec<IpAddr>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse()
                .map_err(|e| anyhow::anyhow!("Invalid TRUSTED_PROXIES entry {s:?}: {e}"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_address() {
        let mut config = Config::for_testing("test-secret-key-at-least-32-bytes-long");
        config.api.port = 8080;

        assert_eq!(config.bind_address(), "127.0.0.1:8080");
    }

    #[test]
    fn test_parse_var_default() {
        let value: u64 = parse_var("TOLLGATE_TEST_UNSET_VARIABLE", 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_parse_proxies() {
        let proxies = parse_proxies(" 10.0.0.1, ::1 ,").unwrap();
        assert_eq!(proxies.len(), 2);
        assert_eq!(proxies[0], "10.0.0.1".parse::<IpAddr>().unwrap());

        assert!(parse_proxies("").unwrap().is_empty());
        assert!(parse_proxies("10.0.0.1,proxy.internal").is_err());
    }
}
