use anyhow::{anyhow, Context, Result};
use std::env;
use std::time::Duration;

use crate::payments::providers::{MidtransConfig, StripeConfig, XenditConfig};

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub providers: ProvidersConfig,
    pub worker: WorkerSettings,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    /// Require `X-API-Key` on checkout
    pub require_merchant_auth: bool,
    pub log_format: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub name: String,
    pub max_connections: u32,
}

impl DatabaseConfig {
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.name
        )
    }
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
}

impl RedisConfig {
    pub fn url(&self) -> String {
        format!("redis://{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProvidersConfig {
    pub midtrans: MidtransConfig,
    pub xendit: XenditConfig,
    pub stripe: StripeConfig,
}

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub poll_timeout: Duration,
    pub retry_delay: Duration,
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T, name: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a valid value, got '{}'", name, raw)),
        None => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let server = ServerConfig {
            host: get("HOST", "0.0.0.0"),
            port: parse_or(lookup("PORT"), 8080, "PORT")?,
            environment: get("ENVIRONMENT", "development"),
            require_merchant_auth: parse_or(
                lookup("REQUIRE_MERCHANT_AUTH"),
                false,
                "REQUIRE_MERCHANT_AUTH",
            )?,
            log_format: get("LOG_FORMAT", "json"),
        };

        let database = DatabaseConfig {
            user: get("DB_USER", "paylink"),
            password: get("DB_PASSWORD", "secret"),
            host: get("DB_HOST", "localhost"),
            port: parse_or(lookup("DB_PORT"), 5432, "DB_PORT")?,
            name: get("DB_NAME", "paylink"),
            max_connections: parse_or(lookup("DB_MAX_CONNECTIONS"), 20, "DB_MAX_CONNECTIONS")?,
        };

        let redis = RedisConfig {
            host: get("REDIS_HOST", "localhost"),
            port: parse_or(lookup("REDIS_PORT"), 6379, "REDIS_PORT")?,
        };

        let providers = ProvidersConfig {
            midtrans: MidtransConfig::new(
                get("MIDTRANS_SERVER_KEY", ""),
                parse_or(
                    lookup("MIDTRANS_IS_PRODUCTION"),
                    false,
                    "MIDTRANS_IS_PRODUCTION",
                )?,
            ),
            xendit: XenditConfig {
                api_key: get("XENDIT_API_KEY", ""),
                webhook_token: get("XENDIT_WEBHOOK_TOKEN", ""),
                ..XenditConfig::default()
            },
            stripe: StripeConfig {
                secret_key: get("STRIPE_SECRET_KEY", ""),
                webhook_secret: get("STRIPE_WEBHOOK_SECRET", ""),
                ..StripeConfig::default()
            },
        };

        let worker = WorkerSettings {
            poll_timeout: Duration::from_secs(parse_or(
                lookup("WORKER_POLL_TIMEOUT_SECS"),
                5,
                "WORKER_POLL_TIMEOUT_SECS",
            )?),
            retry_delay: Duration::from_secs(parse_or(
                lookup("WORKER_RETRY_DELAY_SECS"),
                5,
                "WORKER_RETRY_DELAY_SECS",
            )?),
        };

        let config = Config {
            server,
            database,
            redis,
            providers,
            worker,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow!("PORT must be greater than 0"));
        }

        let valid_environments = ["development", "staging", "production"];
        if !valid_environments.contains(&self.server.environment.as_str()) {
            return Err(anyhow!(
                "Environment must be one of: {:?}, got {}",
                valid_environments,
                self.server.environment
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.server.log_format.as_str()) {
            return Err(anyhow!(
                "LOG_FORMAT must be one of: {:?}, got {}",
                valid_formats,
                self.server.log_format
            ));
        }

        if self.database.host.trim().is_empty() || self.database.name.trim().is_empty() {
            return Err(anyhow!("DB_HOST and DB_NAME cannot be empty"));
        }

        if self.database.max_connections == 0 {
            return Err(anyhow!("DB_MAX_CONNECTIONS must be greater than 0"));
        }

        if self.redis.host.trim().is_empty() {
            return Err(anyhow!("REDIS_HOST cannot be empty"));
        }

        let poll = self.worker.poll_timeout;
        if poll < Duration::from_secs(1) || poll > Duration::from_secs(30) {
            return Err(anyhow!(
                "WORKER_POLL_TIMEOUT_SECS must be between 1 and 30, got {}",
                poll.as_secs()
            ));
        }

        Ok(())
    }
}
