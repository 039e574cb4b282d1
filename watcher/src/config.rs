use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::errors::{Error, Result};
use crate::poll::PollConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    Postgres,
    Memory,
}

/// Moisture watcher: Telegram subscriptions to device telemetry
#[derive(Debug, Clone, Parser)]
#[command(name = "watcher")]
pub struct Config {
    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    pub telegram_token: String,

    /// Firebase Realtime Database URL, e.g. https://project.firebaseio.com
    #[arg(long, env = "FIREBASE_DATABASE")]
    pub firebase_database: String,

    /// Database secret or ID token passed as `auth`
    #[arg(long, env = "FIREBASE_AUTH", hide_env_values = true)]
    pub firebase_auth: Option<String>,

    #[arg(long, env = "STORE", value_enum, default_value = "postgres")]
    pub store: StoreKind,

    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    #[arg(long, env = "HTTP_ADDR", default_value = "0.0.0.0:8080")]
    pub http_addr: String,

    #[arg(long, env = "POLL_INTERVAL_SECS", default_value_t = 60,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub poll_interval_secs: u64,

    #[arg(long, env = "SEND_TIMEOUT_SECS", default_value_t = 10,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub send_timeout_secs: u64,

    #[arg(long, env = "POLL_CONCURRENCY", default_value_t = 16,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub poll_concurrency: u64,
}

impl Config {
    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            interval: Duration::from_secs(self.poll_interval_secs),
            timeout: Duration::from_secs(self.send_timeout_secs),
            concurrency: self.poll_concurrency as usize,
        }
    }

    pub fn database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .ok_or_else(|| Error::Config("DATABASE_URL is required for the postgres store".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: [&str; 5] = [
        "watcher",
        "--telegram-token",
        "t",
        "--firebase-database",
        "https://example.firebaseio.com",
    ];

    #[test]
    fn test_defaults() {
        let config = Config::try_parse_from(BASE).unwrap();
        let poll = config.poll_config();
        assert_eq!(poll.interval, Duration::from_secs(60));
        assert_eq!(poll.timeout, Duration::from_secs(10));
        assert_eq!(poll.concurrency, 16);
        assert_eq!(config.http_addr, "0.0.0.0:8080");
    }

    #[test]
    fn test_memory_store_needs_no_database() {
        let mut args = BASE.to_vec();
        args.extend(["--store", "memory", "--poll-interval-secs", "5"]);
        let config = Config::try_parse_from(args).unwrap();
        assert_eq!(config.store, StoreKind::Memory);
        assert_eq!(config.poll_config().interval, Duration::from_secs(5));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut args = BASE.to_vec();
        args.extend(["--poll-interval-secs", "0"]);
        assert!(Config::try_parse_from(args).is_err());
    }
}
