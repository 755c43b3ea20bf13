use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

use crate::store::SyncPolicy;

/// Connection details for the hosted backend
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub url: String,
    pub anon_key: String,
    pub request_timeout: Duration,
    pub realtime_poll: Duration,
}

/// Runtime configuration read from the environment
#[derive(Debug, Clone)]
pub struct Config {
    /// `None` runs against the in-memory gateway
    pub backend: Option<BackendConfig>,
    pub snapshot_path: PathBuf,
    pub sync_policy: SyncPolicy,
    pub bot_reply_delay: Duration,
    pub reconnect_delay: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let backend = match (env::var("BACKEND_URL").ok(), env::var("BACKEND_ANON_KEY").ok()) {
            (Some(url), Some(anon_key)) => Some(BackendConfig {
                url: url.trim_end_matches('/').to_string(),
                anon_key,
                request_timeout: Duration::from_secs(parse_or("REQUEST_TIMEOUT_SECS", 30)?),
                realtime_poll: Duration::from_millis(parse_or("REALTIME_POLL_MS", 2000)?),
            }),
            (Some(_), None) => anyhow::bail!("BACKEND_URL is set but BACKEND_ANON_KEY is missing"),
            _ => None,
        };

        let sync_policy = match env::var("SYNC_POLICY").as_deref() {
            Ok("rollback") => SyncPolicy::Rollback,
            Ok("keep") | Err(_) => SyncPolicy::KeepOptimistic,
            Ok(other) => anyhow::bail!("unknown SYNC_POLICY '{}', expected keep or rollback", other),
        };

        Ok(Self {
            backend,
            snapshot_path: env::var("SNAPSHOT_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("broker_market_state.json")),
            sync_policy,
            bot_reply_delay: Duration::from_millis(parse_or("BOT_REPLY_DELAY_MS", 1000)?),
            reconnect_delay: Duration::from_millis(parse_or("RECONNECT_DELAY_MS", 3000)?),
        })
    }
}

fn parse_or(key: &str, default: u64) -> anyhow::Result<u64> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("{} must be a whole number, got '{}'", key, raw)),
        Err(_) => Ok(default),
    }
}
