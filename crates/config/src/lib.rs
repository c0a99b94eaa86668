use std::path::Path;
use std::{env, fs, io};

use serde::Deserialize;

/// Size of a file piece in bytes; the unit of transfer and verification.
pub const PIECE_SIZE: usize = 1024;

/// Number of worker threads in the leecher's piece-fetch pool.
pub const POOL_SIZE: usize = 10;

/// Lifetime of a session token in seconds (10 hours).
pub const TOKEN_EXPIRY_SECS: i64 = 36000;

/// Read/write timeout applied to peer-to-peer sockets, in seconds.
pub const SOCKET_TIMEOUT_SECS: u64 = 15;

/// Root directory for per-endpoint log files.
pub const LOG_ROOT: &str = "./logs";

/// Fallback HMAC secret used when no configuration is supplied.
pub const DEFAULT_SECRET: &str = "gshare_local_secret";

/// Environment variable that overrides the configured HMAC secret.
pub const SECRET_ENV_VAR: &str = "GSHARE_SECRET";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
/// Tracker startup configuration, read from an optional JSON file.
pub struct TrackerConfig {
    /// Deployment-wide key for signing session tokens.
    pub secret: String,
    /// Seconds a minted token stays valid.
    pub token_expiry_secs: i64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            secret: DEFAULT_SECRET.to_string(),
            token_expiry_secs: TOKEN_EXPIRY_SECS,
        }
    }
}

impl TrackerConfig {
    /// Load the configuration from `path` if given, falling back to defaults.
    /// The `GSHARE_SECRET` environment variable wins over both.
    pub fn load(path: Option<&Path>) -> io::Result<Self> {
        let mut config = match path {
            Some(p) => {
                let raw = fs::read_to_string(p)?;
                serde_json::from_str(&raw)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
            }
            None => TrackerConfig::default(),
        };
        if let Ok(secret) = env::var(SECRET_ENV_VAR) {
            config.secret = secret;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TrackerConfig::default();
        assert_eq!(config.secret, DEFAULT_SECRET);
        assert_eq!(config.token_expiry_secs, TOKEN_EXPIRY_SECS);
    }

    #[test]
    fn test_config_from_json() {
        let config: TrackerConfig =
            serde_json::from_str(r#"{"secret": "hunter2", "token_expiry_secs": 60}"#).unwrap();
        assert_eq!(config.secret, "hunter2");
        assert_eq!(config.token_expiry_secs, 60);
    }

    #[test]
    fn test_partial_config_falls_back() {
        let config: TrackerConfig = serde_json::from_str(r#"{"secret": "hunter2"}"#).unwrap();
        assert_eq!(config.secret, "hunter2");
        assert_eq!(config.token_expiry_secs, TOKEN_EXPIRY_SECS);
    }
}
