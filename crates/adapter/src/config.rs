//! Server configuration from `TETRIS_DUEL_*` environment variables.
//!
//! Every key has a default. A key that is set but does not parse is an error,
//! so a typo in deployment fails startup instead of silently using a default.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::table::engine::GameConfig;
use crate::table::{HallConfig, PollPolicy};
use crate::types::{DEFAULT_DROP_MS, DEFAULT_NEXT_PIECES, DEFAULT_ZONE_HEIGHT, DEFAULT_ZONE_WIDTH, MIN_ZONE_SIDE};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{key}={value:?} is not a valid value")]
    Invalid { key: &'static str, value: String },
    #[error("{key} must be at least {min}, got {value}")]
    TooSmall {
        key: &'static str,
        value: usize,
        min: usize,
    },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub hall: HallConfig,
    /// Deadline for the first `auth` request.
    pub auth_timeout: Duration,
    /// Read idle time after which a connection is treated as gone.
    pub heartbeat: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7788,
            hall: HallConfig::default(),
            auth_timeout: Duration::from_secs(10),
            heartbeat: Duration::from_secs(5),
        }
    }
}

struct Lookup<F>(F);

impl<F: Fn(&str) -> Option<String>> Lookup<F> {
    fn get<T: FromStr>(&self, key: &'static str, default: T) -> Result<T, ConfigError> {
        match (self.0)(key) {
            None => Ok(default),
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { key, value: raw }),
        }
    }

    fn millis(&self, key: &'static str, default: u64) -> Result<Duration, ConfigError> {
        self.get(key, default).map(Duration::from_millis)
    }

    fn secs(&self, key: &'static str, default: u64) -> Result<Duration, ConfigError> {
        self.get(key, default).map(Duration::from_secs)
    }

    fn side(&self, key: &'static str, default: usize) -> Result<usize, ConfigError> {
        let value = self.get(key, default)?;
        if value < MIN_ZONE_SIDE {
            return Err(ConfigError::TooSmall {
                key,
                value,
                min: MIN_ZONE_SIDE,
            });
        }
        Ok(value)
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Lookup(lookup);
        let defaults = Self::default();
        let poll = PollPolicy::default();

        let host: String = env.get("TETRIS_DUEL_HOST", defaults.host)?;
        let port: u16 = env.get("TETRIS_DUEL_PORT", defaults.port)?;
        let host_addr = env.get("TETRIS_DUEL_HOST_ADDR", format!("{host}:{port}"))?;

        let game = GameConfig {
            height: env.side("TETRIS_DUEL_ZONE_HEIGHT", DEFAULT_ZONE_HEIGHT)?,
            width: env.side("TETRIS_DUEL_ZONE_WIDTH", DEFAULT_ZONE_WIDTH)?,
            next_pieces: env.get("TETRIS_DUEL_NEXT_PIECES", DEFAULT_NEXT_PIECES)?,
            drop_interval: env.millis("TETRIS_DUEL_DROP_MS", DEFAULT_DROP_MS)?,
        };
        let hall = HallConfig {
            game,
            match_length: env.secs("TETRIS_DUEL_MATCH_SECS", defaults.hall.match_length.as_secs())?,
            countdown_tick: env.millis("TETRIS_DUEL_COUNTDOWN_MS", 1000)?,
            poll: PollPolicy {
                attempts: env.get("TETRIS_DUEL_POLL_ATTEMPTS", poll.attempts)?,
                interval: env.millis("TETRIS_DUEL_POLL_INTERVAL_MS", 50)?,
            },
            host: host_addr,
        };

        Ok(Self {
            host,
            port,
            hall,
            auth_timeout: env.secs("TETRIS_DUEL_AUTH_SECS", defaults.auth_timeout.as_secs())?,
            heartbeat: env.secs("TETRIS_DUEL_HEARTBEAT_SECS", defaults.heartbeat.as_secs())?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(move |key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.port, 7788);
        assert_eq!(config.hall.host, "127.0.0.1:7788");
        assert_eq!(config.hall.game.width, 10);
        assert_eq!(config.hall.match_length, Duration::from_secs(180));
        assert_eq!(config.heartbeat, Duration::from_secs(5));
        assert_eq!(config.auth_timeout, Duration::from_secs(10));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = config_from(&[
            ("TETRIS_DUEL_PORT", "0"),
            ("TETRIS_DUEL_HOST_ADDR", "10.0.0.5:9000"),
            ("TETRIS_DUEL_DROP_MS", "250"),
            ("TETRIS_DUEL_POLL_ATTEMPTS", " 7 "),
        ])
        .unwrap();
        assert_eq!(config.port, 0);
        assert_eq!(config.hall.host, "10.0.0.5:9000");
        assert_eq!(config.hall.game.drop_interval, Duration::from_millis(250));
        assert_eq!(config.hall.poll.attempts, 7);
    }

    #[test]
    fn unparsable_values_are_errors() {
        let err = config_from(&[("TETRIS_DUEL_PORT", "seventy")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "TETRIS_DUEL_PORT",
                value: "seventy".to_string()
            }
        );
    }

    #[test]
    fn zone_sides_have_a_minimum() {
        let err = config_from(&[("TETRIS_DUEL_ZONE_WIDTH", "3")]).unwrap_err();
        assert!(matches!(err, ConfigError::TooSmall { value: 3, .. }));
    }
}
