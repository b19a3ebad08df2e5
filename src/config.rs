//! Desk configuration read from the environment.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::poller::DEFAULT_POLL_INTERVAL;

pub(crate) const API_URL_VAR: &str = "REALTY_DESK_API_URL";
pub(crate) const PUSH_URL_VAR: &str = "REALTY_DESK_PUSH_URL";
pub(crate) const POLL_SECS_VAR: &str = "REALTY_DESK_POLL_SECS";
pub(crate) const SESSION_PATH_VAR: &str = "REALTY_DESK_SESSION_PATH";

/// Where the desk talks to and where it keeps its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeskConfig {
    /// Root of the REST API; `/api/...` is appended.
    pub api_base_url: String,
    /// `ws://` or `wss://` endpoint of the push channel.
    pub push_url: String,
    /// Time between new-listing polls.
    pub poll_interval: Duration,
    pub session_path: PathBuf,
}

impl Default for DeskConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000".to_string(),
            push_url: "ws://localhost:3000/ws".to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            session_path: default_session_path(env::var_os("HOME").map(PathBuf::from)),
        }
    }
}

fn default_session_path(home: Option<PathBuf>) -> PathBuf {
    home.unwrap_or_else(|| PathBuf::from("."))
        .join(".realty-desk")
        .join("session.json")
}

impl DeskConfig {
    /// Read the `REALTY_DESK_*` variables, falling back to the defaults for
    /// any that are unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a variable is set but unusable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for an empty URL or a poll interval
    /// that is not a positive whole number of seconds.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self {
            session_path: default_session_path(lookup("HOME").map(PathBuf::from)),
            ..Self::default()
        };

        if let Some(url) = lookup(API_URL_VAR) {
            config.api_base_url = non_empty(API_URL_VAR, url)?;
        }
        if let Some(url) = lookup(PUSH_URL_VAR) {
            config.push_url = non_empty(PUSH_URL_VAR, url)?;
        }
        if let Some(secs) = lookup(POLL_SECS_VAR) {
            config.poll_interval = match secs.trim().parse::<u64>() {
                Ok(n) if n > 0 => Duration::from_secs(n),
                _ => {
                    return Err(ConfigError::Invalid {
                        var: POLL_SECS_VAR,
                        value: secs,
                    });
                }
            };
        }
        if let Some(path) = lookup(SESSION_PATH_VAR) {
            config.session_path = PathBuf::from(non_empty(SESSION_PATH_VAR, path)?);
        }
        Ok(config)
    }
}

fn non_empty(var: &'static str, value: String) -> Result<String, ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Invalid { var, value });
    }
    Ok(value)
}
