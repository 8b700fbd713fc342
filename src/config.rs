use crate::ledger::RetentionPolicy;
use crate::stats::{SUMMARY_RECENT_LIMIT, TIMELINE_LIMIT, default_active_window};
use chrono::Duration;
use std::{env, path::PathBuf, str::FromStr};
use tracing::warn;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_DATA_DIR: &str = "data";

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub port: u16,
    pub retention: RetentionPolicy,
    pub active_window: Duration,
    pub recent_limit: usize,
    pub timeline_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            port: DEFAULT_PORT,
            retention: RetentionPolicy::unbounded(),
            active_window: default_active_window(),
            recent_limit: SUMMARY_RECENT_LIMIT,
            timeline_limit: TIMELINE_LIMIT,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from any variable source. Bad values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let data_dir = lookup("APP_DATA_DIR")
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let max_age = parse_positive::<i64, _>(&lookup, "LEDGER_RETENTION_DAYS").and_then(Duration::try_days);
        let max_events_per_user = parse_positive::<usize, _>(&lookup, "LEDGER_MAX_EVENTS_PER_USER");

        Self {
            data_dir,
            port: parse_var(&lookup, "PORT").unwrap_or(defaults.port),
            retention: RetentionPolicy {
                max_age,
                max_events_per_user,
            },
            active_window: parse_positive::<i64, _>(&lookup, "LEDGER_ACTIVE_WINDOW_HOURS")
                .and_then(Duration::try_hours)
                .unwrap_or(defaults.active_window),
            recent_limit: parse_var(&lookup, "LEDGER_RECENT_LIMIT").unwrap_or(defaults.recent_limit),
            timeline_limit: parse_var(&lookup, "LEDGER_TIMELINE_LIMIT")
                .unwrap_or(defaults.timeline_limit),
        }
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparseable setting");
            None
        }
    }
}

fn parse_positive<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr + PartialOrd + Default,
    F: Fn(&str) -> Option<String>,
{
    let value = parse_var::<T, F>(lookup, key)?;
    if value > T::default() {
        Some(value)
    } else {
        warn!(key, "ignoring non-positive setting");
        None
    }
}
