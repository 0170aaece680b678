//! Configuration loading from environment variables.
//!
//! All values are read from `TSDB_*` environment variables with sensible
//! defaults. Invalid values fall back to defaults without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `TSDB_REQUEST_TIMEOUT_MS` | 0 | Request timeout in ms (0 = none) |
//! | `TSDB_DEFAULT_MAX_DATA_POINTS` | 100 | Points per series when the request sets none |
//! | `TSDB_LOG_FORMAT` | json | `json` or `pretty` |
//! | `TSDB_LOG_LEVEL` | info | Log filter directive |
//! | `TSDB_LOG_FILE` | unset | Log file path (stderr when unset) |

use std::path::PathBuf;
use std::time::Duration;

use crate::executor::{DEFAULT_MAX_DATA_POINTS, MAX_DATA_POINTS_CEILING};
use crate::scheduler::SchedulerConfig;
use crate::telemetry::{LogConfig, LogFormat};

/// Effective configuration summary, as printed by `tsdb-cli config show`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveConfig {
    pub request_timeout_ms: u64,
    pub default_max_data_points: u32,
    pub log_format: &'static str,
    pub log_level: String,
    pub log_file: Option<String>,
}

/// All configuration loaded from environment variables.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub scheduler: SchedulerConfig,
    pub log: LogConfig,
}

/// Parse a `u32` env var, returning `default` on missing or invalid.
fn parse_u32(key: &str, default: u32) -> u32 {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<u32>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Non-empty string env var.
fn parse_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn load_scheduler_config() -> SchedulerConfig {
    let timeout_ms = parse_u64("TSDB_REQUEST_TIMEOUT_MS", 0);
    let max_points = parse_u32("TSDB_DEFAULT_MAX_DATA_POINTS", DEFAULT_MAX_DATA_POINTS);
    SchedulerConfig {
        request_timeout: (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms)),
        default_max_data_points: max_points.clamp(1, MAX_DATA_POINTS_CEILING),
    }
}

fn load_log_config() -> LogConfig {
    let format = parse_string("TSDB_LOG_FORMAT")
        .and_then(|v| v.parse::<LogFormat>().ok())
        .unwrap_or_default();
    let level = parse_string("TSDB_LOG_LEVEL").unwrap_or_else(|| "info".to_string());
    LogConfig {
        format,
        level,
        output_path: parse_string("TSDB_LOG_FILE").map(PathBuf::from),
    }
}

/// Load all configuration from environment variables.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load() -> EnvConfig {
    EnvConfig {
        scheduler: load_scheduler_config(),
        log: load_log_config(),
    }
}

impl EnvConfig {
    /// Return a summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            request_timeout_ms: self
                .scheduler
                .request_timeout
                .map_or(0, |t| t.as_millis() as u64),
            default_max_data_points: self.scheduler.default_max_data_points,
            log_format: match self.log.format {
                LogFormat::Json => "json",
                LogFormat::Pretty => "pretty",
            },
            log_level: self.log.level.clone(),
            log_file: self
                .log
                .output_path
                .as_ref()
                .map(|p| p.display().to_string()),
        }
    }
}

impl EffectiveConfig {
    /// `KEY=value` lines, one per variable.
    pub fn to_env_lines(&self) -> Vec<String> {
        vec![
            format!("TSDB_REQUEST_TIMEOUT_MS={}", self.request_timeout_ms),
            format!("TSDB_DEFAULT_MAX_DATA_POINTS={}", self.default_max_data_points),
            format!("TSDB_LOG_FORMAT={}", self.log_format),
            format!("TSDB_LOG_LEVEL={}", self.log_level),
            format!("TSDB_LOG_FILE={}", self.log_file.as_deref().unwrap_or("")),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Serialize env-mutating tests to avoid cross-test pollution.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const ENV_KEYS: &[&str] = &[
        "TSDB_REQUEST_TIMEOUT_MS",
        "TSDB_DEFAULT_MAX_DATA_POINTS",
        "TSDB_LOG_FORMAT",
        "TSDB_LOG_LEVEL",
        "TSDB_LOG_FILE",
    ];

    fn clear_env_vars() {
        for k in ENV_KEYS {
            std::env::remove_var(k);
        }
    }

    #[test]
    fn test_defaults_are_sensible() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let cfg = load();
        assert_eq!(cfg.scheduler.request_timeout, None);
        assert_eq!(cfg.scheduler.default_max_data_points, 100);
        assert_eq!(cfg.log.format, LogFormat::Json);
        assert_eq!(cfg.log.level, "info");
        assert!(cfg.log.output_path.is_none());
    }

    #[test]
    fn test_env_vars_override_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("TSDB_REQUEST_TIMEOUT_MS", "2500");
        std::env::set_var("TSDB_DEFAULT_MAX_DATA_POINTS", "640");
        std::env::set_var("TSDB_LOG_FORMAT", "pretty");
        std::env::set_var("TSDB_LOG_LEVEL", "tsdb_core=debug");
        std::env::set_var("TSDB_LOG_FILE", "/tmp/tsdb.log");
        let cfg = load();
        assert_eq!(cfg.scheduler.request_timeout, Some(Duration::from_millis(2500)));
        assert_eq!(cfg.scheduler.default_max_data_points, 640);
        assert_eq!(cfg.log.format, LogFormat::Pretty);
        assert_eq!(cfg.log.level, "tsdb_core=debug");
        assert_eq!(cfg.log.output_path, Some(PathBuf::from("/tmp/tsdb.log")));
        clear_env_vars();
    }

    #[test]
    fn test_invalid_env_falls_back_to_default() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("TSDB_REQUEST_TIMEOUT_MS", "soon");
        std::env::set_var("TSDB_DEFAULT_MAX_DATA_POINTS", "-3");
        std::env::set_var("TSDB_LOG_FORMAT", "xml");
        std::env::set_var("TSDB_LOG_LEVEL", "   ");
        let cfg = load();
        assert_eq!(cfg.scheduler.request_timeout, None);
        assert_eq!(cfg.scheduler.default_max_data_points, 100);
        assert_eq!(cfg.log.format, LogFormat::Json);
        assert_eq!(cfg.log.level, "info");
        clear_env_vars();
    }

    #[test]
    fn test_max_data_points_is_clamped() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("TSDB_DEFAULT_MAX_DATA_POINTS", "0");
        assert_eq!(load().scheduler.default_max_data_points, 1);

        std::env::set_var("TSDB_DEFAULT_MAX_DATA_POINTS", "9999999");
        assert_eq!(load().scheduler.default_max_data_points, 100_000);
        clear_env_vars();
    }

    #[test]
    fn test_effective_config_lists_every_variable() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("TSDB_REQUEST_TIMEOUT_MS", "750");
        let eff = load().effective_config();
        assert_eq!(eff.request_timeout_ms, 750);

        let lines = eff.to_env_lines();
        assert_eq!(lines.len(), ENV_KEYS.len());
        for (line, key) in lines.iter().zip(ENV_KEYS) {
            assert!(line.starts_with(&format!("{key}=")), "{line}");
        }
        assert_eq!(lines[0], "TSDB_REQUEST_TIMEOUT_MS=750");
        clear_env_vars();
    }
}
