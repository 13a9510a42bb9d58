use std::path::PathBuf;
use std::time::Duration;

use crate::params::EngineParams;

const DEFAULT_DATABASE_URL: &str = "sqlite:learning_engine.db?mode=rwc";
const DEFAULT_STORE_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: Option<String>,
    pub log_level: String,
    /// Daily rolling log files go here when set.
    pub log_dir: Option<PathBuf>,
    pub store_timeout: Duration,
    pub params_path: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let redis_url = std::env::var("REDIS_URL")
            .ok()
            .filter(|v| !v.trim().is_empty());

        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let file_logs = std::env::var("ENABLE_FILE_LOGS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);
        let log_dir = file_logs.then(|| {
            PathBuf::from(std::env::var("LOG_DIR").unwrap_or_else(|_| "./logs".to_string()))
        });

        let store_timeout_ms = std::env::var("STORE_TIMEOUT_MS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .unwrap_or(DEFAULT_STORE_TIMEOUT_MS);

        let params_path = std::env::var("ENGINE_PARAMS_PATH")
            .ok()
            .filter(|v| !v.trim().is_empty());

        Self {
            database_url,
            redis_url,
            log_level,
            log_dir,
            store_timeout: Duration::from_millis(store_timeout_ms),
            params_path,
        }
    }

    /// Falls back to defaults when the override file is unusable.
    pub fn engine_params(&self) -> EngineParams {
        let Some(path) = self.params_path.as_deref() else {
            return EngineParams::default();
        };
        match EngineParams::from_json_file(path) {
            Ok(params) => params,
            Err(err) => {
                tracing::warn!(path, error = %err, "engine params override ignored");
                EngineParams::default()
            }
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            redis_url: None,
            log_level: "info".to_string(),
            log_dir: None,
            store_timeout: Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS),
            params_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_params_file_falls_back_to_defaults() {
        let config = Config {
            params_path: Some("/nonexistent/params.json".to_string()),
            ..Config::default()
        };
        let params = config.engine_params();
        assert_eq!(params.bkt.p_guess, 0.25);
    }

    #[test]
    fn default_has_no_cache() {
        let config = Config::default();
        assert!(config.redis_url.is_none());
        assert_eq!(config.store_timeout, Duration::from_secs(5));
    }
}
