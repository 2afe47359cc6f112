//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use crate::task::ProfilingMode;

/// Service configuration, read from the environment in `main`.
///
/// A worker must be able to rebuild every dependency it needs from this
/// struct alone (see `WorkerContext::from_config`), so it stays small and
/// fully serializable-by-value.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the REST server binds to.
    pub bind_addr: String,
    /// Path of the local libSQL database file.
    pub db_path: PathBuf,
    /// Root directory for uploaded sources and their artifacts.
    pub upload_dir: PathBuf,
    /// Offset between submission and the job's due time. Submission already
    /// awaits file durability, so this defaults to zero.
    pub schedule_delay: Duration,
    /// How often the dispatch loop polls the job store for due jobs.
    pub poll_interval: Duration,
    /// Ceiling on concurrently executing jobs.
    pub max_concurrent_jobs: usize,
    /// Profiling mode used when the request does not name one.
    pub default_mode: ProfilingMode,
    /// Inference service used by the LLM strategy.
    pub ollama: OllamaConfig,
}

/// Ollama-compatible inference endpoint.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub host: String,
    pub model: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:11434".to_string(),
            model: "llama3.1:8b".to_string(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
            db_path: PathBuf::from("./data/profiled.db"),
            upload_dir: PathBuf::from("./data/files"),
            schedule_delay: Duration::ZERO,
            poll_interval: Duration::from_secs(1),
            max_concurrent_jobs: 3,
            default_mode: ProfilingMode::Classical,
            ollama: OllamaConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Build a configuration from `PROFILED_*` / `OLLAMA_*` environment
    /// variables, falling back to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            bind_addr: env_or("PROFILED_BIND_ADDR", defaults.bind_addr),
            db_path: std::env::var("PROFILED_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            upload_dir: std::env::var("PROFILED_UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            schedule_delay: env_secs("PROFILED_SCHEDULE_DELAY_SECS", defaults.schedule_delay),
            poll_interval: env_secs("PROFILED_POLL_INTERVAL_SECS", defaults.poll_interval),
            max_concurrent_jobs: env_parsed(
                "PROFILED_MAX_CONCURRENT_JOBS",
                defaults.max_concurrent_jobs,
            ),
            default_mode: std::env::var("PROFILED_DEFAULT_MODE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.default_mode),
            ollama: OllamaConfig {
                host: env_or("OLLAMA_HOST", defaults.ollama.host),
                model: env_or("OLLAMA_MODEL", defaults.ollama.model),
            },
        }
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = ServerConfig::default();
        assert_eq!(config.max_concurrent_jobs, 3);
        assert_eq!(config.schedule_delay, Duration::ZERO);
        assert_eq!(config.default_mode, ProfilingMode::Classical);
    }
}
