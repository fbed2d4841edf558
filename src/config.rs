//! Session configuration.
//!
//! Options are recognized from the engine's flat string-to-string option
//! surface; unknown keys are ignored. The resolved values are also
//! injected into the worker environment before pool acquisition so the
//! worker side can mirror them (stream buffer size, reuse policy, memory
//! hint).

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WorkerError};

/// Option key: socket stream buffer size in bytes.
pub const OPT_BUFFER_SIZE: &str = "buffer_size";
/// Option key: whether workers are pooled for reuse.
pub const OPT_WORKER_REUSE: &str = "py_worker_reuse";
/// Option key: total executor memory in MiB.
pub const OPT_EXECUTOR_MEMORY: &str = "py_executor_memory";
/// Option key: executor core count, divides the memory budget.
pub const OPT_EXECUTOR_CORES: &str = "executor_cores";
/// Option key: worker runtime executable identity.
pub const OPT_PYTHON_ENV: &str = "python_env";
/// Option key: watchdog grace period after interruption, in milliseconds.
pub const OPT_TASK_KILL_TIMEOUT: &str = "task_kill_timeout";

/// Environment variable carrying the stream buffer size to the worker.
pub const ENV_BUFFER_SIZE: &str = "BUFFER_SIZE";
/// Environment variable carrying the reuse flag to the worker.
pub const ENV_WORKER_REUSE: &str = "WORKER_REUSE";
/// Environment variable carrying the per-worker memory hint, in MiB.
pub const ENV_WORKER_MEMORY_MB: &str = "WORKER_MEMORY_MB";

/// Default socket stream buffer size (64 KiB).
pub const DEFAULT_BUFFER_SIZE: usize = 65536;
/// Default watchdog grace period.
pub const DEFAULT_KILL_TIMEOUT_MS: u64 = 20_000;
/// Default worker executable.
pub const DEFAULT_WORKER_EXEC: &str = "python3";

/// Resolved configuration for worker sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Socket stream buffer size in bytes, both directions.
    pub buffer_size: usize,
    /// Return healthy workers to the idle pool. When `false` a worker is
    /// always closed at session end, never pooled.
    pub worker_reuse: bool,
    /// Total executor memory in MiB. Divided by `executor_cores` to size
    /// the per-worker memory hint; informational only.
    pub executor_memory_mb: Option<u64>,
    /// Core count of the enclosing executor.
    pub executor_cores: usize,
    /// Worker runtime executable identity.
    pub worker_exec: String,
    /// Watchdog grace period after interruption, in milliseconds.
    pub task_kill_timeout_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            worker_reuse: true,
            executor_memory_mb: None,
            executor_cores: 1,
            worker_exec: DEFAULT_WORKER_EXEC.to_string(),
            task_kill_timeout_ms: DEFAULT_KILL_TIMEOUT_MS,
        }
    }
}

impl WorkerConfig {
    /// Resolve a configuration from the engine's option map.
    ///
    /// Unknown keys are ignored; recognized keys with unparseable values
    /// are an error.
    pub fn from_options(options: &HashMap<String, String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(value) = options.get(OPT_BUFFER_SIZE) {
            config.buffer_size = parse(OPT_BUFFER_SIZE, value)?;
        }
        if let Some(value) = options.get(OPT_WORKER_REUSE) {
            config.worker_reuse = parse_bool(OPT_WORKER_REUSE, value)?;
        }
        if let Some(value) = options.get(OPT_EXECUTOR_MEMORY) {
            config.executor_memory_mb = Some(parse(OPT_EXECUTOR_MEMORY, value)?);
        }
        if let Some(value) = options.get(OPT_EXECUTOR_CORES) {
            config.executor_cores = parse(OPT_EXECUTOR_CORES, value)?;
        }
        if let Some(value) = options.get(OPT_PYTHON_ENV) {
            config.worker_exec = value.clone();
        }
        if let Some(value) = options.get(OPT_TASK_KILL_TIMEOUT) {
            config.task_kill_timeout_ms = parse(OPT_TASK_KILL_TIMEOUT, value)?;
        }

        Ok(config)
    }

    /// Watchdog grace period as a duration.
    #[inline]
    pub fn kill_timeout(&self) -> Duration {
        Duration::from_millis(self.task_kill_timeout_ms)
    }

    /// Per-worker memory hint: executor memory divided by core count.
    pub fn memory_per_core_mb(&self) -> Option<u64> {
        self.executor_memory_mb
            .map(|total| total / self.executor_cores.max(1) as u64)
    }
}

fn parse<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| WorkerError::InvalidOption {
        key,
        value: value.to_string(),
    })
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(WorkerError::InvalidOption {
            key,
            value: value.to_string(),
        }),
    }
}
