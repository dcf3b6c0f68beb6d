use crate::error::ConfigError;
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Config file looked up in the current directory.
pub const LOCAL_CONFIG_FILE: &str = "phasegate.toml";
/// Directory under `$HOME` holding the user-level config.
pub const USER_CONFIG_DIR: &str = ".phasegate";

// ── Top-level config ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Path the config was read from - computed, not serialized
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub runner: RunnerConfig,

    #[serde(default)]
    pub gates: GatesConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

// ── Scheduler ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Parallel worker bound per phase (0 = logical CPUs, minimum 2)
    #[serde(default)]
    pub max_workers: usize,
    /// Raise the run cancellation signal on Ctrl-C (default: true)
    #[serde(default = "default_true")]
    pub cancel_on_ctrl_c: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_workers: 0,
            cancel_on_ctrl_c: true,
        }
    }
}

impl SchedulerConfig {
    /// Effective worker bound: explicit value, else logical CPUs, never below 2.
    pub fn effective_max_workers(&self) -> usize {
        if self.max_workers > 0 {
            return self.max_workers;
        }
        std::thread::available_parallelism()
            .map_or(2, std::num::NonZeroUsize::get)
            .max(2)
    }
}

// ── Runner ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// In-memory cap per captured stream (default: 1 MiB)
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
    /// Grace period between SIGTERM and SIGKILL on timeout
    #[serde(default = "default_kill_grace_ms")]
    pub kill_grace_ms: u64,
    /// Task timeout when the contract declares none
    #[serde(default = "default_task_timeout_ms")]
    pub default_timeout_ms: u64,
    /// Attempts for evidence writes before the task fails
    #[serde(default = "default_evidence_retries")]
    pub evidence_retries: u32,
}

fn default_max_output_bytes() -> usize {
    1_048_576
}

fn default_kill_grace_ms() -> u64 {
    2_000
}

fn default_task_timeout_ms() -> u64 {
    600_000
}

fn default_evidence_retries() -> u32 {
    3
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_output_bytes: default_max_output_bytes(),
            kill_grace_ms: default_kill_grace_ms(),
            default_timeout_ms: default_task_timeout_ms(),
            evidence_retries: default_evidence_retries(),
        }
    }
}

// ── Gates ────────────────────────────────────────────────────────

/// What a failing non-blocking gate does to the phase it guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, strum::Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum NonBlockingFailure {
    /// Record the failure; the phase runs normally.
    #[default]
    Record,
    /// A failing pre-gate skips the phase's tasks; the run continues.
    SkipPhase,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatesConfig {
    /// Gate evaluation timeout when the gate declares none
    #[serde(default = "default_gate_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub non_blocking_failure: NonBlockingFailure,
}

fn default_gate_timeout_ms() -> u64 {
    60_000
}

impl Default for GatesConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_gate_timeout_ms(),
            non_blocking_failure: NonBlockingFailure::default(),
        }
    }
}

// ── Storage ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root holding `evidence/` and `reports/` (`~` is expanded)
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
}

fn default_state_dir() -> String {
    ".".into()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
        }
    }
}

impl StorageConfig {
    pub fn state_root(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.state_dir).into_owned())
    }

    pub fn evidence_dir(&self) -> PathBuf {
        self.state_root().join("evidence")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.state_root().join("reports")
    }
}

// ── Logging ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// trace | debug | info | warn | error
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Observer backend: "log" or "none"
    #[serde(default = "default_observer")]
    pub observer: String,
}

fn default_log_level() -> String {
    "info".into()
}

fn default_observer() -> String {
    "log".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            observer: default_observer(),
        }
    }
}

fn default_true() -> bool {
    true
}

// ── Loading ──────────────────────────────────────────────────────

impl Config {
    /// Load from `explicit`, else `./phasegate.toml`, else
    /// `~/.phasegate/config.toml`, else defaults; then apply env overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match Self::resolve_path(explicit)? {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn resolve_path(explicit: Option<&Path>) -> Result<Option<PathBuf>, ConfigError> {
        if let Some(path) = explicit {
            if !path.is_file() {
                return Err(ConfigError::Load(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            return Ok(Some(path.to_path_buf()));
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.is_file() {
            return Ok(Some(local));
        }

        let user = UserDirs::new()
            .map(|u| u.home_dir().join(USER_CONFIG_DIR).join("config.toml"))
            .filter(|path| path.is_file());
        Ok(user)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&contents)
            .map_err(|e| ConfigError::Load(format!("{}: {e}", path.display())))?;
        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Apply environment variable overrides to config
    pub fn apply_env_overrides(&mut self) {
        if let Ok(workers) = std::env::var("PHASEGATE_MAX_WORKERS") {
            match workers.trim().parse::<usize>() {
                Ok(n) => self.scheduler.max_workers = n,
                Err(_) => tracing::warn!("Ignoring invalid PHASEGATE_MAX_WORKERS: {workers}"),
            }
        }

        if let Ok(dir) = std::env::var("PHASEGATE_STATE_DIR") {
            if !dir.is_empty() {
                self.storage.state_dir = dir;
            }
        }

        if let Ok(level) = std::env::var("PHASEGATE_LOG") {
            if !level.is_empty() {
                self.logging.level = level;
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.runner.max_output_bytes == 0 {
            return Err(ConfigError::Validation(
                "runner.max_output_bytes must be positive".into(),
            ));
        }
        if self.runner.default_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "runner.default_timeout_ms must be positive".into(),
            ));
        }
        if self.gates.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "gates.timeout_ms must be positive".into(),
            ));
        }
        if self.storage.state_dir.trim().is_empty() {
            return Err(ConfigError::Validation(
                "storage.state_dir must not be empty".into(),
            ));
        }
        parse_level(&self.logging.level)?;
        Ok(())
    }

    pub fn log_level(&self) -> tracing::Level {
        parse_level(&self.logging.level).unwrap_or(tracing::Level::INFO)
    }
}

fn parse_level(level: &str) -> Result<tracing::Level, ConfigError> {
    level
        .parse::<tracing::Level>()
        .map_err(|_| ConfigError::Validation(format!("unknown log level `{level}`")))
}
