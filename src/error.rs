use crate::report::exit_codes;
use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Errors that reach the application boundary.
///
/// Gate and command failures never get here: they are folded into the
/// execution report. The binary wraps these in `anyhow` for context chains
/// and maps them back to an exit code with [`EngineError::exit_code`].
#[derive(Debug, Error)]
pub enum EngineError {
    // ── Contract ─────────────────────────────────────────────────────────
    #[error("contract: {0}")]
    Contract(#[from] ContractError),

    // ── Config ───────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── Evidence store ──────────────────────────────────────────────────
    #[error("evidence: {0}")]
    Evidence(#[from] EvidenceError),

    // ── Reports ─────────────────────────────────────────────────────────
    #[error("report: {0}")]
    Report(#[from] ReportError),
}

impl EngineError {
    /// Invalid input exits 2; anything else that stops the CLI exits 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Contract(_) | Self::Config(_) => exit_codes::INVALID,
            Self::Evidence(_) | Self::Report(_) => exit_codes::PARTIAL,
        }
    }
}

// ─── Contract errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContractError {
    /// Malformed contract text. `location` is `line:column` when known.
    #[error("parse error at {location}: {message}")]
    Parse { location: String, message: String },

    /// Well-formed text that violates the contract schema or semantics.
    #[error("validation error at {path}: {message}")]
    Validation { path: String, message: String },

    #[error("failed to read contract {path}: {message}")]
    Read { path: String, message: String },
}

impl ContractError {
    pub fn parse(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            location: location.into(),
            message: message.into(),
        }
    }

    pub fn validation(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            path: path.into(),
            message: message.into(),
        }
    }
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Evidence errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum EvidenceError {
    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("invalid digest: {0}")]
    InvalidDigest(String),

    #[error("io at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// ─── Gate errors ─────────────────────────────────────────────────────────────

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GateError {
    #[error("unknown gate type: {0}")]
    UnknownType(String),

    #[error("gate {gate} has invalid params: {message}")]
    InvalidParams { gate: String, message: String },

    /// Process could not be started. The only transient gate failure.
    #[error("failed to spawn check process: {0}")]
    Spawn(String),

    #[error("gate evaluation timed out after {0}ms")]
    Timeout(u64),
}

impl GateError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Spawn(_))
    }
}

// ─── Command errors ──────────────────────────────────────────────────────────

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("failed to spawn `{program}`: {message}")]
    Spawn { program: String, message: String },

    #[error("exited with code {0}")]
    NonZeroExit(i32),

    #[error("terminated by signal")]
    Signalled,

    #[error("timed out after {0}ms")]
    Timeout(u64),

    #[error("evidence write failed: {0}")]
    Evidence(String),
}

// ─── Report errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write report {path}: {message}")]
    Write { path: String, message: String },

    #[error("failed to read report {path}: {message}")]
    Read { path: String, message: String },
}

// ─── Convenience re-exports ─────────────────────────────────────────────────

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, EngineError>;
