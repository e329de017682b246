//! Error taxonomy for the imaging pipeline.
//!
//! Every failure is fatal to the run. The variants exist so the operator can
//! tell a bad parset from a missing input from a crashed external tool.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for pipeline operations.
#[derive(Error, Debug)]
pub enum MsssError {
    /// Malformed or incomplete configuration. Eager validation collects
    /// every violation into a single message.
    #[error("configuration error: {0}")]
    Config(String),

    /// A parameter-set key was requested but is not defined.
    #[error("missing parameter: {0}")]
    MissingKey(String),

    /// A parameter-set value could not be coerced to the requested type.
    #[error("parameter {key}: expected {expected}, got {value:?}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        value: String,
    },

    /// A patch tried to replace a key the parameter set does not define.
    #[error("cannot patch undefined parameter: {0}")]
    UnknownKey(String),

    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Malformed text input (parset or statistics table).
    #[error("parse error in {} at line {line}: {message}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// Output already exists or a required input is missing.
    #[error("path error: {0}")]
    Path(String),

    /// External executable could not be started.
    #[error("failed to start {executable}: {reason}")]
    ProcessStart { executable: String, reason: String },

    /// External executable exited unsuccessfully. `code` is `None` when the
    /// process was terminated by a signal.
    #[error("{executable} failed with exit status {}", code.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string()))]
    ProcessFailure {
        executable: String,
        code: Option<i32>,
    },

    /// Collections that must line up do not (e.g. subband counts).
    #[error("data shape error: {0}")]
    DataShape(String),

    /// Table query output could not be interpreted.
    #[error("table error: {0}")]
    Table(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result alias used throughout the workspace.
pub type MsssResult<T> = Result<T, MsssError>;

impl MsssError {
    pub fn parse(path: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            line,
            message: message.into(),
        }
    }

    pub fn type_mismatch(
        key: impl Into<String>,
        expected: &'static str,
        value: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            key: key.into(),
            expected,
            value: value.into(),
        }
    }
}
