//! Binary-level error type.
//!
//! Wraps the core crate's [`stackaudit_core::AnalysisError`] plus the
//! out-of-scope collaborator failures (toolchain invocation, report I/O,
//! missing linker symbols) that precede or follow the core analysis.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolchainError {
    #[error("`{binary}` not found on PATH (override with {env_var})")]
    BinaryNotFound { binary: String, env_var: String },

    #[error("`{binary} {args}` exited with status {status}: {stderr}")]
    NonZeroExit {
        binary: String,
        args: String,
        status: i32,
        stderr: String,
    },

    #[error("`{binary}` produced non-UTF8 output")]
    NonUtf8Output { binary: String },

    #[error("failed to spawn `{binary}`: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("temp-file fallback for `{binary}` failed: {source}")]
    TempFile {
        binary: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum BinError {
    #[error(transparent)]
    Toolchain(#[from] ToolchainError),

    #[error(transparent)]
    Analysis(#[from] stackaudit_core::AnalysisError),

    #[error("report I/O error: {0}")]
    ReportIo(#[from] std::io::Error),
}
