//! CLI-facing error type wrapping `rete_core::EngineError` plus the
//! REPL's own command-parsing and I/O failures.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Engine(#[from] rete_core::EngineError),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("watch log error: {0}")]
    WatchLog(String),
}

impl CliError {
    pub fn parse(message: impl Into<String>) -> Self {
        CliError::Parse(message.into())
    }

    /// Recovery classification for this error (spec §7 / `rete-effects`).
    /// A parse or I/O failure is always retryable -- the REPL just asks
    /// for another line; an engine error defers to its own mapping.
    pub fn recovery(&self) -> rete_effects::Recovery {
        match self {
            CliError::Engine(err) => err.recovery(),
            _ => rete_effects::Recovery::Retry,
        }
    }
}
