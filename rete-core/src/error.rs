//! Error kinds for the engine (spec §7).
//!
//! All variants except [`EngineError::System`] are recoverable: the
//! operation that raised them rolls back whatever partial state it had
//! built and the environment remains usable. `System` marks the
//! environment poisoned; [`crate::engine::Environment::halted`] is set and
//! further mutating commands are refused until `clear`.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("[MODULE{module}] syntax error: {message}")]
    Syntax { module: String, message: String },

    #[error("[MODULE{module}] constraint violation: {message}")]
    Constraint { module: String, message: String },

    #[error("[MODULE{module}] unknown name: {message}")]
    Name { module: String, message: String },

    #[error("[MODULE{module}] state error: {message}")]
    State { module: String, message: String },

    #[error("[MODULE{module}] evaluation error: {message}")]
    Evaluation { module: String, message: String },

    #[error("[MODULE{module}] resource error: {message}")]
    Resource { module: String, message: String },

    #[error("[MODULE{module}] SYSTEM ERROR: {message}")]
    System { module: String, message: String },
}

impl EngineError {
    pub fn is_system(&self) -> bool {
        matches!(self, EngineError::System { .. })
    }

    /// Maps an error kind onto the `rete-effects` recovery classification
    /// (spec §7 policy): every non-system kind is recoverable and the
    /// caller may just retry the command; `System` poisons the
    /// environment and needs a human to call `clear`.
    pub fn recovery(&self) -> rete_effects::Recovery {
        match self {
            EngineError::System { .. } => rete_effects::Recovery::ManualReview,
            EngineError::State { .. } => rete_effects::Recovery::CheckAndRetry,
            _ => rete_effects::Recovery::Retry,
        }
    }

    pub fn state(module: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::State {
            module: module.into(),
            message: message.into(),
        }
    }

    pub fn name(module: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::Name {
            module: module.into(),
            message: message.into(),
        }
    }

    pub fn constraint(module: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::Constraint {
            module: module.into(),
            message: message.into(),
        }
    }

    pub fn system(module: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::System {
            module: module.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_errors_require_manual_review() {
        let err = EngineError::system("MAIN", "invariant breach");
        assert_eq!(err.recovery(), rete_effects::Recovery::ManualReview);
    }

    #[test]
    fn non_system_errors_are_retryable() {
        let err = EngineError::constraint("MAIN", "bad slot");
        assert_eq!(err.recovery(), rete_effects::Recovery::Retry);
    }
}
