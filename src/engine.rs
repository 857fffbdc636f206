//! Script engine seam.
//!
//! The pool never talks to V8 directly. It compiles contexts through an
//! [`Engine`] and evaluates expressions through a [`ScriptContext`], so the
//! lifecycle logic can be driven by any engine that can "compile source,
//! evaluate expression, return value or raise".

use crate::bundle::Bundle;
use thiserror::Error;

/// Failure reported by an engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The script raised. The context is still usable.
    #[error("{0}")]
    Program(String),

    /// The host side failed (worker gone, heap exhausted, runtime could not
    /// be created). The context must not be reused.
    #[error("{0}")]
    Runtime(String),
}

impl EngineError {
    pub fn message(&self) -> &str {
        match self {
            EngineError::Program(msg) | EngineError::Runtime(msg) => msg,
        }
    }

    /// Whether the context that produced this error can serve more renders.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, EngineError::Program(_))
    }
}

/// Compiles bundles into execution contexts.
pub trait Engine: Send + Sync + 'static {
    type Context: ScriptContext;

    /// Parse and run the whole bundle once. Expensive.
    fn compile(&self, bundle: &Bundle) -> Result<Self::Context, EngineError>;
}

/// One compiled, stateful instance of a bundle.
///
/// Callers get `&mut self`, so a context never sees two evaluations at once.
pub trait ScriptContext: Send + 'static {
    fn evaluate(&mut self, expression: &str) -> Result<String, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_errors_are_recoverable() {
        assert!(EngineError::Program("Error: boom".into()).is_recoverable());
        assert!(!EngineError::Runtime("worker exited".into()).is_recoverable());
    }

    #[test]
    fn test_message_is_verbatim() {
        let err = EngineError::Program("Uncaught TypeError: x is not a function".into());
        assert_eq!(err.message(), "Uncaught TypeError: x is not a function");
        assert_eq!(err.to_string(), err.message());
    }
}
