//! Orchestration-level error types.

use thiserror::Error;

use super::PluginError;
use crate::registry::Tuple;

/// Errors raised by the orchestration core while driving the compile
/// pipeline over a compiled graph.
#[derive(Debug, Error)]
pub enum OrchestrateError {
    #[error("infrastructure not found in descriptor: {0}")]
    InfrastructureNotFound(String),
    #[error("infrastructure type not supported: {0}")]
    InfraTypeNotSupported(String),
    #[error("foundation implementation not found for tuple: {0}")]
    FoundationNotFound(Tuple),
    #[error("app implementation not found for tuple: {0}")]
    AppNotFound(Tuple),
    #[error("error loading descriptor for '{name}': {reason}")]
    VertexContext { name: String, reason: String },
    #[error(transparent)]
    Plugin(#[from] PluginError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tuple_errors_name_the_tuple() {
        let tuple = Tuple::new("consul", "aws", "simple");
        let err = OrchestrateError::FoundationNotFound(tuple.clone());
        assert_eq!(
            err.to_string(),
            r#"foundation implementation not found for tuple: ("consul", "aws", "simple")"#
        );

        let err = OrchestrateError::AppNotFound(tuple);
        assert!(err.to_string().contains(r#"("consul", "aws", "simple")"#));
    }
}
