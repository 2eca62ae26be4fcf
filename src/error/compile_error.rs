//! Compiler-level error types.

use thiserror::Error;

/// Errors raised while compiling an Appfile into a [`Compiled`] graph.
///
/// Import and dependency resolution run concurrently, so several failures
/// can surface from one compile attempt. Those are collected into a single
/// [`CompileError::Aggregate`] rather than reported one at a time.
///
/// [`Compiled`]: crate::compiler::Compiled
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("descriptor parse error: {0}")]
    Parse(String),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("infrastructure not found in descriptor: {0}")]
    InfrastructureNotFound(String),
    #[error("error resolving source '{source_ref}': {reason}")]
    SourceResolution { source_ref: String, reason: String },
    #[error("error fetching '{source_ref}': {reason}")]
    Fetch { source_ref: String, reason: String },
    #[error("cycle found: {}", chain.join(", "))]
    CycleDetected { chain: Vec<String> },
    #[error("error merging import '{source_ref}': {reason}")]
    Merge { source_ref: String, reason: String },
    #[error("error reading descriptor identity: {0}")]
    Identity(String),
    #[error("invalid compiled graph: {0}")]
    GraphValidation(String),
    #[error("compiled data version mismatch: found {found}, supported {supported}")]
    VersionMismatch { found: String, supported: u32 },
    #[error("{} errors occurred during compilation:\n{}", .0.len(), format_aggregate(.0))]
    Aggregate(Vec<CompileError>),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("error persisting compiled data: {0}")]
    Persist(String),
}

impl CompileError {
    /// Collapse an error list into one error. A single entry is returned
    /// as itself rather than wrapped.
    pub fn aggregate(mut errors: Vec<CompileError>) -> CompileError {
        if errors.len() == 1 {
            errors.remove(0)
        } else {
            CompileError::Aggregate(errors)
        }
    }
}

fn format_aggregate(errors: &[CompileError]) -> String {
    errors
        .iter()
        .map(|e| format!("  * {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_error_names_chain() {
        let err = CompileError::CycleDetected {
            chain: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "cycle found: a, b, a");
    }

    #[test]
    fn test_fetch_error_names_reference_and_has_no_cause() {
        use std::error::Error;

        let err = CompileError::Fetch {
            source_ref: "/deps/auth".into(),
            reason: "denied".into(),
        };
        assert_eq!(err.to_string(), "error fetching '/deps/auth': denied");
        // The reference is plain data, not a wrapped error cause.
        assert!(err.source().is_none());
    }

    #[test]
    fn test_aggregate_single_unwraps() {
        let err = CompileError::aggregate(vec![CompileError::Parse("bad".into())]);
        assert!(matches!(err, CompileError::Parse(_)));
    }

    #[test]
    fn test_aggregate_many_lists_all() {
        let err = CompileError::aggregate(vec![
            CompileError::Parse("x".into()),
            CompileError::MissingField("application.name"),
        ]);
        let msg = err.to_string();
        assert!(msg.starts_with("2 errors occurred"));
        assert!(msg.contains("descriptor parse error: x"));
        assert!(msg.contains("missing required field: application.name"));
    }
}
