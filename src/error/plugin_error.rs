//! Errors crossing the plugin boundary.

use thiserror::Error;

/// Errors returned by plugin factories and plugin pipeline steps.
///
/// Plugin errors are propagated verbatim by the orchestration core and
/// trigger fail-fast cancellation of the remaining graph walk.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("plugin failed to start properly: {0}")]
    Construction(String),
    #[error("compile step failed: {0}")]
    Compile(String),
    #[error("build step failed: {0}")]
    Build(String),
    #[error("deploy step failed: {0}")]
    Deploy(String),
    #[error("dev step failed: {0}")]
    Dev(String),
    #[error("credentials error: {0}")]
    Creds(String),
    #[error("execute step failed: {0}")]
    Execute(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Other(String),
}
