//! Error types for descriptor compilation and orchestration.
//!
//! - [`CompileError`]: errors raised while compiling an Appfile into a graph.
//! - [`OrchestrateError`]: top-level errors from the orchestration pipeline.
//! - [`PluginError`]: errors crossing the plugin boundary.

pub mod compile_error;
pub mod orchestrate_error;
pub mod plugin_error;

pub use compile_error::CompileError;
pub use orchestrate_error::OrchestrateError;
pub use plugin_error::PluginError;

/// Convenience alias for compiler-level results.
pub type CompileResult<T> = Result<T, CompileError>;
/// Convenience alias for orchestration-level results.
pub type OrchestrateResult<T> = Result<T, OrchestrateError>;
