//! Appfile compilation.
//!
//! Turns a parsed descriptor into a [`Compiled`] artifact: imports are
//! fetched and merged, the dependency graph is built and validated, and
//! the result is persisted so later invocations can reload it without
//! recompiling.

mod compile;
mod graph;
mod source;

pub use compile::{
    compile, CompileCallback, CompileEvent, CompileOpts, Compiled, COMPILE_DEPS_FOLDER,
    COMPILE_FILENAME, COMPILE_VERSION, COMPILE_VERSION_FILENAME,
};
pub use graph::{CompiledVertex, DepGraph};
pub use source::{resolve_source, storage_key, Fetcher, LocalFetcher, DESCRIPTOR_NAMES};
