//! # AppForge — An Appfile Compiler and Orchestration Core
//!
//! `appforge` turns a declarative application descriptor (an *Appfile*)
//! into a compiled, validated dependency graph and orchestrates pluggable
//! implementations over it:
//!
//! - **Descriptor model**: TOML or JSON Appfiles with application,
//!   project, infrastructure, foundation, and customization sections,
//!   plus imports and upstream dependencies.
//! - **Imports**: sibling imports are fetched concurrently, merged in
//!   declaration order, and the importing descriptor's own content wins.
//! - **Dependency graph**: every upstream dependency becomes a vertex in
//!   a validated DAG with the root application as its single sink, with
//!   named cycle diagnostics.
//! - **Stable identity**: each descriptor carries a persisted UUID in a
//!   hidden sidecar file, generated once and reused forever.
//! - **Plugin dispatch**: application and foundation implementations are
//!   registered under `(type, infra, flavor)` capability tuples with
//!   wildcard matching; lookup is deterministic and most-specific-first.
//! - **Orchestration**: infrastructure, foundations, and applications
//!   compile in dependency order with fail-fast concurrent walking, and
//!   dependency dev fragments flow up to the root application.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//!
//! use appforge::{compile, parse_descriptor_file, CompileOpts};
//!
//! #[tokio::main]
//! async fn main() {
//!     let file = parse_descriptor_file(Path::new("Appfile")).unwrap();
//!     let opts = CompileOpts::new("/tmp/app/compiled");
//!     let compiled = compile(file, opts).await.unwrap();
//!     println!("{} vertices", compiled.graph.vertex_count());
//! }
//! ```

pub mod compiler;
pub mod core;
pub mod descriptor;
pub mod directory;
pub mod error;
pub mod plugin;
pub mod registry;
pub mod ui;

pub use crate::compiler::{
    compile, CompileCallback, CompileEvent, CompileOpts, Compiled, CompiledVertex, DepGraph,
    Fetcher, LocalFetcher,
};
pub use crate::core::{AppContext, Core, CoreConfig, FoundationContext, InfraContext, Shared};
pub use crate::descriptor::{
    default_file, parse_descriptor, parse_descriptor_file, Application, DescriptorFormat,
    DetectConfig, Detector, File, Foundation, Infrastructure,
};
pub use crate::directory::{Backend, BackendHandle, MemoryBackend};
pub use crate::error::{
    CompileError, CompileResult, OrchestrateError, OrchestrateResult, PluginError,
};
pub use crate::plugin::{
    app_factory, foundation_factory, infra_factory, App, AppCompileResult, AppFactory, DevDep,
    FoundationCompileResult, FoundationFactory, FoundationPlugin, Infra, InfraCompileResult,
    InfraFactory,
};
pub use crate::registry::{Registry, Tuple};
pub use crate::ui::{NullUi, TracingUi, Ui, UiHandle};
