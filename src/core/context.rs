//! Operation contexts handed to plugins.
//!
//! Each plugin kind receives its own context type; the fields every kind
//! shares live in [`Shared`]. Contexts are built per operation and owned
//! by the task driving that operation, so plugins may mutate them freely.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::descriptor::{File, Infrastructure};
use crate::directory::BackendHandle;
use crate::plugin::AppCompileResult;
use crate::registry::Tuple;
use crate::ui::UiHandle;

/// Context fields shared by every plugin kind.
#[derive(Clone)]
pub struct Shared {
    /// Infrastructure credentials, populated before operations that need
    /// them (e.g. build).
    pub infra_creds: HashMap<String, String>,

    /// Sink for user-facing output.
    pub ui: UiHandle,

    /// Persistent directory service for cross-run state.
    pub directory: BackendHandle,

    /// Where supporting binaries are installed.
    pub install_dir: PathBuf,

    /// The descriptor the operation applies to.
    pub appfile: Arc<File>,

    /// Working directory of each foundation under the active
    /// infrastructure, in declaration order. Each contains the `app-*`
    /// staging subdirectories once compiled.
    pub foundation_dirs: Vec<PathBuf>,
}

/// Context for application plugin operations.
#[derive(Clone)]
pub struct AppContext {
    pub shared: Shared,

    /// Sub-action name and its arguments; set only for execute-style
    /// invocations.
    pub action: String,
    pub action_args: Vec<String>,

    /// Scratch directory for compile output. Cleared when a new compile
    /// runs.
    pub dir: PathBuf,

    /// Per-descriptor cache directory, kept across compiles.
    pub cache_dir: PathBuf,

    /// Local data directory for this Appfile.
    pub local_dir: PathBuf,

    /// Capability tuple the plugin was selected by.
    pub tuple: Tuple,

    /// The application section of the descriptor.
    pub application: crate::descriptor::Application,

    /// Dev-environment fragment paths collected from already-compiled
    /// dependencies. Populated only for the root application.
    pub dev_dep_fragments: Vec<PathBuf>,

    /// Result of this application's compile step, available to later
    /// pipeline stages.
    pub compile_result: Option<AppCompileResult>,
}

/// Context for infrastructure plugin operations.
#[derive(Clone)]
pub struct InfraContext {
    pub shared: Shared,

    pub action: String,
    pub action_args: Vec<String>,

    /// Scratch directory for compile output.
    pub dir: PathBuf,

    /// The infrastructure entry being operated on, including its flavor.
    pub infra: Infrastructure,
}

/// Context for foundation plugin operations.
#[derive(Clone)]
pub struct FoundationContext {
    pub shared: Shared,

    pub action: String,
    pub action_args: Vec<String>,

    /// Raw foundation configuration from the descriptor.
    pub config: HashMap<String, serde_json::Value>,

    /// Foundation configuration returned by the application currently
    /// being compiled. `None` outside app-scoped compiles, in which case
    /// the plugin prepares only infrastructure-level scaffolding.
    pub app_config: Option<HashMap<String, serde_json::Value>>,

    /// Scratch directory for compile output.
    pub dir: PathBuf,

    /// Capability tuple the plugin was selected by.
    pub tuple: Tuple,
}
