//! Orchestration core.
//!
//! [`Core`] takes a compiled Appfile plus the plugin registries and drives
//! the compile pipeline: infrastructure first, then foundations, then
//! every application in the dependency graph in dependency order, with
//! dependency-emitted dev fragments propagated up to the root.

pub mod context;

pub use context::{AppContext, FoundationContext, InfraContext, Shared};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use petgraph::stable_graph::NodeIndex;
use tokio::task::JoinSet;

use crate::compiler::{Compiled, CompiledVertex};
use crate::descriptor::Foundation;
use crate::directory::BackendHandle;
use crate::error::{OrchestrateError, OrchestrateResult};
use crate::plugin::{
    App, AppCompileResult, AppFactory, FoundationFactory, FoundationPlugin, Infra, InfraFactory,
};
use crate::registry::{Registry, Tuple};
use crate::ui::UiHandle;

/// Staging subdirectories created under every foundation working dir.
const APP_SUBDIRS: &[&str] = &["app-dev", "app-dev-dep", "app-build", "app-deploy"];

/// Configuration for [`Core::new`]. The core may keep parts of it without
/// deep copying; do not reuse the value after construction.
pub struct CoreConfig {
    /// Global data directory shared by all runs.
    pub data_dir: PathBuf,

    /// Local data directory for this single Appfile. Survives compiles.
    pub local_dir: PathBuf,

    /// Output directory for compiled data. Cleared on every compile.
    pub compile_dir: PathBuf,

    /// The compiled Appfile to operate on.
    pub compiled: Arc<Compiled>,

    /// Persistent directory service handle.
    pub directory: BackendHandle,

    /// Application implementations, keyed by capability tuple.
    pub apps: Registry<AppFactory>,

    /// Infrastructure implementations, keyed by infrastructure type.
    pub infras: HashMap<String, InfraFactory>,

    /// Foundation implementations, keyed by capability tuple.
    pub foundations: Registry<FoundationFactory>,

    /// Sink for user-facing output.
    pub ui: UiHandle,
}

/// The orchestration entry point.
#[derive(Clone)]
pub struct Core {
    compiled: Arc<Compiled>,
    apps: Arc<Registry<AppFactory>>,
    infras: Arc<HashMap<String, InfraFactory>>,
    foundations: Arc<Registry<FoundationFactory>>,
    directory: BackendHandle,
    ui: UiHandle,
    data_dir: PathBuf,
    local_dir: PathBuf,
    compile_dir: PathBuf,
}

/// A resolved foundation under the active infrastructure.
struct ActiveFoundation {
    entry: Foundation,
    tuple: Tuple,
    plugin: Arc<dyn FoundationPlugin>,
}

impl Core {
    pub fn new(config: CoreConfig) -> Core {
        Core {
            compiled: config.compiled,
            apps: Arc::new(config.apps),
            infras: Arc::new(config.infras),
            foundations: Arc::new(config.foundations),
            directory: config.directory,
            ui: config.ui,
            data_dir: config.data_dir,
            local_dir: config.local_dir,
            compile_dir: config.compile_dir,
        }
    }

    pub fn compiled(&self) -> &Compiled {
        &self.compiled
    }

    /// Run the full compile pipeline: infrastructure, foundations, then
    /// every application in the graph in dependency order. The first
    /// error stops the walk (fail-fast; already-running vertices finish)
    /// and is returned.
    pub async fn compile(&self) -> OrchestrateResult<()> {
        let (infra, mut infra_ctx) = self.infra()?;
        let foundations = Arc::new(self.foundations_for_root()?);

        tracing::info!(dir = %self.compile_dir.display(), "removing previously compiled output");
        match std::fs::remove_dir_all(&self.compile_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        std::fs::create_dir_all(&self.compile_dir)?;

        tracing::info!("running infra compile");
        self.ui.message("Compiling infra...");
        std::fs::create_dir_all(&infra_ctx.dir)?;
        infra.compile(&mut infra_ctx).await?;

        tracing::info!("running foundation compiles");
        for found in foundations.iter() {
            self.ui
                .message(&format!("Compiling foundation: {}", found.tuple.type_));
            let mut ctx = self.foundation_context(
                found,
                self.compile_dir
                    .join(format!("foundation-{}", found.entry.name)),
                None,
            );
            std::fs::create_dir_all(&ctx.dir)?;
            found.plugin.compile(&mut ctx).await?;
        }

        self.walk(foundations).await
    }

    /// Walk the dependency graph, compiling every application. Vertices
    /// with no ordering relationship run concurrently; a single shared
    /// flag implements cooperative fail-fast cancellation.
    async fn walk(&self, foundations: Arc<Vec<ActiveFoundation>>) -> OrchestrateResult<()> {
        let graph = &self.compiled.graph;
        let total = graph.vertex_count();
        let stop = Arc::new(AtomicBool::new(false));
        let results: Arc<Mutex<Vec<AppCompileResult>>> = Arc::new(Mutex::new(Vec::new()));

        let mut indegree: HashMap<NodeIndex, usize> = graph
            .vertices()
            .map(|(idx, _)| (idx, graph.dependencies_of(idx).len()))
            .collect();

        let mut join_set: JoinSet<(NodeIndex, OrchestrateResult<()>)> = JoinSet::new();
        let ready: Vec<NodeIndex> = indegree
            .iter()
            .filter(|(_, &count)| count == 0)
            .map(|(&idx, _)| idx)
            .collect();
        for idx in ready {
            self.spawn_vertex(&mut join_set, idx, &foundations, &stop, &results);
        }

        let mut first_err: Option<OrchestrateError> = None;
        let mut completed = 0;
        while completed < total {
            let Some(joined) = join_set.join_next().await else {
                break;
            };
            let (idx, result) = joined
                .map_err(|e| OrchestrateError::Internal(format!("walk task panicked: {}", e)))?;
            completed += 1;

            if let Err(e) = result {
                stop.store(true, Ordering::SeqCst);
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }

            for dependent in graph.dependents_of(idx) {
                let count = indegree
                    .get_mut(&dependent)
                    .ok_or_else(|| OrchestrateError::Internal("unknown vertex".into()))?;
                *count -= 1;
                if *count == 0 {
                    self.spawn_vertex(&mut join_set, dependent, &foundations, &stop, &results);
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn spawn_vertex(
        &self,
        join_set: &mut JoinSet<(NodeIndex, OrchestrateResult<()>)>,
        idx: NodeIndex,
        foundations: &Arc<Vec<ActiveFoundation>>,
        stop: &Arc<AtomicBool>,
        results: &Arc<Mutex<Vec<AppCompileResult>>>,
    ) {
        let core = self.clone();
        let foundations = foundations.clone();
        let stop = stop.clone();
        let results = results.clone();
        join_set.spawn(async move {
            let result = core
                .compile_vertex(idx, &foundations, &stop, &results)
                .await;
            (idx, result)
        });
    }

    async fn compile_vertex(
        &self,
        idx: NodeIndex,
        foundations: &[ActiveFoundation],
        stop: &AtomicBool,
        results: &Mutex<Vec<AppCompileResult>>,
    ) -> OrchestrateResult<()> {
        // Something else failed already: skip without starting any work.
        if stop.load(Ordering::SeqCst) {
            return Ok(());
        }

        let is_root = idx == self.compiled.root;
        let vertex = self
            .compiled
            .graph
            .vertex(idx)
            .cloned()
            .ok_or_else(|| OrchestrateError::Internal("unknown vertex".into()))?;

        let mut ctx = self.app_context(&vertex, foundations)?;
        if is_root {
            self.ui.header("Compiling main application...");
        } else {
            self.ui
                .header(&format!("Compiling dependency '{}'...", vertex.name));
        }

        let app = self.app(&ctx.tuple)?;

        // The root runs strictly after every dependency, so the collected
        // fragment list is complete by the time it is injected.
        if is_root {
            let results = results.lock();
            ctx.dev_dep_fragments = results
                .iter()
                .filter_map(|r| r.dev_dep_fragment_path.clone())
                .collect();
        }

        std::fs::create_dir_all(&ctx.dir)?;
        let result = app.compile(&mut ctx).await?;

        // Recompile each foundation scoped to this application, and make
        // sure the staging subdirectories exist.
        for (i, found) in foundations.iter().enumerate() {
            let dir = ctx.shared.foundation_dirs.get(i).cloned().ok_or_else(|| {
                OrchestrateError::Internal("foundation dir list out of sync".into())
            })?;
            let mut fctx = self.foundation_context(
                found,
                dir.clone(),
                result.as_ref().map(|r| r.foundation_config.clone()),
            );
            fctx.shared.appfile = vertex.file.clone();
            std::fs::create_dir_all(&fctx.dir)?;
            found.plugin.compile(&mut fctx).await?;

            for sub in APP_SUBDIRS {
                std::fs::create_dir_all(dir.join(sub))?;
            }
        }

        if let Some(result) = result {
            results.lock().push(result);
        }
        Ok(())
    }

    /// Resolve and instantiate the active infrastructure implementation.
    fn infra(&self) -> OrchestrateResult<(Box<dyn Infra>, InfraContext)> {
        let config = self
            .compiled
            .file
            .active_infrastructure()
            .ok_or_else(|| OrchestrateError::InfrastructureNotFound(self.project_infra_name()))?;

        let factory = self
            .infras
            .get(&config.type_)
            .ok_or_else(|| OrchestrateError::InfraTypeNotSupported(config.type_.clone()))?;
        let infra = factory()?;

        let dir = self.compile_dir.join(format!("infra-{}", config.name));
        let ctx = InfraContext {
            shared: self.shared(self.compiled.file.clone(), Vec::new()),
            action: String::new(),
            action_args: Vec::new(),
            dir,
            infra: config.clone(),
        };
        Ok((infra, ctx))
    }

    /// Resolve and instantiate every foundation under the root's active
    /// infrastructure.
    fn foundations_for_root(&self) -> OrchestrateResult<Vec<ActiveFoundation>> {
        let config = self
            .compiled
            .file
            .active_infrastructure()
            .ok_or_else(|| OrchestrateError::InfrastructureNotFound(self.project_infra_name()))?;

        let mut active = Vec::with_capacity(config.foundations.len());
        for entry in &config.foundations {
            let tuple = Tuple::new(&entry.name, &config.type_, &config.flavor);
            let factory = self
                .foundations
                .lookup(&tuple)
                .ok_or_else(|| OrchestrateError::FoundationNotFound(tuple.clone()))?;
            let plugin: Arc<dyn FoundationPlugin> = Arc::from(factory()?);
            active.push(ActiveFoundation {
                entry: entry.clone(),
                tuple,
                plugin,
            });
        }
        Ok(active)
    }

    fn foundation_context(
        &self,
        found: &ActiveFoundation,
        dir: PathBuf,
        app_config: Option<HashMap<String, serde_json::Value>>,
    ) -> FoundationContext {
        FoundationContext {
            shared: self.shared(self.compiled.file.clone(), Vec::new()),
            action: String::new(),
            action_args: Vec::new(),
            config: found.entry.config.clone(),
            app_config,
            dir,
            tuple: found.tuple.clone(),
        }
    }

    /// Build the application context for one graph vertex.
    fn app_context(
        &self,
        vertex: &CompiledVertex,
        foundations: &[ActiveFoundation],
    ) -> OrchestrateResult<AppContext> {
        let file = &vertex.file;
        let config = file.active_infrastructure().ok_or_else(|| {
            OrchestrateError::VertexContext {
                name: vertex.name.clone(),
                reason: format!(
                    "infrastructure not found in descriptor: {}",
                    file.project
                        .as_ref()
                        .map(|p| p.infrastructure.clone())
                        .unwrap_or_default()
                ),
            }
        })?;

        let application = file
            .application
            .clone()
            .ok_or_else(|| OrchestrateError::VertexContext {
                name: vertex.name.clone(),
                reason: "descriptor has no application".into(),
            })?;
        let tuple = Tuple::new(&application.type_, &config.type_, &config.flavor);

        // The main application compiles into "app"; dependencies into a
        // directory keyed by their persisted UUID.
        let output_dir = if file.id == self.compiled.file.id {
            self.compile_dir.join("app")
        } else {
            self.compile_dir.join(format!("dep-{}", file.id))
        };

        let cache_dir = self.data_dir.join("cache").join(&file.id);
        std::fs::create_dir_all(&cache_dir)?;

        // Foundation dirs follow the root's resolved foundation set; a
        // dependency's own descriptor may list none.
        let foundation_dirs = foundations
            .iter()
            .map(|f| output_dir.join(format!("foundation-{}", f.entry.name)))
            .collect();

        Ok(AppContext {
            shared: self.shared(file.clone(), foundation_dirs),
            action: String::new(),
            action_args: Vec::new(),
            dir: output_dir,
            cache_dir,
            local_dir: self.local_dir.clone(),
            tuple,
            application,
            dev_dep_fragments: Vec::new(),
            compile_result: None,
        })
    }

    /// Instantiate the application implementation for a tuple.
    fn app(&self, tuple: &Tuple) -> OrchestrateResult<Box<dyn App>> {
        tracing::info!(%tuple, "loading app implementation");
        let factory = self
            .apps
            .lookup(tuple)
            .ok_or_else(|| OrchestrateError::AppNotFound(tuple.clone()))?;
        Ok(factory()?)
    }

    fn shared(&self, appfile: Arc<crate::descriptor::File>, foundation_dirs: Vec<PathBuf>) -> Shared {
        Shared {
            infra_creds: HashMap::new(),
            ui: self.ui.clone(),
            directory: self.directory.clone(),
            install_dir: self.data_dir.join("binaries"),
            appfile,
            foundation_dirs,
        }
    }

    fn project_infra_name(&self) -> String {
        self.compiled
            .file
            .project
            .as_ref()
            .map(|p| p.infrastructure.clone())
            .unwrap_or_default()
    }
}
