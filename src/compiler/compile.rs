//! Appfile compilation.
//!
//! Compilation resolves a descriptor's imports and dependencies into a
//! [`Compiled`] value: the merged root descriptor plus an acyclic
//! dependency graph. It is the only phase that may touch the network
//! (through the configured [`Fetcher`]); everything it fetches lands under
//! the compilation directory, so a compiled Appfile can be reloaded later
//! with [`Compiled::load`] without any connectivity.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;

use super::graph::{CompiledVertex, DepGraph};
use super::source::{resolve_source, storage_key, Fetcher, LocalFetcher};
use crate::descriptor::{default_file, identity, parse_descriptor_file, DetectConfig, File};
use crate::error::{CompileError, CompileResult};
use petgraph::stable_graph::NodeIndex;

/// Version of the on-disk compiled format.
pub const COMPILE_VERSION: u32 = 1;
/// File holding the serialized compiled data.
pub const COMPILE_FILENAME: &str = "Appfile.compiled";
/// Subdirectory holding fetched imports and dependencies.
pub const COMPILE_DEPS_FOLDER: &str = "deps";
/// Format-version marker, written before anything else so partial output
/// is distinguishable from valid output.
pub const COMPILE_VERSION_FILENAME: &str = "version";

/// Events reported to the [`CompileOpts`] callback during compilation.
#[derive(Debug, Clone)]
pub enum CompileEvent {
    /// An import source is being fetched.
    LoadingImport { source: String },
    /// A dependency source is being fetched.
    FetchingDependency { source: String },
}

/// Callback receiving [`CompileEvent`] notifications.
pub type CompileCallback = Arc<dyn Fn(&CompileEvent) + Send + Sync>;

/// Options for [`compile`].
#[derive(Clone)]
pub struct CompileOpts {
    /// Directory all compiled data is written to. Reset on every run.
    pub dir: PathBuf,

    /// Detection configuration used to default dependencies that carry no
    /// descriptor of their own.
    pub detect: DetectConfig,

    /// Transport used to fetch import and dependency sources.
    pub fetcher: Arc<dyn Fetcher>,

    /// Optional event callback.
    pub callback: Option<CompileCallback>,
}

impl CompileOpts {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            detect: DetectConfig::default(),
            fetcher: Arc::new(LocalFetcher),
            callback: None,
        }
    }
}

/// A compiled Appfile: the resolved root descriptor and the verified
/// acyclic graph of all its dependencies.
#[derive(Debug)]
pub struct Compiled {
    /// The resolved root descriptor.
    pub file: Arc<File>,

    /// Dependency graph. Every vertex is a [`CompiledVertex`]; edges point
    /// from a dependency to its dependent.
    pub graph: DepGraph,

    /// Index of the root vertex within `graph`.
    pub root: NodeIndex,
}

#[derive(Serialize, Deserialize)]
struct CompiledData {
    version: u32,
    root_key: String,
    vertices: Vec<(String, CompiledVertex)>,
    edges: Vec<(usize, usize)>,
}

impl Compiled {
    /// Persist the compiled data under `dir`.
    pub fn save(&self, dir: &Path) -> CompileResult<()> {
        let (vertices, edges) = self.graph.export();
        let root_key = vertices
            .iter()
            .find(|(_, v)| Arc::ptr_eq(&v.file, &self.file))
            .map(|(k, _)| k.clone())
            .ok_or_else(|| CompileError::Persist("root vertex missing from graph".into()))?;

        let data = CompiledData {
            version: COMPILE_VERSION,
            root_key,
            vertices,
            edges,
        };
        let json =
            serde_json::to_string_pretty(&data).map_err(|e| CompileError::Persist(e.to_string()))?;
        std::fs::write(dir.join(COMPILE_FILENAME), json)?;
        Ok(())
    }

    /// Load previously compiled data from `dir` without recompiling.
    pub fn load(dir: &Path) -> CompileResult<Compiled> {
        let version = std::fs::read_to_string(dir.join(COMPILE_VERSION_FILENAME))?;
        if version.trim() != COMPILE_VERSION.to_string() {
            return Err(CompileError::VersionMismatch {
                found: version.trim().to_string(),
                supported: COMPILE_VERSION,
            });
        }

        let json = std::fs::read_to_string(dir.join(COMPILE_FILENAME))?;
        let data: CompiledData =
            serde_json::from_str(&json).map_err(|e| CompileError::Persist(e.to_string()))?;
        let (graph, _) = DepGraph::import(data.vertices, data.edges)?;
        let root = graph
            .get(&data.root_key)
            .ok_or_else(|| CompileError::Persist("root vertex missing from data".into()))?;
        let file = graph
            .vertex(root)
            .map(|v| v.file.clone())
            .ok_or_else(|| CompileError::Persist("root vertex missing from data".into()))?;
        graph.validate(root)?;
        Ok(Compiled { file, graph, root })
    }
}

/// Compile a descriptor.
///
/// The compilation directory is removed and recreated; compilation is not
/// incremental. After the version marker is written, the root descriptor's
/// identity is ensured, imports are resolved and merged, and the
/// dependency graph is built, validated, and persisted.
pub async fn compile(mut file: File, opts: CompileOpts) -> CompileResult<Compiled> {
    tracing::debug!(dir = %opts.dir.display(), "resetting compilation directory");
    match std::fs::remove_dir_all(&opts.dir) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    std::fs::create_dir_all(&opts.dir)?;
    std::fs::write(
        opts.dir.join(COMPILE_VERSION_FILENAME),
        COMPILE_VERSION.to_string(),
    )?;

    identity::ensure_id(&mut file)?;

    // The root's cycle/cache key is its directory, the same shape as the
    // resolved source keys of imports and dependencies, so a reference
    // back to the root closes a detectable cycle.
    let root_key = file
        .dir()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|| "root".to_string());

    // Imports first: the root descriptor must be fully merged before its
    // fields (active infrastructure, dependencies) are inspected.
    let importer = Arc::new(ImportResolver::new(&opts));
    let ok = importer.resolve(root_key.clone(), &mut file).await;
    let errors = importer.take_errors();
    if !ok || !errors.is_empty() {
        return Err(CompileError::aggregate(errors));
    }

    file.validate()?;

    let root_file = Arc::new(file);
    let mut graph = DepGraph::new();
    let root_idx = graph.add(
        &root_key,
        CompiledVertex {
            file: root_file.clone(),
            dir: None,
            name: root_file
                .application
                .as_ref()
                .map(|a| a.name.clone())
                .unwrap_or_else(|| "root".to_string()),
        },
    );

    let builder = Arc::new(DepBuilder {
        fetcher: opts.fetcher.clone(),
        storage_dir: opts.dir.join(COMPILE_DEPS_FOLDER),
        detect: opts.detect.clone(),
        callback: opts.callback.clone(),
        importer,
        graph: Mutex::new(graph),
        errors: Mutex::new(Vec::new()),
    });
    builder.build(root_idx, root_file.clone()).await;

    // Dependency descriptors run through import resolution too, so their
    // failures land on the shared importer list; drain both.
    let mut errors = std::mem::take(&mut *builder.errors.lock());
    errors.extend(builder.importer.take_errors());
    if !errors.is_empty() {
        return Err(CompileError::aggregate(errors));
    }
    let graph = std::mem::take(&mut *builder.graph.lock());

    graph.validate(root_idx)?;
    let compiled = Compiled {
        file: root_file,
        graph,
        root: root_idx,
    };
    compiled.save(&opts.dir)?;

    tracing::debug!(
        vertices = compiled.graph.vertex_count(),
        "descriptor compiled"
    );
    Ok(compiled)
}

/// Resolves and merges a descriptor's imports, recursively and in
/// parallel.
///
/// The cycle graph, fetch cache, and error list are shared across every
/// concurrent branch: cross-branch cycles must be visible globally, and
/// several sibling failures should surface from one compile attempt.
struct ImportResolver {
    fetcher: Arc<dyn Fetcher>,
    storage_dir: PathBuf,
    callback: Option<CompileCallback>,
    cycle_graph: Mutex<DepGraph>,
    cache: Mutex<HashMap<String, Arc<File>>>,
    errors: Mutex<Vec<CompileError>>,
}

impl ImportResolver {
    fn new(opts: &CompileOpts) -> Self {
        Self {
            fetcher: opts.fetcher.clone(),
            storage_dir: opts.dir.join(COMPILE_DEPS_FOLDER),
            callback: opts.callback.clone(),
            cycle_graph: Mutex::new(DepGraph::new()),
            cache: Mutex::new(HashMap::new()),
            errors: Mutex::new(Vec::new()),
        }
    }

    fn push_error(&self, err: CompileError) {
        self.errors.lock().push(err);
    }

    fn take_errors(&self) -> Vec<CompileError> {
        std::mem::take(&mut *self.errors.lock())
    }

    /// Resolve all imports of `file` and merge them in. Returns false on
    /// failure, with the reasons recorded in the shared error list.
    fn resolve<'a>(
        self: &'a Arc<Self>,
        parent_key: String,
        file: &'a mut File,
    ) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            if file.import.is_empty() {
                return true;
            }

            let base_dir = match reference_base_dir(file) {
                Some(dir) => dir,
                None => match std::env::current_dir() {
                    Ok(dir) => dir,
                    Err(e) => {
                        self.push_error(e.into());
                        return false;
                    }
                },
            };

            // One task per sibling import; merges are applied afterwards
            // in declaration order, not completion order.
            let mut join_set: JoinSet<(usize, Option<Arc<File>>)> = JoinSet::new();
            let mut merge: Vec<Option<Arc<File>>> = vec![None; file.import.len()];

            // A failing sibling never aborts the others: every resolution
            // and cycle error is recorded so one attempt reports them all.
            // A failed entry simply stays unfetched.
            for (idx, import) in file.import.iter().enumerate() {
                let source = match resolve_source(&import.source, &base_dir) {
                    Ok(source) => source,
                    Err(e) => {
                        self.push_error(e);
                        continue;
                    }
                };

                // Register the edge and check for cycles before fetching.
                {
                    let mut graph = self.cycle_graph.lock();
                    let parent = graph.add(&parent_key, placeholder(&parent_key));
                    let child = graph.add(&source, placeholder(&source));
                    graph.connect(parent, child);
                    if let Err(e) = graph.check_cycles() {
                        self.push_error(e);
                        continue;
                    }
                }

                let resolver = Arc::clone(self);
                join_set.spawn(async move {
                    let fetched = resolver.fetch_import(source).await;
                    (idx, fetched)
                });
            }

            // Wait for every sibling before merging anything.
            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok((idx, fetched)) => merge[idx] = fetched,
                    Err(e) => {
                        self.push_error(CompileError::Persist(format!(
                            "import task panicked: {}",
                            e
                        )));
                        return false;
                    }
                }
            }

            // A missing entry means that fetch failed; the error is
            // already in the shared list.
            if merge.iter().any(Option::is_none) {
                return false;
            }

            // Import content is the base; the importing descriptor's own
            // content wins. Identity and path are cleared on a defensive
            // copy so the cache's shared value is never mutated.
            let own = file.clone();
            let mut merged = File::default();
            for imported in merge.into_iter().flatten() {
                let mut copy = (*imported).clone();
                copy.id.clear();
                copy.path = None;
                merged.merge(&copy);
            }
            merged.merge(&own);
            merged.import = own.import;
            merged.source = own.source;
            *file = merged;
            true
        })
    }

    async fn fetch_import(self: Arc<Self>, source: String) -> Option<Arc<File>> {
        if let Some(cached) = self.cache.lock().get(&source) {
            return Some(cached.clone());
        }

        if let Some(callback) = &self.callback {
            callback(&CompileEvent::LoadingImport {
                source: source.clone(),
            });
        }

        let dst = self.storage_dir.join(storage_key(&source));
        let fetched = match self.fetcher.fetch(&source, &dst).await {
            Ok(Some(path)) => path,
            Ok(None) => {
                self.push_error(CompileError::Fetch {
                    source_ref: source.clone(),
                    reason: "no descriptor found at import source".into(),
                });
                return None;
            }
            Err(e) => {
                self.push_error(e);
                return None;
            }
        };

        let mut file = match parse_descriptor_file(&fetched) {
            Ok(file) => file,
            Err(e) => {
                self.push_error(e);
                return None;
            }
        };

        // The parsed copy lives under storage; record where it came from
        // so its own relative references still resolve. Imports may
        // themselves import.
        file.source = source.clone();
        if !self.resolve(source.clone(), &mut file).await {
            return None;
        }

        let file = Arc::new(file);
        self.cache.lock().insert(source, file.clone());
        Some(file)
    }
}

/// Directory relative source references in `file` resolve against: the
/// original source location for fetched copies, the descriptor's own
/// directory otherwise.
fn reference_base_dir(file: &File) -> Option<PathBuf> {
    if !file.source.is_empty() {
        let path = PathBuf::from(&file.source);
        if path.is_dir() {
            return Some(path);
        }
        return path.parent().map(|p| p.to_path_buf());
    }
    file.dir()
}

fn placeholder(key: &str) -> CompiledVertex {
    CompiledVertex {
        file: Arc::new(File::default()),
        dir: None,
        name: key.to_string(),
    }
}

/// Builds the dependency graph by fetching and compiling every descriptor
/// reachable through `application.dependencies`.
struct DepBuilder {
    fetcher: Arc<dyn Fetcher>,
    storage_dir: PathBuf,
    detect: DetectConfig,
    callback: Option<CompileCallback>,
    /// Shared with import resolution so a descriptor imported in several
    /// places is fetched once.
    importer: Arc<ImportResolver>,
    graph: Mutex<DepGraph>,
    errors: Mutex<Vec<CompileError>>,
}

impl DepBuilder {
    fn push_error(&self, err: CompileError) {
        self.errors.lock().push(err);
    }

    /// Fetch and add every dependency of `file`, recursively. Sibling
    /// dependencies are fetched in parallel.
    fn build<'a>(self: &'a Arc<Self>, parent_idx: NodeIndex, file: Arc<File>) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let deps = match &file.application {
                Some(app) if !app.dependencies.is_empty() => app.dependencies.clone(),
                _ => return,
            };

            let base_dir = reference_base_dir(&file).unwrap_or_else(|| PathBuf::from("."));
            let mut join_set = JoinSet::new();
            for dep in deps {
                let source = match resolve_source(&dep.source, &base_dir) {
                    Ok(source) => source,
                    Err(e) => {
                        self.push_error(e);
                        continue;
                    }
                };
                let builder = Arc::clone(self);
                join_set.spawn(async move { builder.build_one(parent_idx, source).await });
            }

            while let Some(joined) = join_set.join_next().await {
                if let Err(e) = joined {
                    self.push_error(CompileError::Persist(format!(
                        "dependency task panicked: {}",
                        e
                    )));
                }
            }
        })
    }

    async fn build_one(self: Arc<Self>, parent_idx: NodeIndex, source: String) {
        // Seen already: just connect the edge and re-check for cycles.
        let existing = self.graph.lock().get(&source);
        if let Some(idx) = existing {
            let mut graph = self.graph.lock();
            graph.connect(idx, parent_idx);
            if let Err(e) = graph.check_cycles() {
                self.push_error(e);
            }
            return;
        }

        if let Some(callback) = &self.callback {
            callback(&CompileEvent::FetchingDependency {
                source: source.clone(),
            });
        }
        tracing::debug!(source = %source, "fetching dependency");

        let dst = self.storage_dir.join(storage_key(&source));
        let mut dep_file = match self.fetcher.fetch(&source, &dst).await {
            Ok(Some(path)) => match parse_descriptor_file(&path) {
                Ok(file) => file,
                Err(e) => {
                    self.push_error(e);
                    return;
                }
            },
            Ok(None) => {
                // No descriptor in the dependency source: synthesize one
                // through type detection, persisted under storage.
                match self.default_dependency(&source, &dst) {
                    Ok(file) => file,
                    Err(e) => {
                        self.push_error(e);
                        return;
                    }
                }
            }
            Err(e) => {
                self.push_error(e);
                return;
            }
        };

        dep_file.source = source.clone();
        if !self.importer.resolve(source.clone(), &mut dep_file).await {
            return;
        }

        if let Err(e) = identity::ensure_id(&mut dep_file) {
            self.push_error(e);
            return;
        }

        if let Err(e) = dep_file.validate() {
            self.push_error(CompileError::Merge {
                source_ref: source.clone(),
                reason: e.to_string(),
            });
            return;
        }

        let dep_file = Arc::new(dep_file);
        let name = dep_file
            .application
            .as_ref()
            .map(|a| a.name.clone())
            .unwrap_or_else(|| source.clone());
        let idx = {
            let mut graph = self.graph.lock();
            let idx = graph.add(
                &source,
                CompiledVertex {
                    file: dep_file.clone(),
                    dir: Some(dst),
                    name,
                },
            );
            graph.connect(idx, parent_idx);
            if let Err(e) = graph.check_cycles() {
                self.push_error(e);
                return;
            }
            idx
        };

        self.build(idx, dep_file).await;
    }

    fn default_dependency(&self, source: &str, dst: &Path) -> CompileResult<File> {
        std::fs::create_dir_all(dst)?;
        let mut file = default_file(Path::new(source), &self.detect)?;
        file.path = Some(dst.join("Appfile"));
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_descriptor(dir: &Path, content: &str) -> PathBuf {
        std::fs::create_dir_all(dir).unwrap();
        let path = dir.join("Appfile");
        std::fs::write(&path, content).unwrap();
        path
    }

    fn root_descriptor(extra: &str) -> String {
        format!(
            r#"
[application]
name = "web"
type = "rails"
{extra}

[project]
name = "web"
infrastructure = "aws"

[[infrastructure]]
name = "aws"
type = "aws"
flavor = "simple"
"#
        )
    }

    async fn compile_at(path: &Path, out: &Path) -> CompileResult<Compiled> {
        let file = parse_descriptor_file(path).unwrap();
        compile(file, CompileOpts::new(out)).await
    }

    #[tokio::test]
    async fn test_compile_no_deps() {
        let tmp = TempDir::new().unwrap();
        let app = write_descriptor(&tmp.path().join("app"), &root_descriptor(""));
        let out = tmp.path().join("out");

        let compiled = compile_at(&app, &out).await.unwrap();
        assert_eq!(compiled.graph.vertex_count(), 1);
        assert!(!compiled.file.id.is_empty());
        assert!(out.join(COMPILE_VERSION_FILENAME).exists());
        assert!(out.join(COMPILE_FILENAME).exists());
    }

    #[tokio::test]
    async fn test_compile_assigns_stable_identity() {
        let tmp = TempDir::new().unwrap();
        let app = write_descriptor(&tmp.path().join("app"), &root_descriptor(""));
        let out = tmp.path().join("out");

        let first = compile_at(&app, &out).await.unwrap().file.id.clone();
        let second = compile_at(&app, &out).await.unwrap().file.id.clone();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_compile_merges_import() {
        let tmp = TempDir::new().unwrap();
        write_descriptor(
            &tmp.path().join("base"),
            r#"
[[infrastructure]]
name = "aws"
type = "aws"
flavor = "simple"

[[infrastructure.foundation]]
name = "consul"
"#,
        );
        let app = write_descriptor(
            &tmp.path().join("app"),
            r#"
[[import]]
source = "../base"

[application]
name = "web"
type = "rails"

[project]
name = "web"
infrastructure = "aws"
"#,
        );

        let compiled = compile_at(&app, &tmp.path().join("out")).await.unwrap();
        let infra = compiled.file.active_infrastructure().unwrap();
        assert_eq!(infra.foundations.len(), 1);
        assert_eq!(infra.foundations[0].name, "consul");
    }

    #[tokio::test]
    async fn test_compile_import_own_content_wins() {
        let tmp = TempDir::new().unwrap();
        write_descriptor(
            &tmp.path().join("base"),
            r#"
[application]
name = "base-name"
type = "php"
"#,
        );
        let app = write_descriptor(
            &tmp.path().join("app"),
            &format!(
                "[[import]]\nsource = \"../base\"\n{}",
                root_descriptor("")
            ),
        );

        let compiled = compile_at(&app, &tmp.path().join("out")).await.unwrap();
        let application = compiled.file.application.as_ref().unwrap();
        assert_eq!(application.name, "web");
        assert_eq!(application.type_, "rails");
    }

    #[tokio::test]
    async fn test_compile_import_cycle_rejected() {
        let tmp = TempDir::new().unwrap();
        let x = tmp.path().join("x");
        let y = tmp.path().join("y");
        write_descriptor(&x, "[[import]]\nsource = \"../y\"\n");
        write_descriptor(&y, "[[import]]\nsource = \"../x\"\n");

        let err = compile_at(&x.join("Appfile"), &tmp.path().join("out"))
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("cycle found"), "unexpected error: {}", msg);
        let x_key = std::fs::canonicalize(&x).unwrap();
        let y_key = std::fs::canonicalize(&y).unwrap();
        assert!(msg.contains(&*x_key.to_string_lossy()));
        assert!(msg.contains(&*y_key.to_string_lossy()));
    }

    #[tokio::test]
    async fn test_compile_with_dependency() {
        let tmp = TempDir::new().unwrap();
        write_descriptor(
            &tmp.path().join("auth"),
            r#"
[application]
name = "auth"
type = "go"

[project]
name = "auth"
infrastructure = "aws"

[[infrastructure]]
name = "aws"
type = "aws"
flavor = "simple"
"#,
        );
        let app = write_descriptor(
            &tmp.path().join("app"),
            &root_descriptor("[[application.dependency]]\nsource = \"../auth\""),
        );

        let out = tmp.path().join("out");
        let compiled = compile_at(&app, &out).await.unwrap();
        assert_eq!(compiled.graph.vertex_count(), 2);
        compiled.graph.validate(compiled.root).unwrap();

        let order = compiled.graph.topo_order().unwrap();
        assert_eq!(*order.last().unwrap(), compiled.root);

        // The dependency vertex has a working dir under deps/ and its own
        // identity.
        let (_, dep) = compiled
            .graph
            .vertices()
            .find(|(idx, _)| *idx != compiled.root)
            .unwrap();
        assert!(dep.dir.as_ref().unwrap().starts_with(out.join(COMPILE_DEPS_FOLDER)));
        assert!(!dep.file.id.is_empty());
        assert_eq!(dep.name, "auth");
    }

    #[tokio::test]
    async fn test_compile_dependency_cycle_rejected() {
        let tmp = TempDir::new().unwrap();
        let dep_block = |target: &str| {
            format!(
                r#"
[application]
name = "{target}-user"
type = "go"

[[application.dependency]]
source = "../{target}"

[project]
name = "p"
infrastructure = "aws"

[[infrastructure]]
name = "aws"
type = "aws"
flavor = "simple"
"#
            )
        };
        let x = tmp.path().join("x");
        write_descriptor(&x, &dep_block("y"));
        write_descriptor(&tmp.path().join("y"), &dep_block("x"));

        let err = compile_at(&x.join("Appfile"), &tmp.path().join("out"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cycle found"));
    }

    #[tokio::test]
    async fn test_compile_shared_dependency_single_vertex() {
        let tmp = TempDir::new().unwrap();
        write_descriptor(
            &tmp.path().join("shared"),
            r#"
[application]
name = "shared"
type = "go"

[project]
name = "shared"
infrastructure = "aws"

[[infrastructure]]
name = "aws"
type = "aws"
flavor = "simple"
"#,
        );
        write_descriptor(
            &tmp.path().join("mid"),
            r#"
[application]
name = "mid"
type = "go"

[[application.dependency]]
source = "../shared"

[project]
name = "mid"
infrastructure = "aws"

[[infrastructure]]
name = "aws"
type = "aws"
flavor = "simple"
"#,
        );
        let app = write_descriptor(
            &tmp.path().join("app"),
            &root_descriptor(
                "[[application.dependency]]\nsource = \"../mid\"\n\n[[application.dependency]]\nsource = \"../shared\"",
            ),
        );

        let compiled = compile_at(&app, &tmp.path().join("out")).await.unwrap();
        // root, mid, shared: the shared vertex appears exactly once.
        assert_eq!(compiled.graph.vertex_count(), 3);
    }

    #[tokio::test]
    async fn test_compile_fails_when_dependency_import_unresolvable() {
        let tmp = TempDir::new().unwrap();
        write_descriptor(
            &tmp.path().join("auth"),
            r#"
[[import]]
source = "../does-not-exist"

[application]
name = "auth"
type = "go"

[project]
name = "auth"
infrastructure = "aws"

[[infrastructure]]
name = "aws"
type = "aws"
flavor = "simple"
"#,
        );
        let app = write_descriptor(
            &tmp.path().join("app"),
            &root_descriptor("[[application.dependency]]\nsource = \"../auth\""),
        );

        let err = compile_at(&app, &tmp.path().join("out")).await.unwrap_err();
        assert!(err.to_string().contains("does-not-exist"), "{}", err);
    }

    #[tokio::test]
    async fn test_concurrent_import_failures_aggregate() {
        let tmp = TempDir::new().unwrap();
        // Two import sources that exist but carry no descriptor.
        std::fs::create_dir_all(tmp.path().join("empty-a")).unwrap();
        std::fs::create_dir_all(tmp.path().join("empty-b")).unwrap();
        let app = write_descriptor(
            &tmp.path().join("app"),
            &format!(
                "[[import]]\nsource = \"../empty-a\"\n\n[[import]]\nsource = \"../empty-b\"\n{}",
                root_descriptor("")
            ),
        );

        let err = compile_at(&app, &tmp.path().join("out")).await.unwrap_err();
        let msg = err.to_string();
        assert!(matches!(&err, CompileError::Aggregate(_)), "{}", msg);
        assert!(msg.contains("empty-a"), "{}", msg);
        assert!(msg.contains("empty-b"), "{}", msg);
    }

    #[tokio::test]
    async fn test_compile_missing_dependency_is_resolution_error() {
        let tmp = TempDir::new().unwrap();
        let app = write_descriptor(
            &tmp.path().join("app"),
            &root_descriptor("[[application.dependency]]\nsource = \"../nope\""),
        );

        let err = compile_at(&app, &tmp.path().join("out")).await.unwrap_err();
        assert!(matches!(
            err,
            CompileError::SourceResolution { .. } | CompileError::Aggregate(_)
        ));
    }

    #[tokio::test]
    async fn test_compile_validation_failure_names_infrastructure() {
        let tmp = TempDir::new().unwrap();
        let app = write_descriptor(
            &tmp.path().join("app"),
            r#"
[application]
name = "web"
type = "rails"

[project]
name = "web"
infrastructure = "missing"
"#,
        );

        let err = compile_at(&app, &tmp.path().join("out")).await.unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[tokio::test]
    async fn test_load_compiled_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let app = write_descriptor(&tmp.path().join("app"), &root_descriptor(""));
        let out = tmp.path().join("out");

        let compiled = compile_at(&app, &out).await.unwrap();
        let loaded = Compiled::load(&out).unwrap();
        assert_eq!(loaded.file.id, compiled.file.id);
        assert_eq!(loaded.graph.vertex_count(), 1);
    }

    #[tokio::test]
    async fn test_load_rejects_bad_version() {
        let tmp = TempDir::new().unwrap();
        let app = write_descriptor(&tmp.path().join("app"), &root_descriptor(""));
        let out = tmp.path().join("out");
        compile_at(&app, &out).await.unwrap();

        std::fs::write(out.join(COMPILE_VERSION_FILENAME), "999").unwrap();
        assert!(matches!(
            Compiled::load(&out),
            Err(CompileError::VersionMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_compile_events_reported() {
        let tmp = TempDir::new().unwrap();
        write_descriptor(
            &tmp.path().join("auth"),
            r#"
[application]
name = "auth"
type = "go"

[project]
name = "auth"
infrastructure = "aws"

[[infrastructure]]
name = "aws"
type = "aws"
flavor = "simple"
"#,
        );
        let app = write_descriptor(
            &tmp.path().join("app"),
            &root_descriptor("[[application.dependency]]\nsource = \"../auth\""),
        );

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let mut opts = CompileOpts::new(tmp.path().join("out"));
        opts.callback = Some(Arc::new(move |event: &CompileEvent| {
            sink.lock().push(format!("{:?}", event));
        }));

        let file = parse_descriptor_file(&app).unwrap();
        compile(file, opts).await.unwrap();
        let events = events.lock();
        assert!(events.iter().any(|e| e.contains("FetchingDependency")));
    }
}
