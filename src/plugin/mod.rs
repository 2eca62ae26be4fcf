//! Plugin contracts.
//!
//! All concrete behavior (how a Rails app builds, how AWS credentials are
//! gathered, how Consul scaffolding is laid down) lives behind these three
//! traits. An implementation declares the capability tuples it serves when
//! it is registered; the orchestration core only ever talks to the traits.
//!
//! When building plugins it is possible for one crate to serve several
//! tuples, but each trait object is expected to implement exactly one.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::{AppContext, FoundationContext, InfraContext};
use crate::error::PluginError;

/// An application implementation for one (app type, infra, flavor) tuple.
#[async_trait]
pub trait App: Send + Sync {
    /// Compile the application's artifacts into the context's compile dir.
    async fn compile(&self, ctx: &mut AppContext) -> Result<Option<AppCompileResult>, PluginError>;

    async fn build(&self, ctx: &mut AppContext) -> Result<(), PluginError>;

    async fn deploy(&self, ctx: &mut AppContext) -> Result<(), PluginError>;

    /// Manage the local development environment.
    async fn dev(&self, ctx: &mut AppContext) -> Result<(), PluginError>;

    /// Called when this application is an upstream dependency of another.
    /// `dst` is the application being developed, `src` is this one.
    /// Returning `None` means no dev-dependency work is needed.
    async fn dev_dep(
        &self,
        dst: &AppContext,
        src: &AppContext,
    ) -> Result<Option<DevDep>, PluginError>;
}

/// An infrastructure implementation, keyed by infrastructure type alone.
#[async_trait]
pub trait Infra: Send + Sync {
    /// Query the user or environment for provider credentials. Encryption
    /// and storage of the result belong to the caller.
    async fn creds(&self, ctx: &mut InfraContext) -> Result<HashMap<String, String>, PluginError>;

    /// Check cached credentials before any operation uses them.
    async fn verify_creds(&self, ctx: &mut InfraContext) -> Result<(), PluginError>;

    async fn execute(&self, ctx: &mut InfraContext) -> Result<(), PluginError>;

    async fn compile(
        &self,
        ctx: &mut InfraContext,
    ) -> Result<Option<InfraCompileResult>, PluginError>;

    /// Flavors this implementation supports.
    fn flavors(&self) -> Vec<String>;
}

/// A foundation implementation for one (name, infra, flavor) tuple.
#[async_trait]
pub trait FoundationPlugin: Send + Sync {
    async fn compile(
        &self,
        ctx: &mut FoundationContext,
    ) -> Result<Option<FoundationCompileResult>, PluginError>;

    /// Build or destroy foundation infrastructure; the context's action
    /// field selects the operation.
    async fn infra(&self, ctx: &mut FoundationContext) -> Result<(), PluginError>;
}

/// Result of an application compile step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppCompileResult {
    /// Version of the compiled artifact layout. Pure metadata.
    #[serde(default)]
    pub version: u32,

    /// Per-application foundation configuration, handed to each foundation
    /// plugin's app-scoped compile step.
    #[serde(default)]
    pub foundation_config: HashMap<String, serde_json::Value>,

    /// Path to the dev-environment fragment this application contributes
    /// when it is a dependency. Collected and injected into the root
    /// application's compile input.
    #[serde(default)]
    pub dev_dep_fragment_path: Option<PathBuf>,
}

/// Result of a dev-dependency setup step.
#[derive(Debug, Clone, Default)]
pub struct DevDep {
    /// Files the dependency contributed to the destination environment.
    pub files: Vec<PathBuf>,
}

/// Result of an infrastructure compile step. Currently carries nothing;
/// kept as a struct so the contract can grow without breaking plugins.
#[derive(Debug, Clone, Default)]
pub struct InfraCompileResult {}

/// Result of a foundation compile step.
#[derive(Debug, Clone, Default)]
pub struct FoundationCompileResult {}

/// Factory producing a fresh [`App`] instance.
pub type AppFactory = Arc<dyn Fn() -> Result<Box<dyn App>, PluginError> + Send + Sync>;
/// Factory producing a fresh [`Infra`] instance.
pub type InfraFactory = Arc<dyn Fn() -> Result<Box<dyn Infra>, PluginError> + Send + Sync>;
/// Factory producing a fresh [`FoundationPlugin`] instance.
pub type FoundationFactory =
    Arc<dyn Fn() -> Result<Box<dyn FoundationPlugin>, PluginError> + Send + Sync>;

/// Build an [`AppFactory`] from a `Default` implementation type.
pub fn app_factory<T: App + Default + 'static>() -> AppFactory {
    Arc::new(|| Ok(Box::new(T::default())))
}

/// Build an [`InfraFactory`] from a `Default` implementation type.
pub fn infra_factory<T: Infra + Default + 'static>() -> InfraFactory {
    Arc::new(|| Ok(Box::new(T::default())))
}

/// Build a [`FoundationFactory`] from a `Default` implementation type.
pub fn foundation_factory<T: FoundationPlugin + Default + 'static>() -> FoundationFactory {
    Arc::new(|| Ok(Box::new(T::default())))
}
