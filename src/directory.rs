//! Persistent key/value directory seam.
//!
//! Deployments, build artifacts, and other cross-run state live in a
//! directory service owned by the caller. The core passes the handle
//! through to plugins and never interprets the stored values itself.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use crate::error::PluginError;

/// Persistent key/value store for descriptor-scoped data.
pub trait Backend: Send + Sync {
    fn put(&self, key: &str, value: Value) -> Result<(), PluginError>;

    fn get(&self, key: &str) -> Result<Option<Value>, PluginError>;
}

/// In-memory [`Backend`]. Used in tests and for dry runs; nothing
/// survives the process.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    data: RwLock<HashMap<String, Value>>,
}

impl Backend for MemoryBackend {
    fn put(&self, key: &str, value: Value) -> Result<(), PluginError> {
        self.data.write().insert(key.to_string(), value);
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Value>, PluginError> {
        Ok(self.data.read().get(key).cloned())
    }
}

/// Shared handle to a [`Backend`] implementation.
pub type BackendHandle = Arc<dyn Backend>;
