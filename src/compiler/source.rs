//! Source-reference resolution and fetching.
//!
//! Import and dependency entries name another descriptor by a source
//! reference. Resolution turns the reference into an absolute key relative
//! to the referencing descriptor's directory; fetching copies the
//! descriptor into compile-dir storage so later runs need no access to the
//! original location. Network transports live behind [`Fetcher`], outside
//! this crate.

use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::descriptor::identity::ID_FILENAME;
use crate::error::{CompileError, CompileResult};

/// Descriptor file names looked for inside a source directory, in order.
pub const DESCRIPTOR_NAMES: &[&str] = &["Appfile", "Appfile.toml", "Appfile.json"];

/// Resolve a source reference against the directory of the referencing
/// descriptor. The result is a canonical absolute path usable as a cache
/// and cycle-graph key.
pub fn resolve_source(source_ref: &str, base_dir: &Path) -> CompileResult<String> {
    let raw = Path::new(source_ref);
    let joined = if raw.is_absolute() {
        raw.to_path_buf()
    } else {
        base_dir.join(raw)
    };
    let canonical = std::fs::canonicalize(&joined).map_err(|e| CompileError::SourceResolution {
        source_ref: source_ref.to_string(),
        reason: format!("{}: {}", joined.display(), e),
    })?;
    Ok(canonical.to_string_lossy().into_owned())
}

/// Stable storage subdirectory name for a resolved source.
pub fn storage_key(source: &str) -> String {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    source.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// Fetches a descriptor for a resolved source into local storage.
///
/// `Ok(Some(path))` is the fetched descriptor file; `Ok(None)` means the
/// source exists but carries no descriptor, in which case the compiler
/// synthesizes a default one via type detection.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, source: &str, dst_dir: &Path) -> CompileResult<Option<PathBuf>>;
}

/// Filesystem fetcher: the source is a local directory containing a
/// descriptor, or a descriptor file itself. The descriptor and its
/// identity file are copied into storage; everything else stays behind.
#[derive(Debug, Default)]
pub struct LocalFetcher;

#[async_trait]
impl Fetcher for LocalFetcher {
    async fn fetch(&self, source: &str, dst_dir: &Path) -> CompileResult<Option<PathBuf>> {
        let src = PathBuf::from(source);
        let descriptor = if src.is_dir() {
            match find_descriptor(&src) {
                Some(p) => p,
                None => return Ok(None),
            }
        } else {
            src.clone()
        };

        std::fs::create_dir_all(dst_dir)?;
        let file_name = descriptor
            .file_name()
            .ok_or_else(|| CompileError::Fetch {
                source_ref: source.to_string(),
                reason: "source has no file name".into(),
            })?;
        let dst = dst_dir.join(file_name);
        std::fs::copy(&descriptor, &dst).map_err(|e| CompileError::Fetch {
            source_ref: source.to_string(),
            reason: e.to_string(),
        })?;

        // Carry the identity file along so dependency IDs survive.
        if let Some(dir) = descriptor.parent() {
            let id_file = dir.join(ID_FILENAME);
            if id_file.exists() {
                std::fs::copy(&id_file, dst_dir.join(ID_FILENAME)).map_err(|e| {
                    CompileError::Fetch {
                        source_ref: source.to_string(),
                        reason: e.to_string(),
                    }
                })?;
            }
        }

        Ok(Some(dst))
    }
}

fn find_descriptor(dir: &Path) -> Option<PathBuf> {
    DESCRIPTOR_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.is_file())
}
