//! Persisted descriptor identity.
//!
//! A descriptor's UUID lives in a hidden marker file next to the
//! descriptor itself. It is generated exactly once and reused on every
//! later compile; deleting it severs the descriptor from its deployments.

use std::path::{Path, PathBuf};

use crate::descriptor::File;
use crate::error::{CompileError, CompileResult};

/// Name of the hidden identity file written next to a descriptor.
pub const ID_FILENAME: &str = ".appforge-id";

const ID_BANNER: &str = "\
# This file is automatically generated the first time this Appfile is
# compiled. It contains the UUID that identifies this application across
# renames and machines. DO NOT DELETE this file, or deployments of this
# application will be duplicated.
";

fn id_path(descriptor_path: &Path) -> PathBuf {
    let dir = descriptor_path.parent().unwrap_or_else(|| Path::new("."));
    dir.join(ID_FILENAME)
}

/// Read the persisted UUID for the descriptor at `descriptor_path`, if the
/// identity file exists. Comment and blank lines are skipped.
pub fn load_id(descriptor_path: &Path) -> CompileResult<Option<String>> {
    let path = id_path(descriptor_path);
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(CompileError::Identity(e.to_string())),
    };

    let id = content
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'));
    match id {
        Some(id) => Ok(Some(id.to_string())),
        None => Err(CompileError::Identity(format!(
            "identity file '{}' contains no UUID",
            path.display()
        ))),
    }
}

/// Generate and persist a fresh UUID for the descriptor.
pub fn init_id(descriptor_path: &Path) -> CompileResult<String> {
    let id = uuid::Uuid::new_v4().to_string();
    let path = id_path(descriptor_path);
    std::fs::write(&path, format!("{}{}\n", ID_BANNER, id))
        .map_err(|e| CompileError::Identity(e.to_string()))?;
    Ok(id)
}

/// Ensure `file` has a stable identity: load the persisted UUID if one
/// exists, generate and write one otherwise. Descriptors without a path
/// (parsed from raw strings) cannot persist an identity and are skipped.
pub fn ensure_id(file: &mut File) -> CompileResult<()> {
    let Some(path) = file.path.clone() else {
        return Ok(());
    };
    file.id = match load_id(&path)? {
        Some(id) => id,
        None => init_id(&path)?,
    };
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ensure_id_generates_once() {
        let tmp = TempDir::new().unwrap();
        let descriptor = tmp.path().join("Appfile");
        std::fs::write(&descriptor, "").unwrap();

        let mut file = File {
            path: Some(descriptor.clone()),
            ..File::default()
        };
        ensure_id(&mut file).unwrap();
        let first = file.id.clone();
        assert!(!first.is_empty());

        // Second run reuses the persisted UUID.
        let mut file = File {
            path: Some(descriptor),
            ..File::default()
        };
        ensure_id(&mut file).unwrap();
        assert_eq!(file.id, first);
    }

    #[test]
    fn test_load_id_skips_banner() {
        let tmp = TempDir::new().unwrap();
        let descriptor = tmp.path().join("Appfile");
        std::fs::write(
            tmp.path().join(ID_FILENAME),
            "# warning\n\n  abc-123  \n",
        )
        .unwrap();
        assert_eq!(load_id(&descriptor).unwrap(), Some("abc-123".to_string()));
    }

    #[test]
    fn test_load_id_missing_file() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(load_id(&tmp.path().join("Appfile")).unwrap(), None);
    }

    #[test]
    fn test_load_id_empty_file_is_error() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(ID_FILENAME), "# only a banner\n").unwrap();
        assert!(load_id(&tmp.path().join("Appfile")).is_err());
    }

    #[test]
    fn test_ensure_id_without_path_is_noop() {
        let mut file = File::default();
        ensure_id(&mut file).unwrap();
        assert!(file.id.is_empty());
    }
}
