//! Default descriptor synthesis and application type detection.
//!
//! A project directory with no Appfile still gets a usable descriptor:
//! the application name comes from the directory name and the type from
//! glob-based detectors (e.g. `*.rb` → "rails").

use std::path::Path;

use globset::{Glob, GlobSetBuilder};
use serde::{Deserialize, Serialize};

use super::file::{Application, File, Foundation, Infrastructure, Project};
use crate::error::{CompileError, CompileResult};

/// Detection configuration: an ordered list of detectors, tried in order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectConfig {
    #[serde(default, rename = "detector")]
    pub detectors: Vec<Detector>,
}

impl DetectConfig {
    /// Merge another config into this one. Detectors in `other` are tried
    /// after ours; conflicts are kept as lower-priority detectors, so two
    /// detectors for the same type will both be tried.
    pub fn merge(&mut self, other: &DetectConfig) {
        self.detectors.extend(other.detectors.iter().cloned());
    }

    /// Detect the application type for a directory. Returns the first
    /// matching detector's type, or `None` when nothing matches.
    pub fn detect(&self, dir: &Path) -> CompileResult<Option<String>> {
        for detector in &self.detectors {
            if detector.matches(dir)? {
                return Ok(Some(detector.type_.clone()));
            }
        }
        Ok(None)
    }
}

/// Detects a single application type by file glob patterns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Detector {
    #[serde(rename = "type")]
    pub type_: String,

    #[serde(default)]
    pub file: Vec<String>,
}

impl Detector {
    /// Whether any of the detector's patterns match a file in `dir`.
    pub fn matches(&self, dir: &Path) -> CompileResult<bool> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.file {
            let glob = Glob::new(pattern)
                .map_err(|e| CompileError::Parse(format!("invalid detector glob: {}", e)))?;
            builder.add(glob);
        }
        let set = builder
            .build()
            .map_err(|e| CompileError::Parse(format!("invalid detector globs: {}", e)))?;

        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if set.is_match(Path::new(&entry.file_name())) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Build a default descriptor for a project directory. `dir` must be
/// absolute since it determines the application name.
pub fn default_file(dir: &Path, detect: &DetectConfig) -> CompileResult<File> {
    let app_name = dir
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("app")
        .to_string();
    let app_type = detect.detect(dir)?.unwrap_or_default();

    Ok(File {
        path: Some(dir.join("Appfile")),
        application: Some(Application {
            name: app_name.clone(),
            type_: app_type,
            dependencies: vec![],
        }),
        project: Some(Project {
            name: app_name.clone(),
            infrastructure: app_name.clone(),
        }),
        infrastructure: vec![Infrastructure {
            name: app_name,
            type_: "aws".into(),
            flavor: "simple".into(),
            foundations: vec![Foundation {
                name: "consul".into(),
                config: Default::default(),
            }],
        }],
        ..File::default()
    })
}
