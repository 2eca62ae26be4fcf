use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{CompileError, CompileResult};

/// A single parsed Appfile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct File {
    /// UUID identifying this descriptor across runs. Generated on first
    /// compile and persisted beside the descriptor, so it survives renames
    /// and deployments are not duplicated. Empty until then.
    #[serde(default)]
    pub id: String,

    /// Path the descriptor was loaded from. Empty when parsed from a raw
    /// string.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Resolved source reference. Set only for descriptors pulled in as
    /// dependencies; empty for the root.
    #[serde(default)]
    pub source: String,

    #[serde(default)]
    pub application: Option<Application>,

    #[serde(default)]
    pub project: Option<Project>,

    #[serde(default)]
    pub infrastructure: Vec<Infrastructure>,

    #[serde(default)]
    pub customization: Option<Customization>,

    /// Imports this descriptor made. Imports are realized during
    /// compilation, but the list is kept for later inspection.
    #[serde(default)]
    pub import: Vec<Import>,
}

/// The application section of a descriptor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Application {
    #[serde(default)]
    pub name: String,

    /// Free-form type tag matched against plugin capability tuples.
    #[serde(rename = "type", default)]
    pub type_: String,

    #[serde(default, rename = "dependency")]
    pub dependencies: Vec<Dependency>,
}

/// A reference to another descriptor this application depends on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dependency {
    pub source: String,
}

/// The project a descriptor belongs to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub name: String,

    /// Name of the infrastructure entry that is active for this project.
    #[serde(default)]
    pub infrastructure: String,
}

/// An infrastructure definition the application can run on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Infrastructure {
    #[serde(default)]
    pub name: String,

    #[serde(rename = "type", default)]
    pub type_: String,

    #[serde(default)]
    pub flavor: String,

    #[serde(default, rename = "foundation")]
    pub foundations: Vec<Foundation>,
}

/// A supporting service configured per infrastructure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Foundation {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub config: HashMap<String, serde_json::Value>,
}

/// Free-form customization section, passed through to plugins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Customization {
    #[serde(rename = "type", default)]
    pub type_: String,

    #[serde(default)]
    pub config: HashMap<String, serde_json::Value>,
}

/// An import of another descriptor, consumed during compilation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Import {
    pub source: String,
}

impl File {
    /// Merge `other` into this file. Incoming content overwrites, with the
    /// rules:
    ///
    /// - scalar identity/path fields only if the incoming value is non-empty
    /// - `application` merged field-by-field (dependencies wholesale-replaced)
    /// - `project` wholesale-replaced
    /// - `infrastructure` merged by name; an incoming entry with no
    ///   foundations inherits the existing entry's foundations, otherwise it
    ///   replaces the existing entry entirely
    /// - `customization` wholesale-replaced
    ///
    /// Callers merge in the order (defaults, detected defaults, loaded
    /// descriptor) so the most specific content always dominates.
    pub fn merge(&mut self, other: &File) {
        if !other.id.is_empty() {
            self.id = other.id.clone();
        }
        if other.path.is_some() {
            self.path = other.path.clone();
        }

        match (&mut self.application, &other.application) {
            (Some(app), Some(other_app)) => app.merge(other_app),
            (None, Some(other_app)) => self.application = Some(other_app.clone()),
            _ => {}
        }

        if let Some(project) = &other.project {
            self.project = Some(project.clone());
        }

        let mut infra_index: HashMap<String, usize> = HashMap::new();
        for (i, infra) in self.infrastructure.iter().enumerate() {
            infra_index.insert(infra.name.clone(), i);
        }
        for incoming in &other.infrastructure {
            match infra_index.get(&incoming.name) {
                None => self.infrastructure.push(incoming.clone()),
                Some(&idx) => {
                    let mut incoming = incoming.clone();
                    if incoming.foundations.is_empty() {
                        incoming.foundations = self.infrastructure[idx].foundations.clone();
                    }
                    self.infrastructure[idx] = incoming;
                }
            }
        }

        if let Some(customization) = &other.customization {
            self.customization = Some(customization.clone());
        }
    }

    /// Look up the infrastructure entry named by the project.
    pub fn active_infrastructure(&self) -> Option<&Infrastructure> {
        let project = self.project.as_ref()?;
        self.infrastructure
            .iter()
            .find(|i| i.name == project.infrastructure)
    }

    /// Validate the required fields of a resolved descriptor. The error
    /// names the missing field or unresolved infrastructure.
    pub fn validate(&self) -> CompileResult<()> {
        let app = self
            .application
            .as_ref()
            .ok_or(CompileError::MissingField("application"))?;
        if app.name.is_empty() {
            return Err(CompileError::MissingField("application.name"));
        }
        if app.type_.is_empty() {
            return Err(CompileError::MissingField("application.type"));
        }
        let project = self
            .project
            .as_ref()
            .ok_or(CompileError::MissingField("project"))?;
        if self.active_infrastructure().is_none() {
            return Err(CompileError::InfrastructureNotFound(
                project.infrastructure.clone(),
            ));
        }
        Ok(())
    }

    /// Directory the descriptor was loaded from, when known.
    pub fn dir(&self) -> Option<PathBuf> {
        self.path
            .as_ref()
            .and_then(|p| p.parent())
            .map(|p| p.to_path_buf())
    }
}

impl Application {
    /// Merge `other` into this application. Non-empty scalars overwrite;
    /// a non-empty dependency list replaces ours wholesale.
    pub fn merge(&mut self, other: &Application) {
        if !other.name.is_empty() {
            self.name = other.name.clone();
        }
        if !other.type_.is_empty() {
            self.type_ = other.type_.clone();
        }
        if !other.dependencies.is_empty() {
            self.dependencies = other.dependencies.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_file() -> File {
        File {
            application: Some(Application {
                name: "web".into(),
                type_: "rails".into(),
                dependencies: vec![],
            }),
            project: Some(Project {
                name: "web".into(),
                infrastructure: "prod".into(),
            }),
            infrastructure: vec![Infrastructure {
                name: "prod".into(),
                type_: "aws".into(),
                flavor: "simple".into(),
                foundations: vec![Foundation {
                    name: "consul".into(),
                    config: HashMap::new(),
                }],
            }],
            ..File::default()
        }
    }

    #[test]
    fn test_merge_scalar_precedence() {
        let mut a = base_file();
        a.id = "original".into();

        let b = File::default();
        a.merge(&b);
        // Empty incoming fields never overwrite.
        assert_eq!(a.id, "original");
        assert_eq!(a.application.as_ref().unwrap().name, "web");

        let mut b = File::default();
        b.id = "overlay".into();
        a.merge(&b);
        assert_eq!(a.id, "overlay");
    }

    #[test]
    fn test_merge_application_fields() {
        let mut a = base_file();
        let b = File {
            application: Some(Application {
                name: String::new(),
                type_: "php".into(),
                dependencies: vec![Dependency {
                    source: "../other".into(),
                }],
            }),
            ..File::default()
        };
        a.merge(&b);

        let app = a.application.unwrap();
        assert_eq!(app.name, "web");
        assert_eq!(app.type_, "php");
        assert_eq!(app.dependencies.len(), 1);
    }

    #[test]
    fn test_merge_project_replaced_wholesale() {
        let mut a = base_file();
        let b = File {
            project: Some(Project {
                name: "other".into(),
                infrastructure: "staging".into(),
            }),
            ..File::default()
        };
        a.merge(&b);
        assert_eq!(a.project.as_ref().unwrap().name, "other");
        assert_eq!(a.project.as_ref().unwrap().infrastructure, "staging");
    }

    #[test]
    fn test_merge_infrastructure_inherits_foundations() {
        let mut a = base_file();
        let b = File {
            infrastructure: vec![Infrastructure {
                name: "prod".into(),
                type_: "google".into(),
                flavor: "simple".into(),
                foundations: vec![],
            }],
            ..File::default()
        };
        a.merge(&b);

        assert_eq!(a.infrastructure.len(), 1);
        let infra = &a.infrastructure[0];
        assert_eq!(infra.type_, "google");
        // Incoming entry had no foundations, so it inherits the old ones.
        assert_eq!(infra.foundations.len(), 1);
        assert_eq!(infra.foundations[0].name, "consul");
    }

    #[test]
    fn test_merge_infrastructure_with_foundations_replaces() {
        let mut a = base_file();
        let b = File {
            infrastructure: vec![Infrastructure {
                name: "prod".into(),
                type_: "aws".into(),
                flavor: "vpc".into(),
                foundations: vec![Foundation {
                    name: "vault".into(),
                    config: HashMap::new(),
                }],
            }],
            ..File::default()
        };
        a.merge(&b);

        let infra = &a.infrastructure[0];
        assert_eq!(infra.flavor, "vpc");
        assert_eq!(infra.foundations.len(), 1);
        assert_eq!(infra.foundations[0].name, "vault");
    }

    #[test]
    fn test_merge_new_infrastructure_appended() {
        let mut a = base_file();
        let b = File {
            infrastructure: vec![Infrastructure {
                name: "staging".into(),
                type_: "aws".into(),
                flavor: "simple".into(),
                foundations: vec![],
            }],
            ..File::default()
        };
        a.merge(&b);
        assert_eq!(a.infrastructure.len(), 2);
    }

    #[test]
    fn test_active_infrastructure() {
        let f = base_file();
        assert_eq!(f.active_infrastructure().unwrap().name, "prod");

        let mut f = base_file();
        f.project.as_mut().unwrap().infrastructure = "missing".into();
        assert!(f.active_infrastructure().is_none());
    }

    #[test]
    fn test_validate() {
        assert!(base_file().validate().is_ok());

        let mut f = base_file();
        f.application.as_mut().unwrap().type_ = String::new();
        assert!(matches!(
            f.validate(),
            Err(CompileError::MissingField("application.type"))
        ));

        let mut f = base_file();
        f.project.as_mut().unwrap().infrastructure = "missing".into();
        match f.validate() {
            Err(CompileError::InfrastructureNotFound(name)) => assert_eq!(name, "missing"),
            other => panic!("expected InfrastructureNotFound, got {:?}", other),
        }
    }
}
