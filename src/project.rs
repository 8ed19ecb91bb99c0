//! Named project directories
//!
//! Projects live under one per-user root (`<Documents>/MATLAB_Projects` unless
//! configured otherwise). Selecting a project creates its directory and makes
//! it the session's workspace root.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;

use crate::error::{HarnessError, Result};

/// An existing project directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Project {
    pub name: String,
    pub dir: PathBuf,
}

/// The session's project state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CurrentProject {
    Active {
        name: String,
        dir: PathBuf,
        workspace_dir: PathBuf,
    },
    NoneSet {
        workspace_dir: PathBuf,
    },
}

impl CurrentProject {
    pub fn workspace_dir(&self) -> &Path {
        match self {
            Self::Active { workspace_dir, .. } | Self::NoneSet { workspace_dir } => workspace_dir,
        }
    }
}

/// Projects found under the root
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectListing {
    pub root: PathBuf,
    /// Sorted by name
    pub projects: Vec<String>,
    pub current: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProjectManager {
    root: PathBuf,
}

impl ProjectManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Project names are a single plain path component
    pub fn validate_name(name: &str) -> Result<()> {
        let invalid = || HarnessError::InvalidProjectName {
            name: name.to_string(),
        };
        if name.trim().is_empty() || name.contains(['/', '\\']) {
            return Err(invalid());
        }
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(()),
            _ => Err(invalid()),
        }
    }

    /// Create `<root>/<name>` if needed and return it
    pub fn ensure(&self, name: &str) -> Result<Project> {
        Self::validate_name(name)?;

        let dir = absolute(&self.root.join(name)).map_err(|source| HarnessError::ProjectDir {
            path: self.root.join(name),
            source,
        })?;
        fs::create_dir_all(&dir).map_err(|source| HarnessError::ProjectDir {
            path: dir.clone(),
            source,
        })?;

        Ok(Project {
            name: name.to_string(),
            dir,
        })
    }

    /// Names of the project directories; a missing root means no projects
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(HarnessError::ProjectDir {
                    path: self.root.clone(),
                    source,
                })
            }
        };

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        names.sort();
        Ok(names)
    }
}

fn absolute(path: &Path) -> io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_name_validation() {
        for good in ["Foo", "thesis 2024", "a.b"] {
            assert!(ProjectManager::validate_name(good).is_ok(), "{good}");
        }
        for bad in ["", "  ", ".", "..", "a/b", "a\\b", "/abs"] {
            let err = ProjectManager::validate_name(bad).unwrap_err();
            assert_eq!(err.code(), "MLH-030", "{bad}");
        }
    }

    #[test]
    fn test_ensure_creates_directory_and_lists() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("MATLAB_Projects");
        let manager = ProjectManager::new(&root);

        assert!(manager.list().unwrap().is_empty());

        let project = manager.ensure("Foo").unwrap();
        assert!(project.dir.is_dir());
        assert!(project.dir.ends_with("MATLAB_Projects/Foo"));

        manager.ensure("Bar").unwrap();
        // idempotent
        manager.ensure("Foo").unwrap();
        fs::write(root.join("notes.txt"), "not a project").unwrap();

        assert_eq!(manager.list().unwrap(), vec!["Bar", "Foo"]);
    }

    #[test]
    fn test_invalid_name_touches_nothing() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("root");
        let manager = ProjectManager::new(&root);
        assert!(manager.ensure("../escape").is_err());
        assert!(!root.exists());
    }
}
