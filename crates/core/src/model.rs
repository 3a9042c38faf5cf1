//! Build model - what a model fetch returns.

use crate::Time;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How a model repository may use its cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FetchStrategy {
    /// Only return a cached model, never compute one
    Cached,
    /// Return the cached model, or compute and cache it
    CachedElseFetch,
    /// Discard any cached model and recompute
    ForceReload,
}

impl std::fmt::Display for FetchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchStrategy::Cached => write!(f, "cached"),
            FetchStrategy::CachedElseFetch => write!(f, "cached-else-fetch"),
            FetchStrategy::ForceReload => write!(f, "force-reload"),
        }
    }
}

/// A fetched model of a (multi-)project build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildModel {
    /// Root directory of the build
    pub root_dir: PathBuf,

    /// Every project in the build, root first
    pub projects: Vec<ProjectModel>,

    /// When the model was computed
    pub fetched_at: Time,
}

impl BuildModel {
    /// Create a model with no projects.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            projects: Vec::new(),
            fetched_at: chrono::Utc::now(),
        }
    }

    /// Add a project.
    pub fn with_project(mut self, project: ProjectModel) -> Self {
        self.projects.push(project);
        self
    }

    /// Find a project by its directory.
    pub fn project_at(&self, path: &Path) -> Option<&ProjectModel> {
        self.projects.iter().find(|p| p.path == path)
    }

    /// The root project, if the model has one.
    pub fn root_project(&self) -> Option<&ProjectModel> {
        self.project_at(&self.root_dir)
    }
}

/// A single project within a build model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectModel {
    /// Project name, unique within the build
    pub name: String,

    /// Project directory
    pub path: PathBuf,

    /// Name of the parent project (None for the root)
    pub parent: Option<String>,
}

impl ProjectModel {
    /// Create a project model.
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            parent: None,
        }
    }

    /// Set the parent project.
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }
}
