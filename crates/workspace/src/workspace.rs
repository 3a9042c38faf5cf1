//! In-memory workspace model.

use buildsync_core::Time;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Workspace shared between jobs.
///
/// Only the holder of the workspace exclusive region may modify it.
pub type SharedWorkspace = Arc<tokio::sync::Mutex<Workspace>>;

/// A project imported into the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceProject {
    /// Workspace-unique project name
    pub name: String,

    /// Project directory
    pub location: PathBuf,

    /// Root directory of the build the project belongs to
    pub build_root: PathBuf,

    /// Working sets the project is a member of
    pub working_sets: BTreeSet<String>,

    /// When the project was last synchronized
    pub last_synced: Time,
}

/// All projects in the workspace, keyed by location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Workspace {
    projects: BTreeMap<PathBuf, WorkspaceProject>,
}

impl Workspace {
    /// Create an empty workspace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap in a shareable handle.
    pub fn into_shared(self) -> SharedWorkspace {
        Arc::new(tokio::sync::Mutex::new(self))
    }

    /// Project at a location.
    pub fn project_at(&self, location: &Path) -> Option<&WorkspaceProject> {
        self.projects.get(location)
    }

    pub(crate) fn project_at_mut(&mut self, location: &Path) -> Option<&mut WorkspaceProject> {
        self.projects.get_mut(location)
    }

    /// Project by name.
    pub fn project(&self, name: &str) -> Option<&WorkspaceProject> {
        self.projects.values().find(|p| p.name == name)
    }

    /// All projects, ordered by location.
    pub fn projects(&self) -> impl Iterator<Item = &WorkspaceProject> {
        self.projects.values()
    }

    /// Projects belonging to a build.
    pub fn projects_of_build<'a>(
        &'a self,
        build_root: &'a Path,
    ) -> impl Iterator<Item = &'a WorkspaceProject> + 'a {
        self.projects.values().filter(move |p| p.build_root == build_root)
    }

    /// Members of a working set.
    pub fn working_set(&self, name: &str) -> Vec<&WorkspaceProject> {
        self.projects
            .values()
            .filter(|p| p.working_sets.contains(name))
            .collect()
    }

    /// Every working set name in use.
    pub fn working_set_names(&self) -> BTreeSet<String> {
        self.projects
            .values()
            .flat_map(|p| p.working_sets.iter().cloned())
            .collect()
    }

    /// Insert or replace a project.
    pub fn upsert(&mut self, project: WorkspaceProject) {
        self.projects.insert(project.location.clone(), project);
    }

    /// Remove the project at a location.
    pub fn remove(&mut self, location: &Path) -> Option<WorkspaceProject> {
        self.projects.remove(location)
    }

    /// Number of projects.
    pub fn len(&self) -> usize {
        self.projects.len()
    }

    /// Whether the workspace is empty.
    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(name: &str, location: &str, root: &str, sets: &[&str]) -> WorkspaceProject {
        WorkspaceProject {
            name: name.to_string(),
            location: PathBuf::from(location),
            build_root: PathBuf::from(root),
            working_sets: sets.iter().map(|s| s.to_string()).collect(),
            last_synced: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_working_set_membership() {
        let mut ws = Workspace::new();
        ws.upsert(project("proj", "/repo/proj", "/repo/proj", &["setA"]));
        ws.upsert(project("proj:api", "/repo/proj/api", "/repo/proj", &["setA", "setB"]));
        ws.upsert(project("other", "/repo/other", "/repo/other", &[]));

        assert_eq!(ws.working_set("setA").len(), 2);
        assert_eq!(ws.working_set("setB").len(), 1);
        assert_eq!(ws.working_set_names().len(), 2);
        assert_eq!(ws.projects_of_build(Path::new("/repo/proj")).count(), 2);
        assert_eq!(ws.project("other").unwrap().location, PathBuf::from("/repo/other"));
    }

    #[test]
    fn test_upsert_replaces_by_location() {
        let mut ws = Workspace::new();
        ws.upsert(project("proj", "/repo/proj", "/repo/proj", &[]));
        ws.upsert(project("renamed", "/repo/proj", "/repo/proj", &[]));

        assert_eq!(ws.len(), 1);
        assert_eq!(ws.project_at(Path::new("/repo/proj")).unwrap().name, "renamed");
        assert!(ws.remove(Path::new("/repo/proj")).is_some());
        assert!(ws.is_empty());
    }
}
