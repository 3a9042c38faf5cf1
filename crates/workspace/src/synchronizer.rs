//! Reconciles build models into the workspace.

use async_trait::async_trait;
use buildsync_core::{BuildModel, ProjectIdentity, ProjectModel, SyncError, WorkingSets};
use buildsync_model::{SyncReport, SynchronizationPort};
use buildsync_progress::ProgressScope;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::workspace::{SharedWorkspace, WorkspaceProject};

/// Reference reconciler over a [`SharedWorkspace`].
///
/// - projects new to the workspace are added,
/// - projects already present at the same location are refreshed,
/// - projects of the same build that the model no longer lists are removed,
/// - every synchronized project joins each requested working set.
///
/// Name clashes with projects of another build are rejected up front, before
/// anything is modified.
#[derive(Clone)]
pub struct WorkspaceSynchronizer {
    workspace: SharedWorkspace,
}

impl WorkspaceSynchronizer {
    /// Create a synchronizer for a workspace.
    pub fn new(workspace: SharedWorkspace) -> Self {
        Self { workspace }
    }

    /// The workspace this synchronizer writes to.
    pub fn workspace(&self) -> &SharedWorkspace {
        &self.workspace
    }
}

/// Workspace name of a model project: the root keeps its own name, nested
/// projects are prefixed with it.
fn workspace_name(model: &BuildModel, project: &ProjectModel) -> String {
    match (&project.parent, model.root_project()) {
        (Some(_), Some(root)) => format!("{}{}", root.name, project.name),
        _ => project.name.clone(),
    }
}

#[async_trait]
impl SynchronizationPort for WorkspaceSynchronizer {
    async fn synchronize(
        &self,
        model: &BuildModel,
        identity: &ProjectIdentity,
        tags: &WorkingSets,
        scope: &ProgressScope,
        token: &CancellationToken,
    ) -> Result<SyncReport, SyncError> {
        let steps = u32::try_from(model.projects.len() + 1).unwrap_or(u32::MAX);
        scope.begin(format!("Synchronizing {} with workspace", identity), steps);

        let mut workspace = self.workspace.lock().await;
        let build_root = model.root_dir.clone();

        for project in &model.projects {
            let name = workspace_name(model, project);
            if let Some(existing) = workspace.project(&name) {
                if existing.location != project.path && existing.build_root != build_root {
                    return Err(SyncError::Conflict(format!(
                        "project name '{}' is already used by {}",
                        name,
                        existing.location.display()
                    )));
                }
            }
        }

        let mut report = SyncReport::default();
        let now = chrono::Utc::now();

        for project in &model.projects {
            if token.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let name = workspace_name(model, project);
            scope.sub_task(&format!("Synchronizing project {}", name));

            match workspace.project_at_mut(&project.path) {
                Some(existing) => {
                    existing.name = name.clone();
                    existing.build_root = build_root.clone();
                    existing.working_sets.extend(tags.iter().map(str::to_string));
                    existing.last_synced = now;
                    debug!("Refreshed project {}", name);
                    report.updated.push(name);
                }
                None => {
                    workspace.upsert(WorkspaceProject {
                        name: name.clone(),
                        location: project.path.clone(),
                        build_root: build_root.clone(),
                        working_sets: tags.iter().map(str::to_string).collect(),
                        last_synced: now,
                    });
                    debug!("Added project {}", name);
                    report.added.push(name);
                }
            }
            scope.worked(1);
        }

        if token.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let current: BTreeSet<&PathBuf> = model.projects.iter().map(|p| &p.path).collect();
        let stale: Vec<PathBuf> = workspace
            .projects_of_build(&build_root)
            .filter(|p| !current.contains(&p.location))
            .map(|p| p.location.clone())
            .collect();
        for location in stale {
            if let Some(removed) = workspace.remove(&location) {
                debug!("Removed project {}", removed.name);
                report.removed.push(removed.name);
            }
        }
        scope.worked(1);

        info!(
            "Synchronized {}: {} added, {} updated, {} removed",
            identity,
            report.added.len(),
            report.updated.len(),
            report.removed.len()
        );
        scope.done();
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::Workspace;
    use std::path::Path;

    fn model() -> BuildModel {
        BuildModel::new("/repo/proj")
            .with_project(ProjectModel::new("proj", "/repo/proj"))
            .with_project(ProjectModel::new(":api", "/repo/proj/api").with_parent("proj"))
    }

    fn identity() -> ProjectIdentity {
        ProjectIdentity::new("/repo/proj").unwrap()
    }

    fn started_scope() -> (ProgressScope, ProgressScope) {
        let root = ProgressScope::detached();
        root.begin("test", 100);
        let child = root.child(50).unwrap();
        (root, child)
    }

    #[tokio::test]
    async fn test_synchronize_adds_projects_with_working_sets() {
        let workspace = Workspace::new().into_shared();
        let sync = WorkspaceSynchronizer::new(workspace.clone());
        let tags = WorkingSets::new(["setA"]);
        let (root, scope) = started_scope();

        let report = sync
            .synchronize(&model(), &identity(), &tags, &scope, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.added, vec!["proj".to_string(), "proj:api".to_string()]);
        assert!(report.updated.is_empty());
        assert!(scope.is_done());
        assert!((root.completed() - 50.0).abs() < 1e-9);

        let ws = workspace.lock().await;
        assert_eq!(ws.working_set("setA").len(), 2);
    }

    #[tokio::test]
    async fn test_resynchronize_updates_and_removes() {
        let workspace = Workspace::new().into_shared();
        let sync = WorkspaceSynchronizer::new(workspace.clone());
        let token = CancellationToken::new();

        let (_root, scope) = started_scope();
        sync.synchronize(&model(), &identity(), &WorkingSets::empty(), &scope, &token)
            .await
            .unwrap();

        let shrunk = BuildModel::new("/repo/proj")
            .with_project(ProjectModel::new("proj", "/repo/proj"));
        let tags = WorkingSets::new(["setB"]);
        let (_root, scope) = started_scope();
        let report = sync
            .synchronize(&shrunk, &identity(), &tags, &scope, &token)
            .await
            .unwrap();

        assert_eq!(report.updated, vec!["proj".to_string()]);
        assert_eq!(report.removed, vec!["proj:api".to_string()]);

        let ws = workspace.lock().await;
        assert_eq!(ws.len(), 1);
        assert!(ws.project_at(Path::new("/repo/proj/api")).is_none());
        assert!(ws.project("proj").unwrap().working_sets.contains("setB"));
    }

    #[tokio::test]
    async fn test_repeated_working_sets_join_once() {
        let workspace = Workspace::new().into_shared();
        let sync = WorkspaceSynchronizer::new(workspace.clone());
        let tags = WorkingSets::new(["setA", "setB", "setA"]);
        let (_root, scope) = started_scope();

        sync.synchronize(&model(), &identity(), &tags, &scope, &CancellationToken::new())
            .await
            .unwrap();

        let ws = workspace.lock().await;
        let project = ws.project("proj").unwrap();
        assert_eq!(
            project.working_sets.iter().collect::<Vec<_>>(),
            vec!["setA", "setB"]
        );
        assert_eq!(ws.working_set("setA").len(), 2);
    }

    #[tokio::test]
    async fn test_synchronize_rejects_name_conflict() {
        let mut ws = Workspace::new();
        ws.upsert(WorkspaceProject {
            name: "proj".to_string(),
            location: PathBuf::from("/elsewhere/proj"),
            build_root: PathBuf::from("/elsewhere/proj"),
            working_sets: BTreeSet::new(),
            last_synced: chrono::Utc::now(),
        });
        let workspace = ws.into_shared();
        let sync = WorkspaceSynchronizer::new(workspace.clone());
        let (_root, scope) = started_scope();
        let token = CancellationToken::new();

        let err = sync
            .synchronize(&model(), &identity(), &WorkingSets::empty(), &scope, &token)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Conflict(_)));
        assert_eq!(workspace.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_synchronize_honors_cancellation() {
        let workspace = Workspace::new().into_shared();
        let sync = WorkspaceSynchronizer::new(workspace.clone());
        let token = CancellationToken::new();
        token.cancel();
        let (_root, scope) = started_scope();

        let err = sync
            .synchronize(&model(), &identity(), &WorkingSets::empty(), &scope, &token)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(workspace.lock().await.is_empty());
    }
}
