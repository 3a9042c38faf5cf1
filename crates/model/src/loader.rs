//! Directory-scanning model loader.

use async_trait::async_trait;
use buildsync_core::{BuildModel, FetchError, ProjectIdentity, ProjectModel};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::context::{BuildEvent, TransientInvocationContext};
use crate::repository::ModelLoader;

/// Loader configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Files whose presence marks a directory as a project
    pub marker_files: Vec<String>,

    /// Directory names never descended into
    pub ignored_dirs: Vec<String>,

    /// Maximum directory depth below the root
    pub max_depth: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            marker_files: vec![
                "build.gradle".to_string(),
                "build.gradle.kts".to_string(),
                "settings.gradle".to_string(),
                "settings.gradle.kts".to_string(),
            ],
            ignored_dirs: vec!["build".to_string(), "node_modules".to_string()],
            max_depth: 8,
        }
    }
}

impl LoaderConfig {
    /// Set marker files.
    pub fn with_marker_files<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.marker_files = markers.into_iter().map(Into::into).collect();
        self
    }

    /// Set maximum depth.
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }
}

/// Builds a model by walking the project root.
///
/// Every directory holding one of the marker files is a project. The root
/// project is named after its directory; nested projects get a colon path
/// relative to the root (`:libs:core`), and their parent is the nearest
/// enclosing project.
#[derive(Debug, Clone, Default)]
pub struct DirectoryModelLoader {
    config: LoaderConfig,
}

impl DirectoryModelLoader {
    /// Create a loader.
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }

    async fn is_project_dir(&self, dir: &Path) -> bool {
        for marker in &self.config.marker_files {
            if tokio::fs::metadata(dir.join(marker)).await.is_ok() {
                return true;
            }
        }
        false
    }

    fn is_ignored(&self, name: &str) -> bool {
        name.starts_with('.') || self.config.ignored_dirs.iter().any(|d| d == name)
    }
}

fn project_path(root: &Path, dir: &Path) -> String {
    let relative = dir.strip_prefix(root).unwrap_or(dir);
    relative
        .components()
        .map(|c| format!(":{}", c.as_os_str().to_string_lossy()))
        .collect()
}

fn root_name(root: &Path) -> String {
    root.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "root".to_string())
}

#[async_trait]
impl ModelLoader for DirectoryModelLoader {
    async fn load(
        &self,
        identity: &ProjectIdentity,
        ctx: &mut TransientInvocationContext,
    ) -> Result<BuildModel, FetchError> {
        let root = identity.project_dir().to_path_buf();

        if !self.is_project_dir(&root).await {
            return Err(FetchError::Load {
                project_dir: root,
                message: "no build file found in project root".to_string(),
            });
        }

        let root_project = root_name(&root);
        let mut model =
            BuildModel::new(&root).with_project(ProjectModel::new(&root_project, &root));

        // (directory, depth, nearest enclosing project)
        let mut queue: VecDeque<(PathBuf, usize, String)> = VecDeque::new();
        queue.push_back((root.clone(), 0, root_project));

        while let Some((dir, depth, parent)) = queue.pop_front() {
            if ctx.is_cancelled() {
                return Err(FetchError::Cancelled);
            }
            if depth >= self.config.max_depth {
                continue;
            }

            let mut children = Vec::new();
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                if !entry.file_type().await?.is_dir() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().into_owned();
                if !self.is_ignored(&name) {
                    children.push(entry.path());
                }
            }
            children.sort();

            for child in children {
                let mut enclosing = parent.clone();
                if self.is_project_dir(&child).await {
                    let name = project_path(&root, &child);
                    ctx.status(&format!("Configuring project {}", name));
                    ctx.emit(&BuildEvent::new(format!("project {} evaluated", name)));
                    debug!("Found project {} at {}", name, child.display());
                    model
                        .projects
                        .push(ProjectModel::new(&name, &child).with_parent(&parent));
                    enclosing = name;
                }
                queue.push_back((child, depth + 1, enclosing));
            }
        }

        writeln!(
            ctx.streams.output,
            "Loaded {} project(s) from {}",
            model.projects.len(),
            root.display()
        )?;

        model.fetched_at = chrono::Utc::now();
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ProcessStreams, ProgressListener};
    use std::sync::{Arc, Mutex};
    use tokio_util::sync::CancellationToken;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct StatusLog(Mutex<Vec<String>>);

    impl ProgressListener for StatusLog {
        fn status_changed(&self, description: &str) {
            self.0.lock().unwrap().push(description.to_string());
        }
    }

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "").unwrap();
    }

    #[tokio::test]
    async fn test_load_discovers_nested_projects() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("proj");
        touch(&root.join("settings.gradle"));
        touch(&root.join("api/build.gradle"));
        touch(&root.join("libs/core/build.gradle.kts"));
        touch(&root.join("libs/core/nested/build.gradle"));
        touch(&root.join("docs/readme.md"));
        touch(&root.join("build/tmp/build.gradle"));
        touch(&root.join(".gradle/build.gradle"));

        let output = SharedBuffer::default();
        let status = Arc::new(StatusLog::default());
        let streams = ProcessStreams {
            output: Box::new(output.clone()),
            error: Box::new(std::io::sink()),
            input: Box::new(std::io::empty()),
        };
        let mut ctx = TransientInvocationContext::new(streams, CancellationToken::new())
            .with_progress_listener(status.clone());

        let identity = ProjectIdentity::new(&root).unwrap();
        let model = DirectoryModelLoader::default()
            .load(&identity, &mut ctx)
            .await
            .unwrap();

        let names: Vec<_> = model.projects.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["proj", ":api", ":libs:core", ":libs:core:nested"]);

        let nested = model.project_at(&root.join("libs/core/nested")).unwrap();
        assert_eq!(nested.parent.as_deref(), Some(":libs:core"));
        let core = model.project_at(&root.join("libs/core")).unwrap();
        assert_eq!(core.parent.as_deref(), Some("proj"));

        assert_eq!(status.0.lock().unwrap().len(), 3);
        let written = String::from_utf8(output.0.lock().unwrap().clone()).unwrap();
        assert!(written.starts_with("Loaded 4 project(s)"));
    }

    #[tokio::test]
    async fn test_load_requires_root_build_file() {
        let dir = tempfile::tempdir().unwrap();
        let identity = ProjectIdentity::new(dir.path()).unwrap();
        let mut ctx =
            TransientInvocationContext::new(ProcessStreams::null(), CancellationToken::new());

        let err = DirectoryModelLoader::default()
            .load(&identity, &mut ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Load { .. }));
    }

    #[tokio::test]
    async fn test_load_honors_cancellation() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("build.gradle"));
        touch(&dir.path().join("a/build.gradle"));

        let token = CancellationToken::new();
        token.cancel();
        let mut ctx = TransientInvocationContext::new(ProcessStreams::null(), token);
        let identity = ProjectIdentity::new(dir.path()).unwrap();

        let err = DirectoryModelLoader::default()
            .load(&identity, &mut ctx)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_max_depth_limits_walk() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("build.gradle"));
        touch(&dir.path().join("a/b/build.gradle"));

        let mut ctx =
            TransientInvocationContext::new(ProcessStreams::null(), CancellationToken::new());
        let identity = ProjectIdentity::new(dir.path()).unwrap();
        let loader = DirectoryModelLoader::new(LoaderConfig::default().with_max_depth(1));

        let model = loader.load(&identity, &mut ctx).await.unwrap();
        assert_eq!(model.projects.len(), 1);
    }

    #[tokio::test]
    async fn test_custom_marker_files() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("pom.xml"));
        touch(&dir.path().join("service/pom.xml"));
        touch(&dir.path().join("legacy/build.gradle"));

        let mut ctx =
            TransientInvocationContext::new(ProcessStreams::null(), CancellationToken::new());
        let identity = ProjectIdentity::new(dir.path()).unwrap();
        let config = LoaderConfig::default().with_marker_files(["pom.xml"]);
        let loader = DirectoryModelLoader::new(config);

        let model = loader.load(&identity, &mut ctx).await.unwrap();
        let names: Vec<_> = model.projects.iter().skip(1).map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec![":service"]);
    }
}
