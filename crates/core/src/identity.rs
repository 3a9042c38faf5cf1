//! Fixed identity attributes of a project root.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Immutable identity of a project root.
///
/// Serves as the cache key for fetched build models and as the naming key
/// for jobs that target the project. Only constructible with an absolute
/// project directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectIdentity {
    /// Absolute root directory of the build
    project_dir: PathBuf,
}

impl ProjectIdentity {
    /// Create an identity for an absolute project directory.
    pub fn new(project_dir: impl Into<PathBuf>) -> Result<Self, ValidationError> {
        let project_dir = project_dir.into();
        if project_dir.as_os_str().is_empty() {
            return Err(ValidationError::EmptyProjectDir);
        }
        if !project_dir.is_absolute() {
            return Err(ValidationError::RelativeProjectDir(project_dir));
        }

        Ok(Self { project_dir })
    }

    /// Absolute project root directory.
    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }
}

impl std::fmt::Display for ProjectIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.project_dir.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_requires_absolute_dir() {
        let err = ProjectIdentity::new("relative/proj").unwrap_err();
        assert!(matches!(err, ValidationError::RelativeProjectDir(_)));

        let err = ProjectIdentity::new("").unwrap_err();
        assert!(matches!(err, ValidationError::EmptyProjectDir));
    }

    #[test]
    fn test_identity_accessors() {
        let identity = ProjectIdentity::new("/repo/proj").unwrap();

        assert_eq!(identity.project_dir(), Path::new("/repo/proj"));
        assert_eq!(identity.to_string(), "/repo/proj");
        assert_eq!(identity, ProjectIdentity::new("/repo/proj").unwrap());
        assert_ne!(identity, ProjectIdentity::new("/repo/other").unwrap());
    }
}
