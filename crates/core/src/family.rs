//! Job family classification.

use serde::{Deserialize, Serialize};

/// Classification tag used to select jobs in bulk.
///
/// Not an identity: many jobs share a family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobFamily {
    /// Force-reload-and-synchronize jobs for a project root
    ProjectRefresh,
    /// Any other job a host schedules
    Other,
}

impl JobFamily {
    /// Stable string form of the family.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobFamily::ProjectRefresh => "buildsync.project-refresh",
            JobFamily::Other => "buildsync.other",
        }
    }
}

impl std::fmt::Display for JobFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
