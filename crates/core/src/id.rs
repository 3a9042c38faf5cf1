//! Unique identifiers for scheduled jobs.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique identifier for a scheduled job
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(String);

impl JobId {
    /// Generate a new JobId
    pub fn new() -> Self {
        Self(format!("job_{}", Ulid::new()))
    }

    /// Borrow the raw id string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for JobId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix("job_").unwrap_or(s);
        let ulid: Ulid = raw.parse()?;
        Ok(Self(format!("job_{}", ulid)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_ids_are_unique() {
        assert_ne!(JobId::new(), JobId::new());
    }

    #[test]
    fn test_job_id_parse_accepts_prefixed_and_bare() {
        let id = JobId::new();
        let parsed: JobId = id.as_str().parse().unwrap();
        assert_eq!(parsed, id);

        let bare = id.as_str().trim_start_matches("job_");
        let parsed: JobId = bare.parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_job_id_parse_rejects_garbage() {
        assert!("job_not-a-ulid".parse::<JobId>().is_err());
    }
}
