use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    #[default]
    None,
    Applied,
    DestroyFailed,
    ApplyFailed,
    Destroyed,
}

impl ExecutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Applied => "APPLIED",
            Self::DestroyFailed => "DESTROY_FAILED",
            Self::ApplyFailed => "APPLY_FAILED",
            Self::Destroyed => "DESTROYED",
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted progress of one reservation's infrastructure unit.
///
/// A non-empty `working_dir` means a module was materialized for the
/// reservation; a non-empty `run_id` means an apply at least started.
/// `version` is bumped by every successful save.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub status: ExecutionStatus,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl ExecutionRecord {
    pub fn has_working_dir(&self) -> bool {
        self.working_dir
            .as_ref()
            .is_some_and(|dir| !dir.as_os_str().is_empty())
    }

    pub fn has_run_id(&self) -> bool {
        self.run_id.as_deref().is_some_and(|id| !id.is_empty())
    }
}
