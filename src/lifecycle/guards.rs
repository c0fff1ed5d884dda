use crate::sandbox::{ExecutionRecord, ExecutionStatus};

pub const APPLY_BLOCKED_MESSAGE: &str = "Execution is not enabled due to either failed previous Execution (*Try Destroy first) or Successfully executed previously without successfully destroying it first";
pub const DESTROY_BLOCKED_MESSAGE: &str = "Destroy blocked due to missing state file";

/// A second apply on top of live infrastructure would orphan it.
pub fn can_execute_run(record: &ExecutionRecord) -> bool {
    record.status != ExecutionStatus::Applied
}

pub fn can_destroy_run(record: &ExecutionRecord) -> bool {
    record.has_working_dir()
}
