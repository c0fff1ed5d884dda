use crate::api::ApiError;
use crate::outputs::OutputError;
use crate::sandbox::{ExecutionStatus, StateError};
use crate::terraform::StepFailure;

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("{message} (status {status})")]
    ApplyBlocked {
        status: ExecutionStatus,
        message: String,
    },
    #[error("{message}")]
    DestroyBlocked { message: String },
    #[error(transparent)]
    Step(#[from] StepFailure),
    #[error("run `{run_id}` applied but writing outputs failed: {source}")]
    OutputWriteback {
        run_id: String,
        #[source]
        source: OutputError,
    },
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("failed to allocate run id: {0}")]
    RunId(String),
}
