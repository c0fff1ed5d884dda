pub mod record;
pub mod store;

pub use record::{ExecutionRecord, ExecutionStatus};
pub use store::{SandboxStateStore, StateError};
