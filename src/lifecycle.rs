//! Apply/destroy state machine for one reservation's infrastructure unit.
//!
//! ```text
//! NONE --apply ok--> APPLIED --destroy ok--> DESTROYED
//!   any failed apply   -> APPLY_FAILED
//!   any failed destroy -> DESTROY_FAILED
//! ```
//!
//! Every status except `APPLIED` admits a new apply. Destroy only needs a
//! materialized working directory. Nothing is retried automatically.

pub mod controller;
pub mod error;
pub mod guards;

pub use controller::{
    ApplyOutcome, Collaborators, DestroyOutcome, ExecutionContext, ExecutionController,
};
pub use error::LifecycleError;
pub use guards::{can_destroy_run, can_execute_run, APPLY_BLOCKED_MESSAGE, DESTROY_BLOCKED_MESSAGE};
