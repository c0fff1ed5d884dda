pub mod cli;
pub mod command_handlers;
pub mod driver;

pub use command_handlers::run_cli;
pub use driver::{DriverError, TerraformServiceDriver, APPLY_NOT_EXECUTED_MESSAGE};
