use crate::lifecycle::{
    can_destroy_run, ApplyOutcome, Collaborators, DestroyOutcome, ExecutionContext,
    ExecutionController, LifecycleError,
};
use crate::shared::ExecutionLogger;
use crate::terraform::{FetchError, ModuleDescriptor, ModuleFetcher};
use std::path::PathBuf;

pub const APPLY_NOT_EXECUTED_MESSAGE: &str = "Destroy blocked because APPLY was not yet executed";

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("{message}")]
    NotApplied { message: String },
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

/// Entry point for one reservation's infrastructure unit: materializes the
/// module and hands the run to the [`ExecutionController`].
pub struct TerraformServiceDriver<'a> {
    controller: ExecutionController<'a>,
    deps: Collaborators<'a>,
    fetcher: &'a dyn ModuleFetcher,
}

impl<'a> TerraformServiceDriver<'a> {
    pub fn new(
        context: ExecutionContext,
        deps: Collaborators<'a>,
        fetcher: &'a dyn ModuleFetcher,
    ) -> Self {
        Self {
            controller: ExecutionController::new(context, deps),
            deps,
            fetcher,
        }
    }

    pub fn controller(&self) -> &ExecutionController<'a> {
        &self.controller
    }

    pub fn execute_terraform(
        &self,
        module_source: impl Into<PathBuf>,
    ) -> Result<ApplyOutcome, DriverError> {
        self.controller.ensure_can_execute()?;
        let descriptor = ModuleDescriptor {
            reservation_id: self.controller.context().scope.reservation_id.clone(),
            source: module_source.into(),
        };
        let working_dir = self.fetcher.fetch_module(&descriptor)?;
        self.fetcher.fetch_executable(&working_dir)?;
        self.deps.logger.info(
            "driver.module.fetched",
            &format!(
                "source={} working_dir={}",
                descriptor.source.display(),
                working_dir.display()
            ),
        );
        Ok(self.controller.run_apply(&working_dir)?)
    }

    pub fn destroy_terraform(&self) -> Result<DestroyOutcome, DriverError> {
        let record = self.controller.load_record()?;
        // Without a working dir the controller reports the missing state file.
        if can_destroy_run(&record) && !record.has_run_id() {
            let scope = &self.controller.context().scope;
            self.deps
                .logger
                .warn("driver.destroy.not_applied", &format!("status={}", record.status));
            if let Err(err) = self
                .deps
                .operator
                .write_reservation_message(&scope.reservation_id, APPLY_NOT_EXECUTED_MESSAGE)
            {
                self.deps.logger.warn("driver.notify.failed", &err.to_string());
            }
            return Err(DriverError::NotApplied {
                message: APPLY_NOT_EXECUTED_MESSAGE.to_string(),
            });
        }
        Ok(self.controller.run_destroy()?)
    }
}
