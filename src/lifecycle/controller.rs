use crate::api::{AttributeApi, AttributeWriteRequest, CustomDataApi, OperatorChannel, ResourceScope};
use crate::attribute_names::AttributeNames;
use crate::lifecycle::error::LifecycleError;
use crate::lifecycle::guards::{
    can_destroy_run, can_execute_run, APPLY_BLOCKED_MESSAGE, DESTROY_BLOCKED_MESSAGE,
};
use crate::outputs::{OutputLimits, OutputService};
use crate::sandbox::{ExecutionRecord, ExecutionStatus, SandboxStateStore};
use crate::shared::{generate_run_id, now_secs, ExecutionLogger};
use crate::terraform::{StepFailure, TerraformExecutor};
use crate::variables::{TfVar, VariableService};
use std::path::{Path, PathBuf};

/// Immutable description of what one invocation operates on.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub scope: ResourceScope,
    pub names: AttributeNames,
    pub output_limits: OutputLimits,
}

impl ExecutionContext {
    pub fn new(scope: ResourceScope, model_name: impl Into<String>) -> Self {
        Self {
            scope,
            names: AttributeNames::new(model_name),
            output_limits: OutputLimits::default(),
        }
    }

    pub fn with_output_limits(mut self, limits: OutputLimits) -> Self {
        self.output_limits = limits;
        self
    }
}

/// External services the controller drives.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub attributes: &'a dyn AttributeApi,
    pub custom_data: &'a dyn CustomDataApi,
    pub operator: &'a dyn OperatorChannel,
    pub executor: &'a dyn TerraformExecutor,
    pub logger: &'a dyn ExecutionLogger,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub run_id: String,
    pub working_dir: PathBuf,
    pub variables: Vec<String>,
    pub write_requests: Vec<AttributeWriteRequest>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestroyOutcome {
    pub working_dir: PathBuf,
    pub output: String,
}

pub struct ExecutionController<'a> {
    context: ExecutionContext,
    deps: Collaborators<'a>,
}

impl<'a> ExecutionController<'a> {
    pub fn new(context: ExecutionContext, deps: Collaborators<'a>) -> Self {
        Self { context, deps }
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    fn store(&self) -> SandboxStateStore<'a> {
        SandboxStateStore::new(self.deps.custom_data)
    }

    pub fn load_record(&self) -> Result<ExecutionRecord, LifecycleError> {
        Ok(self.store().load(&self.context.scope.reservation_id)?)
    }

    pub fn can_execute_run(&self) -> Result<bool, LifecycleError> {
        Ok(can_execute_run(&self.load_record()?))
    }

    pub fn can_destroy_run(&self) -> Result<bool, LifecycleError> {
        Ok(can_destroy_run(&self.load_record()?))
    }

    /// Fails with `ApplyBlocked` (and tells the operator) when the persisted
    /// status forbids a new apply.
    pub fn ensure_can_execute(&self) -> Result<ExecutionRecord, LifecycleError> {
        let record = self.load_record()?;
        if can_execute_run(&record) {
            return Ok(record);
        }
        self.deps.logger.warn(
            "lifecycle.apply.blocked",
            &format!("status={}", record.status),
        );
        self.notify(APPLY_BLOCKED_MESSAGE);
        Err(LifecycleError::ApplyBlocked {
            status: record.status,
            message: APPLY_BLOCKED_MESSAGE.to_string(),
        })
    }

    /// Runs init, plan and apply in `working_dir`, then writes outputs back.
    pub fn run_apply(&self, working_dir: &Path) -> Result<ApplyOutcome, LifecycleError> {
        let mut record = self.ensure_can_execute()?;
        let attributes = self.deps.attributes.get_attributes(&self.context.scope)?;
        let vars = self.variable_service().collect(&attributes);

        let run_id = generate_run_id(now_secs()).map_err(LifecycleError::RunId)?;
        record.working_dir = Some(working_dir.to_path_buf());
        record.run_id = Some(run_id.clone());
        self.save(&mut record)?;
        self.deps.logger.info(
            "lifecycle.apply.started",
            &format!(
                "run_id={run_id} working_dir={} variables={}",
                working_dir.display(),
                vars.len()
            ),
        );

        let executor = self.deps.executor;
        let steps = executor
            .init(working_dir)
            .and_then(|_| executor.plan(working_dir, &vars))
            .and_then(|_| executor.apply(working_dir, &vars));
        let applied = match steps {
            Ok(applied) => applied,
            Err(failure) => {
                return Err(self.fail(&mut record, ExecutionStatus::ApplyFailed, failure));
            }
        };

        record.status = ExecutionStatus::Applied;
        self.save(&mut record)?;
        self.deps
            .logger
            .info("lifecycle.apply.completed", &format!("run_id={run_id}"));

        let write_requests = self
            .output_service()
            .parse_and_save_outputs(&self.context.scope, &attributes, &applied.output_json)
            .map_err(|source| {
                self.deps
                    .logger
                    .error("lifecycle.outputs.failed", &source.to_string());
                LifecycleError::OutputWriteback {
                    run_id: run_id.clone(),
                    source,
                }
            })?;

        Ok(ApplyOutcome {
            run_id,
            working_dir: working_dir.to_path_buf(),
            variables: vars.into_iter().map(|var| var.name).collect(),
            write_requests,
        })
    }

    /// Runs destroy in the persisted working directory.
    pub fn run_destroy(&self) -> Result<DestroyOutcome, LifecycleError> {
        let mut record = self.load_record()?;
        let working_dir = match record.working_dir.clone() {
            Some(dir) if can_destroy_run(&record) => dir,
            _ => {
                self.deps
                    .logger
                    .warn("lifecycle.destroy.blocked", "no working directory recorded");
                self.notify(DESTROY_BLOCKED_MESSAGE);
                return Err(LifecycleError::DestroyBlocked {
                    message: DESTROY_BLOCKED_MESSAGE.to_string(),
                });
            }
        };

        let attributes = self.deps.attributes.get_attributes(&self.context.scope)?;
        let vars: Vec<TfVar> = self.variable_service().collect(&attributes);
        self.deps.logger.info(
            "lifecycle.destroy.started",
            &format!(
                "run_id={} working_dir={}",
                record.run_id.as_deref().unwrap_or_default(),
                working_dir.display()
            ),
        );

        let destroyed = match self.deps.executor.destroy(&working_dir, &vars) {
            Ok(destroyed) => destroyed,
            Err(failure) => {
                return Err(self.fail(&mut record, ExecutionStatus::DestroyFailed, failure));
            }
        };

        record.status = ExecutionStatus::Destroyed;
        record.run_id = None;
        self.save(&mut record)?;
        self.deps.logger.info("lifecycle.destroy.completed", "");
        Ok(DestroyOutcome {
            working_dir,
            output: destroyed.output,
        })
    }

    fn variable_service(&self) -> VariableService<'_> {
        VariableService::new(
            self.deps.attributes,
            &self.context.names,
            self.deps.logger,
        )
    }

    fn output_service(&self) -> OutputService<'_> {
        OutputService::new(
            self.deps.attributes,
            &self.context.names,
            self.deps.logger,
            self.context.output_limits,
        )
    }

    fn save(&self, record: &mut ExecutionRecord) -> Result<(), LifecycleError> {
        self.store()
            .save(&self.context.scope.reservation_id, record)
            .map_err(|err| {
                self.deps
                    .logger
                    .error("lifecycle.state.save_failed", &err.to_string());
                err.into()
            })
    }

    /// Records the failed status and reports the step failure. A failure to
    /// persist the status is logged; the step failure is still returned.
    fn fail(
        &self,
        record: &mut ExecutionRecord,
        status: ExecutionStatus,
        failure: StepFailure,
    ) -> LifecycleError {
        self.deps.logger.error(
            "lifecycle.step.failed",
            &format!("step={} exit_code={:?} status={status}", failure.step, failure.exit_code),
        );
        record.status = status;
        let _ = self.save(record);
        self.notify(&failure.to_string());
        LifecycleError::Step(failure)
    }

    fn notify(&self, message: &str) {
        if let Err(err) = self
            .deps
            .operator
            .write_reservation_message(&self.context.scope.reservation_id, message)
        {
            self.deps
                .logger
                .warn("lifecycle.notify.failed", &err.to_string());
        }
    }
}
