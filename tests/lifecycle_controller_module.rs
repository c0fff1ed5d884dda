use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tempfile::tempdir;
use tfsandbox::api::{
    ApiError, AttributeApi, AttributeWriteRequest, Attributes, CustomDataApi, FileSandboxApi,
    ResourceScope,
};
use tfsandbox::lifecycle::{
    Collaborators, ExecutionContext, ExecutionController, LifecycleError, APPLY_BLOCKED_MESSAGE,
    DESTROY_BLOCKED_MESSAGE,
};
use tfsandbox::sandbox::{ExecutionRecord, ExecutionStatus, SandboxStateStore, StateError};
use tfsandbox::shared::{MemoryLogger, ReservationId};
use tfsandbox::terraform::{
    ApplyOutput, StepFailure, StepSuccess, TerraformExecutor, TerraformStep,
};
use tfsandbox::variables::TfVar;

const MODEL: &str = "Terraform Service 2G";

#[derive(Default)]
struct MockExecutor {
    calls: RefCell<Vec<String>>,
    fail_at: Option<TerraformStep>,
    output_json: String,
}

impl MockExecutor {
    fn succeeding(output_json: &str) -> Self {
        Self {
            output_json: output_json.to_string(),
            ..Self::default()
        }
    }

    fn failing_at(step: TerraformStep) -> Self {
        Self {
            fail_at: Some(step),
            output_json: "{}".to_string(),
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn record(&self, step: TerraformStep, vars: &[TfVar]) -> Result<(), StepFailure> {
        let rendered: Vec<String> = vars
            .iter()
            .map(|var| format!("{}={}", var.name, var.value))
            .collect();
        self.calls
            .borrow_mut()
            .push(format!("{step}[{}]", rendered.join(",")));
        if self.fail_at == Some(step) {
            return Err(StepFailure {
                step,
                exit_code: Some(1),
                output: format!("{step} exploded"),
            });
        }
        Ok(())
    }
}

impl TerraformExecutor for MockExecutor {
    fn init(&self, _working_dir: &Path) -> Result<StepSuccess, StepFailure> {
        self.record(TerraformStep::Init, &[])?;
        Ok(StepSuccess {
            step: TerraformStep::Init,
            output: "initialized".to_string(),
        })
    }

    fn plan(&self, _working_dir: &Path, vars: &[TfVar]) -> Result<StepSuccess, StepFailure> {
        self.record(TerraformStep::Plan, vars)?;
        Ok(StepSuccess {
            step: TerraformStep::Plan,
            output: "planned".to_string(),
        })
    }

    fn apply(&self, _working_dir: &Path, vars: &[TfVar]) -> Result<ApplyOutput, StepFailure> {
        self.record(TerraformStep::Apply, vars)?;
        Ok(ApplyOutput {
            output: "applied".to_string(),
            output_json: self.output_json.clone(),
        })
    }

    fn destroy(&self, _working_dir: &Path, vars: &[TfVar]) -> Result<StepSuccess, StepFailure> {
        self.record(TerraformStep::Destroy, vars)?;
        Ok(StepSuccess {
            step: TerraformStep::Destroy,
            output: "destroyed".to_string(),
        })
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    api: FileSandboxApi,
    scope: ResourceScope,
    working_dir: PathBuf,
}

fn fixture(attributes: &[(&str, &str)]) -> Fixture {
    let dir = tempdir().expect("tempdir");
    let api = FileSandboxApi::new(dir.path().join("state"));
    let scope = ResourceScope::new(ReservationId::parse("res-1").expect("id"), "svc");
    let attributes: BTreeMap<String, String> = attributes
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    api.put_attributes(&scope, attributes).expect("seed attributes");
    let working_dir = dir.path().join("work");
    Fixture {
        _dir: dir,
        api,
        scope,
        working_dir,
    }
}

fn controller<'a>(
    fx: &'a Fixture,
    executor: &'a MockExecutor,
    logger: &'a MemoryLogger,
) -> ExecutionController<'a> {
    ExecutionController::new(
        ExecutionContext::new(fx.scope.clone(), MODEL),
        Collaborators {
            attributes: &fx.api,
            custom_data: &fx.api,
            operator: &fx.api,
            executor,
            logger,
        },
    )
}

fn seed_status(fx: &Fixture, status: ExecutionStatus, working_dir: Option<&Path>) {
    let store = SandboxStateStore::new(&fx.api);
    let mut record = store.load(&fx.scope.reservation_id).expect("load");
    record.status = status;
    record.working_dir = working_dir.map(Path::to_path_buf);
    record.run_id = working_dir.map(|_| "run-seeded".to_string());
    store
        .save(&fx.scope.reservation_id, &mut record)
        .expect("seed status");
}

fn load(fx: &Fixture) -> ExecutionRecord {
    SandboxStateStore::new(&fx.api)
        .load(&fx.scope.reservation_id)
        .expect("load record")
}

#[test]
fn apply_runs_steps_in_order_and_writes_outputs() {
    let fx = fixture(&[
        ("Terraform Service 2G.var_region", "eu-west-1"),
        ("Terraform Service 2G.Terraform Inputs", "size=small"),
        ("Terraform Service 2G.out_endpoint", ""),
        ("Terraform Service 2G.Terraform Outputs", ""),
    ]);
    let executor = MockExecutor::succeeding(
        r#"{"endpoint":{"value":"https://x"},"token":{"value":"s3cret","sensitive":true},"count":{"value":3}}"#,
    );
    let logger = MemoryLogger::new();

    let outcome = controller(&fx, &executor, &logger)
        .run_apply(&fx.working_dir)
        .expect("apply");

    assert_eq!(
        executor.calls(),
        vec![
            "init[]".to_string(),
            "plan[region=eu-west-1,size=small]".to_string(),
            "apply[region=eu-west-1,size=small]".to_string(),
        ]
    );
    assert!(outcome.run_id.starts_with("run-"));
    assert_eq!(outcome.variables, vec!["region", "size"]);

    let record = load(&fx);
    assert_eq!(record.status, ExecutionStatus::Applied);
    assert_eq!(record.working_dir.as_deref(), Some(fx.working_dir.as_path()));
    assert_eq!(record.run_id.as_deref(), Some(outcome.run_id.as_str()));

    let attributes = fx.api.get_attributes(&fx.scope).expect("attributes");
    assert_eq!(
        attributes["Terraform Service 2G.out_endpoint"],
        "https://x"
    );
    let aggregate = &attributes["Terraform Service 2G.Terraform Outputs"];
    assert!(aggregate.contains("count=3"));
    assert!(aggregate.contains("token=(sensitive)"));
    assert!(!aggregate.contains("s3cret"));
    assert!(logger.contains_event("lifecycle.apply.completed"));
}

#[test]
fn applied_status_blocks_apply_without_running_terraform() {
    let fx = fixture(&[]);
    seed_status(&fx, ExecutionStatus::Applied, Some(Path::new("/tmp/old")));
    let executor = MockExecutor::succeeding("{}");
    let logger = MemoryLogger::new();

    let err = controller(&fx, &executor, &logger)
        .run_apply(&fx.working_dir)
        .expect_err("blocked");
    match err {
        LifecycleError::ApplyBlocked { status, message } => {
            assert_eq!(status, ExecutionStatus::Applied);
            assert_eq!(message, APPLY_BLOCKED_MESSAGE);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(executor.calls().is_empty());
    let messages = fx
        .api
        .read_reservation_messages(&fx.scope.reservation_id)
        .expect("messages");
    assert_eq!(messages, vec![APPLY_BLOCKED_MESSAGE.to_string()]);
    assert_eq!(load(&fx).working_dir.as_deref(), Some(Path::new("/tmp/old")));
}

#[test]
fn failed_and_destroyed_states_allow_a_new_apply() {
    for status in [
        ExecutionStatus::ApplyFailed,
        ExecutionStatus::DestroyFailed,
        ExecutionStatus::Destroyed,
    ] {
        let fx = fixture(&[]);
        seed_status(&fx, status, Some(Path::new("/tmp/old")));
        let executor = MockExecutor::succeeding("{}");
        let logger = MemoryLogger::new();
        controller(&fx, &executor, &logger)
            .run_apply(&fx.working_dir)
            .unwrap_or_else(|err| panic!("apply from {status} failed: {err}"));
        assert_eq!(load(&fx).status, ExecutionStatus::Applied);
    }
}

#[test]
fn plan_failure_persists_apply_failed_and_skips_apply() {
    let fx = fixture(&[]);
    let executor = MockExecutor::failing_at(TerraformStep::Plan);
    let logger = MemoryLogger::new();

    let err = controller(&fx, &executor, &logger)
        .run_apply(&fx.working_dir)
        .expect_err("plan fails");
    match err {
        LifecycleError::Step(failure) => {
            assert_eq!(failure.step, TerraformStep::Plan);
            assert_eq!(failure.output, "plan exploded");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(executor.calls(), vec!["init[]", "plan[]"]);

    let record = load(&fx);
    assert_eq!(record.status, ExecutionStatus::ApplyFailed);
    assert_eq!(record.working_dir.as_deref(), Some(fx.working_dir.as_path()));
    assert!(record.has_run_id());

    let messages = fx
        .api
        .read_reservation_messages(&fx.scope.reservation_id)
        .expect("messages");
    assert_eq!(messages, vec!["terraform plan failed: plan exploded".to_string()]);
}

#[test]
fn destroy_without_working_dir_is_blocked() {
    let fx = fixture(&[]);
    let executor = MockExecutor::succeeding("{}");
    let logger = MemoryLogger::new();

    let err = controller(&fx, &executor, &logger)
        .run_destroy()
        .expect_err("blocked");
    assert!(matches!(err, LifecycleError::DestroyBlocked { .. }));
    assert!(executor.calls().is_empty());
    let messages = fx
        .api
        .read_reservation_messages(&fx.scope.reservation_id)
        .expect("messages");
    assert_eq!(messages, vec![DESTROY_BLOCKED_MESSAGE.to_string()]);
}

#[test]
fn destroy_success_clears_run_id_and_keeps_working_dir() {
    let fx = fixture(&[("Terraform Service 2G.var_region", "eu-west-1")]);
    let old = fx.working_dir.clone();
    seed_status(&fx, ExecutionStatus::Applied, Some(old.as_path()));
    let executor = MockExecutor::succeeding("{}");
    let logger = MemoryLogger::new();

    let outcome = controller(&fx, &executor, &logger)
        .run_destroy()
        .expect("destroy");
    assert_eq!(outcome.working_dir, old);
    assert_eq!(executor.calls(), vec!["destroy[region=eu-west-1]"]);

    let record = load(&fx);
    assert_eq!(record.status, ExecutionStatus::Destroyed);
    assert!(!record.has_run_id());
    assert_eq!(record.working_dir.as_deref(), Some(old.as_path()));
}

#[test]
fn destroy_failure_persists_destroy_failed() {
    let fx = fixture(&[]);
    seed_status(&fx, ExecutionStatus::Applied, Some(Path::new("/tmp/old")));
    let executor = MockExecutor::failing_at(TerraformStep::Destroy);
    let logger = MemoryLogger::new();

    let err = controller(&fx, &executor, &logger)
        .run_destroy()
        .expect_err("destroy fails");
    assert!(matches!(err, LifecycleError::Step(_)));
    let record = load(&fx);
    assert_eq!(record.status, ExecutionStatus::DestroyFailed);
    assert_eq!(record.run_id.as_deref(), Some("run-seeded"));
}

#[test]
fn concurrent_writer_between_load_and_save_is_reported_as_conflict() {
    let fx = fixture(&[]);
    let store = SandboxStateStore::new(&fx.api);
    let mut first = store.load(&fx.scope.reservation_id).expect("load");
    let mut second = first.clone();

    first.status = ExecutionStatus::Applied;
    store
        .save(&fx.scope.reservation_id, &mut first)
        .expect("first save");

    second.status = ExecutionStatus::ApplyFailed;
    let err = store
        .save(&fx.scope.reservation_id, &mut second)
        .expect_err("stale save");
    assert!(matches!(
        err,
        StateError::Conflict {
            expected: 0,
            found: 1,
            ..
        }
    ));
    assert_eq!(load(&fx).status, ExecutionStatus::Applied);
    assert!(fx
        .api
        .get_custom_data(&fx.scope.reservation_id)
        .expect("blob")
        .is_some());
}

#[test]
fn init_or_apply_failure_persists_apply_failed() {
    for (step, expected_calls) in [
        (TerraformStep::Init, vec!["init[]"]),
        (TerraformStep::Apply, vec!["init[]", "plan[]", "apply[]"]),
    ] {
        let fx = fixture(&[]);
        let executor = MockExecutor::failing_at(step);
        let logger = MemoryLogger::new();

        let err = controller(&fx, &executor, &logger)
            .run_apply(&fx.working_dir)
            .expect_err("step fails");
        match err {
            LifecycleError::Step(failure) => assert_eq!(failure.step, step),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(executor.calls(), expected_calls);
        let record = load(&fx);
        assert_eq!(record.status, ExecutionStatus::ApplyFailed, "after {step}");
        assert!(record.has_run_id());
    }
}

/// Reads through to the file backend but rejects every write.
struct RejectingWrites<'a>(&'a FileSandboxApi);

impl AttributeApi for RejectingWrites<'_> {
    fn get_attributes(&self, scope: &ResourceScope) -> Result<Attributes, ApiError> {
        self.0.get_attributes(scope)
    }

    fn set_attributes(
        &self,
        _scope: &ResourceScope,
        _requests: &[AttributeWriteRequest],
    ) -> Result<(), ApiError> {
        Err(ApiError::Response("attribute service unavailable".to_string()))
    }

    fn decrypt_password(&self, value: &str) -> Result<String, ApiError> {
        self.0.decrypt_password(value)
    }
}

#[test]
fn output_writeback_failure_keeps_applied_status() {
    let fx = fixture(&[("Terraform Service 2G.out_endpoint", "")]);
    let executor = MockExecutor::succeeding(r#"{"endpoint":{"value":"https://x"}}"#);
    let logger = MemoryLogger::new();
    let attributes = RejectingWrites(&fx.api);
    let controller = ExecutionController::new(
        ExecutionContext::new(fx.scope.clone(), MODEL),
        Collaborators {
            attributes: &attributes,
            custom_data: &fx.api,
            operator: &fx.api,
            executor: &executor,
            logger: &logger,
        },
    );

    let err = controller
        .run_apply(&fx.working_dir)
        .expect_err("write-back fails");
    let run_id = match err {
        LifecycleError::OutputWriteback { run_id, .. } => run_id,
        other => panic!("unexpected error: {other:?}"),
    };
    assert_eq!(executor.calls().len(), 3);

    let record = load(&fx);
    assert_eq!(record.status, ExecutionStatus::Applied);
    assert_eq!(record.run_id.as_deref(), Some(run_id.as_str()));
    assert!(logger.contains_event("lifecycle.outputs.failed"));
    let stored = fx.api.get_attributes(&fx.scope).expect("attributes");
    assert_eq!(stored["Terraform Service 2G.out_endpoint"], "");
}
