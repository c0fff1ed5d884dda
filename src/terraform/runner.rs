use crate::shared::ExecutionLogger;
use crate::terraform::invocation::{
    apply_invocation, destroy_invocation, init_invocation, output_invocation, plan_invocation,
    InvocationSpec, PLAN_FILE_NAME,
};
use crate::terraform::{ApplyOutput, StepFailure, StepSuccess, TerraformExecutor};
use crate::variables::TfVar;
use std::collections::BTreeMap;
use std::io::{BufReader, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub exit_code: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    /// Stdout followed by stderr.
    pub fn combined(&self) -> String {
        match (self.stdout.trim_end(), self.stderr.trim_end()) {
            ("", err) => err.to_string(),
            (out, "") => out.to_string(),
            (out, err) => format!("{out}\n{err}"),
        }
    }
}

/// Runs `binary args...` in `cwd` to completion, capturing both streams.
pub fn run_process(
    binary: &str,
    args: &[String],
    cwd: &Path,
    env: &BTreeMap<String, String>,
) -> std::io::Result<ProcessOutput> {
    let mut command = Command::new(binary);
    command
        .current_dir(cwd)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for (k, v) in env {
        command.env(k, v);
    }

    let mut child = command.spawn()?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| std::io::Error::other("missing stdout pipe"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| std::io::Error::other("missing stderr pipe"))?;

    let stdout_reader = thread::spawn(move || read_lossy(stdout));
    let stderr_reader = thread::spawn(move || read_lossy(stderr));

    let status = child.wait()?;
    let stdout = stdout_reader.join().unwrap_or_default();
    let stderr = stderr_reader.join().unwrap_or_default();
    Ok(ProcessOutput {
        exit_code: status.code(),
        success: status.success(),
        stdout,
        stderr,
    })
}

/// Reads a pipe to its end; invalid UTF-8 is replaced, not dropped.
fn read_lossy(pipe: impl Read) -> String {
    let mut buf = Vec::new();
    let _ = BufReader::new(pipe).read_to_end(&mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}

/// [`TerraformExecutor`] that shells out to the Terraform CLI.
pub struct TerraformCli<'a> {
    binary: String,
    env: BTreeMap<String, String>,
    logger: &'a dyn ExecutionLogger,
}

impl<'a> TerraformCli<'a> {
    pub fn new(
        binary: impl Into<String>,
        env: BTreeMap<String, String>,
        logger: &'a dyn ExecutionLogger,
    ) -> Self {
        Self {
            binary: binary.into(),
            env,
            logger,
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    fn run(&self, spec: &InvocationSpec, working_dir: &Path) -> Result<ProcessOutput, StepFailure> {
        let command_form = spec.command_form(&self.binary);
        self.logger.info(
            "terraform.step.started",
            &format!("step={} cwd={} command={command_form}", spec.step, working_dir.display()),
        );
        let output = match run_process(&self.binary, &spec.args, working_dir, &self.env) {
            Ok(output) => output,
            Err(err) => {
                let message = if err.kind() == std::io::ErrorKind::NotFound {
                    format!("terraform binary `{}` not found: {err}", self.binary)
                } else {
                    format!("failed to run `{command_form}`: {err}")
                };
                self.logger.error("terraform.step.spawn_failed", &message);
                return Err(StepFailure {
                    step: spec.step,
                    exit_code: None,
                    output: message,
                });
            }
        };

        if !output.success {
            self.logger.error(
                "terraform.step.failed",
                &format!("step={} exit_code={:?}", spec.step, output.exit_code),
            );
            return Err(StepFailure {
                step: spec.step,
                exit_code: output.exit_code,
                output: output.combined(),
            });
        }
        self.logger.info(
            "terraform.step.completed",
            &format!("step={}", spec.step),
        );
        Ok(output)
    }

    fn run_step(&self, spec: InvocationSpec, working_dir: &Path) -> Result<StepSuccess, StepFailure> {
        let output = self.run(&spec, working_dir)?;
        Ok(StepSuccess {
            step: spec.step,
            output: output.combined(),
        })
    }
}

impl TerraformExecutor for TerraformCli<'_> {
    fn init(&self, working_dir: &Path) -> Result<StepSuccess, StepFailure> {
        self.run_step(init_invocation(), working_dir)
    }

    fn plan(&self, working_dir: &Path, vars: &[TfVar]) -> Result<StepSuccess, StepFailure> {
        self.run_step(plan_invocation(vars), working_dir)
    }

    fn apply(&self, working_dir: &Path, vars: &[TfVar]) -> Result<ApplyOutput, StepFailure> {
        let has_plan_file = working_dir.join(PLAN_FILE_NAME).is_file();
        let applied = self.run(&apply_invocation(vars, has_plan_file), working_dir)?;
        let outputs = self.run(&output_invocation(), working_dir)?;
        Ok(ApplyOutput {
            output: applied.combined(),
            output_json: outputs.stdout,
        })
    }

    fn destroy(&self, working_dir: &Path, vars: &[TfVar]) -> Result<StepSuccess, StepFailure> {
        self.run_step(destroy_invocation(vars), working_dir)
    }
}
