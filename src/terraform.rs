use crate::variables::TfVar;
use std::path::Path;

pub mod fetch;
pub mod invocation;
pub mod runner;

pub use fetch::{FetchError, LocalModuleFetcher, ModuleDescriptor, ModuleFetcher};
pub use invocation::PLAN_FILE_NAME;
pub use runner::{run_process, ProcessOutput, TerraformCli};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerraformStep {
    Init,
    Plan,
    Apply,
    Output,
    Destroy,
}

impl TerraformStep {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Plan => "plan",
            Self::Apply => "apply",
            Self::Output => "output",
            Self::Destroy => "destroy",
        }
    }
}

impl std::fmt::Display for TerraformStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepSuccess {
    pub step: TerraformStep,
    pub output: String,
}

/// A Terraform step that did not succeed, with whatever it printed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("terraform {step} failed: {output}")]
pub struct StepFailure {
    pub step: TerraformStep,
    pub exit_code: Option<i32>,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOutput {
    pub output: String,
    /// Raw `terraform output -json` document.
    pub output_json: String,
}

/// Runs Terraform commands in a working directory.
///
/// Every call blocks until the underlying command finishes.
pub trait TerraformExecutor {
    fn init(&self, working_dir: &Path) -> Result<StepSuccess, StepFailure>;

    fn plan(&self, working_dir: &Path, vars: &[TfVar]) -> Result<StepSuccess, StepFailure>;

    fn apply(&self, working_dir: &Path, vars: &[TfVar]) -> Result<ApplyOutput, StepFailure>;

    fn destroy(&self, working_dir: &Path, vars: &[TfVar]) -> Result<StepSuccess, StepFailure>;
}
