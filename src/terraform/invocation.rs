use crate::terraform::TerraformStep;
use crate::variables::TfVar;

pub const PLAN_FILE_NAME: &str = "tfsandbox.tfplan";

const COMMON_FLAGS: [&str; 2] = ["-input=false", "-no-color"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationSpec {
    pub step: TerraformStep,
    pub args: Vec<String>,
    /// Argument list safe for logs: variable values are replaced by `***`.
    pub display_args: Vec<String>,
}

impl InvocationSpec {
    fn new(step: TerraformStep, flags: &[&str]) -> Self {
        let args = std::iter::once(step.as_str())
            .chain(flags.iter().copied())
            .map(str::to_string)
            .collect::<Vec<_>>();
        Self {
            step,
            display_args: args.clone(),
            args,
        }
    }

    fn with_vars(mut self, vars: &[TfVar]) -> Self {
        for var in vars {
            self.args.push("-var".to_string());
            self.args.push(format!("{}={}", var.name, var.value));
            self.display_args.push("-var".to_string());
            self.display_args.push(format!("{}=***", var.name));
        }
        self
    }

    fn with_arg(mut self, arg: &str) -> Self {
        self.args.push(arg.to_string());
        self.display_args.push(arg.to_string());
        self
    }

    pub fn command_form(&self, binary: &str) -> String {
        format!("{binary} {}", self.display_args.join(" "))
    }
}

pub fn init_invocation() -> InvocationSpec {
    InvocationSpec::new(TerraformStep::Init, &COMMON_FLAGS)
}

pub fn plan_invocation(vars: &[TfVar]) -> InvocationSpec {
    InvocationSpec::new(TerraformStep::Plan, &COMMON_FLAGS)
        .with_arg(&format!("-out={PLAN_FILE_NAME}"))
        .with_vars(vars)
}

/// Applies the saved plan when there is one, otherwise applies directly with
/// the given variables.
pub fn apply_invocation(vars: &[TfVar], has_plan_file: bool) -> InvocationSpec {
    let spec = InvocationSpec::new(TerraformStep::Apply, &COMMON_FLAGS).with_arg("-auto-approve");
    if has_plan_file {
        spec.with_arg(PLAN_FILE_NAME)
    } else {
        spec.with_vars(vars)
    }
}

pub fn output_invocation() -> InvocationSpec {
    InvocationSpec::new(TerraformStep::Output, &["-no-color", "-json"])
}

pub fn destroy_invocation(vars: &[TfVar]) -> InvocationSpec {
    InvocationSpec::new(TerraformStep::Destroy, &COMMON_FLAGS)
        .with_arg("-auto-approve")
        .with_vars(vars)
}
