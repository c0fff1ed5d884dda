#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliVerb {
    Apply,
    Destroy,
    Status,
    Help,
    Unknown,
}

pub fn parse_cli_verb(input: &str) -> CliVerb {
    match input {
        "apply" => CliVerb::Apply,
        "destroy" => CliVerb::Destroy,
        "status" => CliVerb::Status,
        "help" | "--help" | "-h" => CliVerb::Help,
        _ => CliVerb::Unknown,
    }
}

pub fn cli_help_lines() -> Vec<String> {
    vec![
        "Usage: tfsandbox [--config <path>] <command>".to_string(),
        String::new(),
        "Commands:".to_string(),
        "  apply --reservation <id> --resource <name> --module <dir>".to_string(),
        "                                       Fetch the module and run init/plan/apply"
            .to_string(),
        "  destroy --reservation <id> --resource <name>".to_string(),
        "                                       Destroy the recorded working directory"
            .to_string(),
        "  status --reservation <id>            Show the persisted execution record".to_string(),
        "  help                                 Show this help".to_string(),
    ]
}

pub(crate) fn help_text() -> String {
    cli_help_lines().join("\n")
}

/// Flags shared by every command, collected by [`parse_flags`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandFlags {
    pub reservation: Option<String>,
    pub resource: Option<String>,
    pub module: Option<String>,
}

impl CommandFlags {
    pub fn require_reservation(&self) -> Result<&str, String> {
        self.reservation
            .as_deref()
            .ok_or_else(|| "missing required flag `--reservation <id>`".to_string())
    }

    pub fn require_resource(&self) -> Result<&str, String> {
        self.resource
            .as_deref()
            .ok_or_else(|| "missing required flag `--resource <name>`".to_string())
    }

    pub fn require_module(&self) -> Result<&str, String> {
        self.module
            .as_deref()
            .ok_or_else(|| "missing required flag `--module <dir>`".to_string())
    }
}

pub fn parse_flags(args: &[String]) -> Result<CommandFlags, String> {
    let mut flags = CommandFlags::default();
    let mut iter = args.iter();
    while let Some(flag) = iter.next() {
        let slot = match flag.as_str() {
            "--reservation" => &mut flags.reservation,
            "--resource" => &mut flags.resource,
            "--module" => &mut flags.module,
            other => return Err(format!("unknown flag `{other}`")),
        };
        let value = iter
            .next()
            .filter(|value| !value.starts_with("--"))
            .ok_or_else(|| format!("flag `{flag}` requires a value"))?;
        if slot.is_some() {
            return Err(format!("flag `{flag}` given more than once"));
        }
        *slot = Some(value.clone());
    }
    Ok(flags)
}

/// Splits a leading `--config <path>` off the argument list.
pub fn split_config_flag(args: &[String]) -> Result<(Option<String>, &[String]), String> {
    match args.first().map(String::as_str) {
        Some("--config") => {
            let path = args
                .get(1)
                .ok_or_else(|| "flag `--config` requires a value".to_string())?;
            Ok((Some(path.clone()), &args[2..]))
        }
        _ => Ok((None, args)),
    }
}
