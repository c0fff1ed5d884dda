use crate::api::{
    AttributeApi, CustomDataApi, FileSandboxApi, OperatorChannel, ResourceScope,
    SandboxApiClient,
};
use crate::app::cli::{help_text, parse_cli_verb, parse_flags, split_config_flag, CliVerb};
use crate::app::driver::TerraformServiceDriver;
use crate::config::{load_settings, load_settings_from, ApiKind, Settings};
use crate::lifecycle::{can_destroy_run, can_execute_run, Collaborators, ExecutionContext};
use crate::sandbox::SandboxStateStore;
use crate::shared::{FileExecutionLog, ReservationId};
use crate::terraform::{LocalModuleFetcher, TerraformCli};
use std::path::Path;

pub fn run_cli(args: Vec<String>) -> Result<String, String> {
    let (config_path, args) = split_config_flag(&args)?;
    if args.is_empty() {
        return Ok(help_text());
    }

    let verb = parse_cli_verb(args[0].as_str());
    match verb {
        CliVerb::Help => return Ok(help_text()),
        CliVerb::Unknown => return Err(format!("unknown command `{}`", args[0])),
        CliVerb::Apply | CliVerb::Destroy | CliVerb::Status => {}
    }

    let settings = match config_path.as_deref() {
        Some(path) => load_settings_from(Path::new(path)),
        None => load_settings(),
    }
    .map_err(|e| e.to_string())?;

    match verb {
        CliVerb::Apply => cmd_apply(&settings, &args[1..]),
        CliVerb::Destroy => cmd_destroy(&settings, &args[1..]),
        CliVerb::Status => cmd_status(&settings, &args[1..]),
        CliVerb::Help | CliVerb::Unknown => Ok(help_text()),
    }
}

enum SandboxBackend {
    File(FileSandboxApi),
    Http(SandboxApiClient),
}

impl SandboxBackend {
    fn from_settings(settings: &Settings) -> Self {
        match settings.api.kind {
            ApiKind::File => Self::File(FileSandboxApi::new(&settings.state_root)),
            ApiKind::Http => Self::Http(SandboxApiClient::new(
                settings.api.base_url.clone().unwrap_or_default(),
                settings.api_token(),
            )),
        }
    }

    fn attributes(&self) -> &dyn AttributeApi {
        match self {
            Self::File(api) => api,
            Self::Http(client) => client,
        }
    }

    fn custom_data(&self) -> &dyn CustomDataApi {
        match self {
            Self::File(api) => api,
            Self::Http(client) => client,
        }
    }

    fn operator(&self) -> &dyn OperatorChannel {
        match self {
            Self::File(api) => api,
            Self::Http(client) => client,
        }
    }
}

fn parse_reservation(raw: &str) -> Result<ReservationId, String> {
    ReservationId::parse(raw)
}

fn with_driver<T>(
    settings: &Settings,
    reservation: ReservationId,
    resource: &str,
    action: impl FnOnce(&TerraformServiceDriver<'_>) -> Result<T, String>,
) -> Result<T, String> {
    let backend = SandboxBackend::from_settings(settings);
    let logger = FileExecutionLog::new(&settings.state_root, reservation.as_str());
    let executor = TerraformCli::new(
        settings.terraform.binary.clone(),
        settings.terraform.env.clone(),
        &logger,
    );
    let fetcher = LocalModuleFetcher::new(&settings.state_root, settings.terraform.binary.clone());
    let context = ExecutionContext::new(
        ResourceScope::new(reservation, resource),
        settings.model_name.clone(),
    )
    .with_output_limits(settings.output_limits());
    let deps = Collaborators {
        attributes: backend.attributes(),
        custom_data: backend.custom_data(),
        operator: backend.operator(),
        executor: &executor,
        logger: &logger,
    };
    let driver = TerraformServiceDriver::new(context, deps, &fetcher);
    action(&driver)
}

fn cmd_apply(settings: &Settings, args: &[String]) -> Result<String, String> {
    let flags = parse_flags(args)?;
    let reservation = parse_reservation(flags.require_reservation()?)?;
    let resource = flags.require_resource()?;
    let module = flags.require_module()?;
    let outcome = with_driver(settings, reservation, resource, |driver| {
        driver.execute_terraform(module).map_err(|e| e.to_string())
    })?;
    Ok(format!(
        "applied\nrun_id={}\nworking_dir={}\nvariables={}\noutputs_written={}",
        outcome.run_id,
        outcome.working_dir.display(),
        outcome.variables.join(","),
        outcome.write_requests.len()
    ))
}

fn cmd_destroy(settings: &Settings, args: &[String]) -> Result<String, String> {
    let flags = parse_flags(args)?;
    let reservation = parse_reservation(flags.require_reservation()?)?;
    let resource = flags.require_resource()?;
    let outcome = with_driver(settings, reservation, resource, |driver| {
        driver.destroy_terraform().map_err(|e| e.to_string())
    })?;
    Ok(format!(
        "destroyed\nworking_dir={}",
        outcome.working_dir.display()
    ))
}

fn cmd_status(settings: &Settings, args: &[String]) -> Result<String, String> {
    let flags = parse_flags(args)?;
    let reservation = parse_reservation(flags.require_reservation()?)?;
    let backend = SandboxBackend::from_settings(settings);
    let record = SandboxStateStore::new(backend.custom_data())
        .load(&reservation)
        .map_err(|e| e.to_string())?;
    Ok(format!(
        "reservation={reservation}\nstatus={}\nrun_id={}\nworking_dir={}\nversion={}\nupdated_at={}\ncan_execute={}\ncan_destroy={}",
        record.status,
        record.run_id.as_deref().unwrap_or_default(),
        record
            .working_dir
            .as_deref()
            .map(|dir| dir.display().to_string())
            .unwrap_or_default(),
        record.version,
        record.updated_at.as_deref().unwrap_or_default(),
        can_execute_run(&record),
        can_destroy_run(&record),
    ))
}
