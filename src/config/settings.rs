use super::ConfigError;
use crate::outputs::OutputLimits;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_TERRAFORM_BINARY: &str = "terraform";
pub const DEFAULT_TOKEN_ENV: &str = "TFSANDBOX_API_TOKEN";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiKind {
    #[default]
    File,
    Http,
}

impl ApiKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Http => "http",
        }
    }
}

impl std::fmt::Display for ApiKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ApiSettings {
    #[serde(default)]
    pub kind: ApiKind,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub token_env: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TerraformSettings {
    #[serde(default = "default_terraform_binary")]
    pub binary: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl Default for TerraformSettings {
    fn default() -> Self {
        Self {
            binary: default_terraform_binary(),
            env: BTreeMap::new(),
        }
    }
}

fn default_terraform_binary() -> String {
    DEFAULT_TERRAFORM_BINARY.to_string()
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OutputSettings {
    #[serde(default)]
    pub max_value_chars: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub state_root: PathBuf,
    pub model_name: String,
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub terraform: TerraformSettings,
    #[serde(default)]
    pub outputs: OutputSettings,
}

impl Settings {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.state_root.is_absolute() {
            return Err(ConfigError::Settings(
                "`state_root` must be an absolute path".to_string(),
            ));
        }
        if self.model_name.trim().is_empty() {
            return Err(ConfigError::Settings(
                "`model_name` must be non-empty".to_string(),
            ));
        }
        if self.terraform.binary.trim().is_empty() {
            return Err(ConfigError::Settings(
                "`terraform.binary` must be non-empty".to_string(),
            ));
        }
        if self.api.kind == ApiKind::Http
            && self
                .api
                .base_url
                .as_deref()
                .map_or(true, |url| url.trim().is_empty())
        {
            return Err(ConfigError::Settings(
                "`api.base_url` is required when `api.kind` is `http`".to_string(),
            ));
        }
        if self.outputs.max_value_chars == Some(0) {
            return Err(ConfigError::Settings(
                "`outputs.max_value_chars` must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn output_limits(&self) -> OutputLimits {
        OutputLimits {
            max_value_chars: self.outputs.max_value_chars,
        }
    }

    pub fn token_env(&self) -> &str {
        self.api.token_env.as_deref().unwrap_or(DEFAULT_TOKEN_ENV)
    }

    /// Bearer token for the http api; `None` when the variable is unset.
    pub fn api_token(&self) -> Option<String> {
        std::env::var(self.token_env())
            .ok()
            .filter(|token| !token.trim().is_empty())
    }
}
