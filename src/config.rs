pub mod error;
pub mod load;
pub mod paths;
pub mod settings;

pub use error::ConfigError;
pub use load::{load_settings, load_settings_from};
pub use paths::{default_config_path, CONFIG_FILE_NAME, GLOBAL_STATE_DIR};
pub use settings::{ApiKind, ApiSettings, OutputSettings, Settings, TerraformSettings};
