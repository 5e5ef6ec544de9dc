//! Environment settings file

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::driver::DriverKind;
use crate::runtime::DEFAULT_MAX_BUFFER;

/// File name of the compiled compose file inside the environment state dir
pub const COMPILED_CONFIG_FILE: &str = "docker-compose.tmp.yml";

/// Settings for a single named environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentSettings {
    /// Environment name
    pub name: String,

    /// Backend driver used to materialize the environment
    #[serde(default)]
    pub driver: DriverKind,

    /// The user's original compose files
    pub compose_files: Vec<PathBuf>,

    /// Working directory for backend invocations
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Host or IP used to reach published ports
    #[serde(default)]
    pub external_ip: Option<String>,

    /// Directory holding per-environment state (default: ~/.navy)
    #[serde(default)]
    pub state_dir: Option<PathBuf>,

    /// docker-compose executable
    #[serde(default = "default_compose_command")]
    pub compose_command: String,

    /// docker executable
    #[serde(default = "default_docker_command")]
    pub docker_command: String,

    /// Output cap for buffered backend invocations, in bytes
    #[serde(default = "default_max_buffer")]
    pub max_buffer: usize,
}

fn default_compose_command() -> String {
    "docker-compose".to_string()
}

fn default_docker_command() -> String {
    "docker".to_string()
}

fn default_max_buffer() -> usize {
    DEFAULT_MAX_BUFFER
}

impl EnvironmentSettings {
    /// Settings with defaults for everything but the name and compose files
    pub fn new(name: impl Into<String>, compose_files: Vec<PathBuf>) -> Self {
        Self {
            name: name.into(),
            driver: DriverKind::default(),
            compose_files,
            working_dir: None,
            external_ip: None,
            state_dir: None,
            compose_command: default_compose_command(),
            docker_command: default_docker_command(),
            max_buffer: default_max_buffer(),
        }
    }

    /// Load settings from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| SettingsError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse settings from a YAML string
    pub fn from_yaml(content: &str) -> Result<Self, SettingsError> {
        let settings: EnvironmentSettings = serde_yaml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.name.trim().is_empty() {
            return Err(SettingsError::Validation(
                "environment name must not be empty".to_string(),
            ));
        }
        if self.project_name().is_empty() {
            return Err(SettingsError::Validation(format!(
                "environment name '{}' has no alphanumeric characters",
                self.name
            )));
        }
        if self.compose_files.is_empty() {
            return Err(SettingsError::Validation(format!(
                "environment '{}' must list at least one compose file",
                self.name
            )));
        }
        if self.max_buffer == 0 {
            return Err(SettingsError::Validation(
                "max_buffer must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Backend project name, also used as the container label namespace
    pub fn project_name(&self) -> String {
        normalise_name(&self.name)
    }

    /// Root directory for navy state
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".navy")
        })
    }

    /// Where the compiled compose file for this environment lives
    pub fn compiled_config_path(&self) -> PathBuf {
        self.state_dir()
            .join(self.project_name())
            .join(COMPILED_CONFIG_FILE)
    }

    /// Log target for everything this environment does
    pub fn log_target(&self) -> String {
        format!("navy::{}", self.project_name())
    }
}

/// Lowercase the name and strip everything that is not ASCII alphanumeric
pub fn normalise_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Errors that can occur when loading settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to read settings file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}
