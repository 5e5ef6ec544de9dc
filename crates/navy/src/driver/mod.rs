//! Backend driver abstraction
//!
//! A [`Driver`] turns environment lifecycle operations into backend
//! invocations. Every driver implements the same operation set; which one an
//! environment uses is decided once, from [`DriverKind`] in its settings.

mod docker_compose;

pub use docker_compose::DockerComposeDriver;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::config::{ConfigDocument, ConfigError};
use crate::runtime::{ExecError, LogStream};
use crate::settings::EnvironmentSettings;

/// Available backend drivers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DriverKind {
    #[default]
    DockerCompose,
}

/// Point-in-time status of a service container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Running,
    Exited,
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceStatus::Running => write!(f, "running"),
            ServiceStatus::Exited => write!(f, "exited"),
        }
    }
}

/// A service container as reported by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    pub name: String,
    pub image: String,
    pub status: ServiceStatus,
    /// Raw backend metadata
    pub raw: serde_json::Value,
}

pub type ServiceList = Vec<Service>;

/// Options accepted by [`Driver::launch`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LaunchOptions {
    /// Do not start linked dependency services
    pub no_deps: bool,
    /// Recreate containers even if their definition is unchanged
    pub force_recreate: bool,
}

impl LaunchOptions {
    /// Backend flags for the options that are set
    pub fn to_args(&self) -> Vec<String> {
        [
            (self.no_deps, "--no-deps"),
            (self.force_recreate, "--force-recreate"),
        ]
        .into_iter()
        .filter(|(set, _)| *set)
        .map(|(_, flag)| flag.to_string())
        .collect()
    }
}

/// Errors surfaced by driver operations
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("Backend command failed: {0}")]
    Exec(#[from] ExecError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to parse container inspection output: {0}")]
    Inspect(#[source] serde_json::Error),
}

/// The capability set every backend driver provides.
///
/// Mutating operations treat an empty service selector as a no-op: nothing is
/// invoked and `Ok(())` is returned.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Create and start `services`
    async fn launch(&self, services: &[String], opts: LaunchOptions) -> Result<(), DriverError>;

    /// Start already created services
    async fn start(&self, services: &[String]) -> Result<(), DriverError>;

    async fn stop(&self, services: &[String]) -> Result<(), DriverError>;

    async fn restart(&self, services: &[String]) -> Result<(), DriverError>;

    async fn kill(&self, services: &[String]) -> Result<(), DriverError>;

    /// Force-remove services together with their volumes
    async fn rm(&self, services: &[String]) -> Result<(), DriverError>;

    /// Kill and tear down the whole environment, including anonymous volumes
    async fn destroy(&self) -> Result<(), DriverError>;

    /// Pull fresh images, then recreate only `services`
    async fn update(&self, services: &[String]) -> Result<(), DriverError>;

    /// Containers of this environment. Empty when nothing exists.
    async fn ps(&self) -> Result<ServiceList, DriverError>;

    /// Published port for `private_port` of `service`, `None` when unmapped.
    /// `index` selects the replica and defaults to 1.
    async fn port(
        &self,
        service: &str,
        private_port: u16,
        index: Option<u32>,
    ) -> Result<Option<u16>, DriverError>;

    /// Follow the logs of `services`. `None` for an empty selector.
    async fn get_log_stream(&self, services: &[String]) -> Result<Option<LogStream>, DriverError>;

    /// Services that currently have containers
    async fn get_launched_service_names(&self) -> Result<Vec<String>, DriverError>;

    /// Services the declaration defines
    async fn get_available_service_names(&self) -> Result<Vec<String>, DriverError>;

    /// Configuration resolved from the user's original declaration
    async fn get_config(&self) -> Result<ConfigDocument, DriverError>;

    /// Replace the compiled configuration
    async fn write_config(&self, config: &ConfigDocument) -> Result<(), DriverError>;

    /// Drop the compiled configuration
    async fn remove_config(&self) -> Result<(), DriverError>;
}

/// Instantiate the driver selected in `settings`
pub fn create_driver(settings: &EnvironmentSettings) -> Arc<dyn Driver> {
    match settings.driver {
        DriverKind::DockerCompose => Arc::new(DockerComposeDriver::new(settings)),
    }
}
