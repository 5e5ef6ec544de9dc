//! docker-compose / docker invocations scoped to one environment

use std::path::{Path, PathBuf};
use tokio::process::Child;

use super::exec::{ExecError, ExecOptions, ProcessClient};
use crate::settings::EnvironmentSettings;

/// Builds and runs backend commands for a single compose project.
///
/// Every compose invocation is prefixed with `-p <project>` and `-f <file>`
/// arguments. Invocations read the compiled compose file once it exists,
/// unless [`ExecOptions::use_original_source`] asks for the user's files.
#[derive(Debug, Clone)]
pub struct ComposeClient {
    process: ProcessClient,
    compose_command: String,
    docker_command: String,
    project_name: String,
    compose_files: Vec<PathBuf>,
    compiled_path: PathBuf,
    max_buffer: usize,
}

impl ComposeClient {
    pub fn from_settings(settings: &EnvironmentSettings) -> Self {
        let mut process = ProcessClient::new(settings.log_target());
        if let Some(dir) = &settings.working_dir {
            process = process.with_working_dir(dir);
        }

        Self {
            process,
            compose_command: settings.compose_command.clone(),
            docker_command: settings.docker_command.clone(),
            project_name: settings.project_name(),
            compose_files: settings.compose_files.clone(),
            compiled_path: settings.compiled_config_path(),
            max_buffer: settings.max_buffer,
        }
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    pub fn compiled_path(&self) -> &Path {
        &self.compiled_path
    }

    pub fn log_target(&self) -> &str {
        self.process.log_target()
    }

    /// Default options for this environment's invocations
    pub fn options(&self) -> ExecOptions {
        ExecOptions::default().with_max_buffer(self.max_buffer)
    }

    async fn compose_args(&self, subcommand: &str, args: &[String], opts: &ExecOptions) -> Vec<String> {
        let use_compiled = !opts.use_original_source
            && tokio::fs::try_exists(&self.compiled_path)
                .await
                .unwrap_or(false);

        let files: Vec<&Path> = if use_compiled {
            vec![self.compiled_path.as_path()]
        } else {
            self.compose_files.iter().map(PathBuf::as_path).collect()
        };

        let mut full = vec!["-p".to_string(), self.project_name.clone()];
        for file in files {
            full.push("-f".to_string());
            full.push(file.to_string_lossy().into_owned());
        }
        full.push(subcommand.to_string());
        full.extend(args.iter().cloned());
        full
    }

    /// Run a compose subcommand to completion
    pub async fn exec(
        &self,
        subcommand: &str,
        args: &[String],
        opts: ExecOptions,
    ) -> Result<String, ExecError> {
        let full = self.compose_args(subcommand, args, &opts).await;
        self.process.exec(&self.compose_command, &full, &opts).await
    }

    /// Spawn a compose subcommand and return the live child
    pub async fn spawn(
        &self,
        subcommand: &str,
        args: &[String],
        opts: ExecOptions,
    ) -> Result<Child, ExecError> {
        let full = self.compose_args(subcommand, args, &opts).await;
        self.process.spawn(&self.compose_command, &full, &opts)
    }

    /// Run a plain docker command to completion
    pub async fn docker(&self, args: &[String], opts: ExecOptions) -> Result<String, ExecError> {
        self.process.exec(&self.docker_command, args, &opts).await
    }
}
