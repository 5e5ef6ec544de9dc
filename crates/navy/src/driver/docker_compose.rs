//! docker-compose backed driver

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::process::Child;

use super::{Driver, DriverError, LaunchOptions, Service, ServiceList, ServiceStatus};
use crate::config::{ComposeConfigStore, ConfigDocument};
use crate::runtime::{ComposeClient, ExecError, LogSource, LogStream, LogStreamError};
use crate::settings::EnvironmentSettings;

const PROJECT_LABEL: &str = "com.docker.compose.project";
const SERVICE_LABEL: &str = "com.docker.compose.service";
const LOG_TAIL_ARG: &str = "--tail=250";

/// Driver that materializes an environment as a docker-compose project
#[derive(Debug, Clone)]
pub struct DockerComposeDriver {
    client: Arc<ComposeClient>,
    store: ComposeConfigStore,
}

impl DockerComposeDriver {
    pub fn new(settings: &EnvironmentSettings) -> Self {
        Self::with_client(Arc::new(ComposeClient::from_settings(settings)))
    }

    pub fn with_client(client: Arc<ComposeClient>) -> Self {
        let store = ComposeConfigStore::new(client.clone());
        Self { client, store }
    }

    pub fn client(&self) -> &ComposeClient {
        &self.client
    }

    /// Run `subcommand services...` unless the selector is empty
    async fn exec_for(
        &self,
        subcommand: &str,
        flags: &[&str],
        services: &[String],
    ) -> Result<(), DriverError> {
        if services.is_empty() {
            log::debug!(
                target: self.client.log_target(),
                "No services given to {}, nothing to do",
                subcommand
            );
            return Ok(());
        }

        let mut args: Vec<String> = flags.iter().map(|f| f.to_string()).collect();
        args.extend(services.iter().cloned());
        self.client.exec(subcommand, &args, self.client.options()).await?;
        Ok(())
    }
}

#[async_trait]
impl Driver for DockerComposeDriver {
    async fn launch(&self, services: &[String], opts: LaunchOptions) -> Result<(), DriverError> {
        let extra = opts.to_args();
        log::debug!(
            target: self.client.log_target(),
            "Launch {:?} with {:?}",
            services,
            extra
        );

        let mut flags = vec!["-d"];
        flags.extend(extra.iter().map(String::as_str));
        self.exec_for("up", &flags, services).await
    }

    async fn start(&self, services: &[String]) -> Result<(), DriverError> {
        self.exec_for("start", &[], services).await
    }

    async fn stop(&self, services: &[String]) -> Result<(), DriverError> {
        self.exec_for("stop", &[], services).await
    }

    async fn restart(&self, services: &[String]) -> Result<(), DriverError> {
        self.exec_for("restart", &[], services).await
    }

    async fn kill(&self, services: &[String]) -> Result<(), DriverError> {
        self.exec_for("kill", &[], services).await
    }

    async fn rm(&self, services: &[String]) -> Result<(), DriverError> {
        self.exec_for("rm", &["-f", "-v"], services).await
    }

    async fn destroy(&self) -> Result<(), DriverError> {
        let opts = self.client.options();

        // Nothing running is fine, `down` still has to happen
        if let Err(e) = self.client.exec("kill", &[], opts).await {
            log::warn!(
                target: self.client.log_target(),
                "kill before teardown failed, continuing: {}",
                e
            );
        }

        self.client.exec("down", &["-v".to_string()], opts).await?;
        Ok(())
    }

    async fn update(&self, services: &[String]) -> Result<(), DriverError> {
        if services.is_empty() {
            return Ok(());
        }

        // Pull first so the recreate picks up the new images
        self.exec_for("pull", &[], services).await?;
        self.exec_for("up", &["-d", "--no-deps"], services).await
    }

    async fn ps(&self) -> Result<ServiceList, DriverError> {
        let quiet = self.client.options().quiet();
        let output = self
            .client
            .exec("ps", &["-q".to_string()], quiet)
            .await?;

        let ids = non_empty_lines(&output);
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut args = vec!["inspect".to_string()];
        args.extend(ids);
        let inspect = self.client.docker(&args, quiet).await?;

        parse_inspect(&inspect, self.client.project_name())
    }

    async fn port(
        &self,
        service: &str,
        private_port: u16,
        index: Option<u32>,
    ) -> Result<Option<u16>, DriverError> {
        let index = index.unwrap_or(1);
        let args = vec![
            format!("--index={}", index),
            service.to_string(),
            private_port.to_string(),
        ];

        match self.client.exec("port", &args, self.client.options()).await {
            Ok(output) => Ok(parse_port(&output)),
            Err(e) if is_unmapped_port(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_log_stream(&self, services: &[String]) -> Result<Option<LogStream>, DriverError> {
        if services.is_empty() {
            return Ok(None);
        }

        let mut args = vec!["-f".to_string(), LOG_TAIL_ARG.to_string()];
        args.extend(services.iter().cloned());

        let mut child = self
            .client
            .spawn("logs", &args, self.client.options())
            .await?;

        let (sink, stream) = LogStream::channel();
        if let Some(stdout) = child.stdout.take() {
            sink.attach("stdout", stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            sink.attach("stderr", stderr);
        }
        let watcher = sink.source("process");
        drop(sink);

        let command = format!("logs {}", args.join(" "));
        let log_target = self.client.log_target().to_string();
        tokio::spawn(watch_log_process(child, watcher, command, log_target));

        Ok(Some(stream))
    }

    async fn get_launched_service_names(&self) -> Result<Vec<String>, DriverError> {
        let args = vec![
            "ps".to_string(),
            "-a".to_string(),
            "--filter".to_string(),
            format!("label={}={}", PROJECT_LABEL, self.client.project_name()),
            "--format".to_string(),
            format!("{{{{.Label \"{}\"}}}}", SERVICE_LABEL),
        ];
        let output = self
            .client
            .docker(&args, self.client.options().quiet())
            .await?;

        let mut seen = HashSet::new();
        Ok(non_empty_lines(&output)
            .into_iter()
            .filter(|name| seen.insert(name.clone()))
            .collect())
    }

    async fn get_available_service_names(&self) -> Result<Vec<String>, DriverError> {
        Ok(self.get_config().await?.service_names())
    }

    async fn get_config(&self) -> Result<ConfigDocument, DriverError> {
        Ok(self.store.get_config().await?)
    }

    async fn write_config(&self, config: &ConfigDocument) -> Result<(), DriverError> {
        Ok(self.store.write_config(config).await?)
    }

    async fn remove_config(&self) -> Result<(), DriverError> {
        Ok(self.store.remove_config().await?)
    }
}

/// Keep the logs process alive while the stream is consumed; kill it once the
/// consumer goes away and report abnormal exits on the stream.
async fn watch_log_process(mut child: Child, watcher: LogSource, command: String, log_target: String) {
    tokio::select! {
        status = child.wait() => match status {
            Ok(status) if status.success() => {}
            Ok(status) => {
                watcher.fail(LogStreamError::Backend(ExecError::NonZeroExit {
                    command,
                    code: status.code(),
                    stderr: String::new(),
                }));
            }
            Err(e) => {
                watcher.fail(LogStreamError::Backend(ExecError::Io { command, source: e }));
            }
        },
        _ = watcher.closed() => {
            log::debug!(target: log_target.as_str(), "Log consumer gone, stopping '{}'", command);
            if let Err(e) = child.kill().await {
                log::warn!(target: log_target.as_str(), "Failed to stop '{}': {}", command, e);
            }
        }
    }
    watcher.finish();
}

fn non_empty_lines(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Published port from `port` output such as `0.0.0.0:32768`
fn parse_port(output: &str) -> Option<u16> {
    let line = output.lines().map(str::trim).rfind(|l| !l.is_empty())?;
    let port = match line.rfind(':') {
        Some(idx) => &line[idx + 1..],
        None => line,
    };
    port.trim().parse::<u16>().ok().filter(|p| *p > 0)
}

fn is_unmapped_port(err: &ExecError) -> bool {
    err.stderr()
        .map(|stderr| stderr.to_lowercase().contains("no port"))
        .unwrap_or(false)
}

#[derive(Debug, Deserialize)]
struct InspectEntry {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Config")]
    config: InspectConfig,
    #[serde(rename = "State")]
    state: InspectState,
}

#[derive(Debug, Deserialize)]
struct InspectConfig {
    #[serde(rename = "Image", default)]
    image: String,
    #[serde(rename = "Labels", default)]
    labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct InspectState {
    #[serde(rename = "Running", default)]
    running: bool,
}

/// Map `docker inspect` output to services of `project`
fn parse_inspect(output: &str, project: &str) -> Result<ServiceList, DriverError> {
    let entries: Vec<serde_json::Value> =
        serde_json::from_str(output).map_err(DriverError::Inspect)?;

    let mut services = Vec::with_capacity(entries.len());
    for raw in entries {
        let entry: InspectEntry =
            serde_json::from_value(raw.clone()).map_err(DriverError::Inspect)?;
        let labels = entry.config.labels.unwrap_or_default();

        if labels.get(PROJECT_LABEL).is_some_and(|p| p != project) {
            continue;
        }

        services.push(Service {
            id: entry.id,
            name: labels.get(SERVICE_LABEL).cloned().unwrap_or_default(),
            image: entry.config.image,
            status: if entry.state.running {
                ServiceStatus::Running
            } else {
                ServiceStatus::Exited
            },
            raw,
        });
    }

    Ok(services)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_port() {
        assert_eq!(parse_port("0.0.0.0:32768\n"), Some(32768));
        assert_eq!(parse_port("[::]:8080"), Some(8080));
        assert_eq!(parse_port("4000"), Some(4000));
        assert_eq!(parse_port(""), None);
        assert_eq!(parse_port(":\n"), None);
        assert_eq!(parse_port("0.0.0.0:0"), None);
        assert_eq!(parse_port("garbage"), None);
    }

    #[test]
    fn test_parse_port_uses_last_line() {
        assert_eq!(parse_port("0.0.0.0:1000\n[::]:1000\n\n"), Some(1000));
    }

    #[test]
    fn test_unmapped_port_detection() {
        let unmapped = ExecError::NonZeroExit {
            command: "docker-compose port web 81".to_string(),
            code: Some(1),
            stderr: "no port 81/tcp for container web".to_string(),
        };
        assert!(is_unmapped_port(&unmapped));

        let missing = ExecError::NonZeroExit {
            command: "docker-compose port nope 80".to_string(),
            code: Some(1),
            stderr: "No such service: nope".to_string(),
        };
        assert!(!is_unmapped_port(&missing));
    }

    #[test]
    fn test_non_empty_lines() {
        assert!(non_empty_lines("").is_empty());
        assert!(non_empty_lines("\n").is_empty());
        assert_eq!(non_empty_lines("a\n\n b \n"), vec!["a", "b"]);
    }

    #[test]
    fn test_parse_inspect_maps_services() {
        let output = r#"[
  {
    "Id": "abc123",
    "Config": {
      "Image": "nginx:latest",
      "Labels": {
        "com.docker.compose.project": "dev",
        "com.docker.compose.service": "web"
      }
    },
    "State": { "Running": true }
  },
  {
    "Id": "def456",
    "Config": {
      "Image": "postgres:16",
      "Labels": {
        "com.docker.compose.project": "dev",
        "com.docker.compose.service": "db"
      }
    },
    "State": { "Running": false }
  }
]"#;
        let services = parse_inspect(output, "dev").unwrap();
        assert_eq!(services.len(), 2);

        assert_eq!(services[0].id, "abc123");
        assert_eq!(services[0].name, "web");
        assert_eq!(services[0].image, "nginx:latest");
        assert_eq!(services[0].status, ServiceStatus::Running);
        assert_eq!(services[0].raw["Id"], "abc123");

        assert_eq!(services[1].name, "db");
        assert_eq!(services[1].status, ServiceStatus::Exited);
    }

    #[test]
    fn test_parse_inspect_skips_other_projects() {
        let output = r#"[
  {"Id": "a", "Config": {"Image": "x", "Labels": {"com.docker.compose.project": "other", "com.docker.compose.service": "web"}}, "State": {"Running": true}},
  {"Id": "b", "Config": {"Image": "y", "Labels": {"com.docker.compose.project": "dev", "com.docker.compose.service": "db"}}, "State": {"Running": true}}
]"#;
        let services = parse_inspect(output, "dev").unwrap();
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].name, "db");
    }

    #[test]
    fn test_parse_inspect_rejects_garbage() {
        assert!(matches!(
            parse_inspect("not json", "dev"),
            Err(DriverError::Inspect(_))
        ));
    }

    #[test]
    fn test_parse_inspect_tolerates_null_labels() {
        let output = r#"[{"Id": "a", "Config": {"Image": "x", "Labels": null}, "State": {"Running": false}}]"#;
        let services = parse_inspect(output, "dev").unwrap();
        assert_eq!(services[0].name, "");
        assert_eq!(services[0].status, ServiceStatus::Exited);
    }
}
