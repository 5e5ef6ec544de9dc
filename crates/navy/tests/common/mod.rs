//! Test helpers: shell-script stand-ins for docker-compose and docker
//!
//! The scripts append every invocation to a call log and keep container state
//! as one file per service, so lifecycle operations can be observed through
//! `ps` like against a real engine.

#![allow(dead_code)]

use navy::EnvironmentSettings;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const PROJECT: &str = "navytest";

pub const COMPOSE_FILE: &str = r#"services:
  web:
    image: nginx
    ports:
      - "80"
  db:
    image: postgres
"#;

const COMPOSE_SCRIPT: &str = r#"#!/bin/sh
echo "compose $*" >> "@LOG@"
STATE="@STATE@"
while [ $# -gt 0 ]; do
  case "$1" in
    -p|-f) shift 2 ;;
    *) break ;;
  esac
done
cmd="$1"
shift
case "$cmd" in
  config)
    cat "@COMPOSE@"
    ;;
  up)
    for s in "$@"; do
      case "$s" in
        -*) ;;
        *) echo running > "$STATE/$s" ;;
      esac
    done
    ;;
  start|restart)
    for s in "$@"; do
      [ -e "$STATE/$s" ] && echo running > "$STATE/$s"
    done
    ;;
  stop|kill)
    if [ $# -eq 0 ]; then
      for f in "$STATE"/*; do
        [ -e "$f" ] && echo exited > "$f"
      done
    else
      for s in "$@"; do
        [ -e "$STATE/$s" ] && echo exited > "$STATE/$s"
      done
    fi
    ;;
  rm)
    for s in "$@"; do
      case "$s" in
        -*) ;;
        *) rm -f "$STATE/$s" ;;
      esac
    done
    ;;
  down)
    rm -f "$STATE"/*
    ;;
  ps)
    for f in "$STATE"/*; do
      [ -e "$f" ] && echo "id-$(basename "$f")"
    done
    ;;
  port)
    idx="${1#--index=}"
    case "$3" in
      80) echo "0.0.0.0:3276$idx" ;;
      81) echo ":" ;;
      *) echo "no port $3/tcp for container $2" >&2; exit 1 ;;
    esac
    ;;
  logs)
    for s in "$@"; do
      case "$s" in
        -*) ;;
        *) echo "$s | ready"; echo "$s | warning" >&2 ;;
      esac
    done
    [ -e "@LOGS_FAIL@" ] && exit 2
    ;;
  pull)
    ;;
  *)
    echo "unknown command $cmd" >&2
    exit 1
    ;;
esac
exit 0
"#;

const DOCKER_SCRIPT: &str = r#"#!/bin/sh
echo "docker $*" >> "@LOG@"
STATE="@STATE@"
case "$1" in
  inspect)
    shift
    printf '['
    first=1
    for id in "$@"; do
      svc="${id#id-}"
      running=false
      [ "$(cat "$STATE/$svc")" = running ] && running=true
      [ $first -eq 1 ] || printf ','
      first=0
      printf '{"Id":"%s","Config":{"Image":"img/%s","Labels":{"com.docker.compose.project":"@PROJECT@","com.docker.compose.service":"%s"}},"State":{"Running":%s}}' "$id" "$svc" "$svc" "$running"
    done
    printf ']\n'
    ;;
  ps)
    for f in "$STATE"/*; do
      [ -e "$f" ] && basename "$f"
    done
    ;;
esac
exit 0
"#;

/// A temp directory with fake backend executables and matching settings
pub struct FakeBackend {
    pub dir: TempDir,
    pub settings: EnvironmentSettings,
}

impl FakeBackend {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        let state = root.join("containers");
        std::fs::create_dir_all(&state).unwrap();

        let compose_file = root.join("docker-compose.yml");
        std::fs::write(&compose_file, COMPOSE_FILE).unwrap();

        let log = root.join("calls.log");
        let fill = |template: &str| {
            template
                .replace("@LOG@", &log.to_string_lossy())
                .replace("@STATE@", &state.to_string_lossy())
                .replace("@COMPOSE@", &compose_file.to_string_lossy())
                .replace("@PROJECT@", PROJECT)
                .replace("@LOGS_FAIL@", &root.join("logs-fail").to_string_lossy())
        };

        let compose_bin = root.join("fake-compose");
        let docker_bin = root.join("fake-docker");
        write_script(&compose_bin, &fill(COMPOSE_SCRIPT));
        write_script(&docker_bin, &fill(DOCKER_SCRIPT));

        let mut settings = EnvironmentSettings::new(PROJECT, vec![compose_file]);
        settings.state_dir = Some(root.join("state"));
        settings.working_dir = Some(root.to_path_buf());
        settings.compose_command = compose_bin.to_string_lossy().into_owned();
        settings.docker_command = docker_bin.to_string_lossy().into_owned();

        Self { dir, settings }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn compose_file(&self) -> PathBuf {
        self.root().join("docker-compose.yml")
    }

    /// Every recorded invocation, one per line
    pub fn calls(&self) -> Vec<String> {
        std::fs::read_to_string(self.root().join("calls.log"))
            .map(|log| log.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Recorded invocations with the `-p`/`-f` prefix stripped
    pub fn subcommands(&self) -> Vec<String> {
        self.calls().iter().map(|call| strip_prefix_args(call)).collect()
    }

    /// Make every later `logs` invocation exit with code 2 after printing
    pub fn fail_logs(&self) {
        std::fs::write(self.root().join("logs-fail"), "").unwrap();
    }

    /// Replace the user's compose file
    pub fn write_compose_file(&self, contents: &str) {
        std::fs::write(self.compose_file(), contents).unwrap();
    }

    pub fn clear_calls(&self) {
        let _ = std::fs::remove_file(self.root().join("calls.log"));
    }
}

fn strip_prefix_args(call: &str) -> String {
    let mut parts = call.split_whitespace();
    let mut out = Vec::new();
    if let Some(tool) = parts.next() {
        out.push(tool.to_string());
    }
    while let Some(part) = parts.next() {
        if out.len() == 1 && (part == "-p" || part == "-f") {
            parts.next();
            continue;
        }
        out.push(part.to_string());
    }
    out.join(" ")
}

fn write_script(path: &Path, contents: &str) {
    std::fs::write(path, contents).unwrap();
    let mut perms = std::fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms).unwrap();
}

pub fn services(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}
