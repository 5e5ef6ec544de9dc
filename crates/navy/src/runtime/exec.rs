//! External command execution

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};

/// Default cap on buffered stdout/stderr for a single invocation (10 MiB)
pub const DEFAULT_MAX_BUFFER: usize = 10 * 1024 * 1024;

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Options for a single command invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecOptions {
    /// Suppress the info-level echo of the command line
    pub no_log: bool,
    /// Maximum number of bytes buffered per output stream
    pub max_buffer: usize,
    /// Operate on the user's original declaration instead of the compiled file
    pub use_original_source: bool,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            no_log: false,
            max_buffer: DEFAULT_MAX_BUFFER,
            use_original_source: false,
        }
    }
}

impl ExecOptions {
    /// Same options with the command echo suppressed
    pub fn quiet(mut self) -> Self {
        self.no_log = true;
        self
    }

    /// Same options with a different output cap
    pub fn with_max_buffer(mut self, max_buffer: usize) -> Self {
        self.max_buffer = max_buffer;
        self
    }

    /// Same options, reading the original declaration
    pub fn original_source(mut self) -> Self {
        self.use_original_source = true;
        self
    }
}

/// Errors raised by an external command invocation
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("Failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' exited with {}: {stderr}", exit_label(.code))]
    NonZeroExit {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Output of '{command}' exceeded the {limit} byte buffer")]
    MaxBufferExceeded { command: String, limit: usize },

    #[error("I/O error while running '{command}': {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

impl ExecError {
    /// The command line that failed
    pub fn command(&self) -> &str {
        match self {
            ExecError::Spawn { command, .. }
            | ExecError::NonZeroExit { command, .. }
            | ExecError::MaxBufferExceeded { command, .. }
            | ExecError::Io { command, .. } => command,
        }
    }

    /// Captured stderr, if the command ran to completion and failed
    pub fn stderr(&self) -> Option<&str> {
        match self {
            ExecError::NonZeroExit { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}

/// Runs external commands, either buffered or as live child processes.
///
/// The client carries no per-call state, so concurrent invocations through a
/// shared reference are fine. Anything that must not interleave (such as the
/// compiled config write) is serialized by the caller.
#[derive(Debug, Clone)]
pub struct ProcessClient {
    /// Log target used for the command echo
    log_target: String,
    /// Extra environment variables for every child
    env: HashMap<String, String>,
    /// Working directory for every child
    working_dir: Option<PathBuf>,
}

impl ProcessClient {
    pub fn new(log_target: impl Into<String>) -> Self {
        Self {
            log_target: log_target.into(),
            env: HashMap::new(),
            working_dir: None,
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }

    pub fn log_target(&self) -> &str {
        &self.log_target
    }

    fn command(&self, program: &str, args: &[String]) -> Command {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        cmd
    }

    fn echo(&self, command_line: &str, opts: &ExecOptions) {
        if opts.no_log {
            log::debug!(target: self.log_target.as_str(), "exec: {}", command_line);
        } else {
            log::info!(target: self.log_target.as_str(), "exec: {}", command_line);
        }
    }

    /// Run a command to completion and return its stdout.
    ///
    /// Fails with [`ExecError::NonZeroExit`] when the command exits unsuccessfully
    /// and with [`ExecError::MaxBufferExceeded`] as soon as either output stream
    /// grows past `opts.max_buffer`; the child is killed in that case.
    pub async fn exec(
        &self,
        program: &str,
        args: &[String],
        opts: &ExecOptions,
    ) -> Result<String, ExecError> {
        let command_line = command_line(program, args);
        self.echo(&command_line, opts);

        let mut child = self
            .command(program, args)
            .spawn()
            .map_err(|e| ExecError::Spawn {
                command: command_line.clone(),
                source: e,
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let limit = opts.max_buffer;

        let captured = tokio::try_join!(
            read_capped(stdout, limit, &command_line),
            read_capped(stderr, limit, &command_line),
        );

        let (stdout, stderr) = match captured {
            Ok(output) => output,
            Err(e) => {
                if let Err(kill_err) = child.kill().await {
                    log::warn!(
                        target: self.log_target.as_str(),
                        "Failed to kill '{}': {}",
                        command_line,
                        kill_err
                    );
                }
                return Err(e);
            }
        };

        let status = child.wait().await.map_err(|e| ExecError::Io {
            command: command_line.clone(),
            source: e,
        })?;

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr).trim().to_string();
            log::debug!(
                target: self.log_target.as_str(),
                "'{}' failed with {:?}: {}",
                command_line,
                status.code(),
                stderr
            );
            return Err(ExecError::NonZeroExit {
                command: command_line,
                code: status.code(),
                stderr,
            });
        }

        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }

    /// Spawn a command and hand back the live child.
    ///
    /// stdout and stderr are piped and left for the caller to consume. The
    /// child is killed when the handle is dropped.
    pub fn spawn(
        &self,
        program: &str,
        args: &[String],
        opts: &ExecOptions,
    ) -> Result<Child, ExecError> {
        let command_line = command_line(program, args);
        self.echo(&command_line, opts);

        self.command(program, args)
            .spawn()
            .map_err(|e| ExecError::Spawn {
                command: command_line,
                source: e,
            })
    }
}

/// Render a command line for logs and error messages
pub fn command_line(program: &str, args: &[String]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

async fn read_capped<R>(
    reader: Option<R>,
    limit: usize,
    command_line: &str,
) -> Result<Vec<u8>, ExecError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let Some(mut reader) = reader else {
        return Ok(buf);
    };

    let mut chunk = [0u8; READ_CHUNK_SIZE];
    loop {
        let n = reader.read(&mut chunk).await.map_err(|e| ExecError::Io {
            command: command_line.to_string(),
            source: e,
        })?;
        if n == 0 {
            return Ok(buf);
        }
        if buf.len() + n > limit {
            return Err(ExecError::MaxBufferExceeded {
                command: command_line.to_string(),
                limit,
            });
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}
