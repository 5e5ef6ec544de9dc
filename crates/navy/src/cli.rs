//! Command-line interface for navy

use argh::FromArgs;

use crate::driver::LaunchOptions;

/// Manage named multi-service development environments
#[derive(FromArgs, Debug, PartialEq)]
pub struct NavyArgs {
    /// path to the environment settings file (default: navy.yml)
    #[argh(option, short = 'c', default = "String::from(\"navy.yml\")")]
    pub config: String,

    /// log level (error, warn, info, debug, trace)
    #[argh(option, short = 'l', default = "String::from(\"info\")")]
    pub log_level: String,

    #[argh(subcommand)]
    pub command: Command,
}

#[derive(FromArgs, Debug, PartialEq)]
#[argh(subcommand)]
pub enum Command {
    Launch(LaunchCommand),
    Ps(PsCommand),
    Start(StartCommand),
    Stop(StopCommand),
    Restart(RestartCommand),
    Kill(KillCommand),
    Rm(RmCommand),
    Update(UpdateCommand),
    Destroy(DestroyCommand),
    Reload(ReloadCommand),
    Port(PortCommand),
    Url(UrlCommand),
    Logs(LogsCommand),
    ExternalIp(ExternalIpCommand),
    Services(ServicesCommand),
}

/// Launch the given services
#[derive(FromArgs, Debug, PartialEq)]
#[argh(subcommand, name = "launch")]
pub struct LaunchCommand {
    /// services to launch
    #[argh(positional)]
    pub services: Vec<String>,

    /// do not start linked services
    #[argh(switch)]
    pub no_deps: bool,

    /// recreate containers even if their configuration is unchanged
    #[argh(switch)]
    pub force_recreate: bool,
}

impl LaunchCommand {
    pub fn options(&self) -> LaunchOptions {
        LaunchOptions {
            no_deps: self.no_deps,
            force_recreate: self.force_recreate,
        }
    }
}

/// List the services of the environment
#[derive(FromArgs, Debug, PartialEq)]
#[argh(subcommand, name = "ps")]
pub struct PsCommand {}

/// Start the given services
#[derive(FromArgs, Debug, PartialEq)]
#[argh(subcommand, name = "start")]
pub struct StartCommand {
    /// services to start
    #[argh(positional)]
    pub services: Vec<String>,
}

/// Stop the given services
#[derive(FromArgs, Debug, PartialEq)]
#[argh(subcommand, name = "stop")]
pub struct StopCommand {
    /// services to stop
    #[argh(positional)]
    pub services: Vec<String>,
}

/// Restart the given services
#[derive(FromArgs, Debug, PartialEq)]
#[argh(subcommand, name = "restart")]
pub struct RestartCommand {
    /// services to restart
    #[argh(positional)]
    pub services: Vec<String>,
}

/// Kill the given services
#[derive(FromArgs, Debug, PartialEq)]
#[argh(subcommand, name = "kill")]
pub struct KillCommand {
    /// services to kill
    #[argh(positional)]
    pub services: Vec<String>,
}

/// Remove the given services and their volumes
#[derive(FromArgs, Debug, PartialEq)]
#[argh(subcommand, name = "rm")]
pub struct RmCommand {
    /// services to remove
    #[argh(positional)]
    pub services: Vec<String>,
}

/// Pull fresh images and recreate the given services
#[derive(FromArgs, Debug, PartialEq)]
#[argh(subcommand, name = "update")]
pub struct UpdateCommand {
    /// services to update
    #[argh(positional)]
    pub services: Vec<String>,
}

/// Remove every service, volume and the compiled configuration
#[derive(FromArgs, Debug, PartialEq)]
#[argh(subcommand, name = "destroy")]
pub struct DestroyCommand {}

/// Recompile the configuration without touching services
#[derive(FromArgs, Debug, PartialEq)]
#[argh(subcommand, name = "reload")]
pub struct ReloadCommand {}

/// Print the published port for an internal port of a service
#[derive(FromArgs, Debug, PartialEq)]
#[argh(subcommand, name = "port")]
pub struct PortCommand {
    /// service name
    #[argh(positional)]
    pub service: String,

    /// internal port
    #[argh(positional)]
    pub port: u16,

    /// replica index (default: 1)
    #[argh(option)]
    pub index: Option<u32>,
}

/// Print the URL of a published port
#[derive(FromArgs, Debug, PartialEq)]
#[argh(subcommand, name = "url")]
pub struct UrlCommand {
    /// service name
    #[argh(positional)]
    pub service: String,

    /// internal port
    #[argh(positional)]
    pub port: u16,
}

/// Follow the logs of the given services
#[derive(FromArgs, Debug, PartialEq)]
#[argh(subcommand, name = "logs")]
pub struct LogsCommand {
    /// services to follow
    #[argh(positional)]
    pub services: Vec<String>,
}

/// Print the address published ports are reachable on
#[derive(FromArgs, Debug, PartialEq)]
#[argh(subcommand, name = "external-ip")]
pub struct ExternalIpCommand {}

/// List service names
#[derive(FromArgs, Debug, PartialEq)]
#[argh(subcommand, name = "services")]
pub struct ServicesCommand {
    /// only services that currently have containers
    #[argh(switch)]
    pub launched: bool,
}
