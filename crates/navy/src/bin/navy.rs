//! Navy CLI
//!
//! Usage:
//!   navy -c navy.yml launch web db
//!   navy -c navy.yml port web 80
//!   navy -c navy.yml logs web

use navy::cli::Command;
use navy::{Environment, EnvironmentError, EnvironmentSettings, NavyArgs, ServiceList};
use tokio::sync::watch;

#[tokio::main]
async fn main() {
    let args: NavyArgs = argh::from_env();

    // Initialize logging
    let log_level = match args.log_level.to_lowercase().as_str() {
        "error" => "error",
        "warn" => "warn",
        "info" => "info",
        "debug" => "debug",
        "trace" => "trace",
        _ => "info",
    };
    let env = env_logger::Env::default().default_filter_or(log_level);
    env_logger::init_from_env(env);

    let settings = match EnvironmentSettings::from_file(&args.config) {
        Ok(settings) => settings,
        Err(e) => {
            log::error!("Failed to load settings: {}", e);
            std::process::exit(1);
        }
    };

    let environment = Environment::builder(settings).build();

    if let Err(e) = run(&environment, args.command).await {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(env: &Environment, command: Command) -> Result<(), EnvironmentError> {
    match command {
        Command::Launch(cmd) => env.launch(&cmd.services, cmd.options()).await?,
        Command::Ps(_) => print_services(&env.ps().await?),
        Command::Start(cmd) => env.start(&cmd.services).await?,
        Command::Stop(cmd) => env.stop(&cmd.services).await?,
        Command::Restart(cmd) => env.restart(&cmd.services).await?,
        Command::Kill(cmd) => env.kill(&cmd.services).await?,
        Command::Rm(cmd) => env.rm(&cmd.services).await?,
        Command::Update(cmd) => env.update(&cmd.services).await?,
        Command::Destroy(_) => env.destroy().await?,
        Command::Reload(_) => env.reconfigure().await?,
        Command::Port(cmd) => {
            if let Some(port) = env.port(&cmd.service, cmd.port, cmd.index).await? {
                println!("{}", port);
            }
        }
        Command::Url(cmd) => {
            if let Some(url) = env.url(&cmd.service, cmd.port).await? {
                println!("{}", url);
            }
        }
        Command::ExternalIp(_) => println!("{}", env.external_ip().await?),
        Command::Services(cmd) => {
            let names = if cmd.launched {
                env.get_launched_service_names().await?
            } else {
                env.get_available_service_names().await?
            };
            for name in names {
                println!("{}", name);
            }
        }
        Command::Logs(cmd) => follow_logs(env, &cmd.services).await?,
    }

    Ok(())
}

/// Pipe the log stream to stdout until it ends or Ctrl+C
async fn follow_logs(env: &Environment, services: &[String]) -> Result<(), EnvironmentError> {
    let Some(stream) = env.get_log_stream(services).await? else {
        log::warn!("No services given, nothing to follow");
        return Ok(());
    };

    let (shutdown_tx, mut shutdown_rx) = watch::channel(());
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(());
    }) {
        log::warn!("Failed to set Ctrl+C handler: {}", e);
    }

    let mut stdout = tokio::io::stdout();
    tokio::select! {
        result = stream.pipe_to(&mut stdout) => match result {
            Ok(errors) if !errors.is_empty() => {
                log::warn!("Log stream ended with {} error(s)", errors.len());
            }
            Ok(_) => {}
            Err(e) => log::error!("Failed to write logs: {}", e),
        },
        _ = shutdown_rx.changed() => {
            log::info!("Received Ctrl+C, stopping log stream");
        }
    }

    Ok(())
}

fn print_services(services: &ServiceList) {
    if services.is_empty() {
        println!("No services");
        return;
    }

    println!("{:<14} {:<20} {:<30} {}", "ID", "NAME", "IMAGE", "STATUS");
    for service in services {
        let id: String = service.id.chars().take(12).collect();
        println!(
            "{:<14} {:<20} {:<30} {}",
            id, service.name, service.image, service.status
        );
    }
}
