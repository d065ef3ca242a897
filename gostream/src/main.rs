mod command;
mod console;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use gostream_core::{
    bootstrap::load_config, logging, Controller, FrpcClient, LocalEngine, Service, Shell,
    TunnelOutcome,
};

use command::{Command, HELP};
use console::ConsoleShell;

#[derive(Parser, Debug)]
#[command(name = "gostream")]
#[command(about = "GoStream live streaming control shell", long_about = None)]
struct Args {
    /// Configuration file (YAML or TOML)
    #[arg(long, short)]
    config: Option<String>,

    /// Start the backend right away
    #[arg(long, env = "GOSTREAM_AUTOSTART")]
    autostart: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(args.config.as_deref())?;
    logging::init_logging(&config.logging)?;
    info!("GoStream starting...");
    info!("Web address: {}", config.edge.address);
    info!("Ingest address: {}", config.media.ingest_address);

    let shell = Arc::new(ConsoleShell::spawn());
    let engine = Arc::new(LocalEngine::new(config.media.app_name.clone()));
    let tunnel = Arc::new(FrpcClient::new(
        config.tunnel.program.clone(),
        Arc::clone(&shell) as Arc<dyn Shell>,
    ));
    let controller = Controller::new(config, engine, tunnel, Arc::clone(&shell) as Arc<dyn Shell>)?;
    controller.startup();

    if args.autostart {
        if let Err(e) = controller.start_backend().await {
            error!("Failed to start backend: {}", e);
        }
    }

    println!("{HELP}");
    loop {
        let line = tokio::select! {
            line = shell.next_line() => line,
            () = shutdown_signal() => break,
        };
        // Closed stdin quits without asking.
        let Some(line) = line else { break };

        match Command::parse(&line) {
            Command::Start => {
                if let Err(e) = controller.start_backend().await {
                    println!("Failed to start: {e}");
                }
            }
            Command::Stop => controller.stop_backend().await,
            Command::Tunnel => match controller.toggle_tunnel().await {
                Ok(TunnelOutcome::Declined) => println!("Tunnel not started."),
                Ok(_) => {}
                Err(e) => println!("Tunnel: {e}"),
            },
            Command::Title(title) if title.is_empty() => println!("Usage: title <text>"),
            Command::Title(title) => controller.set_title(title),
            Command::Status => print_status(&controller),
            Command::Help => println!("{HELP}"),
            Command::Quit => {
                if controller.before_close().await {
                    continue;
                }
                break;
            }
            Command::Empty => {}
            Command::Unknown(word) => println!("Unknown command '{word}', try 'help'."),
        }
    }

    info!("Shutting down...");
    controller.shutdown().await;
    info!("GoStream stopped");
    Ok(())
}

fn print_status(controller: &Controller) {
    println!("title:   {}", controller.title());
    println!(
        "backend: {}",
        if controller.backend_running() { "running" } else { "stopped" }
    );
    for service in [Service::Media, Service::Edge, Service::Tunnel] {
        println!("  {:<7}{:?}", service.name(), controller.service_state(service));
    }
    if let Some(addr) = controller.edge_addr() {
        println!("  web     http://{addr}/");
    }
    for (kind, addr) in controller.listener_addrs() {
        println!("  {:<7}{addr}", kind.name());
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT/Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C signal"),
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
                info!("Received SIGTERM signal");
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
