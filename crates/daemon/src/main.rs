use std::net::SocketAddr;
use std::sync::Arc;

use car_daemon::{config, server, session, AppState};
use car_link::{CommandSet, VehicleLink};
use clap::{Arg, Command};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "car_daemon=debug,car_link=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let matches = Command::new("car_daemon")
        .about("WebSocket to TCP bridge for a remote-controlled vehicle")
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("PATH")
                .default_value("./config.json")
                .help("Path to the JSON configuration file"),
        )
        .arg(
            Arg::new("vehicle-host")
                .long("vehicle-host")
                .value_name("HOST")
                .help("Override the vehicle IP address"),
        )
        .arg(
            Arg::new("vehicle-port")
                .long("vehicle-port")
                .value_name("PORT")
                .value_parser(clap::value_parser!(u16))
                .help("Override the vehicle TCP port"),
        )
        .get_matches();

    let config_path = matches
        .get_one::<String>("config")
        .expect("config has a default value");
    let mut config = config::load_config(config_path);
    if let Some(host) = matches.get_one::<String>("vehicle-host") {
        config.vehicle_host = host.clone();
    }
    if let Some(port) = matches.get_one::<u16>("vehicle-port") {
        config.vehicle_port = *port;
    }

    tracing::info!(
        "target vehicle: {}:{}",
        config.vehicle_host,
        config.vehicle_port
    );

    let commands = Arc::new(CommandSet::new(config.default_speed, config.turning_speed));
    let (link, link_task) = VehicleLink::spawn(config.link_config(), (*commands).clone());

    let registry = Arc::new(car_daemon::registry::ClientRegistry::new());
    let forwarder = session::spawn_status_forwarder(&link, registry.clone());

    let state = AppState {
        link: link.clone(),
        registry,
        commands,
    };

    // Port bind failure is the one fatal startup error.
    let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], config.listen_port))).await?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let server_task = tokio::spawn(server::run(listener, state, shutdown_rx));

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received, stopping services");

    // Final safety stop (bounded) before the socket is released.
    let _ = link.shutdown().await;
    let _ = shutdown_tx.send(());
    let _ = server_task.await;
    let _ = link_task.await;
    forwarder.abort();

    tracing::info!("car daemon stopped");
    Ok(())
}
