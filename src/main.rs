#![warn(
    clippy::all,
    clippy::correctness,
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    clippy::perf,
    clippy::style
)]
#![allow(
    clippy::cargo_common_metadata,
    clippy::multiple_crate_versions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

use std::sync::Arc;

use clap::Parser;
use tokio::sync::Mutex;

use meshgate::config;
use meshgate::radio::mock::MockRadio;
use meshgate::server;
use meshgate::server::appstate::AppState;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Path to the gateway's YAML config file.
    #[arg(short, long, default_value = "config.yaml")]
    config: String,
}

#[tokio::main]
async fn main() {
    pretty_env_logger::init();

    let cli = Cli::parse();
    let config = config::parse(&cli.config).unwrap_or_else(|err| {
        log::warn!("using defaults, couldn't read {}: {err}", cli.config);
        config::AppConfig::default()
    });

    log::info!("starting {}", config.bridge.name);

    #[cfg(feature = "server-banner")]
    server::banner::print(&config);

    let listen_addr = config.bridge.ipaddress;
    let listen_port = config.bridge.http_port;

    let appstate = AppState::new(config);

    // The radio driver is an external boundary (spec §1); this binary
    // ships a deterministic in-memory stand-in until a real ZCL/APS
    // transport is plugged in.
    let radio = Arc::new(Mutex::new(MockRadio::new()));

    server::spawn_background_tasks(appstate.clone(), radio);

    if let Err(err) = server::http_server(listen_addr, listen_port, appstate).await {
        log::error!("http server exited: {err}");
        std::process::exit(1);
    }
}
