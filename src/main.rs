//! # Fixture Server - Entry Point
//! src/main.rs
//!
//! Levanta el fixture desde la línea de comandos: atiende N conexiones,
//! cierra e imprime en stdout el reporte JSON de lo recibido.
//! Útil para probar clientes a mano o desde scripts.

use clap::Parser;
use fixture_server::config::CliArgs;
use fixture_server::server::handler;
use fixture_server::{FixtureReport, FixtureServer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();

    if let Err(e) = run(&args) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: &CliArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = args.server_config();
    let response = args.response_bytes()?;
    let handler = handler::text_response(response, None);

    let mut server = FixtureServer::with_handler(config, handler)?;
    {
        let active = server.enter()?;
        let (host, port) = active.address();
        println!("listening on {}:{}", host, port);

        if !active.wait_for_quota(args.serve_timeout()) {
            info!(timeout = ?args.serve_timeout(), "serve timeout reached before quota");
        }
    }

    let report = FixtureReport::from_server(&server);
    println!("{}", report.to_json()?);

    Ok(())
}

