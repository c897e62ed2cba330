use std::env;
use std::path::Path;
use std::process::ExitCode;

use tracing::{error, warn};

use webserv::config;
use webserv::server::Server;

const DEFAULT_CONFIG: &str = "./webserv.conf";

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_ansi(false)
        .with_max_level(tracing::Level::INFO)
        .init();

    let config_path = env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let configs = match config::load(Path::new(&config_path)) {
        Ok(configs) => configs,
        Err(err) => {
            error!("configuration error in {}: {}", config_path, err);
            return ExitCode::from(1);
        }
    };

    let mut server = match Server::new(configs) {
        Ok(server) => server,
        Err(err) => {
            error!("startup failed: {:#}", err);
            return ExitCode::from(2);
        }
    };
    if let Err(err) = server.bind() {
        error!("startup failed: {:#}", err);
        return ExitCode::from(1);
    }
    if let Err(err) = server.install_log_capture() {
        warn!("log capture unavailable, logging to the terminal: {}", err);
    }

    match server.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("fatal runtime error: {}", err);
            ExitCode::from(2)
        }
    }
}
