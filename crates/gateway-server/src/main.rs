//! MCP Gateway binary

use gateway_server::{Config, GatewayServer, ServiceRegistry, telemetry};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    // Configuration faults are fatal; tracing is not initialized yet
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let registry = match ServiceRegistry::load(&config.services, |key| std::env::var(key).ok()) {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let _telemetry_guard = match telemetry::init(&config.logging, &config.telemetry) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return ExitCode::FAILURE;
        }
    };

    tracing::info!("MCP Gateway starting");
    match config.source {
        Some(ref path) => tracing::info!("Loaded configuration from: {}", path.display()),
        None => tracing::info!("No configuration file found, using defaults"),
    }

    let result = match GatewayServer::new(config, registry) {
        Ok(server) => server.run().await,
        Err(e) => Err(e),
    };

    // Telemetry guard will flush spans on drop
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "MCP Gateway failed");
            ExitCode::FAILURE
        }
    }
}
