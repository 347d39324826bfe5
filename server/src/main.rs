use clap::Parser;
use fishing_server::config::ServerConfig;
use fishing_server::network::Server;
use log::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let config = ServerConfig::parse();

    info!("Starting fishing server...");
    info!(
        "Tick rate: {}Hz, max clients: {}, initial fish: {}",
        config.tick_rate, config.max_clients, config.initial_fish
    );
    if let Some(seed) = config.seed {
        info!("Using fixed seed {}", seed);
    }

    let mut server = Server::new(&config).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped with error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
