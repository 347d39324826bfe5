use clap::Parser;
use std::time::Duration;

/// Command line configuration for the fishing server
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(author, version, about, long_about = None)]
pub struct ServerConfig {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    pub host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    pub port: u16,

    /// World ticks per second
    #[arg(short, long, default_value = "30")]
    pub tick_rate: u32,

    /// Maximum number of concurrent connections
    #[arg(short, long, default_value = "16")]
    pub max_clients: usize,

    /// Fish spawned when the server starts
    #[arg(short = 'f', long, default_value = "25")]
    pub initial_fish: usize,

    /// Seed for fish spawning and bite rolls; random when omitted
    #[arg(long)]
    pub seed: Option<u64>,

    /// Seconds of silence before a client is dropped
    #[arg(long, default_value = "5")]
    pub client_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            tick_rate: 30,
            max_clients: 16,
            initial_fish: 25,
            seed: None,
            client_timeout_secs: 5,
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }
}
