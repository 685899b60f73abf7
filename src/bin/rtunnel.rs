//! rtunnel - reverse TCP tunnel
//!
//! Relay side:
//!   rtunnel server <bridge_port> <public_port> <password>
//!
//! Behind NAT, next to the service:
//!   rtunnel client <server_host> <server_port> <target_host> <target_port> <password>

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reverse_tunnel::config::{generate_example_config, ClientConfig, Config, ServerConfig};
use reverse_tunnel::{RelayServer, TunnelClient};
use tracing::{error, info};

/// Reverse tunnel - expose a TCP service behind NAT through a public relay
#[derive(Parser, Debug)]
#[command(name = "rtunnel")]
#[command(about = "Reverse tunnel - expose a TCP service behind NAT through a public relay")]
#[command(version)]
struct Args {
    /// Configuration file path (optional, positional arguments override it)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'v', long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Run the public relay
    Server {
        /// Port the tunnel client connects to
        bridge_port: u16,
        /// Port public users connect to
        public_port: u16,
        /// Shared password
        password: String,
        /// Host to bind both listeners to
        #[arg(long)]
        bind: Option<String>,
    },
    /// Run the tunnel client next to the target service
    Client {
        /// Relay host
        server_host: String,
        /// Relay bridge port
        server_port: u16,
        /// Host of the service to expose
        target_host: String,
        /// Port of the service to expose
        target_port: u16,
        /// Shared password
        password: String,
    },
    /// Print an example configuration file, or write it to PATH
    ExampleConfig {
        path: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load(path).context("Failed to load configuration")?,
        None => Config::default(),
    };

    // Initialize logging
    let level = args.log_level.clone().unwrap_or(config.logging.level.clone());
    tracing_subscriber::fmt().with_env_filter(&level).init();

    match args.command {
        Mode::Server {
            bridge_port,
            public_port,
            password,
            bind,
        } => {
            let mut server_config = config.server.unwrap_or_default();
            server_config.bridge_port = bridge_port;
            server_config.public_port = public_port;
            server_config.password = password;
            if let Some(bind) = bind {
                server_config.bind = bind;
            }
            run_server(server_config).await
        }
        Mode::Client {
            server_host,
            server_port,
            target_host,
            target_port,
            password,
        } => {
            let client_config = ClientConfig {
                server_host,
                server_port,
                target_host,
                target_port,
                password,
                ..config.client.unwrap_or_default()
            };
            run_client(client_config).await
        }
        Mode::ExampleConfig { path } => {
            let example = generate_example_config();
            match path {
                Some(path) => {
                    example.save(&path).context("Failed to write example config")?;
                    println!("Example configuration written to {}", path);
                }
                None => print!("{}", example.to_toml()?),
            }
            Ok(())
        }
    }
}

async fn run_server(config: ServerConfig) -> Result<()> {
    let server = RelayServer::new(config).context("Invalid server configuration")?;

    info!("Reverse tunnel relay v{}", reverse_tunnel::VERSION);

    tokio::select! {
        result = server.run() => {
            if let Err(e) = &result {
                error!("Relay stopped: {}", e);
            }
            result.context("Relay failed")
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
            Ok(())
        }
    }
}

async fn run_client(config: ClientConfig) -> Result<()> {
    let client = TunnelClient::new(config).context("Invalid client configuration")?;

    info!("Reverse tunnel client v{}", reverse_tunnel::VERSION);

    tokio::select! {
        _ = client.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
        }
    }

    Ok(())
}
