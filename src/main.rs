//! GuessNet - Word Guessing Duels over TCP
//!
//! A two-player game server: one client picks a secret word and challenges
//! another, who guesses until correct or someone gives up. A WebSocket
//! observer feed mirrors every frame for dashboards.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use guessnet::client;
use guessnet::config::{self, Config};
use guessnet::network::{NetworkConfig as NetConfig, Server};
use guessnet::observer::ObserverServer;
use guessnet::protocol;

/// GuessNet - word guessing duels over TCP
#[derive(Parser)]
#[command(name = "guessnet")]
#[command(author = "GuessNet Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Two-player word guessing duels over raw TCP", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the game server
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Port for the observer WebSocket feed
        #[arg(short, long)]
        observer_port: Option<u16>,

        /// Shared password clients must present
        #[arg(long)]
        password: Option<String>,

        /// Unix socket path for a second listener
        #[cfg(unix)]
        #[arg(long)]
        socket: Option<PathBuf>,
    },

    /// Play interactively from the terminal
    Play {
        /// Server address to connect to
        #[arg(short, long, default_value = "127.0.0.1")]
        server: String,

        /// Server port
        #[arg(short, long, default_value_t = protocol::DEFAULT_PORT)]
        port: u16,

        /// Challenge an opponent instead of waiting to be challenged
        #[arg(long)]
        challenge: bool,
    },

    /// Show current configuration
    Config {
        /// Generate sample configuration
        #[arg(long)]
        generate: bool,

        /// Output path for generated config
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show protocol information
    Info,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    // Load configuration
    let config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default().unwrap_or_default()
    };

    match cli.command {
        Commands::Serve {
            port,
            observer_port,
            password,
            #[cfg(unix)]
            socket,
        } => {
            let mut config = config;
            if let Some(port) = port {
                config.network.port = port;
            }
            if let Some(observer_port) = observer_port {
                config.network.observer_port = observer_port;
            }
            if let Some(password) = password {
                config.security.password = password;
            }
            #[cfg(unix)]
            if let Some(socket) = socket {
                config.network.socket_path = Some(socket);
            }
            run_serve(config).await?;
        }
        Commands::Play {
            server,
            port,
            challenge,
        } => {
            client::run(&server, port, challenge).await?;
        }
        Commands::Config { generate, output } => {
            if generate {
                let sample = config::generate_sample_config();
                if let Some(path) = output {
                    std::fs::write(&path, &sample)?;
                    println!("Configuration written to: {}", path.display());
                } else {
                    println!("{}", sample);
                }
            } else {
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
        Commands::Info => {
            print_info();
        }
    }

    Ok(())
}

/// Run the game server plus the observer feed
async fn run_serve(config: Config) -> anyhow::Result<()> {
    let net_config = NetConfig {
        port: config.network.port,
        bind_address: config.network.bind_address.clone(),
        socket_path: config.network.socket_path.clone(),
    };

    // Engine notifications fan out to every connected observer; with no
    // observers they vanish, which is the intended best-effort contract.
    let (notify_tx, _) = broadcast::channel(256);

    let observer_addr = format!(
        "{}:{}",
        config.network.bind_address.as_deref().unwrap_or("0.0.0.0"),
        config.network.observer_port
    )
    .parse()?;
    let observer = ObserverServer::bind(observer_addr, notify_tx.clone()).await?;
    let server = Server::bind(&net_config, config.security.password.clone(), notify_tx).await?;

    println!("\n========================================");
    println!("  GuessNet Server Running");
    println!("========================================");
    println!("  Game port:     {}", config.network.port);
    println!("  Observer port: {}", config.network.observer_port);
    println!("========================================");
    println!("\nWaiting for players to connect...");
    println!("Press Ctrl+C to stop.\n");

    tokio::select! {
        result = server.run() => {
            result?;
        }
        result = observer.run() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            println!("\nShutting down...");
        }
    }

    tracing::info!("Server stopped");
    Ok(())
}

/// Print protocol information
fn print_info() {
    println!("GuessNet Protocol Information");
    println!("=============================\n");

    println!("Frame format: type(1) | length(2, big-endian) | payload(UTF-8)");
    println!("Minimum frame size: {} bytes", protocol::HEADER_SIZE);
    println!("Default game port: {}", protocol::DEFAULT_PORT);
    println!("Default observer port: {}", protocol::DEFAULT_OBSERVER_PORT);

    println!("\nA game needs two players: one runs `guessnet play --challenge`");
    println!("and picks the secret word; the other runs `guessnet play` and");
    println!("guesses until correct or either side gives up.");
}
