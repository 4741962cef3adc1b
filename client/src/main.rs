use clap::Parser;
use client::network::{Client, ClientConfig};
use log::{error, info};
use shared::{Vector2, DEFAULT_PORT};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value_t = format!("127.0.0.1:{}", DEFAULT_PORT))]
    server: String,

    /// Name announced in the handshake
    #[arg(short = 'n', long, default_value = "player")]
    name: String,

    /// Viewport width in world units
    #[arg(short = 'w', long, default_value = "32")]
    width: f32,

    /// Viewport height in world units (no short flag to avoid conflict with --help)
    #[arg(long, default_value = "18")]
    height: f32,

    /// Input frames per second
    #[arg(long, default_value = "20")]
    input_rate: u32,

    /// Walk the hero around instead of standing still
    #[arg(long)]
    wander: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to: {}", args.server);

    let config = ClientConfig {
        server_addr: args.server,
        player_name: args.name,
        viewport: Vector2::new(args.width, args.height),
        input_interval: Duration::from_secs_f64(1.0 / args.input_rate.max(1) as f64),
        wander: args.wander,
    };
    let mut client = Client::new(config).await?;

    tokio::select! {
        result = client.run() => {
            if let Err(e) = result {
                error!("Client stopped: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, disconnecting");
        }
    }

    client.disconnect().await?;
    Ok(())
}
