use clap::Parser;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use server::entity::{Ability, UnitStats};
use server::game::{SimulationConfig, SpawnDescriptor};
use server::network::{Server, ServerConfig, ServerMessage};
use server::terrain::GridTerrain;
use shared::{Vector2, DEFAULT_PORT};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Tick rate (updates per second)
    #[arg(short, long, default_value = "20")]
    tick_rate: u32,

    /// Maximum number of connected players
    #[arg(short, long, default_value = "16")]
    max_clients: usize,

    /// Width and height of the map in tiles
    #[arg(long, default_value = "256")]
    map_size: i32,

    /// Seed for terrain and neutral spawns
    #[arg(long, default_value = "7")]
    seed: u64,

    /// Number of hostile neutral creeps to spawn
    #[arg(long, default_value = "24")]
    creeps: usize,

    /// Vision range of heroes
    #[arg(long, default_value = "12")]
    vision: f32,
}

/// Populates the map with hostile creeps and some scenery.
fn populate(server: &mut Server, map_size: i32, creeps: usize, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let size = map_size.max(1) as f32;
    let game = server.game_state_mut();
    let aggressive = game.neutral().aggressive;

    let wolf_stats = UnitStats {
        max_life: 60.0,
        move_speed: 4.0,
        vision_range: 6.0,
        ..UnitStats::default()
    };

    for _ in 0..creeps {
        let position = Vector2::new(rng.gen_range(0.0..size), rng.gen_range(0.0..size));
        let spawned = game.spawn(
            SpawnDescriptor::unit("Wolf", "wolf", aggressive, position)
                .with_stats(wolf_stats.clone())
                .with_ability(Ability::attack(1, 1.0, 6.0, 1200)),
        );
        if spawned.is_none() {
            warn!("Could not spawn creep at {:?}", position);
        }
    }

    for _ in 0..creeps * 2 {
        let position = Vector2::new(rng.gen_range(0.0..size), rng.gen_range(0.0..size));
        game.spawn(SpawnDescriptor::doodad("Tree", "tree", position, true).scaled(1.5));
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let config = ServerConfig {
        bind_addr: format!("{}:{}", args.host, args.port),
        tick_duration: Duration::from_secs_f64(1.0 / args.tick_rate.max(1) as f64),
        max_receptors: args.max_clients,
        ..ServerConfig::default()
    };

    let mut simulation = SimulationConfig::default();
    let center = args.map_size as f32 / 2.0;
    simulation.hero_spawn = Vector2::new(center, center);
    simulation.hero_stats.vision_range = args.vision;

    let terrain = GridTerrain::random(args.map_size, args.map_size, args.seed);
    let mut server = Server::new(config, simulation, Box::new(terrain)).await?;
    populate(&mut server, args.map_size, args.creeps, args.seed);

    info!(
        "Map {}x{} with {} entities, {} ticks per second",
        args.map_size,
        args.map_size,
        server.game_state().entities().len(),
        args.tick_rate
    );

    let control = server.control();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down");
            let _ = control.send(ServerMessage::Shutdown);
        }
    });

    server.run().await
}
