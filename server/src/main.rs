use clap::Parser;
use log::{error, info};
use server::network::Server;
use server::profile::PerformanceProfile;
use server::simulation::ArenaSimulation;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Performance profile: low, balanced or high
    #[arg(long, env = "PERFORMANCE_MODE")]
    profile: Option<String>,

    /// Override the profile's simulation rate (ticks per second)
    #[arg(short, long)]
    tick_rate: Option<u32>,

    /// Override the profile's network rate (broadcasts per second)
    #[arg(short, long)]
    broadcast_rate: Option<u32>,

    /// Seed for spawn positions
    #[arg(long, default_value = "42")]
    seed: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();

    let mut profile = PerformanceProfile::resolve(args.profile.as_deref());
    if let Some(tick_rate) = args.tick_rate {
        profile.tick_rate = tick_rate;
    }
    if let Some(broadcast_rate) = args.broadcast_rate {
        profile.broadcast_rate = broadcast_rate;
    }

    if let Err(e) = profile.validate() {
        error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    info!("Starting server with profile: {:?}", profile);

    let address = format!("{}:{}", args.host, args.port);
    let simulation = Box::new(ArenaSimulation::new(args.seed));
    let mut server = Server::new(&address, profile, simulation).await?;

    server.run().await?;

    Ok(())
}
