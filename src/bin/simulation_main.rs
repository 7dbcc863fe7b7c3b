// simulation_main.rs
use clap::Parser;
use junction_sim::config::LinkKind;
use junction_sim::monitoring::event_sink::{CsvEventLog, EventSink, FanOut, LogSink};
use junction_sim::{Simulation, SimulationConfig};
use log::{error, info};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "simulation_main")]
#[command(about = "Two-intersection traffic simulation with emergency preemption and parking")]
struct Cli {
    /// Number of vehicles to spawn
    vehicles: Option<u32>,

    /// JSON configuration file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Length of one simulation time unit in milliseconds
    #[arg(long)]
    time_unit_ms: Option<u64>,

    #[arg(long)]
    parking_spots: Option<usize>,

    #[arg(long)]
    parking_queue: Option<usize>,

    /// Seed for reproducible vehicle generation
    #[arg(long)]
    seed: Option<u64>,

    /// Append every simulation event to this CSV file
    #[arg(long)]
    event_log: Option<PathBuf>,

    /// How controller signals are delivered
    #[arg(long, value_enum)]
    link: Option<LinkKind>,

    #[arg(long)]
    amqp_url: Option<String>,
}

impl Cli {
    fn into_config(self) -> junction_sim::Result<SimulationConfig> {
        let mut config = match &self.config {
            Some(path) => SimulationConfig::from_json_file(path)?,
            None => SimulationConfig::default(),
        };
        if let Some(vehicles) = self.vehicles.filter(|n| *n > 0) {
            config.vehicles = vehicles;
        }
        if let Some(ms) = self.time_unit_ms {
            config.time_unit_ms = ms;
        }
        if let Some(spots) = self.parking_spots {
            config.parking_spots = spots;
        }
        if let Some(queue) = self.parking_queue {
            config.parking_queue = queue;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if self.event_log.is_some() {
            config.event_log = self.event_log;
        }
        if let Some(link) = self.link {
            config.link = link;
        }
        if let Some(url) = self.amqp_url {
            config.amqp_url = url;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Cli::parse().into_config()?;

    let mut sinks = FanOut::new().with(Arc::new(LogSink));
    let csv_log = match &config.event_log {
        Some(path) => Some(Arc::new(CsvEventLog::open(path)?)),
        None => None,
    };
    if let Some(csv_log) = &csv_log {
        sinks = sinks.with(csv_log.clone());
    }
    let events: Arc<dyn EventSink> = Arc::new(sinks);

    info!("Traffic simulation - intersections A & B, {} vehicles", config.vehicles);
    let simulation = Simulation::new(config, events)?;

    let handle = simulation.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.abort();
        }
    });

    let outcome = simulation.run().await;
    if let Some(csv_log) = csv_log {
        if let Err(e) = csv_log.finish().await {
            error!("Event log incomplete: {e}");
        }
    }

    match outcome {
        Ok(summary) => {
            for (state, parking) in summary.intersections.iter().zip(summary.parking.iter()) {
                info!(
                    "final light {}, {} inside, parking {}/{} occupied",
                    state.light, state.active_count, parking.current_occupancy, parking.max_spots
                );
            }
            info!("Simulation ended cleanly - all resources released");
            Ok(())
        }
        Err(e) => {
            error!("Simulation failed: {e}");
            Err(e.into())
        }
    }
}
