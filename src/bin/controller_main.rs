// controller_main.rs
use clap::Parser;
use junction_sim::communication::controller::listen_amqp;
use junction_sim::global_variables::AMQP_URL;
use junction_sim::simulation_engine::intersections::IntersectionId;
use log::info;
use std::error::Error;

#[derive(Parser)]
#[command(name = "controller_main")]
#[command(about = "Controller relay for one intersection, fed through RabbitMQ")]
struct Cli {
    /// Intersection this controller serves (A or B)
    intersection: IntersectionId,

    #[arg(long, default_value = AMQP_URL)]
    amqp_url: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let controller = listen_amqp(cli.intersection, cli.amqp_url).await?;
    info!(
        "[Controller {}] stopped after {} signals",
        controller.id(),
        controller.received()
    );
    Ok(())
}
