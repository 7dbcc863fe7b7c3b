// simulation.rs
use crate::communication::controller::Controller;
use crate::communication::link::{AmqpLink, ChannelLink, SignalLink};
use crate::communication::messages::ControllerSignal;
use crate::config::{LinkKind, SimulationConfig};
use crate::control_system::emergency::PreemptionCoordinator;
use crate::control_system::traffic_light_controller::TrafficLightController;
use crate::error::{Result, SimError};
use crate::monitoring::event_sink::EventSink;
use crate::simulation_engine::agent::{simulate_vehicle_journey, AgentContext, JourneyReport};
use crate::simulation_engine::intersections::{IntersectionId, IntersectionPair, IntersectionState};
use crate::simulation_engine::parking::{ParkingPair, ParkingPool, ParkingSnapshot};
use crate::simulation_engine::vehicles::{random_vehicle, Vehicle};
use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::sleep;

/// Where controller signals go, and what must be awaited at shutdown.
enum Relays {
    InProcess {
        link: Arc<ChannelLink>,
        controllers: Vec<JoinHandle<Controller>>,
    },
    Amqp(Arc<AmqpLink>),
}

impl Relays {
    fn link(&self) -> Arc<dyn SignalLink> {
        match self {
            Relays::InProcess { link, .. } => Arc::clone(link) as Arc<dyn SignalLink>,
            Relays::Amqp(link) => Arc::clone(link) as Arc<dyn SignalLink>,
        }
    }

    /// Sends `Shutdown` to both controllers and waits for the local ones to finish.
    /// Returns how many signals the local controllers handled.
    async fn shutdown(self) -> usize {
        let link = self.link();
        for id in [IntersectionId::A, IntersectionId::B] {
            link.send(id, ControllerSignal::Shutdown);
        }
        match self {
            Relays::InProcess { controllers, .. } => {
                let mut handled = 0;
                for handle in controllers {
                    match handle.await {
                        Ok(controller) => handled += controller.received(),
                        Err(e) => warn!("Controller task failed: {e}"),
                    }
                }
                handled
            }
            Relays::Amqp(link) => {
                if let Err(e) = link.close() {
                    warn!("Error closing AMQP link: {e}");
                }
                0
            }
        }
    }
}

/// Aborts a running simulation from outside (e.g. on Ctrl-C).
#[derive(Clone)]
pub struct ShutdownHandle {
    stop: Arc<watch::Sender<bool>>,
    intersections: IntersectionPair,
    parking: ParkingPair,
}

impl ShutdownHandle {
    /// Stops spawning and the light cycle, and releases every blocked agent.
    pub fn abort(&self) {
        warn!("Shutdown requested - releasing all waiting vehicles");
        self.stop.send_replace(true);
        for intersection in self.intersections.iter() {
            intersection.close();
        }
        for pool in self.parking.iter() {
            pool.close();
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulationSummary {
    pub journeys: Vec<JourneyReport>,
    /// Vehicles that gave up because the simulation was shutting down.
    pub aborted: usize,
    /// Signals handled by in-process controllers, `Shutdown` included.
    pub signals_relayed: usize,
    pub intersections: [IntersectionState; 2],
    pub parking: [ParkingSnapshot; 2],
}

impl SimulationSummary {
    pub fn parked(&self) -> usize {
        self.journeys.iter().filter(|j| j.parked).count()
    }

    pub fn average_wait(&self) -> Duration {
        if self.journeys.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = self.journeys.iter().map(|j| j.waited).sum();
        total / self.journeys.len() as u32
    }
}

pub struct Simulation {
    config: SimulationConfig,
    intersections: IntersectionPair,
    parking: ParkingPair,
    events: Arc<dyn EventSink>,
    stop: Arc<watch::Sender<bool>>,
}

impl Simulation {
    pub fn new(config: SimulationConfig, events: Arc<dyn EventSink>) -> Result<Self> {
        config.validate()?;
        let intersections = IntersectionPair::new(Arc::clone(&events));
        let parking = ParkingPair {
            a: Arc::new(ParkingPool::new(
                Arc::clone(&intersections.a),
                config.parking_spots,
                config.parking_queue,
            )),
            b: Arc::new(ParkingPool::new(
                Arc::clone(&intersections.b),
                config.parking_spots,
                config.parking_queue,
            )),
        };
        let (stop, _) = watch::channel(false);
        Ok(Self {
            config,
            intersections,
            parking,
            events,
            stop: Arc::new(stop),
        })
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            stop: Arc::clone(&self.stop),
            intersections: self.intersections.clone(),
            parking: self.parking.clone(),
        }
    }

    fn rng(&self) -> StdRng {
        match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }

    /// Generates `config.vehicles` random vehicles and runs them.
    pub async fn run(self) -> Result<SimulationSummary> {
        let mut rng = self.rng();
        let vehicles = (1..=self.config.vehicles)
            .map(|id| random_vehicle(id, &mut rng))
            .collect();
        self.run_vehicles(vehicles).await
    }

    /// Runs the given vehicles, spawning them in order with the configured delay.
    pub async fn run_vehicles(self, vehicles: Vec<Vehicle>) -> Result<SimulationSummary> {
        let mut rng = self.rng();
        let relays = match self.config.link {
            LinkKind::Channel => {
                let (link, to_a, to_b) = ChannelLink::new();
                Relays::InProcess {
                    link: Arc::new(link),
                    controllers: vec![
                        tokio::spawn(Controller::new(IntersectionId::A).run(to_a)),
                        tokio::spawn(Controller::new(IntersectionId::B).run(to_b)),
                    ],
                }
            }
            LinkKind::Amqp => {
                let url = self.config.amqp_url.clone();
                let link = tokio::task::spawn_blocking(move || AmqpLink::connect(&url))
                    .await
                    .map_err(|e| SimError::Io(std::io::Error::other(e)))??;
                Relays::Amqp(Arc::new(link))
            }
        };

        let lights = TrafficLightController::new(self.intersections.clone(), self.config.light_phase())
            .spawn(self.stop.subscribe());

        let ctx = Arc::new(AgentContext {
            intersections: self.intersections.clone(),
            parking: self.parking.clone(),
            coordinator: PreemptionCoordinator::new(self.intersections.clone(), relays.link()),
            events: Arc::clone(&self.events),
            config: self.config.clone(),
        });

        info!("Spawning {} vehicles", vehicles.len());
        let mut stop = self.stop.subscribe();
        let mut agents = JoinSet::new();
        for vehicle in vehicles {
            if *stop.borrow_and_update() {
                warn!("Stop requested - no further vehicles spawned");
                break;
            }
            agents.spawn(simulate_vehicle_journey(vehicle, Arc::clone(&ctx)));

            let delay = Duration::from_millis(self.config.spawn_delay_ms.sample(&mut rng));
            tokio::select! {
                _ = sleep(delay) => {}
                _ = stop.changed() => {}
            }
        }

        let mut journeys = Vec::new();
        let mut aborted = 0;
        while let Some(joined) = agents.join_next().await {
            match joined {
                Ok(Ok(report)) => journeys.push(report),
                Ok(Err(SimError::Shutdown)) => aborted += 1,
                Ok(Err(e)) => warn!("Vehicle agent failed: {e}"),
                Err(e) => warn!("Vehicle task panicked or was cancelled: {e}"),
            }
        }
        info!("All vehicles completed their journeys - shutting down");

        self.stop.send_replace(true);
        if let Err(e) = lights.await {
            warn!("Light manager task failed: {e}");
        }
        drop(ctx);
        let signals_relayed = relays.shutdown().await;

        for intersection in self.intersections.iter() {
            intersection.close();
        }
        for pool in self.parking.iter() {
            pool.close();
        }

        let summary = SimulationSummary {
            journeys,
            aborted,
            signals_relayed,
            intersections: [self.intersections.a.snapshot(), self.intersections.b.snapshot()],
            parking: [self.parking.a.snapshot(), self.parking.b.snapshot()],
        };
        info!(
            "Simulation ended: {} journeys, {} parked, {} aborted, average wait {:?}",
            summary.journeys.len(),
            summary.parked(),
            summary.aborted,
            summary.average_wait()
        );
        Ok(summary)
    }
}
