use crate::simulation_engine::intersections::{IntersectionPair, LightColor};
use log::info;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// Cycles both lights in strict anti-phase: A is GREEN while B is RED, then both flip.
pub struct TrafficLightController {
    intersections: IntersectionPair,
    phase: Duration,
    a_green: bool,
}

impl TrafficLightController {
    pub fn new(intersections: IntersectionPair, phase: Duration) -> Self {
        Self {
            intersections,
            phase,
            a_green: true,
        }
    }

    /// Applies the current phase to both intersections, A first.
    pub fn apply_current_phase(&self) {
        let a = if self.a_green { LightColor::Green } else { LightColor::Red };
        self.intersections.a.set_light(a);
        self.intersections.b.set_light(a.flipped());
    }

    /// Moves to the next phase and applies it.
    pub fn advance(&mut self) {
        self.a_green = !self.a_green;
        self.apply_current_phase();
    }

    /// Runs until `stop` turns true (or its sender goes away), then wakes every
    /// waiter on both intersections one last time.
    pub async fn run_update_loop(mut self, mut stop: watch::Receiver<bool>) {
        info!("Light manager started - {:?} phase", self.phase);
        self.apply_current_phase();

        loop {
            if *stop.borrow_and_update() {
                break;
            }
            tokio::select! {
                _ = sleep(self.phase) => {}
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }
            self.advance();
        }

        for intersection in self.intersections.iter() {
            intersection.wake_all();
        }
        info!("Light manager stopping");
    }

    pub fn spawn(self, stop: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run_update_loop(stop))
    }
}
