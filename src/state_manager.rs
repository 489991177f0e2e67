// State Manager - Thread-safe simulation state handling
// Owns the shared state, runs the tick producer thread and hands out snapshots

use log::{error, info, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::{Collision, SimError, SimResult};
use crate::physics_engine::SimulationState;

// =============================================================================
// CONFIGURATION & EVENTS
// =============================================================================

#[derive(Debug, Clone, Copy)]
pub struct ControllerConfig {
    /// Minimum wall time per tick; zero runs ticks back to back
    pub tick_interval: Duration,
    /// Sleep between checks while paused
    pub idle_poll: Duration,
    /// Consumer frame cadence (~60 FPS)
    pub frame_time: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::ZERO,
            idle_poll: Duration::from_millis(1),
            frame_time: Duration::from_millis(16),
        }
    }
}

/// Notifications from the producer thread
#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    Collision(Collision),
    /// A pending reset was carried out; both registries are empty
    Reset,
}

// =============================================================================
// SNAPSHOTS (deep copies taken under the read lock)
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BodySnapshot {
    pub name: String,
    pub mass: f64,
    pub radius: f64,
    pub position: [f64; 3],
    pub velocity: [f64; 3],
    pub acceleration: [f64; 3],
    pub force: [f64; 3],
    pub speed: f64,
    pub kinetic_energy: f64,
    pub soi_radius: f64,
    pub path: Vec<[f64; 3]>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CraftSnapshot {
    pub name: String,
    pub position: [f64; 3],
    pub velocity: [f64; 3],
    pub speed: f64,
    pub heading: f64, // radians
    pub fuel_mass: f64,
    pub current_total_mass: f64,
    pub engine_on: bool,
    pub throttle: f64,
    pub closest_body: Option<usize>,
    pub soi_body: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub sim_time: f64,
    pub time_step: f64,
    pub tick_count: u64,
    pub running: bool,
    pub reset_pending: bool,
    pub total_energy: f64,
    pub energy_drift: f64, // percent
    pub bodies: Vec<BodySnapshot>,
    pub spacecraft: Vec<CraftSnapshot>,
}

impl SimulationState {
    pub fn snapshot(&self) -> Snapshot {
        let bodies = self
            .bodies
            .iter()
            .map(|b| BodySnapshot {
                name: b.name.clone(),
                mass: b.mass,
                radius: b.radius,
                position: b.position.to_array(),
                velocity: b.velocity.to_array(),
                acceleration: b.acceleration.to_array(),
                force: b.force.to_array(),
                speed: b.speed,
                kinetic_energy: b.kinetic_energy,
                soi_radius: b.soi_radius,
                path: b.path.iter().map(|p| p.to_array()).collect(),
            })
            .collect();

        let spacecraft = self
            .spacecraft
            .iter()
            .map(|c| CraftSnapshot {
                name: c.name.clone(),
                position: c.position.to_array(),
                velocity: c.velocity.to_array(),
                speed: c.speed,
                heading: c.heading(),
                fuel_mass: c.fuel_mass,
                current_total_mass: c.current_total_mass,
                engine_on: c.engine_on,
                throttle: c.throttle,
                closest_body: c.closest_body,
                soi_body: c.soi_body,
            })
            .collect();

        Snapshot {
            sim_time: self.sim_time,
            time_step: self.time_step,
            tick_count: self.tick_count,
            running: self.running,
            reset_pending: self.reset_pending,
            total_energy: self.energy.total_energy,
            energy_drift: self.energy.drift_percent(),
            bodies,
            spacecraft,
        }
    }
}

// =============================================================================
// SIMULATION LOOP CONTROLLER
// =============================================================================

pub struct SimulationController {
    pub simulation: Arc<RwLock<SimulationState>>,
    is_open: Arc<RwLock<bool>>,
    config: ControllerConfig,
    events_tx: Sender<SimEvent>,
    events_rx: Receiver<SimEvent>,
    producer: Option<JoinHandle<()>>,
}

impl SimulationController {
    pub fn new(state: SimulationState, config: ControllerConfig) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        Self {
            simulation: Arc::new(RwLock::new(state)),
            is_open: Arc::new(RwLock::new(false)),
            config,
            events_tx,
            events_rx,
            producer: None,
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Spawn the producer thread. Calling it again while running is a no-op.
    pub fn start(&mut self) -> SimResult<()> {
        if self.producer.is_some() {
            return Ok(());
        }
        *self.is_open.write() = true;

        let state = Arc::clone(&self.simulation);
        let is_open = Arc::clone(&self.is_open);
        let events = self.events_tx.clone();
        let config = self.config;

        let handle = thread::Builder::new()
            .name("sim-producer".to_string())
            .spawn(move || run_simulation_loop(state, is_open, events, config))
            .map_err(|e| {
                *self.is_open.write() = false;
                SimError::Io(e)
            })?;

        self.producer = Some(handle);
        info!("simulation thread started");
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.producer.is_some()
    }

    pub fn set_running(&self, running: bool) {
        self.simulation.write().running = running;
    }

    /// Flip the running flag and return the new value
    pub fn toggle_running(&self) -> bool {
        let mut sim = self.simulation.write();
        sim.running = !sim.running;
        info!("simulation {}", if sim.running { "running" } else { "paused" });
        sim.running
    }

    pub fn is_running(&self) -> bool {
        self.simulation.read().running
    }

    /// Ask the producer to clear the state on its next pass
    pub fn request_reset(&self) {
        let mut sim = self.simulation.write();
        sim.running = false;
        sim.reset_pending = true;
    }

    /// Clear the state immediately from the calling thread
    pub fn reset(&self) {
        self.simulation.write().reset();
    }

    pub fn speed_up(&self) -> f64 {
        self.simulation.write().speed_up()
    }

    pub fn slow_down(&self) -> f64 {
        self.simulation.write().slow_down()
    }

    pub fn scale_time_step(&self, factor: f64) -> f64 {
        self.simulation.write().scale_time_step(factor)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.simulation.read().snapshot()
    }

    /// Run `f` against the state under the write lock (loading, injecting entities)
    pub fn with_state<R>(&self, f: impl FnOnce(&mut SimulationState) -> R) -> R {
        let mut sim = self.simulation.write();
        f(&mut sim)
    }

    pub fn try_next_event(&self) -> Option<SimEvent> {
        self.events_rx.try_recv().ok()
    }

    pub fn next_event_timeout(&self, timeout: Duration) -> Option<SimEvent> {
        match self.events_rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Clear the open flag and join the producer thread
    pub fn shutdown(&mut self) {
        *self.is_open.write() = false;
        if let Some(handle) = self.producer.take() {
            if handle.join().is_err() {
                error!("simulation thread panicked");
            } else {
                info!("simulation thread stopped");
            }
        }
    }
}

impl Default for SimulationController {
    fn default() -> Self {
        Self::new(SimulationState::default(), ControllerConfig::default())
    }
}

impl Drop for SimulationController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_simulation_loop(
    state: Arc<RwLock<SimulationState>>,
    is_open: Arc<RwLock<bool>>,
    events: Sender<SimEvent>,
    config: ControllerConfig,
) {
    loop {
        if !*is_open.read() {
            break;
        }
        let start = Instant::now();

        let (running, reset_pending) = {
            let sim = state.read();
            (sim.running, sim.reset_pending)
        };

        if reset_pending {
            state.write().reset();
            let _ = events.send(SimEvent::Reset);
            continue;
        }

        if !running {
            thread::sleep(config.idle_poll);
            continue;
        }

        // One tick per write-lock acquisition. A pause may land between the
        // read above and this write, so check again under the write lock.
        {
            let mut sim = state.write();
            if !sim.running {
                continue;
            }
            match sim.tick() {
                Ok(()) => {
                    sim.refresh_energy();
                }
                Err(SimError::Collision(collision)) => {
                    let _ = events.send(SimEvent::Collision(collision));
                }
                Err(e) => {
                    warn!("tick failed: {}", e);
                    sim.running = false;
                }
            }
        }

        let elapsed = start.elapsed();
        if elapsed < config.tick_interval {
            thread::sleep(config.tick_interval - elapsed);
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vector3;
    use crate::physics_engine::SimulationSettings;

    const WAIT: Duration = Duration::from_secs(10);

    fn orbiting_pair(start_running: bool) -> SimulationState {
        let mut state = SimulationState::new(SimulationSettings {
            time_step: 10.0,
            start_running,
            ..Default::default()
        });
        state
            .bodies
            .add_body("sun", 2.0e30, Some(7.0e8), Vector3::zero(), Vector3::zero())
            .unwrap();
        state
            .bodies
            .add_body(
                "planet",
                6.0e24,
                Some(6.4e6),
                Vector3::planar(1.5e11, 0.0),
                Vector3::planar(0.0, 2.98e4),
            )
            .unwrap();
        state
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + WAIT;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }

    #[test]
    fn test_producer_ticks_while_running() {
        let mut controller = SimulationController::new(orbiting_pair(true), ControllerConfig::default());
        controller.start().unwrap();
        assert!(controller.is_started());

        assert!(wait_for(|| controller.snapshot().tick_count >= 10));
        let snap = controller.snapshot();
        assert_eq!(snap.bodies.len(), 2);
        assert!(snap.sim_time > 0.0);

        controller.shutdown();
        assert!(!controller.is_started());
    }

    #[test]
    fn test_paused_state_does_not_advance() {
        let mut controller = SimulationController::new(orbiting_pair(false), ControllerConfig::default());
        controller.start().unwrap();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(controller.snapshot().sim_time, 0.0);

        assert!(controller.toggle_running());
        assert!(wait_for(|| controller.snapshot().sim_time > 0.0));

        controller.set_running(false);
        thread::sleep(Duration::from_millis(5));
        let paused_at = controller.snapshot().sim_time;
        thread::sleep(Duration::from_millis(20));
        assert_eq!(controller.snapshot().sim_time, paused_at);
    }

    #[test]
    fn test_snapshot_is_independent_copy() {
        let mut controller = SimulationController::new(orbiting_pair(true), ControllerConfig::default());
        let before = controller.snapshot();
        controller.start().unwrap();
        assert!(wait_for(|| controller.snapshot().tick_count > 5));

        assert_eq!(before.tick_count, 0);
        assert_eq!(before.bodies[1].position, [1.5e11, 0.0, 0.0]);
    }

    #[test]
    fn test_collision_pauses_and_resets() {
        let mut state = SimulationState::new(SimulationSettings {
            start_running: true,
            ..Default::default()
        });
        state
            .bodies
            .add_body("a", 1e20, Some(100.0), Vector3::zero(), Vector3::zero())
            .unwrap();
        state
            .bodies
            .add_body("b", 1e20, Some(100.0), Vector3::planar(50.0, 0.0), Vector3::zero())
            .unwrap();

        let mut controller = SimulationController::new(state, ControllerConfig::default());
        controller.start().unwrap();

        match controller.next_event_timeout(WAIT) {
            Some(SimEvent::Collision(c)) => {
                assert_eq!(c.first, "a");
                assert_eq!(c.second, "b");
            }
            other => panic!("expected a collision, got {:?}", other),
        }
        assert_eq!(controller.next_event_timeout(WAIT), Some(SimEvent::Reset));

        let snap = controller.snapshot();
        assert!(snap.bodies.is_empty());
        assert!(!snap.running);
        assert!(!snap.reset_pending);
    }

    #[test]
    fn test_request_reset_clears_state() {
        let mut controller = SimulationController::new(orbiting_pair(true), ControllerConfig::default());
        controller.start().unwrap();
        controller.request_reset();
        assert_eq!(controller.next_event_timeout(WAIT), Some(SimEvent::Reset));
        assert_eq!(controller.snapshot().bodies.len(), 0);
        assert_eq!(controller.snapshot().sim_time, 0.0);
    }

    #[test]
    fn test_controls_without_thread() {
        let controller = SimulationController::new(orbiting_pair(false), ControllerConfig::default());
        assert!((controller.speed_up() - 10.5).abs() < 1e-12);
        assert!((controller.slow_down() - 10.0).abs() < 1e-12);

        controller.with_state(|sim| sim.tick()).unwrap();
        controller.reset();
        assert!(controller.snapshot().bodies.is_empty());
        assert!(controller.try_next_event().is_none());
    }
}
