// Physics Engine - N-body gravity, velocity Verlet integration and energy accounting
// One tick: force reset -> body gravity -> body motion -> craft burns, gravity,
// thrust, fuel, motion -> time advance

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

use crate::bodies::{Body, BodyRegistry, DEFAULT_PATH_CAPACITY};
use crate::error::{Collision, SimError};
use crate::math::G;
use crate::spacecraft::{Spacecraft, SpacecraftRegistry};

// =============================================================================
// SETTINGS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    pub time_step: f64,         // seconds per tick
    pub time_step_factor: f64,  // multiplier per speed-up / slow-down
    pub path_capacity: usize,   // positions kept per body
    pub path_sample_interval: u64, // ticks between path samples
    pub start_running: bool,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            time_step: 1.0,
            time_step_factor: 1.05,
            path_capacity: DEFAULT_PATH_CAPACITY,
            path_sample_interval: 1,
            start_running: false,
        }
    }
}

// =============================================================================
// ENERGY CALCULATIONS (for drift monitoring)
// =============================================================================

/// Total mechanical energy: kinetic energy of every body and craft, plus the
/// potential of each unique body pair and each craft-body pair
pub fn calculate_total_energy(bodies: &[Body], craft: &[Spacecraft]) -> f64 {
    let mut kinetic = 0.0;
    let mut potential = 0.0;

    for body in bodies {
        kinetic += 0.5 * body.mass * body.velocity.magnitude_squared();
    }
    for sc in craft {
        kinetic += 0.5 * sc.current_total_mass * sc.velocity.magnitude_squared();
    }

    for i in 0..bodies.len() {
        for j in (i + 1)..bodies.len() {
            let r = bodies[i].position.sub(&bodies[j].position).magnitude();
            if r > 1e-10 {
                potential -= G * bodies[i].mass * bodies[j].mass / r;
            }
        }
    }

    // Craft never pair with each other
    for sc in craft {
        for body in bodies {
            let r = sc.position.sub(&body.position).magnitude();
            if r > 1e-10 {
                potential -= G * sc.current_total_mass * body.mass / r;
            }
        }
    }

    kinetic + potential
}

/// Tracks total energy against the first measured baseline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnergyMonitor {
    pub initial_energy: Option<f64>,
    pub total_energy: f64,
}

impl EnergyMonitor {
    pub fn sample(&mut self, energy: f64) {
        if self.initial_energy.is_none() {
            debug!("energy baseline captured: {:.6e} J", energy);
            self.initial_energy = Some(energy);
        }
        self.total_energy = energy;
    }

    /// 100·|E - E0| / |E0|, or 0 before a baseline exists
    pub fn drift_percent(&self) -> f64 {
        match self.initial_energy {
            Some(e0) if e0.abs() > 1e-20 => 100.0 * (self.total_energy - e0).abs() / e0.abs(),
            _ => 0.0,
        }
    }

    pub fn reset(&mut self) {
        self.initial_energy = None;
        self.total_energy = 0.0;
    }
}

// =============================================================================
// SIMULATION STATE
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationState {
    pub bodies: BodyRegistry,
    pub spacecraft: SpacecraftRegistry,
    pub sim_time: f64,  // seconds
    pub time_step: f64, // seconds
    pub running: bool,
    /// Set by a collision; the controller clears the state when it sees it
    pub reset_pending: bool,
    pub tick_count: u64,
    pub last_collision: Option<Collision>,
    pub energy: EnergyMonitor,
    pub settings: SimulationSettings,
}

impl SimulationState {
    /// Craft gravity never acts on bodies. Craft masses are negligible next
    /// to planetary ones, so the craft-body pull is applied to the craft only.
    pub const CRAFT_PERTURBS_BODIES: bool = false;

    pub fn new(settings: SimulationSettings) -> Self {
        Self {
            bodies: BodyRegistry::with_path_capacity(settings.path_capacity),
            spacecraft: SpacecraftRegistry::new(),
            sim_time: 0.0,
            time_step: settings.time_step,
            running: settings.start_running,
            reset_pending: false,
            tick_count: 0,
            last_collision: None,
            energy: EnergyMonitor::default(),
            settings,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty() && self.spacecraft.is_empty()
    }

    /// Replace settings on an empty state (registries are rebuilt)
    pub fn apply_settings(&mut self, settings: SimulationSettings) {
        self.bodies = BodyRegistry::with_path_capacity(settings.path_capacity);
        self.spacecraft = SpacecraftRegistry::new();
        self.time_step = settings.time_step;
        self.running = settings.start_running;
        self.settings = settings;
    }

    /// Advance the whole system by one time step. Does nothing while paused.
    /// A collision stops the tick where it was found, pauses the simulation
    /// and flags a pending reset.
    pub fn tick(&mut self) -> Result<(), SimError> {
        // Paused: nothing moves, no fuel burns
        if !self.running {
            return Ok(());
        }
        let dt = self.time_step;
        let sim_time = self.sim_time;

        self.bodies.zero_forces();
        self.spacecraft.zero_forces();

        if let Err(collision) = self.bodies.accumulate_gravity(sim_time) {
            return Err(self.halt(collision));
        }

        for body in self.bodies.iter_mut() {
            body.calculate_kinetic_energy();
        }

        for body in self.bodies.iter_mut() {
            body.update_motion(dt);
            body.update_rotation(dt);
        }

        // Spacecraft only fly once something gravitates
        if !self.bodies.is_empty() {
            let bodies = self.bodies.as_slice();

            for craft in self.spacecraft.iter_mut() {
                craft.check_burn_schedule(bodies, sim_time);
            }

            // One-way pull, see CRAFT_PERTURBS_BODIES
            if let Err(collision) = self.spacecraft.accumulate_gravity(bodies, sim_time) {
                return Err(self.halt(collision));
            }

            for craft in self.spacecraft.iter_mut() {
                craft.apply_thrust();
                craft.consume_fuel(dt);
            }

            for craft in self.spacecraft.iter_mut() {
                craft.update_motion(dt);
            }
        }

        if !self.bodies.is_empty() {
            self.sim_time += dt;
            self.tick_count += 1;

            let interval = self.settings.path_sample_interval.max(1);
            if self.tick_count % interval == 0 {
                self.bodies.record_paths();
            }
        }

        trace!("tick {} done at t = {:.3} s", self.tick_count, self.sim_time);
        Ok(())
    }

    fn halt(&mut self, collision: Collision) -> SimError {
        warn!("{}", collision);
        self.running = false;
        self.reset_pending = true;
        self.last_collision = Some(collision.clone());
        SimError::Collision(collision)
    }

    /// Measure total energy and update drift tracking. Empty systems are not
    /// sampled so the baseline comes from the first populated state.
    pub fn refresh_energy(&mut self) -> f64 {
        if self.bodies.is_empty() {
            return 0.0;
        }
        let energy = calculate_total_energy(self.bodies.as_slice(), self.spacecraft.as_slice());
        self.energy.sample(energy);
        energy
    }

    /// Clear both registries, time and the energy baseline
    pub fn reset(&mut self) {
        self.bodies.reset();
        self.spacecraft.reset();
        self.sim_time = 0.0;
        self.tick_count = 0;
        self.running = false;
        self.reset_pending = false;
        self.last_collision = None;
        self.energy.reset();
        debug!("simulation state reset");
    }

    /// Multiply the time step. Non-positive or non-finite factors are ignored.
    pub fn scale_time_step(&mut self, factor: f64) -> f64 {
        let scaled = self.time_step * factor;
        if factor.is_finite() && factor > 0.0 && scaled.is_finite() && scaled > 0.0 {
            self.time_step = scaled;
            debug!("time step now {:.6} s", self.time_step);
        } else {
            warn!("ignoring time step factor {}", factor);
        }
        self.time_step
    }

    pub fn speed_up(&mut self) -> f64 {
        self.scale_time_step(self.settings.time_step_factor)
    }

    pub fn slow_down(&mut self) -> f64 {
        self.scale_time_step(1.0 / self.settings.time_step_factor)
    }
}

impl Default for SimulationState {
    fn default() -> Self {
        Self::new(SimulationSettings::default())
    }
}

// =============================================================================
// TESTS
// =============================================================================
