// Spacecraft Registry - powered craft with fuel, thrust and burn schedules
// Craft feel body gravity but never pull on bodies

use log::{debug, info, trace};
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;

use crate::bodies::{Body, BodyRegistry};
use crate::error::{Collision, ConfigError, EntityKind, SimError, SimResult};
use crate::math::{Quaternion, Vector3, G};

/// Below this squared separation (m²) the craft-body pull is skipped
pub const MIN_SEPARATION_SQUARED: f64 = 1.0;

// =============================================================================
// BURN SCHEDULE
// =============================================================================

/// Frame the burn heading is measured from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BurnReference {
    /// Heading measured from world +X about world +Z
    Absolute,
    /// Heading measured from the velocity relative to the target body
    Tangent,
    /// Heading measured from the relative velocity rotated by +90°
    Normal,
}

impl BurnReference {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "absolute" => Some(BurnReference::Absolute),
            "tangent" => Some(BurnReference::Tangent),
            "normal" => Some(BurnReference::Normal),
            _ => None,
        }
    }

    pub fn needs_target(&self) -> bool {
        !matches!(self, BurnReference::Absolute)
    }
}

/// A scheduled thrust window. Immutable once handed to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Burn {
    pub start_time: f64, // seconds
    pub end_time: f64,   // start_time + duration
    pub heading: f64,    // radians
    pub throttle: f64,   // 0..1
    pub target: Option<usize>,
    pub reference: BurnReference,
}

impl Burn {
    pub fn new(
        start_time: f64,
        duration: f64,
        heading: f64,
        throttle: f64,
        target: Option<usize>,
        reference: BurnReference,
    ) -> Self {
        Self {
            start_time,
            end_time: start_time + duration,
            heading,
            throttle,
            target,
            reference,
        }
    }

    /// start <= t < end
    pub fn is_active(&self, sim_time: f64) -> bool {
        sim_time >= self.start_time && sim_time < self.end_time
    }

    fn overlaps(&self, other: &Burn) -> bool {
        self.start_time < other.end_time && other.start_time < self.end_time
    }
}

// =============================================================================
// SPACECRAFT
// =============================================================================

/// Construction parameters for [`SpacecraftRegistry::add_spacecraft`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpacecraftParams {
    pub name: String,
    pub position: Vector3,
    pub velocity: Vector3,
    pub dry_mass: f64,          // kg
    pub fuel_mass: f64,         // kg
    pub thrust: f64,            // N at full throttle
    pub specific_impulse: f64,  // s
    pub mass_flow_rate: f64,    // kg/s at full throttle
    pub attitude: f64,          // initial heading, radians about +Z
    pub moment_of_inertia: f64, // kg·m²
    pub nozzle_gimbal_range: f64, // radians
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Spacecraft {
    pub name: String,

    pub dry_mass: f64,
    pub fuel_mass: f64,
    pub current_total_mass: f64,

    pub position: Vector3,
    pub velocity: Vector3,
    pub speed: f64,
    pub acceleration: Vector3,
    pub prev_acceleration: Vector3,
    /// Gravity plus thrust, reset every tick
    pub force: Vector3,

    pub attitude: Quaternion,
    pub moment_of_inertia: f64,

    pub thrust: f64,
    pub specific_impulse: f64,
    pub mass_flow_rate: f64,
    pub nozzle_gimbal_range: f64,
    pub engine_on: bool,
    pub throttle: f64,

    pub burns: Vec<Burn>,
    pub active_burn: Option<usize>,

    pub closest_body: Option<usize>,
    pub closest_r_squared: f64,
    /// Nearest body whose sphere of influence contains the craft this tick
    pub soi_body: Option<usize>,
    soi_r_squared: f64,
}

impl Spacecraft {
    /// Engine thrust axis in world frame (body +X rotated by attitude)
    pub fn thrust_direction(&self) -> Vector3 {
        self.attitude.rotate(&Vector3::UNIT_X)
    }

    pub fn heading(&self) -> f64 {
        self.attitude.heading()
    }

    pub fn kinetic_energy(&self) -> f64 {
        0.5 * self.current_total_mass * self.speed * self.speed
    }

    /// First burn whose window contains `sim_time` fires, provided fuel remains.
    /// Otherwise the engine is shut off.
    pub fn check_burn_schedule(&mut self, bodies: &[Body], sim_time: f64) {
        let selected = if self.fuel_mass > 0.0 {
            self.burns.iter().position(|b| b.is_active(sim_time))
        } else {
            None
        };

        let Some(index) = selected else {
            if self.engine_on {
                debug!("{}: engine off at t = {:.1} s", self.name, sim_time);
            }
            self.engine_on = false;
            self.throttle = 0.0;
            self.active_burn = None;
            return;
        };

        let burn = self.burns[index];
        if self.active_burn != Some(index) {
            debug!(
                "{}: burn {} active at t = {:.1} s ({:?}, throttle {:.2})",
                self.name, index, sim_time, burn.reference, burn.throttle
            );
        }
        self.engine_on = true;
        self.throttle = burn.throttle;
        self.active_burn = Some(index);
        self.attitude = self.burn_attitude(&burn, bodies);
    }

    fn burn_attitude(&self, burn: &Burn, bodies: &[Body]) -> Quaternion {
        let offset = match burn.reference {
            BurnReference::Absolute => {
                return Quaternion::from_axis_angle(&Vector3::UNIT_Z, burn.heading);
            }
            BurnReference::Tangent => burn.heading,
            BurnReference::Normal => burn.heading + FRAC_PI_2,
        };

        let (rel_pos, rel_vel) = match burn.target.and_then(|id| bodies.get(id)) {
            Some(target) => (
                self.position.sub(&target.position),
                self.velocity.sub(&target.velocity),
            ),
            None => (self.position, self.velocity),
        };

        // Heading offsets turn about the orbit normal, oriented so that planar
        // motion always turns about +Z
        let mut axis = rel_pos.cross(&rel_vel).normalize();
        if axis.magnitude_squared() == 0.0 {
            axis = Vector3::UNIT_Z;
        } else if axis.z < 0.0 {
            axis = axis.negate();
        }

        let base = Quaternion::from_two_vectors(&Vector3::UNIT_X, &rel_vel);
        Quaternion::from_axis_angle(&axis, offset).mul(&base).normalize()
    }

    /// Recompute total mass and clear per-tick tracking before the gravity pass
    pub fn begin_gravity_pass(&mut self) {
        self.current_total_mass = self.dry_mass + self.fuel_mass;
        self.closest_r_squared = f64::INFINITY;
        self.closest_body = None;
        self.soi_r_squared = f64::INFINITY;
        self.soi_body = None;
    }

    /// Pull of one body on this craft. Fatal if inside the body's radius;
    /// skipped when the separation is below the 1 m floor.
    pub fn calculate_grav_force(
        &mut self,
        body_id: usize,
        body: &Body,
        sim_time: f64,
    ) -> Result<(), Collision> {
        let delta = body.position.sub(&self.position);
        let r_squared = delta.magnitude_squared();

        if r_squared < body.radius * body.radius {
            return Err(Collision {
                first: self.name.clone(),
                first_kind: EntityKind::Spacecraft,
                second: body.name.clone(),
                second_kind: EntityKind::Body,
                sim_time,
                separation: r_squared.sqrt(),
            });
        }

        if r_squared < MIN_SEPARATION_SQUARED {
            trace!("{}: skipping degenerate pull from {}", self.name, body.name);
            return Ok(());
        }

        let r = r_squared.sqrt();
        let force_factor = G * self.current_total_mass * body.mass / (r_squared * r);
        self.force = self.force.add(&delta.scale(force_factor));

        if r_squared < self.closest_r_squared {
            self.closest_r_squared = r_squared;
            self.closest_body = Some(body_id);
        }
        if r <= body.soi_radius && r_squared < self.soi_r_squared {
            self.soi_r_squared = r_squared;
            self.soi_body = Some(body_id);
        }
        Ok(())
    }

    pub fn apply_thrust(&mut self) {
        if self.engine_on && self.fuel_mass > 0.0 {
            let current_thrust = self.thrust * self.throttle;
            let world_thrust = self.thrust_direction().scale(current_thrust);
            self.force = self.force.add(&world_thrust);
        }
    }

    /// Burn `mass_flow_rate * throttle * dt` of fuel, never more than remains.
    /// The engine cuts off once the tank is empty.
    pub fn consume_fuel(&mut self, dt: f64) {
        if !(self.engine_on && self.fuel_mass > 0.0) {
            return;
        }

        let mut consumed = self.mass_flow_rate * self.throttle * dt;
        if consumed >= self.fuel_mass {
            consumed = self.fuel_mass;
            self.engine_on = false;
            info!("{}: fuel exhausted", self.name);
        }

        self.fuel_mass = (self.fuel_mass - consumed).max(0.0);
        self.current_total_mass = self.dry_mass + self.fuel_mass;
    }

    /// Same velocity Verlet scheme as bodies, using the current total mass
    pub fn update_motion(&mut self, dt: f64) {
        self.acceleration = self.force.scale(1.0 / self.current_total_mass);

        let vel_term = self.velocity.scale(dt);
        let acc_term = self.acceleration.scale(0.5 * dt * dt);
        self.position = self.position.add(&vel_term.add(&acc_term));

        let avg_acc = self.acceleration.add(&self.prev_acceleration).scale(0.5);
        self.velocity = self.velocity.add(&avg_acc.scale(dt));
        self.speed = self.velocity.magnitude();

        self.prev_acceleration = self.acceleration;
    }

    /// Index and squared distance of the nearest body
    pub fn find_closest_body(&mut self, bodies: &[Body]) {
        self.closest_r_squared = f64::INFINITY;
        self.closest_body = None;
        for (id, body) in bodies.iter().enumerate() {
            let r_squared = body.position.sub(&self.position).magnitude_squared();
            if r_squared < self.closest_r_squared {
                self.closest_r_squared = r_squared;
                self.closest_body = Some(id);
            }
        }
    }
}

// =============================================================================
// SPACECRAFT REGISTRY
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpacecraftRegistry {
    craft: Vec<Spacecraft>,
}

impl SpacecraftRegistry {
    pub fn new() -> Self {
        Self { craft: Vec::new() }
    }

    /// Append a craft. The burn list is copied; burn targets must already
    /// exist in `bodies` and burn windows must not overlap.
    pub fn add_spacecraft(
        &mut self,
        params: &SpacecraftParams,
        burns: &[Burn],
        bodies: &BodyRegistry,
    ) -> SimResult<usize> {
        let name = params.name.as_str();
        let invalid = |reason: &str| SimError::InvalidEntity {
            entity: EntityKind::Spacecraft,
            name: name.to_string(),
            reason: reason.to_string(),
        };

        if !(params.dry_mass.is_finite() && params.dry_mass > 0.0) {
            return Err(invalid("dry mass must be positive"));
        }
        if !(params.fuel_mass.is_finite() && params.fuel_mass >= 0.0) {
            return Err(invalid("fuel mass must not be negative"));
        }
        if !(params.thrust >= 0.0 && params.mass_flow_rate >= 0.0) {
            return Err(invalid("thrust and mass flow rate must not be negative"));
        }
        if self.find_by_name(name).is_some() {
            return Err(invalid("name already in use"));
        }
        validate_burns(name, burns, bodies)?;

        self.craft
            .try_reserve(1)
            .map_err(|_| SimError::Allocation {
                entity: EntityKind::Spacecraft,
                name: name.to_string(),
            })?;

        let mut craft = Spacecraft {
            name: name.to_string(),
            dry_mass: params.dry_mass,
            fuel_mass: params.fuel_mass,
            current_total_mass: params.dry_mass + params.fuel_mass,
            position: params.position,
            velocity: params.velocity,
            speed: params.velocity.magnitude(),
            acceleration: Vector3::zero(),
            prev_acceleration: Vector3::zero(),
            force: Vector3::zero(),
            attitude: Quaternion::from_axis_angle(&Vector3::UNIT_Z, params.attitude),
            moment_of_inertia: params.moment_of_inertia,
            thrust: params.thrust,
            specific_impulse: params.specific_impulse,
            mass_flow_rate: params.mass_flow_rate,
            nozzle_gimbal_range: params.nozzle_gimbal_range,
            engine_on: false,
            throttle: 0.0,
            burns: burns.to_vec(),
            active_burn: None,
            closest_body: None,
            closest_r_squared: f64::INFINITY,
            soi_body: None,
            soi_r_squared: f64::INFINITY,
        };
        craft.find_closest_body(bodies.as_slice());
        self.craft.push(craft);

        let id = self.craft.len() - 1;
        info!(
            "added spacecraft {} (id {}, {:.1} kg dry, {:.1} kg fuel, {} burns)",
            name,
            id,
            params.dry_mass,
            params.fuel_mass,
            burns.len()
        );
        Ok(id)
    }

    /// Drop every craft along with its name and burn schedule
    pub fn reset(&mut self) {
        if !self.craft.is_empty() {
            info!("cleared {} spacecraft", self.craft.len());
        }
        self.craft = Vec::new();
    }

    pub fn count(&self) -> usize {
        self.craft.len()
    }

    pub fn is_empty(&self) -> bool {
        self.craft.is_empty()
    }

    pub fn get(&self, id: usize) -> Option<&Spacecraft> {
        self.craft.get(id)
    }

    pub fn get_mut(&mut self, id: usize) -> Option<&mut Spacecraft> {
        self.craft.get_mut(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Spacecraft> {
        self.craft.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Spacecraft> {
        self.craft.iter_mut()
    }

    pub fn as_slice(&self) -> &[Spacecraft] {
        &self.craft
    }

    pub fn find_by_name(&self, name: &str) -> Option<usize> {
        self.craft.iter().position(|c| c.name == name)
    }

    pub fn zero_forces(&mut self) {
        for craft in self.craft.iter_mut() {
            craft.force = Vector3::zero();
        }
    }

    /// Body gravity on every craft. Stops at the first craft inside a body.
    pub fn accumulate_gravity(&mut self, bodies: &[Body], sim_time: f64) -> Result<(), Collision> {
        for craft in self.craft.iter_mut() {
            craft.begin_gravity_pass();
            for (id, body) in bodies.iter().enumerate() {
                craft.calculate_grav_force(id, body, sim_time)?;
            }
        }
        Ok(())
    }
}

fn validate_burns(craft: &str, burns: &[Burn], bodies: &BodyRegistry) -> Result<(), ConfigError> {
    let invalid = |index: usize, reason: &str| ConfigError::InvalidBurn {
        craft: craft.to_string(),
        index,
        reason: reason.to_string(),
    };

    for (index, burn) in burns.iter().enumerate() {
        if !(burn.start_time.is_finite() && burn.end_time >= burn.start_time) {
            return Err(invalid(index, "duration must not be negative"));
        }
        if !(0.0..=1.0).contains(&burn.throttle) {
            return Err(invalid(index, "throttle must be within 0..1"));
        }
        if !burn.heading.is_finite() {
            return Err(invalid(index, "heading must be finite"));
        }
        match burn.target {
            Some(id) if id >= bodies.count() => {
                return Err(ConfigError::UnknownBurnTarget {
                    craft: craft.to_string(),
                    target: format!("#{id}"),
                });
            }
            None if burn.reference.needs_target() => {
                return Err(invalid(index, "tangent and normal burns need a target body"));
            }
            _ => {}
        }
    }

    for (i, a) in burns.iter().enumerate() {
        for (j, b) in burns.iter().enumerate().skip(i + 1) {
            if a.overlaps(b) {
                return Err(ConfigError::OverlappingBurns {
                    craft: craft.to_string(),
                    first: i,
                    second: j,
                });
            }
        }
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
