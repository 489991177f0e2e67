// Body Registry - gravitating bodies (planets, moons, stars)
// Owns body records, their per-body path caches and the pairwise gravity pass

use log::{info, trace};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::error::{Collision, EntityKind, SimError, SimResult};
use crate::math::{Quaternion, Vector3, G};

/// Exponent of the visual radius scaling law `radius = mass^0.279`
pub const RADIUS_SCALING_EXPONENT: f64 = 0.279;

/// Default number of positions kept per body trail
pub const DEFAULT_PATH_CAPACITY: usize = 100;

// =============================================================================
// PATH HISTORY
// =============================================================================

/// Bounded ring buffer of recent positions, oldest first
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathHistory {
    capacity: usize,
    points: VecDeque<Vector3>,
}

impl PathHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            points: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, point: Vector3) {
        if self.capacity == 0 {
            return;
        }
        if self.points.len() == self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(point);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Vector3> {
        self.points.iter()
    }
}

// =============================================================================
// BODY
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Body {
    pub name: String,
    pub mass: f64,   // kg
    pub radius: f64, // meters
    pub position: Vector3,
    pub velocity: Vector3,
    pub speed: f64, // |v|, m/s
    pub acceleration: Vector3,
    pub prev_acceleration: Vector3,
    pub force: Vector3,
    pub kinetic_energy: f64, // J, cached for display
    pub soi_radius: f64,     // meters, 0 for the central body
    pub rotational_velocity: f64, // rad/s about the local z axis
    pub attitude: Quaternion,
    pub path: PathHistory,
}

impl Body {
    /// Radius used when none is supplied. Visual scaling only, not physical.
    pub fn default_radius(mass: f64) -> f64 {
        mass.powf(RADIUS_SCALING_EXPONENT)
    }

    pub fn calculate_kinetic_energy(&mut self) {
        self.kinetic_energy = 0.5 * self.mass * self.speed * self.speed;
    }

    /// Velocity Verlet step from the accumulated force
    ///   x(t+dt) = x(t) + v(t)*dt + 0.5*a*dt²
    ///   v(t+dt) = v(t) + 0.5*(a + a_prev)*dt
    pub fn update_motion(&mut self, dt: f64) {
        self.acceleration = self.force.scale(1.0 / self.mass);

        let vel_term = self.velocity.scale(dt);
        let acc_term = self.acceleration.scale(0.5 * dt * dt);
        self.position = self.position.add(&vel_term.add(&acc_term));

        let avg_acc = self.acceleration.add(&self.prev_acceleration).scale(0.5);
        self.velocity = self.velocity.add(&avg_acc.scale(dt));
        self.speed = self.velocity.magnitude();

        self.prev_acceleration = self.acceleration;
    }

    /// Spin the attitude about its own local z axis
    pub fn update_rotation(&mut self, dt: f64) {
        if self.rotational_velocity == 0.0 {
            return;
        }
        let spin_axis = self.attitude.rotate(&Vector3::UNIT_Z);
        let delta = Quaternion::from_axis_angle(&spin_axis, self.rotational_velocity * dt);
        self.attitude = delta.mul(&self.attitude).normalize();
    }
}

/// Gravitational force exerted on `bi` by `bj`: G·mi·mj / r³ · (xj - xi).
/// The force on `bj` is the negation.
pub fn pair_force(bi: &Body, bj: &Body) -> Vector3 {
    let delta = bj.position.sub(&bi.position);
    let r_squared = delta.magnitude_squared();
    let r_cubed = r_squared * r_squared.sqrt();
    delta.scale(G * bi.mass * bj.mass / r_cubed)
}

// =============================================================================
// BODY REGISTRY
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BodyRegistry {
    bodies: Vec<Body>,
    path_capacity: usize,
}

impl BodyRegistry {
    pub fn new() -> Self {
        Self::with_path_capacity(DEFAULT_PATH_CAPACITY)
    }

    pub fn with_path_capacity(path_capacity: usize) -> Self {
        Self {
            bodies: Vec::new(),
            path_capacity,
        }
    }

    /// Append a body and return its id. `radius` defaults to `mass^0.279`.
    pub fn add_body(
        &mut self,
        name: &str,
        mass: f64,
        radius: Option<f64>,
        position: Vector3,
        velocity: Vector3,
    ) -> SimResult<usize> {
        let invalid = |reason: &str| SimError::InvalidEntity {
            entity: EntityKind::Body,
            name: name.to_string(),
            reason: reason.to_string(),
        };

        if !(mass.is_finite() && mass > 0.0) {
            return Err(invalid("mass must be positive"));
        }
        let radius = radius.unwrap_or_else(|| Body::default_radius(mass));
        if !(radius.is_finite() && radius > 0.0) {
            return Err(invalid("radius must be positive"));
        }
        if self.find_by_name(name).is_some() {
            return Err(invalid("name already in use"));
        }

        self.bodies
            .try_reserve(1)
            .map_err(|_| SimError::Allocation {
                entity: EntityKind::Body,
                name: name.to_string(),
            })?;

        let speed = velocity.magnitude();
        self.bodies.push(Body {
            name: name.to_string(),
            mass,
            radius,
            position,
            velocity,
            speed,
            acceleration: Vector3::zero(),
            prev_acceleration: Vector3::zero(),
            force: Vector3::zero(),
            kinetic_energy: 0.5 * mass * speed * speed,
            soi_radius: 0.0,
            rotational_velocity: 0.0,
            attitude: Quaternion::identity(),
            path: PathHistory::new(self.path_capacity),
        });

        let id = self.bodies.len() - 1;
        info!("added body {} (id {}, mass {:.3e} kg, radius {:.3e} m)", name, id, mass, radius);
        Ok(id)
    }

    /// Drop every body along with its name and path cache
    pub fn reset(&mut self) {
        if !self.bodies.is_empty() {
            info!("cleared {} bodies", self.bodies.len());
        }
        self.bodies = Vec::new();
    }

    pub fn count(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    pub fn get(&self, id: usize) -> Option<&Body> {
        self.bodies.get(id)
    }

    pub fn get_mut(&mut self, id: usize) -> Option<&mut Body> {
        self.bodies.get_mut(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Body> {
        self.bodies.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Body> {
        self.bodies.iter_mut()
    }

    pub fn as_slice(&self) -> &[Body] {
        &self.bodies
    }

    pub fn find_by_name(&self, name: &str) -> Option<usize> {
        self.bodies.iter().position(|b| b.name == name)
    }

    pub fn path_capacity(&self) -> usize {
        self.path_capacity
    }

    pub fn zero_forces(&mut self) {
        for body in self.bodies.iter_mut() {
            body.force = Vector3::zero();
        }
    }

    /// Pairwise gravity over every unordered pair (i < j), applied +F to i
    /// and -F to j. Stops at the first pair closer than the larger radius.
    pub fn accumulate_gravity(&mut self, sim_time: f64) -> Result<(), Collision> {
        let n = self.bodies.len();
        for i in 0..n {
            for j in (i + 1)..n {
                let (head, tail) = self.bodies.split_at_mut(j);
                let bi = &mut head[i];
                let bj = &mut tail[0];

                let r_squared = bj.position.sub(&bi.position).magnitude_squared();
                let contact_radius = bi.radius.max(bj.radius);
                if r_squared < contact_radius * contact_radius {
                    return Err(Collision {
                        first: bi.name.clone(),
                        first_kind: EntityKind::Body,
                        second: bj.name.clone(),
                        second_kind: EntityKind::Body,
                        sim_time,
                        separation: r_squared.sqrt(),
                    });
                }

                let force = pair_force(bi, bj);
                bi.force = bi.force.add(&force);
                bj.force = bj.force.sub(&force);
            }
        }
        trace!("accumulated gravity for {} body pairs", n * n.saturating_sub(1) / 2);
        Ok(())
    }

    /// Sphere of influence of each body relative to body 0:
    /// SOI = a * (m/M)^(2/5)
    pub fn compute_soi(&mut self) {
        let Some((central, rest)) = self.bodies.split_first_mut() else {
            return;
        };
        central.soi_radius = 0.0;
        for body in rest {
            let a = body.position.sub(&central.position).magnitude();
            body.soi_radius = a * (body.mass / central.mass).powf(0.4);
        }
    }

    pub fn record_paths(&mut self) {
        for body in self.bodies.iter_mut() {
            body.path.push(body.position);
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
