// Scenario Loader - JSON scenario files into the body and spacecraft registries
// Burn targets are body names resolved to ids; burn types are "tangent" | "normal" | "absolute"

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{ConfigError, SimResult};
use crate::math::{Quaternion, Vector3};
use crate::physics_engine::{SimulationSettings, SimulationState};
use crate::spacecraft::{Burn, BurnReference, SpacecraftParams};

// =============================================================================
// SCENARIO FILE TYPES
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub settings: Option<SimulationSettings>,
    #[serde(default)]
    pub bodies: Vec<BodyEntry>,
    #[serde(default)]
    pub spacecraft: Vec<SpacecraftEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BodyEntry {
    pub name: String,
    pub mass: f64,
    pub radius: Option<f64>,
    pub pos_x: f64,
    pub pos_y: f64,
    #[serde(default)]
    pub pos_z: f64,
    pub vel_x: f64,
    pub vel_y: f64,
    #[serde(default)]
    pub vel_z: f64,
    #[serde(default)]
    pub rotational_v: f64,
    pub attitude_axis_x: Option<f64>,
    pub attitude_axis_y: Option<f64>,
    pub attitude_axis_z: Option<f64>,
    pub attitude_angle: Option<f64>,
}

impl BodyEntry {
    /// Attitude is only set when the full axis and angle are given
    fn attitude(&self) -> Option<Quaternion> {
        let axis = Vector3::new(
            self.attitude_axis_x?,
            self.attitude_axis_y?,
            self.attitude_axis_z?,
        );
        Some(Quaternion::from_axis_angle(&axis, self.attitude_angle?))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpacecraftEntry {
    pub name: String,
    pub pos_x: f64,
    pub pos_y: f64,
    #[serde(default)]
    pub pos_z: f64,
    pub vel_x: f64,
    pub vel_y: f64,
    #[serde(default)]
    pub vel_z: f64,
    /// Body name the position and velocity are offsets from, or "absolute"
    pub position_relative_to: Option<String>,
    pub dry_mass: f64,
    pub fuel_mass: f64,
    pub thrust: f64,
    pub specific_impulse: f64,
    pub mass_flow_rate: f64,
    #[serde(default)]
    pub attitude: f64,
    #[serde(default)]
    pub moment_of_inertia: f64,
    #[serde(default)]
    pub nozzle_gimbal_range: f64,
    #[serde(default)]
    pub burns: Vec<BurnEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BurnEntry {
    pub burn_target: Option<String>,
    pub burn_type: String,
    pub start_time: f64,
    pub duration: f64,
    pub heading: f64,
    pub throttle: f64,
}

/// Counts of what a load added
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadSummary {
    pub bodies: usize,
    pub spacecraft: usize,
    pub burns: usize,
}

// =============================================================================
// LOADING
// =============================================================================

impl Scenario {
    pub fn from_json_str(json: &str) -> SimResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> SimResult<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)?;
        let scenario = Self::from_json_str(&json)?;
        info!("read scenario {}", path.display());
        Ok(scenario)
    }

    /// Populate an empty simulation. On any error the state is cleared
    /// again and the settings, time step and run flag it had before are
    /// restored, so nothing half-built is left behind.
    pub fn load_into(&self, state: &mut SimulationState) -> SimResult<LoadSummary> {
        if !state.is_empty() {
            return Err(ConfigError::StateNotEmpty.into());
        }
        let previous_settings = state.settings.clone();
        let previous_time_step = state.time_step;
        let previous_running = state.running;
        if let Some(settings) = &self.settings {
            state.apply_settings(settings.clone());
        }

        match self.populate(state) {
            Ok(summary) => {
                info!(
                    "loaded {} bodies and {} spacecraft ({} burns)",
                    summary.bodies, summary.spacecraft, summary.burns
                );
                Ok(summary)
            }
            Err(e) => {
                warn!("scenario rejected: {}", e);
                state.reset();
                state.apply_settings(previous_settings);
                state.time_step = previous_time_step;
                state.running = previous_running;
                Err(e)
            }
        }
    }

    fn populate(&self, state: &mut SimulationState) -> SimResult<LoadSummary> {
        for entry in &self.bodies {
            let id = state.bodies.add_body(
                &entry.name,
                entry.mass,
                entry.radius,
                Vector3::new(entry.pos_x, entry.pos_y, entry.pos_z),
                Vector3::new(entry.vel_x, entry.vel_y, entry.vel_z),
            )?;
            if let Some(body) = state.bodies.get_mut(id) {
                body.rotational_velocity = entry.rotational_v;
                if let Some(attitude) = entry.attitude() {
                    body.attitude = attitude;
                }
            }
        }

        // SOI needs every body in place
        state.bodies.compute_soi();

        let mut burn_count = 0;
        for entry in &self.spacecraft {
            let params = craft_params(entry, state)?;
            let burns = entry
                .burns
                .iter()
                .map(|b| resolve_burn(&entry.name, b, state))
                .collect::<Result<Vec<_>, _>>()?;

            state
                .spacecraft
                .add_spacecraft(&params, &burns, &state.bodies)?;
            burn_count += burns.len();
        }

        Ok(LoadSummary {
            bodies: self.bodies.len(),
            spacecraft: self.spacecraft.len(),
            burns: burn_count,
        })
    }
}

fn craft_params(entry: &SpacecraftEntry, state: &SimulationState) -> Result<SpacecraftParams, ConfigError> {
    let mut position = Vector3::new(entry.pos_x, entry.pos_y, entry.pos_z);
    let mut velocity = Vector3::new(entry.vel_x, entry.vel_y, entry.vel_z);

    match entry.position_relative_to.as_deref() {
        None | Some("absolute") => {}
        Some(reference) => {
            let body = state
                .bodies
                .find_by_name(reference)
                .and_then(|id| state.bodies.get(id))
                .ok_or_else(|| ConfigError::UnknownReferenceBody {
                    craft: entry.name.clone(),
                    body: reference.to_string(),
                })?;
            position = position.add(&body.position);
            velocity = velocity.add(&body.velocity);
        }
    }

    Ok(SpacecraftParams {
        name: entry.name.clone(),
        position,
        velocity,
        dry_mass: entry.dry_mass,
        fuel_mass: entry.fuel_mass,
        thrust: entry.thrust,
        specific_impulse: entry.specific_impulse,
        mass_flow_rate: entry.mass_flow_rate,
        attitude: entry.attitude,
        moment_of_inertia: entry.moment_of_inertia,
        nozzle_gimbal_range: entry.nozzle_gimbal_range,
    })
}

fn resolve_burn(craft: &str, entry: &BurnEntry, state: &SimulationState) -> Result<Burn, ConfigError> {
    let reference =
        BurnReference::from_name(&entry.burn_type).ok_or_else(|| ConfigError::UnknownBurnType {
            craft: craft.to_string(),
            burn_type: entry.burn_type.clone(),
        })?;

    let target = match &entry.burn_target {
        Some(name) => Some(state.bodies.find_by_name(name).ok_or_else(|| {
            ConfigError::UnknownBurnTarget {
                craft: craft.to_string(),
                target: name.clone(),
            }
        })?),
        None => None,
    };

    Ok(Burn::new(
        entry.start_time,
        entry.duration,
        entry.heading,
        entry.throttle,
        target,
        reference,
    ))
}

/// Load a scenario file straight into `state`
pub fn load_scenario_file(path: impl AsRef<Path>, state: &mut SimulationState) -> SimResult<LoadSummary> {
    Scenario::from_path(path)?.load_into(state)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bodies::DEFAULT_PATH_CAPACITY;
    use crate::error::SimError;

    const EARTH_MOON: &str = r#"{
        "settings": { "time_step": 30.0, "path_capacity": 50 },
        "bodies": [
            { "name": "Earth", "mass": 5.97e24, "radius": 6.371e6,
              "pos_x": 0.0, "pos_y": 0.0, "vel_x": 0.0, "vel_y": 0.0,
              "rotational_v": 7.29e-5,
              "attitude_axis_x": 0.0, "attitude_axis_y": 0.0, "attitude_axis_z": 1.0,
              "attitude_angle": 0.5 },
            { "name": "Moon", "mass": 7.35e22,
              "pos_x": 3.84e8, "pos_y": 0.0, "pos_z": 0.0,
              "vel_x": 0.0, "vel_y": 1022.0, "vel_z": 0.0 }
        ],
        "spacecraft": [
            { "name": "Lander", "position_relative_to": "Moon",
              "pos_x": 2.0e6, "pos_y": 0.0, "vel_x": 0.0, "vel_y": 1600.0,
              "dry_mass": 2000.0, "fuel_mass": 8000.0, "thrust": 45000.0,
              "specific_impulse": 311.0, "mass_flow_rate": 14.7,
              "attitude": 0.0, "moment_of_inertia": 1.0e4, "nozzle_gimbal_range": 0.1,
              "burns": [
                { "burn_target": "Moon", "burn_type": "tangent",
                  "start_time": 100.0, "duration": 60.0, "heading": 3.14159, "throttle": 1.0 }
              ] }
        ]
    }"#;

    #[test]
    fn test_load_earth_moon_lander() {
        let mut state = SimulationState::default();
        let scenario = Scenario::from_json_str(EARTH_MOON).unwrap();
        let summary = scenario.load_into(&mut state).unwrap();

        assert_eq!(
            summary,
            LoadSummary {
                bodies: 2,
                spacecraft: 1,
                burns: 1
            }
        );
        assert_eq!(state.time_step, 30.0);
        assert_eq!(state.bodies.path_capacity(), 50);

        let moon = state.bodies.get(1).unwrap();
        assert!((moon.radius - 7.35e22_f64.powf(0.279)).abs() < 1e-6);
        assert!(moon.soi_radius > 0.0);
        assert_eq!(state.bodies.get(0).unwrap().soi_radius, 0.0);

        let earth = state.bodies.get(0).unwrap();
        assert!((earth.attitude.heading() - 0.5).abs() < 1e-12);
        assert_eq!(earth.rotational_velocity, 7.29e-5);

        let lander = state.spacecraft.get(0).unwrap();
        assert_eq!(lander.position, Vector3::new(3.86e8, 0.0, 0.0));
        assert_eq!(lander.velocity, Vector3::new(0.0, 2622.0, 0.0));
        assert_eq!(lander.burns[0].target, Some(1));
        assert_eq!(lander.burns[0].reference, BurnReference::Tangent);
        assert_eq!(lander.burns[0].end_time, 160.0);
        assert_eq!(lander.closest_body, Some(1));
    }

    #[test]
    fn test_refuses_populated_state() {
        let mut state = SimulationState::default();
        let scenario = Scenario::from_json_str(EARTH_MOON).unwrap();
        scenario.load_into(&mut state).unwrap();

        let err = scenario.load_into(&mut state).unwrap_err();
        assert!(matches!(err, SimError::Config(ConfigError::StateNotEmpty)));
        assert_eq!(state.bodies.count(), 2);
    }

    #[test]
    fn test_unknown_burn_target_rejected() {
        let json = EARTH_MOON.replace(r#""burn_target": "Moon""#, r#""burn_target": "Mars""#);
        let mut state = SimulationState::default();
        let err = Scenario::from_json_str(&json)
            .unwrap()
            .load_into(&mut state)
            .unwrap_err();
        assert!(matches!(err, SimError::Config(ConfigError::UnknownBurnTarget { .. })));
        assert!(state.is_empty(), "failed load must not leave partial state");
    }

    #[test]
    fn test_rejected_scenario_keeps_previous_settings() {
        let json = EARTH_MOON.replace(r#""burn_target": "Moon""#, r#""burn_target": "Mars""#);
        let mut state = SimulationState::default();
        state.time_step = 5.0;

        assert!(Scenario::from_json_str(&json)
            .unwrap()
            .load_into(&mut state)
            .is_err());

        assert_eq!(state.settings, SimulationSettings::default());
        assert_eq!(state.time_step, 5.0);
        assert!(!state.running);
        assert_eq!(state.bodies.path_capacity(), DEFAULT_PATH_CAPACITY);
        assert!(state.is_empty());
    }

    #[test]
    fn test_unknown_burn_type_rejected() {
        let json = EARTH_MOON.replace(r#""burn_type": "tangent""#, r#""burn_type": "radial""#);
        let mut state = SimulationState::default();
        let err = Scenario::from_json_str(&json)
            .unwrap()
            .load_into(&mut state)
            .unwrap_err();
        assert!(matches!(err, SimError::Config(ConfigError::UnknownBurnType { .. })));
    }

    #[test]
    fn test_unknown_reference_body_rejected() {
        let json = EARTH_MOON.replace(
            r#""position_relative_to": "Moon""#,
            r#""position_relative_to": "Phobos""#,
        );
        let mut state = SimulationState::default();
        let err = Scenario::from_json_str(&json)
            .unwrap()
            .load_into(&mut state)
            .unwrap_err();
        assert!(matches!(err, SimError::Config(ConfigError::UnknownReferenceBody { .. })));
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        let err = Scenario::from_json_str("{ \"bodies\": [ { \"name\": 3 } ] }").unwrap_err();
        assert!(matches!(err, SimError::Config(ConfigError::Parse(_))));
    }

    #[test]
    fn test_bundled_scenario_loads_and_ticks() {
        let scenario = Scenario::from_json_str(include_str!("../scenarios/earth_moon.json")).unwrap();
        let mut state = SimulationState::default();
        scenario.load_into(&mut state).unwrap();
        assert_eq!(state.time_step, 10.0);
        assert_eq!(state.spacecraft.get(0).unwrap().closest_body, Some(0));

        state.running = true;
        for _ in 0..100 {
            state.tick().unwrap();
        }
        assert_eq!(state.sim_time, 1000.0);
        assert!(state.spacecraft.get(0).unwrap().fuel_mass < 12000.0);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let mut state = SimulationState::default();
        let err = load_scenario_file("/nonexistent/scenario.json", &mut state).unwrap_err();
        assert!(matches!(err, SimError::Io(_)));
    }
}
