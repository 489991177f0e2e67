// OrbitSim - N-body orbital and spacecraft trajectory simulator
// Library root: physics core, loop controller, scenario loading and telemetry

pub mod bodies;
pub mod error;
pub mod math;
pub mod physics_engine;
pub mod scenario_loader;
pub mod spacecraft;
pub mod state_manager;
pub mod telemetry;

pub use bodies::{Body, BodyRegistry, PathHistory};
pub use error::{Collision, ConfigError, EntityKind, SimError, SimResult};
pub use math::{Quaternion, Vector3, G};
pub use physics_engine::{calculate_total_energy, EnergyMonitor, SimulationSettings, SimulationState};
pub use scenario_loader::{load_scenario_file, LoadSummary, Scenario};
pub use spacecraft::{Burn, BurnReference, Spacecraft, SpacecraftParams, SpacecraftRegistry};
pub use state_manager::{ControllerConfig, SimEvent, SimulationController, Snapshot};
pub use telemetry::{TelemetryRecord, TelemetryWriter};
