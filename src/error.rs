// Error taxonomy for the simulation core

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which registry an entity belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    Body,
    Spacecraft,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Body => write!(f, "body"),
            EntityKind::Spacecraft => write!(f, "spacecraft"),
        }
    }
}

/// Two entities came closer than the gravitating body's radius.
/// Halts the tick; the controller pauses and requests a reset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collision {
    pub first: String,
    pub first_kind: EntityKind,
    pub second: String,
    pub second_kind: EntityKind,
    pub sim_time: f64,   // seconds
    pub separation: f64, // meters
}

impl fmt::Display for Collision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} has collided with {} {} at t = {:.1} s (separation {:.1} m)",
            self.first_kind, self.first, self.second_kind, self.second, self.sim_time, self.separation
        )
    }
}

/// Malformed scenario or entity input
#[derive(Debug)]
pub enum ConfigError {
    UnknownBurnTarget { craft: String, target: String },
    UnknownBurnType { craft: String, burn_type: String },
    UnknownReferenceBody { craft: String, body: String },
    OverlappingBurns { craft: String, first: usize, second: usize },
    InvalidBurn { craft: String, index: usize, reason: String },
    /// Scenarios only load into an empty simulation
    StateNotEmpty,
    Parse(serde_json::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::UnknownBurnTarget { craft, target } => {
                write!(f, "burn target {target} for {craft} not found or is invalid")
            }
            ConfigError::UnknownBurnType { craft, burn_type } => {
                write!(f, "invalid relative burn type {burn_type:?} for {craft}")
            }
            ConfigError::UnknownReferenceBody { craft, body } => {
                write!(f, "body {body} not found for relative positioning of {craft}")
            }
            ConfigError::OverlappingBurns {
                craft,
                first,
                second,
            } => write!(f, "burns {first} and {second} of {craft} have overlapping windows"),
            ConfigError::InvalidBurn {
                craft,
                index,
                reason,
            } => write!(f, "burn {index} of {craft} is invalid: {reason}"),
            ConfigError::StateNotEmpty => {
                write!(f, "simulation already populated, reset before loading another")
            }
            ConfigError::Parse(e) => write!(f, "failed to parse simulation JSON: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Parse(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum SimError {
    /// Registry growth failed; the registry keeps its previous count
    Allocation { entity: EntityKind, name: String },
    Collision(Collision),
    Config(ConfigError),
    /// Entity rejected before construction (non-physical values)
    InvalidEntity {
        entity: EntityKind,
        name: String,
        reason: String,
    },
    Io(std::io::Error),
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::Allocation { entity, name } => {
                write!(f, "failed to allocate memory for {entity} {name}")
            }
            SimError::Collision(c) => write!(f, "collision: {c}"),
            SimError::Config(e) => write!(f, "configuration error: {e}"),
            SimError::InvalidEntity {
                entity,
                name,
                reason,
            } => write!(f, "invalid {entity} {name}: {reason}"),
            SimError::Io(e) => write!(f, "i/o error: {e}"),
        }
    }
}

impl std::error::Error for SimError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SimError::Config(e) => Some(e),
            SimError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for SimError {
    fn from(e: ConfigError) -> Self {
        SimError::Config(e)
    }
}

impl From<Collision> for SimError {
    fn from(c: Collision) -> Self {
        SimError::Collision(c)
    }
}

impl From<std::io::Error> for SimError {
    fn from(e: std::io::Error) -> Self {
        SimError::Io(e)
    }
}

impl From<serde_json::Error> for SimError {
    fn from(e: serde_json::Error) -> Self {
        SimError::Config(ConfigError::Parse(e))
    }
}

pub type SimResult<T> = Result<T, SimError>;
