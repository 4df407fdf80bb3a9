// Engine module - skirmish simulation core
// Agents and stations are plain owned Vecs; every system is a function over them.

pub mod combat;
pub mod components;
pub mod config;
pub mod control;
pub mod geometry;
pub mod navigation;
pub mod pathfinding;
pub mod patrol;
pub mod respawn;
pub mod settings;
pub mod spatial;
pub mod steering;
pub mod systems;

// Re-export commonly used items
pub use components::*;
pub use config::{ConfigError, ScenarioConfig};
pub use control::{AimRay, ControlInput, ControllerContext};
pub use pathfinding::PathError;
pub use settings::{ProjectilePrototype, Settings, SettingsTable};
pub use spatial::{BodyHandle, BodyKind, CollisionWorld, LayerMask, SpatialQuery};
pub use systems::{ProjectileSpawner, Simulation, TickReport};
