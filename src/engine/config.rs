// Scenario configuration authored as TOML.
//
// Every table has serde defaults, so a scenario file only needs to name what
// it changes. Loading validates; team settings are clamped later when they
// are registered with the `SettingsTable`.

use std::path::Path;

use glam::Vec3;
use serde::Deserialize;
use thiserror::Error;

use super::components::{MAX_TEAMS, TeamId};
use super::navigation::{MAX_CELLS, TraversabilityGrid};
use super::settings::Settings;
use super::spatial::LayerMask;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read scenario file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse scenario: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid scenario: {0}")]
    Invalid(String),
}

/// Fail on the first value that is NaN, infinite or negative.
pub(crate) fn check_non_negative(fields: &[(&str, f32)]) -> Result<(), ConfigError> {
    for &(name, value) in fields {
        if !value.is_finite() || value < 0.0 {
            return Err(ConfigError::Invalid(format!("{name} must be a non-negative number, got {value}")));
        }
    }
    Ok(())
}

pub(crate) fn check_finite(fields: &[(&str, Vec3)]) -> Result<(), ConfigError> {
    for &(name, value) in fields {
        if !value.is_finite() {
            return Err(ConfigError::Invalid(format!("{name} must be finite, got {value}")));
        }
    }
    Ok(())
}

/// Traversability grid layout and rebuild cadence.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub center: Vec3,
    /// Full size of the covered volume.
    pub extent: Vec3,
    pub cell_size: Vec3,
    /// Seconds between full rebuilds.
    pub rebuild_interval: f32,
    /// Layers the rebuild overlap queries scan.
    pub layers: LayerMask,
}

impl GridConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_finite(&[("grid.center", self.center)])?;
        let positive = |v: Vec3| v.is_finite() && v.cmpgt(Vec3::ZERO).all();
        if !positive(self.cell_size) || !positive(self.extent) {
            return Err(ConfigError::Invalid("grid extent and cell_size must be positive".into()));
        }
        if !(self.rebuild_interval.is_finite() && self.rebuild_interval > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "grid.rebuild_interval must be positive, got {}",
                self.rebuild_interval
            )));
        }
        match TraversabilityGrid::cell_count_for(self.extent, self.cell_size) {
            Some(cells) if cells <= MAX_CELLS => Ok(()),
            _ => Err(ConfigError::Invalid(format!(
                "grid of {} / {} exceeds {MAX_CELLS} cells",
                self.extent, self.cell_size
            ))),
        }
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            center: Vec3::ZERO,
            extent: Vec3::new(200.0, 40.0, 200.0),
            cell_size: Vec3::splat(10.0),
            rebuild_interval: 2.0,
            layers: LayerMask::DEFAULT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TeamConfig {
    pub team: TeamId,
    #[serde(default)]
    pub settings: Settings,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    pub team: TeamId,
    pub position: Vec3,
    pub half_extents: Vec3,
    pub health: f32,
    pub attract_radius: f32,
    pub patrol_radius: f32,
    pub next_node_threshold: f32,
    pub move_speed: f32,
    pub look_speed: f32,
    pub spawn_rate: f32,
    pub spawn_offset: Vec3,
}

impl StationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_non_negative(&[
            ("station.health", self.health),
            ("station.attract_radius", self.attract_radius),
            ("station.patrol_radius", self.patrol_radius),
            ("station.next_node_threshold", self.next_node_threshold),
            ("station.move_speed", self.move_speed),
            ("station.look_speed", self.look_speed),
            ("station.spawn_rate", self.spawn_rate),
        ])?;
        check_finite(&[
            ("station.position", self.position),
            ("station.half_extents", self.half_extents),
            ("station.spawn_offset", self.spawn_offset),
        ])
    }
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            team: 1,
            position: Vec3::ZERO,
            half_extents: Vec3::new(6.0, 4.0, 10.0),
            health: 100.0,
            attract_radius: 40.0,
            patrol_radius: 60.0,
            next_node_threshold: 3.0,
            move_speed: 4.0,
            look_speed: 0.5,
            spawn_rate: 2.0,
            spawn_offset: Vec3::new(0.0, 0.0, 14.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ObstacleConfig {
    pub center: Vec3,
    pub half_extents: Vec3,
}

/// Complete scenario description.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub seed: u64,
    /// Simulation ticks per second.
    pub tick_rate: f32,
    pub agents_per_team: usize,
    pub grid: GridConfig,
    pub teams: Vec<TeamConfig>,
    pub stations: Vec<StationConfig>,
    pub obstacles: Vec<ObstacleConfig>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            seed: 1,
            tick_rate: 60.0,
            agents_per_team: 24,
            grid: GridConfig::default(),
            teams: vec![
                TeamConfig { team: 1, settings: Settings::default() },
                TeamConfig { team: 2, settings: Settings::default() },
            ],
            stations: vec![
                StationConfig { team: 1, position: Vec3::new(-60.0, 0.0, 0.0), ..Default::default() },
                StationConfig { team: 2, position: Vec3::new(60.0, 0.0, 0.0), ..Default::default() },
            ],
            obstacles: vec![ObstacleConfig { center: Vec3::ZERO, half_extents: Vec3::new(8.0, 20.0, 8.0) }],
        }
    }
}

impl ScenarioConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.tick_rate.is_finite() && self.tick_rate > 0.0) {
            return Err(ConfigError::Invalid(format!("tick_rate must be positive, got {}", self.tick_rate)));
        }
        self.grid.validate()?;
        for team in &self.teams {
            if team.team as usize >= MAX_TEAMS {
                return Err(ConfigError::Invalid(format!("team {} exceeds the maximum of {MAX_TEAMS}", team.team)));
            }
            team.settings.validate()?;
        }
        for station in &self.stations {
            if !self.teams.iter().any(|t| t.team == station.team) {
                return Err(ConfigError::Invalid(format!("station references unknown team {}", station.team)));
            }
            station.validate()?;
        }
        Ok(())
    }
}
